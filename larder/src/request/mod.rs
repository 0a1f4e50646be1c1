//! Request descriptors and the pipeline that executes them.
//!
//! A [`RequestDescriptor`] carries everything one provider invocation
//! needs: the composite key, TTL and expirability, an eviction directive,
//! the response shape, and the lazy asynchronous loader. The pipeline
//! turns a descriptor into a reply: gate on startup, consult the cache,
//! fall back to the loader, honour the eviction directive, write back,
//! and hand out an isolated copy of the payload.

mod descriptor;
pub(crate) mod pipeline;

pub use descriptor::{EvictDirective, Loader, LoaderFuture, RequestDescriptor};
