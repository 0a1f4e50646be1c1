//! The request pipeline.
//!
//! Per request:
//!
//! 1. Wait for the startup gate (migrations + sweep). The loader never
//!    fires before the gate settles; a latched startup failure is
//!    returned instead.
//! 2. Consult the two-layer cache. A fresh record with no eviction
//!    directive answers the request outright.
//! 3. Otherwise invoke the loader. The eviction directive fires on this
//!    path whether or not the loader succeeds.
//! 4. A successful load is written back and answered as
//!    [`Source::Cloud`]; an empty or failed load falls back to the prior
//!    record when stale fallback is enabled, and otherwise fails with
//!    [`LarderError::NoDataFromLoader`].
//! 5. Payloads leave the cache as fresh decodes of stored bytes, so
//!    callers can never mutate cache state through a reply.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::boot::StartupGate;
use crate::codec;
use crate::engine::TwoTierCache;
use crate::error::LarderError;
use crate::key::CompositeKey;
use crate::record::{self, Reply, Source};
use crate::request::{EvictDirective, RequestDescriptor};
use crate::stats::CacheStats;

/// Execute one request descriptor against the cache.
pub(crate) async fn execute<T>(
    engine: &TwoTierCache,
    gate: &StartupGate,
    use_expired_fallback: bool,
    stats: &CacheStats,
    descriptor: RequestDescriptor<T>,
) -> Result<Reply<T>, LarderError>
where
    T: Serialize + DeserializeOwned,
{
    gate.wait().await?;

    let key = descriptor.key();
    let lifetime_millis = descriptor.lifetime.as_millis() as u64;

    let prior = engine
        .retrieve(&key, use_expired_fallback, lifetime_millis)
        .await?;

    if let Some(found) = &prior {
        let fresh = !record::lifetime_elapsed(
            found.created_at_millis,
            lifetime_millis,
            record::now_millis(),
        );
        if fresh && !descriptor.evict.demands_eviction() {
            let payload = codec::decode(&found.payload)?;
            return Ok(Reply {
                payload,
                source: found.source,
            });
        }
    }

    let RequestDescriptor {
        provider_key,
        expirable,
        evict,
        type_tag,
        loader,
        ..
    } = descriptor;

    stats.loader_call();
    let (value, cause) = match loader().await {
        Ok(Some(value)) => (Some(value), None),
        Ok(None) => (None, None),
        Err(e) => (None, Some(e)),
    };

    match value {
        Some(value) => {
            apply_directive(engine, &key, evict).await?;
            let bytes = codec::encode(&value)?;
            engine
                .save(&key, bytes.clone(), type_tag, lifetime_millis, expirable)
                .await?;
            // Decode rather than hand back the loader's value: the reply
            // must be structurally independent of what the cache stored.
            let payload = codec::decode(&bytes)?;
            Ok(Reply {
                payload,
                source: Source::Cloud,
            })
        }
        None => {
            stats.loader_failure();
            apply_directive(engine, &key, evict).await?;

            if use_expired_fallback {
                if let Some(found) = prior {
                    debug!(
                        provider = %provider_key,
                        source = %found.source,
                        "Loader unavailable; serving stale record"
                    );
                    let payload = codec::decode(&found.payload)?;
                    return Ok(Reply {
                        payload,
                        source: found.source,
                    });
                }
            }

            Err(LarderError::NoDataFromLoader {
                provider_key,
                cause,
            })
        }
    }
}

async fn apply_directive(
    engine: &TwoTierCache,
    key: &CompositeKey,
    directive: EvictDirective,
) -> Result<(), LarderError> {
    match directive {
        EvictDirective::None => Ok(()),
        EvictDirective::All => {
            engine.evict_all().await;
            Ok(())
        }
        EvictDirective::Provider => engine.evict_provider(&key.provider).await,
        EvictDirective::DynamicKey => {
            engine
                .evict_dynamic_key(&key.provider, key.dynamic.as_deref().unwrap_or(""))
                .await
        }
        EvictDirective::DynamicKeyGroup => {
            engine
                .evict_dynamic_key_group(
                    &key.provider,
                    key.dynamic.as_deref().unwrap_or(""),
                    key.group.as_deref().unwrap_or(""),
                )
                .await
        }
    }
}
