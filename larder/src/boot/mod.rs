//! Startup coordination.
//!
//! Before any request may complete, two things happen in order on a
//! background task: registered schema migrations run to completion, then
//! one expired-record sweep pass clears out stale entries. Only then does
//! the [`StartupGate`] release waiting requests. A migration failure
//! latches into the gate and is surfaced by every subsequent request.

mod gate;
mod migrations;
mod sweeper;

pub use gate::StartupGate;
pub use migrations::{Migration, MigrationAction, MigrationRunner};
pub use sweeper::{sweep, SweepReport};

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::LarderError;
use crate::store::{DiskStore, MemoryStore};

/// Spawn the startup sequence: migrate, sweep, release the gate.
pub(crate) fn spawn_startup(
    disk: Arc<DiskStore>,
    memory: Arc<MemoryStore>,
    runner: MigrationRunner,
    gate: StartupGate,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match runner.run(&disk).await {
            Ok(version) => {
                let report = sweep(&disk, &memory).await;
                info!(
                    schema_version = version,
                    scanned = report.scanned,
                    evicted = report.evicted,
                    "Cache startup complete"
                );
                gate.mark_ready();
            }
            Err(LarderError::MigrationFailed { version, cause }) => {
                warn!(version, cause = %cause, "Cache startup failed; requests will observe the failure");
                gate.mark_failed(version, cause);
            }
            Err(other) => {
                warn!(error = %other, "Cache startup failed; requests will observe the failure");
                gate.mark_failed(0, other.to_string());
            }
        }
    })
}
