//! Schema migrations over persisted records.
//!
//! Each cache build can register an ordered list of migration steps. At
//! startup the runner compares the persisted version marker against the
//! registered steps and applies every step above the marker, in ascending
//! version order, rewriting or deleting records by their structural type
//! tag. The marker is advanced after each completed step, so an aborted
//! run resumes where it left off.

use tracing::{debug, info};

use crate::error::LarderError;
use crate::store::DiskStore;

/// One transformation applied to every matching persisted record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationAction {
    /// Delete records whose stored type tag matches.
    DeleteType {
        /// Type tag to match.
        type_tag: String,
    },
    /// Rewrite the stored type tag of matching records.
    RenameType {
        /// Type tag to match.
        from: String,
        /// Replacement tag.
        to: String,
    },
}

/// A migration step: a schema version and the actions that bring stored
/// records up to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    /// Version this step migrates the store to. Must be unique and
    /// greater than zero.
    pub version: u32,
    /// Actions applied in order to every persisted record.
    pub actions: Vec<MigrationAction>,
}

impl Migration {
    /// Create an empty step for a version.
    pub fn new(version: u32) -> Self {
        Self {
            version,
            actions: Vec::new(),
        }
    }

    /// Add a delete-by-type action.
    pub fn delete_type(mut self, type_tag: impl Into<String>) -> Self {
        self.actions.push(MigrationAction::DeleteType {
            type_tag: type_tag.into(),
        });
        self
    }

    /// Add a rename-type action.
    pub fn rename_type(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.actions.push(MigrationAction::RenameType {
            from: from.into(),
            to: to.into(),
        });
        self
    }
}

/// Applies registered migration steps against the disk store.
#[derive(Debug, Default)]
pub struct MigrationRunner {
    steps: Vec<Migration>,
}

impl MigrationRunner {
    /// Build a runner from registered steps. Steps are sorted by version;
    /// registration order does not matter.
    pub fn new(mut steps: Vec<Migration>) -> Self {
        steps.sort_by_key(|step| step.version);
        Self { steps }
    }

    /// Apply every step above the persisted marker, ascending. Returns
    /// the version the store ends up at.
    ///
    /// # Errors
    ///
    /// Returns [`LarderError::MigrationFailed`] naming the step that
    /// aborted; steps already applied keep their advanced marker.
    pub async fn run(&self, disk: &DiskStore) -> Result<u32, LarderError> {
        let marker = disk.read_version().await;
        let mut current = marker;

        for step in self.steps.iter().filter(|s| s.version > marker) {
            debug!(version = step.version, actions = step.actions.len(), "Applying migration");
            self.apply_step(disk, step)
                .await
                .map_err(|cause| LarderError::MigrationFailed {
                    version: step.version,
                    cause,
                })?;
            disk.write_version(step.version)
                .await
                .map_err(|e| LarderError::MigrationFailed {
                    version: step.version,
                    cause: format!("failed to persist version marker: {e}"),
                })?;
            current = step.version;
        }

        if current > marker {
            info!(from = marker, to = current, "Schema migrations applied");
        }
        Ok(current)
    }

    async fn apply_step(&self, disk: &DiskStore, step: &Migration) -> Result<(), String> {
        let keys = disk
            .all_keys()
            .await
            .map_err(|e| format!("failed to list records: {e}"))?;

        for key in keys {
            // A record that fails to read is absent by the persistence
            // contract; there is nothing to migrate.
            let Some(mut record) = disk
                .retrieve(&key)
                .await
                .map_err(|e| format!("failed to read record '{key}': {e}"))?
            else {
                continue;
            };

            let mut deleted = false;
            let mut renamed = false;
            for action in &step.actions {
                match action {
                    MigrationAction::DeleteType { type_tag } if record.type_tag == *type_tag => {
                        disk.evict(&key)
                            .await
                            .map_err(|e| format!("failed to delete record '{key}': {e}"))?;
                        deleted = true;
                        break;
                    }
                    MigrationAction::RenameType { from, to } if record.type_tag == *from => {
                        record.type_tag = to.clone();
                        renamed = true;
                    }
                    _ => {}
                }
            }

            if renamed && !deleted {
                disk.save(&key, &record)
                    .await
                    .map_err(|e| format!("failed to rewrite record '{key}': {e}"))?;
            }
        }
        Ok(())
    }
}
