//! End-to-end refresh: snapshot, optional reset and load, then patches.

use crate::error::{PatchError, RefreshError, Result};
use crate::mysql::tool_available;
use crate::patch::{PatchApplier, PatchFile, PatchOutcome, SkipLogLevel, discover_patches};
use crate::prompt::Confirmation;
use crate::snapshot::{SnapshotFile, SnapshotStore};
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

/// Destructive operations on the target server
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TargetServer: Send + Sync {
    /// Human-readable name of the target, shown in the confirmation prompt
    fn describe(&self) -> String;

    async fn drop_database(&self) -> Result<()>;

    async fn create_database(&self) -> Result<()>;

    async fn load_snapshot(&self, snapshot: &SnapshotFile) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct RefreshOptions {
    /// Drop, recreate and reload the target before patching
    pub reset: bool,
    pub patches_dir: PathBuf,
    pub skip_level: SkipLogLevel,
}

/// Summary of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub snapshot: SnapshotFile,
    pub reset: bool,
    pub patches: Vec<PatchOutcome>,
    pub elapsed_secs: f64,
}

impl RefreshReport {
    pub fn statements_skipped(&self) -> usize {
        self.patches.iter().map(|p| p.skipped.len()).sum()
    }
}

/// Warn about missing client binaries. Never fails; the step that needs one will.
pub async fn preflight(tools: &[&str]) {
    for tool in tools {
        if !tool_available(tool).await {
            warn!(tool = %tool, "Required client not found on PATH");
        }
    }
}

pub struct Refresher<'a> {
    snapshots: &'a SnapshotStore,
    target: &'a dyn TargetServer,
    confirmation: &'a dyn Confirmation,
    applier: &'a PatchApplier,
    options: RefreshOptions,
}

impl<'a> Refresher<'a> {
    pub fn new(
        snapshots: &'a SnapshotStore,
        target: &'a dyn TargetServer,
        confirmation: &'a dyn Confirmation,
        applier: &'a PatchApplier,
        options: RefreshOptions,
    ) -> Self {
        Self {
            snapshots,
            target,
            confirmation,
            applier,
            options,
        }
    }

    pub async fn run(&self) -> Result<RefreshReport> {
        let started = Instant::now();

        let snapshot = self.snapshots.current_snapshot().await?;
        info!(snapshot = %snapshot.name(), size_mb = snapshot.size_mb(), "Snapshot ready");

        if self.options.reset {
            self.reset_database(&snapshot).await?;
        }

        let patches = self.patches()?;
        info!(count = patches.len(), "Importing SQL changes");
        let outcomes = self.applier.apply_all(&patches, self.options.skip_level).await?;

        Ok(RefreshReport {
            snapshot,
            reset: self.options.reset,
            patches: outcomes,
            elapsed_secs: (started.elapsed().as_secs_f64() * 100.0).round() / 100.0,
        })
    }

    async fn reset_database(&self, snapshot: &SnapshotFile) -> Result<()> {
        let target = self.target.describe();
        if !self
            .confirmation
            .confirm(&format!("Confirm drop of {}", target))?
        {
            return Err(RefreshError::aborted(format!("drop of {} not confirmed", target)));
        }

        info!(server = %target, "Dropping old database");
        self.target.drop_database().await?;

        info!(server = %target, "Creating new database");
        self.target.create_database().await?;

        info!(snapshot = %snapshot.name(), "Importing dump");
        self.target.load_snapshot(snapshot).await
    }

    // A missing patch directory means there is nothing to apply.
    fn patches(&self) -> Result<Vec<PatchFile>> {
        match discover_patches(&self.options.patches_dir) {
            Err(RefreshError::Patch(PatchError::DirectoryNotFound { path })) => {
                warn!(dir = %path.display(), "Patch directory not found, no changes applied");
                Ok(Vec::new())
            }
            other => other,
        }
    }
}
