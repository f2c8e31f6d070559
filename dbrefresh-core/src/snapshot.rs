//! Local cache of daily production snapshots.
//!
//! A `*.sql` file in the snapshot directory is current when its timestamp
//! falls on today's local date. Without one, a lookup triggers exactly one
//! acquisition. Old snapshots are never removed here.

use crate::error::{Result, SnapshotError};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Progress estimate used when there is no earlier snapshot to size from
pub const FALLBACK_SNAPSHOT_BYTES: u64 = 1000 * 1024 * 1024;

/// A full export sitting in the snapshot directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotFile {
    pub path: PathBuf,
    /// Time the dump finished writing the file
    pub created: DateTime<Local>,
    pub size_bytes: u64,
}

impl SnapshotFile {
    pub fn from_path(path: &Path) -> Result<Self> {
        let metadata = std::fs::metadata(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            created: DateTime::<Local>::from(metadata.modified()?),
            size_bytes: metadata.len(),
        })
    }

    /// Local calendar date the snapshot belongs to
    pub fn date(&self) -> NaiveDate {
        self.created.date_naive()
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn size_mb(&self) -> u64 {
        self.size_bytes / (1024 * 1024)
    }
}

/// File name a snapshot taken on `date` is written under
pub fn snapshot_file_name(date: NaiveDate) -> String {
    format!("{}-dump.sql", date.format("%Y-%m-%d"))
}

/// Produces a full export of the origin database
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Write a complete export to `destination`. `expected_bytes` only sizes progress output.
    async fn export(&self, destination: &Path, expected_bytes: u64) -> Result<()>;
}

/// Snapshot directory plus the source used to refill it
pub struct SnapshotStore {
    dir: PathBuf,
    source: Arc<dyn SnapshotSource>,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>, source: Arc<dyn SnapshotSource>) -> Self {
        Self {
            dir: dir.into(),
            source,
        }
    }

    /// All candidate snapshots; a missing directory is treated as empty
    pub fn list(&self) -> Result<Vec<SnapshotFile>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut snapshots = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "sql") {
                snapshots.push(SnapshotFile::from_path(&path)?);
            }
        }
        Ok(snapshots)
    }

    pub fn newest(&self) -> Result<Option<SnapshotFile>> {
        Ok(self.list()?.into_iter().max_by_key(|s| s.created))
    }

    /// Newest snapshot whose timestamp falls on `day`
    pub fn dated(&self, day: NaiveDate) -> Result<Option<SnapshotFile>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|s| s.date() == day)
            .max_by_key(|s| s.created))
    }

    /// Return today's snapshot, acquiring one first if needed
    pub async fn current_snapshot(&self) -> Result<SnapshotFile> {
        let mut acquired = false;
        loop {
            let today = Local::now().date_naive();
            if let Some(snapshot) = self.dated(today)? {
                debug!(snapshot = %snapshot.path.display(), "Using today's snapshot");
                return Ok(snapshot);
            }
            if acquired {
                return Err(SnapshotError::StillStale {
                    dir: self.dir.clone(),
                    date: today.to_string(),
                }
                .into());
            }

            if let Some(snapshot) = self.newest()? {
                info!(
                    snapshot = %snapshot.name(),
                    date = %snapshot.date(),
                    "Newest snapshot is not from today"
                );
            }
            self.acquire_snapshot().await?;
            acquired = true;
        }
    }

    /// Export a new snapshot named after today's date. Returns its path.
    pub async fn acquire_snapshot(&self) -> Result<PathBuf> {
        let expected_bytes = self
            .newest()?
            .map_or(FALLBACK_SNAPSHOT_BYTES, |s| s.size_bytes);

        tokio::fs::create_dir_all(&self.dir).await?;
        let destination = self
            .dir
            .join(snapshot_file_name(Local::now().date_naive()));

        info!(
            destination = %destination.display(),
            expected_mb = expected_bytes / (1024 * 1024),
            "Today's dump not found, downloading"
        );
        self.source.export(&destination, expected_bytes).await?;
        Ok(destination)
    }
}
