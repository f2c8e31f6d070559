//! Strategies for feeding a snapshot into the restore client.
//!
//! The strategy is picked once at startup from the platform family. Unix
//! streams the file through the client's stdin with a progress bar. Windows
//! hands the file handle over as stdin. Other platforms are rejected.

use crate::error::{RefreshError, RestoreError, Result};
use crate::progress::{COPY_BUFFER_BYTES, byte_progress};
use crate::snapshot::SnapshotFile;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::debug;

#[async_trait]
pub trait RestoreStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run `command` with the snapshot contents on its standard input
    async fn load(&self, command: Command, snapshot: &SnapshotFile) -> Result<()>;
}

/// Pick the loading strategy for the running platform
pub fn detect_restore_strategy() -> Result<Box<dyn RestoreStrategy>> {
    strategy_for(std::env::consts::FAMILY)
}

/// Pick the loading strategy for a platform family (`unix`, `windows`)
pub fn strategy_for(family: &str) -> Result<Box<dyn RestoreStrategy>> {
    match family {
        "unix" => Ok(Box::new(StreamingRestore)),
        "windows" => Ok(Box::new(RedirectRestore)),
        other => Err(RestoreError::UnsupportedPlatform {
            platform: if other.is_empty() {
                std::env::consts::OS.to_string()
            } else {
                other.to_string()
            },
        }
        .into()),
    }
}

fn program_name(command: &Command) -> String {
    command.as_std().get_program().to_string_lossy().into_owned()
}

/// Copies the snapshot into the client's stdin, reporting progress
pub struct StreamingRestore;

#[async_trait]
impl RestoreStrategy for StreamingRestore {
    fn name(&self) -> &'static str {
        "streaming"
    }

    async fn load(&self, mut command: Command, snapshot: &SnapshotFile) -> Result<()> {
        let program = program_name(&command);
        let action = format!("Loading {}", snapshot.name());
        let mut file = tokio::fs::File::open(&snapshot.path).await?;

        let mut child = command
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|e| RestoreError::spawn(&program, &e))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| RefreshError::internal("restore client stdin was not captured"))?;

        let progress = byte_progress(snapshot.size_bytes, snapshot.name());
        let mut buffer = vec![0u8; COPY_BUFFER_BYTES];
        let mut read_error = None;
        let mut copy_error = None;
        loop {
            let read = match file.read(&mut buffer).await {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) => {
                    // stop the client rather than let it load half a snapshot
                    if let Err(kill_err) = child.start_kill() {
                        debug!(error = %kill_err, "Restore client already exited");
                    }
                    read_error = Some(e);
                    break;
                }
            };
            // client exited early; its exit status says more than the broken pipe
            if let Err(e) = stdin.write_all(&buffer[..read]).await {
                copy_error = Some(e);
                break;
            }
            progress.inc(read as u64);
        }
        drop(stdin);

        let status = child.wait().await?;
        if let Some(e) = read_error {
            progress.abandon();
            return Err(e.into());
        }
        if !status.success() {
            progress.abandon();
            return Err(RestoreError::command_failed(action, status).into());
        }
        if let Some(e) = copy_error {
            progress.abandon();
            return Err(e.into());
        }
        progress.finish_and_clear();
        debug!(snapshot = %snapshot.path.display(), "Snapshot streamed into {}", program);
        Ok(())
    }
}

/// Hands the snapshot file to the client as stdin
pub struct RedirectRestore;

#[async_trait]
impl RestoreStrategy for RedirectRestore {
    fn name(&self) -> &'static str {
        "redirect"
    }

    async fn load(&self, mut command: Command, snapshot: &SnapshotFile) -> Result<()> {
        let program = program_name(&command);
        let input = std::fs::File::open(&snapshot.path)?;
        let status = command
            .stdin(Stdio::from(input))
            .status()
            .await
            .map_err(|e| RestoreError::spawn(&program, &e))?;
        if !status.success() {
            return Err(
                RestoreError::command_failed(format!("Loading {}", snapshot.name()), status).into(),
            );
        }
        Ok(())
    }
}
