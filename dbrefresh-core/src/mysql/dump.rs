//! Snapshot source backed by `mysqldump`.

use crate::error::{Result, SnapshotError};
use crate::mysql::CredentialsFile;
use crate::profile::ConnectionProfile;
use crate::progress::{COPY_BUFFER_BYTES, byte_progress};
use crate::snapshot::SnapshotSource;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{info, warn};

pub const DEFAULT_DUMP_ARGS: &[&str] = &["--single-transaction", "--column-statistics=0"];

/// Exports the origin database with `mysqldump`
pub struct MysqlDump {
    program: String,
    args: Vec<String>,
    origin: ConnectionProfile,
}

impl MysqlDump {
    pub fn new(program: impl Into<String>, args: Vec<String>, origin: ConnectionProfile) -> Self {
        Self {
            program: program.into(),
            args,
            origin,
        }
    }

    /// Argument vector after the credentials option
    pub fn arguments(&self) -> Vec<String> {
        let mut args = self.args.clone();
        args.push(self.origin.database.clone());
        args
    }

    async fn stream_into(
        &self,
        credentials: &CredentialsFile,
        partial: &Path,
        expected_bytes: u64,
    ) -> Result<()> {
        let mut child = Command::new(&self.program)
            .arg(credentials.defaults_arg())
            .args(self.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                SnapshotError::acquisition_failed(format!("failed to start {}: {}", self.program, e))
            })?;
        let mut stdout = child.stdout.take().ok_or_else(|| {
            SnapshotError::acquisition_failed(format!("{} stdout was not captured", self.program))
        })?;

        let mut output = tokio::fs::File::create(partial).await?;
        let progress = byte_progress(expected_bytes, format!("dump {}", self.origin.host));
        let mut buffer = vec![0u8; COPY_BUFFER_BYTES];
        loop {
            let read = stdout.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            output.write_all(&buffer[..read]).await?;
            progress.inc(read as u64);
        }
        output.flush().await?;
        output.sync_all().await?;

        let status = child.wait().await?;
        if !status.success() {
            progress.abandon();
            return Err(SnapshotError::acquisition_failed(format!(
                "{} exited with {}",
                self.program, status
            ))
            .into());
        }
        progress.finish_and_clear();
        Ok(())
    }
}

/// Path the dump is streamed to before it is complete
pub fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

#[async_trait]
impl SnapshotSource for MysqlDump {
    async fn export(&self, destination: &Path, expected_bytes: u64) -> Result<()> {
        info!(
            origin = %self.origin,
            destination = %destination.display(),
            "Exporting origin database"
        );
        let partial = partial_path(destination);
        let credentials = CredentialsFile::write(&self.origin)?;

        let result = self.stream_into(&credentials, &partial, expected_bytes).await;
        if let Err(e) = credentials.remove() {
            warn!(error = %e, "Failed to remove dump credentials file");
        }

        match result {
            Ok(()) => {
                tokio::fs::rename(&partial, destination).await?;
                Ok(())
            }
            Err(e) => {
                // a half-written dump must not be mistaken for today's snapshot
                if let Err(remove_err) = tokio::fs::remove_file(&partial).await {
                    if remove_err.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %partial.display(), error = %remove_err, "Failed to remove partial dump");
                    }
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RefreshError;
    use tempfile::TempDir;

    fn origin() -> ConnectionProfile {
        ConnectionProfile {
            env: "PROD".to_string(),
            host: "db.example".to_string(),
            database: "shop".to_string(),
            user: "reader".to_string(),
            password: "pw".to_string(),
            port: 3306,
        }
    }

    fn default_args() -> Vec<String> {
        DEFAULT_DUMP_ARGS.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_arguments_end_with_database() {
        let dump = MysqlDump::new("mysqldump", default_args(), origin());
        assert_eq!(
            dump.arguments(),
            vec!["--single-transaction", "--column-statistics=0", "shop"]
        );
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("dumps/2024-01-01-dump.sql")),
            PathBuf::from("dumps/2024-01-01-dump.sql.part")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_export_is_renamed() {
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("2024-01-01-dump.sql");
        // `echo` prints its arguments, which stands in for dump output
        let dump = MysqlDump::new("echo", vec!["-- dump of".to_string()], origin());

        dump.export(&destination, 1024).await.unwrap();

        let contents = std::fs::read_to_string(&destination).unwrap();
        assert!(contents.starts_with("--defaults-file="));
        assert!(contents.trim_end().ends_with("-- dump of shop"));
        assert!(!partial_path(&destination).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_export_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("2024-01-01-dump.sql");
        let dump = MysqlDump::new("false", Vec::new(), origin());

        let result = dump.export(&destination, 1024).await;

        assert!(matches!(
            result,
            Err(RefreshError::Snapshot(SnapshotError::AcquisitionFailed { .. }))
        ));
        assert!(!destination.exists());
        assert!(!partial_path(&destination).exists());
    }

    #[tokio::test]
    async fn test_missing_binary_is_acquisition_failure() {
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("2024-01-01-dump.sql");
        let dump = MysqlDump::new("dbrefresh-no-such-dump", Vec::new(), origin());

        let result = dump.export(&destination, 1024).await;
        assert!(matches!(
            result,
            Err(RefreshError::Snapshot(SnapshotError::AcquisitionFailed { .. }))
        ));
    }
}
