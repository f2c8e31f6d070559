//! Target server administration through the `mysql` command line client.

use crate::error::{RestoreError, Result};
use crate::mysql::CredentialsFile;
use crate::profile::ConnectionProfile;
use crate::refresh::TargetServer;
use crate::restore::RestoreStrategy;
use crate::snapshot::SnapshotFile;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Quote a schema name as a MySQL identifier
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Runs the `mysql` client against the target profile
pub struct MysqlClient {
    program: String,
    target: ConnectionProfile,
    credentials: CredentialsFile,
    strategy: Box<dyn RestoreStrategy>,
}

impl MysqlClient {
    /// Write the target credentials file and prepare the client
    pub fn new(
        program: impl Into<String>,
        target: ConnectionProfile,
        strategy: Box<dyn RestoreStrategy>,
    ) -> Result<Self> {
        let credentials = CredentialsFile::write(&target)?;
        Ok(Self {
            program: program.into(),
            target,
            credentials,
            strategy,
        })
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.arg(self.credentials.defaults_arg());
        command
    }

    async fn execute(&self, action: &str, sql: String) -> Result<()> {
        debug!(sql = %sql, "Running {}", action);
        let status = self
            .command()
            .arg("--execute")
            .arg(sql)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| RestoreError::spawn(&self.program, &e))?;
        if !status.success() {
            return Err(RestoreError::command_failed(action, status).into());
        }
        Ok(())
    }

    /// Delete the credentials file
    pub fn cleanup(self) -> Result<()> {
        self.credentials.remove()
    }
}

#[async_trait]
impl TargetServer for MysqlClient {
    fn describe(&self) -> String {
        self.target.to_string()
    }

    async fn drop_database(&self) -> Result<()> {
        let sql = format!(
            "DROP DATABASE IF EXISTS {}",
            quote_identifier(&self.target.database)
        );
        self.execute("Dropping database", sql).await
    }

    async fn create_database(&self) -> Result<()> {
        let sql = format!("CREATE DATABASE {}", quote_identifier(&self.target.database));
        self.execute("Creating database", sql).await
    }

    async fn load_snapshot(&self, snapshot: &SnapshotFile) -> Result<()> {
        let mut command = self.command();
        command.arg("--database").arg(&self.target.database);
        debug!(strategy = self.strategy.name(), "Loading snapshot");
        self.strategy.load(command, snapshot).await
    }
}
