//! MySQL-specific adapters.
//!
//! The dump and restore tools are run as external processes with argument
//! vectors. Credentials reach them through a transient option file, never the
//! command line. Patch statements go through an sqlx connection.

pub mod client;
pub mod credentials;
pub mod dump;
pub mod session;

pub use client::{MysqlClient, quote_identifier};
pub use credentials::CredentialsFile;
pub use dump::MysqlDump;
pub use session::MySqlSessions;

use std::process::Stdio;
use tokio::process::Command;

/// Check whether `program --version` runs successfully
pub async fn tool_available(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .is_ok_and(|status| status.success())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_tool_is_unavailable() {
        assert!(!tool_available("dbrefresh-no-such-tool").await);
    }
}
