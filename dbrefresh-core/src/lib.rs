//! Refresh a local MySQL database from a daily production snapshot and
//! replay a directory of SQL patch files on top of it.

pub mod error;
pub mod logging;
pub mod mysql;
pub mod patch;
pub mod profile;
pub mod progress;
pub mod prompt;
pub mod refresh;
pub mod restore;
pub mod snapshot;

pub use error::{PatchError, RefreshError, RestoreError, Result, SnapshotError};
pub use logging::{LogConfig, LogContext, LogFormat, RunId, init_cli_logging, init_logging};
pub use mysql::{CredentialsFile, MySqlSessions, MysqlClient, MysqlDump};
pub use patch::{
    IgnorableErrorSet, PatchApplier, PatchFile, PatchOutcome, SessionFactory, SkipLogLevel,
    StatementExecutor, StatementFailure, discover_patches, split_statements,
};
pub use profile::ConnectionProfile;
pub use prompt::{Confirmation, StdinConfirmation};
pub use refresh::{RefreshOptions, RefreshReport, Refresher, TargetServer, preflight};
pub use restore::{RedirectRestore, RestoreStrategy, StreamingRestore, detect_restore_strategy};
pub use snapshot::{SnapshotFile, SnapshotSource, SnapshotStore};
