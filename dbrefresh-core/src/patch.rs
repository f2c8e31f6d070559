//! Patch application engine.
//!
//! A patch file is split on `;` and every piece is executed in order over one
//! session. Failures whose error code is in the [`IgnorableErrorSet`] are
//! logged and skipped; anything else aborts the file.
//!
//! The split is purely textual. A `;` inside a string literal, a comment or a
//! stored procedure body will cut the statement in two. Patch authors have to
//! keep statements free of embedded semicolons.

use crate::error::{PatchError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// MySQL error numbers that mean "this change is already in place"
pub const MYSQL_IGNORABLE_ERRORS: &[(&str, u16)] = &[
    ("Duplicate column", 1060),
    ("Duplicate key name", 1061),
    ("Duplicate key name in table", 1022),
    ("Table already exists", 1050),
    ("Query was empty", 1065),
];

/// Error codes that a patch run may skip over
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnorableErrorSet {
    causes: BTreeMap<u16, String>,
}

impl IgnorableErrorSet {
    /// The default MySQL set
    pub fn mysql_defaults() -> Self {
        let causes = MYSQL_IGNORABLE_ERRORS
            .iter()
            .map(|(cause, code)| (*code, cause.to_string()))
            .collect();
        Self { causes }
    }

    /// Extend the set with operator-configured codes
    pub fn with_extra_codes(mut self, codes: &[u16]) -> Self {
        for code in codes {
            self.causes
                .entry(*code)
                .or_insert_with(|| "Configured as ignorable".to_string());
        }
        self
    }

    pub fn contains(&self, code: u16) -> bool {
        self.causes.contains_key(&code)
    }

    pub fn cause(&self, code: u16) -> Option<&str> {
        self.causes.get(&code).map(String::as_str)
    }

    pub fn codes(&self) -> impl Iterator<Item = u16> + '_ {
        self.causes.keys().copied()
    }
}

impl Default for IgnorableErrorSet {
    fn default() -> Self {
        Self::mysql_defaults()
    }
}

/// Split a script on every `;`, keeping empty and trailing pieces
pub fn split_statements(sql: &str) -> Vec<&str> {
    sql.split(';').collect()
}

/// Level at which skipped statements are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipLogLevel {
    Debug,
    Info,
    #[default]
    Warn,
}

impl std::str::FromStr for SkipLogLevel {
    type Err = crate::RefreshError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            _ => Err(crate::RefreshError::validation(format!(
                "Invalid skip log level: {}. Valid levels are: debug, info, warn",
                s
            ))),
        }
    }
}

/// A failed statement as reported by the database driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementFailure {
    /// Server error number, absent for transport or client-side failures
    pub code: Option<u16>,
    pub message: String,
}

impl std::fmt::Display for StatementFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} ({})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

/// One open session against the target database
#[async_trait]
pub trait StatementExecutor: Send {
    /// Execute a single statement as sent, without any rewriting
    async fn execute(&mut self, statement: &str) -> std::result::Result<(), StatementFailure>;

    /// Commit pending work and close the session
    async fn commit(&mut self) -> std::result::Result<(), StatementFailure>;
}

/// Opens a fresh session per patch file
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn StatementExecutor>>;
}

/// A SQL script discovered in the patch directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchFile {
    pub path: PathBuf,
    /// Position in directory enumeration order
    pub position: usize,
}

impl PatchFile {
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// List `*.sql` files in `dir`, non-recursively, in the order the filesystem returns them
pub fn discover_patches(dir: &Path) -> Result<Vec<PatchFile>> {
    let entries = std::fs::read_dir(dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => PatchError::DirectoryNotFound {
            path: dir.to_path_buf(),
        },
        _ => PatchError::DirectoryUnreadable {
            path: dir.to_path_buf(),
            message: e.to_string(),
        },
    })?;

    let mut patches = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_sql = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("sql"));
        if is_sql && path.is_file() {
            patches.push(PatchFile {
                position: patches.len(),
                path,
            });
        }
    }

    debug!(dir = %dir.display(), count = patches.len(), "Discovered patch files");
    Ok(patches)
}

/// A statement that failed with an ignorable code
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedStatement {
    pub index: usize,
    pub code: u16,
    pub cause: String,
}

/// Result of applying one patch file
#[derive(Debug, Clone, Serialize)]
pub struct PatchOutcome {
    pub path: PathBuf,
    pub executed: usize,
    pub skipped: Vec<SkippedStatement>,
}

/// Applies patch files statement by statement
pub struct PatchApplier {
    sessions: Arc<dyn SessionFactory>,
    ignorable: IgnorableErrorSet,
}

impl PatchApplier {
    pub fn new(sessions: Arc<dyn SessionFactory>, ignorable: IgnorableErrorSet) -> Self {
        Self {
            sessions,
            ignorable,
        }
    }

    /// Apply one script. Stops at the first statement whose failure is not ignorable.
    pub async fn apply_script(&self, path: &Path, skip_level: SkipLogLevel) -> Result<PatchOutcome> {
        let sql = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PatchError::Read {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let mut session = self.sessions.open().await?;
        let mut outcome = PatchOutcome {
            path: path.to_path_buf(),
            executed: 0,
            skipped: Vec::new(),
        };

        for (index, statement) in split_statements(&sql).into_iter().enumerate() {
            let failure = match session.execute(statement).await {
                Ok(()) => {
                    outcome.executed += 1;
                    continue;
                }
                Err(failure) => failure,
            };

            match failure.code {
                Some(code) if self.ignorable.contains(code) => {
                    let cause = self.ignorable.cause(code).unwrap_or_default().to_string();
                    log_skip(skip_level, path, index, &failure);
                    outcome.skipped.push(SkippedStatement { index, code, cause });
                }
                code => {
                    error!(
                        file = %path.display(),
                        index,
                        code = ?code,
                        "Statement failed: {}\nQuery:\n{}",
                        failure.message,
                        statement.trim()
                    );
                    return Err(PatchError::Statement {
                        file: path.to_path_buf(),
                        index,
                        code,
                        statement: statement.to_string(),
                        message: failure.message,
                    }
                    .into());
                }
            }
        }

        session.commit().await.map_err(|e| PatchError::Commit {
            file: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Ok(outcome)
    }

    /// Apply patches in the given order, aborting on the first fatal error
    pub async fn apply_all(
        &self,
        patches: &[PatchFile],
        skip_level: SkipLogLevel,
    ) -> Result<Vec<PatchOutcome>> {
        let mut outcomes = Vec::with_capacity(patches.len());
        for patch in patches {
            let outcome = self.apply_script(&patch.path, skip_level).await?;
            info!(
                patch = %patch.name(),
                executed = outcome.executed,
                skipped = outcome.skipped.len(),
                "SQL change imported"
            );
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}

fn log_skip(level: SkipLogLevel, path: &Path, index: usize, failure: &StatementFailure) {
    let file = path.display();
    match level {
        SkipLogLevel::Debug => debug!(%file, index, "Command skipped: {}", failure),
        SkipLogLevel::Info => info!(%file, index, "Command skipped: {}", failure),
        SkipLogLevel::Warn => warn!(%file, index, "Command skipped: {}", failure),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSessions;
    use super::*;
    use crate::RefreshError;
    use tempfile::TempDir;

    fn applier(sessions: &RecordingSessions) -> PatchApplier {
        PatchApplier::new(Arc::new(sessions.clone()), IgnorableErrorSet::mysql_defaults())
    }

    fn write_patch(dir: &TempDir, name: &str, sql: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, sql).unwrap();
        path
    }

    #[test]
    fn test_split_keeps_trailing_empty_piece() {
        let pieces = split_statements("INSERT INTO t VALUES (1);INSERT INTO t VALUES (2);");
        assert_eq!(
            pieces,
            vec!["INSERT INTO t VALUES (1)", "INSERT INTO t VALUES (2)", ""]
        );
    }

    #[test]
    fn test_split_is_not_literal_aware() {
        let pieces = split_statements("INSERT INTO t VALUES ('a;b')");
        assert_eq!(pieces.len(), 2);
    }

    #[test]
    fn test_default_ignorable_codes() {
        let set = IgnorableErrorSet::default();
        let codes: Vec<u16> = set.codes().collect();
        assert_eq!(codes, vec![1022, 1050, 1060, 1061, 1065]);
        assert_eq!(set.cause(1050), Some("Table already exists"));
        assert!(!set.contains(1146));
    }

    #[test]
    fn test_extra_codes_keep_builtin_causes() {
        let set = IgnorableErrorSet::mysql_defaults().with_extra_codes(&[1091, 1050]);
        assert!(set.contains(1091));
        assert_eq!(set.cause(1050), Some("Table already exists"));
    }

    #[test]
    fn test_skip_level_parsing() {
        assert_eq!("INFO".parse::<SkipLogLevel>().unwrap(), SkipLogLevel::Info);
        assert_eq!("warning".parse::<SkipLogLevel>().unwrap(), SkipLogLevel::Warn);
        assert!("trace".parse::<SkipLogLevel>().is_err());
    }

    #[tokio::test]
    async fn test_rerun_of_existing_table_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = write_patch(
            &dir,
            "001_create.sql",
            "CREATE TABLE t (id INT);\nINSERT INTO t VALUES (1);\n",
        );
        let sessions = RecordingSessions::failing(&[("CREATE TABLE t (id INT)", Some(1050))]);

        let outcome = applier(&sessions)
            .apply_script(&path, SkipLogLevel::Warn)
            .await
            .unwrap();

        assert_eq!(outcome.executed, 1);
        let skipped: Vec<u16> = outcome.skipped.iter().map(|s| s.code).collect();
        assert_eq!(skipped, vec![1050, 1065]);
        assert_eq!(sessions.statements().len(), 3);
        assert_eq!(sessions.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_trailing_empty_statement_is_tolerated() {
        let dir = TempDir::new().unwrap();
        let path = write_patch(
            &dir,
            "002_insert.sql",
            "INSERT INTO t VALUES (1);INSERT INTO t VALUES (2);",
        );
        let sessions = RecordingSessions::default();

        let outcome = applier(&sessions)
            .apply_script(&path, SkipLogLevel::Debug)
            .await
            .unwrap();

        assert_eq!(outcome.executed, 2);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].cause, "Query was empty");
    }

    #[tokio::test]
    async fn test_fatal_statement_stops_the_file() {
        let dir = TempDir::new().unwrap();
        let path = write_patch(
            &dir,
            "003_broken.sql",
            "INSERT INTO a VALUES (1);INSERT INTO missing VALUES (2);INSERT INTO c VALUES (3)",
        );
        let sessions =
            RecordingSessions::failing(&[("INSERT INTO missing VALUES (2)", Some(1146))]);

        let err = applier(&sessions)
            .apply_script(&path, SkipLogLevel::Warn)
            .await
            .unwrap_err();

        match err {
            RefreshError::Patch(PatchError::Statement {
                index,
                code,
                statement,
                ..
            }) => {
                assert_eq!(index, 1);
                assert_eq!(code, Some(1146));
                assert_eq!(statement, "INSERT INTO missing VALUES (2)");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            sessions.statements(),
            vec!["INSERT INTO a VALUES (1)", "INSERT INTO missing VALUES (2)"]
        );
        assert_eq!(sessions.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_without_code_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = write_patch(&dir, "004.sql", "SELECT 1");
        let sessions = RecordingSessions::failing(&[("SELECT 1", None)]);

        let result = applier(&sessions).apply_script(&path, SkipLogLevel::Warn).await;
        assert!(matches!(
            result,
            Err(RefreshError::Patch(PatchError::Statement { code: None, .. }))
        ));
    }

    #[tokio::test]
    async fn test_missing_file_is_read_error() {
        let dir = TempDir::new().unwrap();
        let sessions = RecordingSessions::default();

        let result = applier(&sessions)
            .apply_script(&dir.path().join("nope.sql"), SkipLogLevel::Warn)
            .await;
        assert!(matches!(
            result,
            Err(RefreshError::Patch(PatchError::Read { .. }))
        ));
        assert_eq!(sessions.open_count(), 0);
    }

    #[tokio::test]
    async fn test_apply_all_aborts_remaining_files() {
        let dir = TempDir::new().unwrap();
        let first = write_patch(&dir, "a.sql", "DROP TABLE gone");
        let second = write_patch(&dir, "b.sql", "SELECT 2");
        let sessions = RecordingSessions::failing(&[("DROP TABLE gone", Some(1051))]);
        let patches = vec![
            PatchFile { path: first, position: 0 },
            PatchFile { path: second, position: 1 },
        ];

        let result = applier(&sessions).apply_all(&patches, SkipLogLevel::Warn).await;

        assert!(result.is_err());
        assert_eq!(sessions.open_count(), 1);
        assert!(!sessions.statements().contains(&"SELECT 2".to_string()));
    }

    #[test]
    fn test_discover_only_sql_files() {
        let dir = TempDir::new().unwrap();
        write_patch(&dir, "001.sql", "SELECT 1");
        write_patch(&dir, "002.SQL", "SELECT 2");
        write_patch(&dir, "notes.txt", "not sql");
        std::fs::create_dir(dir.path().join("nested.sql")).unwrap();

        let patches = discover_patches(dir.path()).unwrap();
        let mut names: Vec<String> = patches.iter().map(PatchFile::name).collect();
        names.sort();
        assert_eq!(names, vec!["001.sql", "002.SQL"]);
        let mut positions: Vec<usize> = patches.iter().map(|p| p.position).collect();
        positions.sort();
        assert_eq!(positions, vec![0, 1]);
    }

    #[test]
    fn test_discover_missing_directory() {
        let dir = TempDir::new().unwrap();
        let result = discover_patches(&dir.path().join("sql-changes"));
        assert!(matches!(
            result,
            Err(RefreshError::Patch(PatchError::DirectoryNotFound { .. }))
        ));
    }

    #[test]
    fn test_discover_file_instead_of_directory() {
        let dir = TempDir::new().unwrap();
        let file = write_patch(&dir, "001.sql", "SELECT 1");

        let result = discover_patches(&file);
        assert!(matches!(
            result,
            Err(RefreshError::Patch(PatchError::DirectoryUnreadable { .. }))
        ));
    }
}
