//! Configuration management for the dbrefresh CLI.
//!
//! Values come from defaults, then `.dbrefresh.toml` (or `--config`), then
//! environment variables. Command line flags are applied last in `main`.
//! Connection profiles are never stored in the file; they are read from
//! `<ENV>_DATABASE_*` variables for the configured environment names.

use anyhow::{Context, bail};
use dbrefresh_core::mysql::dump::DEFAULT_DUMP_ARGS;
use dbrefresh_core::{ConnectionProfile, SkipLogLevel};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const DEFAULT_CONFIG_FILE: &str = ".dbrefresh.toml";

/// CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub refresh: RefreshConfig,

    #[serde(default)]
    pub profiles: ProfilesConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Filesystem layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Flat directory of `*.sql` patch files
    #[serde(default = "default_patches_dir")]
    pub patches_dir: PathBuf,

    /// Flat directory of dated snapshot files
    #[serde(default = "default_snapshots_dir")]
    pub snapshots_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            patches_dir: default_patches_dir(),
            snapshots_dir: default_snapshots_dir(),
        }
    }
}

fn default_patches_dir() -> PathBuf {
    PathBuf::from("sql-changes")
}

fn default_snapshots_dir() -> PathBuf {
    PathBuf::from("dumps")
}

/// Refresh behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Drop, recreate and reload the target before patching
    #[serde(default = "default_reset")]
    pub reset: bool,

    /// Level at which skipped statements are logged
    #[serde(default)]
    pub skip_log_level: SkipLogLevel,

    /// Error codes tolerated in addition to the built-in set
    #[serde(default)]
    pub extra_ignored_codes: Vec<u16>,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            reset: default_reset(),
            skip_log_level: SkipLogLevel::default(),
            extra_ignored_codes: Vec::new(),
        }
    }
}

fn default_reset() -> bool {
    true
}

/// Environment names the connection profiles are read from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilesConfig {
    #[serde(default = "default_target_env")]
    pub target_env: String,

    #[serde(default = "default_origin_env")]
    pub origin_env: String,
}

impl Default for ProfilesConfig {
    fn default() -> Self {
        Self {
            target_env: default_target_env(),
            origin_env: default_origin_env(),
        }
    }
}

fn default_target_env() -> String {
    "LOCAL".to_string()
}

fn default_origin_env() -> String {
    "PROD".to_string()
}

/// External client binaries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_mysql")]
    pub mysql: String,

    #[serde(default = "default_mysqldump")]
    pub mysqldump: String,

    /// Arguments passed to the dump tool before the database name
    #[serde(default = "default_dump_args")]
    pub dump_args: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            mysql: default_mysql(),
            mysqldump: default_mysqldump(),
            dump_args: default_dump_args(),
        }
    }
}

fn default_mysql() -> String {
    "mysql".to_string()
}

fn default_mysqldump() -> String {
    "mysqldump".to_string()
}

fn default_dump_args() -> Vec<String> {
    DEFAULT_DUMP_ARGS.iter().map(|arg| arg.to_string()).collect()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration with the following precedence:
    /// 1. Command line arguments (applied by the caller)
    /// 2. Environment variables
    /// 3. Configuration file (`path`, or `.dbrefresh.toml` if present)
    /// 4. Default values
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Config::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    match Config::from_file(default_path) {
                        Ok(config) => config,
                        Err(e) => {
                            warn!("Ignoring config file: {:#}", e);
                            Config::default()
                        }
                    }
                } else {
                    Config::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        debug!(?config, "Configuration loaded");
        Ok(config)
    }

    /// Override values from environment variables
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("DBREFRESH_PATCHES_DIR") {
            self.paths.patches_dir = PathBuf::from(dir);
        }

        if let Some(dir) = lookup("DBREFRESH_SNAPSHOTS_DIR") {
            self.paths.snapshots_dir = PathBuf::from(dir);
        }

        if let Some(reset) = lookup("DBREFRESH_RESET") {
            self.refresh.reset = parse_bool(&reset)
                .with_context(|| format!("DBREFRESH_RESET has an invalid value: {}", reset))?;
        }

        if let Some(level) = lookup("DBREFRESH_SKIP_LOG_LEVEL") {
            self.refresh.skip_log_level = level.parse()?;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.paths.patches_dir.as_os_str().is_empty() {
            bail!("Patch directory cannot be empty");
        }

        if self.paths.snapshots_dir.as_os_str().is_empty() {
            bail!("Snapshot directory cannot be empty");
        }

        let target = self.profiles.target_env.trim();
        let origin = self.profiles.origin_env.trim();
        if target.is_empty() || origin.is_empty() {
            bail!("Profile environment names cannot be empty");
        }
        if target.eq_ignore_ascii_case(origin) {
            bail!(
                "Target and origin profiles must differ, both are {}",
                self.profiles.target_env
            );
        }

        if self.tools.mysql.is_empty() || self.tools.mysqldump.is_empty() {
            bail!("Client tool names cannot be empty");
        }

        Ok(())
    }

    pub fn target_profile(&self) -> anyhow::Result<ConnectionProfile> {
        Ok(ConnectionProfile::from_env(&self.profiles.target_env)?)
    }

    pub fn origin_profile(&self) -> anyhow::Result<ConnectionProfile> {
        Ok(ConnectionProfile::from_env(&self.profiles.origin_env)?)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::TempDir;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.paths.patches_dir, PathBuf::from("sql-changes"));
        assert_eq!(config.paths.snapshots_dir, PathBuf::from("dumps"));
        assert!(config.refresh.reset);
        assert_eq!(config.refresh.skip_log_level, SkipLogLevel::Warn);
        assert_eq!(config.profiles.target_env, "LOCAL");
        assert_eq!(config.profiles.origin_env, "PROD");
        assert_eq!(config.tools.mysql, "mysql");
        assert_eq!(
            config.tools.dump_args,
            vec!["--single-transaction", "--column-statistics=0"]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_file() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("dbrefresh.toml");

        let config_content = r#"
[paths]
patches_dir = "db/changes"

[refresh]
reset = false
skip_log_level = "info"
extra_ignored_codes = [1091]

[profiles]
target_env = "DEV"

[tools]
mysqldump = "mariadb-dump"
dump_args = ["--single-transaction"]
"#;

        let mut file = fs::File::create(&config_path)?;
        file.write_all(config_content.as_bytes())?;

        let config = Config::from_file(&config_path)?;
        assert_eq!(config.paths.patches_dir, PathBuf::from("db/changes"));
        assert_eq!(config.paths.snapshots_dir, PathBuf::from("dumps"));
        assert!(!config.refresh.reset);
        assert_eq!(config.refresh.skip_log_level, SkipLogLevel::Info);
        assert_eq!(config.refresh.extra_ignored_codes, vec![1091]);
        assert_eq!(config.profiles.target_env, "DEV");
        assert_eq!(config.profiles.origin_env, "PROD");
        assert_eq!(config.tools.mysql, "mysql");
        assert_eq!(config.tools.mysqldump, "mariadb-dump");
        assert_eq!(config.tools.dump_args, vec!["--single-transaction"]);

        Ok(())
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = Config::load(Some(&temp_dir.path().join("missing.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_env_overrides() -> anyhow::Result<()> {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("DBREFRESH_PATCHES_DIR", "/srv/patches"),
            ("DBREFRESH_SNAPSHOTS_DIR", "/srv/dumps"),
            ("DBREFRESH_RESET", "no"),
            ("DBREFRESH_SKIP_LOG_LEVEL", "debug"),
        ]))?;

        assert_eq!(config.paths.patches_dir, PathBuf::from("/srv/patches"));
        assert_eq!(config.paths.snapshots_dir, PathBuf::from("/srv/dumps"));
        assert!(!config.refresh.reset);
        assert_eq!(config.refresh.skip_log_level, SkipLogLevel::Debug);
        Ok(())
    }

    #[test]
    fn test_invalid_env_values_rejected() {
        let mut config = Config::default();
        assert!(config.apply_env(env(&[("DBREFRESH_RESET", "maybe")])).is_err());
        assert!(
            config
                .apply_env(env(&[("DBREFRESH_SKIP_LOG_LEVEL", "loud")]))
                .is_err()
        );
    }

    #[test]
    fn test_validate_rejects_same_profiles() {
        let mut config = Config::default();
        config.profiles.origin_env = "local".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.paths.snapshots_dir = PathBuf::new();
        assert!(config.validate().is_err());
    }
}
