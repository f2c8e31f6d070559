//! Database connection profiles.
//!
//! A profile is read from `<ENV>_DATABASE_{HOST,NAME,USER,PASS,PORT}` once at
//! startup and handed to each component by reference.

use crate::error::{RefreshError, Result};
use serde::Serialize;
use std::fmt;

/// Connection details for one MySQL server and schema
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionProfile {
    /// Environment name the profile was loaded from (e.g. `LOCAL`)
    pub env: String,
    pub host: String,
    pub database: String,
    pub user: String,
    #[serde(skip)]
    pub password: String,
    pub port: u16,
}

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_DATABASE: &str = "default";
pub const DEFAULT_USER: &str = "root";
pub const DEFAULT_PORT: u16 = 3306;

impl ConnectionProfile {
    /// Load a profile from the process environment
    pub fn from_env(env: &str) -> Result<Self> {
        Self::from_lookup(env, |key| std::env::var(key).ok())
    }

    /// Load a profile through an arbitrary variable lookup, applying defaults for unset keys
    pub fn from_lookup<F>(env: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |field: &str| lookup(&format!("{}_DATABASE_{}", env, field));

        let port = match var("PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
                RefreshError::config(format!("{}_DATABASE_PORT is not a valid port: {}", env, raw))
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            env: env.to_string(),
            host: var("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            database: var("NAME").unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            user: var("USER").unwrap_or_else(|| DEFAULT_USER.to_string()),
            password: var("PASS").unwrap_or_default(),
            port,
        })
    }
}

// Password stays out of logs and panics.
impl fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("env", &self.env)
            .field("host", &self.host)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .field("port", &self.port)
            .finish()
    }
}

impl fmt::Display for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}
