//! sqlx-backed sessions for the patch applier.

use crate::error::{PatchError, Result};
use crate::patch::{SessionFactory, StatementExecutor, StatementFailure};
use crate::profile::ConnectionProfile;
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlDatabaseError};
use sqlx::{ConnectOptions, Connection, Executor};
use tracing::debug;

/// Opens one connection to the target database per patch file
pub struct MySqlSessions {
    options: MySqlConnectOptions,
}

impl MySqlSessions {
    pub fn new(target: &ConnectionProfile) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&target.host)
            .port(target.port)
            .username(&target.user)
            .password(&target.password)
            .database(&target.database)
            // keep the server's own sql_mode and time zone, as the mysql client does
            .pipes_as_concat(false)
            .no_engine_substitution(false)
            .timezone(None::<String>);
        Self { options }
    }
}

#[async_trait]
impl SessionFactory for MySqlSessions {
    async fn open(&self) -> Result<Box<dyn StatementExecutor>> {
        let mut conn = self
            .options
            .connect()
            .await
            .map_err(|e| PatchError::Connection {
                message: e.to_string(),
            })?;

        // statements of one file share a transaction until the final commit
        Executor::execute(&mut conn, "SET autocommit = 0")
            .await
            .map_err(|e| PatchError::Connection {
                message: e.to_string(),
            })?;

        debug!("Opened patch session");
        Ok(Box::new(MySqlSession { conn: Some(conn) }))
    }
}

struct MySqlSession {
    conn: Option<MySqlConnection>,
}

impl MySqlSession {
    fn connection(&mut self) -> std::result::Result<&mut MySqlConnection, StatementFailure> {
        self.conn.as_mut().ok_or_else(|| StatementFailure {
            code: None,
            message: "session already closed".to_string(),
        })
    }
}

#[async_trait]
impl StatementExecutor for MySqlSession {
    async fn execute(&mut self, statement: &str) -> std::result::Result<(), StatementFailure> {
        let conn = self.connection()?;
        // no bind arguments, so the statement goes over the text protocol unprepared
        Executor::execute(conn, statement)
            .await
            .map(|_| ())
            .map_err(statement_failure)
    }

    async fn commit(&mut self) -> std::result::Result<(), StatementFailure> {
        let conn = self.connection()?;
        Executor::execute(&mut *conn, "COMMIT")
            .await
            .map_err(statement_failure)?;
        if let Some(conn) = self.conn.take() {
            conn.close().await.map_err(statement_failure)?;
        }
        Ok(())
    }
}

/// Extract the MySQL error number from a driver error, when there is one
pub fn statement_failure(error: sqlx::Error) -> StatementFailure {
    let code = match &error {
        sqlx::Error::Database(db) => db
            .try_downcast_ref::<MySqlDatabaseError>()
            .map(MySqlDatabaseError::number),
        _ => None,
    };
    StatementFailure {
        code,
        message: error.to_string(),
    }
}
