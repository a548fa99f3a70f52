//! DB Session: one connection, at most one statement in flight.
//!
//! No pooling. `command` fails on any non-OK status; `query_lenient` does
//! not, so callers can inspect the SQLSTATE and decide what to do (used by
//! the Lock Acquirer's retry loop and the version handshake's
//! extension-missing check).

use postgres::error::SqlState;
use postgres::{Client, NoTls, Row};

use crate::connection::ConnectionConfig;
use crate::error::{ReorgError, Result};

/// The two SQLSTATE codes this orchestrator recognizes and branches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognizedSqlState {
    /// `3F000` — schema (the `repack` extension) does not exist.
    InvalidSchemaName,
    /// `57014` — statement was canceled, e.g. by `pg_cancel_backend`.
    QueryCanceled,
}

impl RecognizedSqlState {
    #[must_use]
    pub const fn code(self) -> &'static SqlState {
        match self {
            Self::InvalidSchemaName => &SqlState::INVALID_SCHEMA_NAME,
            Self::QueryCanceled => &SqlState::QUERY_CANCELED,
        }
    }

    /// Classify a `postgres::Error` as one of the two recognized states,
    /// if it matches either.
    #[must_use]
    pub fn classify(error: &postgres::Error) -> Option<Self> {
        let code = error.code()?;
        if *code == SqlState::INVALID_SCHEMA_NAME {
            Some(Self::InvalidSchemaName)
        } else if *code == SqlState::QUERY_CANCELED {
            Some(Self::QueryCanceled)
        } else {
            None
        }
    }
}

/// Outcome of a lenient query/command: either the normal result, or an
/// error the caller must inspect (and decide whether to retry, skip, or
/// propagate as fatal).
pub enum Lenient<T> {
    Ok(T),
    Err(postgres::Error),
}

impl<T> Lenient<T> {
    /// True if the error (if any) matches the given recognized state.
    #[must_use]
    pub fn sqlstate_equals(&self, state: RecognizedSqlState) -> bool {
        match self {
            Self::Ok(_) => false,
            Self::Err(error) => RecognizedSqlState::classify(error) == Some(state),
        }
    }
}

/// One connection to one database.
pub struct Session {
    client: Client,
    config: ConnectionConfig,
    dbname: String,
}

impl Session {
    /// Connect to `dbname` using the resolved connection parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn connect(config: &ConnectionConfig, dbname: &str) -> Result<Self> {
        let conn_str = config.connection_string(dbname);
        let client = Client::connect(&conn_str, NoTls)?;
        Ok(Self {
            client,
            config: config.clone(),
            dbname: dbname.to_string(),
        })
    }

    /// The database name this session is connected to.
    #[must_use]
    pub fn dbname(&self) -> &str {
        &self.dbname
    }

    /// True if the underlying connection is still usable.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        !self.client.is_closed()
    }

    /// Discard the current connection and establish a fresh one against
    /// the same database with the same connection parameters. Used by
    /// the non-fatal cleanup path when the error that triggered cleanup
    /// left the connection unusable.
    ///
    /// # Errors
    ///
    /// Returns an error if the new connection cannot be established.
    pub fn reconnect(&mut self) -> Result<()> {
        let conn_str = self.config.connection_string(&self.dbname);
        self.client = Client::connect(&conn_str, NoTls)?;
        Ok(())
    }

    /// Execute a statement; fail on any error.
    ///
    /// # Errors
    ///
    /// Returns the underlying database error on any failure.
    pub fn command(&mut self, sql: &str, params: &[&(dyn postgres::types::ToSql + Sync)]) -> Result<u64> {
        Ok(self.client.execute(sql, params)?)
    }

    /// Execute a statement made of multiple `;`-separated commands, such as
    /// a `BEGIN; ...; COMMIT;` sequence or DDL with no bind parameters.
    ///
    /// # Errors
    ///
    /// Returns the underlying database error on any failure.
    pub fn batch_command(&mut self, sql: &str) -> Result<()> {
        Ok(self.client.batch_execute(sql)?)
    }

    /// Execute a query and return its rows; fail on any error.
    ///
    /// # Errors
    ///
    /// Returns the underlying database error on any failure.
    pub fn query(&mut self, sql: &str, params: &[&(dyn postgres::types::ToSql + Sync)]) -> Result<Vec<Row>> {
        Ok(self.client.query(sql, params)?)
    }

    /// Execute a query, but do not propagate an error — return it for the
    /// caller to inspect instead.
    pub fn query_lenient(&mut self, sql: &str, params: &[&(dyn postgres::types::ToSql + Sync)]) -> Lenient<Vec<Row>> {
        match self.client.query(sql, params) {
            Ok(rows) => Lenient::Ok(rows),
            Err(error) => Lenient::Err(error),
        }
    }

    /// Execute a command, but do not propagate an error — return it for the
    /// caller to inspect instead. Used by the Lock Acquirer, which must
    /// distinguish `57014` (retry) from everything else (fatal).
    pub fn command_lenient(&mut self, sql: &str, params: &[&(dyn postgres::types::ToSql + Sync)]) -> Lenient<u64> {
        match self.client.execute(sql, params) {
            Ok(count) => Lenient::Ok(count),
            Err(error) => Lenient::Err(error),
        }
    }

    /// Consume and drop the connection.
    pub fn disconnect(self) {
        drop(self);
    }
}

/// Map a query-one-row-expected failure into a precondition error with a
/// descriptive message, used by phases that require exactly one row back.
pub fn require_single_row(rows: Vec<Row>, what: &str) -> Result<Row> {
    let mut iter = rows.into_iter();
    let row = iter
        .next()
        .ok_or_else(|| ReorgError::Precondition(format!("expected one row for {what}, got none")))?;
    Ok(row)
}
