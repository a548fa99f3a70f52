//! Database Orchestrator: version handshake, session priming, target
//! enumeration, and the per-table loop for one database.
//!
//! Any SQL failure before target enumeration finishes is reported as a
//! skip (the All-databases Driver treats every error this way); a
//! failure within one table's orchestration aborts the remaining tables
//! in this database and propagates the same way.

use std::time::Duration;

use tracing::info;

use crate::cli::OrderingMode;
use crate::error::{ReorgError, Result};
use crate::session::{require_single_row, Lenient, RecognizedSqlState, Session};
use crate::table_orchestrator;
use crate::target::fetch_targets;
use crate::version::{identity_string, ServerVersion};

/// Parameters for one database's orchestration run.
pub struct DatabaseOptions {
    pub table_filter: Option<String>,
    pub ordering: OrderingMode,
    pub wait_timeout: Duration,
    pub no_analyze: bool,
}

/// Run the version handshake, prime the session, enumerate targets, and
/// orchestrate each one in turn.
///
/// # Errors
///
/// Returns `ReorgError::Skip` if the extension is missing or version
/// strings mismatch. Returns any other `ReorgError` if a later step
/// fails; callers running in `--all` mode should treat every error here
/// as "skip this database and continue" per spec.
pub fn run(session: &mut Session, options: &DatabaseOptions) -> Result<()> {
    let server_version = version_handshake(session)?;

    session.batch_command("SET statement_timeout = 0")?;
    session.batch_command("SET search_path = pg_catalog, pg_temp, public")?;
    session.batch_command("SET client_min_messages = warning")?;

    let targets = fetch_targets(session, options.table_filter.as_deref(), &options.ordering)?;
    info!(dbname = session.dbname(), count = targets.len(), "enumerated targets");

    for target in targets {
        let target_name = target.target_name.clone();
        info!(target = %target_name, "starting rebuild");
        table_orchestrator::run(
            session,
            target,
            options.wait_timeout,
            server_version,
            options.no_analyze,
        )?;
        info!(target = %target_name, "rebuild complete");
    }

    Ok(())
}

/// Execute `select repack.version(), repack.version_sql()` and confirm
/// both exactly equal `"<program_name> <program_version>"`. This
/// byte-compatibility requirement exists because the client and the five
/// row-application templates must agree on wire format.
fn version_handshake(session: &mut Session) -> Result<ServerVersion> {
    match session.query_lenient(
        "SELECT repack.version(), repack.version_sql(), current_setting('server_version_num')",
        &[],
    ) {
        Lenient::Err(error) => {
            if RecognizedSqlState::classify(&error) == Some(RecognizedSqlState::InvalidSchemaName) {
                Err(ReorgError::Skip(
                    "pg_repack is not installed in the database".to_string(),
                ))
            } else {
                Err(error.into())
            }
        }
        Lenient::Ok(rows) => {
            let row = require_single_row(rows, "version handshake")?;
            let expected = identity_string();
            let server_version: String = row.get(0);
            let server_version_sql: String = row.get(1);

            if server_version != expected || server_version_sql != expected {
                return Err(ReorgError::Skip(format!(
                    "version mismatch: client is {expected}, server reports {server_version} / {server_version_sql}"
                )));
            }

            let version_num: String = row.get(2);
            ServerVersion::parse(&version_num)
                .ok_or_else(|| ReorgError::Skip("could not parse server_version_num".to_string()))
        }
    }
}
