//! All-databases Driver.
//!
//! Enumerates every connectable database from a bootstrap connection,
//! then runs the Database Orchestrator against each one in turn. No
//! per-database failure aborts the run: it is reported and the driver
//! moves on to the next database.

use tracing::{info, warn};

use crate::connection::ConnectionConfig;
use crate::db_orchestrator::{self, DatabaseOptions};
use crate::error::Result;
use crate::session::Session;

/// Connect to the bootstrap `postgres` database, list every database
/// with `datallowconn`, and run the Database Orchestrator against each.
///
/// # Errors
///
/// Returns an error only if the bootstrap connection or the database
/// listing query itself fails; individual database failures are caught
/// and printed instead of propagated.
pub fn run(config: &ConnectionConfig, options: &DatabaseOptions) -> Result<()> {
    let databases = list_databases(config)?;
    info!(count = databases.len(), "found databases");

    for dbname in databases {
        match Session::connect(config, &dbname) {
            Ok(mut session) => match db_orchestrator::run(&mut session, options) {
                Ok(()) => info!(database = %dbname, "done"),
                Err(error) => {
                    warn!(database = %dbname, error = %error, "skipped");
                    eprintln!("pg-reorg: {dbname} skipped: {error}");
                }
            },
            Err(error) => {
                warn!(database = %dbname, error = %error, "could not connect, skipping");
                eprintln!("pg-reorg: {dbname} skipped: {error}");
            }
        }
    }

    Ok(())
}

/// List every database this role may connect to, ordered by name. Uses
/// a short-lived bootstrap connection to the `postgres` database, which
/// is disconnected before any per-database orchestration begins.
fn list_databases(config: &ConnectionConfig) -> Result<Vec<String>> {
    let mut bootstrap = Session::connect(config, "postgres")?;
    let rows = bootstrap.query(
        "SELECT datname FROM pg_database WHERE datallowconn ORDER BY datname",
        &[],
    )?;
    let names = rows.iter().map(|row| row.get::<_, String>(0)).collect();
    bootstrap.disconnect();
    Ok(names)
}
