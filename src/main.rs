//! CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use pg_reorg::all_databases;
use pg_reorg::cleanup;
use pg_reorg::cli::Options;
use pg_reorg::connection::{ConnectionConfig, ConnectionOverrides};
use pg_reorg::db_orchestrator::{self, DatabaseOptions};
use pg_reorg::error::ReorgError;
use pg_reorg::logging;
use pg_reorg::session::Session;
use tracing::error;

fn main() -> ExitCode {
    let options = Options::parse();

    if let Err(err) = logging::init_logging(options.verbose, options.quiet) {
        eprintln!("pg-reorg: failed to initialize logging: {err}");
        return ExitCode::FAILURE;
    }

    if let Err(err) = options.validate() {
        error!("{err}");
        return ExitCode::FAILURE;
    }

    ctrlc::set_handler(|| {
        cleanup::fatal_banner();
        std::process::exit(130);
    })
    .expect("failed to install signal handler");

    match run(&options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if err.is_skip() => {
            eprintln!("pg-reorg: {} skipped: {err}", options.dbname);
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(options: &Options) -> Result<(), ReorgError> {
    let overrides = ConnectionOverrides {
        host: options.host.clone(),
        port: options.port.clone(),
        user: options.user.clone(),
    };
    let config = ConnectionConfig::resolve(&overrides);

    let database_options = DatabaseOptions {
        table_filter: options.table.clone(),
        ordering: options.ordering_mode(),
        wait_timeout: std::time::Duration::from_secs(options.wait_timeout),
        no_analyze: options.no_analyze,
    };

    if options.all {
        all_databases::run(&config, &database_options)
    } else {
        let mut session = Session::connect(&config, &options.dbname)?;
        db_orchestrator::run(&mut session, &database_options)
    }
}
