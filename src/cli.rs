//! Command-line interface.
//!
//! Argument parsing and the one piece of cross-argument validation that
//! must happen before any connection attempt: `--all` and `--table` are
//! mutually exclusive.

use clap::Parser;

use crate::error::{ReorgError, Result};

/// Online physical reorganization of PostgreSQL tables.
#[derive(Debug, Parser)]
#[command(name = "pg-reorg", version, about)]
pub struct Options {
    /// Apply to every connectable database. Mutually exclusive with `--table`.
    #[arg(short = 'a', long = "all")]
    pub all: bool,

    /// Restrict to one relation (qualified name).
    #[arg(short = 't', long = "table", value_name = "TABLE")]
    pub table: Option<String>,

    /// VACUUM-FULL mode: no ORDER BY in the rebuild.
    #[arg(short = 'n', long = "no-order")]
    pub no_order: bool,

    /// Use user ordering instead of the clustering key.
    #[arg(short = 'o', long = "order-by", value_name = "COLS")]
    pub order_by: Option<String>,

    /// Escalation deadline in seconds.
    #[arg(short = 'T', long = "wait-timeout", value_name = "S", default_value_t = 60)]
    pub wait_timeout: u64,

    /// Skip Phase 7 (ANALYZE).
    #[arg(short = 'Z', long = "no-analyze")]
    pub no_analyze: bool,

    /// Database host. Defaults to `PGHOST` or `localhost`.
    #[arg(short = 'h', long = "host", value_name = "HOST")]
    pub host: Option<String>,

    /// Database port. Defaults to `PGPORT` or 5432.
    #[arg(short = 'p', long = "port", value_name = "PORT")]
    pub port: Option<String>,

    /// Connection user. Defaults to `PGUSER`/`USER`.
    #[arg(short = 'U', long = "username", value_name = "USER")]
    pub user: Option<String>,

    /// Increase log verbosity (repeatable).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all but error-level logging.
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    /// Database name.
    pub dbname: String,
}

/// Tri-valued ordering selection derived from `--no-order` / `--order-by`.
///
/// The distinction between "no override" (`Cluster`), "explicit empty
/// override" (`NoOrder`), and "explicit non-empty override" (`Custom`) must
/// be preserved exactly: it gates whether the target enumeration query
/// requires a clustering key to exist (see the Database Orchestrator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderingMode {
    /// No ordering override: use the table's clustering key.
    Cluster,
    /// `--no-order`: VACUUM-FULL mode, no `ORDER BY` at all.
    NoOrder,
    /// `--order-by=<expr>`: use the user-supplied ordering expression.
    Custom(String),
}

impl OrderingMode {
    /// True iff no ordering override was supplied (cluster mode).
    #[must_use]
    pub const fn is_cluster_mode(&self) -> bool {
        matches!(self, Self::Cluster)
    }
}

impl Options {
    /// Validate cross-argument constraints that must be checked before any
    /// connection is attempted.
    ///
    /// # Errors
    ///
    /// Returns `ReorgError::Usage` if `--all` and `--table` are both set.
    pub fn validate(&self) -> Result<()> {
        if self.all && self.table.is_some() {
            return Err(ReorgError::Usage(
                "--all and --table are mutually exclusive".to_string(),
            ));
        }
        Ok(())
    }

    /// Derive the tri-valued ordering mode from `--no-order`/`--order-by`.
    #[must_use]
    pub fn ordering_mode(&self) -> OrderingMode {
        if self.no_order {
            OrderingMode::NoOrder
        } else if let Some(expr) = &self.order_by {
            OrderingMode::Custom(expr.clone())
        } else {
            OrderingMode::Cluster
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> Options {
        let mut full = vec!["pg-reorg"];
        full.extend_from_slice(args);
        Options::parse_from(full)
    }

    #[test]
    fn all_and_table_is_usage_error() {
        let opts = parse(&["--all", "--table", "public.t", "mydb"]);
        assert!(opts.validate().is_err());
    }

    #[test]
    fn table_alone_is_valid() {
        let opts = parse(&["--table", "public.t", "mydb"]);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn no_override_is_cluster_mode() {
        let opts = parse(&["mydb"]);
        assert_eq!(opts.ordering_mode(), OrderingMode::Cluster);
        assert!(opts.ordering_mode().is_cluster_mode());
    }

    #[test]
    fn no_order_flag_is_no_order_mode() {
        let opts = parse(&["--no-order", "mydb"]);
        assert_eq!(opts.ordering_mode(), OrderingMode::NoOrder);
        assert!(!opts.ordering_mode().is_cluster_mode());
    }

    #[test]
    fn order_by_flag_is_custom_mode() {
        let opts = parse(&["--order-by", "lower(email)", "mydb"]);
        assert_eq!(
            opts.ordering_mode(),
            OrderingMode::Custom("lower(email)".to_string())
        );
    }

    #[test]
    fn default_wait_timeout_is_60() {
        let opts = parse(&["mydb"]);
        assert_eq!(opts.wait_timeout, 60);
    }
}
