//! `pg_reorg` - online physical reorganization of PostgreSQL tables
//!
//! Rebuilds a table's heap (and optionally reorders it by a clustering
//! key) without holding an exclusive lock for the duration of the copy,
//! by routing concurrent writes through a trigger-fed log table that is
//! drained and replayed onto the new storage before the final swap.
//!
//! # Architecture
//!
//! - [`cli`] - command-line interface
//! - [`connection`] - libpq-style connection parameter resolution
//! - [`session`] - one database connection, no pooling
//! - [`version`] - client/server identity handshake
//! - [`lock`] - the escalating relation-lock acquirer
//! - [`target`] - target table/index data model and enumeration
//! - [`names`] - per-target temporary object naming
//! - [`drain`] - the log drainer
//! - [`cleanup`] - the scoped cleanup guard and fatal-signal registry
//! - [`table_orchestrator`] - the seven-phase rebuild for one table
//! - [`db_orchestrator`] - version handshake and per-table loop for one database
//! - [`all_databases`] - the `--all` driver across every connectable database
//! - [`error`] - error types and handling
//! - [`logging`] - tracing initialization

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod all_databases;
pub mod cleanup;
pub mod cli;
pub mod connection;
pub mod db_orchestrator;
pub mod drain;
pub mod error;
pub mod lock;
pub mod logging;
pub mod names;
pub mod session;
pub mod table_orchestrator;
pub mod target;
pub mod version;

pub use error::{ReorgError, Result};
