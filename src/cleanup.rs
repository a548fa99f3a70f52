//! Cleanup Registry.
//!
//! Modeled as a scoped guard (`RebuildGuard`) rather than a raw push/pop
//! stack: acquiring one table's temporary server-side objects (after
//! Phase 1's first DDL succeeds) returns a guard whose release path
//! invokes `repack.repack_drop`. Release is idempotent from the server's
//! point of view (the server implements it with an advisory lock on the
//! helper type's OID), so a guard may be released exactly once by either
//! the happy path (Phase 6) or the non-fatal error path.
//!
//! A lightweight global registry (just names/OIDs, no connections) backs
//! the fatal-signal banner: on SIGINT/SIGTERM we must not touch the
//! database (the connection's state under a signal is unknown), so the
//! handler only reports what was left outstanding.

use std::sync::{LazyLock, Mutex};

use tracing::warn;

use crate::error::Result;
use crate::session::Session;

/// One outstanding rebuild, tracked only for the fatal-signal banner.
#[derive(Debug, Clone)]
pub struct PendingCleanup {
    pub target_name: String,
    pub target_oid: i64,
}

static REGISTRY: LazyLock<Mutex<Vec<PendingCleanup>>> = LazyLock::new(|| Mutex::new(Vec::new()));

fn deregister(target_oid: i64) {
    if let Ok(mut registry) = REGISTRY.lock() {
        registry.retain(|p| p.target_oid != target_oid);
    }
}

/// Snapshot of all outstanding rebuilds, for the fatal-signal banner.
#[must_use]
pub fn outstanding() -> Vec<PendingCleanup> {
    REGISTRY.lock().map(|r| r.clone()).unwrap_or_default()
}

/// Print the fatal-signal banner and do nothing else: the connection's
/// state under a signal is unknown, so we must not issue any SQL here.
pub fn fatal_banner() {
    let pending = outstanding();
    if pending.is_empty() {
        eprintln!("pg-reorg: interrupted");
        return;
    }
    eprintln!(
        "pg-reorg: interrupted with {} rebuild(s) left outstanding; re-run pg-reorg against the same table(s) to clean up temporary objects:",
        pending.len()
    );
    for p in &pending {
        eprintln!("  {} (oid {})", p.target_name, p.target_oid);
    }
}

/// A guard over one table's outstanding temporary objects (log table,
/// shadow table, helper type, trigger). Registered after Phase 1's first
/// DDL succeeds, so no orphan callback exists if setup fails before
/// anything was created.
pub struct RebuildGuard {
    target_name: String,
    target_oid: i64,
    released: bool,
}

impl RebuildGuard {
    /// Register a new outstanding rebuild.
    #[must_use]
    pub fn register(target_name: impl Into<String>, target_oid: i64) -> Self {
        let target_name = target_name.into();
        if let Ok(mut registry) = REGISTRY.lock() {
            registry.push(PendingCleanup {
                target_name: target_name.clone(),
                target_oid,
            });
        }
        Self {
            target_name,
            target_oid,
            released: false,
        }
    }

    /// Release after the happy-path Phase 6 has already called
    /// `repack_drop` and committed. No further SQL is issued here.
    pub fn dismiss(mut self) {
        deregister(self.target_oid);
        self.released = true;
    }

    /// Non-fatal cleanup: reconnect first if the error that triggered
    /// cleanup left the connection unusable, roll back any open
    /// transaction (ignoring the outcome), then call `repack.repack_drop`
    /// to remove the shadow table, log table, helper type, and trigger.
    ///
    /// # Errors
    ///
    /// Returns an error if reconnecting or `repack_drop` itself fails
    /// (the rollback's outcome is intentionally ignored per spec).
    pub fn release_with_cleanup(mut self, session: &mut Session) -> Result<()> {
        if !session.is_ok() {
            session.reconnect()?;
        }
        let _ = session.batch_command("ROLLBACK");
        let result = session.command("SELECT repack.repack_drop($1)", &[&self.target_oid]);
        deregister(self.target_oid);
        self.released = true;
        result.map(|_| ())
    }
}

impl Drop for RebuildGuard {
    fn drop(&mut self) {
        if !self.released {
            deregister(self.target_oid);
            warn!(
                target_name = %self.target_name,
                target_oid = self.target_oid,
                "rebuild guard dropped without explicit release"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_adds_to_outstanding() {
        let guard = RebuildGuard::register("public.t", 12345);
        assert!(outstanding().iter().any(|p| p.target_oid == 12345));
        guard.dismiss();
        assert!(!outstanding().iter().any(|p| p.target_oid == 12345));
    }

    #[test]
    fn drop_without_release_deregisters_and_warns() {
        {
            let _guard = RebuildGuard::register("public.u", 99999);
            assert!(outstanding().iter().any(|p| p.target_oid == 99999));
        }
        assert!(!outstanding().iter().any(|p| p.target_oid == 99999));
    }
}
