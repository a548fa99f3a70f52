//! Table Orchestrator: the seven-phase rebuild for one table.
//!
//! Phases strictly serialize; no phase N begins until phase N-1 has
//! committed. A failure in phases 2-6 (after the cleanup guard has been
//! registered) triggers the non-fatal cleanup path before the error
//! propagates; a failure in phase 1 before the first DDL succeeds leaves
//! no orphaned guard.

use std::time::Duration;

use tracing::{info, warn};

use crate::cleanup::RebuildGuard;
use crate::drain::{self, repack_apply};
use crate::error::{ReorgError, Result};
use crate::lock;
use crate::names;
use crate::session::{require_single_row, Session};
use crate::target::{fetch_indexes, TargetTable};
use crate::version::ServerVersion;

/// Run all seven phases for one target table.
///
/// # Errors
///
/// Returns an error if any phase fails (phase 7 / ANALYZE is an
/// exception: its failure is logged and ignored, per spec).
pub fn run(
    session: &mut Session,
    target: TargetTable,
    wait_timeout: Duration,
    server_version: ServerVersion,
    no_analyze: bool,
) -> Result<()> {
    let guard = phase1_setup(session, &target, wait_timeout, server_version)?;

    let result = (|| -> Result<()> {
        let captured_vxids = phase2_copy(session, &target)?;
        phase3_indexes(session, &target)?;
        phase4_drain(session, &target, &captured_vxids)?;
        phase5_swap(session, &target, wait_timeout, server_version)?;
        phase6_drop(session, &target)?;
        Ok(())
    })();

    match result {
        Ok(()) => guard.dismiss(),
        Err(err) => {
            if let Err(cleanup_err) = guard.release_with_cleanup(session) {
                warn!(error = %cleanup_err, target = %target.target_name, "cleanup after failed rebuild also failed");
            }
            return Err(err);
        }
    }

    if !no_analyze {
        phase7_analyze(session, &target);
    }

    Ok(())
}

/// Phase 1 — Setup. Acquires the relation lock, validates there is no
/// conflicting trigger, creates the helper type/log/trigger, disables
/// autovacuum on the log table, commits, and registers the cleanup
/// guard. The guard is registered *after* the first DDL succeeds, so no
/// orphan callback exists if setup itself fails before anything was
/// created.
fn phase1_setup(
    session: &mut Session,
    target: &TargetTable,
    wait_timeout: Duration,
    server_version: ServerVersion,
) -> Result<RebuildGuard> {
    let relid = target.target_oid.to_string();
    lock::acquire(session, &relid, &target.lock_table, wait_timeout, server_version)?;

    let conflicting = session.query(
        "SELECT * FROM repack.conflicted_triggers($1)",
        &[&target.target_oid],
    )?;
    if !conflicting.is_empty() {
        session.batch_command("ROLLBACK")?;
        return Err(ReorgError::Precondition(format!(
            "{} has a BEFORE trigger sorting after z_repack_trigger",
            target.target_name
        )));
    }

    session.batch_command(&target.create_pktype)?;
    let guard = RebuildGuard::register(target.target_name.clone(), target.target_oid);

    session.batch_command(&target.create_log)?;
    session.batch_command(&target.create_trigger)?;
    session.batch_command(&target.enable_trigger)?;

    session.command("SELECT repack.disable_autovacuum($1)", &[&names::log_table(target.target_oid)])?;

    session.batch_command("COMMIT")?;
    Ok(guard)
}

/// Phase 2 — Copy. Runs inside `SERIALIZABLE` isolation: between the
/// start of `CREATE TABLE AS SELECT` and the snapshot capture, any row
/// seen by the copy must not also be observable via the log, or rows
/// would be duplicated. Returns the captured VXID snapshot for the Log
/// Drainer (Phase 4).
fn phase2_copy(session: &mut Session, target: &TargetTable) -> Result<Vec<String>> {
    session.batch_command("BEGIN ISOLATION LEVEL SERIALIZABLE")?;

    let maintenance_work_mem: String = {
        let rows = session.query("SELECT current_setting('maintenance_work_mem')", &[])?;
        require_single_row(rows, "maintenance_work_mem")?.get(0)
    };
    session.batch_command(&format!("SET LOCAL work_mem = '{maintenance_work_mem}'"))?;

    if target.create_table == target.base_create_table {
        // No ORDER BY: shared seqscan cursors can produce a
        // non-deterministic row order and defeat the compaction intent.
        session.batch_command("SET LOCAL synchronize_seqscans = off")?;
    }

    // Captured before the DELETE below: rows arriving between trigger
    // installation and this point must be picked up by exactly one of
    // {delete-then-direct-copy, log drain}, never both.
    let captured_vxids = capture_vxid_snapshot(session)?;

    session.batch_command(&target.delete_log)?;

    session.batch_command(&target.create_table)?;
    if let Some(drop_columns) = &target.drop_columns {
        session.batch_command(drop_columns)?;
    }

    session.command(
        "SELECT repack.disable_autovacuum($1)",
        &[&names::shadow_table(target.target_oid)],
    )?;

    session.batch_command("COMMIT")?;
    Ok(captured_vxids)
}

/// Capture the list of virtual transaction IDs alive right now, excluding
/// ourselves and the spurious `('1/1', '-1/0')` bgwriter entry seen on
/// newly promoted standbys.
fn capture_vxid_snapshot(session: &mut Session) -> Result<Vec<String>> {
    let rows = session.query(
        "SELECT repack.array_accum(virtualtransaction) FROM pg_locks \
         WHERE locktype = 'virtualxid' AND pid <> pg_backend_pid() \
           AND virtualtransaction NOT IN ('1/1', '-1/0')",
        &[],
    )?;
    let row = require_single_row(rows, "captured vxids")?;
    Ok(row.try_get::<_, Option<Vec<String>>>(0)?.unwrap_or_default())
}

/// Phase 3 — Indexes. Built sequentially on one connection; invalid
/// indexes are skipped with a warning rather than rebuilt.
fn phase3_indexes(session: &mut Session, target: &TargetTable) -> Result<()> {
    let indexes = fetch_indexes(session, target.target_oid)?;
    for index in indexes {
        if !index.indisvalid {
            warn!(index = %index.indexdef, "skipping invalid index");
            continue;
        }
        session.batch_command(&index.create_index)?;
    }
    Ok(())
}

/// Phase 4 — Drain. Delegates to the Log Drainer.
fn phase4_drain(session: &mut Session, target: &TargetTable, captured_vxids: &[String]) -> Result<()> {
    drain::drain(session, target, captured_vxids)
}

/// Phase 5 — Swap. Re-acquires the relation lock, flushes any remaining
/// log rows in one unbounded `repack_apply` call, then atomically
/// redirects the target name to the shadow storage.
fn phase5_swap(
    session: &mut Session,
    target: &TargetTable,
    wait_timeout: Duration,
    server_version: ServerVersion,
) -> Result<()> {
    let relid = target.target_oid.to_string();
    lock::acquire(session, &relid, &target.lock_table, wait_timeout, server_version)?;

    repack_apply(session, target, 0)?;
    session.command("SELECT repack.repack_swap($1)", &[&target.target_oid])?;
    session.batch_command("COMMIT")?;
    Ok(())
}

/// Phase 6 — Drop. Removes the temporary objects and pops the cleanup
/// guard (the guard's `dismiss` issues no further SQL since this call
/// already did).
fn phase6_drop(session: &mut Session, target: &TargetTable) -> Result<()> {
    session.batch_command("BEGIN ISOLATION LEVEL READ COMMITTED")?;
    session.command("SELECT repack.repack_drop($1)", &[&target.target_oid])?;
    session.batch_command("COMMIT")?;
    Ok(())
}

/// Phase 7 — Analyze. Optional and non-fatal: a failure here is logged
/// and ignored, never rolled back, since all earlier work already
/// committed.
fn phase7_analyze(session: &mut Session, target: &TargetTable) {
    if let Err(err) = session.batch_command(&format!("ANALYZE {}", target.target_name)) {
        warn!(error = %err, target = %target.target_name, "ANALYZE failed, ignoring");
    } else {
        info!(target = %target.target_name, "analyze complete");
    }
}
