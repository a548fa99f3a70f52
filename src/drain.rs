//! Log Drainer.
//!
//! Repeatedly applies captured change-log rows to the shadow table until
//! the log is empty *and* every pre-existing writer (identified by its
//! virtual transaction ID at snapshot time) has committed. Cardinality of
//! alive VXIDs is monotonically non-increasing and the server creates no
//! new members of the captured set, so the drain is guaranteed to
//! terminate.

use std::time::Duration;

use tracing::info;

use crate::error::Result;
use crate::session::{require_single_row, Session};
use crate::target::TargetTable;

/// Maximum log rows moved into the shadow table per `repack_apply` call.
/// Bounded deliberately so a crash mid-drain leaves limited redo work.
pub const APPLY_COUNT: i64 = 1000;

/// Move up to `limit` log rows into the shadow table in one transaction.
/// `limit == 0` means unbounded within this one call (used by the Swap
/// phase to flush whatever remains before re-locking).
///
/// # Errors
///
/// Returns an error if the underlying call fails.
pub fn repack_apply(session: &mut Session, target: &TargetTable, limit: i64) -> Result<i64> {
    let rows = session.query(
        "SELECT repack.repack_apply($1, $2, $3, $4, $5, $6)",
        &[
            &target.sql_peek,
            &target.sql_insert,
            &target.sql_delete,
            &target.sql_update,
            &target.sql_pop,
            &limit,
        ],
    )?;
    let row = require_single_row(rows, "repack_apply")?;
    let applied: i32 = row.get(0);
    Ok(i64::from(applied))
}

/// Of `captured_vxids`, return the `(virtualtransaction, pid)` pairs that
/// are still alive, excluding ourselves.
fn alive_vxids(session: &mut Session, captured_vxids: &[String]) -> Result<Vec<(String, i32)>> {
    let rows = session.query(
        "SELECT virtualtransaction, pid FROM pg_locks \
         WHERE locktype = 'virtualxid' AND pid <> pg_backend_pid() \
           AND virtualtransaction = ANY($1)",
        &[&captured_vxids],
    )?;
    Ok(rows
        .iter()
        .map(|row| (row.get::<_, String>(0), row.get::<_, i32>(1)))
        .collect())
}

/// Run the Log Drainer to convergence: zero rows applied in the last
/// `repack_apply` call and no VXID from `captured_vxids` still alive.
///
/// # Errors
///
/// Returns an error if any query fails.
pub fn drain(session: &mut Session, target: &TargetTable, captured_vxids: &[String]) -> Result<()> {
    let mut last_alive_count: Option<usize> = None;

    loop {
        let applied = repack_apply(session, target, APPLY_COUNT)?;
        if applied > 0 {
            continue;
        }

        let alive = alive_vxids(session, captured_vxids)?;
        if alive.is_empty() {
            return Ok(());
        }

        if last_alive_count != Some(alive.len()) {
            let first_blocking_pid = alive.first().map(|(_, pid)| *pid);
            info!(
                count = alive.len(),
                first_blocking_pid, "waiting for pre-existing writers to commit"
            );
            last_alive_count = Some(alive.len());
        }

        std::thread::sleep(Duration::from_secs(1));
    }
}
