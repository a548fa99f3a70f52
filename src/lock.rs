//! Lock Acquirer.
//!
//! Obtains the exclusive relation lock encoded in a target's `lock_table`
//! statement without starving under concurrent writers and without
//! blocking forever. Short, geometrically growing `statement_timeout`
//! windows let the lock request queue briefly then release so waiters
//! share fairly; escalation moves from a polite cancel to a forcible
//! terminate only after the wait has doubled.

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::error::{ReorgError, Result};
use crate::session::{Lenient, RecognizedSqlState, Session};
use crate::version::ServerVersion;

/// Decision produced by the escalation policy: a pure function of
/// `(elapsed, wait_timeout, server_version)`, unit-testable without a
/// live database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationAction {
    /// Keep waiting politely.
    None,
    /// Issue `pg_cancel_backend` against conflicting backends.
    Cancel,
    /// Issue `pg_terminate_backend` against conflicting backends.
    Terminate,
}

/// Pure escalation decision, called once per lock-acquire attempt.
#[must_use]
pub fn escalation_action(
    elapsed: Duration,
    wait_timeout: Duration,
    server_version: ServerVersion,
) -> EscalationAction {
    if elapsed <= wait_timeout {
        return EscalationAction::None;
    }
    if server_version.at_least(ServerVersion::PG_8_4) && elapsed > wait_timeout * 2 {
        EscalationAction::Terminate
    } else {
        EscalationAction::Cancel
    }
}

/// Attempt to acquire the lock encoded by `lock_query` on relation
/// `relid` (a decimal OID string), escalating conflict resolution as the
/// wait grows past `wait_timeout`.
///
/// On success, the transaction started by this call remains open (the
/// caller continues within it); on failure, no transaction is left open.
///
/// # Errors
///
/// Returns `ReorgError::LockFatal` if a non-retryable database error
/// occurs while attempting the lock.
pub fn acquire(
    session: &mut Session,
    relid: &str,
    lock_query: &str,
    wait_timeout: Duration,
    server_version: ServerVersion,
) -> Result<()> {
    let start = Instant::now();
    let mut attempt: u32 = 1;

    loop {
        session.batch_command("BEGIN ISOLATION LEVEL READ COMMITTED")?;

        let elapsed = start.elapsed();
        match escalation_action(elapsed, wait_timeout, server_version) {
            EscalationAction::None => {}
            EscalationAction::Cancel => {
                info!(relid, elapsed_s = elapsed.as_secs(), "canceling conflicting backends");
                signal_lockers(session, relid, "pg_cancel_backend")?;
            }
            EscalationAction::Terminate => {
                warn!(relid, elapsed_s = elapsed.as_secs(), "terminating conflicting backends");
                signal_lockers(session, relid, "pg_terminate_backend")?;
            }
        }

        let statement_timeout_ms = attempt.saturating_mul(100).min(1000);
        session.batch_command(&format!("SET LOCAL statement_timeout = {statement_timeout_ms}"))?;

        match session.command_lenient(lock_query, &[]) {
            Lenient::Ok(_) => break,
            Lenient::Err(error) => {
                if RecognizedSqlState::classify(&error) == Some(RecognizedSqlState::QueryCanceled) {
                    session.batch_command("ROLLBACK")?;
                    attempt += 1;
                    continue;
                }
                return Err(ReorgError::LockFatal(error.to_string()));
            }
        }
    }

    session.batch_command("RESET statement_timeout")?;
    Ok(())
}

/// Signal every backend holding a relation-level lock on `relid`, other
/// than ourselves, with the given libpq signaling function
/// (`pg_cancel_backend` or `pg_terminate_backend`).
fn signal_lockers(session: &mut Session, relid: &str, signal_fn: &str) -> Result<()> {
    let sql = format!(
        "SELECT {signal_fn}(pid) FROM pg_locks \
         WHERE locktype = 'relation' AND relation = $1::text::oid AND pid <> pg_backend_pid()"
    );
    session.query(&sql, &[&relid])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const OLD_SERVER: ServerVersion = ServerVersion(80_100);
    const NEW_SERVER: ServerVersion = ServerVersion(120_003);
    const TIMEOUT: Duration = Duration::from_secs(60);

    #[test]
    fn no_escalation_before_timeout() {
        let elapsed = Duration::from_secs(30);
        assert_eq!(escalation_action(elapsed, TIMEOUT, NEW_SERVER), EscalationAction::None);
    }

    #[test]
    fn cancel_just_past_timeout() {
        let elapsed = Duration::from_secs(61);
        assert_eq!(escalation_action(elapsed, TIMEOUT, NEW_SERVER), EscalationAction::Cancel);
    }

    #[test]
    fn terminate_past_double_timeout_on_new_server() {
        let elapsed = Duration::from_secs(121);
        assert_eq!(
            escalation_action(elapsed, TIMEOUT, NEW_SERVER),
            EscalationAction::Terminate
        );
    }

    #[test]
    fn old_server_never_terminates() {
        let elapsed = Duration::from_secs(1_000);
        assert_eq!(escalation_action(elapsed, TIMEOUT, OLD_SERVER), EscalationAction::Cancel);
    }

    #[test]
    fn boundary_exactly_double_timeout_is_cancel_not_terminate() {
        // spec requires `elapsed > 2 * wait_timeout`, strictly greater.
        let elapsed = TIMEOUT * 2;
        assert_eq!(escalation_action(elapsed, TIMEOUT, NEW_SERVER), EscalationAction::Cancel);
    }

    proptest::proptest! {
        #[test]
        fn escalation_is_monotonically_more_aggressive_over_time(
            secs_a in 0u64..1000,
            secs_b in 0u64..1000,
        ) {
            let (lo, hi) = if secs_a <= secs_b { (secs_a, secs_b) } else { (secs_b, secs_a) };
            let rank = |a: EscalationAction| match a {
                EscalationAction::None => 0,
                EscalationAction::Cancel => 1,
                EscalationAction::Terminate => 2,
            };
            let a = escalation_action(Duration::from_secs(lo), TIMEOUT, NEW_SERVER);
            let b = escalation_action(Duration::from_secs(hi), TIMEOUT, NEW_SERVER);
            prop_assert!(rank(a) <= rank(b));
        }
    }
}
