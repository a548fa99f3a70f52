//! Naming conventions for per-target temporary server-side objects.
//!
//! The SQL strings on `TargetTable` are opaque, but two administrative
//! calls (disabling autovacuum, and the pre-copy log flush) need the
//! *names* of the log and shadow tables independently of that opaque
//! text. Both follow the same `<kind>_<oid>` convention.

/// Name of the append-only log table for `target_oid`.
#[must_use]
pub fn log_table(target_oid: i64) -> String {
    format!("repack.log_{target_oid}")
}

/// Name of the shadow table under construction for `target_oid`.
#[must_use]
pub fn shadow_table(target_oid: i64) -> String {
    format!("repack.table_{target_oid}")
}
