//! Program identity and server version handling.
//!
//! The version handshake (Database Orchestrator step 1) requires the
//! client and the server-side helper functions to report the exact same
//! `"<name> <version>"` string, because the client and the five
//! row-application templates (`sql_peek`, `sql_insert`, ...) must stay
//! byte-compatible. A mismatch is a per-database skip, not a fatal error.

/// Program name embedded in the version handshake string.
pub const PROGRAM_NAME: &str = "pg_reorg";

/// Program version embedded in the version handshake string.
pub const PROGRAM_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the `"<name> <version>"` string this client expects both
/// `repack.version()` and `repack.version_sql()` to equal.
#[must_use]
pub fn identity_string() -> String {
    format!("{PROGRAM_NAME} {PROGRAM_VERSION}")
}

/// Server `server_version_num`-style integer (e.g. `90400` for 9.4,
/// `120003` for 12.3). Used only for the escalation policy's `>= 8.4`
/// threshold check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ServerVersion(pub u32);

impl ServerVersion {
    /// The threshold at which `pg_terminate_backend` became available.
    pub const PG_8_4: Self = Self(80_400);

    #[must_use]
    pub const fn at_least(self, other: Self) -> bool {
        self.0 >= other.0
    }

    /// Parse a `server_version_num` string as returned by
    /// `SHOW server_version_num` or `current_setting('server_version_num')`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        raw.trim().parse::<u32>().ok().map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_string_matches_name_and_version() {
        let identity = identity_string();
        assert!(identity.starts_with(PROGRAM_NAME));
        assert!(identity.ends_with(PROGRAM_VERSION));
    }

    #[test]
    fn parses_server_version_num() {
        assert_eq!(ServerVersion::parse("90400"), Some(ServerVersion(90_400)));
        assert_eq!(ServerVersion::parse(" 120003 "), Some(ServerVersion(120_003)));
        assert_eq!(ServerVersion::parse("not-a-number"), None);
    }

    #[test]
    fn at_least_8_4() {
        assert!(ServerVersion(90_400).at_least(ServerVersion::PG_8_4));
        assert!(!ServerVersion(80_100).at_least(ServerVersion::PG_8_4));
        assert!(ServerVersion::PG_8_4.at_least(ServerVersion::PG_8_4));
    }
}
