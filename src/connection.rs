//! Connection parameter resolution.
//!
//! No files or persisted config are involved (spec: "no env vars beyond
//! those the DB client library consumes"). Precedence, highest first:
//! CLI overrides, then the standard libpq environment variables, then
//! built-in defaults.

use std::env;

use tracing::warn;

/// Resolved libpq-style connection parameters, minus the database name
/// (which varies per invocation of the Database Orchestrator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: String,
    pub user: String,
    pub password: Option<String>,
    /// `PGSSLMODE` was set to something other than `disable`/`prefer`/unset.
    /// We don't implement TLS; this is surfaced as a one-time warning.
    pub requested_tls: bool,
}

/// CLI-level overrides for connection parameters.
#[derive(Debug, Clone, Default)]
pub struct ConnectionOverrides {
    pub host: Option<String>,
    pub port: Option<String>,
    pub user: Option<String>,
}

impl ConnectionConfig {
    /// Resolve from the environment, honoring CLI overrides.
    #[must_use]
    pub fn resolve(overrides: &ConnectionOverrides) -> Self {
        let config = Self::resolve_from(overrides, |key| env::var(key).ok());
        if config.requested_tls {
            warn!("PGSSLMODE requests TLS, but this build connects without TLS");
        }
        config
    }

    /// Testable variant that takes an environment lookup function instead
    /// of reading `std::env` directly.
    fn resolve_from(overrides: &ConnectionOverrides, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let host = overrides
            .host
            .clone()
            .or_else(|| lookup("PGHOST"))
            .unwrap_or_else(|| "localhost".to_string());

        let port = overrides
            .port
            .clone()
            .or_else(|| lookup("PGPORT"))
            .unwrap_or_else(|| "5432".to_string());

        let user = overrides
            .user
            .clone()
            .or_else(|| lookup("PGUSER"))
            .or_else(|| lookup("USER"))
            .unwrap_or_else(|| "postgres".to_string());

        let password = lookup("PGPASSWORD");

        let requested_tls = lookup("PGSSLMODE")
            .map(|mode| !matches!(mode.as_str(), "disable" | "prefer" | "allow"))
            .unwrap_or(false);

        Self {
            host,
            port,
            user,
            password,
            requested_tls,
        }
    }

    /// Build a libpq connection string for the given database name.
    #[must_use]
    pub fn connection_string(&self, dbname: &str) -> String {
        let mut out = format!(
            "host={} port={} user={} dbname={} application_name={}",
            self.host,
            self.port,
            self.user,
            dbname,
            crate::version::PROGRAM_NAME,
        );
        if let Some(password) = &self.password {
            out.push_str(&format!(" password={password}"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let overrides = ConnectionOverrides::default();
        let config = ConnectionConfig::resolve_from(&overrides, |_| None);
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, "5432");
        assert!(!config.requested_tls);
    }

    #[test]
    fn env_vars_override_defaults() {
        let env = env_map(&[
            ("PGHOST", "db.internal"),
            ("PGPORT", "6543"),
            ("PGUSER", "svc_reorg"),
            ("PGPASSWORD", "secret"),
        ]);
        let overrides = ConnectionOverrides::default();
        let config = ConnectionConfig::resolve_from(&overrides, |k| env.get(k).cloned());
        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, "6543");
        assert_eq!(config.user, "svc_reorg");
        assert_eq!(config.password.as_deref(), Some("secret"));
    }

    #[test]
    fn cli_overrides_beat_env() {
        let env = env_map(&[("PGHOST", "db.internal")]);
        let overrides = ConnectionOverrides {
            host: Some("cli-host".to_string()),
            ..ConnectionOverrides::default()
        };
        let config = ConnectionConfig::resolve_from(&overrides, |k| env.get(k).cloned());
        assert_eq!(config.host, "cli-host");
    }

    #[test]
    fn sslmode_require_flags_requested_tls() {
        let env = env_map(&[("PGSSLMODE", "require")]);
        let config =
            ConnectionConfig::resolve_from(&ConnectionOverrides::default(), |k| env.get(k).cloned());
        assert!(config.requested_tls);
    }

    #[test]
    fn sslmode_disable_does_not_flag_tls() {
        let env = env_map(&[("PGSSLMODE", "disable")]);
        let config =
            ConnectionConfig::resolve_from(&ConnectionOverrides::default(), |k| env.get(k).cloned());
        assert!(!config.requested_tls);
    }

    #[test]
    fn connection_string_includes_dbname_and_application_name() {
        let config = ConnectionConfig::resolve_from(&ConnectionOverrides::default(), |_| None);
        let conn_str = config.connection_string("mydb");
        assert!(conn_str.contains("dbname=mydb"));
        assert!(conn_str.contains("application_name=pg_reorg"));
    }
}
