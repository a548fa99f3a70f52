//! Data model: `TargetTable` and `Index`, fetched from the server's
//! `repack.tables` view and `pg_index` respectively. The SQL strings on
//! `TargetTable` are treated as opaque — the client never parses them,
//! only concatenates an `ORDER BY` clause onto `base_create_table`.

use crate::cli::OrderingMode;
use crate::error::{ReorgError, Result};
use crate::session::Session;

/// One row of the server's `repack.tables` view, frozen client-side for
/// the duration of one table's orchestration.
#[derive(Debug, Clone)]
pub struct TargetTable {
    pub target_name: String,
    pub target_oid: i64,
    pub toast_oid: i64,
    pub toast_index_oid: i64,
    /// Required non-zero: a table without a primary or not-null unique
    /// key is refused (invariant 1).
    pub pk_oid: i64,
    /// Required in cluster mode (invariant 2).
    pub ck_oid: Option<i64>,
    pub clustering_key_expression: Option<String>,

    pub create_pktype: String,
    pub create_log: String,
    pub create_trigger: String,
    pub enable_trigger: String,
    pub base_create_table: String,
    pub drop_columns: Option<String>,
    pub delete_log: String,
    pub lock_table: String,

    pub sql_peek: String,
    pub sql_insert: String,
    pub sql_delete: String,
    pub sql_update: String,
    pub sql_pop: String,

    /// Derived per run by appending `ORDER BY <expr>` (or not) to
    /// `base_create_table`. Filled in by [`TargetTable::with_create_table`].
    pub create_table: String,
}

impl TargetTable {
    /// Build from one `repack.tables` row. Validates invariant 1
    /// (`pk_oid != 0`) unconditionally; invariant 2 (cluster key present)
    /// is validated separately once the ordering mode is known, since a
    /// table may be legitimately reorganized in `--no-order` mode without
    /// a clustering key.
    fn from_row(row: &postgres::Row) -> Result<Self> {
        let target_name: String = row.get("relname");
        let pk_oid = row.try_get::<_, Option<i64>>("pkid").unwrap_or(None).unwrap_or(0);
        if pk_oid == 0 {
            return Err(ReorgError::Precondition(format!(
                "{target_name} has no primary or not-null unique key"
            )));
        }

        Ok(Self {
            target_name,
            target_oid: row.get("relid"),
            toast_oid: row.get("toast"),
            toast_index_oid: row.get("toast_idx"),
            pk_oid,
            ck_oid: row.try_get::<_, Option<i64>>("ckid").unwrap_or(None).filter(|oid| *oid != 0),
            clustering_key_expression: row.try_get("ckey").ok(),
            create_pktype: row.get("create_pktype"),
            create_log: row.get("create_log"),
            create_trigger: row.get("create_trigger"),
            enable_trigger: row.get("enable_trigger"),
            base_create_table: row.get("create_table"),
            drop_columns: row.try_get("drop_columns").ok(),
            delete_log: row.get("delete_log"),
            lock_table: row.get("lock_table"),
            sql_peek: row.get("sql_peek"),
            sql_insert: row.get("sql_insert"),
            sql_delete: row.get("sql_delete"),
            sql_update: row.get("sql_update"),
            sql_pop: row.get("sql_pop"),
            create_table: String::new(),
        })
    }

    /// Derive the final `create_table` statement for this run's ordering
    /// mode and store it on the target. See [`derive_create_table`].
    ///
    /// # Errors
    ///
    /// Returns `ReorgError::Precondition` if cluster mode was requested
    /// but this target has no clustering key.
    pub fn with_create_table(mut self, ordering: &OrderingMode) -> Result<Self> {
        self.create_table = derive_create_table(
            &self.base_create_table,
            ordering,
            self.clustering_key_expression.as_deref(),
        )?;
        Ok(self)
    }
}

/// Append the appropriate `ORDER BY` clause to `base_create_table`:
/// - Cluster mode: `ORDER BY <clustering_key_expression>` (the target
///   must have one).
/// - `NoOrder`: use `base_create_table` unchanged (VACUUM-FULL mode).
/// - `Custom(expr)`: `ORDER BY <expr>`.
///
/// The tri-valued semantics (no override / explicit empty / explicit
/// non-empty) must be preserved exactly — see `OrderingMode`.
///
/// # Errors
///
/// Returns `ReorgError::Precondition` if cluster mode was requested but
/// `clustering_key_expression` is absent.
pub fn derive_create_table(
    base_create_table: &str,
    ordering: &OrderingMode,
    clustering_key_expression: Option<&str>,
) -> Result<String> {
    match ordering {
        OrderingMode::Cluster => {
            let expr = clustering_key_expression.ok_or_else(|| {
                ReorgError::Precondition(
                    "cluster mode requires a clustering key, but this target has none".to_string(),
                )
            })?;
            Ok(format!("{base_create_table} ORDER BY {expr}"))
        }
        OrderingMode::NoOrder => Ok(base_create_table.to_string()),
        OrderingMode::Custom(expr) => Ok(format!("{base_create_table} ORDER BY {expr}")),
    }
}

/// Fetch target rows from `repack.tables`, filtered either to one named
/// relation or to every eligible relation (cluster-mode eligibility
/// additionally requires a clustering key).
///
/// # Errors
///
/// Returns an error if the query fails or any returned row fails
/// invariant validation.
pub fn fetch_targets(
    session: &mut Session,
    table_filter: Option<&str>,
    ordering: &OrderingMode,
) -> Result<Vec<TargetTable>> {
    let rows = if let Some(table) = table_filter {
        session.query(
            "SELECT * FROM repack.tables WHERE relid = $1::regclass",
            &[&table],
        )?
    } else if ordering.is_cluster_mode() {
        session.query(
            "SELECT * FROM repack.tables WHERE pkid IS NOT NULL AND ckid IS NOT NULL",
            &[],
        )?
    } else {
        session.query("SELECT * FROM repack.tables WHERE pkid IS NOT NULL", &[])?
    };

    rows.iter()
        .map(|row| TargetTable::from_row(row)?.with_create_table(ordering))
        .collect()
}

/// One index on a target relation.
#[derive(Debug, Clone)]
pub struct Index {
    pub target_oid: i64,
    pub index_oid: i64,
    /// Server-generated statement that creates this index on the shadow
    /// table and renames it appropriately. Opaque to the client.
    pub create_index: String,
    pub indisvalid: bool,
    /// Original `indexdef` text, for diagnostic messages only.
    pub indexdef: String,
}

/// Fetch every index on `target_oid`, including the server-generated
/// `create_index` statement for each.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn fetch_indexes(session: &mut Session, target_oid: i64) -> Result<Vec<Index>> {
    let rows = session.query(
        "SELECT i.indexrelid::bigint AS index_oid, \
                i.indisvalid, \
                pg_get_indexdef(i.indexrelid) AS indexdef, \
                repack.get_create_index_sql(i.indexrelid, $1) AS create_index \
         FROM pg_index i \
         WHERE i.indrelid = $1::bigint::regclass",
        &[&target_oid],
    )?;

    Ok(rows
        .iter()
        .map(|row| Index {
            target_oid,
            index_oid: row.get("index_oid"),
            indisvalid: row.get("indisvalid"),
            indexdef: row.get("indexdef"),
            create_index: row.get("create_index"),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_mode_appends_clustering_key() {
        let sql = derive_create_table(
            "CREATE TABLE shadow AS SELECT * FROM t",
            &OrderingMode::Cluster,
            Some("v"),
        )
        .unwrap();
        assert_eq!(sql, "CREATE TABLE shadow AS SELECT * FROM t ORDER BY v");
    }

    #[test]
    fn cluster_mode_without_key_is_error() {
        let result = derive_create_table("CREATE TABLE shadow AS SELECT * FROM t", &OrderingMode::Cluster, None);
        assert!(result.is_err());
    }

    #[test]
    fn no_order_mode_leaves_statement_unchanged() {
        let sql = derive_create_table(
            "CREATE TABLE shadow AS SELECT * FROM t",
            &OrderingMode::NoOrder,
            Some("v"),
        )
        .unwrap();
        assert_eq!(sql, "CREATE TABLE shadow AS SELECT * FROM t");
    }

    #[test]
    fn custom_mode_appends_user_expression() {
        let sql = derive_create_table(
            "CREATE TABLE shadow AS SELECT * FROM t",
            &OrderingMode::Custom("lower(email)".to_string()),
            None,
        )
        .unwrap();
        assert_eq!(sql, "CREATE TABLE shadow AS SELECT * FROM t ORDER BY lower(email)");
    }
}
