//! SQL text for the TiDB side of the checks.

use super::TableRef;
use crate::check::types::{QueryRange, ReadEngine};

/// Quote a MySQL identifier with backticks.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Route the session's reads to one engine.
pub fn set_read_engine_query(engine: ReadEngine) -> String {
    format!("set tidb_isolation_read_engines={}", engine.as_str())
}

/// Statements run once per session so that every count is a plain
/// coprocessor read on the selected engine.
pub const SESSION_SETUP: [&str; 2] = ["set tidb_allow_batch_cop = 0", "set tidb_allow_mpp = 0"];

/// Count the rows of `table` inside `range`.
pub fn count_rows_query(table: &TableRef, range: &QueryRange) -> String {
    let filter = range.where_clause(&quote_ident(&table.row_id_column));
    let mut sql = format!(
        "select count(*) from {}.{}",
        quote_ident(&table.database),
        quote_ident(&table.table)
    );
    if !filter.is_empty() {
        sql.push(' ');
        sql.push_str(&filter);
    }
    sql
}

/// Lowest and highest row id of `table`.
pub fn min_max_row_id_query(table: &TableRef) -> String {
    let col = quote_ident(&table.row_id_column);
    format!(
        "select min({col}), max({col}) from {}.{}",
        quote_ident(&table.database),
        quote_ident(&table.table),
    )
}

/// Table id and handle type (TiDB 5.0+).
pub const TABLE_ID_AND_PK_TYPE_QUERY: &str = "select CAST(`TIDB_TABLE_ID` AS SIGNED), \
     CAST(`TIDB_PK_TYPE` AS CHAR(32)) from information_schema.tables \
     where TABLE_SCHEMA = ? and TABLE_NAME = ?";

/// Table id only, for clusters without `TIDB_PK_TYPE`.
pub const TABLE_ID_QUERY: &str = "select CAST(`TIDB_TABLE_ID` AS SIGNED) \
     from information_schema.tables where TABLE_SCHEMA = ? and TABLE_NAME = ?";

/// Addresses of every instance of one component type.
pub const INSTANCES_QUERY: &str =
    "select CAST(INSTANCE AS CHAR(255)) from information_schema.cluster_info where type = ?";

/// Number of Regions of a table per store, split by leadership.
///
/// Database and table are bound as the two `?` parameters.
pub fn region_distribution_statement() -> String {
    distribution_sql("?", "?")
}

/// [`region_distribution_statement`] with the names inlined as string
/// literals. Only for printing; never executed.
pub fn region_distribution_query(database: &str, table: &str) -> String {
    distribution_sql(&string_literal(database), &string_literal(table))
}

fn string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

fn distribution_sql(database: &str, table: &str) -> String {
    format!(
        r#"select CAST(c.type AS CHAR(32)), CAST(a.store_id AS SIGNED), CAST(a.address AS CHAR(255)), CAST(a.is_leader AS SIGNED), CAST(a.cnt AS SIGNED)
from (
	select r.db_name, r.table_name, r.store_id, s.address, r.is_leader, count(*) as cnt
	from (
		select s.region_id, s.db_name, s.table_name, p.store_id, p.is_leader, p.status
		from
			information_schema.tikv_region_status s,
			information_schema.tikv_region_peers p
		where 1=1
			and db_name = {database} and table_name = {table}
			and s.region_id = p.region_id
		order by p.store_id
		) as r,
		information_schema.tikv_store_status s
	where r.store_id = s.store_id
	group by
		r.db_name, r.table_name, r.store_id, r.is_leader, s.address
) a, information_schema.cluster_info c
where c.instance = a.address
order by c.type desc, a.store_id"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lineitem() -> TableRef {
        TableRef::new("tpch_100", "lineitem", "_tidb_rowid")
    }

    #[test]
    fn test_count_rows_query() {
        let table = lineitem();
        assert_eq!(
            count_rows_query(&table, &QueryRange::all()),
            "select count(*) from `tpch_100`.`lineitem`"
        );
        assert_eq!(
            count_rows_query(&table, &QueryRange::between(1, 500)),
            "select count(*) from `tpch_100`.`lineitem` where 1 <= `_tidb_rowid` and `_tidb_rowid` < 500"
        );
        assert!(count_rows_query(&table, &QueryRange::to(3)).ends_with("where `_tidb_rowid` < 3"));
    }

    #[test]
    fn test_min_max_query() {
        let query = min_max_row_id_query(&lineitem());
        assert_eq!(
            query,
            "select min(`_tidb_rowid`), max(`_tidb_rowid`) from `tpch_100`.`lineitem`"
        );
    }

    #[test]
    fn test_identifiers_are_escaped() {
        assert_eq!(quote_ident("we`ird"), "`we``ird`");
        let query = region_distribution_query("d'b", "t");
        assert!(query.contains("db_name = 'd''b'"));
        assert!(query.contains("information_schema.tikv_region_peers"));
    }

    #[test]
    fn test_region_distribution_statement_binds_names() {
        let statement = region_distribution_statement();
        assert!(statement.contains("and db_name = ? and table_name = ?"));
        assert_eq!(statement.matches('?').count(), 2);
        assert!(!statement.contains('\''));

        // a hostile name stays inside its literal in the printed form
        let printed = region_distribution_query("x' or '1'='1", "t\\");
        assert!(printed.contains("db_name = 'x'' or ''1''=''1' and table_name = 't\\\\'"));
        assert_eq!(
            printed.replace("'x'' or ''1''=''1'", "?").replace("'t\\\\'", "?"),
            statement
        );
    }

    #[test]
    fn test_read_engine_query() {
        assert_eq!(
            set_read_engine_query(ReadEngine::Tiflash),
            "set tidb_isolation_read_engines=tiflash"
        );
    }
}
