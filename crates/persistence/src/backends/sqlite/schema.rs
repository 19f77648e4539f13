//! SQLite schema definitions.
//!
//! Every statement is idempotent; stores call these on construction.

use rusqlite::Connection;
use tracing::debug;

use crate::core::TableNames;
use crate::error::StorageResult;
use crate::types::validate_column;

use super::query::quote_ident;

/// Creates the record table `T (id, data)`.
pub fn create_record_table(conn: &Connection, table: &str) -> StorageResult<()> {
    validate_column(table)?;
    let quoted = quote_ident(table);
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {quoted} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            data TEXT NOT NULL
        );"
    ))?;
    debug!(table, "ensured record table");
    Ok(())
}

/// Creates the history log `T_history` and pointer table `T_latest`.
pub fn create_history_tables(conn: &Connection, names: &TableNames) -> StorageResult<()> {
    validate_column(names.base())?;
    let history = names.history();
    let latest = names.latest();
    let history_q = quote_ident(&history);
    let latest_q = quote_ident(&latest);
    let history_index = quote_ident(&format!("idx_{history}_target"));
    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {history_q} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL UNIQUE,
            "user" TEXT NOT NULL,
            target INTEGER NOT NULL,
            time TEXT NOT NULL,
            data TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS {history_index} ON {history_q}(target, id);

        CREATE TABLE IF NOT EXISTS {latest_q} (
            id INTEGER PRIMARY KEY,
            latest INTEGER NOT NULL,
            "commit" TEXT NOT NULL
        );
        "#
    ))?;
    debug!(history = %history, latest = %latest, "ensured history tables");
    Ok(())
}

/// Creates the label table `T_index`.
pub fn create_index_table(conn: &Connection, names: &TableNames) -> StorageResult<()> {
    validate_column(names.base())?;
    let index = names.index();
    let index_q = quote_ident(&index);
    let target_index = quote_ident(&format!("idx_{index}_target"));
    conn.execute_batch(&format!(
        "
        CREATE TABLE IF NOT EXISTS {index_q} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            target INTEGER NOT NULL,
            label TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS {target_index} ON {index_q}(target);
        "
    ))?;
    debug!(index = %index, "ensured index table");
    Ok(())
}

/// Returns true if a table with this name exists.
pub fn table_exists(conn: &Connection, table: &str) -> StorageResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
