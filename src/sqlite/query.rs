use std::sync::Arc;

use rusqlite::types::Value;
use rusqlite::{Statement, params_from_iter};

use super::manager::{SharedSqliteConnection, run_blocking};
use super::params::convert_params;
use crate::error::Result;
use crate::results::{Cursor, ResultSet};
use crate::types::RowValues;

/// Extract a `RowValues` from a `SQLite` row.
fn sqlite_extract_value_sync(row: &rusqlite::Row, idx: usize) -> Result<RowValues> {
    let value: Value = row.get(idx)?;
    Ok(match value {
        Value::Null => RowValues::Null,
        Value::Integer(i) => RowValues::Int(i),
        Value::Real(f) => RowValues::Float(f),
        Value::Text(s) => RowValues::Text(s),
        Value::Blob(b) => RowValues::Blob(b),
    })
}

fn build_result_set(stmt: &mut Statement, params: &[Value]) -> Result<ResultSet> {
    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    let col_count = column_names.len();
    let mut result_set = ResultSet::with_capacity(10);
    result_set.set_column_names(Arc::new(column_names));

    let mut rows_iter = stmt.query(params_from_iter(params.iter()))?;
    while let Some(row) = rows_iter.next()? {
        let mut row_values = Vec::with_capacity(col_count);
        for idx in 0..col_count {
            row_values.push(sqlite_extract_value_sync(row, idx)?);
        }
        result_set.add_row_values(row_values);
    }
    Ok(result_set)
}

fn execute_sync(conn: &mut rusqlite::Connection, sql: &str, params: &[Value]) -> Result<Cursor> {
    let mut stmt = conn.prepare(sql)?;
    if stmt.column_count() > 0 {
        let result_set = build_result_set(&mut stmt, params)?;
        return Ok(Cursor::new(result_set, None));
    }
    let affected = stmt.execute(params_from_iter(params.iter()))?;
    drop(stmt);
    Ok(Cursor::new(
        ResultSet::affected(affected),
        Some(conn.last_insert_rowid()),
    ))
}

/// Run one statement on the blocking pool and buffer its outcome.
///
/// # Errors
/// Returns the classified driver error when preparation or execution fails.
pub(crate) async fn execute(
    conn: SharedSqliteConnection,
    sql: &str,
    params: &[RowValues],
) -> Result<Cursor> {
    let sql = sql.to_owned();
    let values = convert_params(params);
    run_blocking(conn, move |c| execute_sync(c, &sql, &values)).await
}

pub(crate) async fn batch_execute(conn: SharedSqliteConnection, sql: &str) -> Result<()> {
    let sql = sql.to_owned();
    run_blocking(conn, move |c| {
        c.execute_batch(&sql)?;
        Ok(())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserts_report_rowid_and_selects_buffer_rows() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut conn = rusqlite::Connection::open_in_memory()?;
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)")?;

        let cursor = execute_sync(&mut conn, "INSERT INTO t (name) VALUES (?1)", &[Value::Text("a".into())])?;
        assert_eq!(cursor.rowcount(), 1);
        assert_eq!(cursor.last_insert_id(), Some(1));

        let mut cursor = execute_sync(&mut conn, "SELECT id, name FROM t", &[])?;
        let names = cursor.column_names().map(|names| names.as_slice().to_vec());
        assert_eq!(names, Some(vec!["id".to_string(), "name".to_string()]));
        let row = cursor.fetchone().expect("one row");
        assert_eq!(row.get("name"), Some(&RowValues::Text("a".into())));
        assert!(cursor.fetchone().is_none());
        Ok(())
    }
}
