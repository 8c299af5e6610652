use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use tokio_postgres::{Client, Row, Statement};

use super::params::as_refs;
use crate::error::{OrmError, Result};
use crate::results::{Cursor, ResultSet};
use crate::types::RowValues;

/// Run one statement on a client and buffer its outcome.
///
/// Statements without a result description report their affected-row count;
/// anything that yields columns (including `RETURNING`) is read in full.
///
/// # Errors
/// Returns the classified driver error when preparation or execution fails.
pub(crate) async fn execute(client: &Client, sql: &str, params: &[RowValues]) -> Result<Cursor> {
    let stmt = client.prepare(sql).await?;
    let refs = as_refs(params);
    if stmt.columns().is_empty() {
        let affected = client.execute(&stmt, &refs).await?;
        let affected = usize::try_from(affected)
            .map_err(|e| OrmError::execution(format!("row count overflow: {e}")))?;
        return Ok(Cursor::new(ResultSet::affected(affected), None));
    }
    let rows = client.query(&stmt, &refs).await?;
    Ok(Cursor::new(build_result_set(&stmt, &rows)?, None))
}

pub(crate) async fn batch_execute(client: &Client, sql: &str) -> Result<()> {
    client.batch_execute(sql).await?;
    Ok(())
}

fn build_result_set(stmt: &Statement, rows: &[Row]) -> Result<ResultSet> {
    let column_names: Vec<String> = stmt
        .columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect();
    let col_count = column_names.len();
    let mut result_set = ResultSet::with_capacity(rows.len());
    result_set.set_column_names(Arc::new(column_names));

    for row in rows {
        let mut row_values = Vec::with_capacity(col_count);
        for idx in 0..col_count {
            row_values.push(postgres_extract_value(row, idx)?);
        }
        result_set.add_row_values(row_values);
    }
    Ok(result_set)
}

/// Extracts a `RowValues` from a `tokio_postgres` Row at the given index.
fn postgres_extract_value(row: &Row, idx: usize) -> Result<RowValues> {
    let type_name = row.columns()[idx].type_().name();
    let value = match type_name {
        "int2" => row
            .try_get::<_, Option<i16>>(idx)?
            .map_or(RowValues::Null, |v| RowValues::Int(i64::from(v))),
        "int4" => row
            .try_get::<_, Option<i32>>(idx)?
            .map_or(RowValues::Null, |v| RowValues::Int(i64::from(v))),
        "int8" => row
            .try_get::<_, Option<i64>>(idx)?
            .map_or(RowValues::Null, RowValues::Int),
        "float4" => row
            .try_get::<_, Option<f32>>(idx)?
            .map_or(RowValues::Null, |v| RowValues::Float(f64::from(v))),
        "float8" => row
            .try_get::<_, Option<f64>>(idx)?
            .map_or(RowValues::Null, RowValues::Float),
        "bool" => row
            .try_get::<_, Option<bool>>(idx)?
            .map_or(RowValues::Null, RowValues::Bool),
        "timestamp" => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map_or(RowValues::Null, RowValues::Timestamp),
        "timestamptz" => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map_or(RowValues::Null, |v| RowValues::Timestamp(v.naive_utc())),
        "json" | "jsonb" => row
            .try_get::<_, Option<Value>>(idx)?
            .map_or(RowValues::Null, RowValues::JSON),
        "bytea" => row
            .try_get::<_, Option<Vec<u8>>>(idx)?
            .map_or(RowValues::Null, RowValues::Blob),
        _ => row
            .try_get::<_, Option<String>>(idx)
            .map_err(|e| OrmError::Decode(format!("column {idx} ({type_name}): {e}")))?
            .map_or(RowValues::Null, RowValues::Text),
    };
    Ok(value)
}
