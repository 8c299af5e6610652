//! DDL helpers shared by the model façade and [`Database::create_tables`](crate::Database::create_tables).

use tracing::debug;

use super::ModelMeta;
use crate::database::CommitPolicy;
use crate::error::Result;
use crate::executor::{Executor, Target};
use crate::query::{CreateIndex, CreateTable, DropTable, SqlQuery, TruncateTable};

async fn run(target: &Target, query: &impl SqlQuery, policy: CommitPolicy) -> Result<usize> {
    let (text, params) = query.sql(target.db_type());
    Ok(target.execute_sql(&text, &params, policy).await?.rowcount())
}

/// Indexes declared on the model: single `index` fields plus model-level ones.
/// Unique fields are constrained inline by `CREATE TABLE`.
fn indexes(meta: &'static ModelMeta, safe: bool) -> Vec<CreateIndex> {
    let single = meta
        .fields
        .iter()
        .filter(|f| f.index && !f.unique)
        .map(|f| CreateIndex {
            meta,
            columns: std::slice::from_ref(&f.name),
            unique: false,
            safe,
        });
    let declared = meta.indexes.iter().map(|idx| CreateIndex {
        meta,
        columns: idx.columns,
        unique: idx.unique,
        safe,
    });
    single.chain(declared).collect()
}

/// Create the table and its indexes. With `safe`, an existing table is left
/// alone and `false` returned.
///
/// # Errors
/// The catalog or DDL failure.
pub async fn create_table(target: &Target, meta: &'static ModelMeta, safe: bool) -> Result<bool> {
    if safe && target.table_exists(meta.table_name, meta.schema).await? {
        debug!(table = meta.table_name, "table exists; skipping create");
        return Ok(false);
    }
    run(target, &CreateTable { meta, safe }, CommitPolicy::Always).await?;
    for index in indexes(meta, safe) {
        run(target, &index, CommitPolicy::Always).await?;
    }
    debug!(table = meta.table_name, "table created");
    Ok(true)
}

/// # Errors
/// The DDL failure, e.g. a missing table without `safe`.
pub async fn drop_table(target: &Target, meta: &'static ModelMeta, safe: bool, cascade: bool) -> Result<()> {
    run(target, &DropTable { meta, safe, cascade }, CommitPolicy::Always).await?;
    debug!(table = meta.table_name, "table dropped");
    Ok(())
}

/// Remove every row; returns the backend's row count where it reports one.
///
/// # Errors
/// The statement failure.
pub async fn truncate_table(target: &Target, meta: &'static ModelMeta) -> Result<usize> {
    run(target, &TruncateTable { meta }, CommitPolicy::Always).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldMeta, FieldType, IndexMeta};
    use crate::types::DatabaseType;

    static EVENT: ModelMeta = ModelMeta::new(
        "Event",
        "event",
        &[
            FieldMeta::new("id", FieldType::Integer).auto_increment(),
            FieldMeta::new("kind", FieldType::Text).index(),
            FieldMeta::new("slug", FieldType::Text).unique().index(),
            FieldMeta::new("day", FieldType::Integer),
        ],
    )
    .primary_key(&["id"])
    .indexes(&[IndexMeta {
        columns: &["kind", "day"],
        unique: true,
    }]);

    #[test]
    fn indexes_cover_flagged_fields_and_declared_sets() {
        let names: Vec<String> = indexes(&EVENT, true).iter().map(CreateIndex::name).collect();
        assert_eq!(names, vec!["event_kind", "event_kind_day"]);

        let (sql, _) = indexes(&EVENT, true)[1].sql(DatabaseType::Sqlite);
        assert_eq!(
            sql,
            r#"CREATE UNIQUE INDEX IF NOT EXISTS "event_kind_day" ON "event" ("kind", "day")"#
        );
    }
}
