use super::compiler::{SqlQuery, SqlWriter};
use super::expr::Expr;
use super::select::SelectQuery;
use crate::model::ModelMeta;
use crate::types::RowValues;

/// `INSERT` builder: one row, many rows, or `INSERT ... SELECT`.
#[derive(Debug, Clone)]
pub struct InsertQuery {
    meta: &'static ModelMeta,
    columns: Vec<String>,
    rows: Vec<Vec<RowValues>>,
    from_select: Option<Box<SelectQuery>>,
    returning: Vec<String>,
}

impl InsertQuery {
    /// A single row. An empty value list inserts `DEFAULT VALUES`.
    #[must_use]
    pub fn values(meta: &'static ModelMeta, values: Vec<(String, RowValues)>) -> Self {
        let (columns, row) = values.into_iter().unzip();
        Self {
            meta,
            columns,
            rows: vec![row],
            from_select: None,
            returning: Vec::new(),
        }
    }

    /// Several rows. Columns are the union across rows in first-seen order;
    /// a row that omits a column sends `NULL` for it.
    #[must_use]
    pub fn many(meta: &'static ModelMeta, rows: Vec<Vec<(String, RowValues)>>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for (name, _) in row {
                if !columns.contains(name) {
                    columns.push(name.clone());
                }
            }
        }
        let rows = rows
            .into_iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|c| {
                        row.iter()
                            .find(|(name, _)| name == c)
                            .map_or(RowValues::Null, |(_, v)| v.clone())
                    })
                    .collect()
            })
            .collect();
        Self {
            meta,
            columns,
            rows,
            from_select: None,
            returning: Vec::new(),
        }
    }

    /// `INSERT INTO t (columns) SELECT ...`
    #[must_use]
    pub fn from_select(meta: &'static ModelMeta, columns: Vec<String>, query: SelectQuery) -> Self {
        Self {
            meta,
            columns,
            rows: Vec::new(),
            from_select: Some(Box::new(query)),
            returning: Vec::new(),
        }
    }

    #[must_use]
    pub fn returning(mut self, columns: Vec<String>) -> Self {
        self.returning = columns;
        self
    }

    #[must_use]
    pub fn meta(&self) -> &'static ModelMeta {
        self.meta
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_from_select(&self) -> bool {
        self.from_select.is_some()
    }

    #[must_use]
    pub fn has_returning(&self) -> bool {
        !self.returning.is_empty()
    }

    /// Value supplied for `column` in row `idx`, if any.
    #[must_use]
    pub fn value_of(&self, idx: usize, column: &str) -> Option<&RowValues> {
        let pos = self.columns.iter().position(|c| c == column)?;
        self.rows.get(idx).and_then(|row| row.get(pos))
    }

    /// Split into one single-row insert per row.
    #[must_use]
    pub fn split_rows(&self) -> Vec<InsertQuery> {
        self.rows
            .iter()
            .map(|row| InsertQuery {
                meta: self.meta,
                columns: self.columns.clone(),
                rows: vec![row.clone()],
                from_select: None,
                returning: self.returning.clone(),
            })
            .collect()
    }
}

impl SqlQuery for InsertQuery {
    fn write_sql(&self, w: &mut SqlWriter) {
        w.push("INSERT INTO ").push_table(self.meta);
        if let Some(select) = &self.from_select {
            if !self.columns.is_empty() {
                w.push(" (");
                w.push_comma_separated(&self.columns, |w, c| {
                    w.push_ident(c);
                });
                w.push(")");
            }
            w.push(" ");
            select.write_sql(w);
        } else if self.columns.is_empty() {
            w.push(" DEFAULT VALUES");
        } else {
            w.push(" (");
            w.push_comma_separated(&self.columns, |w, c| {
                w.push_ident(c);
            });
            w.push(") VALUES ");
            w.push_comma_separated(&self.rows, |w, row| {
                w.push("(");
                w.push_comma_separated(row, |w, v| {
                    w.push_param(v.clone());
                });
                w.push(")");
            });
        }
        w.push_returning(&self.returning);
    }
}

/// `UPDATE` builder.
#[derive(Debug, Clone)]
pub struct UpdateQuery {
    meta: &'static ModelMeta,
    assignments: Vec<(String, Expr)>,
    where_clause: Option<Expr>,
    returning: Vec<String>,
}

impl UpdateQuery {
    #[must_use]
    pub fn new(meta: &'static ModelMeta, assignments: Vec<(String, Expr)>) -> Self {
        Self {
            meta,
            assignments,
            where_clause: None,
            returning: Vec::new(),
        }
    }

    #[must_use]
    pub fn filter(mut self, condition: Expr) -> Self {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    #[must_use]
    pub fn returning(mut self, columns: Vec<String>) -> Self {
        self.returning = columns;
        self
    }

    #[must_use]
    pub fn has_returning(&self) -> bool {
        !self.returning.is_empty()
    }
}

impl SqlQuery for UpdateQuery {
    fn write_sql(&self, w: &mut SqlWriter) {
        w.push("UPDATE ").push_table(self.meta).push(" SET ");
        w.push_comma_separated(&self.assignments, |w, (column, value)| {
            w.push_ident(column).push(" = ");
            w.push_expr(value);
        });
        if let Some(cond) = &self.where_clause {
            w.push(" WHERE ");
            w.push_expr(cond);
        }
        w.push_returning(&self.returning);
    }
}

/// `DELETE` builder.
#[derive(Debug, Clone)]
pub struct DeleteQuery {
    meta: &'static ModelMeta,
    where_clause: Option<Expr>,
    returning: Vec<String>,
}

impl DeleteQuery {
    #[must_use]
    pub fn new(meta: &'static ModelMeta) -> Self {
        Self {
            meta,
            where_clause: None,
            returning: Vec::new(),
        }
    }

    #[must_use]
    pub fn filter(mut self, condition: Expr) -> Self {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    #[must_use]
    pub fn returning(mut self, columns: Vec<String>) -> Self {
        self.returning = columns;
        self
    }

    #[must_use]
    pub fn has_returning(&self) -> bool {
        !self.returning.is_empty()
    }
}

impl SqlQuery for DeleteQuery {
    fn write_sql(&self, w: &mut SqlWriter) {
        w.push("DELETE FROM ").push_table(self.meta);
        if let Some(cond) = &self.where_clause {
            w.push(" WHERE ");
            w.push_expr(cond);
        }
        w.push_returning(&self.returning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldMeta, FieldType};
    use crate::query::col;
    use crate::types::DatabaseType;

    static NOTE: ModelMeta = ModelMeta::new(
        "Note",
        "note",
        &[
            FieldMeta::new("id", FieldType::Integer).auto_increment(),
            FieldMeta::new("body", FieldType::Text),
            FieldMeta::new("tag", FieldType::Text).nullable(),
        ],
    )
    .primary_key(&["id"]);

    #[test]
    fn multi_row_insert_fills_missing_columns_with_null() {
        let q = InsertQuery::many(
            &NOTE,
            vec![
                vec![("body".into(), "a".into())],
                vec![("body".into(), "b".into()), ("tag".into(), "t".into())],
            ],
        );
        let (sql, params) = q.sql(DatabaseType::Sqlite);
        assert_eq!(sql, r#"INSERT INTO "note" ("body", "tag") VALUES (?1, ?2), (?3, ?4)"#);
        assert_eq!(params[1], RowValues::Null);
        assert_eq!(q.split_rows().len(), 2);
    }

    #[test]
    fn update_and_delete_render_returning() {
        let (sql, _) = UpdateQuery::new(&NOTE, vec![("body".into(), "x".into())])
            .filter(col("id").eq(1))
            .returning(vec!["id".into()])
            .sql(DatabaseType::Postgres);
        assert_eq!(sql, r#"UPDATE "note" SET "body" = $1 WHERE ("id" = $2) RETURNING "id""#);

        let (sql, _) = DeleteQuery::new(&NOTE).sql(DatabaseType::Postgres);
        assert_eq!(sql, r#"DELETE FROM "note""#);
    }

    #[test]
    fn empty_insert_uses_default_values() {
        let (sql, params) = InsertQuery::values(&NOTE, Vec::new())
            .returning(vec!["id".into()])
            .sql(DatabaseType::Postgres);
        assert_eq!(sql, r#"INSERT INTO "note" DEFAULT VALUES RETURNING "id""#);
        assert!(params.is_empty());
    }
}
