use super::compiler::{SqlQuery, SqlWriter};
use super::expr::{Expr, Ordering};
use super::raw::RawQuery;
use crate::model::ModelMeta;
use crate::types::DatabaseType;

/// What a `SELECT` reads from.
#[derive(Debug, Clone)]
pub enum Source {
    Model(&'static ModelMeta),
    /// A derived table: `(<query>) AS alias`.
    Subquery(Box<ReadQuery>, String),
}

/// A query whose result is a row set: built or hand-written.
#[derive(Debug, Clone)]
pub enum ReadQuery {
    Select(SelectQuery),
    Raw(RawQuery),
}

impl ReadQuery {
    pub(crate) fn as_select_mut(&mut self) -> Option<&mut SelectQuery> {
        match self {
            ReadQuery::Select(q) => Some(q),
            ReadQuery::Raw(_) => None,
        }
    }
}

impl SqlQuery for ReadQuery {
    fn write_sql(&self, w: &mut SqlWriter) {
        match self {
            ReadQuery::Select(q) => q.write_sql(w),
            ReadQuery::Raw(q) => q.write_sql(w),
        }
    }
}

/// `SELECT` builder.
///
/// ```rust
/// use sql_async_orm::query::{SelectQuery, SqlQuery, col};
/// use sql_async_orm::model::{FieldMeta, FieldType, ModelMeta};
/// use sql_async_orm::DatabaseType;
///
/// static T: ModelMeta = ModelMeta::new("T", "t", &[FieldMeta::new("id", FieldType::Integer)]);
///
/// let (sql, params) = SelectQuery::new(&T)
///     .filter(col("id").gt(0))
///     .order_by([col("id").desc()])
///     .limit(1)
///     .sql(DatabaseType::Postgres);
/// assert_eq!(sql, r#"SELECT "id" FROM "t" WHERE ("id" > $1) ORDER BY "id" DESC LIMIT 1"#);
/// assert_eq!(params.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct SelectQuery {
    source: Source,
    columns: Vec<Expr>,
    where_clause: Option<Expr>,
    group_by: Vec<Expr>,
    having: Option<Expr>,
    order_by: Vec<Ordering>,
    limit: Option<u64>,
    offset: Option<u64>,
    distinct: bool,
    windows: Vec<(String, String)>,
}

impl SelectQuery {
    /// Select every declared field of a model.
    #[must_use]
    pub fn new(meta: &'static ModelMeta) -> Self {
        Self::from_source(Source::Model(meta))
    }

    /// Select from a derived table.
    #[must_use]
    pub fn from_subquery(inner: ReadQuery, alias: impl Into<String>) -> Self {
        Self::from_source(Source::Subquery(Box::new(inner), alias.into()))
    }

    fn from_source(source: Source) -> Self {
        Self {
            source,
            columns: Vec::new(),
            where_clause: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
            distinct: false,
            windows: Vec::new(),
        }
    }

    #[must_use]
    pub fn source(&self) -> &Source {
        &self.source
    }

    #[must_use]
    pub fn model(&self) -> Option<&'static ModelMeta> {
        match self.source {
            Source::Model(meta) => Some(meta),
            Source::Subquery(..) => None,
        }
    }

    /// Replace the projection. An empty list selects all model fields (or `*`).
    #[must_use]
    pub fn columns(mut self, columns: impl IntoIterator<Item = Expr>) -> Self {
        self.columns = columns.into_iter().collect();
        self
    }

    /// Add a `WHERE` condition, `AND`-ed with any existing one.
    #[must_use]
    pub fn filter(mut self, condition: Expr) -> Self {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    #[must_use]
    pub fn group_by(mut self, exprs: impl IntoIterator<Item = Expr>) -> Self {
        self.group_by = exprs.into_iter().collect();
        self
    }

    #[must_use]
    pub fn having(mut self, condition: Expr) -> Self {
        self.having = Some(match self.having.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    #[must_use]
    pub fn order_by<O: Into<Ordering>>(mut self, ordering: impl IntoIterator<Item = O>) -> Self {
        self.order_by = ordering.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// 1-based page of `per_page` rows.
    #[must_use]
    pub fn paginate(self, page: u64, per_page: u64) -> Self {
        let page = page.max(1);
        self.limit(per_page).offset((page - 1).saturating_mul(per_page))
    }

    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Declare a named window: `WINDOW name AS (definition)`.
    #[must_use]
    pub fn window(mut self, name: impl Into<String>, definition: impl Into<String>) -> Self {
        self.windows.push((name.into(), definition.into()));
        self
    }

    pub(crate) fn set_columns(&mut self, columns: Vec<Expr>) {
        self.columns = columns;
    }

    pub(crate) fn set_limit(&mut self, limit: Option<u64>) {
        self.limit = limit;
    }

    pub(crate) fn set_offset(&mut self, offset: Option<u64>) {
        self.offset = offset;
    }

    pub(crate) fn clear_order_by(&mut self) {
        self.order_by.clear();
    }

    #[must_use]
    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    #[must_use]
    pub fn offset_value(&self) -> Option<u64> {
        self.offset
    }

    #[must_use]
    pub fn where_clause(&self) -> Option<&Expr> {
        self.where_clause.as_ref()
    }

    #[must_use]
    pub fn has_group_by(&self) -> bool {
        !self.group_by.is_empty()
    }

    #[must_use]
    pub fn has_having(&self) -> bool {
        self.having.is_some()
    }

    #[must_use]
    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    #[must_use]
    pub fn has_window(&self) -> bool {
        !self.windows.is_empty()
    }

    /// Whether the projection affects how many rows come back.
    #[must_use]
    pub fn projection_shapes_rows(&self) -> bool {
        self.has_group_by() || self.has_having() || self.is_distinct() || self.has_window()
    }
}

impl SqlQuery for SelectQuery {
    fn write_sql(&self, w: &mut SqlWriter) {
        w.push("SELECT ");
        if self.distinct {
            w.push("DISTINCT ");
        }
        if !self.columns.is_empty() {
            w.push_comma_separated(&self.columns, |w, c| w.push_expr(c));
        } else if let Source::Model(meta) = self.source {
            w.push_comma_separated(meta.fields, |w, f| {
                w.push_ident(f.name);
            });
        } else {
            w.push("*");
        }

        w.push(" FROM ");
        match &self.source {
            Source::Model(meta) => {
                w.push_table(meta);
            }
            Source::Subquery(inner, alias) => {
                w.push("(");
                inner.write_sql(w);
                w.push(") AS ").push_ident(alias);
            }
        }

        if let Some(cond) = &self.where_clause {
            w.push(" WHERE ");
            w.push_expr(cond);
        }
        if !self.group_by.is_empty() {
            w.push(" GROUP BY ");
            w.push_comma_separated(&self.group_by, |w, e| w.push_expr(e));
        }
        if let Some(cond) = &self.having {
            w.push(" HAVING ");
            w.push_expr(cond);
        }
        if !self.windows.is_empty() {
            w.push(" WINDOW ");
            w.push_comma_separated(&self.windows, |w, (name, def)| {
                w.push_ident(name).push(" AS (").push(def).push(")");
            });
        }
        w.push_ordering(&self.order_by);
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => {
                w.push(&format!(" LIMIT {limit} OFFSET {offset}"));
            }
            (Some(limit), None) => {
                w.push(&format!(" LIMIT {limit}"));
            }
            // SQLite only accepts OFFSET after a LIMIT.
            (None, Some(offset)) if w.db_type() == DatabaseType::Sqlite => {
                w.push(&format!(" LIMIT -1 OFFSET {offset}"));
            }
            (None, Some(offset)) => {
                w.push(&format!(" OFFSET {offset}"));
            }
            (None, None) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldMeta, FieldType};
    use crate::query::{col, sql};

    static ITEM: ModelMeta = ModelMeta::new(
        "Item",
        "item",
        &[
            FieldMeta::new("id", FieldType::Integer),
            FieldMeta::new("data", FieldType::Text),
        ],
    );

    #[test]
    fn clones_do_not_share_clauses() {
        let base = SelectQuery::new(&ITEM).filter(col("id").gt(0));
        let narrowed = base.clone().filter(col("data").eq("x")).limit(5);
        assert_eq!(base.sql(DatabaseType::Sqlite).1.len(), 1);
        assert_eq!(narrowed.sql(DatabaseType::Sqlite).1.len(), 2);
        assert_eq!(base.limit_value(), None);
    }

    #[test]
    fn subquery_params_are_numbered_in_order() {
        let inner = SelectQuery::new(&ITEM).filter(col("id").gt(3));
        let outer = SelectQuery::from_subquery(ReadQuery::Select(inner), "_wrapped")
            .columns([sql("COUNT(1)")])
            .filter(col("id").lt(9));
        let (text, params) = outer.sql(DatabaseType::Postgres);
        assert_eq!(
            text,
            r#"SELECT COUNT(1) FROM (SELECT "id", "data" FROM "item" WHERE ("id" > $1)) AS "_wrapped" WHERE ("id" < $2)"#
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn paginate_is_one_based() {
        let q = SelectQuery::new(&ITEM).paginate(3, 10);
        assert_eq!(q.limit_value(), Some(10));
        assert_eq!(q.offset_value(), Some(20));
        assert!(!q.projection_shapes_rows());
        assert!(q.group_by([col("data")]).projection_shapes_rows());
    }

    #[test]
    fn paginate_saturates_huge_offsets() {
        let q = SelectQuery::new(&ITEM).paginate(u64::MAX, u64::MAX);
        assert_eq!(q.offset_value(), Some(u64::MAX));
    }
}
