//! Static table metadata a model declares about itself.

use crate::types::DatabaseType;

/// Column storage class. DDL maps each to a concrete type per dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    BigInteger,
    Float,
    /// `VARCHAR(n)`
    Char(u32),
    Text,
    Boolean,
    DateTime,
    Json,
    Blob,
}

impl FieldType {
    #[must_use]
    pub fn sql_name(self, db_type: DatabaseType) -> String {
        match (self, db_type) {
            (FieldType::Integer, _) => "INTEGER".into(),
            (FieldType::BigInteger, DatabaseType::Postgres) => "BIGINT".into(),
            (FieldType::BigInteger, DatabaseType::Sqlite) => "INTEGER".into(),
            (FieldType::Float, DatabaseType::Postgres) => "DOUBLE PRECISION".into(),
            (FieldType::Float, DatabaseType::Sqlite) => "REAL".into(),
            (FieldType::Char(n), _) => format!("VARCHAR({n})"),
            (FieldType::Text, _) => "TEXT".into(),
            (FieldType::Boolean, _) => "BOOLEAN".into(),
            (FieldType::DateTime, DatabaseType::Postgres) => "TIMESTAMP".into(),
            (FieldType::DateTime, DatabaseType::Sqlite) => "DATETIME".into(),
            (FieldType::Json, DatabaseType::Postgres) => "JSONB".into(),
            (FieldType::Json, DatabaseType::Sqlite) => "TEXT".into(),
            (FieldType::Blob, DatabaseType::Postgres) => "BYTEA".into(),
            (FieldType::Blob, DatabaseType::Sqlite) => "BLOB".into(),
        }
    }
}

/// A foreign key pointing at a column of another model.
#[derive(Debug, Clone, Copy)]
pub struct ForeignKey {
    /// Resolved lazily so models may reference each other.
    pub model: fn() -> &'static ModelMeta,
    pub column: &'static str,
}

/// Metadata about a model field/column.
#[derive(Debug, Clone, Copy)]
pub struct FieldMeta {
    pub name: &'static str,
    pub field_type: FieldType,
    pub nullable: bool,
    pub unique: bool,
    /// Create a single-column index alongside the table.
    pub index: bool,
    /// Key assigned by the backend on insert.
    pub auto_increment: bool,
    /// Default value expression (SQL).
    pub default: Option<&'static str>,
    pub foreign_key: Option<ForeignKey>,
}

impl FieldMeta {
    #[must_use]
    pub const fn new(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            nullable: false,
            unique: false,
            index: false,
            auto_increment: false,
            default: None,
            foreign_key: None,
        }
    }

    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub const fn index(mut self) -> Self {
        self.index = true;
        self
    }

    #[must_use]
    pub const fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    #[must_use]
    pub const fn default_sql(mut self, expr: &'static str) -> Self {
        self.default = Some(expr);
        self
    }

    #[must_use]
    pub const fn references(mut self, model: fn() -> &'static ModelMeta, column: &'static str) -> Self {
        self.foreign_key = Some(ForeignKey { model, column });
        self
    }
}

/// A model-level (possibly composite) index.
#[derive(Debug, Clone, Copy)]
pub struct IndexMeta {
    pub columns: &'static [&'static str],
    pub unique: bool,
}

/// Everything the engine needs to know about a model's table.
///
/// ```rust
/// use sql_async_orm::model::{FieldMeta, FieldType, ModelMeta};
///
/// static NOTE: ModelMeta = ModelMeta::new("Note", "note", &[
///     FieldMeta::new("id", FieldType::Integer).auto_increment(),
///     FieldMeta::new("body", FieldType::Text),
/// ])
/// .primary_key(&["id"]);
///
/// assert_eq!(NOTE.field("body").map(|f| f.name), Some("body"));
/// ```
#[derive(Debug)]
pub struct ModelMeta {
    /// Type name, used in error messages.
    pub name: &'static str,
    pub table_name: &'static str,
    pub schema: Option<&'static str>,
    pub fields: &'static [FieldMeta],
    /// Empty for tables without a key; more than one column for composite keys.
    pub primary_key: &'static [&'static str],
    pub indexes: &'static [IndexMeta],
    /// Default ordering applied by `select()`: `(column, descending)`.
    pub order_by: &'static [(&'static str, bool)],
    /// Models holding a foreign key to this one, walked by recursive deletes.
    pub dependents: &'static [fn() -> &'static ModelMeta],
}

impl ModelMeta {
    #[must_use]
    pub const fn new(name: &'static str, table_name: &'static str, fields: &'static [FieldMeta]) -> Self {
        Self {
            name,
            table_name,
            schema: None,
            fields,
            primary_key: &[],
            indexes: &[],
            order_by: &[],
            dependents: &[],
        }
    }

    #[must_use]
    pub const fn schema(mut self, schema: &'static str) -> Self {
        self.schema = Some(schema);
        self
    }

    #[must_use]
    pub const fn primary_key(mut self, columns: &'static [&'static str]) -> Self {
        self.primary_key = columns;
        self
    }

    #[must_use]
    pub const fn indexes(mut self, indexes: &'static [IndexMeta]) -> Self {
        self.indexes = indexes;
        self
    }

    #[must_use]
    pub const fn order_by(mut self, order: &'static [(&'static str, bool)]) -> Self {
        self.order_by = order;
        self
    }

    #[must_use]
    pub const fn dependents(mut self, dependents: &'static [fn() -> &'static ModelMeta]) -> Self {
        self.dependents = dependents;
        self
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&'static FieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn is_primary_key(&self, name: &str) -> bool {
        self.primary_key.contains(&name)
    }

    /// Whether the backend generates this model's key (a single auto-increment column).
    #[must_use]
    pub fn has_generated_key(&self) -> bool {
        match self.primary_key {
            [only] => self.field(only).is_some_and(|f| f.auto_increment),
            _ => false,
        }
    }

    /// Foreign keys on `self` that point at `target`.
    pub fn foreign_keys_to<'a>(&'a self, target: &'a ModelMeta) -> impl Iterator<Item = (&'static FieldMeta, ForeignKey)> + 'a {
        self.fields.iter().filter_map(move |f| {
            f.foreign_key
                .filter(|fk| std::ptr::eq((fk.model)(), target))
                .map(|fk| (f, fk))
        })
    }
}

/// Order models so every table comes after the tables it references.
/// Self-references and cycles are tolerated; the first visit wins.
#[must_use]
pub fn sort_models(models: &[&'static ModelMeta]) -> Vec<&'static ModelMeta> {
    fn visit(
        meta: &'static ModelMeta,
        in_scope: &[&'static ModelMeta],
        seen: &mut Vec<&'static ModelMeta>,
        out: &mut Vec<&'static ModelMeta>,
    ) {
        if seen.iter().any(|m| std::ptr::eq(*m, meta)) {
            return;
        }
        seen.push(meta);
        for fk in meta.fields.iter().filter_map(|f| f.foreign_key) {
            let parent = (fk.model)();
            if in_scope.iter().any(|m| std::ptr::eq(*m, parent)) {
                visit(parent, in_scope, seen, out);
            }
        }
        out.push(meta);
    }

    let mut seen = Vec::new();
    let mut out = Vec::with_capacity(models.len());
    for meta in models {
        visit(meta, models, &mut seen, &mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    static AUTHOR: ModelMeta = ModelMeta::new(
        "Author",
        "author",
        &[FieldMeta::new("id", FieldType::Integer).auto_increment()],
    )
    .primary_key(&["id"])
    .dependents(&[book_meta]);

    static BOOK: ModelMeta = ModelMeta::new(
        "Book",
        "book",
        &[
            FieldMeta::new("id", FieldType::Integer).auto_increment(),
            FieldMeta::new("author_id", FieldType::Integer).references(author_meta, "id"),
        ],
    )
    .primary_key(&["id"]);

    fn author_meta() -> &'static ModelMeta {
        &AUTHOR
    }

    fn book_meta() -> &'static ModelMeta {
        &BOOK
    }

    #[test]
    fn referenced_tables_sort_first() {
        let order = sort_models(&[&BOOK, &AUTHOR]);
        let names: Vec<_> = order.iter().map(|m| m.table_name).collect();
        assert_eq!(names, ["author", "book"]);
    }

    #[test]
    fn foreign_keys_resolve_to_target() {
        let fks: Vec<_> = BOOK.foreign_keys_to(&AUTHOR).map(|(f, _)| f.name).collect();
        assert_eq!(fks, ["author_id"]);
        assert!(AUTHOR.has_generated_key());
        assert_eq!(AUTHOR.foreign_keys_to(&BOOK).count(), 0);
    }
}
