use std::fmt::Write;

use super::expr::{Expr, Ordering};
use crate::model::ModelMeta;
use crate::types::{DatabaseType, RowValues};

/// Anything that renders to SQL text plus ordered parameters.
pub trait SqlQuery {
    fn write_sql(&self, w: &mut SqlWriter);

    /// Render for one dialect.
    fn sql(&self, db_type: DatabaseType) -> (String, Vec<RowValues>) {
        let mut w = SqlWriter::new(db_type);
        self.write_sql(&mut w);
        w.finish()
    }
}

/// Accumulates SQL text and numbers placeholders in the dialect's style
/// (`$n` for Postgres, `?n` for SQLite).
#[derive(Debug)]
pub struct SqlWriter {
    db_type: DatabaseType,
    sql: String,
    params: Vec<RowValues>,
}

impl SqlWriter {
    #[must_use]
    pub fn new(db_type: DatabaseType) -> Self {
        Self {
            db_type,
            sql: String::with_capacity(128),
            params: Vec::new(),
        }
    }

    #[must_use]
    pub fn db_type(&self) -> DatabaseType {
        self.db_type
    }

    pub fn push(&mut self, text: &str) -> &mut Self {
        self.sql.push_str(text);
        self
    }

    /// Quote an identifier; dotted names are quoted part by part.
    pub fn push_ident(&mut self, name: &str) -> &mut Self {
        if name == "*" {
            self.sql.push('*');
            return self;
        }
        for (i, part) in name.split('.').enumerate() {
            if i > 0 {
                self.sql.push('.');
            }
            if part == "*" {
                self.sql.push('*');
                continue;
            }
            self.sql.push('"');
            self.sql.push_str(&part.replace('"', "\"\""));
            self.sql.push('"');
        }
        self
    }

    pub fn push_table(&mut self, meta: &ModelMeta) -> &mut Self {
        // Schemas only mean something to Postgres; SQLite would read it as an attached db.
        if let (Some(schema), DatabaseType::Postgres) = (meta.schema, self.db_type) {
            self.push_ident(schema).push(".");
        }
        self.push_ident(meta.table_name)
    }

    pub fn push_param(&mut self, value: RowValues) -> &mut Self {
        self.params.push(value);
        let n = self.params.len();
        let marker = match self.db_type {
            DatabaseType::Postgres => '$',
            DatabaseType::Sqlite => '?',
        };
        // Writing to a String cannot fail.
        let _ = write!(self.sql, "{marker}{n}");
        self
    }

    pub fn push_comma_separated<T>(&mut self, items: &[T], mut each: impl FnMut(&mut Self, &T)) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            each(self, item);
        }
    }

    pub fn push_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Column(name) => {
                self.push_ident(name);
            }
            Expr::Value(value) => {
                self.push_param(value.clone());
            }
            Expr::Sql(fragment) => {
                self.push(fragment);
            }
            Expr::Binary(lhs, op, rhs) => {
                self.push("(");
                self.push_expr(lhs);
                self.push(" ").push(op.as_sql()).push(" ");
                self.push_expr(rhs);
                self.push(")");
            }
            Expr::Not(inner) => {
                self.push("NOT ");
                self.push_expr(inner);
            }
            Expr::IsNull { expr, negated } => {
                self.push("(");
                self.push_expr(expr);
                self.push(if *negated { " IS NOT NULL)" } else { " IS NULL)" });
            }
            Expr::InList {
                values, negated, ..
            } if values.is_empty() => {
                // `IN ()` is a syntax error on both backends.
                self.push(if *negated { "(1 = 1)" } else { "(1 = 0)" });
            }
            Expr::InList {
                expr,
                values,
                negated,
            } => {
                self.push("(");
                self.push_expr(expr);
                self.push(if *negated { " NOT IN (" } else { " IN (" });
                self.push_comma_separated(values, |w, v| w.push_expr(v));
                self.push("))");
            }
            Expr::InQuery {
                expr,
                query,
                negated,
            } => {
                self.push("(");
                self.push_expr(expr);
                self.push(if *negated { " NOT IN (" } else { " IN (" });
                query.write_sql(self);
                self.push("))");
            }
            Expr::Func { name, args } => {
                self.push(name).push("(");
                self.push_comma_separated(args, |w, a| w.push_expr(a));
                self.push(")");
            }
            Expr::Alias(inner, alias) => {
                self.push_expr(inner);
                self.push(" AS ").push_ident(alias);
            }
        }
    }

    pub fn push_ordering(&mut self, ordering: &[Ordering]) {
        if ordering.is_empty() {
            return;
        }
        self.push(" ORDER BY ");
        self.push_comma_separated(ordering, |w, o| {
            w.push_expr(&o.expr);
            if o.descending {
                w.push(" DESC");
            }
        });
    }

    pub fn push_returning(&mut self, columns: &[String]) {
        if columns.is_empty() {
            return;
        }
        self.push(" RETURNING ");
        self.push_comma_separated(columns, |w, c| {
            w.push_ident(c);
        });
    }

    #[must_use]
    pub fn finish(self) -> (String, Vec<RowValues>) {
        (self.sql, self.params)
    }
}
