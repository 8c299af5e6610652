use super::compiler::{SqlQuery, SqlWriter};
use crate::model::{FieldMeta, ModelMeta};
use crate::types::DatabaseType;

/// `CREATE TABLE` for a model.
#[derive(Debug, Clone, Copy)]
pub struct CreateTable {
    pub meta: &'static ModelMeta,
    /// Emit `IF NOT EXISTS`.
    pub safe: bool,
}

fn write_column(w: &mut SqlWriter, meta: &ModelMeta, field: &FieldMeta) {
    let inline_pk = meta.primary_key == [field.name];
    w.push_ident(field.name).push(" ");
    match (w.db_type(), field.auto_increment && inline_pk) {
        (DatabaseType::Postgres, true) => {
            w.push(match field.field_type {
                crate::model::FieldType::BigInteger => "BIGSERIAL",
                _ => "SERIAL",
            });
        }
        // An INTEGER PRIMARY KEY aliases the rowid and is assigned on insert.
        (DatabaseType::Sqlite, true) => {
            w.push("INTEGER");
        }
        (db_type, false) => {
            w.push(&field.field_type.sql_name(db_type));
        }
    }
    if inline_pk {
        w.push(" PRIMARY KEY");
    } else if !field.nullable {
        w.push(" NOT NULL");
    }
    if field.unique && !inline_pk {
        w.push(" UNIQUE");
    }
    if let Some(default) = field.default {
        w.push(" DEFAULT ").push(default);
    }
    if let Some(fk) = field.foreign_key {
        w.push(" REFERENCES ").push_table((fk.model)());
        w.push(" (").push_ident(fk.column).push(")");
    }
}

impl SqlQuery for CreateTable {
    fn write_sql(&self, w: &mut SqlWriter) {
        w.push("CREATE TABLE ");
        if self.safe {
            w.push("IF NOT EXISTS ");
        }
        w.push_table(self.meta).push(" (");
        w.push_comma_separated(self.meta.fields, |w, f| write_column(w, self.meta, f));
        if self.meta.primary_key.len() > 1 {
            w.push(", PRIMARY KEY (");
            w.push_comma_separated(self.meta.primary_key, |w, c| {
                w.push_ident(c);
            });
            w.push(")");
        }
        w.push(")");
    }
}

/// `CREATE [UNIQUE] INDEX` over some of a model's columns.
#[derive(Debug, Clone, Copy)]
pub struct CreateIndex {
    pub meta: &'static ModelMeta,
    pub columns: &'static [&'static str],
    pub unique: bool,
    pub safe: bool,
}

impl CreateIndex {
    #[must_use]
    pub fn name(&self) -> String {
        format!("{}_{}", self.meta.table_name, self.columns.join("_"))
    }
}

impl SqlQuery for CreateIndex {
    fn write_sql(&self, w: &mut SqlWriter) {
        w.push(if self.unique {
            "CREATE UNIQUE INDEX "
        } else {
            "CREATE INDEX "
        });
        if self.safe {
            w.push("IF NOT EXISTS ");
        }
        w.push_ident(&self.name()).push(" ON ").push_table(self.meta).push(" (");
        w.push_comma_separated(self.columns, |w, c| {
            w.push_ident(c);
        });
        w.push(")");
    }
}

/// `DROP TABLE` for a model.
#[derive(Debug, Clone, Copy)]
pub struct DropTable {
    pub meta: &'static ModelMeta,
    /// Emit `IF EXISTS`.
    pub safe: bool,
    /// Postgres only: also drop dependent objects.
    pub cascade: bool,
}

impl SqlQuery for DropTable {
    fn write_sql(&self, w: &mut SqlWriter) {
        w.push("DROP TABLE ");
        if self.safe {
            w.push("IF EXISTS ");
        }
        w.push_table(self.meta);
        if self.cascade && w.db_type() == DatabaseType::Postgres {
            w.push(" CASCADE");
        }
    }
}

/// Remove every row. SQLite has no `TRUNCATE`, so it gets an unfiltered `DELETE`.
#[derive(Debug, Clone, Copy)]
pub struct TruncateTable {
    pub meta: &'static ModelMeta,
}

impl SqlQuery for TruncateTable {
    fn write_sql(&self, w: &mut SqlWriter) {
        match w.db_type() {
            DatabaseType::Postgres => {
                w.push("TRUNCATE TABLE ").push_table(self.meta);
            }
            DatabaseType::Sqlite => {
                w.push("DELETE FROM ").push_table(self.meta);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldType;

    static USER: ModelMeta = ModelMeta::new(
        "User",
        "users",
        &[
            FieldMeta::new("id", FieldType::Integer).auto_increment(),
            FieldMeta::new("email", FieldType::Char(255)).unique(),
            FieldMeta::new("bio", FieldType::Text).nullable(),
        ],
    )
    .primary_key(&["id"]);

    static MEMBERSHIP: ModelMeta = ModelMeta::new(
        "Membership",
        "membership",
        &[
            FieldMeta::new("user_id", FieldType::Integer).references(user_meta, "id"),
            FieldMeta::new("team", FieldType::Text),
        ],
    )
    .primary_key(&["user_id", "team"]);

    fn user_meta() -> &'static ModelMeta {
        &USER
    }

    #[test]
    fn auto_increment_keys_per_dialect() {
        let create = CreateTable {
            meta: &USER,
            safe: true,
        };
        assert_eq!(
            create.sql(DatabaseType::Postgres).0,
            r#"CREATE TABLE IF NOT EXISTS "users" ("id" SERIAL PRIMARY KEY, "email" VARCHAR(255) NOT NULL UNIQUE, "bio" TEXT)"#
        );
        assert_eq!(
            create.sql(DatabaseType::Sqlite).0,
            r#"CREATE TABLE IF NOT EXISTS "users" ("id" INTEGER PRIMARY KEY, "email" VARCHAR(255) NOT NULL UNIQUE, "bio" TEXT)"#
        );
    }

    #[test]
    fn composite_keys_and_references() {
        let (sql, _) = CreateTable {
            meta: &MEMBERSHIP,
            safe: false,
        }
        .sql(DatabaseType::Sqlite);
        assert_eq!(
            sql,
            r#"CREATE TABLE "membership" ("user_id" INTEGER NOT NULL REFERENCES "users" ("id"), "team" TEXT NOT NULL, PRIMARY KEY ("user_id", "team"))"#
        );
    }

    #[test]
    fn truncate_falls_back_to_delete_on_sqlite() {
        let truncate = TruncateTable { meta: &USER };
        assert_eq!(truncate.sql(DatabaseType::Sqlite).0, r#"DELETE FROM "users""#);
        assert_eq!(truncate.sql(DatabaseType::Postgres).0, r#"TRUNCATE TABLE "users""#);
    }
}
