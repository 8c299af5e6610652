#![allow(dead_code)]

use sql_async_orm::prelude::*;
use tempfile::{TempDir, tempdir};

/// Path for a fresh SQLite file. The directory is leaked so the file
/// outlives every pooled connection opened by the test.
pub fn unique_db_path(prefix: &str) -> String {
    let dir: TempDir = tempdir().expect("tempdir");
    let path = dir.path().join(format!("{prefix}.db"));
    std::mem::forget(dir);
    path.to_string_lossy().into_owned()
}

pub fn sqlite_db(prefix: &str) -> Database {
    Database::sqlite(SqliteOptions::new(unique_db_path(prefix)))
}

macro_rules! model {
    ($name:ident, $meta:ident { $($field:ident : $ty:ty),* $(,)? }) => {
        #[derive(Debug, Clone, Default)]
        pub struct $name {
            $(pub $field: $ty,)*
            pub state: ModelState,
        }

        impl Model for $name {
            fn meta() -> &'static ModelMeta {
                &$meta
            }

            fn decode(row: &CustomDbRow) -> Result<Self, OrmError> {
                Ok(Self {
                    $($field: row.try_get(stringify!($field))?,)*
                    state: ModelState::default(),
                })
            }

            fn value(&self, field: &str) -> Option<RowValues> {
                match field {
                    $(stringify!($field) => Some(self.$field.clone().into()),)*
                    _ => None,
                }
            }

            fn set_value(&mut self, field: &str, value: RowValues) -> Result<(), OrmError> {
                match field {
                    $(stringify!($field) => {
                        self.$field = FromValue::from_value(&value).ok_or_else(|| {
                            OrmError::Decode(format!("{value:?} does not fit {field}"))
                        })?;
                    })*
                    _ => return Err(OrmError::Decode(format!("no field {field}"))),
                }
                Ok(())
            }

            fn state(&self) -> &ModelState {
                &self.state
            }

            fn state_mut(&mut self) -> &mut ModelState {
                &mut self.state
            }
        }
    };
}

pub static ITEM: ModelMeta = ModelMeta::new(
    "Item",
    "item",
    &[
        FieldMeta::new("id", FieldType::Integer).auto_increment(),
        FieldMeta::new("data", FieldType::Text),
    ],
)
.primary_key(&["id"]);

model!(Item, ITEM { id: Option<i64>, data: String });

impl Item {
    pub fn new(data: &str) -> Self {
        Item {
            data: data.to_owned(),
            ..Item::default()
        }
    }

    pub fn with_id(id: i64, data: &str) -> Self {
        Item {
            id: Some(id),
            data: data.to_owned(),
            ..Item::default()
        }
    }
}

pub static ACCOUNT: ModelMeta = ModelMeta::new(
    "Account",
    "account",
    &[
        FieldMeta::new("id", FieldType::Integer).auto_increment(),
        FieldMeta::new("email", FieldType::Text).unique(),
        FieldMeta::new("name", FieldType::Text).nullable(),
    ],
)
.primary_key(&["id"]);

model!(Account, ACCOUNT { id: Option<i64>, email: String, name: Option<String> });

fn author_meta() -> &'static ModelMeta {
    &AUTHOR
}

fn book_meta() -> &'static ModelMeta {
    &BOOK
}

fn review_meta() -> &'static ModelMeta {
    &REVIEW
}

pub static AUTHOR: ModelMeta = ModelMeta::new(
    "Author",
    "author",
    &[
        FieldMeta::new("id", FieldType::Integer).auto_increment(),
        FieldMeta::new("name", FieldType::Text),
    ],
)
.primary_key(&["id"])
.order_by(&[("name", false)])
.dependents(&[book_meta]);

pub static BOOK: ModelMeta = ModelMeta::new(
    "Book",
    "book",
    &[
        FieldMeta::new("id", FieldType::Integer).auto_increment(),
        FieldMeta::new("author_id", FieldType::Integer).references(author_meta, "id"),
        FieldMeta::new("title", FieldType::Text),
    ],
)
.primary_key(&["id"])
.dependents(&[review_meta]);

pub static REVIEW: ModelMeta = ModelMeta::new(
    "Review",
    "review",
    &[
        FieldMeta::new("id", FieldType::Integer).auto_increment(),
        FieldMeta::new("book_id", FieldType::Integer)
            .nullable()
            .references(book_meta, "id"),
        FieldMeta::new("body", FieldType::Text),
    ],
)
.primary_key(&["id"]);

model!(Author, AUTHOR { id: Option<i64>, name: String });
model!(Book, BOOK { id: Option<i64>, author_id: i64, title: String });
model!(Review, REVIEW { id: Option<i64>, book_id: Option<i64>, body: String });
