//! Model declarations and the async façade built on them.
//!
//! A model is a plain struct plus a static [`ModelMeta`]. Implementing
//! [`Model`] (metadata, row decoding, field access) is all that is needed;
//! every query and persistence helper comes from the blanket [`ModelExt`].
//!
//! ```rust
//! use sql_async_orm::prelude::*;
//!
//! static NOTE: ModelMeta = ModelMeta::new(
//!     "Note",
//!     "note",
//!     &[
//!         FieldMeta::new("id", FieldType::Integer).auto_increment(),
//!         FieldMeta::new("body", FieldType::Text),
//!     ],
//! )
//! .primary_key(&["id"]);
//!
//! #[derive(Debug, Clone, Default)]
//! struct Note {
//!     id: Option<i64>,
//!     body: String,
//!     state: ModelState,
//! }
//!
//! impl Model for Note {
//!     fn meta() -> &'static ModelMeta {
//!         &NOTE
//!     }
//!
//!     fn decode(row: &CustomDbRow) -> Result<Self, OrmError> {
//!         Ok(Note {
//!             id: row.try_get("id")?,
//!             body: row.try_get("body")?,
//!             state: ModelState::default(),
//!         })
//!     }
//!
//!     fn value(&self, field: &str) -> Option<RowValues> {
//!         match field {
//!             "id" => Some(self.id.into()),
//!             "body" => Some(self.body.clone().into()),
//!             _ => None,
//!         }
//!     }
//!
//!     fn set_value(&mut self, field: &str, value: RowValues) -> Result<(), OrmError> {
//!         match field {
//!             "id" => self.id = value.as_int().copied(),
//!             "body" => self.body = value.as_text().unwrap_or_default().to_owned(),
//!             _ => return Err(OrmError::Decode(format!("Note has no field {field}"))),
//!         }
//!         Ok(())
//!     }
//!
//!     fn state(&self) -> &ModelState {
//!         &self.state
//!     }
//!
//!     fn state_mut(&mut self) -> &mut ModelState {
//!         &mut self.state
//!     }
//! }
//!
//! let note = Note { body: "hi".into(), ..Note::default() };
//! assert_eq!(note.dirty_fields(), vec!["id", "body"]);
//! ```

mod facade;
mod meta;
pub mod schema;
mod state;
mod using;

pub use facade::{DeleteOptions, ModelExt, SaveOptions};
pub use meta::{FieldMeta, FieldType, ForeignKey, IndexMeta, ModelMeta, sort_models};
pub use state::ModelState;
pub use using::Using;

use crate::error::Result;
use crate::executor::Target;
use crate::results::CustomDbRow;
use crate::types::RowValues;

/// A struct mapped to one table.
pub trait Model: Clone + Send + Sync + 'static {
    fn meta() -> &'static ModelMeta;

    /// Build an instance from a row holding (at least) every declared field.
    ///
    /// # Errors
    /// `OrmError::Decode` for a missing or mistyped column.
    fn decode(row: &CustomDbRow) -> Result<Self>;

    /// Current value of a declared field; `None` for an unknown name.
    fn value(&self, field: &str) -> Option<RowValues>;

    /// # Errors
    /// `OrmError::Decode` for an unknown field or a value of the wrong type.
    fn set_value(&mut self, field: &str, value: RowValues) -> Result<()>;

    /// Persistence bookkeeping carried by every instance.
    fn state(&self) -> &ModelState;

    fn state_mut(&mut self) -> &mut ModelState;

    /// Where queries run when no target is given explicitly.
    fn database() -> Option<Target> {
        None
    }
}
