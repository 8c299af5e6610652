use crate::error::Result;
use crate::executor::Target;
use crate::model::{Model, ModelExt};
use crate::results::CustomDbRow;
use crate::types::RowValues;

/// How a result row is shaped for the caller.
///
/// Chosen when the query is built (`select()` yields models, `.tuples()`
/// and `.dicts()` switch shape), never at execution time.
pub trait FromRow: Clone + Send + Sync + Sized + 'static {
    /// # Errors
    /// `OrmError::Decode` when the row does not fit the shape.
    fn from_row(row: CustomDbRow) -> Result<Self>;
}

/// Dict rows: values addressed by column name.
impl FromRow for CustomDbRow {
    fn from_row(row: CustomDbRow) -> Result<Self> {
        Ok(row)
    }
}

/// Tuple rows: values in column order.
impl FromRow for Vec<RowValues> {
    fn from_row(row: CustomDbRow) -> Result<Self> {
        Ok(row.into_values())
    }
}

/// Model rows come back clean: the decoded values are the persisted ones.
impl<M: Model> FromRow for M {
    fn from_row(row: CustomDbRow) -> Result<Self> {
        let mut instance = M::decode(&row)?;
        instance.mark_persisted();
        Ok(instance)
    }
}

/// Redirect a not-yet-executed handle at an explicit database or transaction.
pub trait Bind: Sized {
    /// # Errors
    /// `OrmError::AlreadyExecuted` when results are already cached.
    fn bind(self, target: impl Into<Target>) -> Result<Self>;
}
