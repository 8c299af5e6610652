use super::Model;
use crate::types::RowValues;

/// Field values as of the last load or save, used to find dirty fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelState {
    persisted: Option<Vec<RowValues>>,
}

impl ModelState {
    /// Whether the instance was loaded from, or written to, the database.
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        self.persisted.is_some()
    }

    /// Forget the snapshot; every field counts as dirty again.
    pub fn reset(&mut self) {
        self.persisted = None;
    }
}

pub(crate) fn snapshot<M: Model>(instance: &mut M) {
    let values = M::meta()
        .fields
        .iter()
        .map(|f| instance.value(f.name).unwrap_or(RowValues::Null))
        .collect();
    instance.state_mut().persisted = Some(values);
}

/// Fields whose value differs from the snapshot; all fields without one.
pub(crate) fn dirty_fields<M: Model>(instance: &M) -> Vec<&'static str> {
    let fields = M::meta().fields;
    let Some(persisted) = &instance.state().persisted else {
        return fields.iter().map(|f| f.name).collect();
    };
    fields
        .iter()
        .zip(persisted)
        .filter(|(f, old)| instance.value(f.name).as_ref().unwrap_or(&RowValues::Null) != *old)
        .map(|(f, _)| f.name)
        .collect()
}
