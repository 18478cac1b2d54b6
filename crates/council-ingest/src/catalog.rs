//! Reference data loaded once per batch.

use std::collections::HashMap;

use council_core::{
  reference::{AcademicPeriod, Dimension, ExternalIdentifierMap, Faculty, KeySource},
  store::StudentStore,
};

use crate::error::IngestError;

/// Everything a batch needs from the lookup tables. Never shared between
/// batches, since reference data may change in between.
#[derive(Debug, Clone)]
pub struct Catalog {
  pub ids:       ExternalIdentifierMap,
  pub faculties: HashMap<i64, Faculty>,
  pub period:    AcademicPeriod,
}

impl Catalog {
  pub async fn load<S: StudentStore>(store: &S, source: KeySource) -> Result<Self, IngestError> {
    let period = store
      .current_period()
      .await
      .map_err(IngestError::store)?
      .ok_or(IngestError::NoCurrentPeriod)?;
    let rows = store.reference_rows().await.map_err(IngestError::store)?;

    let faculties = rows
      .iter()
      .filter(|row| row.dimension == Dimension::Faculty)
      .map(|row| {
        (row.id, Faculty { id: row.id, university_id: row.university_id, family_id: row.family_id })
      })
      .collect();

    Ok(Self { ids: ExternalIdentifierMap::build(&rows, source), faculties, period })
  }

  pub fn resolve(&self, dimension: Dimension, token: &str) -> Option<i64> {
    self.ids.resolve(dimension, token)
  }

  /// The faculty an external faculty token points at.
  pub fn faculty(&self, token: &str) -> Option<&Faculty> {
    self.faculties.get(&self.resolve(Dimension::Faculty, token)?)
  }
}
