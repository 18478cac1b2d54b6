//! Finding the local student an incoming record refers to.
//!
//! Keys are tried from the most to the least reliable; the first hit wins.

use council_core::{
  reference::Dimension,
  store::{StudentKey, StudentMatch, StudentStore},
};
use strum::EnumIter;

use crate::{
  catalog::Catalog,
  record::{Group, IncomingRecord},
  settings::IngestSettings,
};

/// Which key produced the match. Only used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum MatchBasis {
  ExternalId = 1,
  NationalId = 2,
  SeatNumber = 3,
  Passport   = 4,
  NoMatch    = 5,
}

impl MatchBasis {
  pub fn code(self) -> u8 { self as u8 }
}

/// The identifying keys of one incoming record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lookup {
  pub external_id:         Option<String>,
  pub national_id:         Option<String>,
  pub seat_number:         Option<String>,
  pub passport:            Option<String>,
  /// Local certificate id.
  pub certificate_id:      Option<i64>,
  /// Local year id of the certificate.
  pub certificate_year_id: Option<i64>,
}

impl Lookup {
  pub fn from_record(record: &IncomingRecord, catalog: &Catalog) -> Self {
    let mapped = |key, dimension| {
      record.text(Group::Secondary, key).and_then(|token| catalog.resolve(dimension, &token))
    };
    Self {
      external_id:         record.external_id.clone(),
      national_id:         record.text(Group::Person, "studentNID"),
      seat_number:         record.text(Group::Secondary, "studentSeatNumber"),
      passport:            record.text(Group::Person, "studentPassport"),
      certificate_id:      mapped("studentSecondaryCert_id", Dimension::Certificate),
      certificate_year_id: mapped("year_id", Dimension::Year),
    }
  }

  /// The keys to try, in order. The seat number only counts for general
  /// secondary certificates with a known certificate year.
  pub fn candidates(&self, settings: &IngestSettings) -> Vec<(MatchBasis, StudentKey)> {
    let mut keys = Vec::with_capacity(4);
    if let Some(id) = &self.external_id {
      keys.push((MatchBasis::ExternalId, StudentKey::ExternalId(id.clone())));
    }
    if let Some(id) = &self.national_id {
      keys.push((MatchBasis::NationalId, StudentKey::NationalId(id.clone())));
    }
    if settings.is_general_secondary(self.certificate_id) {
      if let (Some(seat_number), Some(certificate_year_id)) =
        (&self.seat_number, self.certificate_year_id)
      {
        keys.push((
          MatchBasis::SeatNumber,
          StudentKey::SeatNumber { seat_number: seat_number.clone(), certificate_year_id },
        ));
      }
    }
    if let Some(passport) = &self.passport {
      keys.push((MatchBasis::Passport, StudentKey::Passport(passport.clone())));
    }
    keys
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
  pub basis:   MatchBasis,
  pub student: Option<StudentMatch>,
}

pub async fn resolve<S: StudentStore>(
  store: &S,
  lookup: &Lookup,
  settings: &IngestSettings,
) -> Result<Resolution, S::Error> {
  for (basis, key) in lookup.candidates(settings) {
    if let Some(student) = store.find_student(key).await? {
      return Ok(Resolution { basis, student: Some(student) });
    }
  }
  Ok(Resolution { basis: MatchBasis::NoMatch, student: None })
}
