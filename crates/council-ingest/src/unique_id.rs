//! Generation of the human-facing student id.
//!
//! The id is assigned once, when a student is first created, and never
//! changes afterwards.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use rand_core::{OsRng, RngCore as _};

pub fn generate(now: DateTime<Utc>) -> String {
  let mut random = [0u8; 9];
  OsRng.fill_bytes(&mut random);
  compose(now.timestamp(), &random)
}

/// `TTTTT-TTTRR-RRRRR-RRRRR`: the timestamp without its two leading digits,
/// then the base64 of `random` with `/` and `+` replaced by `0`, upper-cased.
pub fn compose(timestamp: i64, random: &[u8; 9]) -> String {
  let digits = timestamp.to_string();
  let digits = digits.get(2..).unwrap_or(&digits);
  let (head, tail) = digits.split_at(digits.len().min(5));

  // 9 bytes encode to exactly 12 characters, without padding.
  let suffix = STANDARD.encode(random).replace(['/', '+'], "0").to_uppercase();
  format!("{head}-{tail}{}-{}-{}", &suffix[..2], &suffix[2..7], &suffix[7..])
}

#[cfg(test)]
mod tests {
  use std::collections::HashSet;

  use chrono::TimeZone as _;

  use super::*;

  #[test]
  fn layout() {
    assert_eq!(compose(1_723_456_789, &[0; 9]), "23456-789AA-AAAAA-AAAAA");
    assert_eq!(compose(1_723_456_789, &[0xff; 9]), "23456-78900-00000-00000");
  }

  #[test]
  fn generated_ids_differ() {
    let now = Utc.with_ymd_and_hms(2024, 8, 1, 12, 0, 0).unwrap();
    let ids: HashSet<String> = (0..50).map(|_| generate(now)).collect();
    assert_eq!(ids.len(), 50);
    assert!(ids.iter().all(|id| id.len() == 23 && id.starts_with("22513")));
  }
}
