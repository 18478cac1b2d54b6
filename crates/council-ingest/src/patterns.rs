//! Text patterns shared by the validators and the legacy normaliser.

use std::sync::LazyLock;

use regex::Regex;

pub static INTEGER: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^\d+$").expect("INTEGER is a valid regex pattern"));

/// Domestic national id: century, birth date, governorate, serial.
pub static NATIONAL_ID: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(
    r"^(2|3)[0-9][0-9](0[1-9]|1[0-2])(0[1-9]|1[0-9]|2[0-9]|3[0-1])(01|02|03|04|11|12|13|14|15|16|17|18|19|21|22|23|24|25|26|27|28|29|31|32|33|34|35|88)\d{5}$",
  )
  .expect("NATIONAL_ID is a valid regex pattern")
});

/// Arabic or Latin letters, `-`, `_`, `|` and whitespace only.
pub static LETTERS_ONLY: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^[\x{0600}-\x{065F}\x{066A}-\x{06EF}\x{06FA}-\x{06FF}a-zA-Z\-_|\s]*$")
    .expect("LETTERS_ONLY is a valid regex pattern")
});

/// Any character [`LETTERS_ONLY`] rejects.
pub static DISALLOWED_NAME_CHARS: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"[^\x{0600}-\x{065F}\x{066A}-\x{06EF}\x{06FA}-\x{06FF}a-zA-Z\-_|\s]")
    .expect("DISALLOWED_NAME_CHARS is a valid regex pattern")
});

pub static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(
    r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*@(?:[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?\.)+[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?$",
  )
  .expect("EMAIL is a valid regex pattern")
});

pub static PHONE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(
    r"^\s*(?:\+?(\d{1,3}))?([-. (]*(\d{3})[-. )]*)?((\d{3})[-. ]*(\d{2,4})(?:[-.x ]*(\d+))?)\s*$",
  )
  .expect("PHONE is a valid regex pattern")
});

/// Up to three integer and three fractional digits, or empty.
pub static TOTAL_DEGREE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^(|(\d{1,3})?(\.\d{1,3})?)$").expect("TOTAL_DEGREE is a valid regex pattern")
});

/// A non-negative decimal number.
pub static DECIMAL: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^\d+(\.\d+)?$").expect("DECIMAL is a valid regex pattern"));

/// `YYYY-MM-DD` prefix; a time part may follow.
pub static ISO_DATE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^(19|20)\d\d-(0[1-9]|1[0-2])-(0[1-9]|[12][0-9]|3[01])")
    .expect("ISO_DATE is a valid regex pattern")
});

pub fn is_arabic_letter(c: char) -> bool {
  matches!(c, '\u{0600}'..='\u{065F}' | '\u{066A}'..='\u{06EF}' | '\u{06FA}'..='\u{06FF}')
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn collapse_spaces(s: &str) -> String { s.split_whitespace().collect::<Vec<_>>().join(" ") }
