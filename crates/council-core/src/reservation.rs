//! Reservation guard: an advisory set of external ids currently being
//! processed, so two overlapping batches never work on the same id at once.

use std::{
  collections::HashMap,
  sync::{Mutex, PoisonError},
  time::{Duration, Instant},
};

/// How long a reservation survives if its batch never releases it.
pub const DEFAULT_RESERVATION_TTL: Duration = Duration::from_secs(60 * 60);

/// Backing store for reservations. An in-process map is enough for a single
/// server; a shared cache can implement the same interface.
pub trait ReservationStore: Send + Sync {
  /// Try to take `key`. Returns `true` if it was *already* reserved, `false`
  /// if it is now held by the caller.
  fn reserve(&self, key: &str) -> bool;

  fn release(&self, keys: &[String]);
}

// ─── In-memory implementation ────────────────────────────────────────────────

#[derive(Debug)]
pub struct InMemoryReservations {
  ttl:  Duration,
  held: Mutex<HashMap<String, Instant>>,
}

impl Default for InMemoryReservations {
  fn default() -> Self { Self::new(DEFAULT_RESERVATION_TTL) }
}

impl InMemoryReservations {
  pub fn new(ttl: Duration) -> Self { Self { ttl, held: Mutex::new(HashMap::new()) } }

  fn reserve_at(&self, key: &str, now: Instant) -> bool {
    let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
    held.retain(|_, taken| now.duration_since(*taken) < self.ttl);
    if held.contains_key(key) {
      return true;
    }
    held.insert(key.to_owned(), now);
    false
  }

  pub fn len(&self) -> usize {
    self.held.lock().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl ReservationStore for InMemoryReservations {
  fn reserve(&self, key: &str) -> bool { self.reserve_at(key, Instant::now()) }

  fn release(&self, keys: &[String]) {
    let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
    for key in keys {
      held.remove(key);
    }
  }
}

// ─── Batch guard ─────────────────────────────────────────────────────────────

/// Reservations taken during one batch. Everything it holds is released when
/// it goes out of scope, whatever happened to the records.
pub struct BatchReservations<'a, R: ReservationStore + ?Sized> {
  store: &'a R,
  held:  Vec<String>,
}

impl<'a, R: ReservationStore + ?Sized> BatchReservations<'a, R> {
  pub fn new(store: &'a R) -> Self { Self { store, held: Vec::new() } }

  /// Returns `true` if `key` was free and is now held by this batch.
  pub fn acquire(&mut self, key: &str) -> bool {
    if self.store.reserve(key) {
      return false;
    }
    self.held.push(key.to_owned());
    true
  }

  pub fn held(&self) -> &[String] { &self.held }
}

impl<R: ReservationStore + ?Sized> Drop for BatchReservations<'_, R> {
  fn drop(&mut self) {
    if !self.held.is_empty() {
      self.store.release(&self.held);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn second_reserve_sees_existing_reservation() {
    let reservations = InMemoryReservations::default();
    assert!(!reservations.reserve("123"));
    assert!(reservations.reserve("123"));
    assert!(!reservations.reserve("456"));
    assert_eq!(reservations.len(), 2);
  }

  #[test]
  fn release_frees_keys() {
    let reservations = InMemoryReservations::default();
    reservations.reserve("123");
    reservations.release(&["123".to_owned()]);
    assert!(reservations.is_empty());
    assert!(!reservations.reserve("123"));
  }

  #[test]
  fn expired_reservations_are_dropped() {
    let reservations = InMemoryReservations::new(Duration::from_secs(60));
    let start = Instant::now();
    assert!(!reservations.reserve_at("123", start));
    assert!(reservations.reserve_at("123", start + Duration::from_secs(30)));
    assert!(!reservations.reserve_at("123", start + Duration::from_secs(61)));
  }

  #[test]
  fn batch_guard_releases_on_drop() {
    let reservations = InMemoryReservations::default();
    {
      let mut batch = BatchReservations::new(&reservations);
      assert!(batch.acquire("a"));
      assert!(!batch.acquire("a"));
      assert!(batch.acquire("b"));
      assert_eq!(batch.held(), ["a".to_owned(), "b".to_owned()]);
    }
    assert!(reservations.is_empty());
  }

  #[test]
  fn batch_guard_leaves_foreign_reservations_alone() {
    let reservations = InMemoryReservations::default();
    reservations.reserve("other-batch");
    {
      let mut batch = BatchReservations::new(&reservations);
      assert!(!batch.acquire("other-batch"));
    }
    assert!(reservations.reserve("other-batch"));
  }
}
