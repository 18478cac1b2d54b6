//! JSON HTTP API for the council engine.
//!
//! Exposes an axum [`Router`] backed by any [`StudentStore`]. Authentication,
//! TLS and transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", council_api::api_router(state.clone()))
//! ```

pub mod error;
pub mod old_council;
pub mod students;

mod body;

use std::sync::Arc;

use axum::{
  Router,
  routing::{delete, get, post},
};
use council_core::{
  reservation::{InMemoryReservations, ReservationStore},
  store::StudentStore,
};
use council_ingest::{
  IngestSettings, Ingestor,
  legacy::{HttpLegacySource, LegacySource},
};
use serde::Serialize;

pub use error::ApiError;

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct ApiState<S, L = HttpLegacySource> {
  pub store:        Arc<S>,
  /// Shared by every request so overlapping batches see each other.
  pub reservations: Arc<dyn ReservationStore>,
  pub settings:     Arc<IngestSettings>,
  /// The old council, when migration is configured.
  pub legacy:       Option<Arc<L>>,
}

impl<S, L> Clone for ApiState<S, L> {
  fn clone(&self) -> Self {
    Self {
      store:        self.store.clone(),
      reservations: self.reservations.clone(),
      settings:     self.settings.clone(),
      legacy:       self.legacy.clone(),
    }
  }
}

impl<S: StudentStore, L> ApiState<S, L> {
  /// State with in-process reservations and no old council.
  pub fn new(store: Arc<S>, settings: IngestSettings) -> Self {
    Self {
      store,
      reservations: Arc::new(InMemoryReservations::new(settings.reservation_ttl())),
      settings: Arc::new(settings),
      legacy: None,
    }
  }

  pub fn with_legacy(mut self, source: L) -> Self {
    self.legacy = Some(Arc::new(source));
    self
  }

  pub fn ingestor(&self) -> Ingestor<'_, S> {
    Ingestor::new(self.store.as_ref(), self.reservations.as_ref(), &self.settings)
  }
}

// ─── Responses ────────────────────────────────────────────────────────────────

pub const OKAY: &str = "Operation successfully completed";

/// Envelope of every successful response.
#[derive(Debug, Serialize)]
pub struct Reply<T> {
  pub message: String,
  pub data:    T,
}

impl<T> Reply<T> {
  pub fn ok(data: T) -> Self { Self { message: OKAY.to_owned(), data } }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, L>(state: ApiState<S, L>) -> Router<()>
where
  S: StudentStore + 'static,
  L: LegacySource + 'static,
{
  Router::new()
    // Intake
    .route("/students/send", post(students::send::<S, L>))
    .route("/students/withdraw", post(students::withdraw::<S, L>))
    .route("/students/repeated-records", delete(students::remove_repeated::<S, L>))
    // Audit
    .route("/students/{id}/transactions", get(students::transactions::<S, L>))
    .route(
      "/students/{id}/transactions/{transaction_id}/revert",
      post(students::revert::<S, L>),
    )
    // Old council
    .route("/old-council/faculties", post(old_council::migrate::<S, L>))
    .with_state(state)
}

/// `GET /health`. Answers without touching the store.
pub async fn health() -> &'static str { "ok" }
