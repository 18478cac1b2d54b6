//! Core types and trait definitions for the council student-records backend.
//!
//! This crate has no HTTP or database dependencies. The storage backend, the
//! reconciliation engine and the HTTP layer all build on the types here.

pub mod error;
pub mod reference;
pub mod reservation;
pub mod store;
pub mod student;
pub mod transaction;

pub use error::{Error, Result};
