//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! school billing ledger test suite.
//!
//! # Modules
//!
//! - `fixtures`: Pre-built test data for common entities
//! - `builders`: Builder patterns for requests and invoices
//! - `database`: PostgreSQL test container management and seeding
//! - `assertions`: Custom assertion helpers for ledger types
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
