//! Domain Adapters
//!
//! Port implementations backed by PostgreSQL. Adapters translate between
//! domain types and the row types in [`crate::repositories`], and map
//! [`crate::DatabaseError`] onto `PortError` at the boundary.
//!
//! # Usage
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresLedger;
//! use domain_billing::{LedgerPort, LedgerServices};
//! use std::sync::Arc;
//!
//! let ledger: Arc<dyn LedgerPort> = Arc::new(PostgresLedger::new(pool));
//! let services = LedgerServices::new(ledger);
//! ```

pub mod ledger;

pub use ledger::{PgLedgerUnitOfWork, PostgresLedger};
