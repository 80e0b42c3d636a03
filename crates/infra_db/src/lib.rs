//! Infrastructure Database Layer
//!
//! PostgreSQL storage for the school billing ledger using SQLx.
//!
//! # Architecture
//!
//! - [`pool`]: connection pool configuration and schema migrations
//! - [`repositories`]: `FromRow` row types and their mapping onto domain types
//! - [`adapters`]: [`PostgresLedger`], the `LedgerPort` implementation whose
//!   units of work wrap a single database transaction
//!
//! Queries are built at runtime with `sqlx::query_as` and `bind`, so the
//! crate compiles without a live database.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresLedger};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/school_ledger")).await?;
//! run_migrations(&pool).await?;
//! let ledger = PostgresLedger::new(pool);
//! ```

pub mod pool;
pub mod error;
pub mod repositories;
pub mod adapters;

pub use pool::{create_pool, run_migrations, DatabaseConfig, DatabasePool};
pub use error::DatabaseError;
pub use adapters::{PgLedgerUnitOfWork, PostgresLedger};
