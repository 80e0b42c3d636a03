//! Database Test Utilities
//!
//! Starts a PostgreSQL container with the ledger schema applied and seeds
//! the rows the ledger reads but does not own (inventory, enrollments).

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};
use tokio::sync::OnceCell;

use core_kernel::{InventoryItemId, SchoolId};
use domain_billing::StudentBillingContext;

const POSTGRES_IMAGE: &str = "postgres";
const POSTGRES_TAG: &str = "16-alpine";
const POSTGRES_USER: &str = "ledger_test";
const POSTGRES_PASSWORD: &str = "ledger_test";
const POSTGRES_DB: &str = "school_ledger_test";

/// Ledger tables, children first
const LEDGER_TABLES: [&str; 10] = [
    "payment_allocations",
    "payments",
    "invoice_items",
    "invoices",
    "invoice_number_sequences",
    "student_fee_assignments",
    "fee_components",
    "fee_structures",
    "student_enrollments",
    "inventory_items",
];

pub type TestResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Configuration for test database
#[derive(Debug, Clone)]
pub struct TestDatabaseConfig {
    pub user: String,
    pub password: String,
    pub database: String,
    pub host: String,
    pub port: u16,
}

impl Default for TestDatabaseConfig {
    fn default() -> Self {
        Self {
            user: POSTGRES_USER.to_string(),
            password: POSTGRES_PASSWORD.to_string(),
            database: POSTGRES_DB.to_string(),
            host: "localhost".to_string(),
            port: 5432,
        }
    }
}

impl TestDatabaseConfig {
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

/// A PostgreSQL test container with the ledger schema
pub struct TestDatabase {
    _container: ContainerAsync<GenericImage>,
    pub config: TestDatabaseConfig,
    pub pool: PgPool,
}

impl TestDatabase {
    /// Starts a new container and applies the schema
    ///
    /// # Errors
    ///
    /// Returns an error if the container fails to start or the schema fails to apply
    pub async fn new() -> TestResult<Self> {
        let container = GenericImage::new(POSTGRES_IMAGE, POSTGRES_TAG)
            .with_exposed_port(5432.tcp())
            .with_wait_for(WaitFor::message_on_stderr("database system is ready to accept connections"))
            .with_env_var("POSTGRES_USER", POSTGRES_USER)
            .with_env_var("POSTGRES_PASSWORD", POSTGRES_PASSWORD)
            .with_env_var("POSTGRES_DB", POSTGRES_DB)
            .start()
            .await?;

        let port = container.get_host_port_ipv4(5432).await?;
        let host = container.get_host().await?.to_string();

        let config = TestDatabaseConfig {
            host,
            port,
            ..TestDatabaseConfig::default()
        };

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&config.connection_url())
            .await?;

        let test_db = Self {
            _container: container,
            config,
            pool,
        };
        test_db.init_schema().await?;

        Ok(test_db)
    }

    async fn init_schema(&self) -> TestResult<()> {
        let schema = include_str!("../../../migrations/20260101_000001_billing_ledger.sql");
        sqlx::raw_sql(schema).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Clears all ledger rows while preserving the schema
    pub async fn clear_data(&self) -> TestResult<()> {
        sqlx::query(&format!("TRUNCATE TABLE {} CASCADE", LEDGER_TABLES.join(", ")))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Inserts an inventory item with the given stock level
pub async fn seed_inventory_item(
    pool: &PgPool,
    school_id: SchoolId,
    name: &str,
    quantity_in_stock: i32,
) -> TestResult<InventoryItemId> {
    let id = InventoryItemId::new();
    sqlx::query(
        "INSERT INTO inventory_items (inventory_item_id, school_id, name, quantity_in_stock) \
         VALUES ($1, $2, $3, $4)",
    )
    .bind(id.as_uuid())
    .bind(school_id.as_uuid())
    .bind(name)
    .bind(quantity_in_stock)
    .execute(pool)
    .await?;
    Ok(id)
}

/// Records a student's class or level placement for an academic year
pub async fn seed_enrollment(pool: &PgPool, context: &StudentBillingContext) -> TestResult<()> {
    sqlx::query(
        "INSERT INTO student_enrollments (school_id, student_id, academic_year_id, class_id, school_level_id) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(context.school_id.as_uuid())
    .bind(context.student_id.as_uuid())
    .bind(context.academic_year_id.as_uuid())
    .bind(context.class_id.map(uuid::Uuid::from))
    .bind(context.school_level_id.map(uuid::Uuid::from))
    .execute(pool)
    .await?;
    Ok(())
}

/// Current stock level of an inventory item
pub async fn stock_level(pool: &PgPool, id: InventoryItemId) -> TestResult<i32> {
    let level: i32 = sqlx::query_scalar("SELECT quantity_in_stock FROM inventory_items WHERE inventory_item_id = $1")
        .bind(id.as_uuid())
        .fetch_one(pool)
        .await?;
    Ok(level)
}

/// Global test database for shared integration tests
static SHARED_TEST_DB: OnceCell<Arc<TestDatabase>> = OnceCell::const_new();

/// Gets or creates a shared test database instance
///
/// Tests sharing the instance must scope their rows by a fresh school id.
///
/// # Panics
///
/// Panics if the database fails to initialize
pub async fn get_shared_test_database() -> Arc<TestDatabase> {
    SHARED_TEST_DB
        .get_or_init(|| async {
            Arc::new(
                TestDatabase::new()
                    .await
                    .expect("Failed to create shared test database"),
            )
        })
        .await
        .clone()
}

/// Creates an isolated test database for a single test
pub async fn create_isolated_test_database() -> TestResult<TestDatabase> {
    TestDatabase::new().await
}

/// Helper macro for running database tests against a fresh container
#[macro_export]
macro_rules! db_test {
    ($name:ident, |$pool:ident| $body:block) => {
        #[tokio::test]
        #[ignore = "requires Docker"]
        async fn $name() {
            let db = $crate::database::create_isolated_test_database()
                .await
                .expect("Failed to create test database");
            let $pool = db.pool().clone();
            $body
        }
    };
}

/// Helper trait for test assertions on database results
pub trait DatabaseTestAssertions {
    fn assert_rows_affected(&self, expected: u64);
}

impl DatabaseTestAssertions for sqlx::postgres::PgQueryResult {
    fn assert_rows_affected(&self, expected: u64) {
        assert_eq!(
            self.rows_affected(),
            expected,
            "Expected {} rows affected, got {}",
            expected,
            self.rows_affected()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_connection_url() {
        let url = TestDatabaseConfig::default().connection_url();
        assert!(url.starts_with("postgres://"));
        assert!(url.contains(POSTGRES_USER));
        assert!(url.ends_with(POSTGRES_DB));
    }

    #[test]
    fn test_tables_listed_children_first() {
        let position = |name: &str| LEDGER_TABLES.iter().position(|t| *t == name);
        assert!(position("payment_allocations") < position("payments"));
        assert!(position("invoice_items") < position("invoices"));
        assert!(position("fee_components") < position("fee_structures"));
    }
}
