//! PostgreSQL Ledger Adapter
//!
//! Implements [`LedgerPort`] on PostgreSQL. Each [`PgLedgerUnitOfWork`] owns
//! one `sqlx::Transaction`; dropping it without `commit` rolls the
//! transaction back.
//!
//! # Locking
//!
//! - `lock_invoice` and `lock_open_invoices_for_student` read with
//!   `SELECT … FOR UPDATE`
//! - `lock_inventory_item` locks the stock row; `try_decrement_stock` is a
//!   compare-and-decrement `UPDATE … WHERE quantity_in_stock >= $n`
//! - invoice numbers come from an upserted per-school, per-year counter row,
//!   which serializes concurrent numbering for the same school and year
//!
//! Every statement filters on `school_id`; rows of another school read as
//! absent.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use core_kernel::{
    AcademicYearId, AdapterHealth, AssignmentId, Currency, DomainPort, FeeComponentId,
    FeeStructureId, HealthCheckResult, HealthCheckable, InventoryItemId, InvoiceId, InvoiceItemId,
    Money, PaymentId, PortError, SchoolId, StudentId,
};
use domain_billing::{
    FeeStructure, InventoryStock, Invoice, InvoiceItem, InvoiceQuery, InvoiceStatus, LedgerPort,
    LedgerUnitOfWork, Payment, PaymentAllocation, StudentBillingContext, StudentFeeAssignment,
};

use crate::error::DatabaseError;
use crate::repositories::billing::{
    map_rows, to_i32, AllocationRow, AssignmentRow, EnrollmentRow, FeeComponentRow, FeeStructureRow,
    InventoryItemRow, InvoiceItemRow, InvoiceRow, PaymentRow,
};

const ADAPTER_ID: &str = "postgres-ledger";

const INVOICE_COLUMNS: &str = "invoice_id, school_id, invoice_number, student_id, currency, issue_date, \
     due_date, total_amount, paid_amount, status, sent_at, notes, created_by, created_at, updated_at";

const ASSIGNMENT_COLUMNS: &str =
    "assignment_id, school_id, student_id, fee_structure_id, academic_year_id, is_active, created_at";

const PAYMENT_COLUMNS: &str = "payment_id, school_id, student_id, amount, currency, payment_date, method, \
     reference, notes, processed_by, created_at";

/// PostgreSQL-backed implementation of the LedgerPort trait
#[derive(Debug, Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl DomainPort for PostgresLedger {}

#[async_trait]
impl HealthCheckable for PostgresLedger {
    /// Performs a `SELECT 1` round trip through the pool
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();

        let result = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await;

        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(_) => HealthCheckResult {
                adapter_id: ADAPTER_ID.to_string(),
                status: AdapterHealth::Healthy,
                latency_ms,
                message: None,
                checked_at: Utc::now(),
            },
            Err(e) => HealthCheckResult {
                adapter_id: ADAPTER_ID.to_string(),
                status: AdapterHealth::Unhealthy,
                latency_ms,
                message: Some(format!("Database error: {}", e)),
                checked_at: Utc::now(),
            },
        }
    }
}

#[async_trait]
impl LedgerPort for PostgresLedger {
    #[instrument(skip(self))]
    async fn begin(&self, school_id: SchoolId) -> Result<Box<dyn LedgerUnitOfWork>, PortError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| match DatabaseError::from(e) {
                DatabaseError::QueryFailed(msg) => DatabaseError::TransactionFailed(msg),
                other => other,
            })?;
        debug!("Ledger transaction opened");
        Ok(Box::new(PgLedgerUnitOfWork { school_id, tx }))
    }
}

/// Unit of work over one PostgreSQL transaction
pub struct PgLedgerUnitOfWork {
    school_id: SchoolId,
    tx: Transaction<'static, Postgres>,
}

impl PgLedgerUnitOfWork {
    fn school(&self) -> Uuid {
        *self.school_id.as_uuid()
    }

    async fn components(&mut self, fee_structure_id: Uuid) -> Result<Vec<FeeComponentRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, FeeComponentRow>(
            r#"
            SELECT fee_component_id, fee_structure_id, position, name, amount, inventory_item_id
            FROM fee_components
            WHERE fee_structure_id = $1
            ORDER BY position
            "#,
        )
        .bind(fee_structure_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows)
    }

    async fn sum(&mut self, sql: &str, currency: Currency) -> Result<Money, PortError> {
        let school_id = self.school();
        let total: Decimal = sqlx::query_scalar(sql)
            .bind(school_id)
            .bind(currency.code())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(DatabaseError::from)?;
        Ok(Money::new(total, currency))
    }

    /// `lock` is either empty or a row-locking clause
    async fn fetch_assignment(
        &mut self,
        id: AssignmentId,
        lock: &str,
    ) -> Result<Option<StudentFeeAssignment>, PortError> {
        let school_id = self.school();
        let sql = format!(
            "SELECT {} FROM student_fee_assignments WHERE assignment_id = $1 AND school_id = $2 {}",
            ASSIGNMENT_COLUMNS, lock
        );
        let row = sqlx::query_as::<_, AssignmentRow>(&sql)
            .bind(*id.as_uuid())
            .bind(school_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(DatabaseError::from)?;
        Ok(row.map(Into::into))
    }

    async fn fetch_invoice(&mut self, id: InvoiceId, lock: &str) -> Result<Option<Invoice>, PortError> {
        let school_id = self.school();
        let sql = format!(
            "SELECT {} FROM invoices WHERE invoice_id = $1 AND school_id = $2 {}",
            INVOICE_COLUMNS, lock
        );
        let row = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(*id.as_uuid())
            .bind(school_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(DatabaseError::from)?;
        Ok(row.map(Invoice::try_from).transpose()?)
    }
}

#[async_trait]
impl LedgerUnitOfWork for PgLedgerUnitOfWork {
    fn school_id(&self) -> SchoolId {
        self.school_id
    }

    // ========================================================================
    // Fee setup
    // ========================================================================

    async fn insert_fee_structure(&mut self, structure: &FeeStructure) -> Result<(), PortError> {
        let school_id = self.school();
        sqlx::query(
            r#"
            INSERT INTO fee_structures (
                fee_structure_id, school_id, name, description, amount, currency, frequency,
                academic_year_id, class_id, school_level_id, is_active, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(*structure.id.as_uuid())
        .bind(school_id)
        .bind(&structure.name)
        .bind(&structure.description)
        .bind(structure.amount.amount())
        .bind(structure.currency().code())
        .bind(structure.frequency.as_str())
        .bind(*structure.scope.academic_year_id().as_uuid())
        .bind(structure.scope.class_id().map(|id| *id.as_uuid()))
        .bind(structure.scope.school_level_id().map(|id| *id.as_uuid()))
        .bind(structure.is_active)
        .bind(structure.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(DatabaseError::from)?;

        for (position, component) in structure.components.iter().enumerate() {
            let position = i32::try_from(position)
                .map_err(|_| PortError::validation("Too many fee components"))?;
            sqlx::query(
                r#"
                INSERT INTO fee_components (
                    fee_component_id, fee_structure_id, position, name, amount, inventory_item_id
                ) VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(*component.id.as_uuid())
            .bind(*structure.id.as_uuid())
            .bind(position)
            .bind(&component.name)
            .bind(component.amount.amount())
            .bind(component.inventory_item_id.map(|id| *id.as_uuid()))
            .execute(&mut *self.tx)
            .await
            .map_err(DatabaseError::from)?;
        }

        Ok(())
    }

    async fn fee_structure(&mut self, id: FeeStructureId) -> Result<Option<FeeStructure>, PortError> {
        let school_id = self.school();
        let row = sqlx::query_as::<_, FeeStructureRow>(
            r#"
            SELECT fee_structure_id, school_id, name, description, amount, currency, frequency,
                   academic_year_id, class_id, school_level_id, is_active, created_at
            FROM fee_structures
            WHERE fee_structure_id = $1 AND school_id = $2
            "#,
        )
        .bind(*id.as_uuid())
        .bind(school_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(DatabaseError::from)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let components = self.components(row.fee_structure_id).await?;
        Ok(Some(row.into_domain(components)?))
    }

    async fn insert_assignment(&mut self, assignment: &StudentFeeAssignment) -> Result<(), PortError> {
        let school_id = self.school();
        sqlx::query(
            r#"
            INSERT INTO student_fee_assignments (
                assignment_id, school_id, student_id, fee_structure_id, academic_year_id, is_active, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(*assignment.id.as_uuid())
        .bind(school_id)
        .bind(*assignment.student_id.as_uuid())
        .bind(*assignment.fee_structure_id.as_uuid())
        .bind(*assignment.academic_year_id.as_uuid())
        .bind(assignment.is_active)
        .bind(assignment.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| match DatabaseError::from(e) {
            DatabaseError::DuplicateEntry(_) => DatabaseError::DuplicateEntry(format!(
                "Student {} is already assigned fee structure {} for year {}",
                assignment.student_id, assignment.fee_structure_id, assignment.academic_year_id
            )),
            other => other,
        })?;
        Ok(())
    }

    async fn assignment(&mut self, id: AssignmentId) -> Result<Option<StudentFeeAssignment>, PortError> {
        self.fetch_assignment(id, "").await
    }

    #[instrument(skip(self))]
    async fn lock_assignment(&mut self, id: AssignmentId) -> Result<Option<StudentFeeAssignment>, PortError> {
        self.fetch_assignment(id, "FOR UPDATE").await
    }

    async fn set_assignment_active(&mut self, id: AssignmentId, is_active: bool) -> Result<(), PortError> {
        let school_id = self.school();
        let result = sqlx::query(
            "UPDATE student_fee_assignments SET is_active = $1 WHERE assignment_id = $2 AND school_id = $3",
        )
        .bind(is_active)
        .bind(*id.as_uuid())
        .bind(school_id)
        .execute(&mut *self.tx)
        .await
        .map_err(DatabaseError::from)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("StudentFeeAssignment", id).into());
        }
        Ok(())
    }

    async fn assignments_for_structure(
        &mut self,
        fee_structure_id: FeeStructureId,
        academic_year_id: AcademicYearId,
    ) -> Result<Vec<StudentFeeAssignment>, PortError> {
        let school_id = self.school();
        let sql = format!(
            "SELECT {} FROM student_fee_assignments \
             WHERE school_id = $1 AND fee_structure_id = $2 AND academic_year_id = $3 \
             ORDER BY created_at, assignment_id",
            ASSIGNMENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, AssignmentRow>(&sql)
            .bind(school_id)
            .bind(*fee_structure_id.as_uuid())
            .bind(*academic_year_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(DatabaseError::from)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn student_context(
        &mut self,
        student_id: StudentId,
        academic_year_id: AcademicYearId,
    ) -> Result<Option<StudentBillingContext>, PortError> {
        let school_id = self.school();
        let row = sqlx::query_as::<_, EnrollmentRow>(
            r#"
            SELECT school_id, student_id, academic_year_id, class_id, school_level_id
            FROM student_enrollments
            WHERE student_id = $1 AND academic_year_id = $2 AND school_id = $3
            "#,
        )
        .bind(*student_id.as_uuid())
        .bind(*academic_year_id.as_uuid())
        .bind(school_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(DatabaseError::from)?;
        Ok(row.map(Into::into))
    }

    async fn has_billed_fee_structure(
        &mut self,
        student_id: StudentId,
        fee_structure_id: FeeStructureId,
        component_ids: &[FeeComponentId],
    ) -> Result<bool, PortError> {
        let school_id = self.school();
        let component_ids: Vec<Uuid> = component_ids.iter().map(|id| *id.as_uuid()).collect();
        let billed: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM invoice_items ii
                JOIN invoices i ON i.invoice_id = ii.invoice_id
                WHERE i.school_id = $1
                  AND i.student_id = $2
                  AND i.status NOT IN ('VOID', 'CANCELLED')
                  AND (ii.fee_structure_id = $3 OR ii.fee_component_id = ANY($4))
            )
            "#,
        )
        .bind(school_id)
        .bind(*student_id.as_uuid())
        .bind(*fee_structure_id.as_uuid())
        .bind(component_ids)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(DatabaseError::from)?;
        Ok(billed)
    }

    // ========================================================================
    // Inventory
    // ========================================================================

    async fn lock_inventory_item(&mut self, id: InventoryItemId) -> Result<Option<InventoryStock>, PortError> {
        let school_id = self.school();
        let row = sqlx::query_as::<_, InventoryItemRow>(
            r#"
            SELECT inventory_item_id, school_id, name, quantity_in_stock
            FROM inventory_items
            WHERE inventory_item_id = $1 AND school_id = $2
            FOR UPDATE
            "#,
        )
        .bind(*id.as_uuid())
        .bind(school_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(DatabaseError::from)?;
        Ok(row.map(InventoryStock::try_from).transpose()?)
    }

    #[instrument(skip(self))]
    async fn try_decrement_stock(&mut self, id: InventoryItemId, quantity: u32) -> Result<bool, PortError> {
        let school_id = self.school();
        let quantity = to_i32(quantity, "quantity")?;
        let result = sqlx::query(
            r#"
            UPDATE inventory_items
            SET quantity_in_stock = quantity_in_stock - $1
            WHERE inventory_item_id = $2 AND school_id = $3 AND quantity_in_stock >= $1
            "#,
        )
        .bind(quantity)
        .bind(*id.as_uuid())
        .bind(school_id)
        .execute(&mut *self.tx)
        .await
        .map_err(DatabaseError::from)?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    async fn increment_stock(&mut self, id: InventoryItemId, quantity: u32) -> Result<(), PortError> {
        let school_id = self.school();
        let quantity = to_i32(quantity, "quantity")?;
        let result = sqlx::query(
            r#"
            UPDATE inventory_items
            SET quantity_in_stock = quantity_in_stock + $1
            WHERE inventory_item_id = $2 AND school_id = $3
            "#,
        )
        .bind(quantity)
        .bind(*id.as_uuid())
        .bind(school_id)
        .execute(&mut *self.tx)
        .await
        .map_err(DatabaseError::from)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("InventoryItem", id).into());
        }
        Ok(())
    }

    // ========================================================================
    // Invoices
    // ========================================================================

    async fn next_invoice_number(&mut self, year: i32) -> Result<String, PortError> {
        let school_id = self.school();
        let seq: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO invoice_number_sequences (school_id, year, last_value)
            VALUES ($1, $2, 1)
            ON CONFLICT (school_id, year)
            DO UPDATE SET last_value = invoice_number_sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(school_id)
        .bind(year)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(DatabaseError::from)?;
        Ok(format!("INV-{}-{:06}", year, seq))
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), PortError> {
        let school_id = self.school();
        sqlx::query(
            r#"
            INSERT INTO invoices (
                invoice_id, school_id, invoice_number, student_id, currency, issue_date, due_date,
                total_amount, paid_amount, status, sent_at, notes, created_by, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(*invoice.id.as_uuid())
        .bind(school_id)
        .bind(&invoice.invoice_number)
        .bind(*invoice.student_id.as_uuid())
        .bind(invoice.currency.code())
        .bind(invoice.issue_date)
        .bind(invoice.due_date)
        .bind(invoice.total_amount.amount())
        .bind(invoice.paid_amount.amount())
        .bind(invoice.status.as_str())
        .bind(invoice.sent_at)
        .bind(&invoice.notes)
        .bind(*invoice.created_by.as_uuid())
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(DatabaseError::from)?;
        Ok(())
    }

    async fn insert_item(&mut self, item: &InvoiceItem) -> Result<(), PortError> {
        let school_id = self.school();
        let result = sqlx::query(
            r#"
            INSERT INTO invoice_items (
                invoice_item_id, invoice_id, description, quantity, unit_price, total_price,
                fee_structure_id, fee_component_id, inventory_item_id, created_at
            )
            SELECT $1, i.invoice_id, $3, $4, $5, $6, $7, $8, $9, $10
            FROM invoices i
            WHERE i.invoice_id = $2 AND i.school_id = $11
            "#,
        )
        .bind(*item.id.as_uuid())
        .bind(*item.invoice_id.as_uuid())
        .bind(&item.description)
        .bind(to_i32(item.quantity, "quantity")?)
        .bind(item.unit_price.amount())
        .bind(item.total_price.amount())
        .bind(item.fee_structure_id.map(|id| *id.as_uuid()))
        .bind(item.fee_component_id.map(|id| *id.as_uuid()))
        .bind(item.inventory_item_id.map(|id| *id.as_uuid()))
        .bind(item.created_at)
        .bind(school_id)
        .execute(&mut *self.tx)
        .await
        .map_err(DatabaseError::from)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("Invoice", item.invoice_id).into());
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn lock_invoice(&mut self, id: InvoiceId) -> Result<Option<Invoice>, PortError> {
        self.fetch_invoice(id, "FOR UPDATE").await
    }

    async fn find_invoice(&mut self, id: InvoiceId) -> Result<Option<Invoice>, PortError> {
        self.fetch_invoice(id, "").await
    }

    async fn invoice_items(&mut self, invoice_id: InvoiceId) -> Result<Vec<InvoiceItem>, PortError> {
        let school_id = self.school();
        let rows = sqlx::query_as::<_, InvoiceItemRow>(
            r#"
            SELECT ii.invoice_item_id, ii.invoice_id, ii.description, ii.quantity, ii.unit_price,
                   ii.total_price, ii.fee_structure_id, ii.fee_component_id, ii.inventory_item_id,
                   ii.created_at, i.currency
            FROM invoice_items ii
            JOIN invoices i ON i.invoice_id = ii.invoice_id
            WHERE ii.invoice_id = $1 AND i.school_id = $2
            ORDER BY ii.created_at, ii.invoice_item_id
            "#,
        )
        .bind(*invoice_id.as_uuid())
        .bind(school_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(DatabaseError::from)?;
        Ok(map_rows(rows)?)
    }

    async fn update_invoice(&mut self, invoice: &Invoice) -> Result<(), PortError> {
        let school_id = self.school();
        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET total_amount = $1, paid_amount = $2, status = $3, sent_at = $4, due_date = $5, notes = $6,
                updated_at = $7
            WHERE invoice_id = $8 AND school_id = $9
            "#,
        )
        .bind(invoice.total_amount.amount())
        .bind(invoice.paid_amount.amount())
        .bind(invoice.status.as_str())
        .bind(invoice.sent_at)
        .bind(invoice.due_date)
        .bind(&invoice.notes)
        .bind(invoice.updated_at)
        .bind(*invoice.id.as_uuid())
        .bind(school_id)
        .execute(&mut *self.tx)
        .await
        .map_err(DatabaseError::from)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("Invoice", invoice.id).into());
        }
        Ok(())
    }

    async fn update_item(&mut self, item: &InvoiceItem) -> Result<(), PortError> {
        let school_id = self.school();
        let result = sqlx::query(
            r#"
            UPDATE invoice_items ii
            SET description = $1, quantity = $2, unit_price = $3, total_price = $4, inventory_item_id = $5
            FROM invoices i
            WHERE ii.invoice_item_id = $6
              AND ii.invoice_id = i.invoice_id
              AND i.school_id = $7
            "#,
        )
        .bind(&item.description)
        .bind(to_i32(item.quantity, "quantity")?)
        .bind(item.unit_price.amount())
        .bind(item.total_price.amount())
        .bind(item.inventory_item_id.map(|id| *id.as_uuid()))
        .bind(*item.id.as_uuid())
        .bind(school_id)
        .execute(&mut *self.tx)
        .await
        .map_err(DatabaseError::from)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("InvoiceItem", item.id).into());
        }
        Ok(())
    }

    async fn delete_item(&mut self, id: InvoiceItemId) -> Result<(), PortError> {
        let school_id = self.school();
        let result = sqlx::query(
            r#"
            DELETE FROM invoice_items ii
            USING invoices i
            WHERE ii.invoice_item_id = $1
              AND ii.invoice_id = i.invoice_id
              AND i.school_id = $2
            "#,
        )
        .bind(*id.as_uuid())
        .bind(school_id)
        .execute(&mut *self.tx)
        .await
        .map_err(DatabaseError::from)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("InvoiceItem", id).into());
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn lock_open_invoices_for_student(&mut self, student_id: StudentId) -> Result<Vec<Invoice>, PortError> {
        let school_id = self.school();
        let open: Vec<String> = InvoiceStatus::OPEN.iter().map(|s| s.as_str().to_string()).collect();
        let sql = format!(
            "SELECT {} FROM invoices \
             WHERE school_id = $1 AND student_id = $2 AND status = ANY($3) \
             ORDER BY due_date, issue_date, created_at \
             FOR UPDATE",
            INVOICE_COLUMNS
        );
        let rows = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(school_id)
            .bind(*student_id.as_uuid())
            .bind(open)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(DatabaseError::from)?;
        Ok(map_rows(rows)?)
    }

    async fn list_invoices(&mut self, query: &InvoiceQuery) -> Result<Vec<Invoice>, PortError> {
        let school_id = self.school();
        let statuses: Vec<String> = query.statuses.iter().map(|s| s.as_str().to_string()).collect();
        let sql = format!(
            "SELECT {} FROM invoices \
             WHERE school_id = $1 \
               AND ($2::uuid IS NULL OR student_id = $2) \
               AND (cardinality($3::text[]) = 0 OR status = ANY($3)) \
             ORDER BY issue_date DESC, created_at DESC \
             LIMIT $4",
            INVOICE_COLUMNS
        );
        let rows = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(school_id)
            .bind(query.student_id.map(|id| *id.as_uuid()))
            .bind(statuses)
            .bind(query.limit.map(i64::from))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(DatabaseError::from)?;
        Ok(map_rows(rows)?)
    }

    // ========================================================================
    // Payments
    // ========================================================================

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), PortError> {
        let school_id = self.school();
        sqlx::query(
            r#"
            INSERT INTO payments (
                payment_id, school_id, student_id, amount, currency, payment_date, method,
                reference, notes, processed_by, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(*payment.id.as_uuid())
        .bind(school_id)
        .bind(*payment.student_id.as_uuid())
        .bind(payment.amount.amount())
        .bind(payment.amount.currency().code())
        .bind(payment.payment_date)
        .bind(payment.method.as_str())
        .bind(&payment.reference)
        .bind(&payment.notes)
        .bind(*payment.processed_by.as_uuid())
        .bind(payment.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(DatabaseError::from)?;
        Ok(())
    }

    async fn insert_allocation(&mut self, allocation: &PaymentAllocation) -> Result<(), PortError> {
        let school_id = self.school();
        let result = sqlx::query(
            r#"
            INSERT INTO payment_allocations (allocation_id, payment_id, invoice_id, amount, currency, created_at)
            SELECT $1, p.payment_id, i.invoice_id, $4, $5, $6
            FROM payments p, invoices i
            WHERE p.payment_id = $2 AND i.invoice_id = $3
              AND p.school_id = $7 AND i.school_id = $7
            "#,
        )
        .bind(*allocation.id.as_uuid())
        .bind(*allocation.payment_id.as_uuid())
        .bind(*allocation.invoice_id.as_uuid())
        .bind(allocation.amount.amount())
        .bind(allocation.amount.currency().code())
        .bind(allocation.created_at)
        .bind(school_id)
        .execute(&mut *self.tx)
        .await
        .map_err(DatabaseError::from)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("Invoice", allocation.invoice_id).into());
        }
        Ok(())
    }

    async fn payment(&mut self, id: PaymentId) -> Result<Option<Payment>, PortError> {
        let school_id = self.school();
        let sql = format!(
            "SELECT {} FROM payments WHERE payment_id = $1 AND school_id = $2",
            PAYMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(*id.as_uuid())
            .bind(school_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(DatabaseError::from)?;
        Ok(row.map(Payment::try_from).transpose()?)
    }

    async fn allocations_for_payment(&mut self, payment_id: PaymentId) -> Result<Vec<PaymentAllocation>, PortError> {
        let school_id = self.school();
        let rows = sqlx::query_as::<_, AllocationRow>(
            r#"
            SELECT a.allocation_id, a.payment_id, a.invoice_id, a.amount, a.currency, a.created_at
            FROM payment_allocations a
            JOIN payments p ON p.payment_id = a.payment_id
            WHERE a.payment_id = $1 AND p.school_id = $2
            ORDER BY a.created_at, a.allocation_id
            "#,
        )
        .bind(*payment_id.as_uuid())
        .bind(school_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(DatabaseError::from)?;
        Ok(map_rows(rows)?)
    }

    async fn allocations_for_invoice(&mut self, invoice_id: InvoiceId) -> Result<Vec<PaymentAllocation>, PortError> {
        let school_id = self.school();
        let rows = sqlx::query_as::<_, AllocationRow>(
            r#"
            SELECT a.allocation_id, a.payment_id, a.invoice_id, a.amount, a.currency, a.created_at
            FROM payment_allocations a
            JOIN invoices i ON i.invoice_id = a.invoice_id
            WHERE a.invoice_id = $1 AND i.school_id = $2
            ORDER BY a.created_at, a.allocation_id
            "#,
        )
        .bind(*invoice_id.as_uuid())
        .bind(school_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(DatabaseError::from)?;
        Ok(map_rows(rows)?)
    }

    async fn sum_payments(&mut self, currency: Currency) -> Result<Money, PortError> {
        self.sum(
            "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE school_id = $1 AND currency = $2",
            currency,
        )
        .await
    }

    async fn sum_allocations(&mut self, currency: Currency) -> Result<Money, PortError> {
        self.sum(
            r#"
            SELECT COALESCE(SUM(a.amount), 0)
            FROM payment_allocations a
            JOIN payments p ON p.payment_id = a.payment_id
            WHERE p.school_id = $1 AND a.currency = $2
            "#,
            currency,
        )
        .await
    }

    // ========================================================================
    // Transaction control
    // ========================================================================

    async fn commit(self: Box<Self>) -> Result<(), PortError> {
        let school_id = self.school_id;
        self.tx
            .commit()
            .await
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;
        debug!(%school_id, "Ledger transaction committed");
        Ok(())
    }
}
