//! PostgreSQL ledger adapter tests
//!
//! Each test starts its own container; run with `cargo test -- --ignored`
//! on a machine with Docker.

use std::sync::Arc;

use rust_decimal_macros::dec;

use core_kernel::{Currency, InvoiceId, Money, StudentId};
use domain_billing::{
    AssignFeeRequest, BillingError, GenerateInvoicesRequest, InvoiceStatus, LedgerPort, LedgerServices,
};
use infra_db::PostgresLedger;
use test_utils::{
    assert_invoice_consistent, assert_invoice_status, create_isolated_test_database, inventory_item_name,
    seed_enrollment, seed_inventory_item, stock_level, DateFixtures, FeeStructureRequestBuilder,
    InvoiceRequestBuilder, PaymentRequestBuilder, SchoolFixture, TestDatabase,
};

async fn setup() -> (TestDatabase, Arc<PostgresLedger>, LedgerServices) {
    let db = create_isolated_test_database()
        .await
        .expect("Failed to create test database");
    let ledger = Arc::new(PostgresLedger::new(db.pool().clone()));
    let services = LedgerServices::new(ledger.clone());
    (db, ledger, services)
}

// ============================================================================
// Unit of work
// ============================================================================

mod unit_of_work_tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_invoice_numbers_are_sequential_per_school() {
        let (_db, ledger, _) = setup().await;
        let school = SchoolFixture::new();

        let mut uow = ledger.begin(school.school_id()).await.unwrap();
        assert_eq!(uow.next_invoice_number(2026).await.unwrap(), "INV-2026-000001");
        assert_eq!(uow.next_invoice_number(2026).await.unwrap(), "INV-2026-000002");
        assert_eq!(uow.next_invoice_number(2027).await.unwrap(), "INV-2027-000001");
        uow.commit().await.unwrap();

        let other = school.other_school();
        let mut uow = ledger.begin(other.school_id).await.unwrap();
        assert_eq!(uow.next_invoice_number(2026).await.unwrap(), "INV-2026-000001");
        uow.commit().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_compare_and_decrement_never_goes_negative() {
        let (db, ledger, _) = setup().await;
        let school = SchoolFixture::new();
        let item = seed_inventory_item(db.pool(), school.school_id(), &inventory_item_name(), 3)
            .await
            .unwrap();

        let mut uow = ledger.begin(school.school_id()).await.unwrap();
        assert!(uow.try_decrement_stock(item, 2).await.unwrap());
        assert!(!uow.try_decrement_stock(item, 2).await.unwrap());
        uow.commit().await.unwrap();

        assert_eq!(stock_level(db.pool(), item).await.unwrap(), 1);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_drop_without_commit_rolls_back() {
        let (db, ledger, _) = setup().await;
        let school = SchoolFixture::new();
        let item = seed_inventory_item(db.pool(), school.school_id(), "Uniform", 5)
            .await
            .unwrap();

        {
            let mut uow = ledger.begin(school.school_id()).await.unwrap();
            assert!(uow.try_decrement_stock(item, 5).await.unwrap());
            uow.next_invoice_number(2026).await.unwrap();
        }

        assert_eq!(stock_level(db.pool(), item).await.unwrap(), 5);
        let mut uow = ledger.begin(school.school_id()).await.unwrap();
        assert_eq!(uow.next_invoice_number(2026).await.unwrap(), "INV-2026-000001");
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_stock_of_another_school_is_invisible() {
        let (db, ledger, _) = setup().await;
        let school = SchoolFixture::new();
        let item = seed_inventory_item(db.pool(), school.school_id(), "Tie", 4)
            .await
            .unwrap();

        let other = school.other_school();
        let mut uow = ledger.begin(other.school_id).await.unwrap();
        assert!(uow.lock_inventory_item(item).await.unwrap().is_none());
        assert!(!uow.try_decrement_stock(item, 1).await.unwrap());
    }
}

// ============================================================================
// Service flows on PostgreSQL
// ============================================================================

mod service_flow_tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_generate_then_pay_student_wide() {
        let (db, _ledger, services) = setup().await;
        let school = SchoolFixture::new();
        let ctx = &school.ctx;

        let structure = services
            .fee_setup
            .create_fee_structure(ctx, FeeStructureRequestBuilder::new(&school).build())
            .await
            .unwrap();

        let student = StudentId::new();
        seed_enrollment(db.pool(), &school.enrollment(student)).await.unwrap();
        services
            .fee_setup
            .assign(ctx, AssignFeeRequest { student_id: student, fee_structure_id: structure.id })
            .await
            .unwrap();

        let report = services
            .invoices
            .generate_invoices(
                ctx,
                GenerateInvoicesRequest::new(
                    structure.id,
                    school.academic_year_id,
                    DateFixtures::issue_date(),
                    DateFixtures::due_date(),
                ),
            )
            .await
            .unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(report.total_amount, Money::new(dec!(1500), Currency::KES));

        let receipt = services
            .payments
            .record_payment(
                ctx,
                PaymentRequestBuilder::for_student(student, dec!(1000)).build(),
                DateFixtures::today(),
            )
            .await
            .unwrap();
        assert_eq!(receipt.allocations, 1);
        assert!(receipt.unapplied.is_zero());

        let detail = services.invoices.get_invoice(ctx, report.invoice_ids[0]).await.unwrap();
        assert_invoice_consistent(&detail);
        assert_invoice_status(&detail, InvoiceStatus::PartiallyPaid);
        assert_eq!(detail.invoice.invoice_number, "INV-2026-000001");
        assert_eq!(detail.items.len(), 2);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_concurrent_generation_bills_each_student_once() {
        let (db, _ledger, services) = setup().await;
        let school = SchoolFixture::new();
        let ctx = &school.ctx;

        let structure = services
            .fee_setup
            .create_fee_structure(ctx, FeeStructureRequestBuilder::new(&school).build())
            .await
            .unwrap();

        let mut students = Vec::new();
        for _ in 0..4 {
            let student = StudentId::new();
            seed_enrollment(db.pool(), &school.enrollment(student)).await.unwrap();
            services
                .fee_setup
                .assign(ctx, AssignFeeRequest { student_id: student, fee_structure_id: structure.id })
                .await
                .unwrap();
            students.push(student);
        }

        let request = || {
            GenerateInvoicesRequest::new(
                structure.id,
                school.academic_year_id,
                DateFixtures::issue_date(),
                DateFixtures::due_date(),
            )
        };
        let (first, second) = tokio::join!(
            services.invoices.generate_invoices(ctx, request()),
            services.invoices.generate_invoices(ctx, request()),
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_eq!(first.created + second.created, 4);
        assert_eq!(first.skipped + second.skipped, 4);
        assert!(first.failed.is_empty() && second.failed.is_empty());
        for student in students {
            let invoices = services.invoices.list_student_invoices(ctx, student).await.unwrap();
            assert_eq!(invoices.len(), 1, "student {} billed more than once", student);
        }
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_generation_stops_at_stock_shortage() {
        let (db, _ledger, services) = setup().await;
        let school = SchoolFixture::new();
        let ctx = &school.ctx;
        let uniform = seed_inventory_item(db.pool(), school.school_id(), "Uniform", 1)
            .await
            .unwrap();

        let structure = services
            .fee_setup
            .create_fee_structure(
                ctx,
                FeeStructureRequestBuilder::new(&school)
                    .with_stock_component("Uniform", dec!(800), uniform)
                    .build(),
            )
            .await
            .unwrap();

        for _ in 0..2 {
            let student = StudentId::new();
            seed_enrollment(db.pool(), &school.enrollment(student)).await.unwrap();
            services
                .fee_setup
                .assign(ctx, AssignFeeRequest { student_id: student, fee_structure_id: structure.id })
                .await
                .unwrap();
        }

        let report = services
            .invoices
            .generate_invoices(
                ctx,
                GenerateInvoicesRequest::new(
                    structure.id,
                    school.academic_year_id,
                    DateFixtures::issue_date(),
                    DateFixtures::due_date(),
                ),
            )
            .await
            .unwrap();

        assert_eq!(report.created, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(stock_level(db.pool(), uniform).await.unwrap(), 0);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_direct_payment_on_void_invoice_is_rejected() {
        let (_db, _ledger, services) = setup().await;
        let school = SchoolFixture::new();
        let ctx = &school.ctx;

        let detail = services
            .invoices
            .create_invoice(
                ctx,
                InvoiceRequestBuilder::new(StudentId::new())
                    .item("Bus fare", 1, dec!(400))
                    .build(),
            )
            .await
            .unwrap();
        services.invoices.void(ctx, detail.invoice.id).await.unwrap();

        let result = services
            .payments
            .record_payment(
                ctx,
                PaymentRequestBuilder::for_invoice(detail.invoice.id, dec!(400)).build(),
                DateFixtures::today(),
            )
            .await;
        assert!(matches!(result, Err(BillingError::InvoiceLocked { .. })));
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_invoice_of_another_school_is_not_found() {
        let (_db, _ledger, services) = setup().await;
        let school = SchoolFixture::new();

        let detail = services
            .invoices
            .create_invoice(
                &school.ctx,
                InvoiceRequestBuilder::new(StudentId::new())
                    .item("Library fee", 1, dec!(250))
                    .build(),
            )
            .await
            .unwrap();

        let other = school.other_school();
        let result = services.invoices.get_invoice(&other, detail.invoice.id).await;
        assert!(matches!(result, Err(BillingError::NotFound { .. })));

        let missing = services.invoices.get_invoice(&school.ctx, InvoiceId::new()).await;
        assert!(matches!(missing, Err(BillingError::NotFound { .. })));
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_get_invoice_does_not_wait_for_row_lock() {
        let (_db, ledger, services) = setup().await;
        let school = SchoolFixture::new();

        let detail = services
            .invoices
            .create_invoice(
                &school.ctx,
                InvoiceRequestBuilder::new(StudentId::new())
                    .item("Lab fee", 1, dec!(700))
                    .build(),
            )
            .await
            .unwrap();

        let mut writer = ledger.begin(school.school_id()).await.unwrap();
        assert!(writer.lock_invoice(detail.invoice.id).await.unwrap().is_some());

        let read = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            services.invoices.get_invoice(&school.ctx, detail.invoice.id),
        )
        .await
        .expect("get_invoice blocked on a row lock")
        .unwrap();
        assert_eq!(read.invoice.invoice_number, detail.invoice.invoice_number);
        assert_eq!(read.invoice.total_amount, Money::new(dec!(700), Currency::KES));

        drop(writer);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_dashboard_reads_sql_aggregates() {
        let (_db, _ledger, services) = setup().await;
        let school = SchoolFixture::new();
        let ctx = &school.ctx;
        let student = StudentId::new();

        let detail = services
            .invoices
            .create_invoice(
                ctx,
                InvoiceRequestBuilder::new(student).item("Tuition", 1, dec!(1200)).build(),
            )
            .await
            .unwrap();
        services
            .payments
            .record_payment(
                ctx,
                PaymentRequestBuilder::for_invoice(detail.invoice.id, dec!(1200)).build(),
                DateFixtures::today(),
            )
            .await
            .unwrap();
        services
            .payments
            .record_payment(
                ctx,
                PaymentRequestBuilder::for_student(student, dec!(50)).build(),
                DateFixtures::today(),
            )
            .await
            .unwrap_err();

        let stats = services
            .reporting
            .dashboard(ctx, Currency::KES, DateFixtures::today())
            .await
            .unwrap();
        assert_eq!(stats.total_billed, Money::new(dec!(1200), Currency::KES));
        assert_eq!(stats.total_collected, Money::new(dec!(1200), Currency::KES));
        assert_eq!(stats.allocated, Money::new(dec!(1200), Currency::KES));
        assert!(stats.outstanding.is_zero());
        assert_eq!(stats.invoices_by_status.get(&InvoiceStatus::Paid), Some(&1));
    }
}
