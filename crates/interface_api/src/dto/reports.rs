//! Report DTOs

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use domain_billing::{AgingReport, DashboardStats, InvoiceSummary};

#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    /// Falls back to the configured currency
    pub currency: Option<String>,
    /// Falls back to today
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct AgingBucketResponse {
    pub bucket: String,
    pub invoice_count: usize,
    pub outstanding: Decimal,
}

#[derive(Debug, Serialize)]
pub struct AgingReportResponse {
    pub as_of: NaiveDate,
    pub currency: String,
    pub buckets: Vec<AgingBucketResponse>,
    pub invoice_count: usize,
    pub total_outstanding: Decimal,
}

impl From<AgingReport> for AgingReportResponse {
    fn from(report: AgingReport) -> Self {
        Self {
            as_of: report.as_of,
            currency: report.currency.code().to_string(),
            buckets: report
                .buckets
                .into_iter()
                .map(|b| AgingBucketResponse {
                    bucket: b.bucket.label().to_string(),
                    invoice_count: b.invoice_count,
                    outstanding: b.outstanding.amount(),
                })
                .collect(),
            invoice_count: report.invoice_count,
            total_outstanding: report.total_outstanding.amount(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecentInvoiceResponse {
    pub id: Uuid,
    pub invoice_number: String,
    pub student_id: Uuid,
    pub due_date: NaiveDate,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub status: String,
}

impl From<InvoiceSummary> for RecentInvoiceResponse {
    fn from(summary: InvoiceSummary) -> Self {
        Self {
            id: summary.id.into(),
            invoice_number: summary.invoice_number,
            student_id: summary.student_id.into(),
            due_date: summary.due_date,
            total_amount: summary.total_amount.amount(),
            paid_amount: summary.paid_amount.amount(),
            status: summary.status.as_str().to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub currency: String,
    pub total_billed: Decimal,
    pub total_collected: Decimal,
    pub allocated: Decimal,
    pub outstanding: Decimal,
    pub invoices_by_status: BTreeMap<String, usize>,
    pub aging: AgingReportResponse,
    pub recent_invoices: Vec<RecentInvoiceResponse>,
}

impl From<DashboardStats> for DashboardResponse {
    fn from(stats: DashboardStats) -> Self {
        Self {
            currency: stats.total_billed.currency().code().to_string(),
            total_billed: stats.total_billed.amount(),
            total_collected: stats.total_collected.amount(),
            allocated: stats.allocated.amount(),
            outstanding: stats.outstanding.amount(),
            invoices_by_status: stats
                .invoices_by_status
                .into_iter()
                .map(|(status, count)| (status.as_str().to_string(), count))
                .collect(),
            aging: stats.aging.into(),
            recent_invoices: stats.recent_invoices.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub as_of: NaiveDate,
    pub updated: usize,
}
