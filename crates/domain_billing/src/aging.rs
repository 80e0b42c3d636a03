//! Aging analysis and dashboard figures
//!
//! Both are computed from live invoice rows on every request; nothing here
//! is cached or persisted.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use core_kernel::{Currency, InvoiceId, Money, StudentId};

use crate::error::BillingError;
use crate::invoice::{Invoice, InvoiceStatus};

/// Days-past-due bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgingBucket {
    #[serde(rename = "0-30")]
    Current,
    #[serde(rename = "31-60")]
    Days31To60,
    #[serde(rename = "61-90")]
    Days61To90,
    #[serde(rename = "90+")]
    Over90,
}

impl AgingBucket {
    pub const ALL: [AgingBucket; 4] = [
        AgingBucket::Current,
        AgingBucket::Days31To60,
        AgingBucket::Days61To90,
        AgingBucket::Over90,
    ];

    pub fn for_days(days_past_due: i64) -> Self {
        match days_past_due {
            d if d <= 30 => AgingBucket::Current,
            d if d <= 60 => AgingBucket::Days31To60,
            d if d <= 90 => AgingBucket::Days61To90,
            _ => AgingBucket::Over90,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AgingBucket::Current => "0-30",
            AgingBucket::Days31To60 => "31-60",
            AgingBucket::Days61To90 => "61-90",
            AgingBucket::Over90 => "90+",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgingBucketTotal {
    pub bucket: AgingBucket,
    pub invoice_count: usize,
    pub outstanding: Money,
}

/// Outstanding balances grouped by days past due
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgingReport {
    pub as_of: NaiveDate,
    pub currency: Currency,
    /// Always four entries, in bucket order
    pub buckets: Vec<AgingBucketTotal>,
    pub invoice_count: usize,
    pub total_outstanding: Money,
}

impl AgingReport {
    /// Buckets every non-terminal invoice in `invoices`
    ///
    /// Invoices in other currencies are left out of a report in `currency`.
    pub fn build<'a, I>(currency: Currency, invoices: I, today: NaiveDate) -> Result<Self, BillingError>
    where
        I: IntoIterator<Item = &'a Invoice>,
    {
        let mut buckets: Vec<AgingBucketTotal> = AgingBucket::ALL
            .into_iter()
            .map(|bucket| AgingBucketTotal {
                bucket,
                invoice_count: 0,
                outstanding: Money::zero(currency),
            })
            .collect();
        let mut invoice_count = 0;
        let mut total_outstanding = Money::zero(currency);

        for invoice in invoices {
            if invoice.status.is_terminal() || invoice.currency != currency {
                continue;
            }
            let outstanding = invoice.outstanding()?;
            let bucket = AgingBucket::for_days(invoice.days_past_due(today));
            if let Some(slot) = buckets.iter_mut().find(|b| b.bucket == bucket) {
                slot.invoice_count += 1;
                slot.outstanding = slot.outstanding.checked_add(&outstanding)?;
            }
            invoice_count += 1;
            total_outstanding = total_outstanding.checked_add(&outstanding)?;
        }

        Ok(Self {
            as_of: today,
            currency,
            buckets,
            invoice_count,
            total_outstanding,
        })
    }

    pub fn bucket(&self, bucket: AgingBucket) -> Option<&AgingBucketTotal> {
        self.buckets.iter().find(|b| b.bucket == bucket)
    }
}

/// Compact invoice row for dashboards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceSummary {
    pub id: InvoiceId,
    pub invoice_number: String,
    pub student_id: StudentId,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub total_amount: Money,
    pub paid_amount: Money,
    pub status: InvoiceStatus,
}

impl From<&Invoice> for InvoiceSummary {
    fn from(invoice: &Invoice) -> Self {
        Self {
            id: invoice.id,
            invoice_number: invoice.invoice_number.clone(),
            student_id: invoice.student_id,
            issue_date: invoice.issue_date,
            due_date: invoice.due_date,
            total_amount: invoice.total_amount,
            paid_amount: invoice.paid_amount,
            status: invoice.status,
        }
    }
}

/// Headline billing figures for one school
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    /// Σ totals of invoices that are neither void nor cancelled
    pub total_billed: Money,
    /// Σ payment amounts, including unapplied remainders
    pub total_collected: Money,
    /// Σ allocation amounts
    pub allocated: Money,
    /// Σ open balances
    pub outstanding: Money,
    pub invoices_by_status: BTreeMap<InvoiceStatus, usize>,
    pub aging: AgingReport,
    pub recent_invoices: Vec<InvoiceSummary>,
}

pub const RECENT_INVOICE_LIMIT: usize = 5;

impl DashboardStats {
    /// Folds invoice rows plus payment/allocation sums into dashboard figures
    pub fn build(
        currency: Currency,
        invoices: &[Invoice],
        total_collected: Money,
        allocated: Money,
        today: NaiveDate,
    ) -> Result<Self, BillingError> {
        let mut total_billed = Money::zero(currency);
        let mut invoices_by_status: BTreeMap<InvoiceStatus, usize> =
            InvoiceStatus::ALL.into_iter().map(|s| (s, 0)).collect();

        for invoice in invoices {
            *invoices_by_status.entry(invoice.status).or_insert(0) += 1;
            if invoice.status.is_billable() && invoice.currency == currency {
                total_billed = total_billed.checked_add(&invoice.total_amount)?;
            }
        }

        let aging = AgingReport::build(currency, invoices, today)?;

        let mut recent: Vec<&Invoice> = invoices.iter().collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let recent_invoices = recent
            .into_iter()
            .take(RECENT_INVOICE_LIMIT)
            .map(InvoiceSummary::from)
            .collect();

        Ok(Self {
            total_billed,
            total_collected,
            allocated,
            outstanding: aging.total_outstanding,
            invoices_by_status,
            aging,
            recent_invoices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::{SchoolId, UserId};
    use rust_decimal_macros::dec;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    fn invoice(due: NaiveDate, total: rust_decimal::Decimal, paid: rust_decimal::Decimal) -> Invoice {
        let mut inv = Invoice::new(
            SchoolId::new(),
            "INV-2026-000001".to_string(),
            StudentId::new(),
            Currency::KES,
            date(1, 1),
            due,
            None,
            UserId::new(),
        )
        .unwrap();
        inv.total_amount = Money::new(total, Currency::KES);
        inv.paid_amount = Money::new(paid, Currency::KES);
        inv.status = InvoiceStatus::Sent;
        inv
    }

    #[test]
    fn test_bucket_boundaries() {
        assert_eq!(AgingBucket::for_days(0), AgingBucket::Current);
        assert_eq!(AgingBucket::for_days(30), AgingBucket::Current);
        assert_eq!(AgingBucket::for_days(31), AgingBucket::Days31To60);
        assert_eq!(AgingBucket::for_days(60), AgingBucket::Days31To60);
        assert_eq!(AgingBucket::for_days(61), AgingBucket::Days61To90);
        assert_eq!(AgingBucket::for_days(90), AgingBucket::Days61To90);
        assert_eq!(AgingBucket::for_days(91), AgingBucket::Over90);
    }

    #[test]
    fn test_report_groups_outstanding() {
        let today = date(6, 1);
        let not_due = invoice(date(6, 30), dec!(1000), dec!(400));
        let forty_days = invoice(today - chrono::Duration::days(40), dec!(500), dec!(0));
        let hundred_days = invoice(today - chrono::Duration::days(100), dec!(300), dec!(100));
        let mut voided = invoice(today - chrono::Duration::days(100), dec!(900), dec!(0));
        voided.status = InvoiceStatus::Void;

        let all = [not_due, forty_days, hundred_days, voided];
        let report = AgingReport::build(Currency::KES, all.iter(), today).unwrap();

        assert_eq!(report.invoice_count, 3);
        assert_eq!(report.total_outstanding, Money::new(dec!(1300), Currency::KES));
        let current = report.bucket(AgingBucket::Current).unwrap();
        assert_eq!(current.outstanding, Money::new(dec!(600), Currency::KES));
        assert_eq!(report.bucket(AgingBucket::Days31To60).unwrap().invoice_count, 1);
        assert_eq!(report.bucket(AgingBucket::Days61To90).unwrap().invoice_count, 0);
        assert_eq!(
            report.bucket(AgingBucket::Over90).unwrap().outstanding,
            Money::new(dec!(200), Currency::KES)
        );
    }

    #[test]
    fn test_dashboard_excludes_void_from_billed() {
        let today = date(6, 1);
        let open = invoice(date(6, 30), dec!(1000), dec!(250));
        let mut cancelled = invoice(date(6, 30), dec!(700), dec!(0));
        cancelled.status = InvoiceStatus::Cancelled;

        let stats = DashboardStats::build(
            Currency::KES,
            &[open, cancelled],
            Money::new(dec!(300), Currency::KES),
            Money::new(dec!(250), Currency::KES),
            today,
        )
        .unwrap();

        assert_eq!(stats.total_billed, Money::new(dec!(1000), Currency::KES));
        assert_eq!(stats.outstanding, Money::new(dec!(750), Currency::KES));
        assert_eq!(stats.invoices_by_status[&InvoiceStatus::Cancelled], 1);
        assert_eq!(stats.invoices_by_status[&InvoiceStatus::Paid], 0);
        assert_eq!(stats.recent_invoices.len(), 2);
    }
}
