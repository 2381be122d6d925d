//! # Itemized Receipt Builder
//!
//! A library for turning a single payment record plus patient metadata into a
//! standardized, auditable itemized cost breakdown.
//!
//! ## Core Concepts
//!
//! - **Cost Table**: per plan duration (`"4w"`, `"8w"`, ...) a set of named cost categories
//! - **Calculator**: resolves the plan row, applies patient and jurisdiction rules, and builds sections
//! - **Reconciliation**: the externally charged amount is ground truth; any residual is folded into
//!   operational costs and recorded
//! - **Exceptions**: every rule that fired or correction that was applied is kept as an audit record
//! - **Validator**: re-derives every subtotal and the grand total from raw line items
//!
//! ## Example
//!
//! ```rust,ignore
//! use itemized_receipt_builder::*;
//! use chrono::NaiveDate;
//! use rust_decimal_macros::dec;
//!
//! let table = CostTable::from_csv_path("membership-payment-breakdowns.csv")?;
//! let config = EngineConfig::default();
//!
//! let payment = PaymentRecord {
//!     charged_amount: dec!(330),
//!     charge_date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
//!     plan_duration_weeks: 4,
//!     plan_name: None,
//!     confidence_score: 100.0,
//! };
//!
//! let (breakdown, report) = process_breakdown(&payment, &patient, &table, &config);
//! assert_eq!(breakdown.total, dec!(330));
//! assert!(report.is_valid);
//! ```

pub mod balancer;
pub mod categories;
pub mod config;
pub mod engine;
pub mod error;
#[cfg(feature = "extraction")]
pub mod extraction;
pub mod ingestion;
pub mod overrides;
pub mod receipt;
pub mod schema;
pub mod utils;
pub mod validator;

pub use balancer::Reconciler;
pub use categories::{display_name_for, CostCategory};
pub use config::{EngineConfig, ProviderIdentity};
pub use engine::{calculate_breakdown, BreakdownCalculator};
pub use error::{ReceiptBuilderError, Result};
#[cfg(feature = "extraction")]
pub use extraction::extract_payment;
pub use overrides::*;
pub use receipt::{ProcessedReceipt, ReceiptBuilder, ReceiptData, TableRow};
pub use schema::*;
pub use validator::{validate_breakdown, BreakdownValidator, ValidationReport};

use log::{debug, info};

pub struct BreakdownProcessor;

impl BreakdownProcessor {
    /// Calculates a breakdown and validates it. Neither step fails; the
    /// report says whether the result is internally consistent.
    pub fn process(
        payment: &PaymentRecord,
        patient: &PatientRecord,
        table: &CostTable,
        config: &EngineConfig,
    ) -> (Breakdown, ValidationReport) {
        info!(
            "Processing breakdown for plan {} (charged {})",
            payment.plan_key(),
            payment.charged_amount
        );
        debug!(
            "Cost table has {} plan(s); patient has {} medication(s)",
            table.len(),
            patient.medication_count()
        );

        let breakdown = BreakdownCalculator::new(config).calculate(payment, patient, table);
        let report = BreakdownValidator::new(config.tolerance).validate(&breakdown);

        for warning in &report.warnings {
            debug!("Validation warning: {}", warning);
        }

        (breakdown, report)
    }

    pub fn process_with_verification(
        payment: &PaymentRecord,
        patient: &PatientRecord,
        table: &CostTable,
        config: &EngineConfig,
    ) -> Result<Breakdown> {
        let (breakdown, report) = Self::process(payment, patient, table, config);

        if !report.is_valid {
            return Err(ReceiptBuilderError::BreakdownInvalid {
                errors: report.errors,
            });
        }

        Ok(breakdown)
    }
}

pub fn process_breakdown(
    payment: &PaymentRecord,
    patient: &PatientRecord,
    table: &CostTable,
    config: &EngineConfig,
) -> (Breakdown, ValidationReport) {
    BreakdownProcessor::process(payment, patient, table, config)
}

pub fn process_with_verification(
    payment: &PaymentRecord,
    patient: &PatientRecord,
    table: &CostTable,
    config: &EngineConfig,
) -> Result<Breakdown> {
    BreakdownProcessor::process_with_verification(payment, patient, table, config)
}
