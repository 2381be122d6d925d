use crate::config::{EngineConfig, ProviderIdentity};
use crate::error::{ReceiptBuilderError, Result};
use crate::schema::{Breakdown, CostTable, PatientRecord, PaymentRecord, Section};
use crate::utils::format_money;
use crate::validator::ValidationReport;
use crate::BreakdownProcessor;
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};

/// Everything a renderer or history store needs for one receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptData {
    pub patient: PatientRecord,
    pub payment: PaymentRecord,
    pub breakdown: Breakdown,
    pub generated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_provider: Option<ProviderIdentity>,
    pub rendering_provider: ProviderIdentity,
}

#[derive(Debug, Clone)]
pub struct ProcessedReceipt {
    pub receipt: ReceiptData,
    pub report: ValidationReport,
}

/// One row of the flattened itemized table, in render order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub section: String,
    pub description: String,
    pub quantity: Option<u32>,
    pub unit_price: String,
    pub total: String,
}

impl Breakdown {
    /// Flattens the breakdown into table rows: each section's line items
    /// followed by a subtotal row, then a grand total row.
    pub fn to_table_rows(&self) -> Vec<TableRow> {
        let mut rows = Vec::new();
        for section in self.sections() {
            push_section_rows(&mut rows, section);
        }
        rows.push(TableRow {
            section: "Total".to_string(),
            description: "Total".to_string(),
            quantity: None,
            unit_price: String::new(),
            total: format_money(self.total),
        });
        rows
    }
}

fn push_section_rows(rows: &mut Vec<TableRow>, section: &Section) {
    for item in &section.line_items {
        rows.push(TableRow {
            section: section.name.clone(),
            description: item.description.clone(),
            quantity: item.quantity,
            unit_price: format_money(item.unit_price),
            total: format_money(item.total),
        });
    }
    rows.push(TableRow {
        section: section.name.clone(),
        description: "Subtotal".to_string(),
        quantity: None,
        unit_price: String::new(),
        total: format_money(section.subtotal),
    });
}

/// Runs the patient check, the calculator and the validator for one
/// payment against a fixed cost table and configuration.
pub struct ReceiptBuilder<'a> {
    config: &'a EngineConfig,
    table: &'a CostTable,
}

impl<'a> ReceiptBuilder<'a> {
    pub fn new(config: &'a EngineConfig, table: &'a CostTable) -> Self {
        Self { config, table }
    }

    pub fn build(&self, payment: &PaymentRecord, patient: &PatientRecord) -> Result<ProcessedReceipt> {
        self.build_at(payment, patient, Utc::now())
    }

    pub fn build_at(
        &self,
        payment: &PaymentRecord,
        patient: &PatientRecord,
        generated_at: DateTime<Utc>,
    ) -> Result<ProcessedReceipt> {
        patient.check_complete()?;

        let (breakdown, report) =
            BreakdownProcessor::process(payment, patient, self.table, self.config);

        info!(
            "Built receipt for plan {} with total {} ({} exception(s), valid: {})",
            payment.plan_key(),
            breakdown.total,
            breakdown.exceptions.len(),
            report.is_valid
        );

        Ok(ProcessedReceipt {
            receipt: ReceiptData {
                patient: patient.clone(),
                payment: payment.clone(),
                breakdown,
                generated_at,
                billing_provider: self.config.billing_provider.clone(),
                rendering_provider: self.config.rendering_provider.clone(),
            },
            report,
        })
    }

    /// Like [`build`](Self::build), but an invalid breakdown is an error.
    pub fn build_verified(
        &self,
        payment: &PaymentRecord,
        patient: &PatientRecord,
    ) -> Result<ReceiptData> {
        let processed = self.build(payment, patient)?;
        if !processed.report.is_valid {
            return Err(ReceiptBuilderError::BreakdownInvalid {
                errors: processed.report.errors,
            });
        }
        Ok(processed.receipt)
    }
}
