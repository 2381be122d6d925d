use crate::categories::CostCategory;
use crate::engine::CategoryLedger;
use crate::schema::{BreakdownException, ExceptionKind, LineItem, Section};
use crate::utils::{format_money, within_tolerance};
use log::{info, warn};
use rust_decimal::Decimal;
use serde_json::json;

const OPERATIONAL_FALLBACK_DESCRIPTION: &str = "Operational Services";

/// Forces a calculated total to match the externally observed charge.
///
/// The whole residual lands in the operational category; it is never split
/// across categories. When the cost row had no operational column, an
/// operational section is created to hold the adjustment.
pub struct Reconciler {
    tolerance: Decimal,
}

impl Reconciler {
    pub fn new(tolerance: Decimal) -> Self {
        Self { tolerance }
    }

    /// Returns the reallocation record when an adjustment was applied, or
    /// `None` when the totals already agree within tolerance. An adjustment
    /// that would overflow leaves the ledger untouched and is reported as a
    /// `validation` record instead.
    pub(crate) fn reconcile(
        &self,
        ledger: &mut CategoryLedger,
        calculated_total: Decimal,
        charged_amount: Decimal,
    ) -> Option<BreakdownException> {
        if within_tolerance(calculated_total, charged_amount, self.tolerance) {
            return None;
        }

        let operational = ledger.cost(CostCategory::Operational.key());
        let adjusted = charged_amount
            .checked_sub(calculated_total)
            .and_then(|adjustment| Some((adjustment, operational.checked_add(adjustment)?)));
        let Some((adjustment, adjusted)) = adjusted else {
            warn!(
                "Adjustment from {} to {} is out of range; reconciliation skipped",
                calculated_total, charged_amount
            );
            return Some(
                BreakdownException::new(
                    ExceptionKind::Validation,
                    "Adjustment to match charged amount exceeds the supported range; total left as calculated",
                )
                .with_details(json!({
                    "calculated_total": calculated_total,
                    "charged_amount": charged_amount,
                })),
            );
        };

        let section = match ledger.operational.take() {
            Some(existing) => {
                let description = existing
                    .line_items
                    .first()
                    .map(|item| item.description.clone())
                    .unwrap_or_else(|| OPERATIONAL_FALLBACK_DESCRIPTION.to_string());
                Section::single(existing.name, LineItem::flat(description, adjusted))
            }
            None => Section::single(
                CostCategory::Operational.display_name(),
                LineItem::flat(OPERATIONAL_FALLBACK_DESCRIPTION, adjustment),
            ),
        };
        ledger.set_operational(section);

        info!(
            "Reconciled calculated total {} to charged amount {} (adjustment {})",
            calculated_total, charged_amount, adjustment
        );

        Some(
            BreakdownException::new(
                ExceptionKind::Reallocation,
                format!(
                    "Total adjusted by {} to match charged amount",
                    format_money(adjustment)
                ),
            )
            .with_details(json!({
                "calculated_total": calculated_total,
                "charged_amount": charged_amount,
                "adjustment": adjustment,
            })),
        )
    }
}
