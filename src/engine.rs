use crate::balancer::Reconciler;
use crate::categories::{display_name_for, CostCategory};
use crate::config::EngineConfig;
use crate::schema::*;
use crate::utils::checked_sum;
use log::{debug, warn};
use rust_decimal::Decimal;
use serde_json::json;

const LAB_LINE_DESCRIPTION: &str = "Laboratory Services";
const DISCOUNT_LINE_DESCRIPTION: &str = "Discount";

/// Working state while a breakdown is assembled: one optional section per
/// standard category, additional sections in column order, and the
/// per-category cost map.
#[derive(Debug, Default)]
pub(crate) struct CategoryLedger {
    pub(crate) pharmacy: Option<Section>,
    pub(crate) lab: Option<Section>,
    pub(crate) provider: Option<Section>,
    pub(crate) operational: Option<Section>,
    pub(crate) additional: Vec<Section>,
    pub(crate) costs: Vec<(String, Decimal)>,
}

impl CategoryLedger {
    fn record_cost(&mut self, key: &str, amount: Decimal) {
        if let Some(entry) = self.costs.iter_mut().find(|(k, _)| k == key) {
            entry.1 = amount;
        } else {
            self.costs.push((key.to_string(), amount));
        }
    }

    pub(crate) fn cost(&self, key: &str) -> Decimal {
        self.costs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| *v)
            .unwrap_or(Decimal::ZERO)
    }

    pub(crate) fn set_operational(&mut self, section: Section) {
        self.record_cost(CostCategory::Operational.key(), section.subtotal);
        self.operational = Some(section);
    }

    /// Sum of the four standard category costs plus every additional section,
    /// or `None` when it overflows.
    fn total_before_discount(&self) -> Option<Decimal> {
        let standard = [
            CostCategory::Pharmacy,
            CostCategory::Lab,
            CostCategory::Provider,
            CostCategory::Operational,
        ]
        .iter()
        .map(|c| self.cost(c.key()));

        checked_sum(standard.chain(self.additional.iter().map(|s| s.subtotal)))
    }
}

/// Turns a payment, a patient and a cost table into an itemized breakdown.
///
/// Never fails: a missing plan row, a jurisdiction override or a mismatch
/// against the charged amount each become a [`BreakdownException`] on the
/// returned breakdown.
pub struct BreakdownCalculator<'a> {
    config: &'a EngineConfig,
}

impl<'a> BreakdownCalculator<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    pub fn calculate(
        &self,
        payment: &PaymentRecord,
        patient: &PatientRecord,
        table: &CostTable,
    ) -> Breakdown {
        let mut exceptions = Vec::new();

        let plan_key = payment.plan_key();
        let base_costs = self.resolve_plan(table, &plan_key, payment, &mut exceptions);
        debug!(
            "Resolved plan '{}' to {} cost categories",
            plan_key,
            base_costs.len()
        );

        let mut ledger = CategoryLedger::default();

        for entry in base_costs.entries() {
            let category = CostCategory::from_column(&entry.category);
            match category {
                CostCategory::Discount => continue,
                CostCategory::Pharmacy => {
                    let section = self.pharmacy_section(
                        &entry.category,
                        entry.amount,
                        patient,
                        &mut exceptions,
                    );
                    ledger.record_cost(category.key(), section.subtotal);
                    ledger.pharmacy = Some(section);
                }
                CostCategory::Lab => {
                    let section =
                        self.lab_section(&entry.category, entry.amount, patient, &mut exceptions);
                    ledger.record_cost(category.key(), section.subtotal);
                    ledger.lab = Some(section);
                }
                CostCategory::Provider => {
                    let section = Section::single(
                        display_name_for(&entry.category),
                        LineItem::flat(self.config.rendering_provider.name.clone(), entry.amount),
                    );
                    ledger.record_cost(category.key(), entry.amount);
                    ledger.provider = Some(section);
                }
                CostCategory::Operational => {
                    let name = display_name_for(&entry.category);
                    let section = Section::single(name.clone(), LineItem::flat(name, entry.amount));
                    ledger.set_operational(section);
                }
                CostCategory::Additional(ref key) => {
                    if entry.amount > Decimal::ZERO {
                        let name = display_name_for(&entry.category);
                        ledger
                            .additional
                            .push(Section::single(name.clone(), LineItem::flat(name, entry.amount)));
                        ledger.record_cost(key, entry.amount);
                    } else {
                        debug!(
                            "Dropping category '{}' with non-positive amount {}",
                            entry.category, entry.amount
                        );
                        ledger.record_cost(key, Decimal::ZERO);
                    }
                }
            }
        }

        let discount_amount = base_costs.discount();
        let discounts = discount_section(discount_amount);
        let applied_discount = discounts
            .as_ref()
            .map(|_| discount_amount)
            .unwrap_or(Decimal::ZERO);

        let calculated_total = ledger
            .total_before_discount()
            .and_then(|total| total.checked_sub(applied_discount));

        let total = match calculated_total {
            Some(calculated_total) => {
                debug!(
                    "Discount {}, calculated total {}",
                    applied_discount, calculated_total
                );
                let reconciler = Reconciler::new(self.config.tolerance);
                match reconciler.reconcile(&mut ledger, calculated_total, payment.charged_amount) {
                    Some(exception) => {
                        let adjusted = exception.kind == ExceptionKind::Reallocation;
                        exceptions.push(exception);
                        if adjusted {
                            payment.charged_amount
                        } else {
                            calculated_total
                        }
                    }
                    None => calculated_total,
                }
            }
            None => {
                warn!("Category amounts overflow the calculated total; reconciliation skipped");
                exceptions.push(
                    BreakdownException::new(
                        ExceptionKind::Validation,
                        "Category amounts exceed the supported range; total set to the charged amount without reconciliation",
                    )
                    .with_details(json!({
                        "charged_amount": payment.charged_amount,
                        "discount": applied_discount,
                    })),
                );
                payment.charged_amount
            }
        };

        for exception in &exceptions {
            debug!("Recorded {:?} exception: {}", exception.kind, exception.message);
        }

        Breakdown {
            pharmacy: ledger
                .pharmacy
                .unwrap_or_else(|| Section::empty(CostCategory::Pharmacy.display_name())),
            lab: ledger
                .lab
                .unwrap_or_else(|| Section::empty(CostCategory::Lab.display_name())),
            provider: ledger
                .provider
                .unwrap_or_else(|| Section::empty(CostCategory::Provider.display_name())),
            operational: ledger
                .operational
                .unwrap_or_else(|| Section::empty(CostCategory::Operational.display_name())),
            discounts,
            additional_sections: if ledger.additional.is_empty() {
                None
            } else {
                Some(ledger.additional)
            },
            total,
            exceptions,
        }
    }

    /// Looks up the plan row, falling back to the configured default row (or
    /// an empty row) and recording a plan mismatch.
    fn resolve_plan(
        &self,
        table: &CostTable,
        plan_key: &str,
        payment: &PaymentRecord,
        exceptions: &mut Vec<BreakdownException>,
    ) -> CostRow {
        if let Some(row) = table.plan(plan_key) {
            return row.clone();
        }

        let fallback_key = &self.config.default_plan_key;
        let fallback = table.plan(fallback_key).cloned();
        exceptions.push(
            BreakdownException::new(
                ExceptionKind::PlanMismatch,
                format!(
                    "Plan duration {} weeks not found in cost table, using default",
                    payment.plan_duration_weeks
                ),
            )
            .with_details(json!({
                "plan_duration_weeks": payment.plan_duration_weeks,
                "requested_plan_key": plan_key,
                "fallback_plan_key": fallback.as_ref().map(|_| fallback_key.as_str()),
            })),
        );

        fallback.unwrap_or_default()
    }

    fn pharmacy_section(
        &self,
        column: &str,
        unit_cost: Decimal,
        patient: &PatientRecord,
        exceptions: &mut Vec<BreakdownException>,
    ) -> Section {
        let quantity = u32::try_from(patient.medication_count().max(1)).unwrap_or(u32::MAX);
        if unit_cost.checked_mul(Decimal::from(quantity)).is_none() {
            exceptions.push(
                BreakdownException::new(
                    ExceptionKind::Validation,
                    format!(
                        "Pharmacy cost for {} medication(s) exceeds the supported range; line total capped",
                        quantity
                    ),
                )
                .with_details(json!({ "unit_cost": unit_cost, "quantity": quantity })),
            );
        }
        Section::single(
            display_name_for(column),
            LineItem::scaled(
                format!("Medication ({})", patient.medication_list.join(", ")),
                quantity,
                unit_cost,
            ),
        )
    }

    fn lab_section(
        &self,
        column: &str,
        amount: Decimal,
        patient: &PatientRecord,
        exceptions: &mut Vec<BreakdownException>,
    ) -> Section {
        let cost = if self.config.is_lab_exempt(&patient.state_code) {
            exceptions.push(
                BreakdownException::new(
                    ExceptionKind::StateException,
                    format!("{}: Lab costs set to $0", patient.state_code.trim()),
                )
                .with_details(json!({
                    "state": patient.state_code,
                    "table_lab_cost": amount,
                })),
            );
            Decimal::ZERO
        } else {
            amount
        };

        Section::single(display_name_for(column), LineItem::flat(LAB_LINE_DESCRIPTION, cost))
    }
}

/// Builds the discount section when the row carries a positive discount.
/// The section's amounts are negated since discounts reduce the total.
fn discount_section(amount: Decimal) -> Option<Section> {
    if amount > Decimal::ZERO {
        Some(Section::single(
            CostCategory::Discount.display_name(),
            LineItem::flat(DISCOUNT_LINE_DESCRIPTION, -amount),
        ))
    } else {
        if amount < Decimal::ZERO {
            debug!("Ignoring negative discount amount {}", amount);
        }
        None
    }
}

pub fn calculate_breakdown(
    payment: &PaymentRecord,
    patient: &PatientRecord,
    table: &CostTable,
    config: &EngineConfig,
) -> Breakdown {
    BreakdownCalculator::new(config).calculate(payment, patient, table)
}
