//! Independent consistency check for a finished [`Breakdown`].
//!
//! Everything here is re-derived from the raw line items; nothing is shared
//! with the calculator beyond the data model.

use crate::schema::{Breakdown, BreakdownException, ExceptionKind, Section};
use crate::utils::{checked_sum, within_tolerance};
use log::warn;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Errors and warnings as `validation` exception records, for callers
    /// that keep a single audit trail alongside the breakdown.
    pub fn to_exceptions(&self) -> Vec<BreakdownException> {
        self.errors
            .iter()
            .map(|e| {
                BreakdownException::new(ExceptionKind::Validation, e.clone())
                    .with_details(serde_json::json!({ "severity": "error" }))
            })
            .chain(self.warnings.iter().map(|w| {
                BreakdownException::new(ExceptionKind::Validation, w.clone())
                    .with_details(serde_json::json!({ "severity": "warning" }))
            }))
            .collect()
    }
}

pub struct BreakdownValidator {
    tolerance: Decimal,
}

impl Default for BreakdownValidator {
    fn default() -> Self {
        Self::new(Decimal::new(1, 2))
    }
}

impl BreakdownValidator {
    pub fn new(tolerance: Decimal) -> Self {
        Self { tolerance }
    }

    pub fn validate(&self, breakdown: &Breakdown) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        self.check_section("Pharmacy", &breakdown.pharmacy, &mut errors);
        self.check_section("Lab", &breakdown.lab, &mut errors);
        self.check_section("Provider", &breakdown.provider, &mut errors);
        self.check_section("Operational", &breakdown.operational, &mut errors);
        if let Some(discounts) = &breakdown.discounts {
            self.check_section("Discounts", discounts, &mut errors);
        }
        for section in breakdown.additional() {
            self.check_section(&section.name, section, &mut errors);
        }

        // Additional sections are part of the grand total, matching how the
        // calculator builds it.
        let subtotals = [
            &breakdown.pharmacy,
            &breakdown.lab,
            &breakdown.provider,
            &breakdown.operational,
        ]
        .into_iter()
        .chain(breakdown.discounts.as_ref())
        .chain(breakdown.additional())
        .map(|s| s.subtotal);

        match checked_sum(subtotals) {
            Some(calculated_total)
                if within_tolerance(calculated_total, breakdown.total, self.tolerance) => {}
            Some(calculated_total) => errors.push(format!(
                "Final total: Calculated total (${:.2}) does not match breakdown total (${:.2})",
                calculated_total, breakdown.total
            )),
            None => errors.push(
                "Final total: Section subtotals exceed the supported range".to_string(),
            ),
        }

        if !breakdown.exceptions.is_empty() {
            warnings.push(format!(
                "{} exception(s) were applied during calculation",
                breakdown.exceptions.len()
            ));
        }

        if !errors.is_empty() {
            warn!("Breakdown failed validation with {} error(s)", errors.len());
        }

        ValidationReport {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    fn check_section(&self, label: &str, section: &Section, errors: &mut Vec<String>) {
        match checked_sum(section.line_items.iter().map(|item| item.total)) {
            Some(line_total) if within_tolerance(line_total, section.subtotal, self.tolerance) => {}
            Some(line_total) => errors.push(format!(
                "{} section: Line items total (${:.2}) does not match subtotal (${:.2})",
                label, line_total, section.subtotal
            )),
            None => errors.push(format!(
                "{} section: Line items total exceeds the supported range",
                label
            )),
        }
    }
}

pub fn validate_breakdown(breakdown: &Breakdown) -> ValidationReport {
    BreakdownValidator::default().validate(breakdown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::LineItem;
    use rust_decimal_macros::dec;

    fn consistent_breakdown() -> Breakdown {
        Breakdown {
            pharmacy: Section::single(
                "Pharmacy Costs",
                LineItem::scaled("Medication (Testosterone, Anastrozole)", 2, dec!(100)),
            ),
            lab: Section::single("Lab Costs", LineItem::flat("Laboratory Services", dec!(50))),
            provider: Section::single(
                "Clinical Provider Services",
                LineItem::flat("Clinical Provider", dec!(75)),
            ),
            operational: Section::single(
                "Operational Costs",
                LineItem::flat("Operational Costs", dec!(15)),
            ),
            discounts: Some(Section::single("Discounts", LineItem::flat("Discount", dec!(-10)))),
            additional_sections: None,
            total: dec!(330),
            exceptions: vec![],
        }
    }

    #[test]
    fn test_consistent_breakdown_is_valid() {
        let report = validate_breakdown(&consistent_breakdown());
        assert!(report.is_valid);
        assert!(report.errors.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_altered_line_item_names_the_section() {
        let mut breakdown = consistent_breakdown();
        breakdown.lab.line_items[0].total = dec!(45);

        let report = validate_breakdown(&breakdown);
        assert!(!report.is_valid);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(
            report.errors[0],
            "Lab section: Line items total ($45.00) does not match subtotal ($50.00)"
        );
    }

    #[test]
    fn test_total_mismatch_is_an_error() {
        let mut breakdown = consistent_breakdown();
        breakdown.total = dec!(331);

        let report = validate_breakdown(&breakdown);
        assert!(!report.is_valid);
        assert!(report.errors[0].starts_with("Final total"));
    }

    #[test]
    fn test_sub_cent_drift_is_tolerated() {
        let mut breakdown = consistent_breakdown();
        breakdown.total = dec!(330.01);
        breakdown.operational.subtotal = dec!(15.005);

        assert!(validate_breakdown(&breakdown).is_valid);
    }

    #[test]
    fn test_exceptions_produce_a_single_warning() {
        let mut breakdown = consistent_breakdown();
        breakdown.exceptions = vec![
            BreakdownException::new(ExceptionKind::StateException, "NY: Lab costs set to $0"),
            BreakdownException::new(ExceptionKind::Reallocation, "Total adjusted"),
        ];

        let report = validate_breakdown(&breakdown);
        assert!(report.is_valid);
        assert_eq!(
            report.warnings,
            vec!["2 exception(s) were applied during calculation".to_string()]
        );
    }

    // Additional sections count toward the grand total, so a breakdown with a
    // shipping section whose total includes it is valid, and one whose total
    // leaves it out is not.
    #[test]
    fn test_additional_sections_are_part_of_the_total() {
        let mut breakdown = consistent_breakdown();
        breakdown.additional_sections = Some(vec![Section::single(
            "Shipping & Handling",
            LineItem::flat("Shipping & Handling", dec!(12)),
        )]);
        breakdown.total = dec!(342);
        assert!(validate_breakdown(&breakdown).is_valid);

        breakdown.total = dec!(330);
        let report = validate_breakdown(&breakdown);
        assert!(!report.is_valid);
        assert!(report.errors[0].contains("Final total"));
    }

    #[test]
    fn test_additional_section_subtotal_is_checked() {
        let mut breakdown = consistent_breakdown();
        let mut shipping = Section::single(
            "Shipping & Handling",
            LineItem::flat("Shipping & Handling", dec!(12)),
        );
        shipping.subtotal = dec!(20);
        breakdown.additional_sections = Some(vec![shipping]);
        breakdown.total = dec!(350);

        let report = validate_breakdown(&breakdown);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("Shipping & Handling section"));
    }

    #[test]
    fn test_out_of_range_sums_are_reported_not_raised() {
        let mut breakdown = consistent_breakdown();
        breakdown.pharmacy = Section::single("Pharmacy Costs", LineItem::flat("Medication", Decimal::MAX));
        breakdown.lab = Section::single("Lab Costs", LineItem::flat("Laboratory Services", Decimal::MAX));
        breakdown.total = Decimal::MAX;

        let report = validate_breakdown(&breakdown);
        assert!(!report.is_valid);
        assert_eq!(
            report.errors,
            vec!["Final total: Section subtotals exceed the supported range".to_string()]
        );

        breakdown.lab.line_items.push(LineItem::flat("Panel", Decimal::MAX));
        let report = validate_breakdown(&breakdown);
        assert_eq!(
            report.errors[0],
            "Lab section: Line items total exceeds the supported range"
        );
    }

    #[test]
    fn test_report_as_validation_exceptions() {
        let report = ValidationReport {
            is_valid: false,
            errors: vec!["Lab section: mismatch".to_string()],
            warnings: vec!["1 exception(s) were applied during calculation".to_string()],
        };

        let exceptions = report.to_exceptions();
        assert_eq!(exceptions.len(), 2);
        assert!(exceptions.iter().all(|e| e.kind == ExceptionKind::Validation));
        assert_eq!(exceptions[0].details.as_ref().unwrap()["severity"], "error");
        assert_eq!(exceptions[1].details.as_ref().unwrap()["severity"], "warning");
    }
}
