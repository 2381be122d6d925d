use crate::schema::{Breakdown, LineItem, Section};
use log::warn;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Operator edits applied to a calculated breakdown before it is rendered.
/// The calculated breakdown is never touched; applying produces a new one.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct BreakdownCorrections {
    #[serde(default)]
    pub corrections: Vec<Correction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SectionTarget {
    Pharmacy,
    Lab,
    Provider,
    Operational,
    Discounts,
    /// An additional section, matched by display name.
    Additional(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Correction {
    /// Replace the price (and optionally quantity) of an existing line item.
    SetLineItem {
        section: SectionTarget,
        index: usize,
        unit_price: Decimal,
        #[serde(default)]
        quantity: Option<u32>,
    },

    AddLineItem {
        section: SectionTarget,
        description: String,
        unit_price: Decimal,
        #[serde(default)]
        quantity: Option<u32>,
    },

    RemoveLineItem { section: SectionTarget, index: usize },

    /// Drop an additional section entirely.
    RemoveSection { name: String },

    /// Re-derive subtotals and the total without changing any line item.
    Recompute,
}

impl BreakdownCorrections {
    pub fn new(corrections: Vec<Correction>) -> Self {
        Self { corrections }
    }

    /// Applies every correction in order and re-derives subtotals and the
    /// grand total from the resulting line items.
    pub fn apply(&self, base: &Breakdown) -> Breakdown {
        let mut breakdown = base.clone();

        for correction in &self.corrections {
            apply_single_correction(&mut breakdown, correction);
        }

        recompute_totals(&mut breakdown);
        breakdown
    }
}

fn apply_single_correction(breakdown: &mut Breakdown, correction: &Correction) {
    match correction {
        Correction::SetLineItem {
            section,
            index,
            unit_price,
            quantity,
        } => match find_section_mut(breakdown, section).and_then(|s| s.line_items.get_mut(*index))
        {
            Some(item) => {
                item.unit_price = *unit_price;
                item.quantity = *quantity;
                item.total = line_total(*unit_price, *quantity);
            }
            None => warn!("No line item {} in {:?}; correction skipped", index, section),
        },

        Correction::AddLineItem {
            section,
            description,
            unit_price,
            quantity,
        } => {
            let item = LineItem {
                description: description.clone(),
                quantity: *quantity,
                unit_price: *unit_price,
                total: line_total(*unit_price, *quantity),
            };
            if let SectionTarget::Discounts = section {
                breakdown
                    .discounts
                    .get_or_insert_with(|| Section::empty("Discounts"))
                    .line_items
                    .push(item);
            } else if let Some(target) = find_section_mut(breakdown, section) {
                target.line_items.push(item);
            } else {
                warn!("No section {:?}; correction skipped", section);
            }
        }

        Correction::RemoveLineItem { section, index } => {
            match find_section_mut(breakdown, section) {
                Some(target) if *index < target.line_items.len() => {
                    target.line_items.remove(*index);
                }
                _ => warn!("No line item {} in {:?}; correction skipped", index, section),
            }
        }

        Correction::RemoveSection { name } => {
            if let Some(sections) = breakdown.additional_sections.as_mut() {
                sections.retain(|s| &s.name != name);
            }
        }

        Correction::Recompute => {}
    }
}

fn find_section_mut<'a>(
    breakdown: &'a mut Breakdown,
    target: &SectionTarget,
) -> Option<&'a mut Section> {
    match target {
        SectionTarget::Pharmacy => Some(&mut breakdown.pharmacy),
        SectionTarget::Lab => Some(&mut breakdown.lab),
        SectionTarget::Provider => Some(&mut breakdown.provider),
        SectionTarget::Operational => Some(&mut breakdown.operational),
        SectionTarget::Discounts => breakdown.discounts.as_mut(),
        SectionTarget::Additional(name) => breakdown
            .additional_sections
            .as_mut()
            .and_then(|sections| sections.iter_mut().find(|s| &s.name == name)),
    }
}

fn line_total(unit_price: Decimal, quantity: Option<u32>) -> Decimal {
    unit_price.saturating_mul(Decimal::from(quantity.unwrap_or(1)))
}

fn recompute_totals(breakdown: &mut Breakdown) {
    if breakdown
        .additional_sections
        .as_ref()
        .is_some_and(|sections| sections.is_empty())
    {
        breakdown.additional_sections = None;
    }
    if breakdown
        .discounts
        .as_ref()
        .is_some_and(|s| s.line_items.is_empty())
    {
        breakdown.discounts = None;
    }

    let mut total = Decimal::ZERO;
    for section in [
        &mut breakdown.pharmacy,
        &mut breakdown.lab,
        &mut breakdown.provider,
        &mut breakdown.operational,
    ] {
        section.subtotal = section.line_item_sum();
        total = total.saturating_add(section.subtotal);
    }
    for section in breakdown
        .discounts
        .iter_mut()
        .chain(breakdown.additional_sections.iter_mut().flatten())
    {
        section.subtotal = section.line_item_sum();
        total = total.saturating_add(section.subtotal);
    }
    breakdown.total = total;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::validate_breakdown;
    use rust_decimal_macros::dec;

    fn base() -> Breakdown {
        Breakdown {
            pharmacy: Section::single("Pharmacy Costs", LineItem::scaled("Medication (A)", 1, dec!(100))),
            lab: Section::single("Lab Costs", LineItem::flat("Laboratory Services", dec!(50))),
            provider: Section::single("Clinical Provider Services", LineItem::flat("Dr", dec!(75))),
            operational: Section::single("Operational Costs", LineItem::flat("Operational Costs", dec!(25))),
            discounts: Some(Section::single("Discounts", LineItem::flat("Discount", dec!(-10)))),
            additional_sections: Some(vec![Section::single(
                "Shipping & Handling",
                LineItem::flat("Shipping & Handling", dec!(12)),
            )]),
            total: dec!(252),
            exceptions: vec![],
        }
    }

    #[test]
    fn test_set_line_item_updates_totals() {
        let corrections = BreakdownCorrections::new(vec![Correction::SetLineItem {
            section: SectionTarget::Pharmacy,
            index: 0,
            unit_price: dec!(90),
            quantity: Some(2),
        }]);

        let original = base();
        let corrected = corrections.apply(&original);

        assert_eq!(corrected.pharmacy.subtotal, dec!(180));
        assert_eq!(corrected.total, dec!(332));
        assert_eq!(original.pharmacy.subtotal, dec!(100));
        assert!(validate_breakdown(&corrected).is_valid);
    }

    #[test]
    fn test_remove_section_and_discount_line() {
        let corrections = BreakdownCorrections::new(vec![
            Correction::RemoveSection {
                name: "Shipping & Handling".to_string(),
            },
            Correction::RemoveLineItem {
                section: SectionTarget::Discounts,
                index: 0,
            },
        ]);

        let corrected = corrections.apply(&base());
        assert!(corrected.additional_sections.is_none());
        assert!(corrected.discounts.is_none());
        assert_eq!(corrected.total, dec!(250));
    }

    #[test]
    fn test_missing_targets_are_skipped() {
        let corrections = BreakdownCorrections::new(vec![
            Correction::SetLineItem {
                section: SectionTarget::Additional("Support Services".to_string()),
                index: 0,
                unit_price: dec!(1),
                quantity: None,
            },
            Correction::RemoveLineItem {
                section: SectionTarget::Lab,
                index: 4,
            },
        ]);

        let corrected = corrections.apply(&base());
        assert_eq!(corrected.total, dec!(252));
        assert_eq!(corrected.lab.line_items.len(), 1);
    }

    #[test]
    fn test_recompute_repairs_a_tampered_subtotal() {
        let mut tampered = base();
        tampered.lab.subtotal = dec!(0);
        assert!(!validate_breakdown(&tampered).is_valid);

        let repaired = BreakdownCorrections::new(vec![Correction::Recompute]).apply(&tampered);
        assert_eq!(repaired.lab.subtotal, dec!(50));
        assert!(validate_breakdown(&repaired).is_valid);
    }

    #[test]
    fn test_corrections_deserialize_from_json() {
        let json = r#"{
            "corrections": [
                { "action": "add_line_item", "section": "discounts", "description": "Loyalty credit", "unit_price": "-5" },
                { "action": "set_line_item", "section": { "additional": "Shipping & Handling" }, "index": 0, "unit_price": "8" },
                { "action": "recompute" }
            ]
        }"#;

        let corrections: BreakdownCorrections = serde_json::from_str(json).unwrap();
        let corrected = corrections.apply(&base());
        assert_eq!(corrected.discounts.as_ref().unwrap().subtotal, dec!(-15));
        assert_eq!(corrected.additional()[0].subtotal, dec!(8));
        assert_eq!(corrected.total, dec!(243));
    }
}
