use crate::error::{ReceiptBuilderError, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DISCOUNT_CATEGORY: &str = "discount";

/// Formats a plan duration as the cost table key, e.g. `4` -> `"4w"`.
pub fn plan_key_for_weeks(weeks: u32) -> String {
    format!("{}w", weeks)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CostEntry {
    #[schemars(description = "Category column name as it appeared in the cost table header, normally lowercase")]
    pub category: String,

    #[schemars(description = "Amount for this category and plan duration. Zero and negative amounts are allowed.")]
    pub amount: Decimal,
}

/// One plan duration's categories, in table-column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct CostRow {
    entries: Vec<CostEntry>,
}

impl CostRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a category amount, replacing an existing entry whose name matches
    /// case-insensitively so the column keeps its original position.
    pub fn set(&mut self, category: impl Into<String>, amount: Decimal) {
        let category = category.into();
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| same_category(&e.category, &category))
        {
            entry.amount = amount;
        } else {
            self.entries.push(CostEntry { category, amount });
        }
    }

    pub fn with(mut self, category: impl Into<String>, amount: Decimal) -> Self {
        self.set(category, amount);
        self
    }

    pub fn get(&self, category: &str) -> Option<Decimal> {
        self.entries
            .iter()
            .find(|e| same_category(&e.category, category))
            .map(|e| e.amount)
    }

    pub fn entries(&self) -> &[CostEntry] {
        &self.entries
    }

    /// The discount amount for this row, or zero when the row has no discount column.
    pub fn discount(&self) -> Decimal {
        self.get(DISCOUNT_CATEGORY).unwrap_or(Decimal::ZERO)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

fn same_category(left: &str, right: &str) -> bool {
    left.trim().eq_ignore_ascii_case(right.trim())
}

/// Plan duration key (e.g. `"4w"`) to that plan's cost row.
/// Built once from an external source and treated as immutable input by the calculator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct CostTable {
    plans: BTreeMap<String, CostRow>,
}

impl CostTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_plan(&mut self, key: impl Into<String>, row: CostRow) -> Result<()> {
        let key = key.into();
        if self.plans.contains_key(&key) {
            return Err(ReceiptBuilderError::DuplicatePlanKey(key));
        }
        self.plans.insert(key, row);
        Ok(())
    }

    pub fn plan(&self, key: &str) -> Option<&CostRow> {
        self.plans.get(key)
    }

    pub fn contains_plan(&self, key: &str) -> bool {
        self.plans.contains_key(key)
    }

    pub fn plan_keys(&self) -> impl Iterator<Item = &str> {
        self.plans.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PaymentRecord {
    #[schemars(description = "Amount actually billed. This is the ground truth the breakdown is reconciled to.")]
    pub charged_amount: Decimal,

    pub charge_date: NaiveDate,

    #[schemars(description = "Billing cycle length in weeks; primary key into the cost table")]
    pub plan_duration_weeks: u32,

    #[serde(default)]
    pub plan_name: Option<String>,

    #[schemars(description = "Extraction confidence from 0 to 100. Manually entered records use 100.")]
    pub confidence_score: f64,
}

impl PaymentRecord {
    pub fn plan_key(&self) -> String {
        plan_key_for_weeks(self.plan_duration_weeks)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ProgramType {
    #[serde(rename = "TRT")]
    Trt,
    #[serde(rename = "HRT")]
    Hrt,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PatientRecord {
    pub name: String,
    pub date_of_birth: NaiveDate,
    pub coverage_start: NaiveDate,
    pub coverage_end: NaiveDate,

    #[schemars(description = "Two-letter state code or full state name")]
    pub state_code: String,

    #[schemars(description = "Medications in the order they should be listed. Must be non-empty.")]
    pub medication_list: Vec<String>,

    pub program_type: ProgramType,
}

impl PatientRecord {
    /// Checks that every field a calculation depends on is populated.
    /// The calculator itself never fails, so callers run this before invoking it.
    pub fn check_complete(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ReceiptBuilderError::IncompletePatient(
                "name is required".to_string(),
            ));
        }
        if self.state_code.trim().is_empty() {
            return Err(ReceiptBuilderError::IncompletePatient(
                "state is required".to_string(),
            ));
        }
        if self.medication_list.is_empty() {
            return Err(ReceiptBuilderError::IncompletePatient(
                "at least one medication is required".to_string(),
            ));
        }
        if self.medication_list.iter().any(|m| m.trim().is_empty()) {
            return Err(ReceiptBuilderError::IncompletePatient(
                "medication names must not be blank".to_string(),
            ));
        }
        if self.coverage_end < self.coverage_start {
            return Err(ReceiptBuilderError::DateError(format!(
                "coverage end {} is before coverage start {}",
                self.coverage_end, self.coverage_start
            )));
        }
        Ok(())
    }

    pub fn medication_count(&self) -> usize {
        self.medication_list.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LineItem {
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Present only for scaled items. Flat, already-scaled amounts omit it.")]
    pub quantity: Option<u32>,

    pub unit_price: Decimal,
    pub total: Decimal,
}

impl LineItem {
    /// A flat amount: no quantity, total equals unit price.
    pub fn flat(description: impl Into<String>, amount: Decimal) -> Self {
        Self {
            description: description.into(),
            quantity: None,
            unit_price: amount,
            total: amount,
        }
    }

    /// A quantity times a unit price. A product beyond the representable
    /// range is capped at `Decimal::MAX` / `Decimal::MIN`.
    pub fn scaled(description: impl Into<String>, quantity: u32, unit_price: Decimal) -> Self {
        Self {
            description: description.into(),
            quantity: Some(quantity),
            unit_price,
            total: unit_price.saturating_mul(Decimal::from(quantity)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Section {
    pub name: String,
    pub line_items: Vec<LineItem>,
    pub subtotal: Decimal,
}

impl Section {
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            line_items: Vec::new(),
            subtotal: Decimal::ZERO,
        }
    }

    pub fn single(name: impl Into<String>, item: LineItem) -> Self {
        let subtotal = item.total;
        Self {
            name: name.into(),
            line_items: vec![item],
            subtotal,
        }
    }

    pub fn line_item_sum(&self) -> Decimal {
        self.line_items
            .iter()
            .fold(Decimal::ZERO, |acc, item| acc.saturating_add(item.total))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionKind {
    #[schemars(description = "A jurisdiction-specific override fired")]
    StateException,

    #[schemars(description = "The requested plan duration was absent and a default row was used")]
    PlanMismatch,

    #[schemars(description = "The computed total was forced to match the external charge")]
    Reallocation,

    #[schemars(description = "Raised by the validation layer, never by the calculator")]
    Validation,
}

/// Structured audit record of a rule that fired or a correction that was applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BreakdownException {
    pub kind: ExceptionKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl BreakdownException {
    pub fn new(kind: ExceptionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Breakdown {
    pub pharmacy: Section,
    pub lab: Section,
    pub provider: Section,
    pub operational: Section,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discounts: Option<Section>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Non-standard categories (support, shipping, ...) in table-column order. Absent when empty.")]
    pub additional_sections: Option<Vec<Section>>,

    pub total: Decimal,
    pub exceptions: Vec<BreakdownException>,
}

impl Breakdown {
    pub fn exceptions_of(&self, kind: ExceptionKind) -> impl Iterator<Item = &BreakdownException> {
        self.exceptions.iter().filter(move |e| e.kind == kind)
    }

    pub fn additional(&self) -> &[Section] {
        self.additional_sections.as_deref().unwrap_or(&[])
    }

    /// Sections in render order: the four standard sections, additional
    /// sections, then discounts.
    pub fn sections(&self) -> Vec<&Section> {
        let mut sections = vec![&self.pharmacy, &self.lab, &self.provider, &self.operational];
        sections.extend(self.additional());
        if let Some(discounts) = &self.discounts {
            sections.push(discounts);
        }
        sections
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(Breakdown)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_plan_key_for_weeks() {
        assert_eq!(plan_key_for_weeks(4), "4w");
        assert_eq!(plan_key_for_weeks(12), "12w");
    }

    #[test]
    fn test_cost_row_preserves_column_order_and_matches_case_insensitively() {
        let row = CostRow::new()
            .with("pharmacy", dec!(100))
            .with("Lab", dec!(50))
            .with("discount", dec!(10))
            .with("LAB", dec!(60));

        let names: Vec<&str> = row.entries().iter().map(|e| e.category.as_str()).collect();
        assert_eq!(names, vec!["pharmacy", "Lab", "discount"]);
        assert_eq!(row.get("lab"), Some(dec!(60)));
        assert_eq!(row.discount(), dec!(10));
        assert_eq!(CostRow::new().discount(), Decimal::ZERO);
    }

    #[test]
    fn test_cost_table_rejects_duplicate_plan_keys() {
        let mut table = CostTable::new();
        table.insert_plan("4w", CostRow::new()).unwrap();
        let err = table.insert_plan("4w", CostRow::new()).unwrap_err();
        assert!(matches!(err, ReceiptBuilderError::DuplicatePlanKey(k) if k == "4w"));
    }

    #[test]
    fn test_padded_category_names_still_match() {
        let row: CostRow = serde_json::from_str(
            r#"[{ "category": " discount ", "amount": "15" }, { "category": "Lab", "amount": "40" }]"#,
        )
        .unwrap();

        assert_eq!(row.discount(), dec!(15));
        assert_eq!(row.get(" lab"), Some(dec!(40)));

        let row = row.with("discount", dec!(20));
        assert_eq!(row.len(), 2);
        assert_eq!(row.discount(), dec!(20));
    }

    #[test]
    fn test_cost_table_serializes_as_plain_map() {
        let mut table = CostTable::new();
        table
            .insert_plan("4w", CostRow::new().with("pharmacy", dec!(100)))
            .unwrap();

        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json["4w"][0]["category"], "pharmacy");
        assert_eq!(json["4w"][0]["amount"], "100");

        let back: CostTable = serde_json::from_value(json).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn test_line_item_constructors() {
        let scaled = LineItem::scaled("Medication", 3, dec!(25.50));
        assert_eq!(scaled.total, dec!(76.50));
        assert_eq!(scaled.quantity, Some(3));

        let flat = LineItem::flat("Laboratory Services", dec!(50));
        assert_eq!(flat.total, flat.unit_price);
        assert!(flat.quantity.is_none());
    }

    #[test]
    fn test_patient_completeness() {
        let mut patient = PatientRecord {
            name: "Jane Doe".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1980, 5, 1).unwrap(),
            coverage_start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            coverage_end: NaiveDate::from_ymd_opt(2024, 1, 28).unwrap(),
            state_code: "CA".to_string(),
            medication_list: vec!["Testosterone Cypionate".to_string()],
            program_type: ProgramType::Trt,
        };
        assert!(patient.check_complete().is_ok());

        patient.medication_list.clear();
        assert!(matches!(
            patient.check_complete(),
            Err(ReceiptBuilderError::IncompletePatient(_))
        ));

        patient.medication_list.push("Estradiol".to_string());
        patient.coverage_end = NaiveDate::from_ymd_opt(2023, 12, 1).unwrap();
        assert!(matches!(
            patient.check_complete(),
            Err(ReceiptBuilderError::DateError(_))
        ));
    }

    #[test]
    fn test_program_type_wire_names() {
        assert_eq!(serde_json::to_string(&ProgramType::Trt).unwrap(), "\"TRT\"");
        assert_eq!(serde_json::to_string(&ProgramType::Other).unwrap(), "\"Other\"");
        assert_eq!(
            serde_json::to_string(&ExceptionKind::PlanMismatch).unwrap(),
            "\"plan_mismatch\""
        );
    }

    #[test]
    fn test_schema_generation() {
        let schema_json = Breakdown::schema_as_json().unwrap();
        assert!(schema_json.contains("additional_sections"));
        assert!(schema_json.contains("exceptions"));
    }
}
