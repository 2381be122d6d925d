use crate::error::{ReceiptBuilderError, Result};
use crate::schema::{CostRow, CostTable, DISCOUNT_CATEGORY};
use crate::utils::parse_amount_cell;
use csv::{ReaderBuilder, StringRecord};
use log::{debug, info};
use rust_decimal::Decimal;
use std::io::Read;
use std::path::Path;

/// Largest magnitude accepted for a single cost cell. Keeps every product
/// and sum the calculator forms well inside `Decimal`'s range.
pub fn max_cell_amount() -> Decimal {
    Decimal::new(1_000_000_000_000, 0)
}

impl CostTable {
    /// Reads a cost table from CSV. The header row names the columns: column
    /// 0 holds the plan key, every other column is a cost category.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut records = csv_reader.records();
        let header = match records.next() {
            Some(record) => record?,
            None => return Err(ReceiptBuilderError::MissingHeader),
        };

        let mut rows = Vec::new();
        for record in records {
            rows.push(record?);
        }

        Self::from_records(&header, &rows)
    }

    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading cost table from {}", path.display());
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(file)
    }

    /// Builds a cost table from already-split rows, header first.
    pub fn from_rows<S: AsRef<str>>(rows: &[Vec<S>]) -> Result<Self> {
        let (header, body) = rows.split_first().ok_or(ReceiptBuilderError::MissingHeader)?;
        let header: StringRecord = header.iter().map(|c| c.as_ref().trim()).collect();
        let body: Vec<StringRecord> = body
            .iter()
            .map(|row| row.iter().map(|c| c.as_ref().trim()).collect())
            .collect();
        Self::from_records(&header, &body)
    }

    fn from_records(header: &StringRecord, rows: &[StringRecord]) -> Result<Self> {
        if header.len() < 2 {
            return Err(ReceiptBuilderError::InvalidHeader(
                "expected a plan duration column followed by at least one category column"
                    .to_string(),
            ));
        }

        let categories: Vec<String> = header
            .iter()
            .skip(1)
            .map(|name| name.trim().to_lowercase())
            .collect();

        let mut table = CostTable::new();
        for (line, record) in rows.iter().enumerate() {
            let key = record.get(0).unwrap_or("").trim();
            if key.is_empty() {
                debug!("Skipping row {} with blank plan key", line + 2);
                continue;
            }

            let mut row = CostRow::new();
            for (idx, category) in categories.iter().enumerate() {
                if category.is_empty() {
                    continue;
                }
                let Some(cell) = record.get(idx + 1) else {
                    break;
                };
                let amount = parse_amount_cell(cell);
                if amount.abs() > max_cell_amount() {
                    return Err(ReceiptBuilderError::AmountOutOfRange {
                        plan: key.to_string(),
                        category: category.clone(),
                        amount: amount.to_string(),
                    });
                }
                if amount != Decimal::ZERO || category == DISCOUNT_CATEGORY {
                    row.set(category.clone(), amount);
                }
            }

            table.insert_plan(key, row)?;
        }

        if table.is_empty() {
            return Err(ReceiptBuilderError::EmptyCostTable);
        }

        info!(
            "Loaded cost table with {} plan(s): {}",
            table.len(),
            table.plan_keys().collect::<Vec<_>>().join(", ")
        );
        Ok(table)
    }
}
