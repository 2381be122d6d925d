use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReceiptBuilderError {
    #[error("Cost table contains no plan rows")]
    EmptyCostTable,

    #[error("Cost table source has no header row")]
    MissingHeader,

    #[error("Invalid cost table header: {0}")]
    InvalidHeader(String),

    #[error("Duplicate plan key in cost table: {0}")]
    DuplicatePlanKey(String),

    #[error("Amount {amount} for '{category}' in plan {plan} is outside the supported range")]
    AmountOutOfRange {
        plan: String,
        category: String,
        amount: String,
    },

    #[error("Patient record is incomplete: {0}")]
    IncompletePatient(String),

    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("Breakdown failed validation with {} error(s): {}", errors.len(), errors.join("; "))]
    BreakdownInvalid { errors: Vec<String> },

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReceiptBuilderError>;
