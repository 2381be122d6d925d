use crate::error::{ReceiptBuilderError, Result};
use crate::utils::normalize_state_code;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProviderIdentity {
    pub name: String,
    #[serde(default)]
    #[schemars(description = "National Provider Identifier, if one is printed on the receipt")]
    pub npi: Option<String>,
}

impl ProviderIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            npi: None,
        }
    }
}

/// Deployment-specific values the calculator and receipt envelope read
/// instead of hardcoding billing identity or jurisdiction rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EngineConfig {
    #[schemars(description = "Provider shown as the clinical provider line item and on the receipt")]
    pub rendering_provider: ProviderIdentity,

    #[schemars(description = "Billing entity printed on the receipt. Not used in calculation.")]
    pub billing_provider: Option<ProviderIdentity>,

    #[schemars(description = "Cost table row used when the requested plan duration is missing")]
    pub default_plan_key: String,

    #[schemars(description = "Two-letter codes of states where lab costs are zeroed")]
    pub lab_exempt_states: Vec<String>,

    #[schemars(description = "Absolute tolerance for total comparisons")]
    pub tolerance: Decimal,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rendering_provider: ProviderIdentity::new("Clinical Provider"),
            billing_provider: None,
            default_plan_key: "4w".to_string(),
            lab_exempt_states: vec!["NY".to_string()],
            tolerance: Decimal::new(1, 2),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rendering_provider.name.trim().is_empty() {
            return Err(ReceiptBuilderError::InvalidConfig(
                "rendering provider name must not be blank".to_string(),
            ));
        }

        if self.default_plan_key.trim().is_empty() {
            return Err(ReceiptBuilderError::InvalidConfig(
                "default plan key must not be blank".to_string(),
            ));
        }

        for state in &self.lab_exempt_states {
            if normalize_state_code(state).is_none() {
                return Err(ReceiptBuilderError::InvalidConfig(format!(
                    "unknown state '{}' in lab_exempt_states",
                    state
                )));
            }
        }

        if self.tolerance.is_sign_negative() {
            return Err(ReceiptBuilderError::InvalidConfig(format!(
                "tolerance {} must not be negative",
                self.tolerance
            )));
        }

        Ok(())
    }

    /// Whether the lab-zeroing rule applies to a patient's state, given as a
    /// code or a full name.
    pub fn is_lab_exempt(&self, state: &str) -> bool {
        let Some(code) = normalize_state_code(state) else {
            return false;
        };
        self.lab_exempt_states
            .iter()
            .filter_map(|s| normalize_state_code(s))
            .any(|exempt| exempt == code)
    }
}
