use crate::utils::fallback_display_name;

/// Known category synonyms and their display names.
const DISPLAY_NAMES: &[(&str, &str)] = &[
    ("pharmacy", "Pharmacy Costs"),
    ("lab", "Lab Costs"),
    ("provider", "Clinical Provider Services"),
    ("operational", "Operational Costs"),
    ("support", "Support Services"),
    ("shipping", "Shipping & Handling"),
    ("discount", "Discounts"),
];

/// A cost table column, normalized by lowercase name.
///
/// The four standard categories and the discount get dedicated handling;
/// everything else is an open-ended additional category keyed by its
/// lowercase name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CostCategory {
    Pharmacy,
    Lab,
    Provider,
    Operational,
    Discount,
    Additional(String),
}

impl CostCategory {
    pub fn from_column(name: &str) -> Self {
        let key = name.trim().to_lowercase();
        match key.as_str() {
            "pharmacy" => Self::Pharmacy,
            "lab" => Self::Lab,
            "provider" => Self::Provider,
            "operational" => Self::Operational,
            "discount" => Self::Discount,
            _ => Self::Additional(key),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Pharmacy => "pharmacy",
            Self::Lab => "lab",
            Self::Provider => "provider",
            Self::Operational => "operational",
            Self::Discount => "discount",
            Self::Additional(key) => key,
        }
    }

    pub fn display_name(&self) -> String {
        display_name_for(self.key())
    }
}

/// Display name for a raw category column name. Unknown names fall back to
/// the column name with its first letter capitalized and underscores as spaces.
pub fn display_name_for(category: &str) -> String {
    let trimmed = category.trim();
    DISPLAY_NAMES
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(trimmed))
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| fallback_display_name(trimmed))
}
