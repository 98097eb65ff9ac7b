//! Display projection
//!
//! The dashboard reads the original column casing (`Recipe_name`, `Protein(g)`, ...).
//! Renaming happens after filtering and pagination and never touches storage.

use crate::record::CanonicalRecord;
use crate::{Error, Result};
use serde_json::{Map, Value};

/// Canonical → display names for the known recipe columns
pub const DISPLAY_NAMES: &[(&str, &str)] = &[
    ("diet_type", "Diet_type"),
    ("recipe_name", "Recipe_name"),
    ("cuisine_type", "Cuisine_type"),
    ("protein(g)", "Protein(g)"),
    ("carbs(g)", "Carbs(g)"),
    ("fat(g)", "Fat(g)"),
    ("extraction_day", "Extraction_day"),
    ("extraction_time", "Extraction_time"),
];

/// Output shape of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Projection {
    #[default]
    Canonical,
    Display,
}

impl Projection {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "canonical" => Ok(Projection::Canonical),
            "display" => Ok(Projection::Display),
            other => Err(Error::InvalidQuery(format!(
                "projection must be 'canonical' or 'display', got '{}'",
                other
            ))),
        }
    }

    pub fn from_flag(display: bool) -> Self {
        if display {
            Projection::Display
        } else {
            Projection::Canonical
        }
    }

    pub fn apply(&self, record: CanonicalRecord) -> Map<String, Value> {
        match self {
            Projection::Canonical => record.into_map(),
            Projection::Display => record
                .into_map()
                .into_iter()
                .map(|(k, v)| (display_name(&k), v))
                .collect(),
        }
    }
}

/// Display name for a canonical field; unknown fields get their first letter upper-cased
pub fn display_name(field: &str) -> String {
    if let Some((_, display)) = DISPLAY_NAMES.iter().find(|(canonical, _)| *canonical == field) {
        return display.to_string();
    }

    let mut chars = field.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
