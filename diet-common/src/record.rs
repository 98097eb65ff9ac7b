//! Canonical recipe record
//!
//! A [`CanonicalRecord`] is an ordered map from lower-cased, trimmed field name to a
//! JSON scalar (string or number). Field order follows the source header.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;

/// Canonical label of the diet category column
pub const DIET_TYPE: &str = "diet_type";
/// Canonical label of the recipe name column
pub const RECIPE_NAME: &str = "recipe_name";
/// Canonical label of the cuisine column
pub const CUISINE_TYPE: &str = "cuisine_type";
/// Canonical label of the protein column (grams)
pub const PROTEIN_G: &str = "protein(g)";
/// Canonical label of the carbohydrate column (grams)
pub const CARBS_G: &str = "carbs(g)";
/// Canonical label of the fat column (grams)
pub const FAT_G: &str = "fat(g)";

/// One normalized recipe row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalRecord(Map<String, Value>);

impl CanonicalRecord {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build a record from `(field, value)` pairs, keeping their order
    pub fn from_fields<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// String form of a field as used for matching and CSV output.
    ///
    /// Strings are returned verbatim (no JSON quoting), numbers in their JSON form.
    pub fn text(&self, field: &str) -> Option<Cow<'_, str>> {
        self.0.get(field).map(value_text)
    }

    pub fn diet_type(&self) -> Option<&str> {
        self.0.get(DIET_TYPE).and_then(Value::as_str)
    }

    pub fn recipe_name(&self) -> Option<&str> {
        self.0.get(RECIPE_NAME).and_then(Value::as_str)
    }

    pub fn cuisine_type(&self) -> Option<&str> {
        self.0.get(CUISINE_TYPE).and_then(Value::as_str)
    }

    pub fn protein_g(&self) -> Option<f64> {
        self.0.get(PROTEIN_G).and_then(Value::as_f64)
    }

    pub fn carbs_g(&self) -> Option<f64> {
        self.0.get(CARBS_G).and_then(Value::as_f64)
    }

    pub fn fat_g(&self) -> Option<f64> {
        self.0.get(FAT_G).and_then(Value::as_f64)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for CanonicalRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// String form of a scalar JSON value
pub fn value_text(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        Value::Null => Cow::Borrowed(""),
        other => Cow::Owned(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> CanonicalRecord {
        CanonicalRecord::from_fields([
            (DIET_TYPE, json!("paleo")),
            (RECIPE_NAME, json!("Bone Broth")),
            (CUISINE_TYPE, json!("american")),
            (PROTEIN_G, json!(12.5)),
            (CARBS_G, json!(3)),
            (FAT_G, json!(7.25)),
        ])
    }

    #[test]
    fn test_typed_accessors() {
        let r = sample();
        assert_eq!(r.diet_type(), Some("paleo"));
        assert_eq!(r.recipe_name(), Some("Bone Broth"));
        assert_eq!(r.cuisine_type(), Some("american"));
        assert_eq!(r.protein_g(), Some(12.5));
        assert_eq!(r.carbs_g(), Some(3.0));
        assert_eq!(r.fat_g(), Some(7.25));
    }

    #[test]
    fn test_field_order_follows_insertion() {
        let r = sample();
        let names: Vec<&str> = r.field_names().collect();
        assert_eq!(
            names,
            vec![DIET_TYPE, RECIPE_NAME, CUISINE_TYPE, PROTEIN_G, CARBS_G, FAT_G]
        );
    }

    #[test]
    fn test_text_form() {
        let r = sample();
        assert_eq!(r.text(RECIPE_NAME).as_deref(), Some("Bone Broth"));
        assert_eq!(r.text(PROTEIN_G).as_deref(), Some("12.5"));
        assert_eq!(r.text(CARBS_G).as_deref(), Some("3"));
        assert!(r.text("missing").is_none());
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let r = CanonicalRecord::from_fields([(DIET_TYPE, json!("vegan"))]);
        assert_eq!(serde_json::to_string(&r).unwrap(), r#"{"diet_type":"vegan"}"#);
    }
}
