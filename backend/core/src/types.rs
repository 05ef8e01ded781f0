use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One user-defined question asked of the model per image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct DataField {
    pub id: Uuid,
    pub name: String,
    pub prompt: String,
}

impl DataField {
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            prompt: prompt.into(),
        }
    }

    /// Parse a `name=prompt` pair as typed on the command line.
    pub fn parse_pair(pair: &str) -> Option<Self> {
        let (name, prompt) = pair.split_once('=')?;
        let (name, prompt) = (name.trim(), prompt.trim());
        if name.is_empty() || prompt.is_empty() {
            return None;
        }
        Some(Self::new(name, prompt))
    }
}

/// The JSON record produced for one image.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ExtractionResult {
    pub image_name: String,
    pub extracted_data: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
    pub data_fields: Vec<DataField>,
}

impl ExtractionResult {
    /// Pretty-printed JSON. One-way: results are never read back.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// A named, reusable list of fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub name: String,
    pub fields: Vec<DataField>,
}

impl Template {
    pub fn new(name: impl Into<String>, fields: Vec<DataField>) -> Self {
        Self { name: name.into(), fields }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_field_pair() {
        let field = DataField::parse_pair("Total = What is the total amount?").unwrap();
        assert_eq!(field.name, "Total");
        assert_eq!(field.prompt, "What is the total amount?");
        assert!(DataField::parse_pair("Total").is_none());
        assert!(DataField::parse_pair("=prompt").is_none());
    }

    #[test]
    fn result_serializes_with_pascal_case_keys() {
        let field = DataField::new("Total", "What is the total amount?");
        let mut data = BTreeMap::new();
        data.insert("Total".to_string(), "$42.00".to_string());
        let result = ExtractionResult {
            image_name: "receipt.jpg".into(),
            extracted_data: data,
            timestamp: "2026-03-01T12:00:00Z".parse().unwrap(),
            data_fields: vec![field.clone()],
        };

        let json = result.to_json().unwrap();
        assert!(json.contains('\n'), "output should be pretty-printed");

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["ImageName"], "receipt.jpg");
        assert_eq!(value["ExtractedData"]["Total"], "$42.00");
        assert_eq!(value["Timestamp"], "2026-03-01T12:00:00Z");
        assert_eq!(value["DataFields"][0]["Id"], field.id.to_string());
        assert_eq!(value["DataFields"][0]["Name"], "Total");
        assert_eq!(value["DataFields"][0]["Prompt"], "What is the total amount?");
    }
}
