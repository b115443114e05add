//! The extraction schema and typed validation of backend payloads.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{StructurerError, StructurerResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub heading: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDataPoint {
    pub label: String,
    pub value: String,
}

/// A payload that passed every required-field check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredResult {
    pub title: String,
    pub summary: String,
    pub sections: Vec<Section>,
    pub key_data_points: Vec<KeyDataPoint>,
}

/// Fixed descriptor of the required output shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionSchema {
    version: u32,
}

impl Default for ExtractionSchema {
    fn default() -> Self {
        Self::v1()
    }
}

impl ExtractionSchema {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn v1() -> Self {
        Self { version: Self::CURRENT_VERSION }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Response schema in the form the generation API accepts
    pub fn response_schema(&self) -> Value {
        let pair = |a: &str, b: &str| {
            let mut properties = Map::new();
            properties.insert(a.to_string(), json!({"type": "STRING"}));
            properties.insert(b.to_string(), json!({"type": "STRING"}));
            json!({
                "type": "OBJECT",
                "properties": properties,
                "required": [a, b]
            })
        };

        json!({
            "type": "OBJECT",
            "properties": {
                "title": {"type": "STRING"},
                "summary": {"type": "STRING"},
                "sections": {"type": "ARRAY", "items": pair("heading", "content")},
                "key_data_points": {"type": "ARRAY", "items": pair("label", "value")}
            },
            "required": ["title", "summary", "sections", "key_data_points"]
        })
    }

    /// Plain description embedded in prompts for the fenced-payload convention
    pub fn describe(&self) -> String {
        format!(
            "Schema v{}: a JSON object with exactly these fields, all required:\n\
             - \"title\": string\n\
             - \"summary\": string\n\
             - \"sections\": array of objects {{\"heading\": string, \"content\": string}} (may be empty)\n\
             - \"key_data_points\": array of objects {{\"label\": string, \"value\": string}} (may be empty)",
            self.version
        )
    }

    /// Parse raw backend text as JSON and validate it
    pub fn parse(&self, payload: &str, raw: &str) -> StructurerResult<StructuredResult> {
        let value: Value = serde_json::from_str(payload.trim()).map_err(|e| {
            StructurerError::extraction_format(format!("payload is not valid JSON: {}", e), raw)
        })?;
        self.validate(&value, raw)
    }

    /// Whole-result check; the first violation rejects everything
    pub fn validate(&self, value: &Value, raw: &str) -> StructurerResult<StructuredResult> {
        let reject = |field: &str, reason: &str| StructurerError::schema_validation(field, reason, raw);

        let root = value
            .as_object()
            .ok_or_else(|| reject("$", "expected a JSON object"))?;

        let title = required_string(root, "title", "title").map_err(|(f, r)| reject(&f, r))?;
        let summary = required_string(root, "summary", "summary").map_err(|(f, r)| reject(&f, r))?;

        let sections = required_array(root, "sections")
            .map_err(|(f, r)| reject(&f, r))?
            .iter()
            .enumerate()
            .map(|(i, item)| -> Result<Section, (String, &'static str)> {
                let path = format!("sections[{}]", i);
                let object = item.as_object().ok_or((path.clone(), "expected an object"))?;
                Ok(Section {
                    heading: required_string(object, "heading", &path)?,
                    content: required_string(object, "content", &path)?,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|(f, r)| reject(&f, r))?;

        let key_data_points = required_array(root, "key_data_points")
            .map_err(|(f, r)| reject(&f, r))?
            .iter()
            .enumerate()
            .map(|(i, item)| -> Result<KeyDataPoint, (String, &'static str)> {
                let path = format!("key_data_points[{}]", i);
                let object = item.as_object().ok_or((path.clone(), "expected an object"))?;
                Ok(KeyDataPoint {
                    label: required_string(object, "label", &path)?,
                    value: required_string(object, "value", &path)?,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|(f, r)| reject(&f, r))?;

        Ok(StructuredResult {
            title,
            summary,
            sections,
            key_data_points,
        })
    }
}

fn field_path(parent: &str, key: &str) -> String {
    if parent == key {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

fn required_string(
    object: &Map<String, Value>,
    key: &str,
    parent: &str,
) -> Result<String, (String, &'static str)> {
    match object.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Null) | None => Err((field_path(parent, key), "required field is missing")),
        Some(_) => Err((field_path(parent, key), "expected a string")),
    }
}

fn required_array<'a>(
    object: &'a Map<String, Value>,
    key: &str,
) -> Result<&'a Vec<Value>, (String, &'static str)> {
    match object.get(key) {
        Some(Value::Array(items)) => Ok(items),
        Some(Value::Null) | None => Err((key.to_string(), "required field is missing")),
        Some(_) => Err((key.to_string(), "expected an array")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Value {
        json!({
            "title": "Quarterly Revenue",
            "summary": "Revenue grew each quarter.",
            "sections": [{"heading": "Q1", "content": "Rose 10%."}],
            "key_data_points": [{"label": "Q1 growth", "value": "10%"}],
            "confidence": 0.9
        })
    }

    #[test]
    fn test_valid_payload_accepted() {
        let result = ExtractionSchema::v1().validate(&valid(), "raw").unwrap();
        assert_eq!(result.title, "Quarterly Revenue");
        assert_eq!(result.sections.len(), 1);
        assert_eq!(result.key_data_points[0].value, "10%");
    }

    #[test]
    fn test_empty_sequences_permitted() {
        let payload = json!({"title": "t", "summary": "s", "sections": [], "key_data_points": []});
        let result = ExtractionSchema::v1().validate(&payload, "").unwrap();
        assert!(result.sections.is_empty());
        assert!(result.key_data_points.is_empty());
    }

    #[test]
    fn test_missing_section_content_names_the_field() {
        let mut payload = valid();
        payload["sections"] = json!([{"heading": "Q1", "content": "ok"}, {"heading": "Q2"}]);
        let err = ExtractionSchema::v1().validate(&payload, "the raw text").unwrap_err();
        match err {
            StructurerError::SchemaValidation { field, raw, .. } => {
                assert_eq!(field, "sections[1].content");
                assert_eq!(raw, "the raw text");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_top_level_field() {
        for key in ["title", "summary", "sections", "key_data_points"] {
            let mut payload = valid();
            payload.as_object_mut().unwrap().remove(key);
            let err = ExtractionSchema::v1().validate(&payload, "").unwrap_err();
            assert!(
                matches!(err, StructurerError::SchemaValidation { ref field, .. } if field == key),
                "{key}: {err:?}"
            );
        }
    }

    #[test]
    fn test_wrong_types_not_coerced() {
        let mut payload = valid();
        payload["key_data_points"] = json!([{"label": "Q1 growth", "value": 10}]);
        let err = ExtractionSchema::v1().validate(&payload, "").unwrap_err();
        assert!(err.to_string().contains("key_data_points[0].value"));

        let err = ExtractionSchema::v1().validate(&json!(["not", "an", "object"]), "").unwrap_err();
        assert!(matches!(err, StructurerError::SchemaValidation { ref field, .. } if field == "$"));
    }

    #[test]
    fn test_parse_rejects_invalid_json_as_format_error() {
        let err = ExtractionSchema::v1().parse("{\"title\": ", "{\"title\": ").unwrap_err();
        assert!(matches!(err, StructurerError::ExtractionFormat { .. }));
    }

    #[test]
    fn test_response_schema_shape() {
        let schema = ExtractionSchema::v1().response_schema();
        assert_eq!(schema["required"].as_array().unwrap().len(), 4);
        assert_eq!(schema["properties"]["sections"]["items"]["required"], json!(["heading", "content"]));
        assert!(ExtractionSchema::v1().describe().contains("key_data_points"));
    }
}
