//! Defensive parsing of raw extraction output.
//!
//! The text-generation service is asked for one JSON object but may wrap it
//! in prose or code fences. Strategy: attempt a direct parse; on failure,
//! salvage the first balanced top-level `{...}` substring and parse that;
//! if both fail, return an empty map.

use serde_json::Value;
use tracing::debug;

use intake_core::FieldMap;

/// Parse raw engine output into a field map. Never fails: unparsable input
/// yields an empty map.
pub fn parse_field_map(raw: &str) -> FieldMap {
    if let Some(map) = try_parse_object(raw) {
        return map;
    }
    if let Some(candidate) = salvage_object(raw) {
        if let Some(map) = try_parse_object(candidate) {
            return map;
        }
    }
    debug!("Extraction output unparsable; treating as no new fields");
    FieldMap::new()
}

fn try_parse_object(text: &str) -> Option<FieldMap> {
    let value: Value = serde_json::from_str(text.trim()).ok()?;
    let object = value.as_object()?;

    let mut map = FieldMap::new();
    for (key, value) in object {
        let text = coerce_value(value);
        // A null or empty value from the engine means "not known", which is
        // expressed as key absence, never as a known-empty entry.
        if !text.is_empty() {
            map.insert(key.clone(), text);
        }
    }
    Some(map)
}

/// Coerce a JSON value to the textual form used everywhere downstream.
pub fn coerce_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "yes".to_string(),
        Value::Bool(false) => "no".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        // Composite values get a stable textual serialization.
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Extract the first balanced top-level `{...}` substring, respecting
/// string literals and escapes.
fn salvage_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let bytes = raw.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_object() {
        let map = parse_field_map(r#"{"diabetes": "yes", "medications": "metformin"}"#);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("diabetes").unwrap(), "yes");
        assert_eq!(map.get("medications").unwrap(), "metformin");
    }

    #[test]
    fn test_code_fenced_object() {
        let raw = "```json\n{\"phone\": \"555-0101\"}\n```";
        let map = parse_field_map(raw);
        assert_eq!(map.get("phone").unwrap(), "555-0101");
    }

    #[test]
    fn test_prose_wrapped_object() {
        let raw = "Here is what I extracted: {\"smoking\": \"no\"} hope that helps!";
        let map = parse_field_map(raw);
        assert_eq!(map.get("smoking").unwrap(), "no");
    }

    #[test]
    fn test_unparsable_yields_empty() {
        assert!(parse_field_map("I could not find anything.").is_empty());
        assert!(parse_field_map("").is_empty());
        assert!(parse_field_map("{broken").is_empty());
        assert!(parse_field_map("[1, 2, 3]").is_empty());
    }

    #[test]
    fn test_null_and_empty_values_dropped() {
        let map = parse_field_map(r#"{"diabetes": null, "phone": "", "smoking": "no"}"#);
        assert_eq!(map.len(), 1);
        assert!(!map.contains_key("diabetes"));
        assert!(!map.contains_key("phone"));
    }

    #[test]
    fn test_boolean_coercion() {
        let map = parse_field_map(r#"{"diabetes": true, "hypertension": false}"#);
        assert_eq!(map.get("diabetes").unwrap(), "yes");
        assert_eq!(map.get("hypertension").unwrap(), "no");
    }

    #[test]
    fn test_number_coercion() {
        let map = parse_field_map(r#"{"current_weight_kg": 104.5, "height_cm": 170}"#);
        assert_eq!(map.get("current_weight_kg").unwrap(), "104.5");
        assert_eq!(map.get("height_cm").unwrap(), "170");
    }

    #[test]
    fn test_array_serialized() {
        let map = parse_field_map(r#"{"current_medications": ["metformin", "aspirin"]}"#);
        assert_eq!(
            map.get("current_medications").unwrap(),
            r#"["metformin","aspirin"]"#
        );
    }

    #[test]
    fn test_nested_object_serialized() {
        let map = parse_field_map(r#"{"weight_changes": {"2020": 120, "2024": 104}}"#);
        assert_eq!(
            map.get("weight_changes").unwrap(),
            r#"{"2020":120,"2024":104}"#
        );
    }

    #[test]
    fn test_salvage_respects_braces_in_strings() {
        let raw = r#"Note: {"motivation": "wants {better} health"} end"#;
        let map = parse_field_map(raw);
        assert_eq!(map.get("motivation").unwrap(), "wants {better} health");
    }

    #[test]
    fn test_salvage_takes_first_object() {
        let raw = r#"{"smoking": "no"} and also {"alcohol": "yes"}"#;
        let map = parse_field_map(raw);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("smoking").unwrap(), "no");
    }

    #[test]
    fn test_string_values_trimmed() {
        let map = parse_field_map(r#"{"first_name": "  Ana  "}"#);
        assert_eq!(map.get("first_name").unwrap(), "Ana");
    }

    #[test]
    fn test_deterministic() {
        let raw = r#"{"b": "2", "a": "1"}"#;
        assert_eq!(parse_field_map(raw), parse_field_map(raw));
    }
}
