//! Structural validation gate for protocol JSON.
//!
//! The core consumes validation as a yes/no gate with an error list; a
//! failed validation is a terminal, non-indexable result for that file
//! and never affects other files or the index. An external JSON schema
//! may supply the required-field list; otherwise the built-in protocol
//! shape is enforced.

use std::path::Path;

use serde_json::Value;

/// Top-level fields every protocol must carry.
const REQUIRED_FIELDS: [&str; 8] = [
    "Title",
    "Short Title",
    "Overall Purpose",
    "Why This Matters",
    "When To Use This Protocol",
    "Overall Outcomes",
    "Themes",
    "Completion Prompts",
];

/// Fields of a single outcome level.
const OUTCOME_FIELDS: [&str; 7] = [
    "Present pattern",
    "Immediate cost",
    "30-90 day system effect",
    "Signals",
    "Edge condition",
    "Example moves",
    "Future effect",
];

const OUTCOME_LEVELS: [&str; 4] = ["Poor", "Expected", "Excellent", "Transcendent"];

/// Metadata fields that accept a single string in place of an array.
const METADATA_ARRAY_FIELDS: [&str; 8] = [
    "Modes",
    "Tone Markers",
    "Primary Scenarios",
    "Related Protocols",
    "Tags",
    "Stones",
    "Fields",
    "Bridges",
];

/// Validates protocol JSON against the expected structure.
///
/// When `schema_path` is given, the schema's top-level `required` array
/// replaces the built-in required-field list; structural checks below the
/// top level are always the built-in ones.
///
/// Returns `(is_valid, error_messages)`.
#[must_use]
pub fn validate_protocol_value(value: &Value, schema_path: Option<&Path>) -> (bool, Vec<String>) {
    let mut errors = Vec::new();

    let Some(obj) = value.as_object() else {
        return (false, vec!["Expected object, got non-object at root level".to_string()]);
    };

    let required = schema_required(schema_path);
    let missing: Vec<String> = required
        .iter()
        .filter(|f| !obj.contains_key(f.as_str()))
        .map(|f| format!("'{f}'"))
        .collect();
    if !missing.is_empty() {
        errors.push(format!(
            "Missing required fields {} at root level",
            missing.join(", ")
        ));
    }

    for field in [
        "Title",
        "Short Title",
        "Overall Purpose",
        "Why This Matters",
        "When To Use This Protocol",
    ] {
        if let Some(v) = obj.get(field) {
            if !v.is_string() {
                errors.push(type_error("string", v, field));
            } else if v.as_str().is_some_and(|s| s.trim().is_empty()) {
                errors.push(format!("String too short (minimum 1 characters) at '{field}'"));
            }
        }
    }

    if let Some(outcomes) = obj.get("Overall Outcomes") {
        if let Some(outcomes) = outcomes.as_object() {
            for level in OUTCOME_LEVELS {
                if !outcomes.contains_key(level) {
                    errors.push(format!(
                        "Missing required fields '{level}' at 'Overall Outcomes'"
                    ));
                }
            }
        } else {
            errors.push(type_error("object", outcomes, "Overall Outcomes"));
        }
    }

    if let Some(themes) = obj.get("Themes") {
        if let Some(themes) = themes.as_array() {
            if themes.is_empty() {
                errors.push("Array too short (minimum 1 items) at 'Themes'".to_string());
            }
            for (i, theme) in themes.iter().enumerate() {
                validate_theme(theme, i, &mut errors);
            }
        } else {
            errors.push(type_error("array", themes, "Themes"));
        }
    }

    if let Some(prompts) = obj.get("Completion Prompts") {
        if !prompts.is_array() && !prompts.is_string() {
            errors.push(type_error("array", prompts, "Completion Prompts"));
        }
    }

    (errors.is_empty(), errors)
}

fn validate_theme(theme: &Value, idx: usize, errors: &mut Vec<String>) {
    let location = format!("Themes -> {idx}");
    let Some(obj) = theme.as_object() else {
        errors.push(format!("Expected object, got {} at '{location}'", type_name(theme)));
        return;
    };

    for field in ["Name", "Purpose of This Theme", "Why This Matters"] {
        match obj.get(field) {
            None => errors.push(format!("Missing required fields '{field}' at '{location}'")),
            Some(v) if !v.is_string() => {
                errors.push(format!(
                    "Expected string, got {} at '{location} -> {field}'",
                    type_name(v)
                ));
            }
            Some(_) => {}
        }
    }

    match obj.get("Outcomes") {
        None => errors.push(format!("Missing required fields 'Outcomes' at '{location}'")),
        Some(outcomes) => {
            if let Some(outcomes) = outcomes.as_object() {
                for level in OUTCOME_LEVELS {
                    match outcomes.get(level) {
                        None => errors.push(format!(
                            "Missing required fields '{level}' at '{location} -> Outcomes'"
                        )),
                        Some(level_value) => {
                            if let Some(level_obj) = level_value.as_object() {
                                for field in OUTCOME_FIELDS {
                                    if !level_obj.contains_key(field) {
                                        errors.push(format!(
                                            "Missing required fields '{field}' at '{location} -> Outcomes -> {level}'"
                                        ));
                                    }
                                }
                            } else {
                                errors.push(format!(
                                    "Expected object, got {} at '{location} -> Outcomes -> {level}'",
                                    type_name(level_value)
                                ));
                            }
                        }
                    }
                }
            } else {
                errors.push(format!(
                    "Expected object, got {} at '{location} -> Outcomes'",
                    type_name(outcomes)
                ));
            }
        }
    }
}

/// Normalises common authoring variations in place of strict rejection:
/// single strings become one-element arrays for completion prompts,
/// guiding questions, and the metadata array fields.
#[must_use]
pub fn normalize_protocol_value(value: Value) -> Value {
    let Value::Object(mut obj) = value else {
        return value;
    };

    if let Some(prompts) = obj.get_mut("Completion Prompts") {
        promote_to_array(prompts);
    }

    if let Some(Value::Array(themes)) = obj.get_mut("Themes") {
        for theme in themes.iter_mut() {
            if let Some(questions) = theme.get_mut("Guiding Questions") {
                promote_to_array(questions);
            }
        }
    }

    if let Some(Value::Object(metadata)) = obj.get_mut("Metadata") {
        for field in METADATA_ARRAY_FIELDS {
            if let Some(v) = metadata.get_mut(field) {
                promote_to_array(v);
            }
        }
    }

    Value::Object(obj)
}

fn promote_to_array(value: &mut Value) {
    if value.is_string() {
        let s = value.take();
        *value = Value::Array(vec![s]);
    }
}

fn schema_required(schema_path: Option<&Path>) -> Vec<String> {
    let built_in = || REQUIRED_FIELDS.iter().map(ToString::to_string).collect();
    let Some(path) = schema_path else {
        return built_in();
    };
    let Ok(raw) = std::fs::read_to_string(path) else {
        tracing::warn!(path = %path.display(), "schema not readable, using built-in required fields");
        return built_in();
    };
    match serde_json::from_str::<Value>(&raw) {
        Ok(schema) => schema
            .get("required")
            .and_then(Value::as_array)
            .map_or_else(built_in, |req| {
                req.iter()
                    .filter_map(Value::as_str)
                    .map(ToString::to_string)
                    .collect()
            }),
        Err(err) => {
            tracing::warn!(%err, "schema not parseable, using built-in required fields");
            built_in()
        }
    }
}

fn type_error(expected: &str, actual: &Value, location: &str) -> String {
    format!(
        "Expected {expected}, got {} at '{location}'",
        type_name(actual)
    )
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
