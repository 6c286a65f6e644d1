use serde_json::Map;

pub use serde_json::Value;

/// The variable environment a handler sees.
pub type Vars = Map<String, Value>;

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Truthiness used by conditions and loop tests.
///
/// Rendered templates always produce strings, so the textual forms of the
/// falsy scalars count as false as well.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|n| n != 0.0).unwrap_or(false),
        Value::String(text) => !matches!(text.trim(), "" | "false" | "0" | "null"),
        Value::Array(_) | Value::Object(_) => true,
    }
}

pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Builds a JSON number, keeping integral results as integers so that
/// templates render `3` rather than `3.0`.
pub fn number_value(number: f64) -> Value {
    if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
        Value::from(number as i64)
    } else {
        serde_json::Number::from_f64(number)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// Text form used by templates and switch matching. `null` renders empty.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

pub fn split_dotted_path(path: &str) -> Vec<&str> {
    path.split('.')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Resolves `a.b.0.c` against a variable map. Numeric segments index arrays.
pub fn lookup_path<'a>(vars: &'a Vars, path: &str) -> Option<&'a Value> {
    let segments = split_dotted_path(path);
    let (head, rest) = segments.split_first()?;
    let mut current = vars.get(*head)?;
    for segment in rest {
        current = match current {
            Value::Object(entries) => entries.get(*segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Shallow merge in precedence order: later maps win.
pub fn merge_vars<'a>(layers: impl IntoIterator<Item = &'a Vars>) -> Vars {
    let mut merged = Vars::new();
    for layer in layers {
        for (key, value) in layer {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}
