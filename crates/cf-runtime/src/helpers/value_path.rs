use cf_core::{split_dotted_path, Value, Vars};

pub(crate) fn parse_ref_path(path: &str) -> Vec<String> {
    split_dotted_path(path)
        .into_iter()
        .map(ToString::to_string)
        .collect()
}

/// Writes `value` at `path` below `target`, creating missing intermediate
/// objects. Fails when an intermediate value is not an object.
pub(crate) fn assign_nested_path(
    target: &mut Value,
    path: &[String],
    value: Value,
) -> Result<(), String> {
    let Some((head, rest)) = path.split_first() else {
        *target = value;
        return Ok(());
    };

    if target.is_null() {
        *target = Value::Object(Vars::new());
    }
    let Value::Object(entries) = target else {
        return Err(format!("\"{}\" is not inside an object", head));
    };

    if rest.is_empty() {
        entries.insert(head.clone(), value);
        return Ok(());
    }
    let next = entries.entry(head.clone()).or_insert(Value::Null);
    assign_nested_path(next, rest, value)
}
