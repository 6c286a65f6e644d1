use cf_compiler::DialogDefinition;
use cf_core::{FlowError, FlowResult, HandlerTable, Param, Value};
use serde::Deserialize;
use serde_json::Map;

pub const DIALOG_FILE_SUFFIX: &str = ".dialog.json";

/// On-disk form of a dialog. Handlers cannot be written in JSON, so `exec`
/// names resolve against a table supplied by the host.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct DialogFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    on_start: Option<Value>,
    #[serde(default)]
    on_default: Option<Value>,
    #[serde(default)]
    intents: Map<String, Value>,
    #[serde(default)]
    flows: Map<String, Value>,
}

/// Parses one dialog source. Without a `name`, the file name minus
/// `.dialog.json` names the dialog.
pub fn dialog_definition_from_json(
    path: &str,
    source: &str,
    handlers: &HandlerTable,
) -> FlowResult<DialogDefinition> {
    let file: DialogFile = serde_json::from_str(source).map_err(|error| {
        FlowError::new(
            "API_DIALOG_JSON_INVALID",
            format!("Failed to parse dialog \"{}\": {}", path, error),
        )
    })?;

    let name = match file.name {
        Some(name) => name,
        None => default_dialog_name(path).ok_or_else(|| {
            FlowError::new(
                "API_DIALOG_NAME_MISSING",
                format!(
                    "Dialog \"{}\" has no name and its file name does not end with {}.",
                    path, DIALOG_FILE_SUFFIX
                ),
            )
        })?,
    };
    if name.trim().is_empty() || name.contains(':') {
        return Err(FlowError::new(
            "API_DIALOG_NAME_INVALID",
            format!("Dialog name {:?} in \"{}\" is invalid.", name, path),
        ));
    }

    let mut definition = DialogDefinition::new(name);
    definition.on_start = file.on_start.map(Param::from);
    definition.on_default = file.on_default.map(Param::from);
    definition.intents = into_params(file.intents);
    definition.flows = into_params(file.flows);
    definition.handlers = handlers.clone();
    Ok(definition)
}

fn into_params(entries: Map<String, Value>) -> Vec<(String, Param)> {
    entries
        .into_iter()
        .map(|(name, flow)| (name, Param::from(flow)))
        .collect()
}

fn default_dialog_name(path: &str) -> Option<String> {
    let file_name = path.rsplit(['/', '\\']).next()?;
    file_name
        .strip_suffix(DIALOG_FILE_SUFFIX)
        .filter(|name| !name.is_empty())
        .map(ToString::to_string)
}
