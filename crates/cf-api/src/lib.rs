use std::collections::BTreeMap;

use cf_compiler::DialogDefinition;
use cf_core::{FlowError, FlowResult, HandlerTable};

mod app;
mod definition;
mod dialog;
mod event;

pub use app::{FlowApp, FlowTurn};
pub use definition::{dialog_definition_from_json, DIALOG_FILE_SUFFIX};
pub use dialog::FlowDialog;
pub use event::FlowEvent;

pub const DEFAULT_ENTRY_DIALOG: &str = "main";

/// Parses every `*.dialog.json` source, keyed by its path.
pub fn dialog_definitions_from_json_map(
    json_by_path: &BTreeMap<String, String>,
    handlers: &HandlerTable,
) -> FlowResult<Vec<DialogDefinition>> {
    json_by_path
        .iter()
        .map(|(path, source)| dialog_definition_from_json(path, source, handlers))
        .collect()
}

pub fn compile_dialogs(definitions: Vec<DialogDefinition>) -> FlowResult<Vec<FlowDialog>> {
    definitions.into_iter().map(FlowDialog::new).collect()
}

pub fn create_app_from_json_map(
    json_by_path: &BTreeMap<String, String>,
    entry_dialog: Option<String>,
    handlers: &HandlerTable,
) -> FlowResult<FlowApp> {
    let dialogs = compile_dialogs(dialog_definitions_from_json_map(json_by_path, handlers)?)?;
    let entry = resolve_entry_dialog(&dialogs, entry_dialog)?;
    FlowApp::new(dialogs, entry)
}

fn resolve_entry_dialog(dialogs: &[FlowDialog], explicit: Option<String>) -> FlowResult<String> {
    let known = |name: &str| dialogs.iter().any(|dialog| dialog.name() == name);
    if let Some(entry) = explicit {
        if !known(&entry) {
            return Err(FlowError::new(
                "API_ENTRY_DIALOG_NOT_FOUND",
                format!("Entry dialog \"{}\" is not registered.", entry),
            ));
        }
        return Ok(entry);
    }

    if known(DEFAULT_ENTRY_DIALOG) {
        return Ok(DEFAULT_ENTRY_DIALOG.to_string());
    }

    Err(FlowError::new(
        "API_ENTRY_MAIN_NOT_FOUND",
        "Expected a dialog named \"main\" as default entry.",
    ))
}
