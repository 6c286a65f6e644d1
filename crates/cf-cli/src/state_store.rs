use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use cf_core::FlowError;

use crate::{AgentState, CliStage, AGENT_STATE_SCHEMA};

/// Writes the state the next `agent` call resumes from. Only a conversation
/// that is still waiting has a dialog stack worth saving.
pub(crate) fn save_agent_state(path: &Path, state: &AgentState) -> Result<(), FlowError> {
    ensure_waiting(state, path)?;

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|error| CliStage::StateWrite.fail_at(parent, error))?;
    }

    let mut encoded = serde_json::to_string_pretty(state)
        .map_err(|error| CliStage::StateWrite.fail_at(path, error))?;
    encoded.push('\n');
    fs::write(path, encoded).map_err(|error| CliStage::StateWrite.fail_at(path, error))
}

pub(crate) fn load_agent_state(path: &Path) -> Result<AgentState, FlowError> {
    let raw = fs::read_to_string(path).map_err(|error| match error.kind() {
        ErrorKind::NotFound => FlowError::new(
            "CLI_STATE_NOT_FOUND",
            format!("State file does not exist: {}", path.display()),
        ),
        _ => CliStage::StateRead.fail_at(path, error),
    })?;

    let state: AgentState = serde_json::from_str(&raw)
        .map_err(|error| CliStage::StateDecode.fail_at(path, error))?;

    if state.schema_version != AGENT_STATE_SCHEMA {
        return Err(FlowError::new(
            "CLI_STATE_SCHEMA",
            format!(
                "State file {} has schema {:?}; this agent reads {:?}.",
                path.display(),
                state.schema_version,
                AGENT_STATE_SCHEMA
            ),
        ));
    }
    ensure_waiting(&state, path)?;
    Ok(state)
}

fn ensure_waiting(state: &AgentState, path: &Path) -> Result<(), FlowError> {
    if state.snapshot.stack.is_empty() {
        return Err(FlowError::new(
            "CLI_STATE_ENDED",
            format!(
                "Session {:?} in {} has no active dialog; start a new conversation.",
                state.snapshot.id,
                path.display()
            ),
        ));
    }
    Ok(())
}
