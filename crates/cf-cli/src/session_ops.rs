use std::path::Path;

use cf_api::{create_app_from_json_map, FlowApp, FlowTurn};
use cf_core::{FlowError, HandlerTable};

use crate::{
    boundary_from_turn, emit_boundary, save_agent_state, AgentState, LoadedProject,
    AGENT_STATE_SCHEMA,
};

pub(crate) fn create_app_for_project(project: &LoadedProject) -> Result<FlowApp, FlowError> {
    create_app_from_json_map(
        &project.dialogs_json,
        project.entry_dialog.clone(),
        &HandlerTable::new(),
    )
}

/// Saves the next state only while the conversation is still waiting.
pub(crate) fn emit_turn_with_saved_state(
    turn: FlowTurn,
    state_out: &str,
    project_id: &str,
    entry_dialog: &str,
) -> Result<i32, FlowError> {
    let boundary = boundary_from_turn(&turn);
    if turn.ended {
        emit_boundary(boundary, None);
        return Ok(0);
    }

    let state = AgentState {
        schema_version: AGENT_STATE_SCHEMA.to_string(),
        project_id: project_id.to_string(),
        entry_dialog: entry_dialog.to_string(),
        snapshot: turn.snapshot,
    };
    save_agent_state(Path::new(state_out), &state)?;
    emit_boundary(boundary, Some(state_out.to_string()));
    Ok(0)
}
