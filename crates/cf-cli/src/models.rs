use std::collections::BTreeMap;

use cf_core::{SessionSnapshot, Value};
use serde::{Deserialize, Serialize};

pub(crate) const AGENT_STATE_SCHEMA: &str = "convoflow-state.v1";

#[derive(Debug, Clone)]
pub(crate) struct LoadedProject {
    pub(crate) id: String,
    pub(crate) dialogs_json: BTreeMap<String, String>,
    pub(crate) entry_dialog: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AgentState {
    pub(crate) schema_version: String,
    pub(crate) project_id: String,
    pub(crate) entry_dialog: String,
    pub(crate) snapshot: SessionSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BoundaryEvent {
    Waiting,
    End,
}

#[derive(Debug, Clone)]
pub(crate) struct BoundaryResult {
    pub(crate) event: BoundaryEvent,
    pub(crate) messages: Vec<Value>,
}
