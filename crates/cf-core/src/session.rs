use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FlowResult;
use crate::value::{merge_vars, Value, Vars};

/// Reserved var holding the value a continuation was resumed with.
pub const RESUME_VALUE_KEY: &str = "value";
pub const WILDCARD_DIALOG: &str = "*";

/// Per-request view of the remote conversation state.
///
/// Every mutating call may fail; after `start` or `finish` the session is
/// locked and further mutation raises `SESSION_LOCKED`.
#[async_trait]
pub trait Session: Send + Sync {
    fn id(&self) -> String;
    fn globals(&self) -> Vars;
    fn locals(&self) -> Vars;
    fn volatiles(&self) -> Vars;

    fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.volatiles().get(name) {
            return Some(value.clone());
        }
        if let Some(value) = self.locals().get(name) {
            return Some(value.clone());
        }
        self.globals().get(name).cloned()
    }

    async fn set(&self, values: Vars) -> FlowResult<()>;

    async fn set_value(&self, name: &str, value: Value) -> FlowResult<()> {
        let mut values = Vars::new();
        values.insert(name.to_string(), value);
        self.set(values).await
    }

    async fn save(&self, values: Option<Vars>) -> FlowResult<()>;
    async fn send(&self, message: Value) -> FlowResult<()>;
    async fn start(&self, dialog: &str, tag: Option<&str>, locals: Option<Vars>) -> FlowResult<()>;
    async fn finish(&self, result: Value) -> FlowResult<()>;
}

pub type SessionRef = Arc<dyn Session>;

/// Builds the vars for one handler invocation from the current session state.
pub fn session_vars(session: &dyn Session, value: Option<&Value>) -> Vars {
    let (globals, locals, volatiles) = (session.globals(), session.locals(), session.volatiles());
    let mut vars = merge_vars([&globals, &locals, &volatiles]);
    if let Some(value) = value {
        vars.insert(RESUME_VALUE_KEY.to_string(), value.clone());
    }
    vars
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameSnapshot {
    pub dialog: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default)]
    pub locals: Vars,
}

/// Serialized state carried by every inbound notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: String,
    #[serde(default)]
    pub globals: Vars,
    #[serde(default)]
    pub stack: Vec<FrameSnapshot>,
}

impl SessionSnapshot {
    pub fn new(id: impl Into<String>, dialog: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            globals: Vars::new(),
            stack: vec![FrameSnapshot {
                dialog: dialog.into(),
                tag: None,
                locals: Vars::new(),
            }],
        }
    }

    pub fn top(&self) -> Option<&FrameSnapshot> {
        self.stack.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut FrameSnapshot> {
        self.stack.last_mut()
    }
}
