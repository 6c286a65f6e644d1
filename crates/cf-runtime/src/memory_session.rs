use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use cf_core::{FlowError, FlowResult, Session, SessionSnapshot, Value, Vars};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::helpers::value_path::{assign_nested_path, parse_ref_path};

/// The stack effect a handler asked for. At most one per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SessionEffect {
    Start {
        dialog: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tag: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        locals: Option<Vars>,
    },
    Finish {
        result: Value,
    },
}

/// Everything one request produced, taken from the session when it is done.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionOutcome {
    pub globals: Vars,
    pub locals: Vars,
    pub messages: Vec<Value>,
    pub effect: Option<SessionEffect>,
    pub saves: usize,
}

#[derive(Debug, Default)]
struct MemoryState {
    globals: Vars,
    locals: Vars,
    volatiles: Vars,
    messages: Vec<Value>,
    effect: Option<SessionEffect>,
    saves: usize,
    locked: bool,
}

/// In-process [`Session`] for one request: captures sent messages and the
/// stack effect instead of talking to a remote state service.
#[derive(Debug)]
pub struct MemorySession {
    id: String,
    state: Mutex<MemoryState>,
}

impl MemorySession {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Session view of a snapshot: its globals and the top frame's locals.
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Self {
        let session = Self::new(snapshot.id.clone());
        {
            let mut state = session.state();
            state.globals = snapshot.globals.clone();
            state.locals = snapshot
                .top()
                .map(|frame| frame.locals.clone())
                .unwrap_or_default();
        }
        session
    }

    pub fn with_globals(self, globals: Vars) -> Self {
        self.state().globals = globals;
        self
    }

    pub fn with_locals(self, locals: Vars) -> Self {
        self.state().locals = locals;
        self
    }

    /// Request-scoped vars, such as the text of the inbound message.
    pub fn with_volatiles(self, volatiles: Vars) -> Self {
        self.state().volatiles = volatiles;
        self
    }

    pub fn messages(&self) -> Vec<Value> {
        self.state().messages.clone()
    }

    pub fn effect(&self) -> Option<SessionEffect> {
        self.state().effect.clone()
    }

    pub fn is_locked(&self) -> bool {
        self.state().locked
    }

    pub fn outcome(&self) -> SessionOutcome {
        let state = self.state();
        SessionOutcome {
            globals: state.globals.clone(),
            locals: state.locals.clone(),
            messages: state.messages.clone(),
            effect: state.effect.clone(),
            saves: state.saves,
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn unlocked(&self) -> FlowResult<MutexGuard<'_, MemoryState>> {
        let state = self.state();
        if state.locked {
            return Err(FlowError::new(
                "SESSION_LOCKED",
                format!(
                    "Session {:?} is locked: a start or finish effect was already issued.",
                    self.id
                ),
            ));
        }
        Ok(state)
    }
}

impl MemoryState {
    /// Existing globals are updated in place; every other name is local.
    fn write(&mut self, name: &str, value: Value) -> FlowResult<()> {
        let parts = parse_ref_path(name);
        let Some((head, rest)) = parts.split_first() else {
            return Err(FlowError::new(
                "SESSION_SET_PATH",
                format!("Invalid var name {:?}.", name),
            ));
        };

        let scope = if self.globals.contains_key(head) {
            &mut self.globals
        } else {
            &mut self.locals
        };
        let target = scope.entry(head.clone()).or_insert(Value::Null);
        assign_nested_path(target, rest, value).map_err(|message| {
            FlowError::new(
                "SESSION_SET_PATH",
                format!("Cannot write var path {:?}: {}", name, message),
            )
        })
    }
}

#[async_trait]
impl Session for MemorySession {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn globals(&self) -> Vars {
        self.state().globals.clone()
    }

    fn locals(&self) -> Vars {
        self.state().locals.clone()
    }

    fn volatiles(&self) -> Vars {
        self.state().volatiles.clone()
    }

    async fn set(&self, values: Vars) -> FlowResult<()> {
        let mut state = self.unlocked()?;
        for (name, value) in values {
            trace!(session = %self.id, name = %name, "set var");
            state.write(&name, value)?;
        }
        Ok(())
    }

    async fn save(&self, values: Option<Vars>) -> FlowResult<()> {
        let mut state = self.unlocked()?;
        for (name, value) in values.unwrap_or_default() {
            state.write(&name, value)?;
        }
        state.saves += 1;
        Ok(())
    }

    async fn send(&self, message: Value) -> FlowResult<()> {
        let mut state = self.unlocked()?;
        trace!(session = %self.id, "send message");
        state.messages.push(message);
        Ok(())
    }

    async fn start(&self, dialog: &str, tag: Option<&str>, locals: Option<Vars>) -> FlowResult<()> {
        let mut state = self.unlocked()?;
        state.effect = Some(SessionEffect::Start {
            dialog: dialog.to_string(),
            tag: tag.map(ToString::to_string),
            locals,
        });
        state.locked = true;
        Ok(())
    }

    async fn finish(&self, result: Value) -> FlowResult<()> {
        let mut state = self.unlocked()?;
        state.effect = Some(SessionEffect::Finish { result });
        state.locked = true;
        Ok(())
    }
}
