use std::collections::BTreeMap;
use std::sync::Arc;

use cf_core::{FlowError, FlowResult, FrameSnapshot, SessionRef, SessionSnapshot, Value};
use cf_runtime::{MemorySession, SessionEffect};
use tracing::debug;

use crate::dialog::FlowDialog;
use crate::event::FlowEvent;

/// Upper bound on start/finish hops one inbound event may trigger.
const MAX_EVENT_HOPS: usize = 64;

/// What one inbound event produced.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowTurn {
    pub messages: Vec<Value>,
    pub snapshot: SessionSnapshot,
    /// The last frame finished; nothing is waiting for input.
    pub ended: bool,
}

/// Local driver standing in for the remote state service: keeps the dialog
/// stack in a snapshot and applies the start/finish effects handlers issue.
#[derive(Debug, Clone)]
pub struct FlowApp {
    dialogs: BTreeMap<String, FlowDialog>,
    entry: String,
}

impl FlowApp {
    pub fn new(dialogs: Vec<FlowDialog>, entry: impl Into<String>) -> FlowResult<Self> {
        let mut by_name = BTreeMap::new();
        for dialog in dialogs {
            let name = dialog.name().to_string();
            if by_name.insert(name.clone(), dialog).is_some() {
                return Err(FlowError::new(
                    "API_DIALOG_DUPLICATE",
                    format!("Dialog \"{}\" is defined more than once.", name),
                ));
            }
        }

        let entry = entry.into();
        if !by_name.contains_key(&entry) {
            return Err(FlowError::new(
                "API_ENTRY_DIALOG_NOT_FOUND",
                format!("Entry dialog \"{}\" is not registered.", entry),
            ));
        }
        Ok(Self {
            dialogs: by_name,
            entry,
        })
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn dialogs(&self) -> impl Iterator<Item = &FlowDialog> {
        self.dialogs.values()
    }

    pub fn dialog(&self, name: &str) -> FlowResult<&FlowDialog> {
        self.dialogs.get(name).ok_or_else(|| {
            FlowError::new(
                "API_DIALOG_NOT_FOUND",
                format!("Dialog \"{}\" is not registered.", name),
            )
        })
    }

    /// Opens a conversation on the entry dialog.
    pub async fn begin(&self, session_id: impl Into<String>) -> FlowResult<FlowTurn> {
        let snapshot = SessionSnapshot::new(session_id, self.entry.clone());
        self.process(snapshot, FlowEvent::FrameStart).await
    }

    /// Delivers `event` to the top frame, then keeps delivering the
    /// `frame_start`/`frame_result` events its effects imply.
    pub async fn process(
        &self,
        mut snapshot: SessionSnapshot,
        event: FlowEvent,
    ) -> FlowResult<FlowTurn> {
        if snapshot.stack.is_empty() {
            return Err(FlowError::new(
                "API_CONVERSATION_ENDED",
                format!("Session \"{}\" has no active dialog.", snapshot.id),
            ));
        }

        let mut messages = Vec::new();
        let mut pending = Some(event);
        let mut hops = 0;
        while let Some(event) = pending.take() {
            hops += 1;
            if hops > MAX_EVENT_HOPS {
                return Err(FlowError::new(
                    "API_EVENT_LOOP",
                    format!(
                        "Session \"{}\" exceeded {} dialog transitions for one event.",
                        snapshot.id, MAX_EVENT_HOPS
                    ),
                ));
            }
            let Some(frame) = snapshot.top() else {
                break;
            };
            let dialog = self.dialog(&frame.dialog)?;

            let session =
                Arc::new(MemorySession::from_snapshot(&snapshot).with_volatiles(event.volatiles()));
            let handle: SessionRef = session.clone();
            dialog.handle(&event, handle).await?;

            let outcome = session.outcome();
            messages.extend(outcome.messages);
            snapshot.globals = outcome.globals;
            if let Some(top) = snapshot.top_mut() {
                top.locals = outcome.locals;
            }
            pending = self.apply_effect(&mut snapshot, outcome.effect)?;
        }

        let ended = snapshot.stack.is_empty();
        Ok(FlowTurn {
            messages,
            snapshot,
            ended,
        })
    }

    fn apply_effect(
        &self,
        snapshot: &mut SessionSnapshot,
        effect: Option<SessionEffect>,
    ) -> FlowResult<Option<FlowEvent>> {
        match effect {
            None => Ok(None),
            Some(SessionEffect::Start {
                dialog,
                tag,
                locals,
            }) => {
                self.dialog(&dialog)?;
                debug!(session = %snapshot.id, dialog = %dialog, "pushing frame");
                snapshot.stack.push(FrameSnapshot {
                    dialog,
                    tag,
                    locals: locals.unwrap_or_default(),
                });
                Ok(Some(FlowEvent::FrameStart))
            }
            Some(SessionEffect::Finish { result }) => {
                let Some(finished) = snapshot.stack.pop() else {
                    return Ok(None);
                };
                debug!(session = %snapshot.id, dialog = %finished.dialog, "popping frame");
                if snapshot.stack.is_empty() {
                    return Ok(None);
                }
                Ok(Some(FlowEvent::FrameResult {
                    dialog: finished.dialog,
                    tag: finished.tag,
                    result,
                }))
            }
        }
    }
}
