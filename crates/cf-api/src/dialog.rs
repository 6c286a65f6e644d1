use std::sync::Arc;

use cf_compiler::{compile_dialog, CompiledDialog, DialogDefinition, FlowRegistry, FlowRun};
use cf_core::{FlowResult, SessionRef, Value};
use tracing::{info, warn};

use crate::event::FlowEvent;

/// A compiled dialog that routes inbound events to its flows.
#[derive(Debug, Clone)]
pub struct FlowDialog {
    compiled: CompiledDialog,
}

impl FlowDialog {
    pub fn new(definition: DialogDefinition) -> FlowResult<Self> {
        Ok(Self {
            compiled: compile_dialog(definition)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.compiled.name
    }

    pub fn registry(&self) -> &Arc<FlowRegistry> {
        &self.compiled.registry
    }

    pub fn compiled(&self) -> &CompiledDialog {
        &self.compiled
    }

    /// The flow key `event` resolves to, with the value it resumes with.
    /// `None` when this dialog has no handler for it.
    pub fn resolve(&self, event: &FlowEvent) -> Option<(String, Option<Value>)> {
        let registry = &self.compiled.registry;
        match event {
            FlowEvent::FrameStart => self.compiled.on_start.clone().map(|key| (key, None)),
            FlowEvent::FrameResult {
                dialog,
                tag,
                result,
            } => {
                let flow = registry.result_handler(dialog, tag.as_deref()?)?;
                Some((flow.to_string(), Some(result.clone())))
            }
            FlowEvent::FrameMessage { key, intent, .. } => {
                let routed = key.as_deref().and_then(|key| {
                    registry
                        .postback_route(key)
                        .or_else(|| registry.payload_route(key))
                });
                let flow = routed
                    .or_else(|| {
                        intent
                            .as_deref()
                            .and_then(|intent| self.compiled.intent_key(intent))
                    })
                    .or(self.compiled.on_default.as_deref())?;
                Some((flow.to_string(), None))
            }
            FlowEvent::FrameDefault => self.compiled.on_default.clone().map(|key| (key, None)),
        }
    }

    /// Runs the flow `event` resolves to. An event nobody handles is logged
    /// and dropped.
    pub async fn handle(&self, event: &FlowEvent, session: SessionRef) -> FlowResult<()> {
        let Some((flow, value)) = self.resolve(event) else {
            warn!(dialog = %self.name(), event = event.kind(), "no handler for event");
            return Ok(());
        };
        info!(
            dialog = %self.name(),
            session = %session.id(),
            event = event.kind(),
            flow = %flow,
            "dispatching event"
        );
        FlowRun::new(self.compiled.registry.clone(), session, value)
            .dispatch(&flow)
            .await
    }
}
