use std::collections::BTreeMap;
use std::sync::Arc;

use cf_core::{FlowPath, FlowResult, Handler, HandlerTable, Param};
use cf_parser::normalize_flow;
use tracing::debug;

use crate::compile::FlowBuilder;
use crate::options::CompileOptions;
use crate::registry::FlowRegistry;

pub const ON_START_ID: &str = "onStart";
pub const ON_DEFAULT_ID: &str = "onDefault";
pub const INTENT_ID: &str = "intent";

/// Author-supplied flows of one dialog, before normalization.
#[derive(Debug, Clone, Default)]
pub struct DialogDefinition {
    pub name: String,
    pub on_start: Option<Param>,
    pub on_default: Option<Param>,
    pub intents: Vec<(String, Param)>,
    /// Globally addressable flows, compiled at the root path `[id]`.
    pub flows: Vec<(String, Param)>,
    pub handlers: HandlerTable,
}

impl DialogDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn on_start(mut self, flow: impl Into<Param>) -> Self {
        self.on_start = Some(flow.into());
        self
    }

    pub fn on_default(mut self, flow: impl Into<Param>) -> Self {
        self.on_default = Some(flow.into());
        self
    }

    pub fn intent(mut self, name: impl Into<String>, flow: impl Into<Param>) -> Self {
        self.intents.push((name.into(), flow.into()));
        self
    }

    pub fn flow(mut self, id: impl Into<String>, flow: impl Into<Param>) -> Self {
        self.flows.push((id.into(), flow.into()));
        self
    }

    /// Registers a named handler callable through `exec`.
    pub fn handler(mut self, name: impl Into<String>, handler: Handler) -> Self {
        self.handlers.insert(name.into(), handler);
        self
    }
}

/// A dialog whose flows are all registered, plus its entry points by key.
#[derive(Debug, Clone)]
pub struct CompiledDialog {
    pub name: String,
    pub registry: Arc<FlowRegistry>,
    pub on_start: Option<String>,
    pub on_default: Option<String>,
    pub intents: BTreeMap<String, String>,
}

impl CompiledDialog {
    pub fn intent_key(&self, intent: &str) -> Option<&str> {
        self.intents.get(intent).map(String::as_str)
    }
}

pub fn compile_dialog(definition: DialogDefinition) -> FlowResult<CompiledDialog> {
    let DialogDefinition {
        name,
        on_start,
        on_default,
        intents,
        flows,
        handlers,
    } = definition;
    let mut builder = FlowBuilder::new(name.clone(), handlers);

    // Global flows first so entry points may refer to them by `thenFlow`.
    for (id, raw) in &flows {
        compile_entry(&mut builder, raw, FlowPath::root(id.as_str())?)?;
    }
    let on_start = on_start
        .map(|raw| compile_entry(&mut builder, &raw, FlowPath::root(ON_START_ID)?))
        .transpose()?;
    let on_default = on_default
        .map(|raw| compile_entry(&mut builder, &raw, FlowPath::root(ON_DEFAULT_ID)?))
        .transpose()?;
    let mut intent_keys = BTreeMap::new();
    for (intent, raw) in &intents {
        let path = FlowPath::root(INTENT_ID)?.append(intent.as_str())?;
        intent_keys.insert(intent.clone(), compile_entry(&mut builder, raw, path)?);
    }

    let registry = builder.finish()?;
    debug!(
        dialog = %name,
        flows = registry.flow_keys().count(),
        intents = intent_keys.len(),
        "compiled dialog"
    );
    Ok(CompiledDialog {
        name,
        registry: Arc::new(registry),
        on_start,
        on_default,
        intents: intent_keys,
    })
}

fn compile_entry(builder: &mut FlowBuilder, raw: &Param, path: FlowPath) -> FlowResult<String> {
    let flow = normalize_flow(raw)?;
    builder.compile_flow(&flow, &path, &CompileOptions::default())
}
