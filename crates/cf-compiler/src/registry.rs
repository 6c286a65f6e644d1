use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use cf_core::{
    session_vars, FlowError, FlowKeyer, FlowPath, FlowResult, HandlerTable, SessionRef, Value,
    Vars, WILDCARD_DIALOG,
};
use futures::future::BoxFuture;
use tracing::{debug, trace};

use crate::suggest::with_suggestion;

/// How a step hands control back to the flow running it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Next,
    Break,
    Continue,
    /// Ends the current flow and resumes the flow registered under the key.
    Goto(String),
}

impl Signal {
    pub fn goto(key: impl Into<String>) -> Self {
        Self::Goto(key.into())
    }
}

type StepFn = dyn Fn(FlowRun) -> BoxFuture<'static, FlowResult<Signal>> + Send + Sync;

/// One compiled command.
#[derive(Clone)]
pub struct Step {
    inner: Arc<StepFn>,
}

impl Step {
    pub fn new<F, Fut>(step: F) -> Self
    where
        F: Fn(FlowRun) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FlowResult<Signal>> + Send + 'static,
    {
        let inner: Arc<StepFn> =
            Arc::new(move |run: FlowRun| -> BoxFuture<'static, FlowResult<Signal>> {
                Box::pin(step(run))
            });
        Self { inner }
    }

    /// Resumes the flow registered under `key`.
    pub fn goto(key: impl Into<String>) -> Self {
        let key = key.into();
        Self::new(move |_run: FlowRun| {
            let key = key.clone();
            async move { Ok(Signal::Goto(key)) }
        })
    }

    pub fn call(&self, run: FlowRun) -> BoxFuture<'static, FlowResult<Signal>> {
        (self.inner)(run)
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Step(..)")
    }
}

/// State one handler invocation runs with. Cheap to clone; every step gets
/// its own copy.
#[derive(Clone)]
pub struct FlowRun {
    pub registry: Arc<FlowRegistry>,
    pub session: SessionRef,
    /// Value the flow was resumed with, exposed to handlers as `value`.
    pub value: Option<Value>,
}

impl FlowRun {
    pub fn new(registry: Arc<FlowRegistry>, session: SessionRef, value: Option<Value>) -> Self {
        Self {
            registry,
            session,
            value,
        }
    }

    pub fn vars(&self) -> Vars {
        session_vars(self.session.as_ref(), self.value.as_ref())
    }

    pub fn handlers(&self) -> &HandlerTable {
        self.registry.handlers()
    }

    /// Runs the flow registered under `key`, then every flow it hands over
    /// to, until one ends without a `Goto`.
    pub async fn invoke(&self, key: &str) -> FlowResult<Signal> {
        let mut key = key.to_string();
        loop {
            let flow = self.registry.get_flow_handler(&key)?;
            match flow.run(self.clone()).await? {
                Signal::Goto(next) => key = next,
                signal => return Ok(signal),
            }
        }
    }

    /// Top-level entry: a loop signal escaping here is an internal defect.
    pub async fn dispatch(&self, key: &str) -> FlowResult<()> {
        match self.invoke(key).await? {
            Signal::Next => Ok(()),
            signal => Err(FlowError::with_key(
                "FLOW_SIGNAL_ESCAPED",
                format!(
                    "A {:?} signal escaped flow {:?} without an enclosing loop.",
                    signal, key
                ),
                key,
            )),
        }
    }
}

/// The handler compiled for exactly one flow path.
pub struct CompiledFlow {
    pub key: String,
    pub path: FlowPath,
    steps: Vec<Step>,
    break_flow: Option<String>,
    continue_flow: Option<String>,
}

impl CompiledFlow {
    pub fn new(
        key: String,
        path: FlowPath,
        steps: Vec<Step>,
        break_flow: Option<String>,
        continue_flow: Option<String>,
    ) -> Self {
        Self {
            key,
            path,
            steps,
            break_flow,
            continue_flow,
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs steps in order until one hands control elsewhere. A loop signal
    /// becomes a `Goto` to this flow's loop target when it has one.
    pub async fn run(&self, run: FlowRun) -> FlowResult<Signal> {
        for (index, step) in self.steps.iter().enumerate() {
            trace!(flow = %self.key, step = index, "running step");
            let signal = step.call(run.clone()).await?;
            let target = match &signal {
                Signal::Next => continue,
                Signal::Break => self.break_flow.as_ref(),
                Signal::Continue => self.continue_flow.as_ref(),
                Signal::Goto(_) => None,
            };
            return Ok(match target {
                Some(key) => Signal::goto(key.as_str()),
                None => signal,
            });
        }
        Ok(Signal::Next)
    }
}

impl fmt::Debug for CompiledFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledFlow")
            .field("key", &self.key)
            .field("steps", &self.steps.len())
            .field("break_flow", &self.break_flow)
            .field("continue_flow", &self.continue_flow)
            .finish()
    }
}

/// Everything a compiled dialog dispatches into, keyed by flow key.
pub struct FlowRegistry {
    keyer: FlowKeyer,
    handlers: HandlerTable,
    flows: BTreeMap<String, CompiledFlow>,
    results: BTreeMap<(String, String), String>,
    postbacks: BTreeMap<String, String>,
    payloads: BTreeMap<String, String>,
}

impl FlowRegistry {
    pub fn new(dialog: impl Into<String>, handlers: HandlerTable) -> Self {
        Self {
            keyer: FlowKeyer::new(dialog),
            handlers,
            flows: BTreeMap::new(),
            results: BTreeMap::new(),
            postbacks: BTreeMap::new(),
            payloads: BTreeMap::new(),
        }
    }

    pub fn dialog(&self) -> &str {
        self.keyer.dialog()
    }

    pub fn keyer(&self) -> &FlowKeyer {
        &self.keyer
    }

    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    pub fn add_flow_handler(&mut self, flow: CompiledFlow) -> FlowResult<String> {
        if self.flows.contains_key(&flow.key) {
            return Err(FlowError::with_key(
                "FLOW_KEY_DUPLICATE",
                format!("Flow key {:?} is already registered.", flow.key),
                flow.key.clone(),
            ));
        }
        debug!(flow = %flow.key, steps = flow.len(), "registered flow handler");
        let key = flow.key.clone();
        self.flows.insert(key.clone(), flow);
        Ok(key)
    }

    pub fn get_flow_handler(&self, key: &str) -> FlowResult<&CompiledFlow> {
        let key = self.keyer.flow_key(key)?;
        self.flows.get(&key).ok_or_else(|| {
            let message = with_suggestion(
                format!("Undefined flow handler {:?}.", key),
                &key,
                self.flow_keys(),
            );
            FlowError::with_key("FLOW_HANDLER_UNDEFINED", message, key.clone())
        })
    }

    pub fn has_flow(&self, key: &str) -> bool {
        self.flows.contains_key(key)
    }

    pub fn flow_keys(&self) -> impl Iterator<Item = &str> {
        self.flows.keys().map(String::as_str)
    }

    /// Binds a sub-dialog result, identified by child dialog and tag, to a
    /// continuation flow.
    pub fn add_result_handler(&mut self, dialog: &str, tag: &str, flow: &str) -> FlowResult<()> {
        let binding = (dialog.to_string(), tag.to_string());
        if self.results.contains_key(&binding) {
            return Err(FlowError::with_key(
                "FLOW_KEY_DUPLICATE",
                format!("Result handler for {:?} tagged {:?} is already registered.", dialog, tag),
                tag,
            ));
        }
        debug!(dialog, tag, flow, "registered result handler");
        self.results.insert(binding, flow.to_string());
        Ok(())
    }

    pub fn add_postback_handler(&mut self, key: &str, flow: &str) -> FlowResult<()> {
        debug!(key, flow, "registered postback handler");
        bind_route(&mut self.postbacks, "postback", key, flow)
    }

    pub fn add_payload_handler(&mut self, key: &str, flow: &str) -> FlowResult<()> {
        debug!(key, flow, "registered payload handler");
        bind_route(&mut self.payloads, "payload", key, flow)
    }

    /// Exact child dialog first, then the wildcard binding.
    pub fn result_handler(&self, dialog: &str, tag: &str) -> Option<&str> {
        self.results
            .get(&(dialog.to_string(), tag.to_string()))
            .or_else(|| {
                self.results
                    .get(&(WILDCARD_DIALOG.to_string(), tag.to_string()))
            })
            .map(String::as_str)
    }

    pub fn postback_handler(&self, key: &str) -> Option<&str> {
        self.postbacks.get(key).map(String::as_str)
    }

    pub fn payload_handler(&self, key: &str) -> Option<&str> {
        self.payloads.get(key).map(String::as_str)
    }

    /// The flow a pressed postback key runs. Generated actions route
    /// straight to a flow key, so a registered flow answers for itself.
    pub fn postback_route(&self, key: &str) -> Option<&str> {
        self.postback_handler(key).or_else(|| self.flow_route(key))
    }

    /// The flow a pressed reply key resumes, resolved like
    /// [`postback_route`](Self::postback_route).
    pub fn payload_route(&self, key: &str) -> Option<&str> {
        self.payload_handler(key).or_else(|| self.flow_route(key))
    }

    fn flow_route(&self, key: &str) -> Option<&str> {
        let key = self.keyer.flow_key(key).ok()?;
        self.flows.get_key_value(&key).map(|(key, _)| key.as_str())
    }

    pub fn result_bindings(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.results
            .iter()
            .map(|((dialog, tag), flow)| (dialog.as_str(), tag.as_str(), flow.as_str()))
    }

    pub fn postback_keys(&self) -> impl Iterator<Item = &str> {
        self.postbacks.keys().map(String::as_str)
    }

    pub fn payload_keys(&self) -> impl Iterator<Item = &str> {
        self.payloads.keys().map(String::as_str)
    }
}

/// Re-binding a route to the same flow is allowed; several actions may share
/// one `thenFlow` target.
fn bind_route(
    table: &mut BTreeMap<String, String>,
    kind: &str,
    key: &str,
    flow: &str,
) -> FlowResult<()> {
    match table.get(key) {
        Some(existing) if existing != flow => Err(FlowError::with_key(
            "FLOW_KEY_DUPLICATE",
            format!(
                "The {} key {:?} is already bound to {:?}.",
                kind, key, existing
            ),
            key,
        )),
        _ => {
            table.insert(key.to_string(), flow.to_string());
            Ok(())
        }
    }
}

impl fmt::Debug for FlowRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowRegistry")
            .field("dialog", &self.keyer.dialog())
            .field("flows", &self.flows.keys().collect::<Vec<_>>())
            .field("results", &self.results)
            .field("postbacks", &self.postbacks)
            .field("payloads", &self.payloads)
            .finish()
    }
}
