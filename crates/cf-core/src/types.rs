use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Number;

use crate::error::FlowResult;
use crate::path::{FlowId, FlowPath};
use crate::session::SessionRef;
use crate::value::{is_truthy, Value, Vars};

pub type HandlerFuture = BoxFuture<'static, FlowResult<Option<Value>>>;
type HandlerFn = dyn Fn(Vars, SessionRef, FlowPath) -> HandlerFuture + Send + Sync;

/// An author-supplied async function of `(vars, session, path)`.
///
/// `Ok(None)` is the "no value" result; object expansion drops such keys.
#[derive(Clone)]
pub struct Handler {
    inner: Arc<HandlerFn>,
}

impl Handler {
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(Vars, SessionRef, FlowPath) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FlowResult<Option<Value>>> + Send + 'static,
    {
        let inner: Arc<HandlerFn> = Arc::new(
            move |vars: Vars, session: SessionRef, path: FlowPath| -> HandlerFuture {
                Box::pin(handler(vars, session, path))
            },
        );
        Self { inner }
    }

    /// A synchronous handler that only reads vars.
    pub fn from_vars<F>(handler: F) -> Self
    where
        F: Fn(&Vars) -> Value + Send + Sync + 'static,
    {
        Self::new(move |vars, _session, _path| {
            let value = handler(&vars);
            async move { Ok(Some(value)) }
        })
    }

    pub fn call(&self, vars: Vars, session: SessionRef, path: FlowPath) -> HandlerFuture {
        (self.inner)(vars, session, path)
    }

    /// Wraps this handler so it yields the boolean negation of its result.
    pub fn negated(&self) -> Self {
        let inner = self.clone();
        Self::new(move |vars, session, path| {
            let result = inner.call(vars, session, path);
            async move {
                let value = result.await?;
                Ok(Some(Value::Bool(
                    !value.as_ref().map(is_truthy).unwrap_or(false),
                )))
            }
        })
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.inner) as *const (),
            Arc::as_ptr(&other.inner) as *const (),
        )
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler(..)")
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

/// Named handlers reachable through `exec`.
pub type HandlerTable = BTreeMap<String, Handler>;

/// Insertion-ordered object entries of a [`Param`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamMap(Vec<(String, Param)>);

impl ParamMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Param> {
        self.0
            .iter()
            .find(|(entry, _)| entry == key)
            .map(|(_, value)| value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Param) {
        let key = key.into();
        match self.0.iter_mut().find(|(entry, _)| *entry == key) {
            Some((_, existing)) => *existing = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Param> {
        let index = self.0.iter().position(|(entry, _)| entry == key)?;
        Some(self.0.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Param)> {
        self.0.iter().map(|(key, value)| (key, value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.iter().map(|(key, _)| key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Param)> for ParamMap {
    fn from_iter<T: IntoIterator<Item = (K, Param)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl IntoIterator for ParamMap {
    type Item = (String, Param);
    type IntoIter = std::vec::IntoIter<(String, Param)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// The JSON-like tree authors write flows and parameters in. Unlike JSON it
/// can embed handlers at any position.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Param {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Param>),
    Object(ParamMap),
    Handler(Handler),
}

impl Param {
    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Param)>) -> Self {
        Self::Object(entries.into_iter().collect())
    }

    pub fn array(items: impl IntoIterator<Item = Param>) -> Self {
        Self::Array(items.into_iter().collect())
    }

    pub fn handler(handler: Handler) -> Self {
        Self::Handler(handler)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Handler(_) => "handler",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ParamMap> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Param]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_handler(&self) -> Option<&Handler> {
        match self {
            Self::Handler(handler) => Some(handler),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(number) => number.as_f64(),
            _ => None,
        }
    }

    /// Literal value of a handler-free param.
    pub fn to_value(&self) -> Option<Value> {
        Some(match self {
            Self::Null => Value::Null,
            Self::Bool(flag) => Value::Bool(*flag),
            Self::Number(number) => Value::Number(number.clone()),
            Self::String(text) => Value::String(text.clone()),
            Self::Array(items) => Value::Array(
                items
                    .iter()
                    .map(Param::to_value)
                    .collect::<Option<Vec<_>>>()?,
            ),
            Self::Object(map) => {
                let mut object = Vars::new();
                for (key, value) in map.iter() {
                    object.insert(key.clone(), value.to_value()?);
                }
                Value::Object(object)
            }
            Self::Handler(_) => return None,
        })
    }
}

impl From<Value> for Param {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(flag) => Self::Bool(flag),
            Value::Number(number) => Self::Number(number),
            Value::String(text) => Self::String(text),
            Value::Array(items) => Self::Array(items.into_iter().map(Param::from).collect()),
            Value::Object(entries) => Self::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, Param::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for Param {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Self::Number(Number::from(value))
    }
}

impl From<i32> for Param {
    fn from(value: i32) -> Self {
        Self::Number(Number::from(value))
    }
}

impl From<f64> for Param {
    fn from(value: f64) -> Self {
        Number::from_f64(value)
            .map(Self::Number)
            .unwrap_or(Self::Null)
    }
}

impl From<Handler> for Param {
    fn from(value: Handler) -> Self {
        Self::Handler(value)
    }
}

impl From<Vec<Param>> for Param {
    fn from(value: Vec<Param>) -> Self {
        Self::Array(value)
    }
}

impl From<ParamMap> for Param {
    fn from(value: ParamMap) -> Self {
        Self::Object(value)
    }
}

/// An ordered sequence of commands.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Flow {
    pub commands: Vec<Command>,
}

impl Flow {
    pub fn new(commands: Vec<Command>) -> Self {
        Self { commands }
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Message(MessageCommand),
    Conditional(ConditionalCommand),
    Switch(SwitchCommand),
    Iteration(IterationCommand),
    Start(StartCommand),
    Finish(FinishCommand),
    Set(SetCommand),
    Exec(ExecCommand),
    Wait(WaitCommand),
    Break(LoopControlCommand),
    Continue(LoopControlCommand),
    SubFlow(SubFlowCommand),
    Handler(Handler),
}

impl Command {
    /// Local id used as this command's flow path segment. Opaque handlers
    /// have none.
    pub fn id(&self) -> Option<&FlowId> {
        Some(match self {
            Self::Message(command) => &command.id,
            Self::Conditional(command) => &command.id,
            Self::Switch(command) => &command.id,
            Self::Iteration(command) => &command.id,
            Self::Start(command) => &command.id,
            Self::Finish(command) => &command.id,
            Self::Set(command) => &command.id,
            Self::Exec(command) => &command.id,
            Self::Wait(command) => &command.id,
            Self::Break(command) | Self::Continue(command) => &command.id,
            Self::SubFlow(command) => &command.id,
            Self::Handler(_) => return None,
        })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Message(command) => command.kind.as_str(),
            Self::Conditional(_) => "conditional",
            Self::Switch(_) => "switch",
            Self::Iteration(_) => "iteration",
            Self::Start(_) => "start",
            Self::Finish(_) => "finish",
            Self::Set(_) => "set",
            Self::Exec(_) => "exec",
            Self::Wait(_) => "wait",
            Self::Break(_) => "break",
            Self::Continue(_) => "continue",
            Self::SubFlow(_) => "flow",
            Self::Handler(_) => "handler",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Image,
    List,
    Carousel,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::List => "list",
            Self::Carousel => "carousel",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "list" => Some(Self::List),
            "carousel" => Some(Self::Carousel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageCommand {
    pub kind: MessageKind,
    pub id: FlowId,
    pub text: Option<Param>,
    pub media_url: Option<Param>,
    pub actions: Option<Actions>,
    pub items: Option<Items>,
    /// Remaining fields, expanded and sent as-is.
    pub extra: ParamMap,
}

impl MessageCommand {
    pub fn has_dynamic_parts(&self) -> bool {
        matches!(self.actions, Some(Actions::Dynamic(_)))
            || match &self.items {
                Some(Items::Dynamic(_)) => true,
                Some(Items::Static(items)) => items
                    .iter()
                    .any(|item| matches!(item.actions, Some(Actions::Dynamic(_)))),
                None => false,
            }
    }

    pub fn has_reply_actions(&self) -> bool {
        let top_level = match &self.actions {
            Some(Actions::Static(actions)) => actions.iter().any(Action::is_reply),
            _ => false,
        };
        let in_items = match &self.items {
            Some(Items::Static(items)) => items.iter().any(|item| match &item.actions {
                Some(Actions::Static(actions)) => actions.iter().any(Action::is_reply),
                _ => false,
            }),
            _ => false,
        };
        top_level || in_items
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Actions {
    Static(Vec<Action>),
    Dynamic(Handler),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Items {
    Static(Vec<Item>),
    Dynamic(Handler),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    Reply,
    Postback,
    Link,
    Buy,
    Share,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reply => "reply",
            Self::Postback => "postback",
            Self::Link => "link",
            Self::Buy => "buy",
            Self::Share => "share",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "reply" => Some(Self::Reply),
            "postback" => Some(Self::Postback),
            "link" => Some(Self::Link),
            "buy" => Some(Self::Buy),
            "share" => Some(Self::Share),
            _ => None,
        }
    }

    /// Only these types may carry `then`/`thenFlow`.
    pub fn accepts_then(self) -> bool {
        matches!(self, Self::Reply | Self::Postback)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub id: FlowId,
    pub action_type: ActionType,
    pub text: Option<Param>,
    pub then: Option<Flow>,
    pub then_flow: Option<String>,
    pub extra: ParamMap,
}

impl Action {
    pub fn is_reply(&self) -> bool {
        self.action_type == ActionType::Reply
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: FlowId,
    pub text: Option<Param>,
    pub actions: Option<Actions>,
    pub extra: ParamMap,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalCommand {
    pub id: FlowId,
    pub test: Param,
    pub then: Flow,
    pub otherwise: Option<Flow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub id: FlowId,
    pub flow: Flow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCommand {
    pub id: FlowId,
    pub value: Param,
    pub cases: Vec<SwitchCase>,
    pub default: Option<Flow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IterationCommand {
    pub id: FlowId,
    /// Assignments run once before the first test.
    pub init: Option<Param>,
    pub condition: Param,
    /// Object of numeric deltas, or a handler whose object result is assigned.
    pub increment: Option<Param>,
    pub body: Flow,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StartTarget {
    Named { dialog: String, args: Option<Param> },
    Computed(Param),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StartCommand {
    pub id: FlowId,
    pub target: StartTarget,
    pub then: Option<Flow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FinishCommand {
    pub id: FlowId,
    pub result: Param,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetCommand {
    pub id: FlowId,
    pub values: Param,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecCommand {
    pub id: FlowId,
    pub name: String,
    pub args: Option<Param>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaitCommand {
    pub id: FlowId,
    pub delay: Param,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopControlCommand {
    pub id: FlowId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubFlowCommand {
    pub id: FlowId,
    pub flow: Flow,
}
