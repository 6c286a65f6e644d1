use std::sync::Arc;

use cf_core::{
    Action, ActionType, Actions, FlowError, FlowKeyer, FlowPath, FlowResult, Handler, Items,
    MessageCommand, Param, ParamMap, Value, Vars,
};

use crate::compile::{expand_param, next_steps, FlowBuilder};
use crate::options::CompileOptions;
use crate::registry::{FlowRegistry, FlowRun, Signal, Step};

/// Rendered action field carrying the key a reply resumes.
pub const PAYLOAD_FIELD: &str = "payload";
/// Rendered action field carrying the key a postback dispatches to.
pub const POSTBACK_FIELD: &str = "postback";

impl FlowBuilder {
    pub(crate) fn compile_message(
        &mut self,
        message: &MessageCommand,
        path: &FlowPath,
        options: &CompileOptions,
    ) -> FlowResult<Step> {
        let dynamic = message.has_dynamic_parts();

        // Dynamic replies cannot get flows of their own, so they resume the
        // message's own flow, which continues to `next_flow`.
        let resume = if dynamic {
            let key = self.register(path, next_steps(options), options)?;
            self.registry_mut().add_payload_handler(&key, &key)?;
            Some(key)
        } else {
            None
        };

        let mut template = ParamMap::new();
        template.insert("type", Param::from(message.kind.as_str()));
        if let Some(text) = &message.text {
            template.insert("text", text.clone());
        }
        if let Some(media_url) = &message.media_url {
            template.insert("mediaUrl", media_url.clone());
        }
        if let Some(actions) = &message.actions {
            let actions =
                self.compile_actions(actions, path, options, ActionType::Reply, resume.as_deref())?;
            template.insert("actions", actions);
        }
        if let Some(items) = &message.items {
            let items = self.compile_items(items, path, options, resume.as_deref())?;
            template.insert("items", items);
        }
        for (key, value) in message.extra.iter() {
            template.insert(key.clone(), value.clone());
        }

        let template = Arc::new(Param::Object(template));
        let next = options.next_flow.clone();
        let path = path.clone();
        Ok(Step::new(move |run: FlowRun| {
            let (template, path, next) = (template.clone(), path.clone(), next.clone());
            async move {
                let message = expand_param(&run, &template, &path).await?;
                let waits = has_reply(&message);
                if dynamic {
                    check_routes(&run.registry, &message)?;
                }
                run.session.send(message).await?;
                match next {
                    Some(next) if dynamic && !waits => Ok(Signal::Goto(next)),
                    _ => Ok(Signal::Next),
                }
            }
        }))
    }

    fn compile_actions(
        &mut self,
        actions: &Actions,
        owner: &FlowPath,
        options: &CompileOptions,
        default_type: ActionType,
        resume: Option<&str>,
    ) -> FlowResult<Param> {
        match actions {
            Actions::Dynamic(handler) => Ok(Param::Handler(route_dynamic_actions(
                handler.clone(),
                default_type,
                self.keyer().clone(),
                resume.map(ToString::to_string),
            ))),
            Actions::Static(actions) => actions
                .iter()
                .map(|action| self.compile_action(action, owner, options))
                .collect::<FlowResult<Vec<_>>>()
                .map(Param::Array),
        }
    }

    /// Reply actions resume through a payload handler, postback actions
    /// through a postback handler; both are keyed by the action's own key.
    fn compile_action(
        &mut self,
        action: &Action,
        owner: &FlowPath,
        options: &CompileOptions,
    ) -> FlowResult<Param> {
        let path = owner.append(action.id.clone())?;
        let mut raw = ParamMap::new();
        raw.insert("type", Param::from(action.action_type.as_str()));
        if let Some(text) = &action.text {
            raw.insert("text", text.clone());
        }

        match action.action_type {
            ActionType::Reply => {
                let route = self.flow_key(&path)?;
                let flow = match &action.then_flow {
                    Some(target) => self.reference_flow(target, &path)?,
                    None => {
                        let then = action.then.clone().unwrap_or_default();
                        self.compile_flow(&then, &path, options)?
                    }
                };
                self.registry_mut().add_payload_handler(&route, &flow)?;
                raw.insert(PAYLOAD_FIELD, Param::from(route));
            }
            ActionType::Postback => {
                // Postbacks arrive out of sequence, so their flows resume nothing.
                let flow = match (&action.then_flow, &action.then) {
                    (Some(target), _) => Some(self.reference_flow(target, &path)?),
                    (None, Some(then)) => {
                        Some(self.compile_flow(then, &path, &CompileOptions::default())?)
                    }
                    (None, None) => None,
                };
                if let Some(flow) = flow {
                    let route = self.flow_key(&path)?;
                    self.registry_mut().add_postback_handler(&route, &flow)?;
                    raw.insert(POSTBACK_FIELD, Param::from(route));
                }
            }
            ActionType::Link | ActionType::Buy | ActionType::Share => {}
        }

        for (key, value) in action.extra.iter() {
            raw.insert(key.clone(), value.clone());
        }
        Ok(Param::Object(raw))
    }

    fn compile_items(
        &mut self,
        items: &Items,
        owner: &FlowPath,
        options: &CompileOptions,
        resume: Option<&str>,
    ) -> FlowResult<Param> {
        let items = match items {
            Items::Dynamic(handler) => {
                return Ok(Param::Handler(route_dynamic_items(
                    handler.clone(),
                    self.keyer().clone(),
                    resume.map(ToString::to_string),
                )))
            }
            Items::Static(items) => items,
        };

        let mut rendered = Vec::with_capacity(items.len());
        for item in items {
            let path = owner.append(item.id.clone())?;
            let mut raw = ParamMap::new();
            if let Some(text) = &item.text {
                raw.insert("text", text.clone());
            }
            if let Some(actions) = &item.actions {
                let actions =
                    self.compile_actions(actions, &path, options, ActionType::Postback, resume)?;
                raw.insert("actions", actions);
            }
            for (key, value) in item.extra.iter() {
                raw.insert(key.clone(), value.clone());
            }
            rendered.push(Param::Object(raw));
        }
        Ok(Param::Array(rendered))
    }
}

fn route_dynamic_actions(
    handler: Handler,
    default_type: ActionType,
    keyer: FlowKeyer,
    resume: Option<String>,
) -> Handler {
    Handler::new(move |vars, session, path| {
        let pending = handler.call(vars, session, path);
        let (keyer, resume) = (keyer.clone(), resume.clone());
        async move {
            let actions = pending.await?.unwrap_or_default();
            route_actions(actions, default_type, &keyer, resume.as_deref()).map(Some)
        }
    })
}

fn route_dynamic_items(handler: Handler, keyer: FlowKeyer, resume: Option<String>) -> Handler {
    Handler::new(move |vars, session, path| {
        let pending = handler.call(vars, session, path);
        let (keyer, resume) = (keyer.clone(), resume.clone());
        async move {
            let items = match pending.await?.unwrap_or_default() {
                Value::Array(items) => items,
                Value::Null => Vec::new(),
                other => vec![other],
            };
            items
                .into_iter()
                .map(|item| {
                    let mut item = entry_object(item, "item")?;
                    if let Some(actions) = item.shift_remove("actions") {
                        let actions = route_actions(
                            actions,
                            ActionType::Postback,
                            &keyer,
                            resume.as_deref(),
                        )?;
                        item.insert("actions".to_string(), actions);
                    }
                    Ok(Value::Object(item))
                })
                .collect::<FlowResult<Vec<_>>>()
                .map(|items| Some(Value::Array(items)))
        }
    })
}

/// Applies the static defaults to generated actions and turns `thenFlow`
/// into a routing key. Replies without one resume the message's flow.
fn route_actions(
    actions: Value,
    default_type: ActionType,
    keyer: &FlowKeyer,
    resume: Option<&str>,
) -> FlowResult<Value> {
    let actions = match actions {
        Value::Array(actions) => actions,
        Value::Null => Vec::new(),
        other => vec![other],
    };

    let mut routed = Vec::with_capacity(actions.len());
    for action in actions {
        let mut action = entry_object(action, "action")?;
        let action_type = match action.get("type") {
            Some(Value::String(name)) => ActionType::parse(name).ok_or_else(|| {
                FlowError::new("ACTION_TYPE_INVALID", format!("Unknown action type {:?}.", name))
            })?,
            Some(other) => {
                return Err(FlowError::new(
                    "ACTION_TYPE_INVALID",
                    format!("Action type must be a string, got {}.", other),
                ))
            }
            None if action.contains_key("uri") => ActionType::Link,
            None if action.contains_key("amount") => ActionType::Buy,
            None => default_type,
        };
        action.insert("type".to_string(), Value::from(action_type.as_str()));

        let then_flow = match action.shift_remove("thenFlow") {
            None | Some(Value::Null) => None,
            Some(Value::String(target)) => Some(keyer.flow_key(target.as_str())?),
            Some(other) => {
                return Err(FlowError::new(
                    "ACTION_THEN_INVALID",
                    format!("thenFlow must be a flow key string, got {}.", other),
                ))
            }
        };

        match action_type {
            ActionType::Reply => {
                if let Some(route) = then_flow.or_else(|| resume.map(ToString::to_string)) {
                    action.insert(PAYLOAD_FIELD.to_string(), Value::from(route));
                }
            }
            ActionType::Postback => {
                if let Some(route) = then_flow {
                    action.insert(POSTBACK_FIELD.to_string(), Value::from(route));
                }
            }
            _ if then_flow.is_some() => {
                return Err(FlowError::new(
                    "ACTION_THEN_INVALID",
                    format!(
                        "Generated {} action cannot carry thenFlow; only reply and postback actions can.",
                        action_type.as_str()
                    ),
                ))
            }
            _ => {}
        }
        routed.push(Value::Object(action));
    }
    Ok(Value::Array(routed))
}

fn entry_object(entry: Value, what: &str) -> FlowResult<Vars> {
    match entry {
        Value::Object(entry) => Ok(entry),
        Value::String(text) => {
            let mut entry = Vars::new();
            entry.insert("text".to_string(), Value::String(text));
            Ok(entry)
        }
        other => Err(FlowError::new(
            "MESSAGE_ENTRY_INVALID",
            format!("Generated {} must be an object or a string, got {}.", what, other),
        )),
    }
}

fn actions_of(value: &Value) -> impl Iterator<Item = &Vars> {
    let top = value.get("actions").and_then(Value::as_array).into_iter().flatten();
    let nested = value
        .get("items")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|item| item.get("actions").and_then(Value::as_array))
        .flatten();
    top.chain(nested).filter_map(Value::as_object)
}

/// Whether a rendered message waits for the user to pick a reply.
pub fn has_reply(message: &Value) -> bool {
    actions_of(message)
        .any(|action| action.get("type").and_then(Value::as_str) == Some(ActionType::Reply.as_str()))
}

/// Generated routes must resolve the same way inbound keys do.
fn check_routes(registry: &FlowRegistry, message: &Value) -> FlowResult<()> {
    for action in actions_of(message) {
        for field in [PAYLOAD_FIELD, POSTBACK_FIELD] {
            let Some(route) = action.get(field).and_then(Value::as_str) else {
                continue;
            };
            let known = match field {
                PAYLOAD_FIELD => registry.payload_route(route).is_some(),
                _ => registry.postback_route(route).is_some(),
            };
            if !known {
                registry.get_flow_handler(route)?;
            }
        }
    }
    Ok(())
}
