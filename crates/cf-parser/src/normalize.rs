use cf_core::{
    Command, ExecCommand, FinishCommand, Flow, FlowError, FlowId, FlowResult, LoopControlCommand,
    MessageKind, Param, ParamMap, SetCommand, StartCommand, StartTarget, SubFlowCommand,
    WaitCommand,
};

use crate::control::{normalize_conditional, normalize_iteration, normalize_switch};
use crate::messages::normalize_message;

/// Normalizes a raw flow. A single command, handler or string is a flow of
/// one command; `null` is the empty flow.
pub fn normalize_flow(raw: &Param) -> FlowResult<Flow> {
    match raw {
        Param::Null => Ok(Flow::default()),
        Param::Array(items) => items
            .iter()
            .map(normalize_flow_command)
            .collect::<FlowResult<Vec<_>>>()
            .map(Flow::new),
        other => Ok(Flow::new(vec![normalize_flow_command(other)?])),
    }
}

pub fn normalize_flow_command(raw: &Param) -> FlowResult<Command> {
    match raw {
        Param::String(text) => Ok(Command::Message(cf_core::MessageCommand {
            kind: MessageKind::Text,
            id: FlowId::from("text"),
            text: Some(Param::from(text.as_str())),
            media_url: None,
            actions: None,
            items: None,
            extra: ParamMap::new(),
        })),
        Param::Handler(handler) => Ok(Command::Handler(handler.clone())),
        Param::Object(map) => normalize_object(map),
        other => Err(unrecognized(other)),
    }
}

fn normalize_object(map: &ParamMap) -> FlowResult<Command> {
    let kind = match map.get("type") {
        Some(Param::String(name)) => name.clone(),
        Some(other) => {
            return Err(FlowError::new(
                "COMMAND_TYPE_INVALID",
                format!("Command type must be a string, got {}.", other.type_name()),
            ))
        }
        None => infer_type(map)
            .ok_or_else(|| unrecognized(&Param::Object(map.clone())))?
            .to_string(),
    };

    if let Some(message_kind) = MessageKind::parse(&kind) {
        return normalize_message(message_kind, map).map(Command::Message);
    }

    match kind.as_str() {
        "conditional" => normalize_conditional(map).map(Command::Conditional),
        "switch" => normalize_switch(map).map(Command::Switch),
        "iteration" => normalize_iteration(map).map(Command::Iteration),
        "start" => normalize_start(map).map(Command::Start),
        "finish" => Ok(Command::Finish(FinishCommand {
            id: command_id(map, "finish")?,
            result: field(map, "finish"),
        })),
        "set" => Ok(Command::Set(SetCommand {
            id: command_id(map, "set")?,
            values: field(map, "set"),
        })),
        "exec" => normalize_exec(map).map(Command::Exec),
        "wait" => Ok(Command::Wait(WaitCommand {
            id: command_id(map, "wait")?,
            delay: field(map, "wait"),
        })),
        "break" => Ok(Command::Break(LoopControlCommand {
            id: command_id(map, "break")?,
        })),
        "continue" => Ok(Command::Continue(LoopControlCommand {
            id: command_id(map, "continue")?,
        })),
        "flow" => normalize_sub_flow(map).map(Command::SubFlow),
        other => Err(FlowError::new(
            "COMMAND_TYPE_INVALID",
            format!("Unknown command type {:?}.", other),
        )),
    }
}

fn infer_type(map: &ParamMap) -> Option<&'static str> {
    const ORDER: &[(&[&str], &str)] = &[
        (&["mediaUrl"], "image"),
        (&["text"], "text"),
        (&["finish"], "finish"),
        (&["start"], "start"),
        (&["wait"], "wait"),
        (&["set"], "set"),
        (&["if", "when", "unless"], "conditional"),
        (&["switch"], "switch"),
        (&["exec"], "exec"),
        (&["for", "while", "until"], "iteration"),
        (&["break"], "break"),
        (&["continue"], "continue"),
        (&["flow"], "flow"),
    ];
    ORDER
        .iter()
        .find(|(keys, _)| keys.iter().any(|key| map.contains_key(key)))
        .map(|(_, kind)| *kind)
}

fn normalize_start(map: &ParamMap) -> FlowResult<StartCommand> {
    Ok(StartCommand {
        id: command_id(map, "start")?,
        target: start_target(&field(map, "start"))?,
        then: map.get("then").map(normalize_flow).transpose()?,
    })
}

/// Reads the accepted `start` shapes: `"Dialog"`, `["Dialog", args]`,
/// `{dialog, args}`, or a handler/template computed at run time.
pub fn start_target(raw: &Param) -> FlowResult<StartTarget> {
    match raw {
        Param::String(text) if cf_core::has_template(text) => Ok(StartTarget::Computed(raw.clone())),
        Param::String(text) if !text.trim().is_empty() => Ok(StartTarget::Named {
            dialog: text.clone(),
            args: None,
        }),
        Param::Handler(_) => Ok(StartTarget::Computed(raw.clone())),
        Param::Array(items) => match items.as_slice() {
            [Param::String(dialog)] => Ok(StartTarget::Named {
                dialog: dialog.clone(),
                args: None,
            }),
            [Param::String(dialog), args] => Ok(StartTarget::Named {
                dialog: dialog.clone(),
                args: start_args(args)?,
            }),
            _ => Err(invalid_start(raw)),
        },
        Param::Object(map) => match map.get("dialog") {
            Some(Param::String(dialog)) => Ok(StartTarget::Named {
                dialog: dialog.clone(),
                args: map.get("args").map(start_args).transpose()?.flatten(),
            }),
            _ => Err(invalid_start(raw)),
        },
        _ => Err(invalid_start(raw)),
    }
}

fn start_args(args: &Param) -> FlowResult<Option<Param>> {
    match args {
        Param::Null => Ok(None),
        Param::Object(_) | Param::Handler(_) => Ok(Some(args.clone())),
        other => Err(FlowError::new(
            "START_PARAM_INVALID",
            format!("Start args must be an object or handler, got {}.", other.type_name()),
        )),
    }
}

fn invalid_start(raw: &Param) -> FlowError {
    FlowError::new(
        "START_PARAM_INVALID",
        format!(
            "Start expects \"Dialog\", [\"Dialog\", args], {{dialog, args}} or a handler, got {}.",
            describe(raw)
        ),
    )
}

fn normalize_exec(map: &ParamMap) -> FlowResult<ExecCommand> {
    let id = command_id(map, "exec")?;
    let (name, args) = match field(map, "exec") {
        Param::String(name) => (name, None),
        Param::Array(items) => match items.as_slice() {
            [Param::String(name)] => (name.clone(), None),
            [Param::String(name), args] => (name.clone(), Some(args.clone())),
            _ => return Err(invalid_exec(&Param::Array(items.clone()))),
        },
        other => return Err(invalid_exec(&other)),
    };
    Ok(ExecCommand { id, name, args })
}

fn invalid_exec(raw: &Param) -> FlowError {
    FlowError::new(
        "EXEC_PARAM_INVALID",
        format!("Exec expects \"name\" or [\"name\", args], got {}.", describe(raw)),
    )
}

fn normalize_sub_flow(map: &ParamMap) -> FlowResult<SubFlowCommand> {
    let id = match map.get("id") {
        Some(id) => parse_id(id)?,
        None => {
            return Err(FlowError::new(
                "FLOW_ID_MISSING",
                "An explicit flow command requires an id.",
            ))
        }
    };
    Ok(SubFlowCommand {
        id,
        flow: normalize_flow(&field(map, "flow"))?,
    })
}

pub(crate) fn command_id(map: &ParamMap, default: &str) -> FlowResult<FlowId> {
    match map.get("id") {
        Some(id) => parse_id(id),
        None => Ok(FlowId::from(default)),
    }
}

pub(crate) fn parse_id(raw: &Param) -> FlowResult<FlowId> {
    let id = match raw {
        Param::String(name) => FlowId::from(name.as_str()),
        Param::Number(number) => match number.as_u64() {
            Some(index) => FlowId::Index(index as usize),
            None => return Err(invalid_id(raw)),
        },
        _ => return Err(invalid_id(raw)),
    };
    id.validate()?;
    Ok(id)
}

fn invalid_id(raw: &Param) -> FlowError {
    FlowError::new(
        "FLOW_PATH_ID_INVALID",
        format!("Command id must be a string or a non-negative integer, got {}.", describe(raw)),
    )
}

pub(crate) fn field(map: &ParamMap, key: &str) -> Param {
    map.get(key).cloned().unwrap_or_default()
}

/// Entries of `map` not named in `known`, kept in author order.
pub(crate) fn extra_fields(map: &ParamMap, known: &[&str]) -> ParamMap {
    map.iter()
        .filter(|(key, _)| !known.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

pub(crate) fn describe(raw: &Param) -> String {
    match raw.to_value() {
        Some(value) => value.to_string(),
        None => match raw {
            Param::Object(map) => format!(
                "object with keys [{}]",
                map.keys().cloned().collect::<Vec<_>>().join(", ")
            ),
            other => other.type_name().to_string(),
        },
    }
}

fn unrecognized(raw: &Param) -> FlowError {
    FlowError::new(
        "COMMAND_UNRECOGNIZED",
        format!("Unrecognized flow command: {}", describe(raw)),
    )
}
