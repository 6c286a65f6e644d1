use cf_core::{
    Action, ActionType, Actions, FlowError, FlowId, FlowResult, Item, Items, MessageCommand,
    MessageKind, Param, ParamMap,
};

use crate::normalize::{command_id, describe, extra_fields, parse_id};
use crate::normalize_flow;

const MESSAGE_FIELDS: &[&str] = &["type", "id", "text", "mediaUrl", "actions", "items"];
const ACTION_FIELDS: &[&str] = &["type", "id", "text", "then", "thenFlow"];
const ITEM_FIELDS: &[&str] = &["id", "text", "actions"];

pub(crate) fn normalize_message(kind: MessageKind, map: &ParamMap) -> FlowResult<MessageCommand> {
    Ok(MessageCommand {
        kind,
        id: command_id(map, kind.as_str())?,
        text: map.get("text").cloned(),
        media_url: map.get("mediaUrl").cloned(),
        actions: normalize_actions(map.get("actions"), ActionType::Reply)?,
        items: normalize_items(map.get("items"))?,
        extra: extra_fields(map, MESSAGE_FIELDS),
    })
}

/// Top-level actions default to `reply`, item actions to `postback`.
pub(crate) fn normalize_actions(
    raw: Option<&Param>,
    default_type: ActionType,
) -> FlowResult<Option<Actions>> {
    let entries = match raw {
        None | Some(Param::Null) => return Ok(None),
        Some(Param::Handler(handler)) => return Ok(Some(Actions::Dynamic(handler.clone()))),
        Some(raw) => entries(raw, "actions")?,
    };

    entries
        .into_iter()
        .map(|entry| normalize_action(entry, default_type))
        .collect::<FlowResult<Vec<_>>>()
        .map(|actions| Some(Actions::Static(actions)))
}

pub(crate) fn normalize_items(raw: Option<&Param>) -> FlowResult<Option<Items>> {
    let entries = match raw {
        None | Some(Param::Null) => return Ok(None),
        Some(Param::Handler(handler)) => return Ok(Some(Items::Dynamic(handler.clone()))),
        Some(raw) => entries(raw, "items")?,
    };

    entries
        .into_iter()
        .map(normalize_item)
        .collect::<FlowResult<Vec<_>>>()
        .map(|items| Some(Items::Static(items)))
}

/// One action or item spec with the id and text implied by its position.
struct Entry {
    id: FlowId,
    default_text: Option<String>,
    spec: ParamMap,
}

/// Flattens the array and mapping forms. In the mapping form the key is the
/// id and default text; a non-object value is the entry's `then` flow.
fn entries(raw: &Param, what: &str) -> FlowResult<Vec<Entry>> {
    match raw {
        Param::Array(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| match item {
                Param::Object(spec) => Ok(Entry {
                    id: FlowId::Index(index),
                    default_text: None,
                    spec: spec.clone(),
                }),
                Param::String(text) => Ok(Entry {
                    id: FlowId::Index(index),
                    default_text: None,
                    spec: ParamMap::from_iter([("text", Param::from(text.as_str()))]),
                }),
                other => Err(FlowError::new(
                    "MESSAGE_ENTRY_INVALID",
                    format!("Entries of {} must be objects or strings, got {}.", what, describe(other)),
                )),
            })
            .collect(),
        Param::Object(map) => map
            .iter()
            .map(|(key, value)| {
                let spec = match value {
                    Param::Object(spec) => spec.clone(),
                    then => ParamMap::from_iter([("then", then.clone())]),
                };
                Ok(Entry {
                    id: FlowId::from(key.as_str()),
                    default_text: Some(key.clone()),
                    spec,
                })
            })
            .collect(),
        other => Err(FlowError::new(
            "MESSAGE_ENTRY_INVALID",
            format!("{} must be an array, a mapping or a handler, got {}.", what, describe(other)),
        )),
    }
}

fn normalize_action(entry: Entry, default_type: ActionType) -> FlowResult<Action> {
    let Entry {
        id,
        default_text,
        spec,
    } = entry;

    let action_type = match spec.get("type") {
        Some(Param::String(name)) => ActionType::parse(name).ok_or_else(|| {
            FlowError::new("ACTION_TYPE_INVALID", format!("Unknown action type {:?}.", name))
        })?,
        Some(other) => {
            return Err(FlowError::new(
                "ACTION_TYPE_INVALID",
                format!("Action type must be a string, got {}.", describe(other)),
            ))
        }
        None if spec.contains_key("uri") => ActionType::Link,
        None if spec.contains_key("amount") => ActionType::Buy,
        None => default_type,
    };

    let id = match spec.get("id") {
        Some(raw) => parse_id(raw)?,
        None => {
            id.validate()?;
            id
        }
    };

    let then = spec.get("then").map(normalize_flow).transpose()?;
    let then_flow = match spec.get("thenFlow") {
        None | Some(Param::Null) => None,
        Some(Param::String(key)) => Some(key.clone()),
        Some(other) => {
            return Err(FlowError::new(
                "ACTION_THEN_INVALID",
                format!("thenFlow must be a flow key string, got {}.", describe(other)),
            ))
        }
    };
    if (then.is_some() || then_flow.is_some()) && !action_type.accepts_then() {
        return Err(FlowError::new(
            "ACTION_THEN_INVALID",
            format!(
                "Action {} of type {} cannot carry then/thenFlow; only reply and postback actions can.",
                id,
                action_type.as_str()
            ),
        ));
    }

    let text = match spec.get("text") {
        Some(text) => Some(text.clone()),
        None if action_type != ActionType::Share => default_text.map(Param::from),
        None => None,
    };

    Ok(Action {
        id,
        action_type,
        text,
        then,
        then_flow,
        extra: extra_fields(&spec, ACTION_FIELDS),
    })
}

fn normalize_item(entry: Entry) -> FlowResult<Item> {
    let Entry {
        id,
        default_text,
        spec,
    } = entry;

    let id = match spec.get("id") {
        Some(raw) => parse_id(raw)?,
        None => {
            id.validate()?;
            id
        }
    };

    Ok(Item {
        id,
        text: spec
            .get("text")
            .cloned()
            .or_else(|| default_text.map(Param::from)),
        actions: normalize_actions(spec.get("actions"), ActionType::Postback)?,
        extra: extra_fields(&spec, ITEM_FIELDS),
    })
}
