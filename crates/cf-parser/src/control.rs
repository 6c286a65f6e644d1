use cf_core::accessor::var;
use cf_core::{
    has_template, is_truthy, render_template, ConditionalCommand, Flow, FlowError, FlowResult,
    Handler, IterationCommand, Param, ParamMap, SwitchCase, SwitchCommand, Value,
};

use crate::normalize::{command_id, describe, field, parse_id};
use crate::normalize_flow;

pub(crate) fn normalize_conditional(map: &ParamMap) -> FlowResult<ConditionalCommand> {
    let id = command_id(map, "if")?;
    let body = |keys: &[&str]| -> FlowResult<Option<Flow>> {
        keys.iter()
            .find_map(|key| map.get(key))
            .map(normalize_flow)
            .transpose()
    };

    if let Some(test) = map.get("unless") {
        // `unless` keeps the test and swaps the branches.
        let then = body(&["then", "do"])?;
        let otherwise = body(&["else"])?;
        return Ok(ConditionalCommand {
            id,
            test: test.clone(),
            then: otherwise.unwrap_or_default(),
            otherwise: Some(then.unwrap_or_default()),
        });
    }

    let test = map
        .get("if")
        .or_else(|| map.get("when"))
        .cloned()
        .ok_or_else(|| {
            FlowError::new(
                "COMMAND_UNRECOGNIZED",
                "A conditional needs an if, when or unless test.",
            )
        })?;

    Ok(ConditionalCommand {
        id,
        test,
        then: body(&["then", "do"])?.unwrap_or_default(),
        otherwise: body(&["else"])?,
    })
}

pub(crate) fn normalize_switch(map: &ParamMap) -> FlowResult<SwitchCommand> {
    let cases = match map.get("cases") {
        None | Some(Param::Null) => Vec::new(),
        Some(Param::Array(cases)) => cases.iter().map(switch_case).collect::<FlowResult<_>>()?,
        Some(Param::Object(cases)) => cases
            .iter()
            .map(|(id, flow)| {
                Ok(SwitchCase {
                    id: parse_id(&Param::from(id.as_str()))?,
                    flow: normalize_flow(flow)?,
                })
            })
            .collect::<FlowResult<_>>()?,
        Some(other) => {
            return Err(FlowError::new(
                "SWITCH_CASES_INVALID",
                format!("Switch cases must be an array or a mapping, got {}.", describe(other)),
            ))
        }
    };

    Ok(SwitchCommand {
        id: command_id(map, "switch")?,
        value: field(map, "switch"),
        cases,
        default: map.get("default").map(normalize_flow).transpose()?,
    })
}

fn switch_case(raw: &Param) -> FlowResult<SwitchCase> {
    let case = raw.as_object().ok_or_else(|| {
        FlowError::new(
            "SWITCH_CASES_INVALID",
            format!("Switch case must be an {{id, do}} object, got {}.", describe(raw)),
        )
    })?;
    let id = case.get("id").ok_or_else(|| {
        FlowError::new("SWITCH_CASES_INVALID", "Switch case is missing its id.")
    })?;
    Ok(SwitchCase {
        id: parse_id(id)?,
        flow: normalize_flow(&field(case, "do"))?,
    })
}

pub(crate) fn normalize_iteration(map: &ParamMap) -> FlowResult<IterationCommand> {
    let body = normalize_flow(&field(map, "do"))?;

    if let Some(condition) = map.get("condition") {
        return Ok(IterationCommand {
            id: command_id(map, "iteration")?,
            init: map.get("init").filter(|init| !init.is_null()).cloned(),
            condition: condition.clone(),
            increment: map.get("increment").filter(|incr| !incr.is_null()).cloned(),
            body,
        });
    }
    if let Some(condition) = map.get("while") {
        return Ok(IterationCommand {
            id: command_id(map, "while")?,
            init: None,
            condition: condition.clone(),
            increment: None,
            body,
        });
    }
    if let Some(condition) = map.get("until") {
        return Ok(IterationCommand {
            id: command_id(map, "until")?,
            init: None,
            condition: negate(condition),
            increment: None,
            body,
        });
    }
    match map.get("for") {
        Some(Param::Array(parts)) => {
            let (init, condition, increment) = for_parts(parts)?;
            Ok(IterationCommand {
                id: command_id(map, "for")?,
                init,
                condition,
                increment,
                body,
            })
        }
        Some(other) => Err(invalid_for(other)),
        None => Err(FlowError::new(
            "COMMAND_UNRECOGNIZED",
            "An iteration needs a condition, while, until or for clause.",
        )),
    }
}

type ForParts = (Option<Param>, Param, Option<Param>);

fn for_parts(parts: &[Param]) -> FlowResult<ForParts> {
    let (init, condition, increment) = match parts {
        [init, condition] => (init, condition, &Param::Null),
        [init, condition, increment] => (init, condition, increment),
        _ => return Err(invalid_for(&Param::Array(parts.to_vec()))),
    };

    let (init, names) = match init {
        Param::Null => (None, Vec::new()),
        Param::String(name) => (
            Some(Param::object([(name.clone(), Param::from(0))])),
            vec![name.clone()],
        ),
        Param::Object(values) => (Some(init.clone()), values.keys().cloned().collect()),
        Param::Handler(_) => (Some(init.clone()), Vec::new()),
        other => return Err(invalid_for(other)),
    };

    let condition = match condition {
        Param::Number(_) if names.is_empty() => return Err(invalid_for(condition)),
        Param::Number(limit) => {
            let limit = limit.as_f64().unwrap_or_default();
            let mut names = names.iter();
            let first = names.next().map(|name| var(name).lt(limit));
            let all = names.fold(first, |acc, name| acc.map(|acc| acc.and(var(name).lt(limit))));
            all.map(Param::from).unwrap_or_default()
        }
        other => other.clone(),
    };

    let increment = match increment {
        Param::Null => None,
        Param::Number(_) if names.is_empty() => return Err(invalid_for(increment)),
        Param::Number(delta) => Some(Param::object(
            names
                .iter()
                .map(|name| (name.clone(), Param::Number(delta.clone()))),
        )),
        Param::Object(_) | Param::Handler(_) => Some(increment.clone()),
        other => return Err(invalid_for(other)),
    };

    Ok((init, condition, increment))
}

fn invalid_for(raw: &Param) -> FlowError {
    FlowError::new(
        "ITERATION_INVALID",
        format!(
            "for expects [init, limit or condition, increment] with named init variables, got {}.",
            describe(raw)
        ),
    )
}

/// Logical inverse of a condition param, including handlers and templates.
pub(crate) fn negate(condition: &Param) -> Param {
    match condition {
        Param::Handler(handler) => Param::Handler(handler.negated()),
        Param::String(template) if has_template(template) => {
            let template = template.clone();
            Param::Handler(Handler::from_vars(move |vars| {
                Value::Bool(!is_truthy(&Value::String(render_template(&template, vars))))
            }))
        }
        other => match other.to_value() {
            Some(value) => Param::Bool(!is_truthy(&value)),
            // A container with embedded handlers is always truthy.
            None => Param::Bool(false),
        },
    }
}
