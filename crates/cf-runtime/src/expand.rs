use std::sync::OnceLock;

use cf_core::{
    render_template, FlowError, FlowPath, FlowResult, HandlerTable, Param, ParamMap, SessionRef,
    Value, Vars,
};
use futures::future::{try_join_all, BoxFuture, FutureExt};
use regex::Regex;
use tracing::trace;

pub const EXEC_KEY: &str = "exec";

fn destructure_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^\{\s*([^{}]+?)\s*\}$").expect("destructure regex must compile")
    })
}

/// Names bound by a destructuring `set` key such as `"{a, b}"`.
pub fn destructure_names(key: &str) -> Option<Vec<String>> {
    let caps = destructure_regex().captures(key.trim())?;
    let names = caps[1]
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    (!names.is_empty()).then_some(names)
}

/// Resolves params against the variable environment of one handler call.
///
/// Expansion only reads `vars`; the sole side effects are the handlers it
/// invokes, including the named `exec` handlers of the owning dialog.
#[derive(Clone, Copy)]
pub struct Expander<'a> {
    handlers: &'a HandlerTable,
}

impl<'a> Expander<'a> {
    pub fn new(handlers: &'a HandlerTable) -> Self {
        Self { handlers }
    }

    /// `Ok(None)` is the undefined result: a handler returned nothing.
    pub fn expand<'b>(
        &'b self,
        param: &'b Param,
        vars: &'b Vars,
        session: &'b SessionRef,
        path: &'b FlowPath,
    ) -> BoxFuture<'b, FlowResult<Option<Value>>>
    where
        'a: 'b,
    {
        async move {
            match param {
                Param::Handler(handler) => {
                    trace!(path = %path, "expanding handler param");
                    handler.call(vars.clone(), session.clone(), path.clone()).await
                }
                Param::Array(items) => {
                    let values = try_join_all(
                        items
                            .iter()
                            .map(|item| self.expand(item, vars, session, path)),
                    )
                    .await?;
                    Ok(Some(Value::Array(
                        values
                            .into_iter()
                            .map(Option::unwrap_or_default)
                            .collect(),
                    )))
                }
                Param::Object(map) if map.contains_key(EXEC_KEY) => {
                    self.expand_exec(map, vars, session, path).await.map(Some)
                }
                Param::Object(map) => self.expand_object(map, vars, session, path).await.map(Some),
                Param::String(template) => Ok(Some(Value::String(render_template(template, vars)))),
                literal => Ok(literal.to_value()),
            }
        }
        .boxed()
    }

    /// Like [`expand`](Self::expand) but maps the undefined result to `null`.
    pub async fn expand_value(
        &self,
        param: &Param,
        vars: &Vars,
        session: &SessionRef,
        path: &FlowPath,
    ) -> FlowResult<Value> {
        Ok(self
            .expand(param, vars, session, path)
            .await?
            .unwrap_or_default())
    }

    async fn expand_object(
        &self,
        map: &ParamMap,
        vars: &Vars,
        session: &SessionRef,
        path: &FlowPath,
    ) -> FlowResult<Value> {
        let values = try_join_all(
            map.iter()
                .map(|(_, value)| self.expand(value, vars, session, path)),
        )
        .await?;

        let mut object = Vars::new();
        for ((key, _), value) in map.iter().zip(values) {
            if let Some(value) = value {
                object.insert(key.clone(), value);
            }
        }
        Ok(Value::Object(object))
    }

    /// Calls a named handler with `{...vars, ...args}`.
    pub async fn call_exec(
        &self,
        name: &str,
        args: Option<&Param>,
        vars: &Vars,
        session: &SessionRef,
        path: &FlowPath,
    ) -> FlowResult<Option<Value>> {
        let handler = self.handlers.get(name).ok_or_else(|| {
            FlowError::new(
                "EXEC_HANDLER_UNDEFINED",
                format!("Undefined handler {:?}.", name),
            )
        })?;

        let mut merged = vars.clone();
        if let Some(args) = args {
            match self.expand(args, vars, session, path).await? {
                Some(Value::Object(args)) => merged.extend(args),
                None | Some(Value::Null) => {}
                Some(other) => {
                    return Err(FlowError::new(
                        "EXEC_ARGS_INVALID",
                        format!(
                            "Arguments of handler {:?} must expand to an object, got {}.",
                            name,
                            cf_core::type_name(&other)
                        ),
                    ))
                }
            }
        }

        trace!(handler = name, path = %path, "calling exec handler");
        handler.call(merged, session.clone(), path.clone()).await
    }

    async fn expand_exec(
        &self,
        map: &ParamMap,
        vars: &Vars,
        session: &SessionRef,
        path: &FlowPath,
    ) -> FlowResult<Value> {
        let (name, args) = match map.get(EXEC_KEY) {
            Some(Param::String(name)) => (name.as_str(), None),
            Some(Param::Array(parts)) => match parts.as_slice() {
                [Param::String(name)] => (name.as_str(), None),
                [Param::String(name), args] => (name.as_str(), Some(args)),
                _ => return Err(invalid_exec()),
            },
            _ => return Err(invalid_exec()),
        };
        Ok(self
            .call_exec(name, args, vars, session, path)
            .await?
            .unwrap_or_default())
    }

    /// Expands the param of a `set` command into the assignments it makes.
    ///
    /// A key of the form `"{a, b}"` destructures: its value is expanded once
    /// and members `a` and `b` are assigned individually.
    pub async fn expand_set(
        &self,
        param: &Param,
        vars: &Vars,
        session: &SessionRef,
        path: &FlowPath,
    ) -> FlowResult<Vars> {
        let map = match param {
            Param::Object(map) if !map.contains_key(EXEC_KEY) => map,
            other => {
                return match self.expand(other, vars, session, path).await? {
                    Some(Value::Object(values)) => Ok(values),
                    None | Some(Value::Null) => Ok(Vars::new()),
                    Some(other) => Err(invalid_set(&other)),
                }
            }
        };

        let values = try_join_all(
            map.iter()
                .map(|(_, value)| self.expand(value, vars, session, path)),
        )
        .await?;

        let mut assignments = Vars::new();
        for ((key, _), value) in map.iter().zip(values) {
            let Some(names) = destructure_names(key) else {
                if let Some(value) = value {
                    assignments.insert(key.clone(), value);
                }
                continue;
            };

            let members = match value {
                Some(Value::Object(members)) => members,
                None | Some(Value::Null) => Vars::new(),
                Some(other) => {
                    return Err(FlowError::new(
                        "SET_DESTRUCTURE_INVALID",
                        format!(
                            "Destructuring key {:?} needs an object value, got {}.",
                            key,
                            cf_core::type_name(&other)
                        ),
                    ))
                }
            };
            for name in names {
                let value = members.get(&name).cloned().unwrap_or_default();
                assignments.insert(name, value);
            }
        }
        Ok(assignments)
    }
}

fn invalid_exec() -> FlowError {
    FlowError::new(
        "EXEC_PARAM_INVALID",
        "exec expects a handler name or a [name, args] tuple.",
    )
}

fn invalid_set(value: &Value) -> FlowError {
    FlowError::new(
        "SET_PARAM_INVALID",
        format!(
            "set expects an object of assignments, got {}.",
            cf_core::type_name(value)
        ),
    )
}
