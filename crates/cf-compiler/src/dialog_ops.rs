use std::time::Duration;

use cf_core::{
    as_f64, type_name, FlowError, FlowPath, FlowResult, Param, StartCommand, StartTarget, Value,
    Vars, WILDCARD_DIALOG,
};
use cf_runtime::Expander;
use tracing::debug;

use crate::compile::{expand_param, FlowBuilder};
use crate::options::CompileOptions;
use crate::registry::{FlowRun, Signal, Step};

impl FlowBuilder {
    /// Registers the `then` continuation (empty when absent, so the parent
    /// still resumes) as the result handler tagged with its own key.
    pub(crate) fn compile_start(
        &mut self,
        start: &StartCommand,
        path: &FlowPath,
        options: &CompileOptions,
    ) -> FlowResult<Step> {
        let then = start.then.clone().unwrap_or_default();
        let tag = self.compile_flow(&then, &path.append("then")?, options)?;
        let bound_dialog = match &start.target {
            StartTarget::Named { dialog, .. } => dialog.as_str(),
            StartTarget::Computed(_) => WILDCARD_DIALOG,
        };
        self.registry_mut()
            .add_result_handler(bound_dialog, &tag, &tag)?;

        let target = start.target.clone();
        let path = path.clone();
        Ok(Step::new(move |run: FlowRun| {
            let (target, path, tag) = (target.clone(), path.clone(), tag.clone());
            async move {
                let (dialog, locals) = resolve_start(&run, &target, &path).await?;
                debug!(dialog = %dialog, tag = %tag, "starting dialog");
                run.session.start(&dialog, Some(&tag), locals).await?;
                Ok(Signal::Next)
            }
        }))
    }
}

async fn resolve_start(
    run: &FlowRun,
    target: &StartTarget,
    path: &FlowPath,
) -> FlowResult<(String, Option<Vars>)> {
    match target {
        StartTarget::Named { dialog, args } => {
            let locals = match args {
                Some(args) => start_locals(expand_param(run, args, path).await?)?,
                None => None,
            };
            Ok((dialog.clone(), locals))
        }
        StartTarget::Computed(param) => computed_start(expand_param(run, param, path).await?),
    }
}

fn computed_start(value: Value) -> FlowResult<(String, Option<Vars>)> {
    match value {
        Value::String(dialog) if !dialog.trim().is_empty() => Ok((dialog, None)),
        Value::Array(mut parts) if (1..=2).contains(&parts.len()) => {
            let args = if parts.len() == 2 { parts.pop() } else { None };
            match parts.pop() {
                Some(Value::String(dialog)) if !dialog.trim().is_empty() => {
                    Ok((dialog, start_locals(args.unwrap_or_default())?))
                }
                other => Err(invalid_start(other.unwrap_or_default())),
            }
        }
        Value::Object(mut map) => match map.get("dialog").cloned() {
            Some(Value::String(dialog)) if !dialog.trim().is_empty() => {
                let args = map.shift_remove("args").unwrap_or_default();
                Ok((dialog, start_locals(args)?))
            }
            _ => Err(invalid_start(Value::Object(map))),
        },
        other => Err(invalid_start(other)),
    }
}

fn start_locals(args: Value) -> FlowResult<Option<Vars>> {
    match args {
        Value::Null => Ok(None),
        Value::Object(locals) => Ok(Some(locals)),
        other => Err(FlowError::new(
            "START_PARAM_INVALID",
            format!("Start args must expand to an object, got {}.", type_name(&other)),
        )),
    }
}

fn invalid_start(value: Value) -> FlowError {
    FlowError::new(
        "START_PARAM_INVALID",
        format!("Cannot start a dialog from {}.", value),
    )
}

pub(crate) fn finish_step(result: Param, path: FlowPath) -> Step {
    Step::new(move |run: FlowRun| {
        let (result, path) = (result.clone(), path.clone());
        async move {
            let result = expand_param(&run, &result, &path).await?;
            debug!(path = %path, "finishing dialog");
            run.session.finish(result).await?;
            Ok(Signal::Next)
        }
    })
}

pub(crate) fn set_step(values: Param, path: FlowPath) -> Step {
    Step::new(move |run: FlowRun| {
        let (values, path) = (values.clone(), path.clone());
        async move {
            let vars = run.vars();
            let assignments = Expander::new(run.handlers())
                .expand_set(&values, &vars, &run.session, &path)
                .await?;
            run.session.set(assignments).await?;
            Ok(Signal::Next)
        }
    })
}

pub(crate) fn exec_step(name: String, args: Option<Param>, path: FlowPath) -> Step {
    Step::new(move |run: FlowRun| {
        let (name, args, path) = (name.clone(), args.clone(), path.clone());
        async move {
            let vars = run.vars();
            Expander::new(run.handlers())
                .call_exec(&name, args.as_ref(), &vars, &run.session, &path)
                .await?;
            Ok(Signal::Next)
        }
    })
}

/// Sleeps in-process for the given number of milliseconds.
pub(crate) fn wait_step(delay: Param, path: FlowPath) -> Step {
    Step::new(move |run: FlowRun| {
        let (delay, path) = (delay.clone(), path.clone());
        async move {
            let value = expand_param(&run, &delay, &path).await?;
            let millis = as_f64(&value).ok_or_else(|| {
                FlowError::new(
                    "WAIT_PARAM_INVALID",
                    format!("wait at {} expects milliseconds, got {}.", path, value),
                )
            })?;
            if millis > 0.0 {
                tokio::time::sleep(Duration::from_millis(millis as u64)).await;
            }
            Ok(Signal::Next)
        }
    })
}
