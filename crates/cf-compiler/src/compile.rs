use cf_core::{
    is_truthy, Command, Flow, FlowError, FlowKeyer, FlowPath, FlowResult, HandlerTable, Param,
    Value,
};
use cf_runtime::Expander;
use tracing::trace;

use crate::dialog_ops::{exec_step, finish_step, set_step, wait_step};
use crate::options::CompileOptions;
use crate::registry::{CompiledFlow, FlowRegistry, FlowRun, Signal, Step};

const CONTINUATION_PREFIX: &str = "flow";

/// A `thenFlow` reference, validated once the whole dialog is compiled.
#[derive(Debug, Clone)]
struct FlowReference {
    key: String,
    origin: FlowPath,
}

/// Compiles the flows of one dialog into its registry.
#[derive(Debug)]
pub struct FlowBuilder {
    registry: FlowRegistry,
    flow_counter: usize,
    flow_refs: Vec<FlowReference>,
}

impl FlowBuilder {
    pub fn new(dialog: impl Into<String>, handlers: HandlerTable) -> Self {
        Self {
            registry: FlowRegistry::new(dialog, handlers),
            flow_counter: 0,
            flow_refs: Vec::new(),
        }
    }

    pub fn keyer(&self) -> &FlowKeyer {
        self.registry.keyer()
    }

    pub fn registry_mut(&mut self) -> &mut FlowRegistry {
        &mut self.registry
    }

    pub fn flow_key(&self, path: &FlowPath) -> FlowResult<String> {
        self.registry.keyer().flow_key(path)
    }

    /// Compiles `flow` under `path`, registers it and returns its flow key.
    pub fn compile_flow(
        &mut self,
        flow: &Flow,
        path: &FlowPath,
        options: &CompileOptions,
    ) -> FlowResult<String> {
        self.compile_commands(&flow.commands, path, options, None)
    }

    /// Like [`compile_flow`](Self::compile_flow), with `tail` run after the
    /// last command of the sequence, wherever continuation splitting puts it.
    pub(crate) fn compile_commands(
        &mut self,
        commands: &[Command],
        path: &FlowPath,
        options: &CompileOptions,
        tail: Option<Step>,
    ) -> FlowResult<String> {
        let steps = self.compile_sequence(commands, path, options, tail)?;
        self.register(path, steps, options)
    }

    pub(crate) fn register(
        &mut self,
        path: &FlowPath,
        steps: Vec<Step>,
        options: &CompileOptions,
    ) -> FlowResult<String> {
        let key = self.flow_key(path)?;
        self.registry.add_flow_handler(CompiledFlow::new(
            key,
            path.clone(),
            steps,
            options.break_flow.clone(),
            options.continue_flow.clone(),
        ))
    }

    /// Records a `thenFlow` target and returns its qualified key.
    pub(crate) fn reference_flow(&mut self, target: &str, origin: &FlowPath) -> FlowResult<String> {
        let key = self.keyer().flow_key(target)?;
        self.flow_refs.push(FlowReference {
            key: key.clone(),
            origin: origin.clone(),
        });
        Ok(key)
    }

    /// Checks every recorded reference and hands over the registry.
    pub fn finish(self) -> FlowResult<FlowRegistry> {
        for reference in &self.flow_refs {
            self.registry
                .get_flow_handler(&reference.key)
                .map_err(|error| FlowError {
                    message: format!("{} (referenced from {})", error.message, reference.origin),
                    ..error
                })?;
        }
        Ok(self.registry)
    }

    /// Compiles commands in order up to the first flow breaker. Whatever
    /// follows the breaker becomes a separately registered continuation that
    /// the breaker resumes by key.
    fn compile_sequence(
        &mut self,
        commands: &[Command],
        base: &FlowPath,
        options: &CompileOptions,
        tail: Option<Step>,
    ) -> FlowResult<Vec<Step>> {
        let mut steps = Vec::with_capacity(commands.len() + 2);
        for (index, command) in commands.iter().enumerate() {
            if !is_flow_breaker(command) {
                steps.push(self.compile_command(command, base, options)?);
                continue;
            }

            let rest = &commands[index + 1..];
            let breaker_options = if rest.is_empty() && tail.is_none() {
                options.clone()
            } else {
                let next = self.compile_continuation(rest, base, options, tail)?;
                options.with_next(next)
            };
            steps.push(self.compile_command(command, base, &breaker_options)?);
            return Ok(steps);
        }

        steps.extend(tail);
        steps.extend(next_steps(options));
        Ok(steps)
    }

    fn compile_continuation(
        &mut self,
        rest: &[Command],
        base: &FlowPath,
        options: &CompileOptions,
        tail: Option<Step>,
    ) -> FlowResult<String> {
        if let [Command::SubFlow(sub_flow)] = rest {
            let path = base.append(sub_flow.id.clone())?;
            return self.compile_commands(&sub_flow.flow.commands, &path, options, tail);
        }
        let path = base.append(self.next_flow_id())?;
        self.compile_commands(rest, &path, options, tail)
    }

    fn next_flow_id(&mut self) -> String {
        self.flow_counter += 1;
        format!("{}{}", CONTINUATION_PREFIX, self.flow_counter)
    }

    fn compile_command(
        &mut self,
        command: &Command,
        base: &FlowPath,
        options: &CompileOptions,
    ) -> FlowResult<Step> {
        let Some(id) = command.id() else {
            let Command::Handler(handler) = command else {
                return Err(FlowError::new(
                    "COMMAND_UNRECOGNIZED",
                    format!("Command {} has no id.", command.type_name()),
                ));
            };
            return Ok(handler_step(handler.clone(), base.clone()));
        };

        let path = base.append(id.clone())?;
        trace!(path = %path, kind = command.type_name(), "compiling command");
        match command {
            Command::Message(message) => self.compile_message(message, &path, options),
            Command::Conditional(conditional) => {
                self.compile_conditional(conditional, &path, options)
            }
            Command::Switch(switch) => self.compile_switch(switch, &path, options),
            Command::Iteration(iteration) => self.compile_iteration(iteration, &path, options),
            Command::Start(start) => self.compile_start(start, &path, options),
            Command::Finish(finish) => Ok(finish_step(finish.result.clone(), path)),
            Command::Set(set) => Ok(set_step(set.values.clone(), path)),
            Command::Exec(exec) => Ok(exec_step(exec.name.clone(), exec.args.clone(), path)),
            Command::Wait(wait) => Ok(wait_step(wait.delay.clone(), path)),
            Command::Break(_) => loop_signal_step(Signal::Break, &options.break_flow, &path),
            Command::Continue(_) => {
                loop_signal_step(Signal::Continue, &options.continue_flow, &path)
            }
            Command::SubFlow(sub_flow) => {
                let key = self.compile_flow(&sub_flow.flow, &path, options)?;
                Ok(Step::goto(key))
            }
            Command::Handler(handler) => Ok(handler_step(handler.clone(), base.clone())),
        }
    }
}

/// Commands whose completion depends on a later event, or that transfer
/// control themselves.
pub fn is_flow_breaker(command: &Command) -> bool {
    match command {
        Command::Conditional(_)
        | Command::Switch(_)
        | Command::Iteration(_)
        | Command::Start(_)
        | Command::Finish(_)
        | Command::Break(_)
        | Command::Continue(_)
        | Command::SubFlow(_) => true,
        Command::Message(message) => message.has_dynamic_parts() || message.has_reply_actions(),
        Command::Set(_) | Command::Exec(_) | Command::Wait(_) | Command::Handler(_) => false,
    }
}

/// The steps a flow ends with when nothing broke it: resume `next_flow`.
pub(crate) fn next_steps(options: &CompileOptions) -> Vec<Step> {
    options.next_flow.iter().cloned().map(Step::goto).collect()
}

pub(crate) async fn expand_param(run: &FlowRun, param: &Param, path: &FlowPath) -> FlowResult<Value> {
    let vars = run.vars();
    Expander::new(run.handlers())
        .expand_value(param, &vars, &run.session, path)
        .await
}

pub(crate) async fn test_param(run: &FlowRun, param: &Param, path: &FlowPath) -> FlowResult<bool> {
    Ok(is_truthy(&expand_param(run, param, path).await?))
}

fn loop_signal_step(signal: Signal, target: &Option<String>, path: &FlowPath) -> FlowResult<Step> {
    if target.is_none() {
        let name = match signal {
            Signal::Continue => "continue",
            _ => "break",
        };
        return Err(FlowError::new(
            "FLOW_BREAK_OUTSIDE_LOOP",
            format!("{} at {} is only valid inside a loop body.", name, path),
        ));
    }
    Ok(Step::new(move |_run: FlowRun| {
        let signal = signal.clone();
        async move { Ok(signal) }
    }))
}

fn handler_step(handler: cf_core::Handler, path: FlowPath) -> Step {
    Step::new(move |run: FlowRun| {
        let pending = handler.call(run.vars(), run.session.clone(), path.clone());
        async move {
            pending.await?;
            Ok(Signal::Next)
        }
    })
}
