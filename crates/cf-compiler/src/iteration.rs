use cf_core::{
    as_f64, lookup_path, number_value, FlowError, FlowPath, FlowResult, IterationCommand, Param,
    Vars,
};
use cf_runtime::{Expander, EXEC_KEY};

use crate::compile::{next_steps, test_param, FlowBuilder};
use crate::options::CompileOptions;
use crate::registry::{FlowRun, Signal, Step};

impl FlowBuilder {
    /// Registers `loop` (test), `do` (body then increment), `continue`
    /// (increment then test) and `end` (exit) under the iteration's path.
    /// The entry step runs the initializer and enters `loop`.
    pub(crate) fn compile_iteration(
        &mut self,
        iteration: &IterationCommand,
        path: &FlowPath,
        options: &CompileOptions,
    ) -> FlowResult<Step> {
        let loop_path = path.append("loop")?;
        let do_path = path.append("do")?;
        let loop_key = self.flow_key(&loop_path)?;
        let do_key = self.flow_key(&do_path)?;

        let end_key = self.register(&path.append("end")?, next_steps(options), options)?;

        let increment = iteration
            .increment
            .clone()
            .map(|increment| increment_step(increment, path.clone()));
        let mut continue_steps = increment.iter().cloned().collect::<Vec<_>>();
        continue_steps.push(Step::goto(loop_key.clone()));
        let continue_key = self.register(
            &path.append("continue")?,
            continue_steps,
            &CompileOptions::default(),
        )?;

        let body_options = CompileOptions {
            next_flow: Some(loop_key.clone()),
            break_flow: Some(end_key.clone()),
            continue_flow: Some(continue_key),
        };
        self.compile_commands(&iteration.body.commands, &do_path, &body_options, increment)?;

        let condition = iteration.condition.clone();
        let test_path = path.clone();
        let test = Step::new(move |run: FlowRun| {
            let (condition, path) = (condition.clone(), test_path.clone());
            let (do_key, end_key) = (do_key.clone(), end_key.clone());
            async move {
                Ok(Signal::Goto(if test_param(&run, &condition, &path).await? {
                    do_key
                } else {
                    end_key
                }))
            }
        });
        self.register(&loop_path, vec![test], &CompileOptions::default())?;

        let init = iteration.init.clone();
        let path = path.clone();
        Ok(Step::new(move |run: FlowRun| {
            let (init, path, loop_key) = (init.clone(), path.clone(), loop_key.clone());
            async move {
                if let Some(init) = init {
                    let vars = run.vars();
                    let values = Expander::new(run.handlers())
                        .expand_set(&init, &vars, &run.session, &path)
                        .await?;
                    run.session.set(values).await?;
                }
                Ok(Signal::Goto(loop_key))
            }
        }))
    }
}

/// An object of numeric deltas adds to the current values; anything else is
/// expanded like a `set` and assigned.
fn increment_step(increment: Param, path: FlowPath) -> Step {
    Step::new(move |run: FlowRun| {
        let (increment, path) = (increment.clone(), path.clone());
        async move {
            let vars = run.vars();
            let expander = Expander::new(run.handlers());
            let updates = match &increment {
                Param::Object(deltas) if !deltas.contains_key(EXEC_KEY) => {
                    let mut updates = Vars::new();
                    for (name, delta) in deltas.iter() {
                        let delta = expander
                            .expand_value(delta, &vars, &run.session, &path)
                            .await?;
                        let delta = as_f64(&delta).ok_or_else(|| {
                            FlowError::new(
                                "ITERATION_INCREMENT_INVALID",
                                format!("Increment of {:?} at {} is not a number: {}.", name, path, delta),
                            )
                        })?;
                        let current = lookup_path(&vars, name).and_then(as_f64).unwrap_or(0.0);
                        updates.insert(name.clone(), number_value(current + delta));
                    }
                    updates
                }
                other => {
                    expander
                        .expand_set(other, &vars, &run.session, &path)
                        .await?
                }
            };
            run.session.set(updates).await?;
            Ok(Signal::Next)
        }
    })
}
