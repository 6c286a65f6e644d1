use cf_core::{value_to_text, ConditionalCommand, FlowPath, FlowResult, SwitchCommand};
use tracing::trace;

use crate::compile::{expand_param, next_steps, test_param, FlowBuilder};
use crate::options::CompileOptions;
use crate::registry::{FlowRun, Signal, Step};

impl FlowBuilder {
    pub(crate) fn compile_conditional(
        &mut self,
        conditional: &ConditionalCommand,
        path: &FlowPath,
        options: &CompileOptions,
    ) -> FlowResult<Step> {
        let then_key = self.compile_flow(&conditional.then, &path.append("then")?, options)?;
        let else_key = match &conditional.otherwise {
            Some(otherwise) => Some(self.compile_flow(otherwise, &path.append("else")?, options)?),
            None => options.next_flow.clone(),
        };

        let test = conditional.test.clone();
        let path = path.clone();
        Ok(Step::new(move |run: FlowRun| {
            let (test, path) = (test.clone(), path.clone());
            let (then_key, else_key) = (then_key.clone(), else_key.clone());
            async move {
                if test_param(&run, &test, &path).await? {
                    return Ok(Signal::Goto(then_key));
                }
                match else_key {
                    Some(key) => Ok(Signal::Goto(key)),
                    None => Ok(Signal::Next),
                }
            }
        }))
    }

    /// Cases fall through in order: each case continues into the next one,
    /// the last into `default` (or the end flow). `break` jumps to the end.
    pub(crate) fn compile_switch(
        &mut self,
        switch: &SwitchCommand,
        path: &FlowPath,
        options: &CompileOptions,
    ) -> FlowResult<Step> {
        let end_key = self.register(&path.append("end")?, next_steps(options), options)?;
        let case_options = |next: &str| CompileOptions {
            next_flow: Some(next.to_string()),
            break_flow: Some(end_key.clone()),
            continue_flow: options.continue_flow.clone(),
        };

        let default_key = match &switch.default {
            Some(default) => Some(self.compile_flow(
                default,
                &path.append("default")?,
                &case_options(&end_key),
            )?),
            None => None,
        };

        let mut next = default_key.clone().unwrap_or_else(|| end_key.clone());
        let mut cases = Vec::with_capacity(switch.cases.len());
        for case in switch.cases.iter().rev() {
            let key = self.compile_flow(
                &case.flow,
                &path.append(case.id.clone())?,
                &case_options(&next),
            )?;
            cases.push((case.id.to_string(), key.clone()));
            next = key;
        }
        cases.reverse();
        let fallback = default_key.unwrap_or(end_key);

        let value = switch.value.clone();
        let path = path.clone();
        Ok(Step::new(move |run: FlowRun| {
            let (value, path) = (value.clone(), path.clone());
            let (cases, fallback) = (cases.clone(), fallback.clone());
            async move {
                let selected = value_to_text(&expand_param(&run, &value, &path).await?);
                let key = cases
                    .iter()
                    .find(|(id, _)| *id == selected)
                    .map(|(_, key)| key)
                    .unwrap_or(&fallback);
                trace!(path = %path, case = %selected, flow = %key, "switch selected");
                Ok(Signal::goto(key.as_str()))
            }
        }))
    }
}
