use std::ffi::OsString;

use clap::Parser;
use cf_core::FlowError;
use tracing_subscriber::EnvFilter;

mod agent;
mod boundary_runner;
mod cli_args;
mod error_map;
mod inspect;
mod models;
mod session_ops;
mod source_loader;
mod state_store;

pub(crate) use boundary_runner::{boundary_from_turn, emit_boundary, emit_inspect};
pub(crate) use cli_args::{
    AgentArgs, AgentCommand, Cli, InspectArgs, KeyArgs, MessageArgs, Mode, StartArgs,
};
pub(crate) use error_map::{emit_error, CliStage};
pub(crate) use models::{
    AgentState, BoundaryEvent, BoundaryResult, LoadedProject, AGENT_STATE_SCHEMA,
};
pub(crate) use session_ops::{create_app_for_project, emit_turn_with_saved_state};
pub(crate) use source_loader::{load_project_by_dialogs_dir, load_project_by_ref};
#[cfg(test)]
pub(crate) use source_loader::{
    make_dialogs_dir_project_id, read_dialogs_json_from_dir, resolve_dialogs_dir,
};
pub(crate) use state_store::{load_agent_state, save_agent_state};

pub fn run_cli_from_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return error.exit_code();
        }
    };
    init_logging();
    match run(cli) {
        Ok(code) => code,
        Err(error) => emit_error(error),
    }
}

/// Logs go to stderr; stdout carries the line protocol.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<i32, FlowError> {
    match cli.command {
        Mode::Agent(args) => run_agent(args),
        Mode::Inspect(args) => inspect::run_inspect(args),
    }
}

fn run_agent(args: AgentArgs) -> Result<i32, FlowError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| CliStage::Runtime.fail(error))?;
    runtime.block_on(agent::run_agent(args))
}
