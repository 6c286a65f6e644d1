use std::path::Path;

use cf_api::FlowEvent;
use cf_core::FlowError;

use crate::{
    create_app_for_project, emit_turn_with_saved_state, load_agent_state, load_project_by_ref,
    load_project_by_dialogs_dir, AgentArgs, AgentCommand, KeyArgs, MessageArgs, StartArgs,
};

pub(super) async fn run_agent(args: AgentArgs) -> Result<i32, FlowError> {
    match args.command {
        AgentCommand::Start(args) => run_start(args).await,
        AgentCommand::Postback(args) | AgentCommand::Payload(args) => run_key(args).await,
        AgentCommand::Message(args) => run_message(args).await,
    }
}

pub(super) async fn run_start(args: StartArgs) -> Result<i32, FlowError> {
    let project = load_project_by_dialogs_dir(&args.dialogs_dir, args.entry)?;
    let app = create_app_for_project(&project)?;

    let turn = app.begin(args.session_id).await?;
    emit_turn_with_saved_state(turn, &args.state_out, &project.id, app.entry())
}

/// Postback and payload keys share one lookup order in the dialog, so both
/// subcommands deliver the same event.
pub(super) async fn run_key(args: KeyArgs) -> Result<i32, FlowError> {
    run_state_transition(&args.state_in, &args.state_out, FlowEvent::reply(args.key, args.text)).await
}

pub(super) async fn run_message(args: MessageArgs) -> Result<i32, FlowError> {
    run_state_transition(
        &args.state_in,
        &args.state_out,
        FlowEvent::text(args.text, args.intent),
    )
    .await
}

async fn run_state_transition(
    state_in: &str,
    state_out: &str,
    event: FlowEvent,
) -> Result<i32, FlowError> {
    let state = load_agent_state(Path::new(state_in))?;
    let project = load_project_by_ref(&state.project_id, &state.entry_dialog)?;
    let app = create_app_for_project(&project)?;

    let turn = app.process(state.snapshot, event).await?;
    emit_turn_with_saved_state(turn, state_out, &state.project_id, &state.entry_dialog)
}
