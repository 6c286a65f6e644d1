use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "convoflow")]
#[command(about = "Stateless conversational flow agent CLI")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Mode,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Mode {
    Agent(AgentArgs),
    /// Lists every compiled flow key and routing table entry.
    Inspect(InspectArgs),
}

#[derive(Debug, Args)]
pub(crate) struct AgentArgs {
    #[command(subcommand)]
    pub(crate) command: AgentCommand,
}

#[derive(Debug, Subcommand)]
pub(crate) enum AgentCommand {
    Start(StartArgs),
    Postback(KeyArgs),
    Payload(KeyArgs),
    Message(MessageArgs),
}

#[derive(Debug, Args)]
pub(crate) struct StartArgs {
    #[arg(long = "dialogs-dir")]
    pub(crate) dialogs_dir: String,
    #[arg(long = "entry")]
    pub(crate) entry: Option<String>,
    #[arg(long = "session-id", default_value = "local")]
    pub(crate) session_id: String,
    #[arg(long = "state-out")]
    pub(crate) state_out: String,
}

#[derive(Debug, Args)]
pub(crate) struct KeyArgs {
    #[arg(long = "state-in")]
    pub(crate) state_in: String,
    #[arg(long = "key")]
    pub(crate) key: String,
    /// Label of the pressed button, exposed to the flow as `text`.
    #[arg(long = "text")]
    pub(crate) text: Option<String>,
    #[arg(long = "state-out")]
    pub(crate) state_out: String,
}

#[derive(Debug, Args)]
pub(crate) struct MessageArgs {
    #[arg(long = "state-in")]
    pub(crate) state_in: String,
    #[arg(long = "text")]
    pub(crate) text: String,
    #[arg(long = "intent")]
    pub(crate) intent: Option<String>,
    #[arg(long = "state-out")]
    pub(crate) state_out: String,
}

#[derive(Debug, Args)]
pub(crate) struct InspectArgs {
    #[arg(long = "dialogs-dir")]
    pub(crate) dialogs_dir: String,
    #[arg(long = "entry")]
    pub(crate) entry: Option<String>,
}
