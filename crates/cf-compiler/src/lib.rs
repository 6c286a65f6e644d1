//! Compiles normalized flows into a registry of key-addressed handlers.
//!
//! Every flow breaker hands its continuation over as a flow key, so a later,
//! unrelated request can resume it through the registry.

mod branch;
mod compile;
mod dialog;
mod dialog_ops;
mod iteration;
mod message;
mod options;
mod registry;
mod suggest;

pub use compile::{is_flow_breaker, FlowBuilder};
pub use dialog::{
    compile_dialog, CompiledDialog, DialogDefinition, INTENT_ID, ON_DEFAULT_ID, ON_START_ID,
};
pub use message::{has_reply, PAYLOAD_FIELD, POSTBACK_FIELD};
pub use options::CompileOptions;
pub use registry::{CompiledFlow, FlowRegistry, FlowRun, Signal, Step};
pub use suggest::{closest_key, with_suggestion};

#[cfg(test)]
mod tests;
