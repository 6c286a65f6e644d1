use std::fmt::Display;
use std::path::Path;

use cf_core::FlowError;

/// The part of an agent invocation that failed outside the flow engine.
/// Each stage reports under one stable `CLI_*` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CliStage {
    Runtime,
    DialogsDir,
    DialogScan,
    DialogRead,
    StateWrite,
    StateRead,
    StateDecode,
}

impl CliStage {
    pub(crate) fn code(self) -> &'static str {
        match self {
            Self::Runtime => "CLI_RUNTIME",
            Self::DialogsDir => "CLI_SOURCE_PATH",
            Self::DialogScan => "CLI_SOURCE_SCAN",
            Self::DialogRead => "CLI_SOURCE_READ",
            Self::StateWrite => "CLI_STATE_WRITE",
            Self::StateRead => "CLI_STATE_READ",
            Self::StateDecode => "CLI_STATE_INVALID",
        }
    }

    fn action(self) -> &'static str {
        match self {
            Self::Runtime => "start the flow runtime",
            Self::DialogsDir => "resolve dialogs directory",
            Self::DialogScan => "scan dialog source",
            Self::DialogRead => "read dialog source",
            Self::StateWrite => "write agent state",
            Self::StateRead => "read agent state",
            Self::StateDecode => "decode agent state",
        }
    }

    pub(crate) fn fail(self, error: impl Display) -> FlowError {
        FlowError::new(self.code(), format!("Failed to {}: {}", self.action(), error))
    }

    /// Like [`fail`](Self::fail), naming the file or directory involved.
    pub(crate) fn fail_at(self, path: &Path, error: impl Display) -> FlowError {
        FlowError::new(
            self.code(),
            format!("Failed to {} {}: {}", self.action(), path.display(), error),
        )
    }
}

/// Prints the error block of the line protocol. Errors raised by a flow
/// also name the flow key they concern.
pub(crate) fn emit_error(error: FlowError) -> i32 {
    println!("RESULT:ERROR");
    println!("ERROR_CODE:{}", error.code);
    if let Some(key) = &error.key {
        println!("ERROR_FLOW_KEY:{}", key);
    }
    println!("ERROR_MSG_JSON:{}", json_line(&error.message));
    1
}

/// JSON-encodes one string for a protocol line.
pub(crate) fn json_line(text: &str) -> String {
    serde_json::Value::from(text).to_string()
}
