/// Continuation targets threaded through compilation, as flow keys.
///
/// `break_flow` and `continue_flow` are only set while compiling inside a
/// loop body (or a switch case, for `break`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOptions {
    pub next_flow: Option<String>,
    pub break_flow: Option<String>,
    pub continue_flow: Option<String>,
}

impl CompileOptions {
    pub fn with_next(&self, next_flow: impl Into<String>) -> Self {
        Self {
            next_flow: Some(next_flow.into()),
            ..self.clone()
        }
    }

    pub fn with_break(&self, break_flow: impl Into<String>) -> Self {
        Self {
            break_flow: Some(break_flow.into()),
            ..self.clone()
        }
    }

    pub fn with_continue(&self, continue_flow: impl Into<String>) -> Self {
        Self {
            continue_flow: Some(continue_flow.into()),
            ..self.clone()
        }
    }

    /// Options for a flow that only continues to `next_flow`.
    pub fn next_only(next_flow: Option<String>) -> Self {
        Self {
            next_flow,
            ..Self::default()
        }
    }
}
