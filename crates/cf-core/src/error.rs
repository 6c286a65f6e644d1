use thiserror::Error;

pub type FlowResult<T> = Result<T, FlowError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct FlowError {
    pub code: String,
    pub message: String,
    pub key: Option<String>,
}

impl FlowError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            key: None,
        }
    }

    pub fn with_key(
        code: impl Into<String>,
        message: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            key: Some(key.into()),
        }
    }
}
