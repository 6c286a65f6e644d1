use cf_core::{Value, Vars};
use serde::{Deserialize, Serialize};

/// One inbound notification for the dialog on top of the stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowEvent {
    FrameStart,
    /// A child dialog finished with `result`; `tag` is the one it was
    /// started with.
    #[serde(alias = "frame_end")]
    FrameResult {
        dialog: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tag: Option<String>,
        #[serde(default)]
        result: Value,
    },
    /// A user message: a button key (postback or payload), free text, or a
    /// recognized intent.
    #[serde(alias = "frame_intent")]
    FrameMessage {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        intent: Option<String>,
    },
    FrameDefault,
}

impl FlowEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FrameStart => "frame_start",
            Self::FrameResult { .. } => "frame_result",
            Self::FrameMessage { .. } => "frame_message",
            Self::FrameDefault => "frame_default",
        }
    }

    pub fn key(key: impl Into<String>) -> Self {
        Self::FrameMessage {
            key: Some(key.into()),
            text: None,
            intent: None,
        }
    }

    /// A pressed button together with the label the user saw. Generated
    /// replies share their message's key, so the label tells them apart.
    pub fn reply(key: impl Into<String>, text: Option<String>) -> Self {
        Self::FrameMessage {
            key: Some(key.into()),
            text,
            intent: None,
        }
    }

    pub fn text(text: impl Into<String>, intent: Option<String>) -> Self {
        Self::FrameMessage {
            key: None,
            text: Some(text.into()),
            intent,
        }
    }

    /// Request-scoped vars the event exposes to handlers.
    pub fn volatiles(&self) -> Vars {
        let mut volatiles = Vars::new();
        if let Self::FrameMessage { text, intent, .. } = self {
            if let Some(text) = text {
                volatiles.insert("text".to_string(), Value::from(text.as_str()));
            }
            if let Some(intent) = intent {
                volatiles.insert("intent".to_string(), Value::from(intent.as_str()));
            }
        }
        volatiles
    }
}
