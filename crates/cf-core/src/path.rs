use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{FlowError, FlowResult};

pub const FLOW_ID_RESET_PREFIX: char = '#';

fn flow_id_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[#]?[^.#:|\r\n]+$").expect("flow id regex must compile"))
}

/// One segment of a flow path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlowId {
    Index(usize),
    Name(String),
}

impl FlowId {
    pub fn is_reset(&self) -> bool {
        matches!(self, Self::Name(name) if name.starts_with(FLOW_ID_RESET_PREFIX))
    }

    pub fn validate(&self) -> FlowResult<()> {
        match self {
            Self::Index(_) => Ok(()),
            Self::Name(name) if flow_id_regex().is_match(name) => Ok(()),
            Self::Name(name) => Err(FlowError::new(
                "FLOW_PATH_ID_INVALID",
                format!(
                    "Invalid flow path id {:?}: ids must be non-empty and must not contain '.', '#', ':', '|' or line breaks.",
                    name
                ),
            )),
        }
    }

    fn key_segment(&self) -> String {
        match self {
            Self::Index(index) => index.to_string(),
            Self::Name(name) => name
                .strip_prefix(FLOW_ID_RESET_PREFIX)
                .unwrap_or(name)
                .to_string(),
        }
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{}", index),
            Self::Name(name) => f.write_str(name),
        }
    }
}

impl From<&str> for FlowId {
    fn from(value: &str) -> Self {
        Self::Name(value.to_string())
    }
}

impl From<String> for FlowId {
    fn from(value: String) -> Self {
        Self::Name(value)
    }
}

impl From<&String> for FlowId {
    fn from(value: &String) -> Self {
        Self::Name(value.clone())
    }
}

impl From<usize> for FlowId {
    fn from(value: usize) -> Self {
        Self::Index(value)
    }
}

/// Position of a compiled flow in the dialog tree, rooted at an entry point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowPath(Vec<FlowId>);

impl FlowPath {
    pub fn root(id: impl Into<FlowId>) -> FlowResult<Self> {
        append_flow_path_id(&Self::default(), [id])
    }

    pub fn ids(&self) -> &[FlowId] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&FlowId> {
        self.0.last()
    }

    pub fn append(&self, id: impl Into<FlowId>) -> FlowResult<Self> {
        append_flow_path_id(self, [id])
    }
}

impl fmt::Display for FlowPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".");
        f.write_str(&joined)
    }
}

impl FromIterator<FlowId> for FlowPath {
    fn from_iter<T: IntoIterator<Item = FlowId>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Appends ids to a path. A `#`-prefixed id discards everything accumulated
/// so far and starts a new absolute path.
pub fn append_flow_path_id<I, T>(path: &FlowPath, ids: I) -> FlowResult<FlowPath>
where
    I: IntoIterator<Item = T>,
    T: Into<FlowId>,
{
    let mut segments = path.0.clone();
    for id in ids {
        let id = id.into();
        id.validate()?;
        if id.is_reset() {
            segments.clear();
        }
        segments.push(id);
    }
    Ok(FlowPath(segments))
}

/// Anything `FlowKeyer::flow_key` accepts.
#[derive(Debug, Clone, Copy)]
pub enum FlowRef<'a> {
    Path(&'a FlowPath),
    Text(&'a str),
}

impl<'a> From<&'a FlowPath> for FlowRef<'a> {
    fn from(value: &'a FlowPath) -> Self {
        Self::Path(value)
    }
}

impl<'a> From<&'a str> for FlowRef<'a> {
    fn from(value: &'a str) -> Self {
        Self::Text(value)
    }
}

impl<'a> From<&'a String> for FlowRef<'a> {
    fn from(value: &'a String) -> Self {
        Self::Text(value.as_str())
    }
}

/// Renders flow paths into dialog-qualified keys (`Dialog:a.b.c`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowKeyer {
    dialog: String,
}

impl FlowKeyer {
    pub fn new(dialog: impl Into<String>) -> Self {
        Self {
            dialog: dialog.into(),
        }
    }

    pub fn dialog(&self) -> &str {
        &self.dialog
    }

    pub fn flow_key<'a>(&self, target: impl Into<FlowRef<'a>>) -> FlowResult<String> {
        match target.into() {
            FlowRef::Path(path) => self.render(path),
            FlowRef::Text(text) => self.resolve_text(text),
        }
    }

    fn render(&self, path: &FlowPath) -> FlowResult<String> {
        if path.is_empty() {
            return Err(FlowError::new(
                "FLOW_KEY_INVALID",
                "Cannot derive a flow key from an empty path.",
            ));
        }
        for id in path.ids() {
            id.validate()?;
        }

        let start = path.ids().iter().rposition(FlowId::is_reset).unwrap_or(0);
        let body = path.ids()[start..]
            .iter()
            .map(FlowId::key_segment)
            .collect::<Vec<_>>()
            .join(".");
        Ok(format!("{}:{}", self.dialog, body))
    }

    fn resolve_text(&self, text: &str) -> FlowResult<String> {
        let parts = text.split(':').collect::<Vec<_>>();
        let relative = match parts.as_slice() {
            [relative] => *relative,
            [dialog, relative] if *dialog == self.dialog => *relative,
            [dialog, _] => {
                return Err(FlowError::with_key(
                    "FLOW_KEY_INVALID",
                    format!(
                        "Flow key {:?} belongs to dialog {:?}, expected {:?}.",
                        text, dialog, self.dialog
                    ),
                    text,
                ))
            }
            _ => {
                return Err(FlowError::with_key(
                    "FLOW_KEY_INVALID",
                    format!("Flow key {:?} must contain at most one ':'.", text),
                    text,
                ))
            }
        };

        if relative.split('.').any(str::is_empty) {
            return Err(FlowError::with_key(
                "FLOW_KEY_INVALID",
                format!("Flow key {:?} has an empty segment.", text),
                text,
            ));
        }

        let path = append_flow_path_id(&FlowPath::default(), relative.split('.'))?;
        self.render(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(ids: &[&str]) -> FlowPath {
        append_flow_path_id(&FlowPath::default(), ids.iter().copied()).expect("valid path")
    }

    #[test]
    fn flow_key_joins_path_under_dialog() {
        let keyer = FlowKeyer::new("D");
        assert_eq!(keyer.flow_key(&path(&["a", "b", "c"])).expect("key"), "D:a.b.c");
    }

    #[test]
    fn reset_id_discards_ancestors() {
        let keyer = FlowKeyer::new("D");
        let reset = path(&["a", "b", "#c"]);
        assert_eq!(reset.ids().len(), 1);
        assert_eq!(keyer.flow_key(&reset).expect("key"), "D:c");

        let built: FlowPath = ["a", "b", "#c"].into_iter().map(FlowId::from).collect();
        assert_eq!(keyer.flow_key(&built).expect("key"), "D:c");
    }

    #[test]
    fn append_rejects_separator_characters() {
        let base = path(&["onStart"]);
        for bad in ["a.b", "a:b", "a|b", "a\nb", "a\rb", "", "#", "a#b"] {
            let error = append_flow_path_id(&base, [bad]).expect_err("id should be rejected");
            assert_eq!(error.code, "FLOW_PATH_ID_INVALID", "id {:?}", bad);
        }
    }

    #[test]
    fn append_accepts_indexes_and_multiple_ids() {
        let base = path(&["onStart"]);
        let next = append_flow_path_id(&base, [FlowId::from("items"), FlowId::from(2usize)])
            .expect("valid");
        assert_eq!(next.to_string(), "onStart.items.2");
    }

    #[test]
    fn flow_key_accepts_qualified_and_relative_text() {
        let keyer = FlowKeyer::new("D");
        assert_eq!(keyer.flow_key("D:a.b").expect("qualified"), "D:a.b");
        assert_eq!(keyer.flow_key("a.b").expect("relative"), "D:a.b");
        assert_eq!(keyer.flow_key("a.#b").expect("reset"), "D:b");
    }

    #[test]
    fn flow_key_rejects_malformed_text() {
        let keyer = FlowKeyer::new("D");
        for bad in ["E:a", "D:a:b", "a..b", "D:", ""] {
            let error = keyer.flow_key(bad).expect_err("should be rejected");
            assert!(
                error.code == "FLOW_KEY_INVALID" || error.code == "FLOW_PATH_ID_INVALID",
                "{:?} -> {}",
                bad,
                error
            );
        }
        assert!(keyer.flow_key(&FlowPath::default()).is_err());
    }
}
