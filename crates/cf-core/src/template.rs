use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::value::{lookup_path, value_to_text, Vars};

fn template_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"\{\{\s*([^{}\s]+)\s*\}\}").expect("template regex must compile")
    })
}

pub fn has_template(text: &str) -> bool {
    template_regex().is_match(text)
}

/// Renders `{{dotted.path}}` placeholders against vars. Missing paths render
/// as the empty string.
pub fn render_template(text: &str, vars: &Vars) -> String {
    template_regex()
        .replace_all(text, |caps: &Captures<'_>| {
            lookup_path(vars, &caps[1])
                .map(value_to_text)
                .unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn vars(value: Value) -> Vars {
        match value {
            Value::Object(map) => map,
            _ => Vars::new(),
        }
    }

    #[test]
    fn renders_dotted_paths_and_blanks_missing_ones() {
        let env = vars(json!({"user": {"name": "Ada"}, "n": 3}));
        assert_eq!(
            render_template("Hi {{ user.name }}, {{n}} left{{missing.x}}.", &env),
            "Hi Ada, 3 left."
        );
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(render_template("no braces", &Vars::new()), "no braces");
        assert!(!has_template("{ single }"));
        assert!(has_template("{{a}}"));
    }
}
