use strsim::levenshtein;

/// Closest candidate to `target` by edit distance; ties keep the first.
pub fn closest_key<'a, I>(target: &str, candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    candidates
        .into_iter()
        .map(|candidate| (levenshtein(target, candidate), candidate))
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| candidate)
}

/// Appends a "did you mean" hint when any candidate exists.
pub fn with_suggestion<'a, I>(message: String, target: &str, candidates: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    match closest_key(target, candidates) {
        Some(candidate) => format!("{} Did you mean {:?}?", message, candidate),
        None => message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closest_key_prefers_smallest_distance() {
        let keys = ["D:onStart.if.then", "D:onStart.if.else", "D:onDefault"];
        assert_eq!(
            closest_key("D:onStart.if.thn", keys.iter().copied()),
            Some("D:onStart.if.then")
        );
        assert_eq!(closest_key("x", std::iter::empty()), None);
    }

    #[test]
    fn suggestion_is_appended_to_message() {
        let message = with_suggestion(
            "Undefined flow handler \"D:a.b\".".to_string(),
            "D:a.b",
            ["D:a.c"],
        );
        assert_eq!(message, "Undefined flow handler \"D:a.b\". Did you mean \"D:a.c\"?");
    }
}
