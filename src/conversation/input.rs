//! Parsing of free-text user input.

use std::sync::LazyLock;

use regex::Regex;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").unwrap()
});

/// Syntactic email check. Says nothing about whether the mailbox exists.
pub fn is_valid_email(input: &str) -> bool {
    EMAIL_RE.is_match(input)
}

/// Parse the leading id of a person-selection line such as `"42 Doe Jane"`.
///
/// Only positive ids are accepted.
pub fn parse_selection(input: &str) -> Option<i64> {
    let first = input.split_whitespace().next()?;
    match first.parse::<i64>() {
        Ok(id) if id > 0 => Some(id),
        _ => None,
    }
}
