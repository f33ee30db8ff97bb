//! Splitting an inbound chat message into topics.

use std::sync::OnceLock;

use regex::Regex;

use crate::{Error, Result};

fn ordinal_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `1. Topic`, `2) Topic`, `3 - Topic`; the marker must be followed by whitespace.
    RE.get_or_init(|| Regex::new(r"^\s*\d{1,3}\s*[.)\-:]\s+(\S.*)$").expect("valid regex"))
}

/// Parse a message into an ordered batch of single-line topics.
///
/// Two or more numbered lines make a list: each numbered line is one topic
/// (marker stripped) and any other line is ignored. Otherwise the whole
/// message is one topic, with line breaks folded into spaces.
pub fn parse_topics(text: &str) -> Result<Vec<String>> {
    let listed: Vec<String> = text
        .lines()
        .filter_map(|line| ordinal_marker().captures(line))
        .filter_map(|caps| caps.get(1).map(|m| collapse_whitespace(m.as_str())))
        .filter(|topic| !topic.is_empty())
        .collect();

    if listed.len() >= 2 {
        return Ok(listed);
    }

    let single = collapse_whitespace(text);
    if single.is_empty() {
        return Err(Error::NoTopics);
    }
    Ok(vec![single])
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
