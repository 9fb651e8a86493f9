//! Sign-up list detection.
//!
//! A message qualifies on a keyword hit or on list structure alone (two or
//! more numbered lines).

use super::parser::{is_numbered_line, normalize_line};

/// Minimum numbered lines for a message to count as a list without keywords.
const MIN_NUMBERED_LINES: usize = 2;

/// Decide whether `text` looks like a sign-up list.
pub fn is_signup_list(text: &str, keywords: &[String]) -> bool {
    let lowered = text.to_lowercase();
    let keyword_hit = keywords
        .iter()
        .filter(|k| !k.is_empty())
        .any(|k| lowered.contains(&k.to_lowercase()));
    if keyword_hit {
        return true;
    }

    text.split('\n')
        .filter(|line| is_numbered_line(&normalize_line(line)))
        .take(MIN_NUMBERED_LINES)
        .count()
        >= MIN_NUMBERED_LINES
}
