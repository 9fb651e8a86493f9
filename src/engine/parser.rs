//! Line parser for numbered sign-up lists.
//!
//! A single left-to-right pass over the message lines. Each line is
//! normalized (invisible characters stripped, whitespace trimmed) and then
//! tested against the empty-slot and named-slot patterns. The scan starts in
//! [`Section::Main`] and moves to [`Section::Waitlist`] on the first line that
//! contains the waitlist marker.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use super::{MAIN_LIST_SIZE, WAITLIST_MARKER};

/// `12.` with nothing after the period.
static EMPTY_SLOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([0-9]+)\s*\.\s*$").unwrap());

/// `12. Dana`
static NAMED_SLOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([0-9]+)\s*\.\s*(.+)$").unwrap());

/// Any line that starts like a slot, with or without a name.
static NUMBERED_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([0-9]+)\s*\.").unwrap());

/// Which part of the message a line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Main,
    Waitlist,
}

impl Section {
    /// The only transition: Main → Waitlist on a marker line.
    fn advance(self, line: &str) -> Self {
        if line.contains(WAITLIST_MARKER) {
            Section::Waitlist
        } else {
            self
        }
    }
}

/// One numbered line position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub number: u32,
    pub line_index: usize,
    pub section: Section,
}

/// An occupied waitlist slot, kept whole so it can be promoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitlistEntry {
    pub name: String,
    pub number: u32,
    pub line_index: usize,
}

/// Structured view of one message.
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    /// The raw message lines, untouched.
    pub lines: Vec<String>,
    pub empty_main: Vec<Slot>,
    pub empty_waitlist: Vec<Slot>,
    pub occupied_main: BTreeSet<u32>,
    pub main_names: Vec<String>,
    pub waitlist_names: Vec<String>,
    pub waitlist_entries: Vec<WaitlistEntry>,
    /// Index of the line that opened the waitlist section.
    pub waitlist_marker: Option<usize>,
    /// Highest main slot number seen, empty or occupied. Zero if none.
    pub max_main_number: u32,
}

/// Characters chat clients inject that break structural matching.
fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{00A0}'
            | '\u{00AD}'
            | '\u{2007}'
            | '\u{200B}'..='\u{200F}'
            | '\u{202A}'..='\u{202F}'
            | '\u{2060}'..='\u{2064}'
            | '\u{2066}'..='\u{2069}'
            | '\u{FEFF}'
    )
}

/// Strip invisible characters and non-breaking spaces, then trim.
pub fn normalize_line(line: &str) -> String {
    line.chars()
        .filter(|c| !is_invisible(*c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Comparison key for names: normalized and lowercased.
pub fn name_key(name: &str) -> String {
    normalize_line(name).to_lowercase()
}

pub(crate) fn is_main_number(number: u32) -> bool {
    (1..=MAIN_LIST_SIZE).contains(&number)
}

/// Whether a normalized line starts like a slot, whatever the number's size.
pub(crate) fn is_numbered_line(line: &str) -> bool {
    NUMBERED_LINE.is_match(line)
}

/// Leading slot number of a normalized line, if it looks like `N.`.
pub(crate) fn leading_number(line: &str) -> Option<u32> {
    let caps = NUMBERED_LINE.captures(line)?;
    caps[1].parse().ok()
}

/// Parse a message into slots and entries. Never fails; lines that match
/// neither pattern are ignored.
pub fn parse(text: &str) -> ParseResult {
    let lines: Vec<String> = text.split('\n').map(String::from).collect();
    let mut result = ParseResult::default();
    let mut section = Section::Main;

    for (index, raw) in lines.iter().enumerate() {
        let line = normalize_line(raw);

        let next = section.advance(&line);
        if next != section {
            section = next;
            result.waitlist_marker = Some(index);
            continue;
        }
        if section == Section::Waitlist && line.contains(WAITLIST_MARKER) {
            // A second marker line is still a boundary, not a slot.
            continue;
        }

        if let Some(caps) = EMPTY_SLOT.captures(&line) {
            let Ok(number) = caps[1].parse::<u32>() else {
                continue;
            };
            let slot = Slot {
                number,
                line_index: index,
                section,
            };
            match section {
                Section::Main if is_main_number(number) => {
                    result.max_main_number = result.max_main_number.max(number);
                    result.empty_main.push(slot);
                }
                Section::Main => {}
                Section::Waitlist => result.empty_waitlist.push(slot),
            }
            continue;
        }

        let Some(caps) = NAMED_SLOT.captures(&line) else {
            continue;
        };
        let Ok(number) = caps[1].parse::<u32>() else {
            continue;
        };
        let name = normalize_line(&caps[2]);
        if name.is_empty() {
            continue;
        }

        match section {
            Section::Main if is_main_number(number) => {
                result.max_main_number = result.max_main_number.max(number);
                result.occupied_main.insert(number);
                result.main_names.push(name);
            }
            Section::Main => {}
            Section::Waitlist => {
                result.waitlist_names.push(name.clone());
                result.waitlist_entries.push(WaitlistEntry {
                    name,
                    number,
                    line_index: index,
                });
            }
        }
    }

    result.lines = lines;
    result
}
