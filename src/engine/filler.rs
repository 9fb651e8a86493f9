//! Slot filler: completes partial lists, promotes waitlisted roster
//! members and writes new roster names into free slots.

use std::collections::HashSet;

use tracing::debug;

use super::parser::{self, ParseResult, Section, Slot, name_key};
use super::{COMPLETION_WAITLIST_SLOTS, MAIN_LIST_SIZE, WAITLIST_HEADER};

/// Per-call knobs taken from the bot configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FillOptions {
    /// Also fill free waitlist slots (and append a waitlist on completion).
    pub add_to_waitlist: bool,
}

/// Outcome of a fill that changed the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillResult {
    pub updated_text: String,
    pub added_to_main: usize,
    pub added_to_waitlist: usize,
    pub moved_from_waitlist: usize,
    /// Whether a partial list was padded up to the full main list.
    pub completed: bool,
}

impl FillResult {
    pub fn total_changes(&self) -> usize {
        self.added_to_main + self.added_to_waitlist + self.moved_from_waitlist
    }
}

/// Lines to insert directly after `after` in the original line sequence.
struct Splice {
    after: usize,
    lines: Vec<String>,
}

/// Apply splices in descending anchor order so earlier anchors stay valid,
/// then shift every stored slot index that sat after an anchor.
fn apply_splices(parsed: &mut ParseResult, mut splices: Vec<Splice>) {
    splices.sort_by(|a, b| b.after.cmp(&a.after));

    for splice in &splices {
        let at = splice.after + 1;
        parsed
            .lines
            .splice(at..at, splice.lines.iter().cloned());
    }

    let shift = |index: usize| -> usize {
        index
            + splices
                .iter()
                .filter(|s| s.after < index)
                .map(|s| s.lines.len())
                .sum::<usize>()
    };

    for slot in parsed
        .empty_main
        .iter_mut()
        .chain(parsed.empty_waitlist.iter_mut())
    {
        slot.line_index = shift(slot.line_index);
    }
    for entry in &mut parsed.waitlist_entries {
        entry.line_index = shift(entry.line_index);
    }
    if let Some(marker) = parsed.waitlist_marker.as_mut() {
        *marker = shift(*marker);
    }
}

/// Last main-section line that starts with a main slot number.
fn main_list_tail(parsed: &ParseResult) -> Option<usize> {
    let end = parsed.waitlist_marker.unwrap_or(parsed.lines.len());
    parsed.lines[..end].iter().rposition(|line| {
        parser::leading_number(&parser::normalize_line(line))
            .is_some_and(parser::is_main_number)
    })
}

/// Pad a partial main list to [`MAIN_LIST_SIZE`] and, when allowed, append
/// an empty waitlist. Returns whether anything was inserted.
fn complete_list(parsed: &mut ParseResult, options: FillOptions) -> bool {
    let max = parsed.max_main_number;
    if max == 0 || max >= MAIN_LIST_SIZE {
        return false;
    }
    let Some(tail) = main_list_tail(parsed) else {
        return false;
    };

    debug!(max, tail, "Completing partial list");

    let mut block = Vec::new();
    let mut new_main = Vec::new();
    for number in (max + 1)..=MAIN_LIST_SIZE {
        if parsed.occupied_main.contains(&number) {
            continue;
        }
        new_main.push((number, block.len()));
        block.push(format!("{number}."));
    }

    let mut new_waitlist = Vec::new();
    let append_waitlist = options.add_to_waitlist && parsed.waitlist_marker.is_none();
    if append_waitlist {
        block.push(String::new());
        block.push(WAITLIST_HEADER.to_string());
        for number in 1..=COMPLETION_WAITLIST_SLOTS {
            new_waitlist.push((number, block.len()));
            block.push(format!("{number}."));
        }
    }

    if block.is_empty() {
        return false;
    }

    apply_splices(
        parsed,
        vec![Splice {
            after: tail,
            lines: block,
        }],
    );

    let base = tail + 1;
    parsed
        .empty_main
        .extend(new_main.into_iter().map(|(number, offset)| Slot {
            number,
            line_index: base + offset,
            section: Section::Main,
        }));
    if append_waitlist {
        parsed.waitlist_marker = Some(base + new_waitlist[0].1 - 1);
    }
    parsed
        .empty_waitlist
        .extend(new_waitlist.into_iter().map(|(number, offset)| Slot {
            number,
            line_index: base + offset,
            section: Section::Waitlist,
        }));

    true
}

/// A name written into a slot must stay on that slot's line.
fn is_single_line(name: &str) -> bool {
    !name.contains(['\n', '\r'])
}

fn slot_line(number: u32, name: &str) -> String {
    format!("{number}. {name}")
}

/// Fill a sign-up list with roster names.
///
/// Returns `None` when the text needs no change. The roster is the already
/// resolved list for the message's group.
pub fn fill(text: &str, roster: &[String], options: FillOptions) -> Option<FillResult> {
    let mut parsed = parser::parse(text);
    let completed = complete_list(&mut parsed, options);

    let roster_keys: HashSet<String> = roster
        .iter()
        .filter(|m| is_single_line(m))
        .map(|m| name_key(m))
        .filter(|k| !k.is_empty())
        .collect();

    let mut free_main = std::mem::take(&mut parsed.empty_main);
    let mut free_waitlist = std::mem::take(&mut parsed.empty_waitlist);
    let mut main_keys: HashSet<String> = parsed.main_names.iter().map(|n| name_key(n)).collect();

    // Promotion: earliest waitlisted roster members into earliest free slots.
    let mut moved_from_waitlist = 0;
    if !free_main.is_empty() {
        let mut promoted = HashSet::new();
        let movers: Vec<_> = parsed
            .waitlist_entries
            .iter()
            .filter(|entry| {
                let key = name_key(&entry.name);
                roster_keys.contains(&key) && !main_keys.contains(&key) && promoted.insert(key)
            })
            .cloned()
            .collect();

        let count = movers.len().min(free_main.len());
        for (entry, target) in movers.iter().zip(free_main.drain(..count)) {
            parsed.lines[target.line_index] = slot_line(target.number, &entry.name);
            parsed.lines[entry.line_index] = format!("{}.", entry.number);
            free_waitlist.push(Slot {
                number: entry.number,
                line_index: entry.line_index,
                section: Section::Waitlist,
            });
            main_keys.insert(name_key(&entry.name));
            debug!(
                name = %entry.name,
                from = entry.number,
                to = target.number,
                "Promoted from waitlist"
            );
            moved_from_waitlist += 1;
        }
        free_waitlist.sort_by_key(|slot| slot.line_index);
    }

    // Candidates: roster order, minus anyone already on the list.
    let waitlist_keys: HashSet<String> = if options.add_to_waitlist {
        parsed.waitlist_names.iter().map(|n| name_key(n)).collect()
    } else {
        HashSet::new()
    };
    let mut seen = HashSet::new();
    let candidates: Vec<&str> = roster
        .iter()
        .map(|m| m.trim())
        .filter(|m| {
            if !is_single_line(m) {
                debug!(name = ?m, "Roster name spans lines, skipping");
                return false;
            }
            let key = name_key(m);
            if key.is_empty() || !seen.insert(key.clone()) {
                return false;
            }
            if main_keys.contains(&key) {
                debug!(name = %m, "Already in main list, skipping");
                return false;
            }
            if waitlist_keys.contains(&key) {
                debug!(name = %m, "Already on waitlist, skipping");
                return false;
            }
            true
        })
        .collect();

    let mut targets = free_main;
    if options.add_to_waitlist {
        targets.extend(free_waitlist);
    }

    let mut added_to_main = 0;
    let mut added_to_waitlist = 0;
    for (slot, name) in targets.iter().zip(candidates) {
        parsed.lines[slot.line_index] = slot_line(slot.number, name);
        match slot.section {
            Section::Main => added_to_main += 1,
            Section::Waitlist => added_to_waitlist += 1,
        }
    }

    let result = FillResult {
        updated_text: parsed.lines.join("\n"),
        added_to_main,
        added_to_waitlist,
        moved_from_waitlist,
        completed,
    };

    if result.total_changes() > 0 || completed {
        Some(result)
    } else {
        None
    }
}
