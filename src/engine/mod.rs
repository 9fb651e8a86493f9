//! List engine: classifies, parses and fills numbered sign-up lists.
//!
//! Everything in here is synchronous and pure: callers hand in the message
//! text plus an owned roster snapshot and get back either the rewritten text
//! or `None` when there is nothing to change.

pub mod classifier;
pub mod filler;
pub mod parser;

pub use classifier::is_signup_list;
pub use filler::{FillOptions, FillResult, fill};
pub use parser::{ParseResult, Section, Slot, WaitlistEntry, parse};

/// Highest slot number that belongs to the main list.
pub const MAIN_LIST_SIZE: u32 = 15;

/// Number of waitlist slots appended when a partial list is completed.
pub const COMPLETION_WAITLIST_SLOTS: u32 = 5;

/// Substring that marks the start of the waitlist section ("waiting").
pub const WAITLIST_MARKER: &str = "ממתינים";

/// Header line written when the engine appends a waitlist section.
pub const WAITLIST_HEADER: &str = "ממתינים:";
