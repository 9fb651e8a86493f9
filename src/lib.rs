//! Lineup Bot: fills open slots in group sign-up lists.

pub mod bot;
pub mod channels;
pub mod config;
pub mod confirmations;
pub mod dashboard;
pub mod engine;
pub mod error;
pub mod groups;
