//! Approval flow for filled lists when confirmation is required.

pub mod model;
pub mod queue;

pub use model::{ConfirmationSummary, PendingConfirmation};
pub use queue::ConfirmationQueue;
