//! Waitlist rows: one waitlist per scope, one entry per waiting user.

pub mod models;
pub mod queries;

pub use models::{EntryStatus, Waitlist, WaitlistEntry};
pub use queries::WaitlistRepository;
