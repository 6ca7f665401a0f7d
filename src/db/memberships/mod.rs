//! Membership rows: one per (user, scope), reused across application cycles.

pub mod models;
pub mod queries;

pub use models::{Membership, MembershipStatus, Role};
pub use queries::MembershipRepository;
