//! Scope actor event handlers.
//!
//! Each submodule handles a category of [`ScopeEvent`](super::ScopeEvent)
//! messages processed by [`ScopeActor`](super::ScopeActor).

pub mod invitations;
pub mod join;
pub mod leave;
pub mod review;
