//! Scope actor registry.

use super::AdmissionCore;
use super::actor::{ScopeActor, ScopeEvent};
use crate::db::ScopeId;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Scope id to actor mailbox. Actors hold a weak reference so they can
/// take themselves out when they go idle.
pub type ActorRegistry = DashMap<ScopeId, mpsc::Sender<ScopeEvent>>;

/// Tracks one actor mailbox per scope, spawning actors on first use.
pub struct ScopeManager {
    actors: Arc<ActorRegistry>,
    core: Arc<AdmissionCore>,
}

impl ScopeManager {
    pub fn new(core: Arc<AdmissionCore>) -> Self {
        Self {
            actors: Arc::new(DashMap::new()),
            core,
        }
    }

    /// Get the scope's actor, spawning it if needed. The entry lock makes
    /// sure two callers racing on a new scope end up with the same actor.
    pub fn get_or_create_actor(&self, scope_id: ScopeId) -> mpsc::Sender<ScopeEvent> {
        self.actors
            .entry(scope_id)
            .or_insert_with(|| {
                ScopeActor::spawn(scope_id, Arc::clone(&self.core), Arc::downgrade(&self.actors))
            })
            .value()
            .clone()
    }

    /// Forget an actor whose task has gone away so the next request respawns it.
    pub fn evict_if_closed(&self, scope_id: ScopeId) {
        self.actors.remove_if(&scope_id, |_, tx| tx.is_closed());
    }

    /// Number of live actors.
    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }
}
