//! # Actor Kernel
//!
//! The kernel schedules actors, enforces run-to-completion macrosteps, and
//! owns the lifecycle rules: created → started → (done | error | stopped).
//! See [`cell`] for the scheduling model, [`handle`] for the handle types,
//! and [`scope`] for the capability surface logic hooks receive.

pub(crate) mod cell;
mod handle;
mod scope;

use crate::logic::ActorLogic;
use crate::system::ActorSystem;

pub use handle::{ActorRef, AnyActorRef, Observer, Subscription};
pub use scope::{ActorScope, Spawner};

pub(crate) use handle::AnyActor;

/// Creation options for [`create_actor`] and
/// [`ActorScope::spawn_child`].
pub struct ActorOptions<I> {
    pub(crate) input: I,
    pub(crate) system_id: Option<String>,
    pub(crate) name: Option<String>,
    pub(crate) snapshot: Option<serde_json::Value>,
}

impl<I> ActorOptions<I> {
    pub fn with_input(input: I) -> Self {
        Self {
            input,
            system_id: None,
            name: None,
            snapshot: None,
        }
    }

    /// Register this actor in the system registry under `key`. Keys are
    /// first-come-first-served: a second claimant fails on its *own* error
    /// channel and the incumbent keeps the slot.
    pub fn system_id(mut self, key: impl Into<String>) -> Self {
        self.system_id = Some(key.into());
        self
    }

    /// Name the actor within its parent, for [`ActorScope::child_named`].
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Restore from a persisted snapshot instead of computing a fresh
    /// initial one. A terminal persisted snapshot also suppresses the
    /// logic's `start` hook.
    pub fn snapshot(mut self, persisted: serde_json::Value) -> Self {
        self.snapshot = Some(persisted);
        self
    }
}

impl<I: Default> Default for ActorOptions<I> {
    fn default() -> Self {
        Self::with_input(I::default())
    }
}

/// Create a root actor on `system`. The actor is registered immediately but
/// does not process events until [`ActorRef::start`] is called.
pub fn create_actor<L: ActorLogic>(
    system: &ActorSystem,
    logic: L,
    options: ActorOptions<L::Input>,
) -> ActorRef<L> {
    cell::ActorCell::create(system.clone(), logic, options, None)
}
