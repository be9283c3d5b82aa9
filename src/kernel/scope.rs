//! # Actor Scope
//!
//! [`ActorScope`] is the per-actor capability handed to logic hooks: it is
//! how logic raises events on itself, defers effects past the current
//! macrostep, spawns and stops owned children, emits out-of-band events, and
//! stashes non-serializable runtime state in the aux side-table.
//!
//! A scope's lifecycle equals the actor's lifecycle. It is allocated once,
//! never serialized, and holds only a `Weak` back to the cell — keeping a
//! scope alive keeps nothing alive.

use std::any::Any;
use std::rc::{Rc, Weak};
use std::time::Duration;

use tracing::debug;

use crate::actions::ConcreteAction;
use crate::kernel::cell::ActorCell;
use crate::kernel::handle::{ActorRef, AnyActor, AnyActorRef};
use crate::kernel::ActorOptions;
use crate::logic::ActorLogic;
use crate::system::{ActorId, ActorSystem};

pub struct ActorScope<L: ActorLogic> {
    pub(crate) cell: Weak<ActorCell<L>>,
}

impl<L: ActorLogic> Clone for ActorScope<L> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<L: ActorLogic> ActorScope<L> {
    fn cell(&self) -> Rc<ActorCell<L>> {
        self.cell
            .upgrade()
            .expect("actor scope used after its actor was dropped")
    }

    pub fn id(&self) -> ActorId {
        self.cell().id
    }

    pub fn system(&self) -> ActorSystem {
        self.cell().system.clone()
    }

    /// Typed handle to the actor this scope belongs to.
    pub fn self_ref(&self) -> ActorRef<L> {
        ActorRef { cell: self.cell() }
    }

    /// Non-owning handle to the spawning actor.
    pub fn parent(&self) -> Option<AnyActorRef> {
        self.cell().parent_ref()
    }

    /// Queue an event on this actor's own microstep queue. Raised events are
    /// processed FIFO within the *current* macrostep, strictly before any
    /// externally queued event.
    pub fn raise(&self, event: L::Event) {
        self.cell().raise(event);
    }

    /// Queue an effect to run only after the current macrostep has committed
    /// its next snapshot. Every outward side effect of a transition goes
    /// through here, so no recipient ever observes this actor mid-update.
    pub fn defer(&self, effect: impl FnOnce() + 'static) {
        self.cell().defer(Box::new(effect));
    }

    /// Emit an out-of-band event to [`on_emit`](ActorRef::on_emit) listeners.
    /// Fan-out is deferred until after the current macrostep commits.
    pub fn emit(&self, event: L::Emitted) {
        let cell = self.cell();
        self.defer(move || cell.fan_out_emit(&event));
    }

    /// Spawn an owned child. The child is registered immediately, but its
    /// `start` hook runs only once this actor is started — children declared
    /// during initialization start in declaration order right after the
    /// initial snapshot commits, exactly once per declared spawn position.
    pub fn spawn_child<CL: ActorLogic>(
        &self,
        logic: CL,
        options: ActorOptions<CL::Input>,
    ) -> ActorRef<CL> {
        self.cell().spawn_child(logic, options)
    }

    /// Stop an owned child (deferred past the current macrostep). Asking to
    /// stop an actor this one does not own is ignored: merely-referenced
    /// actors are never stopped implicitly.
    pub fn stop_child(&self, child: &AnyActorRef) {
        self.cell().stop_child(child);
    }

    /// Owned child registered under `name`, if any.
    pub fn child_named(&self, name: &str) -> Option<AnyActorRef> {
        self.cell().child_named(name)
    }

    /// Access this actor's aux side-table slot, initializing it with
    /// `T::default()` on first use.
    ///
    /// The aux slot is where logic keeps per-actor runtime state that must
    /// not live on the snapshot: listener sets, subscription handles,
    /// cancellation signals. It is discarded on termination and is never
    /// serialized, so a restored actor always begins with an empty slot.
    ///
    /// The closure must not re-enter `with_aux` on the same actor.
    pub fn with_aux<T: Default + 'static, R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let cell = self.cell();
        let mut slot = cell.aux.borrow_mut();
        let entry: &mut Box<dyn Any> = slot.get_or_insert_with(|| Box::<T>::default());
        let typed = entry
            .downcast_mut::<T>()
            .expect("aux slot already holds a value of a different type");
        f(typed)
    }

    /// Origin of the event currently being processed, when the sender
    /// identified itself through the relay.
    pub fn current_origin(&self) -> Option<AnyActorRef> {
        self.cell().current_origin()
    }

    /// Run an effect after `delay`, re-entering the normal macrostep
    /// machinery when it fires. The timer is cancelled if the actor
    /// terminates first. Requires a tokio `LocalSet` context.
    pub(crate) fn schedule(&self, delay: Duration, effect: Box<dyn FnOnce()>) {
        self.cell().schedule(delay, effect);
    }

    /// Queue a resolved concrete action for the execute phase of the current
    /// macrostep.
    pub(crate) fn push_action(&self, action: ConcreteAction<L>) {
        self.cell().push_action(action);
    }

    /// Erased weak handle to this actor, for guards that must not keep the
    /// cell alive.
    pub(crate) fn any_weak(&self) -> Weak<dyn AnyActor> {
        self.cell.clone()
    }

    /// Spawn handle that can outlive a borrow of this scope, for bodies that
    /// run outside the logic hooks (async task creators).
    pub(crate) fn spawner(&self) -> Spawner {
        Spawner {
            owner: self.any_weak(),
            system: self.system(),
        }
    }
}

/// Type-erased spawn capability detached from the typed scope.
///
/// Children spawned through it join the owner's subtree exactly like
/// [`ActorScope::spawn_child`] children: they are stopped when the owner
/// reaches any terminal status.
#[derive(Clone)]
pub struct Spawner {
    owner: Weak<dyn AnyActor>,
    system: ActorSystem,
}

impl Spawner {
    /// Spawn an owned child of the actor this spawner belongs to. Returns
    /// `None` once the owner is terminal or gone — a child spawned then
    /// would have no one left to stop it.
    pub fn spawn<CL: ActorLogic>(
        &self,
        logic: CL,
        options: ActorOptions<CL::Input>,
    ) -> Option<ActorRef<CL>> {
        let owner = self.owner.upgrade()?;
        if owner.status().is_terminal() {
            debug!(owner = owner.id(), "spawn after terminal status ignored");
            return None;
        }
        let name = options.name.clone();
        let child = ActorCell::create(self.system.clone(), logic, options, Some(self.owner.clone()));
        owner.adopt_child(child.as_any(), name);
        Some(child)
    }
}
