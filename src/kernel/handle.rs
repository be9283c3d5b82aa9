//! # Actor Handles
//!
//! An actor is never touched directly: callers hold a *handle*. [`ActorRef`]
//! is the typed handle returned by `create_actor`/`spawn_child`;
//! [`AnyActorRef`] is its type-erased sibling used by the registry, the relay,
//! and anywhere a heterogeneous set of actors must be held together.
//!
//! # Architecture Note
//! A handle is `Rc`-shared with the cell it points at, but holding a handle
//! confers no ownership semantics: only the actor that *spawned* a child is
//! responsible for stopping it. Merely-referenced handles are never
//! auto-stopped by anyone else. The parent back-reference inside a cell is a
//! `Weak` for the same reason — it must never keep a parent alive or count
//! toward lifetime decisions.

use std::any::Any;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::{ActorFault, PersistError};
use crate::kernel::cell::ActorCell;
use crate::logic::ActorLogic;
use crate::message::AnyMessage;
use crate::snapshot::Status;
use crate::system::{ActorId, ActorSystem};

/// Type-erased view of an actor cell. Everything the registry, the relay and
/// cross-actor plumbing need, without knowing the logic type.
pub(crate) trait AnyActor {
    fn id(&self) -> ActorId;
    fn system_id(&self) -> Option<String>;
    fn status(&self) -> Status;
    fn system(&self) -> ActorSystem;
    fn parent(&self) -> Option<AnyActorRef>;
    /// Downcast-and-enqueue. A type mismatch is routed to dead letters.
    fn deliver(&self, message: AnyMessage, origin: Option<Weak<dyn AnyActor>>);
    fn start_actor(&self);
    fn stop_actor(&self);
    /// Enroll an externally created child in this actor's owned subtree.
    fn adopt_child(&self, child: AnyActorRef, name: Option<String>);
    /// Surface a child-escalated fault on this actor's error channel.
    fn escalate(&self, fault: ActorFault);
    fn persisted(&self) -> Result<serde_json::Value, PersistError>;
    fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any>;
}

/// A type-erased actor handle.
#[derive(Clone)]
pub struct AnyActorRef {
    pub(crate) inner: Rc<dyn AnyActor>,
}

impl AnyActorRef {
    pub(crate) fn from_rc(inner: Rc<dyn AnyActor>) -> Self {
        Self { inner }
    }

    /// Stable, opaque id assigned by the system's monotonic counter.
    pub fn id(&self) -> ActorId {
        self.inner.id()
    }

    /// The key this actor registered under, if any.
    pub fn system_id(&self) -> Option<String> {
        self.inner.system_id()
    }

    pub fn status(&self) -> Status {
        self.inner.status()
    }

    /// Deliver a type-erased event through the system relay. If the payload
    /// type does not match the actor's event type, or the actor is already
    /// terminal, the event is dead-lettered rather than thrown.
    pub fn send_any(&self, message: AnyMessage) {
        self.inner.system().relay(None, self, message);
    }

    /// Idempotent stop. The full macrostep in progress (if any) completes
    /// first; cleanup runs exactly once.
    pub fn stop(&self) {
        self.inner.stop_actor();
    }

    /// Non-owning back-reference to the actor that spawned this one.
    pub fn parent(&self) -> Option<AnyActorRef> {
        self.inner.parent()
    }

    pub fn persisted_snapshot(&self) -> Result<serde_json::Value, PersistError> {
        self.inner.persisted()
    }

    /// Recover the typed handle, if this ref points at a cell running `L`.
    pub fn downcast<L: ActorLogic>(&self) -> Option<ActorRef<L>> {
        self.inner
            .clone()
            .as_any_rc()
            .downcast::<ActorCell<L>>()
            .ok()
            .map(|cell| ActorRef { cell })
    }

    pub(crate) fn start(&self) {
        self.inner.start_actor();
    }

    pub(crate) fn escalate(&self, fault: ActorFault) {
        self.inner.escalate(fault);
    }

    pub(crate) fn downgrade(&self) -> Weak<dyn AnyActor> {
        Rc::downgrade(&self.inner)
    }
}

impl PartialEq for AnyActorRef {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for AnyActorRef {}

impl fmt::Debug for AnyActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyActorRef")
            .field("id", &self.id())
            .field("system_id", &self.system_id())
            .field("status", &self.status())
            .finish()
    }
}

/// A typed actor handle.
///
/// `send()` completes the actor's entire macrostep — including every
/// microstep raised along the way — synchronously before returning, so the
/// caller always observes a fully settled snapshot immediately afterwards.
pub struct ActorRef<L: ActorLogic> {
    pub(crate) cell: Rc<ActorCell<L>>,
}

impl<L: ActorLogic> Clone for ActorRef<L> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<L: ActorLogic> ActorRef<L> {
    pub fn id(&self) -> ActorId {
        self.cell.id
    }

    pub fn system_id(&self) -> Option<&str> {
        self.cell.system_id.as_deref()
    }

    /// Deliver one event and run its full macrostep before returning.
    pub fn send(&self, event: L::Event) {
        let any = self.as_any();
        self.cell.system.relay(None, &any, AnyMessage::new(event));
    }

    /// Start the actor: runs the logic's `start` hook (unless the actor was
    /// restored with a terminal snapshot), starts children declared during
    /// initialization in declaration order, then drains any events queued
    /// before the start. Idempotent.
    pub fn start(&self) -> &Self {
        self.cell.start();
        self
    }

    /// Idempotent stop; the owned subtree is stopped depth-first.
    pub fn stop(&self) {
        self.cell.request_stop();
    }

    /// The actor's current (fully settled) snapshot.
    pub fn snapshot(&self) -> L::Snapshot {
        self.cell.current_snapshot()
    }

    pub fn status(&self) -> Status {
        self.cell.status()
    }

    pub fn persisted_snapshot(&self) -> Result<serde_json::Value, PersistError> {
        self.cell.logic.persisted_snapshot(&self.cell.current_snapshot())
    }

    /// Subscribe to snapshot updates. If the actor is already terminal the
    /// final value (or retained fault) is replayed immediately — a fault is
    /// never dropped just because no subscriber was attached when it fired.
    pub fn subscribe(&self, next: impl Fn(&L::Snapshot) + 'static) -> Subscription {
        self.subscribe_observer(Observer::new().on_next(next))
    }

    /// Subscribe with explicit next/error/complete channels.
    pub fn subscribe_observer(&self, observer: Observer<L::Snapshot>) -> Subscription {
        self.cell.subscribe(observer)
    }

    /// Listen for out-of-band events emitted through the scope.
    pub fn on_emit(&self, listener: impl Fn(&L::Emitted) + 'static) -> Subscription {
        self.cell.add_emit_listener(Rc::new(listener))
    }

    /// Non-owning back-reference to the spawning actor.
    pub fn parent(&self) -> Option<AnyActorRef> {
        self.cell.parent_ref()
    }

    pub fn system(&self) -> ActorSystem {
        self.cell.system.clone()
    }

    /// Erase the logic type.
    pub fn as_any(&self) -> AnyActorRef {
        AnyActorRef {
            inner: self.cell.clone(),
        }
    }
}

impl<L: ActorLogic> fmt::Debug for ActorRef<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRef")
            .field("id", &self.id())
            .field("system_id", &self.system_id())
            .field("status", &self.status())
            .finish()
    }
}

/// Snapshot/error/completion callbacks for [`ActorRef::subscribe_observer`].
/// All channels are optional.
pub struct Observer<S> {
    pub(crate) next: Option<Box<dyn Fn(&S)>>,
    pub(crate) error: Option<Box<dyn Fn(&ActorFault)>>,
    pub(crate) complete: Option<Box<dyn Fn()>>,
}

impl<S> Observer<S> {
    pub fn new() -> Self {
        Self {
            next: None,
            error: None,
            complete: None,
        }
    }

    pub fn on_next(mut self, f: impl Fn(&S) + 'static) -> Self {
        self.next = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&ActorFault) + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    pub fn on_complete(mut self, f: impl Fn() + 'static) -> Self {
        self.complete = Some(Box::new(f));
        self
    }
}

impl<S> Default for Observer<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by `subscribe`/`on_emit`. Dropping it does *not* detach
/// the observer; call [`Subscription::unsubscribe`]. Unsubscribing twice is a
/// no-op.
pub struct Subscription {
    cancel: std::cell::Cell<Option<Box<dyn FnOnce()>>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: std::cell::Cell::new(Some(Box::new(cancel))),
        }
    }

    /// Subscription on an already-terminal actor: the values were replayed
    /// synchronously, there is nothing left to detach.
    pub(crate) fn empty() -> Self {
        Self {
            cancel: std::cell::Cell::new(None),
        }
    }

    pub fn unsubscribe(&self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}
