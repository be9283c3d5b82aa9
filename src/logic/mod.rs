//! # Actor Logic Contract
//!
//! The [`ActorLogic`] trait defines the contract that every unit of
//! sequential logic — reducer, async task, callback, stream, subscription
//! bridge, or a full machine — must implement to be scheduled by the kernel.
//! It specifies associated types for the snapshot, event, input and emitted
//! shapes, and a small set of hooks the kernel calls at well-defined points.
//!
//! # Architecture Note
//! Why one structural contract instead of an inheritance hierarchy?
//! The five built-in variants in this module's submodules are a *closed set of
//! independent values* satisfying the same shape. The kernel is written once
//! against the trait and knows nothing about any variant; a machine-specific
//! logic supplied by another crate plugs into the exact same seam.
//!
//! # Purity
//! Every hook except [`ActorLogic::start`] and [`ActorLogic::on_stop`] must be
//! pure: `transition` computes the next snapshot and may *queue* work through
//! the scope (raise, defer, actions), but performs no I/O itself. This is what
//! lets the kernel compute a deterministic, inspectable next snapshot for an
//! entire macrostep before any effect fires.

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ActorFault, PersistError};
use crate::kernel::ActorScope;
use crate::snapshot::{SnapshotLike, Status};

pub mod callback;
pub mod reducer;
pub mod stream;
pub mod subscription;
pub mod task;

pub use callback::{from_callback, CallbackArgs, CallbackLogic, Disposer, Emit, Receive, SendBack};
pub use reducer::{from_reducer, from_reducer_with, ReducerLogic, ReducerSnapshot};
pub use stream::{
    from_event_stream, from_stream, EventStreamLogic, StreamArgs, StreamEvent, StreamLogic,
    StreamSnapshot,
};
pub use subscription::{from_actor, BridgeEvent, SourceUpdate, SubscriptionLogic};
pub use task::{from_task, AsyncTaskLogic, CancelSignal, TaskArgs, TaskEvent, TaskSnapshot};

/// Contract that any unit of sequential logic must implement to be managed by
/// the kernel.
///
/// # Associated Types
/// - `Snapshot`: the serializable observable state, replaced on every
///   processed event.
/// - `Event`: the inbound event union. `transition` must be *total* — it
///   no-ops (returns the snapshot unchanged) on unrecognized events.
/// - `Input`: the value the actor is created with.
/// - `Emitted`: out-of-band events fanned out to [`on_emit`] listeners; use
///   `()` for variants that never emit.
///
/// [`on_emit`]: crate::kernel::ActorRef::on_emit
pub trait ActorLogic: Sized + 'static {
    type Snapshot: SnapshotLike;
    type Event: Debug + 'static;
    type Input: 'static;
    type Emitted: 'static;

    /// Compute the snapshot the actor is born with. Pure; children spawned
    /// through the scope here are started, in declaration order, as soon as
    /// the actor itself starts.
    fn initial_snapshot(&self, scope: &ActorScope<Self>, input: Self::Input) -> Self::Snapshot;

    /// Compute the next snapshot for one event. Pure relative to the
    /// snapshot; an `Err` is captured by the kernel as a logic fault and
    /// moves the actor to [`Status::Error`], never unwinding into the
    /// sender's call stack.
    fn transition(
        &self,
        snapshot: Self::Snapshot,
        event: Self::Event,
        scope: &ActorScope<Self>,
    ) -> Result<Self::Snapshot, ActorFault>;

    /// The one impure hook: invoked exactly once when the actor starts, and
    /// never again after a terminal status — including when the actor was
    /// restored from a terminal persisted snapshot.
    fn start(&self, _snapshot: &Self::Snapshot, _scope: &ActorScope<Self>) -> Result<(), ActorFault> {
        Ok(())
    }

    /// Release hook, run at most once when the actor reaches any terminal
    /// status. This is where variants holding live resources (subscriptions,
    /// cancellation signals, disposers) let go of them. The kernel itself
    /// handles the status change; the default does nothing.
    fn on_stop(&self, _scope: &ActorScope<Self>) {}

    /// Project the snapshot onto a plain serializable value. Live handles
    /// never appear here — variants keep those in the per-actor aux
    /// side-table, which is not part of the snapshot.
    fn persisted_snapshot(&self, snapshot: &Self::Snapshot) -> Result<serde_json::Value, PersistError>;

    /// Rebuild a snapshot from its persisted form, reinstating empty
    /// placeholders for anything that was excluded.
    fn restore_snapshot(&self, persisted: serde_json::Value) -> Result<Self::Snapshot, PersistError>;
}

/// Minimal snapshot shape for logic variants whose observable state is just
/// their lifecycle: callback and event-emitting-stream actors, subscription
/// bridges. Carries status, the captured fault, and the creation input.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot<In = ()> {
    pub status: Status,
    pub error: Option<ActorFault>,
    pub input: Option<In>,
}

impl<In> StatusSnapshot<In> {
    pub fn active(input: In) -> Self {
        Self {
            status: Status::Active,
            error: None,
            input: Some(input),
        }
    }
}

impl<In: Clone + Debug + 'static> SnapshotLike for StatusSnapshot<In> {
    fn status(&self) -> Status {
        self.status
    }

    fn fault(&self) -> Option<&ActorFault> {
        self.error.as_ref()
    }

    fn mark_stopped(&mut self) {
        self.status = Status::Stopped;
    }

    fn mark_error(&mut self, fault: ActorFault) {
        self.status = Status::Error;
        self.error = Some(fault);
    }
}

/// Serialize a snapshot for persistence the standard way.
pub(crate) fn to_persisted<S: Serialize>(snapshot: &S) -> Result<serde_json::Value, PersistError> {
    serde_json::to_value(snapshot).map_err(PersistError::Serialize)
}

/// Restore a snapshot from its persisted form the standard way.
pub(crate) fn from_persisted<S: DeserializeOwned>(value: serde_json::Value) -> Result<S, PersistError> {
    serde_json::from_value(value).map_err(|e| PersistError::Malformed(e.to_string()))
}
