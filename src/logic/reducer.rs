//! # Reducer Logic
//!
//! Wraps a pure `(context, event) -> context` function. The kernel owns the
//! lifecycle entirely: the reducer holds no external resources, so stopping
//! it is nothing more than the kernel's standard terminal-status handling.

use std::fmt::Debug;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ActorFault, PersistError};
use crate::kernel::ActorScope;
use crate::logic::{from_persisted, to_persisted, ActorLogic};
use crate::snapshot::{SnapshotLike, Status};

/// Snapshot of a reducer actor: the reduced context plus lifecycle fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReducerSnapshot<C> {
    pub context: C,
    pub status: Status,
    pub error: Option<ActorFault>,
}

impl<C: Clone + Debug + 'static> SnapshotLike for ReducerSnapshot<C> {
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

pub struct ReducerLogic<C, E, I, F> {
    init: Box<dyn Fn(I) -> C>,
    reduce: F,
    _event: PhantomData<fn(E)>,
}

/// Actor logic from a pure reducer; the creation input is the initial
/// context.
pub fn from_reducer<C, E, F>(reduce: F) -> ReducerLogic<C, E, C, F>
where
    C: Clone + Debug + Serialize + DeserializeOwned + 'static,
    E: Debug + 'static,
    F: Fn(&C, &E) -> C + 'static,
{
    ReducerLogic {
        init: Box::new(|input| input),
        reduce,
        _event: PhantomData,
    }
}

/// Actor logic from a pure reducer with an input-to-context projection, for
/// actors whose creation input is not itself the context shape.
pub fn from_reducer_with<C, E, I, F, G>(init: G, reduce: F) -> ReducerLogic<C, E, I, F>
where
    C: Clone + Debug + Serialize + DeserializeOwned + 'static,
    E: Debug + 'static,
    I: 'static,
    F: Fn(&C, &E) -> C + 'static,
    G: Fn(I) -> C + 'static,
{
    ReducerLogic {
        init: Box::new(init),
        reduce,
        _event: PhantomData,
    }
}

impl<C, E, I, F> ActorLogic for ReducerLogic<C, E, I, F>
where
    C: Clone + Debug + Serialize + DeserializeOwned + 'static,
    E: Debug + 'static,
    I: 'static,
    F: Fn(&C, &E) -> C + 'static,
{
    type Snapshot = ReducerSnapshot<C>;
    type Event = E;
    type Input = I;
    type Emitted = ();

    fn initial_snapshot(&self, _scope: &ActorScope<Self>, input: I) -> Self::Snapshot {
        ReducerSnapshot {
            context: (self.init)(input),
            status: Status::Active,
            error: None,
        }
    }

    fn transition(
        &self,
        snapshot: Self::Snapshot,
        event: E,
        _scope: &ActorScope<Self>,
    ) -> Result<Self::Snapshot, ActorFault> {
        Ok(ReducerSnapshot {
            context: (self.reduce)(&snapshot.context, &event),
            ..snapshot
        })
    }

    fn persisted_snapshot(&self, snapshot: &Self::Snapshot) -> Result<serde_json::Value, PersistError> {
        to_persisted(snapshot)
    }

    fn restore_snapshot(&self, persisted: serde_json::Value) -> Result<Self::Snapshot, PersistError> {
        from_persisted(persisted)
    }
}
