//! # Stream Logic
//!
//! Two forms over one consumption loop:
//!
//! - [`from_stream`]: the plain form. Each item replaces the snapshot's
//!   context; stream completion moves the actor to `done`, a stream error to
//!   `error`.
//! - [`from_event_stream`]: the event-emitting form. Items are not state at
//!   all — each one is forwarded directly to the spawning parent as an
//!   inbound event.
//!
//! Both subscribe exactly once, at `start`, and never resubscribe once
//! terminal — restoring from a terminal persisted snapshot skips the start
//! hook entirely, so a finished stream stays finished. Unsubscription on
//! stop is synchronous (the consumer task is aborted, not asked to wind
//! down), and the live subscription handle is never part of the persisted
//! snapshot.

use std::any::Any;
use std::fmt::Debug;
use std::marker::PhantomData;

use futures::stream::LocalBoxStream;
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ActorFault, PersistError};
use crate::kernel::{ActorScope, AnyActorRef};
use crate::logic::{from_persisted, to_persisted, ActorLogic, StatusSnapshot};
use crate::message::AnyMessage;
use crate::snapshot::{SnapshotLike, Status};

/// Arguments handed to the stream creator.
pub struct StreamArgs<In> {
    pub input: In,
}

/// Synthetic internal events the consumer loop relays to its actor.
#[derive(Debug)]
pub enum StreamEvent<T> {
    Next(T),
    Error(ActorFault),
    Complete,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamSnapshot<T, In> {
    pub status: Status,
    /// Most recent item, if any arrived yet.
    pub context: Option<T>,
    pub error: Option<ActorFault>,
    pub input: Option<In>,
}

impl<T, In> SnapshotLike for StreamSnapshot<T, In>
where
    T: Clone + Debug + 'static,
    In: Clone + Debug + 'static,
{
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

type StreamCreator<T, In> =
    Box<dyn Fn(StreamArgs<In>) -> LocalBoxStream<'static, Result<T, ActorFault>>>;

/// Aux slot: the abort handle for the consumer task. Aborting it is the
/// synchronous unsubscribe.
#[derive(Default)]
struct StreamAux {
    consumer: Option<tokio::task::AbortHandle>,
}

/// Drive the creator's stream, relaying each item back to the actor as a
/// synthetic event. Shared by both forms.
fn consume<L, T>(scope: &ActorScope<L>, stream: LocalBoxStream<'static, Result<T, ActorFault>>)
where
    L: ActorLogic<Event = StreamEvent<T>>,
    T: Debug + 'static,
{
    let me = scope.any_weak();
    let origin = me.clone();
    let system = scope.system();
    let handle = tokio::task::spawn_local(async move {
        let mut stream = stream;
        loop {
            let item = stream.next().await;
            let Some(cell) = me.upgrade() else { break };
            if cell.status() != Status::Active {
                break;
            }
            let event = match item {
                Some(Ok(value)) => StreamEvent::Next(value),
                Some(Err(fault)) => StreamEvent::Error(fault),
                None => StreamEvent::Complete,
            };
            let finished = !matches!(event, StreamEvent::Next(_));
            let target = AnyActorRef::from_rc(cell);
            system.relay(Some(origin.clone()), &target, AnyMessage::new(event));
            if finished {
                break;
            }
        }
    });
    scope.with_aux::<StreamAux, _>(|aux| aux.consumer = Some(handle.abort_handle()));
}

fn unsubscribe<L: ActorLogic>(scope: &ActorScope<L>) {
    let consumer = scope.with_aux::<StreamAux, _>(|aux| aux.consumer.take());
    if let Some(consumer) = consumer {
        debug!(id = scope.id(), "unsubscribing stream consumer");
        consumer.abort();
    }
}

pub struct StreamLogic<T, In> {
    creator: StreamCreator<T, In>,
}

/// Actor logic whose snapshot tracks the latest item of a stream. Requires a
/// tokio `LocalSet` context when started.
pub fn from_stream<T, In, F, St>(creator: F) -> StreamLogic<T, In>
where
    T: Clone + Debug + Serialize + DeserializeOwned + 'static,
    In: Clone + Debug + Serialize + DeserializeOwned + 'static,
    F: Fn(StreamArgs<In>) -> St + 'static,
    St: Stream<Item = Result<T, ActorFault>> + 'static,
{
    StreamLogic {
        creator: Box::new(move |args| creator(args).boxed_local()),
    }
}

impl<T, In> ActorLogic for StreamLogic<T, In>
where
    T: Clone + Debug + Serialize + DeserializeOwned + 'static,
    In: Clone + Debug + Serialize + DeserializeOwned + 'static,
{
    type Snapshot = StreamSnapshot<T, In>;
    type Event = StreamEvent<T>;
    type Input = In;
    type Emitted = ();

    fn initial_snapshot(&self, _scope: &ActorScope<Self>, input: In) -> Self::Snapshot {
        StreamSnapshot {
            status: Status::Active,
            context: None,
            error: None,
            input: Some(input),
        }
    }

    fn transition(
        &self,
        mut snapshot: Self::Snapshot,
        event: StreamEvent<T>,
        _scope: &ActorScope<Self>,
    ) -> Result<Self::Snapshot, ActorFault> {
        match event {
            StreamEvent::Next(value) => {
                snapshot.context = Some(value);
                Ok(snapshot)
            }
            StreamEvent::Error(fault) => Err(fault),
            StreamEvent::Complete => {
                snapshot.status = Status::Done;
                Ok(snapshot)
            }
        }
    }

    fn start(&self, snapshot: &Self::Snapshot, scope: &ActorScope<Self>) -> Result<(), ActorFault> {
        let input = snapshot
            .input
            .clone()
            .ok_or_else(|| ActorFault::new("stream restored without its input"))?;
        consume(scope, (self.creator)(StreamArgs { input }));
        Ok(())
    }

    fn on_stop(&self, scope: &ActorScope<Self>) {
        unsubscribe(scope);
    }

    fn persisted_snapshot(&self, snapshot: &Self::Snapshot) -> Result<serde_json::Value, PersistError> {
        to_persisted(snapshot)
    }

    fn restore_snapshot(&self, persisted: serde_json::Value) -> Result<Self::Snapshot, PersistError> {
        from_persisted(persisted)
    }
}

pub struct EventStreamLogic<T, In> {
    creator: StreamCreator<T, In>,
    _item: PhantomData<fn(T)>,
}

/// Actor logic that forwards every stream item to the spawning parent.
/// Requires a tokio `LocalSet` context when started.
pub fn from_event_stream<T, In, F, St>(creator: F) -> EventStreamLogic<T, In>
where
    T: Any + Clone + Debug + 'static,
    In: Clone + Debug + Serialize + DeserializeOwned + 'static,
    F: Fn(StreamArgs<In>) -> St + 'static,
    St: Stream<Item = Result<T, ActorFault>> + 'static,
{
    EventStreamLogic {
        creator: Box::new(move |args| creator(args).boxed_local()),
        _item: PhantomData,
    }
}

impl<T, In> ActorLogic for EventStreamLogic<T, In>
where
    T: Any + Clone + Debug + 'static,
    In: Clone + Debug + Serialize + DeserializeOwned + 'static,
{
    type Snapshot = StatusSnapshot<In>;
    type Event = StreamEvent<T>;
    type Input = In;
    type Emitted = ();

    fn initial_snapshot(&self, _scope: &ActorScope<Self>, input: In) -> Self::Snapshot {
        StatusSnapshot::active(input)
    }

    fn transition(
        &self,
        mut snapshot: Self::Snapshot,
        event: StreamEvent<T>,
        scope: &ActorScope<Self>,
    ) -> Result<Self::Snapshot, ActorFault> {
        match event {
            StreamEvent::Next(value) => {
                if let Some(parent) = scope.parent() {
                    let origin = scope.any_weak();
                    let system = scope.system();
                    scope.defer(move || system.relay(Some(origin), &parent, AnyMessage::new(value)));
                } else {
                    debug!(id = scope.id(), item = ?value, "event stream without parent dropped item");
                }
                Ok(snapshot)
            }
            StreamEvent::Error(fault) => Err(fault),
            StreamEvent::Complete => {
                snapshot.status = Status::Done;
                Ok(snapshot)
            }
        }
    }

    fn start(&self, snapshot: &Self::Snapshot, scope: &ActorScope<Self>) -> Result<(), ActorFault> {
        let input = snapshot
            .input
            .clone()
            .ok_or_else(|| ActorFault::new("event stream restored without its input"))?;
        consume(scope, (self.creator)(StreamArgs { input }));
        Ok(())
    }

    fn on_stop(&self, scope: &ActorScope<Self>) {
        unsubscribe(scope);
    }

    fn persisted_snapshot(&self, snapshot: &Self::Snapshot) -> Result<serde_json::Value, PersistError> {
        to_persisted(snapshot)
    }

    fn restore_snapshot(&self, persisted: serde_json::Value) -> Result<Self::Snapshot, PersistError> {
        from_persisted(persisted)
    }
}
