//! # Async Task Logic
//!
//! Wraps one asynchronous computation. The creator runs exactly once, at
//! `start` — never again after a terminal status, including when the actor
//! was restored from a terminal persisted snapshot. The future's settlement
//! is relayed back to the actor as a synthetic resolve/reject event, so every
//! snapshot change still happens inside `transition`.
//!
//! Cancellation is cooperative: the task receives a [`CancelSignal`] it can
//! await or poll, triggered when the actor stops. A settlement that arrives
//! after the actor already left `active` is discarded without effect.
//!
//! Children spawned from the task body (through [`TaskArgs::spawn`]) belong
//! to the task actor's owned subtree and are stopped when it reaches any
//! terminal status.

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{ActorFault, PersistError};
use crate::kernel::{ActorScope, AnyActorRef, Spawner};
use crate::logic::{from_persisted, to_persisted, ActorLogic};
use crate::message::AnyMessage;
use crate::snapshot::{SnapshotLike, Status};

/// Cooperative cancellation token handed to the task body. Resolves (as a
/// future) when the owning actor stops.
#[derive(Clone)]
pub struct CancelSignal {
    state: Rc<CancelState>,
}

struct CancelState {
    cancelled: Cell<bool>,
    waker: RefCell<Option<Waker>>,
}

impl CancelSignal {
    pub(crate) fn new() -> Self {
        Self {
            state: Rc::new(CancelState {
                cancelled: Cell::new(false),
                waker: RefCell::new(None),
            }),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.get()
    }

    pub(crate) fn cancel(&self) {
        self.state.cancelled.set(true);
        if let Some(waker) = self.state.waker.borrow_mut().take() {
            waker.wake();
        }
    }
}

impl Future for CancelSignal {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.state.cancelled.get() {
            Poll::Ready(())
        } else {
            *self.state.waker.borrow_mut() = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}

/// Arguments handed to the task body.
pub struct TaskArgs<In> {
    pub input: In,
    pub signal: CancelSignal,
    /// Spawn owned children from inside the task body. They join the task
    /// actor's subtree and are stopped when it reaches any terminal status.
    pub spawn: Spawner,
}

/// Synthetic settlement events the task relays to itself.
#[derive(Debug)]
pub enum TaskEvent<Out> {
    Resolve(Out),
    Reject(ActorFault),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot<Out, In> {
    pub status: Status,
    pub output: Option<Out>,
    pub error: Option<ActorFault>,
    pub input: Option<In>,
}

impl<Out, In> SnapshotLike for TaskSnapshot<Out, In>
where
    Out: Clone + Debug + 'static,
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

pub struct AsyncTaskLogic<In, Out> {
    #[allow(clippy::type_complexity)]
    creator: Box<dyn Fn(TaskArgs<In>) -> LocalBoxFuture<'static, Result<Out, ActorFault>>>,
}

/// Actor logic from one async computation. Requires a tokio `LocalSet`
/// context when started.
pub fn from_task<In, Out, F, Fut>(creator: F) -> AsyncTaskLogic<In, Out>
where
    In: Clone + Debug + Serialize + DeserializeOwned + 'static,
    Out: Clone + Debug + Serialize + DeserializeOwned + 'static,
    F: Fn(TaskArgs<In>) -> Fut + 'static,
    Fut: Future<Output = Result<Out, ActorFault>> + 'static,
{
    AsyncTaskLogic {
        creator: Box::new(move |args| creator(args).boxed_local()),
    }
}

/// Aux slot: the live cancellation signal. Never serialized; a restored
/// actor begins with an empty slot.
#[derive(Default)]
struct TaskAux {
    signal: Option<CancelSignal>,
}

impl<In, Out> ActorLogic for AsyncTaskLogic<In, Out>
where
    In: Clone + Debug + Serialize + DeserializeOwned + 'static,
    Out: Clone + Debug + Serialize + DeserializeOwned + 'static,
{
    type Snapshot = TaskSnapshot<Out, In>;
    type Event = TaskEvent<Out>;
    type Input = In;
    type Emitted = ();

    fn initial_snapshot(&self, _scope: &ActorScope<Self>, input: In) -> Self::Snapshot {
        TaskSnapshot {
            status: Status::Active,
            output: None,
            error: None,
            input: Some(input),
        }
    }

    fn transition(
        &self,
        mut snapshot: Self::Snapshot,
        event: TaskEvent<Out>,
        _scope: &ActorScope<Self>,
    ) -> Result<Self::Snapshot, ActorFault> {
        match event {
            TaskEvent::Resolve(output) => {
                snapshot.status = Status::Done;
                snapshot.output = Some(output);
                Ok(snapshot)
            }
            TaskEvent::Reject(fault) => Err(fault),
        }
    }

    fn start(&self, snapshot: &Self::Snapshot, scope: &ActorScope<Self>) -> Result<(), ActorFault> {
        let input = snapshot
            .input
            .clone()
            .ok_or_else(|| ActorFault::new("task restored without its input"))?;

        let signal = CancelSignal::new();
        scope.with_aux::<TaskAux, _>(|aux| aux.signal = Some(signal.clone()));

        let future = (self.creator)(TaskArgs {
            input,
            signal,
            spawn: scope.spawner(),
        });
        let me = scope.any_weak();
        let origin = me.clone();
        let system = scope.system();
        tokio::task::spawn_local(async move {
            let settlement = future.await;
            let Some(cell) = me.upgrade() else { return };
            if cell.status() != Status::Active {
                // Settled after stop or failure: discard, never resurrect.
                trace!(id = cell.id(), "late task settlement discarded");
                return;
            }
            let event = match settlement {
                Ok(output) => TaskEvent::Resolve(output),
                Err(fault) => TaskEvent::Reject(fault),
            };
            let target = AnyActorRef::from_rc(cell);
            system.relay(Some(origin), &target, AnyMessage::new(event));
        });
        Ok(())
    }

    fn on_stop(&self, scope: &ActorScope<Self>) {
        scope.with_aux::<TaskAux, _>(|aux| {
            if let Some(signal) = aux.signal.take() {
                debug!(id = scope.id(), "cancelling task");
                signal.cancel();
            }
        });
    }

    fn persisted_snapshot(&self, snapshot: &Self::Snapshot) -> Result<serde_json::Value, PersistError> {
        to_persisted(snapshot)
    }

    fn restore_snapshot(&self, persisted: serde_json::Value) -> Result<Self::Snapshot, PersistError> {
        from_persisted(persisted)
    }
}
