//! # Callback Logic
//!
//! Wraps an imperative callback invoked once at `start`. The callback wires
//! itself to the outside world through the handles it receives: `send_back`
//! delivers events to the spawning parent, `receive` registers any number of
//! independent listeners for inbound events, `emit` publishes out-of-band
//! events to [`on_emit`](crate::kernel::ActorRef::on_emit) listeners, and the
//! returned [`Disposer`] (if any) runs when the actor stops.
//!
//! The snapshot of a callback actor never changes in response to received
//! events — its observable state is its lifecycle alone.

use std::any::Any;
use std::cell::RefCell;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace};

use crate::error::{ActorFault, PersistError};
use crate::kernel::{ActorScope, AnyActorRef};
use crate::kernel::AnyActor;
use crate::logic::{from_persisted, to_persisted, ActorLogic, StatusSnapshot};
use crate::message::AnyMessage;
use crate::snapshot::Status;
use crate::system::ActorSystem;

/// Cleanup closure returned by a callback body, run at most once on stop.
pub type Disposer = Box<dyn FnOnce()>;

type ListenerSet<E> = Rc<RefCell<Vec<Rc<dyn Fn(&E)>>>>;

/// Delivers events from the callback body to the spawning parent. Becomes a
/// silent no-op once the owning actor leaves `active`, defending against
/// late delivery after a logical stop.
pub struct SendBack<Sent> {
    me: Weak<dyn AnyActor>,
    parent: Option<Weak<dyn AnyActor>>,
    system: ActorSystem,
    _sent: PhantomData<fn(Sent)>,
}

impl<Sent> Clone for SendBack<Sent> {
    fn clone(&self) -> Self {
        Self {
            me: self.me.clone(),
            parent: self.parent.clone(),
            system: self.system.clone(),
            _sent: PhantomData,
        }
    }
}

impl<Sent: Any + Debug> SendBack<Sent> {
    pub fn send(&self, event: Sent) {
        let Some(me) = self.me.upgrade() else { return };
        if me.status() != Status::Active {
            trace!(id = me.id(), event = ?event, "send_back after stop ignored");
            return;
        }
        let Some(parent) = self.parent.as_ref().and_then(Weak::upgrade) else {
            debug!(id = me.id(), "send_back from a root callback dropped");
            return;
        };
        self.system.relay(
            Some(self.me.clone()),
            &AnyActorRef::from_rc(parent),
            AnyMessage::new(event),
        );
    }
}

/// Registers listeners for events delivered to the callback actor. Every
/// registered listener sees every inbound event; registration order is
/// fan-out order.
pub struct Receive<E> {
    listeners: ListenerSet<E>,
}

impl<E> Receive<E> {
    pub fn listen(&self, listener: impl Fn(&E) + 'static) {
        self.listeners.borrow_mut().push(Rc::new(listener));
    }
}

/// Publishes out-of-band events to the callback actor's
/// [`on_emit`](crate::kernel::ActorRef::on_emit) listeners. Fan-out is
/// deferred past the commit of any macrostep in flight; a terminal owner
/// drops the event.
pub struct Emit<Em> {
    inner: Rc<dyn Fn(Em)>,
}

impl<Em> Clone for Emit<Em> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<Em> Emit<Em> {
    pub fn emit(&self, event: Em) {
        (self.inner)(event)
    }
}

/// Everything a callback body gets to work with.
pub struct CallbackArgs<E, Sent, In, Em> {
    pub input: In,
    pub send_back: SendBack<Sent>,
    pub receive: Receive<E>,
    pub emit: Emit<Em>,
    pub self_ref: AnyActorRef,
    pub system: ActorSystem,
}

struct CallbackAux<E> {
    listeners: ListenerSet<E>,
    disposer: Option<Disposer>,
}

impl<E> Default for CallbackAux<E> {
    fn default() -> Self {
        Self {
            listeners: ListenerSet::default(),
            disposer: None,
        }
    }
}

pub struct CallbackLogic<E, Sent, In, Em, F> {
    callback: F,
    _marker: PhantomData<(fn(E), fn(Sent), fn(In), fn(Em))>,
}

/// Actor logic from an imperative callback body.
pub fn from_callback<E, Sent, In, Em, F>(callback: F) -> CallbackLogic<E, Sent, In, Em, F>
where
    E: Debug + 'static,
    Sent: Any + Debug + 'static,
    In: Clone + Debug + Serialize + DeserializeOwned + 'static,
    Em: 'static,
    F: Fn(CallbackArgs<E, Sent, In, Em>) -> Option<Disposer> + 'static,
{
    CallbackLogic {
        callback,
        _marker: PhantomData,
    }
}

impl<E, Sent, In, Em, F> ActorLogic for CallbackLogic<E, Sent, In, Em, F>
where
    E: Debug + 'static,
    Sent: Any + Debug + 'static,
    In: Clone + Debug + Serialize + DeserializeOwned + 'static,
    Em: 'static,
    F: Fn(CallbackArgs<E, Sent, In, Em>) -> Option<Disposer> + 'static,
{
    type Snapshot = StatusSnapshot<In>;
    type Event = E;
    type Input = In;
    type Emitted = Em;

    fn initial_snapshot(&self, _scope: &ActorScope<Self>, input: In) -> Self::Snapshot {
        StatusSnapshot::active(input)
    }

    /// Fan the event out to every registered listener — deferred past the
    /// commit, since listeners are user effects.
    fn transition(
        &self,
        snapshot: Self::Snapshot,
        event: E,
        scope: &ActorScope<Self>,
    ) -> Result<Self::Snapshot, ActorFault> {
        let inner = scope.clone();
        scope.defer(move || {
            let listeners: Vec<Rc<dyn Fn(&E)>> = inner
                .with_aux::<CallbackAux<E>, _>(|aux| aux.listeners.borrow().clone());
            for listener in listeners {
                listener(&event);
            }
        });
        Ok(snapshot)
    }

    fn start(&self, snapshot: &Self::Snapshot, scope: &ActorScope<Self>) -> Result<(), ActorFault> {
        let input = snapshot
            .input
            .clone()
            .ok_or_else(|| ActorFault::new("callback restored without its input"))?;
        let listeners = scope.with_aux::<CallbackAux<E>, _>(|aux| aux.listeners.clone());
        let emit = {
            let scope = scope.clone();
            Emit {
                inner: Rc::new(move |event| {
                    let Some(cell) = scope.cell.upgrade() else { return };
                    if cell.status().is_terminal() {
                        trace!(id = cell.id, "emit after terminal status ignored");
                        return;
                    }
                    if cell.is_processing() {
                        // Fan-out waits for the in-flight step to commit.
                        let deferred = cell.clone();
                        cell.defer(Box::new(move || deferred.fan_out_emit(&event)));
                    } else {
                        cell.fan_out_emit(&event);
                    }
                }),
            }
        };
        let args = CallbackArgs {
            input,
            send_back: SendBack {
                me: scope.any_weak(),
                parent: scope.parent().map(|p| p.downgrade()),
                system: scope.system(),
                _sent: PhantomData,
            },
            receive: Receive { listeners },
            emit,
            self_ref: scope.self_ref().as_any(),
            system: scope.system(),
        };
        let disposer = (self.callback)(args);
        scope.with_aux::<CallbackAux<E>, _>(|aux| aux.disposer = disposer);
        Ok(())
    }

    fn on_stop(&self, scope: &ActorScope<Self>) {
        let disposer = scope.with_aux::<CallbackAux<E>, _>(|aux| {
            aux.listeners.borrow_mut().clear();
            aux.disposer.take()
        });
        if let Some(disposer) = disposer {
            debug!(id = scope.id(), "running callback disposer");
            disposer();
        }
    }

    fn persisted_snapshot(&self, snapshot: &Self::Snapshot) -> Result<serde_json::Value, PersistError> {
        to_persisted(snapshot)
    }

    fn restore_snapshot(&self, persisted: serde_json::Value) -> Result<Self::Snapshot, PersistError> {
        from_persisted(persisted)
    }
}
