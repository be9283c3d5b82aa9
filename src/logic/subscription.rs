//! # Subscription Logic
//!
//! Bridges another actor's snapshot/done/error lifecycle into mapped events
//! for this actor's own parent. Each source update is relayed to the bridge
//! as a synthetic event, mapped, and forwarded — so the bridge itself stays
//! an ordinary actor with every mutation inside `transition`.
//!
//! Delivery is guarded on both sides: a source update arriving once the
//! bridge has left `active` is dropped, and a stopped source detaches its
//! observers so nothing fires afterwards. Source completion completes the
//! bridge; a source fault fails it (after forwarding the mapped event, if
//! the mapper produced one).

use std::any::Any;
use std::fmt::Debug;
use std::rc::Rc;

use tracing::debug;

use crate::error::{ActorFault, PersistError};
use crate::kernel::{ActorRef, ActorScope, AnyActorRef, Observer, Subscription};
use crate::logic::{from_persisted, to_persisted, ActorLogic, StatusSnapshot};
use crate::message::AnyMessage;
use crate::snapshot::Status;

/// One observed change of the source actor.
#[derive(Clone, Debug)]
pub enum SourceUpdate<S> {
    Next(S),
    Error(ActorFault),
    Complete,
}

/// Synthetic internal event carrying a source update to the bridge.
#[derive(Debug)]
pub struct BridgeEvent<S>(pub SourceUpdate<S>);

type Sink<S> = Rc<dyn Fn(SourceUpdate<S>)>;

pub struct SubscriptionLogic<S, M> {
    attach: Box<dyn Fn(Sink<S>) -> Subscription>,
    map: Rc<dyn Fn(SourceUpdate<S>) -> Option<M>>,
}

/// Bridge `source`'s lifecycle into events for this actor's parent. The
/// mapper may return `None` to swallow an update.
pub fn from_actor<SL, M, F>(
    source: &ActorRef<SL>,
    map: F,
) -> SubscriptionLogic<SL::Snapshot, M>
where
    SL: ActorLogic,
    M: Any + Debug + 'static,
    F: Fn(SourceUpdate<SL::Snapshot>) -> Option<M> + 'static,
{
    let source = source.clone();
    SubscriptionLogic {
        attach: Box::new(move |sink| {
            let on_next = sink.clone();
            let on_error = sink.clone();
            let on_complete = sink;
            source.subscribe_observer(
                Observer::new()
                    .on_next(move |snapshot: &SL::Snapshot| {
                        on_next(SourceUpdate::Next(snapshot.clone()))
                    })
                    .on_error(move |fault| on_error(SourceUpdate::Error(fault.clone())))
                    .on_complete(move || on_complete(SourceUpdate::Complete)),
            )
        }),
        map: Rc::new(map),
    }
}

/// Aux slot: the live observer handle on the source.
#[derive(Default)]
struct BridgeAux {
    subscription: Option<Subscription>,
}

impl<S, M> ActorLogic for SubscriptionLogic<S, M>
where
    S: Clone + Debug + 'static,
    M: Any + Debug + 'static,
{
    type Snapshot = StatusSnapshot<()>;
    type Event = BridgeEvent<S>;
    type Input = ();
    type Emitted = ();

    fn initial_snapshot(&self, _scope: &ActorScope<Self>, input: ()) -> Self::Snapshot {
        StatusSnapshot::active(input)
    }

    fn transition(
        &self,
        mut snapshot: Self::Snapshot,
        event: BridgeEvent<S>,
        scope: &ActorScope<Self>,
    ) -> Result<Self::Snapshot, ActorFault> {
        let BridgeEvent(update) = event;
        let outcome = match &update {
            SourceUpdate::Next(_) => None,
            SourceUpdate::Complete => {
                snapshot.status = Status::Done;
                None
            }
            SourceUpdate::Error(fault) => Some(fault.clone()),
        };
        if let Some(mapped) = (self.map)(update) {
            if let Some(parent) = scope.parent() {
                let origin = scope.any_weak();
                let system = scope.system();
                scope.defer(move || system.relay(Some(origin), &parent, AnyMessage::new(mapped)));
            } else {
                debug!(id = scope.id(), event = ?mapped, "bridge without parent dropped event");
            }
        }
        match outcome {
            Some(fault) => Err(fault),
            None => Ok(snapshot),
        }
    }

    fn start(&self, _snapshot: &Self::Snapshot, scope: &ActorScope<Self>) -> Result<(), ActorFault> {
        let me = scope.any_weak();
        let origin = me.clone();
        let system = scope.system();
        let sink: Sink<S> = Rc::new(move |update| {
            let Some(cell) = me.upgrade() else { return };
            if cell.status() != Status::Active {
                return;
            }
            system.relay(
                Some(origin.clone()),
                &AnyActorRef::from_rc(cell),
                AnyMessage::new(BridgeEvent(update)),
            );
        });
        let subscription = (self.attach)(sink);
        scope.with_aux::<BridgeAux, _>(|aux| aux.subscription = Some(subscription));
        Ok(())
    }

    fn on_stop(&self, scope: &ActorScope<Self>) {
        let subscription = scope.with_aux::<BridgeAux, _>(|aux| aux.subscription.take());
        if let Some(subscription) = subscription {
            debug!(id = scope.id(), "detaching bridge from its source");
            subscription.unsubscribe();
        }
    }

    fn persisted_snapshot(&self, snapshot: &Self::Snapshot) -> Result<serde_json::Value, PersistError> {
        to_persisted(snapshot)
    }

    fn restore_snapshot(&self, persisted: serde_json::Value) -> Result<Self::Snapshot, PersistError> {
        from_persisted(persisted)
    }
}
