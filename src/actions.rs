//! # Action Resolution Protocol
//!
//! The raise/send family of actions runs in two strictly ordered phases:
//!
//! 1. **Resolve** — pure relative to the snapshot. Runs *during* the owning
//!    actor's transition: computes the final payload, target and delay, and
//!    fails synchronously (as a logic fault) if a named target cannot be
//!    found. Produces a [`ConcreteAction`] with everything fully resolved.
//! 2. **Execute** — effects only, never snapshot mutation. Runs only after
//!    the owning actor's entire macrostep has produced a committed next
//!    snapshot. Send-family delivery additionally goes through the scope's
//!    deferred-effect queue, so a recipient never observes the sender
//!    mid-transition — even when the target is the sender itself.
//!
//! # Architecture Note
//! Separating pure computation from effects lets the kernel compute a
//! deterministic, inspectable next snapshot for an entire macrostep before
//! any effect fires, and lets several actions in one step observe a
//! consistently-evolving but not-yet-externally-visible snapshot.

use std::any::Any;
use std::fmt::Debug;
use std::time::Duration;

use crate::error::ActorFault;
use crate::kernel::{ActorScope, AnyActorRef};
use crate::logic::ActorLogic;
use crate::message::AnyMessage;

/// Where a send-family action delivers.
pub enum SendTarget {
    /// The actor that spawned the sender. Resolution fails for roots.
    Parent,
    /// The sender itself, as a fresh external event (a new macrostep, unlike
    /// `raise` which stays within the current one).
    Internal,
    /// An owned child, looked up by the name it was spawned under.
    Child(String),
    /// A registry lookup by system id.
    Keyed(String),
    /// An explicit handle.
    Ref(AnyActorRef),
}

impl SendTarget {
    fn resolve<L: ActorLogic>(self, scope: &ActorScope<L>) -> Result<AnyActorRef, ActorFault> {
        match self {
            SendTarget::Parent => scope
                .parent()
                .ok_or_else(|| ActorFault::new("send target 'parent': actor has no parent")),
            SendTarget::Internal => Ok(scope.self_ref().as_any()),
            SendTarget::Child(name) => scope.child_named(&name).ok_or_else(|| {
                ActorFault::new(format!("send target: no child named '{name}'"))
            }),
            SendTarget::Keyed(key) => scope.system().get(&key).ok_or_else(|| {
                ActorFault::new(format!("send target: no actor registered as '{key}'"))
            }),
            SendTarget::Ref(actor) => Ok(actor),
        }
    }
}

/// An unresolved action descriptor. Built by the free functions in this
/// module and attached from inside a `transition` via
/// [`DynamicAction::attach`] (or [`resolve_actions`] for a batch).
pub struct DynamicAction<L: ActorLogic> {
    kind: &'static str,
    #[allow(clippy::type_complexity)]
    resolve: Box<
        dyn FnOnce(
            L::Snapshot,
            &ActorScope<L>,
        ) -> Result<(L::Snapshot, ConcreteAction<L>), ActorFault>,
    >,
}

impl<L: ActorLogic> DynamicAction<L> {
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Run the resolve phase now (still inside the pure transition) and
    /// queue the resolved action for the execute phase after commit. An
    /// unresolvable target surfaces here, as a logic fault of the attaching
    /// transition — never later.
    pub fn attach(
        self,
        snapshot: L::Snapshot,
        scope: &ActorScope<L>,
    ) -> Result<L::Snapshot, ActorFault> {
        let (next, concrete) = (self.resolve)(snapshot, scope)?;
        scope.push_action(concrete);
        Ok(next)
    }
}

/// Attach a batch of actions in order, threading the snapshot through each
/// resolve phase.
pub fn resolve_actions<L: ActorLogic>(
    snapshot: L::Snapshot,
    scope: &ActorScope<L>,
    actions: impl IntoIterator<Item = DynamicAction<L>>,
) -> Result<L::Snapshot, ActorFault> {
    let mut snapshot = snapshot;
    for action in actions {
        snapshot = action.attach(snapshot, scope)?;
    }
    Ok(snapshot)
}

/// A fully resolved action: effects only, every parameter already computed.
pub struct ConcreteAction<L: ActorLogic> {
    kind: &'static str,
    params: String,
    execute: Box<dyn FnOnce(&ActorScope<L>)>,
}

impl<L: ActorLogic> ConcreteAction<L> {
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Human-readable rendering of the resolved parameters.
    pub fn params(&self) -> &str {
        &self.params
    }

    pub(crate) fn run(self, scope: &ActorScope<L>) {
        (self.execute)(scope);
    }

    fn noop(kind: &'static str, params: String) -> Self {
        Self {
            kind,
            params,
            execute: Box::new(|_| {}),
        }
    }
}

/// Raise an event on the raising actor itself, processed as a microstep of
/// the *current* macrostep, FIFO after earlier raises.
pub fn raise<L: ActorLogic>(event: L::Event) -> DynamicAction<L> {
    DynamicAction {
        kind: "raise",
        resolve: Box::new(move |snapshot, scope| {
            let params = format!("{event:?}");
            // Queued during resolution so it drains within this macrostep.
            scope.raise(event);
            Ok((snapshot, ConcreteAction::noop("raise", params)))
        }),
    }
}

/// Raise an event on self after `delay`. The timer is armed in the execute
/// phase and cancelled if the actor terminates first.
pub fn raise_after<L: ActorLogic>(event: L::Event, delay: Duration) -> DynamicAction<L> {
    DynamicAction {
        kind: "raise_after",
        resolve: Box::new(move |snapshot, _scope| {
            let params = format!("{event:?} after {delay:?}");
            let concrete = ConcreteAction {
                kind: "raise_after",
                params,
                execute: Box::new(move |scope: &ActorScope<L>| {
                    let me = scope.any_weak();
                    let origin = me.clone();
                    let system = scope.system();
                    scope.schedule(
                        delay,
                        Box::new(move || {
                            if let Some(cell) = me.upgrade() {
                                let target = AnyActorRef::from_rc(cell);
                                system.relay(Some(origin), &target, AnyMessage::new(event));
                            }
                        }),
                    );
                }),
            };
            Ok((snapshot, concrete))
        }),
    }
}

fn send<L: ActorLogic, E: Any + Debug>(
    kind: &'static str,
    target: SendTarget,
    event: E,
    delay: Option<Duration>,
) -> DynamicAction<L> {
    DynamicAction {
        kind,
        resolve: Box::new(move |snapshot, scope| {
            let target = target.resolve(scope)?;
            let message = AnyMessage::new(event);
            let params = format!("{} -> actor {}", message.describe(), target.id());
            let concrete = ConcreteAction {
                kind,
                params,
                execute: Box::new(move |scope: &ActorScope<L>| {
                    let origin = scope.any_weak();
                    let system = scope.system();
                    match delay {
                        None => scope.defer(move || system.relay(Some(origin), &target, message)),
                        Some(delay) => scope.schedule(
                            delay,
                            Box::new(move || system.relay(Some(origin), &target, message)),
                        ),
                    }
                }),
            };
            Ok((snapshot, concrete))
        }),
    }
}

/// Send an event to a resolved target. Delivery is deferred past the current
/// macrostep's commit.
pub fn send_to<L: ActorLogic, E: Any + Debug>(target: SendTarget, event: E) -> DynamicAction<L> {
    send("send_to", target, event, None)
}

/// Send an event to a resolved target after `delay`.
pub fn send_to_after<L: ActorLogic, E: Any + Debug>(
    target: SendTarget,
    event: E,
    delay: Duration,
) -> DynamicAction<L> {
    send("send_to_after", target, event, Some(delay))
}

/// Send an event to the spawning parent.
pub fn send_parent<L: ActorLogic, E: Any + Debug>(event: E) -> DynamicAction<L> {
    send("send_parent", SendTarget::Parent, event, None)
}

/// Send an event back to whichever actor sent the event currently being
/// processed. Fails at resolve time if the event carried no origin.
pub fn respond<L: ActorLogic, E: Any + Debug>(event: E) -> DynamicAction<L> {
    DynamicAction {
        kind: "respond",
        resolve: Box::new(move |snapshot, scope| {
            let target = scope
                .current_origin()
                .ok_or_else(|| ActorFault::new("respond: current event has no origin"))?;
            let message = AnyMessage::new(event);
            let params = format!("{} -> actor {}", message.describe(), target.id());
            let concrete = ConcreteAction {
                kind: "respond",
                params,
                execute: Box::new(move |scope: &ActorScope<L>| {
                    let origin = scope.any_weak();
                    let system = scope.system();
                    scope.defer(move || system.relay(Some(origin), &target, message));
                }),
            };
            Ok((snapshot, concrete))
        }),
    }
}

/// Re-deliver an event to another actor unchanged.
pub fn forward_to<L: ActorLogic, E: Any + Debug>(target: SendTarget, event: E) -> DynamicAction<L> {
    send("forward_to", target, event, None)
}

/// Surface a fault on the parent's error channel. For a root actor the
/// fault has nowhere to go but the escalating actor itself, so resolution
/// fails with it directly.
pub fn escalate<L: ActorLogic>(fault: ActorFault) -> DynamicAction<L> {
    DynamicAction {
        kind: "escalate",
        resolve: Box::new(move |snapshot, scope| {
            let Some(parent) = scope.parent() else {
                return Err(fault);
            };
            let params = format!("{fault} -> actor {}", parent.id());
            let concrete = ConcreteAction {
                kind: "escalate",
                params,
                execute: Box::new(move |scope: &ActorScope<L>| {
                    scope.defer(move || parent.escalate(fault));
                }),
            };
            Ok((snapshot, concrete))
        }),
    }
}
