//! # Actor System
//!
//! The [`ActorSystem`] is the shared context every actor in one tree belongs
//! to: a monotonic id allocator, the registry of live actors (with an
//! optional string key per actor), the relay all cross-actor sends travel
//! through, and the dead-letter record for undeliverable events.
//!
//! # Architecture Note
//! The relay is a deliberate choke point. Every send — typed handle, erased
//! handle, action, timer — funnels through [`ActorSystem::relay`], which is
//! the single place delivery failures are turned into dead-letter records
//! instead of panics. One choke point means one log line format and one
//! inspection surface for "where did my event go".

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::RegistryError;
use crate::kernel::{create_actor, ActorOptions, AnyActor, AnyActorRef};
use crate::logic::from_reducer;
use crate::message::AnyMessage;

/// Stable opaque actor identity, unique within one [`ActorSystem`].
pub type ActorId = u64;

/// Record of an event that could not be delivered: the target was already
/// terminal, the target id was stale, or the payload type did not match the
/// target's event type. Carries debug renderings so it stays serializable
/// even though the event itself is type-erased.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub target: ActorId,
    pub event_type: String,
    pub event: String,
}

/// The lazily created system-wide dead-letter actor: a plain reducer
/// accumulating [`DeadLetter`] records. Held behind erased closures because
/// its concrete logic type is unnameable.
struct DeadLetterSink {
    push: Rc<dyn Fn(DeadLetter)>,
    read: Rc<dyn Fn() -> Vec<DeadLetter>>,
}

struct SystemInner {
    next_id: Cell<ActorId>,
    // Ordered by id, so get_all() lists actors in creation order.
    actors: RefCell<BTreeMap<ActorId, AnyActorRef>>,
    keyed: RefCell<HashMap<String, ActorId>>,
    sink: RefCell<Option<DeadLetterSink>>,
}

/// Shared context for one actor tree. Cheap to clone.
#[derive(Clone)]
pub struct ActorSystem {
    inner: Rc<SystemInner>,
}

impl ActorSystem {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(SystemInner {
                next_id: Cell::new(1),
                actors: RefCell::new(BTreeMap::new()),
                keyed: RefCell::new(HashMap::new()),
                sink: RefCell::new(None),
            }),
        }
    }

    pub(crate) fn allocate_id(&self) -> ActorId {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        id
    }

    pub(crate) fn register(&self, actor: AnyActorRef) {
        self.inner.actors.borrow_mut().insert(actor.id(), actor);
    }

    /// Claim the keyed registry slot for `id`. First claimant wins; a second
    /// claim for a live key is an error the *claimant* must absorb.
    pub(crate) fn claim_key(&self, key: &str, id: ActorId) -> Result<(), RegistryError> {
        let mut keyed = self.inner.keyed.borrow_mut();
        if keyed.contains_key(key) {
            return Err(RegistryError::DuplicateSystemId(key.to_string()));
        }
        keyed.insert(key.to_string(), id);
        Ok(())
    }

    /// Drop a terminated actor from the registry. Its key (if it held one)
    /// becomes claimable again.
    pub(crate) fn unregister(&self, id: ActorId, key: Option<&str>) {
        self.inner.actors.borrow_mut().remove(&id);
        if let Some(key) = key {
            let mut keyed = self.inner.keyed.borrow_mut();
            if keyed.get(key) == Some(&id) {
                keyed.remove(key);
            }
        }
    }

    /// Look up a live actor by its registry key.
    pub fn get(&self, key: &str) -> Option<AnyActorRef> {
        let id = *self.inner.keyed.borrow().get(key)?;
        self.inner.actors.borrow().get(&id).cloned()
    }

    /// Look up a live actor by id.
    pub fn get_by_id(&self, id: ActorId) -> Option<AnyActorRef> {
        self.inner.actors.borrow().get(&id).cloned()
    }

    /// Every live actor currently registered.
    pub fn get_all(&self) -> Vec<AnyActorRef> {
        self.inner.actors.borrow().values().cloned().collect()
    }

    /// Deliver one erased event to `target`, synchronously running its full
    /// macrostep. A terminal target absorbs nothing: the event becomes a
    /// dead-letter record instead.
    pub(crate) fn relay(
        &self,
        origin: Option<Weak<dyn AnyActor>>,
        target: &AnyActorRef,
        message: AnyMessage,
    ) {
        if target.status().is_terminal() {
            debug!(
                target = target.id(),
                event = %message.describe(),
                "event for terminal actor dead-lettered"
            );
            self.dead_letter(target.id(), message);
            return;
        }
        target.inner.deliver(message, origin);
    }

    /// Record an undeliverable event on the dead-letter sink. Never throws
    /// back at the sender.
    pub(crate) fn dead_letter(&self, target: ActorId, message: AnyMessage) {
        warn!(
            target,
            event_type = message.event_type(),
            event = %message.describe(),
            "dead letter"
        );
        let push = self.sink_push();
        push(DeadLetter {
            target,
            event_type: message.event_type().to_string(),
            event: message.describe(),
        });
    }

    /// Dead-letter records accumulated so far, oldest first. Empty until the
    /// first undeliverable event instantiates the sink.
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        let sink = self.inner.sink.borrow();
        sink.as_ref().map(|s| (s.read)()).unwrap_or_default()
    }

    /// The sink actor is created on first use: most systems never dead-letter
    /// anything and should not pay for one.
    fn sink_push(&self) -> Rc<dyn Fn(DeadLetter)> {
        if let Some(sink) = self.inner.sink.borrow().as_ref() {
            return sink.push.clone();
        }
        let logic = from_reducer(|letters: &Vec<DeadLetter>, letter: &DeadLetter| {
            let mut next = letters.clone();
            next.push(letter.clone());
            next
        });
        let actor = create_actor(self, logic, ActorOptions::with_input(Vec::new()));
        actor.start();
        debug!(id = actor.id(), "dead-letter sink created");
        let push: Rc<dyn Fn(DeadLetter)> = {
            let actor = actor.clone();
            Rc::new(move |letter| actor.send(letter))
        };
        let read: Rc<dyn Fn() -> Vec<DeadLetter>> = {
            let actor = actor.clone();
            Rc::new(move || actor.snapshot().context)
        };
        *self.inner.sink.borrow_mut() = Some(DeadLetterSink {
            push: push.clone(),
            read,
        });
        push
    }
}

impl Default for ActorSystem {
    fn default() -> Self {
        Self::new()
    }
}
