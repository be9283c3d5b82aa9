//! # Actor Cell
//!
//! The cell is the kernel's per-actor state: snapshot, mailbox, microstep
//! queue, deferred-effect queue, owned children, observers, timers, and the
//! aux side-table. User code never sees a cell — only handles and scopes.
//!
//! # Scheduling Model
//! One logical thread of control per actor tree; no true parallelism.
//! Interleaving is cooperative and governed by a strict run-to-completion
//! rule:
//!
//! - A **macrostep** is the complete synchronous processing of one externally
//!   delivered event: the logic `transition` (plus the resolve phase of any
//!   attached dynamic actions) computes a next snapshot, and events the actor
//!   raised on itself drain FIFO as **microsteps** — strictly before any
//!   externally queued event, via an explicit work queue so long self-raise
//!   chains cannot overflow the call stack.
//! - Only after the whole macrostep commits do the resolved actions'
//!   execute phase and the deferred-effect queue run, so any observer of this
//!   actor always sees the updated snapshot before any of its outward side
//!   effects become visible — even when an effect targets the actor itself.
//!
//! Because each actor processes its own mailbox sequentially behind a
//! re-entrancy guard, no locks are needed anywhere in the kernel.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::{Rc, Weak};
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::actions::ConcreteAction;
use crate::error::ActorFault;
use crate::kernel::handle::{ActorRef, AnyActor, AnyActorRef, Observer, Subscription};
use crate::kernel::scope::ActorScope;
use crate::kernel::ActorOptions;
use crate::logic::ActorLogic;
use crate::message::AnyMessage;
use crate::snapshot::{SnapshotLike, Status};
use crate::system::{ActorId, ActorSystem};

/// One externally delivered event plus the sender's identity, when the
/// sender identified itself through the relay.
pub(crate) struct Envelope<E> {
    pub event: E,
    pub origin: Option<Weak<dyn AnyActor>>,
}

/// Mailbox entries. `Stop` is the reserved termination request injected only
/// by the kernel — it is not part of any user-facing event union, so logic
/// never sees it and callback listener sets are never fanned it.
enum MailboxItem<E> {
    Event(Envelope<E>),
    Stop,
    Escalation(ActorFault),
}

pub(crate) struct ActorCell<L: ActorLogic> {
    pub(crate) id: ActorId,
    pub(crate) system_id: Option<String>,
    pub(crate) logic: L,
    pub(crate) system: ActorSystem,
    pub(crate) me: Weak<ActorCell<L>>,
    parent: Option<Weak<dyn AnyActor>>,

    snapshot: RefCell<Option<L::Snapshot>>,
    mailbox: RefCell<VecDeque<MailboxItem<L::Event>>>,
    raised: RefCell<VecDeque<L::Event>>,
    pending_actions: RefCell<Vec<ConcreteAction<L>>>,
    deferred: RefCell<VecDeque<Box<dyn FnOnce()>>>,

    observers: RefCell<Vec<(u64, Rc<Observer<L::Snapshot>>)>>,
    emit_listeners: RefCell<Vec<(u64, Rc<dyn Fn(&L::Emitted)>)>>,
    next_subscription: Cell<u64>,

    children: RefCell<Vec<AnyActorRef>>,
    named_children: RefCell<HashMap<String, AnyActorRef>>,
    pending_child_starts: RefCell<Vec<AnyActorRef>>,

    started: Cell<bool>,
    processing: Cell<bool>,
    disposed: Cell<bool>,
    origin: RefCell<Option<Weak<dyn AnyActor>>>,
    timers: RefCell<Vec<tokio::task::AbortHandle>>,
    pub(crate) aux: RefCell<Option<Box<dyn Any>>>,
}

impl<L: ActorLogic> ActorCell<L> {
    /// Build a cell, compute (or restore) its initial snapshot, and register
    /// it with the system. The actor is *created* but not started.
    pub(crate) fn create(
        system: ActorSystem,
        logic: L,
        options: ActorOptions<L::Input>,
        parent: Option<Weak<dyn AnyActor>>,
    ) -> ActorRef<L> {
        let ActorOptions {
            input,
            system_id,
            name: _,
            snapshot,
        } = options;

        let id = system.allocate_id();
        let cell = Rc::new_cyclic(|me| ActorCell {
            id,
            system_id: system_id.clone(),
            logic,
            system: system.clone(),
            me: me.clone(),
            parent,
            snapshot: RefCell::new(None),
            mailbox: RefCell::new(VecDeque::new()),
            raised: RefCell::new(VecDeque::new()),
            pending_actions: RefCell::new(Vec::new()),
            deferred: RefCell::new(VecDeque::new()),
            observers: RefCell::new(Vec::new()),
            emit_listeners: RefCell::new(Vec::new()),
            next_subscription: Cell::new(0),
            children: RefCell::new(Vec::new()),
            named_children: RefCell::new(HashMap::new()),
            pending_child_starts: RefCell::new(Vec::new()),
            started: Cell::new(false),
            processing: Cell::new(false),
            disposed: Cell::new(false),
            origin: RefCell::new(None),
            timers: RefCell::new(Vec::new()),
            aux: RefCell::new(None),
        });

        system.register(cell.as_any_ref());
        debug!(
            actor = cell.logic_name(),
            id = cell.id,
            system_id = cell.system_id.as_deref(),
            "actor created"
        );

        let initial = match snapshot {
            Some(value) => match cell.logic.restore_snapshot(value) {
                Ok(restored) => restored,
                Err(e) => {
                    warn!(
                        actor = cell.logic_name(),
                        id = cell.id,
                        error = %e,
                        "failed to restore persisted snapshot"
                    );
                    let mut fresh = cell.logic.initial_snapshot(&cell.scope(), input);
                    fresh.mark_error(ActorFault::new(e.to_string()));
                    fresh
                }
            },
            None => cell.logic.initial_snapshot(&cell.scope(), input),
        };
        cell.commit(initial);

        // The keyed slot is claimed atomically within this synchronous call.
        // On conflict the fault lands on the NEW registrant's own channel;
        // the incumbent is untouched.
        if let Some(key) = &cell.system_id {
            if let Err(e) = system.claim_key(key, id) {
                warn!(
                    actor = cell.logic_name(),
                    id = cell.id,
                    key = %key,
                    "system id conflict"
                );
                cell.capture_fault(ActorFault::new(e.to_string()));
            }
        }

        ActorRef { cell }
    }

    pub(crate) fn scope(&self) -> ActorScope<L> {
        ActorScope {
            cell: self.me.clone(),
        }
    }

    fn logic_name(&self) -> &'static str {
        std::any::type_name::<L>()
            .split("::")
            .last()
            .unwrap_or("Unknown")
    }

    pub(crate) fn current_snapshot(&self) -> L::Snapshot {
        self.snapshot
            .borrow()
            .clone()
            .expect("actor snapshot is initialized at creation")
    }

    pub(crate) fn status(&self) -> Status {
        self.snapshot
            .borrow()
            .as_ref()
            .map(SnapshotLike::status)
            // Still computing the initial snapshot.
            .unwrap_or(Status::Active)
    }

    /// True while a macrostep (or the start hook) is in flight.
    pub(crate) fn is_processing(&self) -> bool {
        self.processing.get()
    }

    fn commit(&self, snapshot: L::Snapshot) {
        *self.snapshot.borrow_mut() = Some(snapshot);
    }

    // --- Lifecycle ------------------------------------------------------

    /// Idempotent start.
    pub(crate) fn start(&self) {
        if self.started.get() || self.disposed.get() {
            return;
        }
        self.started.set(true);
        info!(actor = self.logic_name(), id = self.id, "actor started");

        if self.status() == Status::Active {
            let snapshot = self.current_snapshot();
            // The hook counts as in-flight work: children it spawns and
            // events it raises settle only after it returns.
            self.processing.set(true);
            let hook = self.logic.start(&snapshot, &self.scope());
            self.processing.set(false);
            if let Err(fault) = hook {
                self.capture_fault(fault);
                return;
            }
        } else {
            // Restored from a terminal persisted snapshot: the side-effecting
            // start hook must not run again. Observers were (or will be)
            // served by subscribe-time replay.
            debug!(
                actor = self.logic_name(),
                id = self.id,
                "terminal persisted snapshot; start hook skipped"
            );
            self.finalize();
            return;
        }

        // Children declared during initialization start in declaration order.
        let pending: Vec<AnyActorRef> = self.pending_child_starts.borrow_mut().drain(..).collect();
        for child in pending {
            child.start();
        }

        // Settle anything the start hook raised, attached, or deferred.
        self.processing.set(true);
        self.settle_after_start();
        self.processing.set(false);

        // Drain events queued before the actor was started.
        self.process();
    }

    fn settle_after_start(&self) {
        let has_microwork =
            !self.raised.borrow().is_empty() || !self.pending_actions.borrow().is_empty();
        if has_microwork {
            let next = self.drain_microsteps(self.current_snapshot());
            self.commit(next);
            self.run_actions();
            self.flush_deferred();
            self.finalize();
        } else {
            self.flush_deferred();
        }
    }

    /// Idempotent stop request. Respects run-to-completion: if a macrostep is
    /// in flight the stop is queued behind it.
    pub(crate) fn request_stop(&self) {
        if self.disposed.get() || self.status().is_terminal() {
            return;
        }
        if self.processing.get() {
            self.mailbox.borrow_mut().push_back(MailboxItem::Stop);
            return;
        }
        self.processing.set(true);
        self.halt();
        self.processing.set(false);
    }

    /// Surface a child-escalated fault on this actor's error channel.
    pub(crate) fn escalate_fault(&self, fault: ActorFault) {
        if self.disposed.get() || self.status().is_terminal() {
            return;
        }
        if self.processing.get() {
            self.mailbox
                .borrow_mut()
                .push_back(MailboxItem::Escalation(fault));
            return;
        }
        self.processing.set(true);
        self.capture_fault(fault);
        self.processing.set(false);
    }

    // --- Event processing ----------------------------------------------

    fn enqueue(&self, envelope: Envelope<L::Event>) {
        if self.status().is_terminal() {
            trace!(
                actor = self.logic_name(),
                id = self.id,
                event = ?envelope.event,
                "terminal actor absorbed event"
            );
            return;
        }
        self.mailbox
            .borrow_mut()
            .push_back(MailboxItem::Event(envelope));
        self.process();
    }

    /// Pump the mailbox to quiescence. Re-entrant calls (an effect sending to
    /// this very actor mid-flush) fall through to the already-running loop.
    fn process(&self) {
        if self.processing.get() || !self.started.get() {
            return;
        }
        self.processing.set(true);
        loop {
            let item = self.mailbox.borrow_mut().pop_front();
            let Some(item) = item else { break };
            match item {
                MailboxItem::Event(envelope) => self.macrostep(envelope),
                MailboxItem::Stop => self.halt(),
                MailboxItem::Escalation(fault) => self.capture_fault(fault),
            }
        }
        self.processing.set(false);
    }

    fn macrostep(&self, envelope: Envelope<L::Event>) {
        if self.status().is_terminal() {
            trace!(
                actor = self.logic_name(),
                id = self.id,
                event = ?envelope.event,
                "terminal actor absorbed event"
            );
            return;
        }
        *self.origin.borrow_mut() = envelope.origin;
        let scope = self.scope();
        let current = self.current_snapshot();
        debug!(
            actor = self.logic_name(),
            id = self.id,
            event = ?envelope.event,
            "processing event"
        );

        let next = match self.logic.transition(current.clone(), envelope.event, &scope) {
            Ok(next) => self.drain_microsteps(next),
            Err(fault) => self.fault_snapshot(current, fault),
        };

        self.commit(next);
        self.run_actions();
        self.flush_deferred();
        self.finalize();
        self.origin.borrow_mut().take();
    }

    /// Drain self-raised events FIFO. An explicit queue rather than
    /// recursion: a long raise chain consumes mailbox slots, not stack.
    fn drain_microsteps(&self, mut snapshot: L::Snapshot) -> L::Snapshot {
        let scope = self.scope();
        loop {
            if snapshot.status().is_terminal() {
                self.raised.borrow_mut().clear();
                break;
            }
            let raised = self.raised.borrow_mut().pop_front();
            let Some(event) = raised else { break };
            trace!(
                actor = self.logic_name(),
                id = self.id,
                event = ?event,
                "microstep"
            );
            snapshot = match self.logic.transition(snapshot.clone(), event, &scope) {
                Ok(next) => next,
                Err(fault) => return self.fault_snapshot(snapshot, fault),
            };
        }
        snapshot
    }

    /// Mark a snapshot failed and drop work queued by the failed step. Its
    /// resolved-but-unexecuted actions must not fire.
    fn fault_snapshot(&self, mut snapshot: L::Snapshot, fault: ActorFault) -> L::Snapshot {
        warn!(
            actor = self.logic_name(),
            id = self.id,
            error = %fault,
            "logic fault captured"
        );
        self.raised.borrow_mut().clear();
        self.pending_actions.borrow_mut().clear();
        snapshot.mark_error(fault);
        snapshot
    }

    /// Error capture outside a transition (escalation, registry conflict,
    /// failed start hook).
    fn capture_fault(&self, fault: ActorFault) {
        if self.status().is_terminal() {
            return;
        }
        let snapshot = self.fault_snapshot(self.current_snapshot(), fault);
        self.commit(snapshot);
        self.flush_deferred();
        self.finalize();
    }

    fn halt(&self) {
        if self.status().is_terminal() {
            return;
        }
        let mut snapshot = self.current_snapshot();
        snapshot.mark_stopped();
        self.raised.borrow_mut().clear();
        self.pending_actions.borrow_mut().clear();
        self.commit(snapshot);
        self.flush_deferred();
        self.finalize();
    }

    fn run_actions(&self) {
        let actions: Vec<ConcreteAction<L>> = self.pending_actions.borrow_mut().drain(..).collect();
        if actions.is_empty() {
            return;
        }
        let scope = self.scope();
        for action in actions {
            trace!(
                actor = self.logic_name(),
                id = self.id,
                action = action.kind(),
                "executing action"
            );
            action.run(&scope);
        }
    }

    fn flush_deferred(&self) {
        loop {
            let effect = self.deferred.borrow_mut().pop_front();
            let Some(effect) = effect else { break };
            effect();
        }
    }

    /// Notify observers of the committed snapshot and, on a terminal status,
    /// tear the actor down exactly once.
    fn finalize(&self) {
        let snapshot = self.current_snapshot();
        let status = snapshot.status();
        if status.is_terminal() {
            self.dispose(status);
        }
        let observers: Vec<Rc<Observer<L::Snapshot>>> =
            self.observers.borrow().iter().map(|(_, o)| o.clone()).collect();
        match status {
            Status::Active => {
                for observer in &observers {
                    if let Some(next) = &observer.next {
                        next(&snapshot);
                    }
                }
            }
            Status::Done => {
                for observer in &observers {
                    if let Some(next) = &observer.next {
                        next(&snapshot);
                    }
                }
                for observer in &observers {
                    if let Some(complete) = &observer.complete {
                        complete();
                    }
                }
            }
            Status::Error => {
                let fault = snapshot
                    .fault()
                    .cloned()
                    .unwrap_or_else(|| ActorFault::new("actor failed"));
                for observer in &observers {
                    if let Some(error) = &observer.error {
                        error(&fault);
                    }
                }
            }
            Status::Stopped => {
                for observer in &observers {
                    if let Some(complete) = &observer.complete {
                        complete();
                    }
                }
            }
        }
        if status.is_terminal() {
            self.observers.borrow_mut().clear();
            self.emit_listeners.borrow_mut().clear();
        }
    }

    /// At-most-once teardown: cancel timers, stop the owned subtree
    /// depth-first, run the logic's release hook, drop the aux slot,
    /// unregister.
    fn dispose(&self, status: Status) {
        if self.disposed.replace(true) {
            return;
        }
        for timer in self.timers.borrow_mut().drain(..) {
            timer.abort();
        }
        let children: Vec<AnyActorRef> = self.children.borrow_mut().drain(..).collect();
        self.named_children.borrow_mut().clear();
        for child in children {
            child.stop();
        }
        self.logic.on_stop(&self.scope());
        self.aux.borrow_mut().take();
        self.system.unregister(self.id, self.system_id.as_deref());
        info!(
            actor = self.logic_name(),
            id = self.id,
            status = ?status,
            "actor disposed"
        );
    }

    // --- Scope services -------------------------------------------------

    pub(crate) fn raise(&self, event: L::Event) {
        self.raised.borrow_mut().push_back(event);
    }

    pub(crate) fn defer(&self, effect: Box<dyn FnOnce()>) {
        self.deferred.borrow_mut().push_back(effect);
    }

    pub(crate) fn push_action(&self, action: ConcreteAction<L>) {
        self.pending_actions.borrow_mut().push(action);
    }

    pub(crate) fn schedule(&self, delay: Duration, effect: Box<dyn FnOnce()>) {
        let handle = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            effect();
        });
        let mut timers = self.timers.borrow_mut();
        // Already-fired timers have nothing left to abort; drop their
        // handles so a long-lived actor does not accumulate them.
        timers.retain(|timer| !timer.is_finished());
        timers.push(handle.abort_handle());
    }

    pub(crate) fn current_origin(&self) -> Option<AnyActorRef> {
        self.origin
            .borrow()
            .as_ref()
            .and_then(Weak::upgrade)
            .map(AnyActorRef::from_rc)
    }

    pub(crate) fn spawn_child<CL: ActorLogic>(
        &self,
        logic: CL,
        options: ActorOptions<CL::Input>,
    ) -> ActorRef<CL> {
        let name = options.name.clone();
        let parent: Weak<dyn AnyActor> = self.me.clone();
        let child = ActorCell::create(self.system.clone(), logic, options, Some(parent));
        let any = child.as_any();
        debug!(
            actor = self.logic_name(),
            id = self.id,
            child = any.id(),
            child_name = name.as_deref(),
            "spawned child"
        );
        self.adopt_child(any, name);
        child
    }

    /// Enroll `child` in the owned subtree and arrange its start: before this
    /// actor starts it joins the declaration-order pending list; during a
    /// macrostep (or the start hook) its start is deferred past the commit;
    /// from plain async context it starts immediately.
    pub(crate) fn adopt_child(&self, child: AnyActorRef, name: Option<String>) {
        self.children.borrow_mut().push(child.clone());
        if let Some(name) = name {
            self.named_children.borrow_mut().insert(name, child.clone());
        }
        if !self.started.get() {
            self.pending_child_starts.borrow_mut().push(child);
        } else if self.processing.get() {
            self.defer(Box::new(move || child.start()));
        } else {
            child.start();
        }
    }

    pub(crate) fn stop_child(&self, child: &AnyActorRef) {
        let owned = {
            let mut children = self.children.borrow_mut();
            match children.iter().position(|c| c == child) {
                Some(index) => {
                    children.remove(index);
                    true
                }
                None => false,
            }
        };
        if !owned {
            debug!(
                actor = self.logic_name(),
                id = self.id,
                target = child.id(),
                "stop_child ignored for non-owned actor"
            );
            return;
        }
        self.named_children.borrow_mut().retain(|_, c| c != child);
        let child = child.clone();
        self.defer(Box::new(move || child.stop()));
    }

    pub(crate) fn child_named(&self, name: &str) -> Option<AnyActorRef> {
        self.named_children.borrow().get(name).cloned()
    }

    pub(crate) fn parent_ref(&self) -> Option<AnyActorRef> {
        self.parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(AnyActorRef::from_rc)
    }

    // --- Observers ------------------------------------------------------

    pub(crate) fn subscribe(&self, observer: Observer<L::Snapshot>) -> Subscription {
        let snapshot = self.current_snapshot();
        match snapshot.status() {
            Status::Active => {}
            // Late subscriber: replay the retained terminal outcome
            // immediately rather than dropping it.
            Status::Done => {
                if let Some(next) = &observer.next {
                    next(&snapshot);
                }
                if let Some(complete) = &observer.complete {
                    complete();
                }
                return Subscription::empty();
            }
            Status::Error => {
                let fault = snapshot
                    .fault()
                    .cloned()
                    .unwrap_or_else(|| ActorFault::new("actor failed"));
                if let Some(error) = &observer.error {
                    error(&fault);
                }
                return Subscription::empty();
            }
            Status::Stopped => {
                if let Some(complete) = &observer.complete {
                    complete();
                }
                return Subscription::empty();
            }
        }

        let id = self.next_subscription.get();
        self.next_subscription.set(id + 1);
        self.observers.borrow_mut().push((id, Rc::new(observer)));
        let me = self.me.clone();
        Subscription::new(move || {
            if let Some(cell) = me.upgrade() {
                cell.observers.borrow_mut().retain(|(sid, _)| *sid != id);
            }
        })
    }

    pub(crate) fn add_emit_listener(&self, listener: Rc<dyn Fn(&L::Emitted)>) -> Subscription {
        if self.status().is_terminal() {
            return Subscription::empty();
        }
        let id = self.next_subscription.get();
        self.next_subscription.set(id + 1);
        self.emit_listeners.borrow_mut().push((id, listener));
        let me = self.me.clone();
        Subscription::new(move || {
            if let Some(cell) = me.upgrade() {
                cell.emit_listeners.borrow_mut().retain(|(sid, _)| *sid != id);
            }
        })
    }

    pub(crate) fn fan_out_emit(&self, event: &L::Emitted) {
        let listeners: Vec<Rc<dyn Fn(&L::Emitted)>> = self
            .emit_listeners
            .borrow()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    pub(crate) fn as_any_ref(self: &Rc<Self>) -> AnyActorRef {
        AnyActorRef {
            inner: self.clone(),
        }
    }
}

impl<L: ActorLogic> AnyActor for ActorCell<L> {
    fn id(&self) -> ActorId {
        self.id
    }

    fn system_id(&self) -> Option<String> {
        self.system_id.clone()
    }

    fn status(&self) -> Status {
        ActorCell::status(self)
    }

    fn system(&self) -> ActorSystem {
        self.system.clone()
    }

    fn parent(&self) -> Option<AnyActorRef> {
        self.parent_ref()
    }

    fn deliver(&self, message: AnyMessage, origin: Option<Weak<dyn AnyActor>>) {
        let event = match message.downcast::<L::Event>() {
            Ok(event) => event,
            Err(message) => {
                warn!(
                    actor = self.logic_name(),
                    id = self.id,
                    expected = std::any::type_name::<L::Event>(),
                    received = message.event_type(),
                    "event type mismatch"
                );
                self.system.dead_letter(self.id, message);
                return;
            }
        };
        self.enqueue(Envelope { event, origin });
    }

    fn start_actor(&self) {
        ActorCell::start(self);
    }

    fn stop_actor(&self) {
        self.request_stop();
    }

    fn adopt_child(&self, child: AnyActorRef, name: Option<String>) {
        ActorCell::adopt_child(self, child, name);
    }

    fn escalate(&self, fault: ActorFault) {
        self.escalate_fault(fault);
    }

    fn persisted(&self) -> Result<serde_json::Value, crate::error::PersistError> {
        self.logic.persisted_snapshot(&self.current_snapshot())
    }

    fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::kernel::{create_actor, ActorOptions};
    use crate::logic::from_reducer;
    use crate::system::ActorSystem;

    #[tokio::test]
    async fn fired_timers_are_pruned_on_the_next_schedule() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let system = ActorSystem::new();
                let actor = create_actor(
                    &system,
                    from_reducer(|count: &u64, delta: &u64| count + delta),
                    ActorOptions::with_input(0),
                );
                actor.start();

                actor.cell.schedule(Duration::from_millis(1), Box::new(|| {}));
                actor.cell.schedule(Duration::from_millis(1), Box::new(|| {}));
                assert_eq!(actor.cell.timers.borrow().len(), 2);

                // Let both timers fire; the next schedule drops their handles.
                tokio::time::sleep(Duration::from_millis(20)).await;
                actor.cell.schedule(Duration::from_millis(1), Box::new(|| {}));
                assert_eq!(
                    actor.cell.timers.borrow().len(),
                    1,
                    "handles of fired timers are not retained"
                );
            })
            .await;
    }
}
