//! # Snapshot Waiting
//!
//! [`wait_for`] bridges the synchronous actor world into async test and
//! application code: it resolves with the first snapshot matching a
//! predicate, or fails if the actor terminates or the deadline passes first.
//! Requires a tokio runtime; pair it with a `LocalSet` when the actor tree
//! uses timers, tasks or streams.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::WaitForError;
use crate::kernel::{ActorRef, Observer};
use crate::logic::ActorLogic;
use crate::snapshot::{SnapshotLike, Status};

/// Resolve with the first snapshot of `actor` for which `predicate` holds.
///
/// Checks the current snapshot first, so a predicate that already holds (or
/// an actor that already terminated) settles without yielding. A `done`
/// actor whose final snapshot matches still resolves successfully; any other
/// terminal outcome before a match is an error.
pub async fn wait_for<L: ActorLogic>(
    actor: &ActorRef<L>,
    predicate: impl Fn(&L::Snapshot) -> bool + 'static,
    deadline: Duration,
) -> Result<L::Snapshot, WaitForError> {
    let predicate = Rc::new(predicate);

    let snapshot = actor.snapshot();
    match snapshot.status() {
        Status::Active | Status::Done if predicate(&snapshot) => return Ok(snapshot),
        Status::Active => {}
        Status::Error => {
            let fault = snapshot
                .fault()
                .cloned()
                .unwrap_or_else(|| "actor failed".into());
            return Err(WaitForError::Faulted(fault));
        }
        status => return Err(WaitForError::Terminated(status)),
    }

    let (tx, rx) = oneshot::channel::<Result<L::Snapshot, WaitForError>>();
    let tx = Rc::new(Cell::new(Some(tx)));
    let settle = move |outcome: Result<L::Snapshot, WaitForError>| {
        if let Some(tx) = tx.take() {
            let _ = tx.send(outcome);
        }
    };

    let observer = {
        let on_next = settle.clone();
        let on_error = settle.clone();
        let on_complete = settle;
        let check = predicate.clone();
        let handle = actor.clone();
        Observer::new()
            .on_next(move |snapshot: &L::Snapshot| {
                if check(snapshot) {
                    on_next(Ok(snapshot.clone()));
                }
            })
            .on_error(move |fault| on_error(Err(WaitForError::Faulted(fault.clone()))))
            // on_next runs before on_complete for a `done` actor, so a final
            // matching snapshot wins the race here.
            .on_complete(move || on_complete(Err(WaitForError::Terminated(handle.status()))))
    };
    let subscription = actor.subscribe_observer(observer);

    let outcome = match tokio::time::timeout(deadline, rx).await {
        Err(_) => Err(WaitForError::Timeout),
        // Sender dropped without settling; nothing more will ever arrive.
        Ok(Err(_)) => Err(WaitForError::Timeout),
        Ok(Ok(outcome)) => outcome,
    };
    subscription.unsubscribe();
    outcome
}
