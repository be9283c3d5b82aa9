use std::time::Duration;

use serde::{Deserialize, Serialize};

use actor_core::actions::{self, SendTarget};
use actor_core::kernel::{create_actor, ActorOptions, ActorScope};
use actor_core::logic::{from_reducer, ActorLogic};
use actor_core::snapshot::{SnapshotLike, Status};
use actor_core::system::ActorSystem;
use actor_core::wait_for::wait_for;
use actor_core::{ActorFault, PersistError};

/// A coordinator that owns one named worker child and exercises the whole
/// raise/send action family against it.
struct CoordinatorLogic;

#[derive(Debug)]
enum CoordinatorEvent {
    /// Attach a raise chain.
    Kickoff,
    Mark(&'static str),
    /// Ask the worker a question; the worker responds via its origin.
    Ask,
    Answer(u64),
    /// Send to a child name that was never spawned.
    Misroute,
    /// Attach a delayed raise.
    Later,
    /// Escalate a fault from the worker up to us (coordinator is the root,
    /// so the fault lands on the escalating actor itself).
    Evict,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct CoordinatorSnapshot {
    status: Status,
    error: Option<ActorFault>,
    marks: Vec<String>,
    answer: Option<u64>,
}

impl SnapshotLike for CoordinatorSnapshot {
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

/// Worker child: responds to `Question` through the origin of the event.
struct WorkerLogic;

#[derive(Debug)]
enum WorkerEvent {
    Question(u64),
    Fail,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct WorkerSnapshot {
    status: Status,
    error: Option<ActorFault>,
}

impl SnapshotLike for WorkerSnapshot {
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

impl ActorLogic for WorkerLogic {
    type Snapshot = WorkerSnapshot;
    type Event = WorkerEvent;
    type Input = ();
    type Emitted = ();

    fn initial_snapshot(&self, _scope: &ActorScope<Self>, _input: ()) -> WorkerSnapshot {
        WorkerSnapshot {
            status: Status::Active,
            error: None,
        }
    }

    fn transition(
        &self,
        snapshot: WorkerSnapshot,
        event: WorkerEvent,
        scope: &ActorScope<Self>,
    ) -> Result<WorkerSnapshot, ActorFault> {
        match event {
            WorkerEvent::Question(n) => {
                actions::respond(CoordinatorEvent::Answer(n * 2)).attach(snapshot, scope)
            }
            WorkerEvent::Fail => {
                actions::escalate(ActorFault::new("worker gave up")).attach(snapshot, scope)
            }
        }
    }

    fn persisted_snapshot(&self, snapshot: &WorkerSnapshot) -> Result<serde_json::Value, PersistError> {
        serde_json::to_value(snapshot).map_err(PersistError::Serialize)
    }

    fn restore_snapshot(&self, persisted: serde_json::Value) -> Result<WorkerSnapshot, PersistError> {
        serde_json::from_value(persisted).map_err(|e| PersistError::Malformed(e.to_string()))
    }
}

impl ActorLogic for CoordinatorLogic {
    type Snapshot = CoordinatorSnapshot;
    type Event = CoordinatorEvent;
    type Input = ();
    type Emitted = ();

    fn initial_snapshot(&self, scope: &ActorScope<Self>, _input: ()) -> CoordinatorSnapshot {
        scope.spawn_child(WorkerLogic, ActorOptions::default().name("worker"));
        CoordinatorSnapshot {
            status: Status::Active,
            error: None,
            marks: Vec::new(),
            answer: None,
        }
    }

    fn transition(
        &self,
        mut snapshot: CoordinatorSnapshot,
        event: CoordinatorEvent,
        scope: &ActorScope<Self>,
    ) -> Result<CoordinatorSnapshot, ActorFault> {
        match event {
            CoordinatorEvent::Kickoff => {
                snapshot.marks.push("kickoff".to_string());
                let snapshot = actions::raise(CoordinatorEvent::Mark("a")).attach(snapshot, scope)?;
                actions::raise(CoordinatorEvent::Mark("b")).attach(snapshot, scope)
            }
            CoordinatorEvent::Mark(label) => {
                snapshot.marks.push(label.to_string());
                Ok(snapshot)
            }
            CoordinatorEvent::Ask => actions::send_to(
                SendTarget::Child("worker".to_string()),
                WorkerEvent::Question(21),
            )
            .attach(snapshot, scope),
            CoordinatorEvent::Answer(n) => {
                snapshot.answer = Some(n);
                Ok(snapshot)
            }
            CoordinatorEvent::Misroute => actions::send_to(
                SendTarget::Child("phantom".to_string()),
                WorkerEvent::Question(0),
            )
            .attach(snapshot, scope),
            CoordinatorEvent::Later => {
                actions::raise_after(CoordinatorEvent::Mark("delayed"), Duration::from_millis(20))
                    .attach(snapshot, scope)
            }
            CoordinatorEvent::Evict => actions::send_to(
                SendTarget::Child("worker".to_string()),
                WorkerEvent::Fail,
            )
            .attach(snapshot, scope),
        }
    }

    fn persisted_snapshot(&self, snapshot: &CoordinatorSnapshot) -> Result<serde_json::Value, PersistError> {
        serde_json::to_value(snapshot).map_err(PersistError::Serialize)
    }

    fn restore_snapshot(&self, persisted: serde_json::Value) -> Result<CoordinatorSnapshot, PersistError> {
        serde_json::from_value(persisted).map_err(|e| PersistError::Malformed(e.to_string()))
    }
}

fn coordinator(system: &ActorSystem) -> actor_core::ActorRef<CoordinatorLogic> {
    let actor = create_actor(system, CoordinatorLogic, ActorOptions::default());
    actor.start();
    actor
}

#[test]
fn test_raise_actions_drain_in_attachment_order() {
    let system = ActorSystem::new();
    let actor = coordinator(&system);

    actor.send(CoordinatorEvent::Kickoff);
    assert_eq!(actor.snapshot().marks, vec!["kickoff", "a", "b"]);
}

#[test]
fn test_respond_reaches_the_asking_actor() {
    let system = ActorSystem::new();
    let actor = coordinator(&system);

    // Ask -> worker (origin: coordinator) -> respond -> Answer.
    actor.send(CoordinatorEvent::Ask);
    assert_eq!(actor.snapshot().answer, Some(42));
    assert_eq!(actor.status(), Status::Active);
}

#[test]
fn test_unresolvable_target_fails_the_attaching_transition() {
    let system = ActorSystem::new();
    let actor = coordinator(&system);

    actor.send(CoordinatorEvent::Misroute);
    assert_eq!(actor.status(), Status::Error);
    let fault = actor.snapshot().error.expect("fault recorded on snapshot");
    assert!(
        fault.message.contains("no child named 'phantom'"),
        "descriptive resolution error, got: {}",
        fault.message
    );
}

#[test]
fn test_escalated_fault_surfaces_on_the_parent() {
    let system = ActorSystem::new();
    let actor = coordinator(&system);

    actor.send(CoordinatorEvent::Evict);
    assert_eq!(actor.status(), Status::Error);
    assert_eq!(
        actor.snapshot().error,
        Some(ActorFault::new("worker gave up"))
    );
}

#[tokio::test]
async fn test_delayed_raise_fires_after_its_delay() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let system = ActorSystem::new();
            let actor = coordinator(&system);

            actor.send(CoordinatorEvent::Later);
            assert!(
                actor.snapshot().marks.is_empty(),
                "delayed raise must not fire within the attaching macrostep"
            );

            let snapshot = wait_for(
                &actor,
                |snapshot| snapshot.marks.contains(&"delayed".to_string()),
                Duration::from_secs(1),
            )
            .await
            .expect("delayed raise fires");
            assert_eq!(snapshot.marks, vec!["delayed"]);
        })
        .await;
}

#[tokio::test]
async fn test_timers_are_cancelled_when_the_actor_stops() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let system = ActorSystem::new();
            let actor = coordinator(&system);

            actor.send(CoordinatorEvent::Later);
            actor.stop();
            tokio::time::sleep(Duration::from_millis(60)).await;

            assert_eq!(actor.status(), Status::Stopped);
            assert!(actor.snapshot().marks.is_empty(), "cancelled timer must not fire");
            assert!(
                system.dead_letters().is_empty(),
                "a cancelled timer never even produces a dead letter"
            );
        })
        .await;
}

#[test]
fn test_send_to_keyed_registry_target() {
    let system = ActorSystem::new();
    let audit = create_actor(
        &system,
        from_reducer(|total: &u64, delta: &u64| total + delta),
        ActorOptions::with_input(0).system_id("audit"),
    );
    audit.start();

    // A coordinator-side send through the registry key.
    struct KeyedSender;

    #[derive(Debug)]
    struct Go;

    impl ActorLogic for KeyedSender {
        type Snapshot = WorkerSnapshot;
        type Event = Go;
        type Input = ();
        type Emitted = ();

        fn initial_snapshot(&self, _scope: &ActorScope<Self>, _input: ()) -> WorkerSnapshot {
            WorkerSnapshot {
                status: Status::Active,
                error: None,
            }
        }

        fn transition(
            &self,
            snapshot: WorkerSnapshot,
            _event: Go,
            scope: &ActorScope<Self>,
        ) -> Result<WorkerSnapshot, ActorFault> {
            actions::send_to(SendTarget::Keyed("audit".to_string()), 5u64).attach(snapshot, scope)
        }

        fn persisted_snapshot(&self, snapshot: &WorkerSnapshot) -> Result<serde_json::Value, PersistError> {
            serde_json::to_value(snapshot).map_err(PersistError::Serialize)
        }

        fn restore_snapshot(&self, persisted: serde_json::Value) -> Result<WorkerSnapshot, PersistError> {
            serde_json::from_value(persisted).map_err(|e| PersistError::Malformed(e.to_string()))
        }
    }

    let sender = create_actor(&system, KeyedSender, ActorOptions::default());
    sender.start();
    sender.send(Go);

    assert!(system.get("audit").is_some(), "audit actor stays registered");
    assert_eq!(audit.snapshot().context, 5);
}
