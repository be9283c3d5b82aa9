use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use actor_core::kernel::{create_actor, ActorOptions, ActorRef, ActorScope, Observer};
use actor_core::logic::{
    from_actor, from_callback, from_event_stream, from_reducer, from_stream, from_task, ActorLogic,
    CallbackArgs, ReducerLogic, SendBack, SourceUpdate, TaskArgs,
};
use actor_core::snapshot::{SnapshotLike, Status};
use actor_core::system::ActorSystem;
use actor_core::wait_for::wait_for;
use actor_core::{ActorFault, PersistError};

#[tokio::test]
async fn test_task_resolution_moves_active_to_done() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let system = ActorSystem::new();
            let task = create_actor(
                &system,
                from_task(|args: TaskArgs<u64>| async move { Ok(args.input * 2) }),
                ActorOptions::with_input(21),
            );
            task.start();

            let snapshot = wait_for(&task, |s| s.status == Status::Done, Duration::from_secs(1))
                .await
                .expect("task settles");
            assert_eq!(snapshot.output, Some(42));

            // A subscriber attached after settlement immediately receives the
            // done notification with the final output.
            let outputs: Rc<RefCell<Vec<Option<u64>>>> = Rc::new(RefCell::new(Vec::new()));
            let completed = Rc::new(Cell::new(false));
            let outputs_sink = outputs.clone();
            let completed_sink = completed.clone();
            task.subscribe_observer(
                Observer::new()
                    .on_next(move |s: &actor_core::logic::TaskSnapshot<u64, u64>| {
                        outputs_sink.borrow_mut().push(s.output)
                    })
                    .on_complete(move || completed_sink.set(true)),
            );
            assert_eq!(*outputs.borrow(), vec![Some(42)]);
            assert!(completed.get());
        })
        .await;
}

#[tokio::test]
async fn test_task_rejection_moves_active_to_error() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let system = ActorSystem::new();
            let task = create_actor(
                &system,
                from_task(|_args: TaskArgs<()>| async move {
                    Err::<u64, _>(ActorFault::new("backend unreachable"))
                }),
                ActorOptions::default(),
            );
            task.start();

            let err = wait_for(&task, |_| false, Duration::from_secs(1))
                .await
                .expect_err("task fails");
            assert_eq!(
                err,
                actor_core::WaitForError::Faulted(ActorFault::new("backend unreachable"))
            );
            assert_eq!(task.snapshot().error, Some(ActorFault::new("backend unreachable")));
        })
        .await;
}

#[tokio::test]
async fn test_stopping_a_task_signals_cancellation_and_discards_the_result() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let system = ActorSystem::new();
            let observed_cancel = Rc::new(Cell::new(false));
            let flag = observed_cancel.clone();
            let task = create_actor(
                &system,
                from_task(move |args: TaskArgs<()>| {
                    let flag = flag.clone();
                    async move {
                        args.signal.clone().await;
                        flag.set(true);
                        // Settles anyway; the kernel must discard this.
                        Ok(99u64)
                    }
                }),
                ActorOptions::default(),
            );
            task.start();
            task.stop();

            tokio::time::sleep(Duration::from_millis(20)).await;
            assert!(observed_cancel.get(), "cancellation is signalled, not forced");
            assert_eq!(task.status(), Status::Stopped);
            assert_eq!(task.snapshot().output, None, "late settlement is discarded");
        })
        .await;
}

#[tokio::test]
async fn test_task_spawned_children_stop_with_the_task() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let system = ActorSystem::new();
            let task = create_actor(
                &system,
                from_task(|args: TaskArgs<()>| async move {
                    args.spawn
                        .spawn(
                            from_reducer(add as fn(&u64, &u64) -> u64),
                            ActorOptions::with_input(0).system_id("task-helper"),
                        )
                        .expect("task is active");
                    args.signal.clone().await;
                    Ok(0u64)
                }),
                ActorOptions::default(),
            );
            task.start();
            tokio::time::sleep(Duration::from_millis(10)).await;

            let helper = system.get("task-helper").expect("child joined the registry");
            assert_eq!(helper.status(), Status::Active);

            // The child belongs to the task's subtree, so stopping the task
            // stops it too.
            task.stop();
            assert_eq!(helper.status(), Status::Stopped);
            assert!(system.get("task-helper").is_none(), "stopped child unregisters");
        })
        .await;
}

/// Parent used by the callback and stream tests: records every `u64` it
/// receives from its children.
struct CollectorLogic {
    spawn: Box<dyn Fn(&ActorScope<CollectorLogic>)>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct CollectorSnapshot {
    status: Status,
    error: Option<ActorFault>,
    received: Vec<u64>,
}

impl SnapshotLike for CollectorSnapshot {
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

impl ActorLogic for CollectorLogic {
    type Snapshot = CollectorSnapshot;
    type Event = u64;
    type Input = ();
    type Emitted = ();

    fn initial_snapshot(&self, scope: &ActorScope<Self>, _input: ()) -> CollectorSnapshot {
        (self.spawn)(scope);
        CollectorSnapshot {
            status: Status::Active,
            error: None,
            received: Vec::new(),
        }
    }

    fn transition(
        &self,
        mut snapshot: CollectorSnapshot,
        event: u64,
        _scope: &ActorScope<Self>,
    ) -> Result<CollectorSnapshot, ActorFault> {
        snapshot.received.push(event);
        Ok(snapshot)
    }

    fn persisted_snapshot(&self, snapshot: &CollectorSnapshot) -> Result<serde_json::Value, PersistError> {
        serde_json::to_value(snapshot).map_err(PersistError::Serialize)
    }

    fn restore_snapshot(&self, persisted: serde_json::Value) -> Result<CollectorSnapshot, PersistError> {
        serde_json::from_value(persisted).map_err(|e| PersistError::Malformed(e.to_string()))
    }
}

#[test]
fn test_callback_send_back_reaches_parent_until_stopped() {
    let system = ActorSystem::new();
    let sender_slot: Rc<RefCell<Option<SendBack<u64>>>> = Rc::new(RefCell::new(None));

    let slot = sender_slot.clone();
    let collector = create_actor(
        &system,
        CollectorLogic {
            spawn: Box::new(move |scope| {
                let slot = slot.clone();
                scope.spawn_child(
                    from_callback(move |args: CallbackArgs<(), u64, (), ()>| {
                        *slot.borrow_mut() = Some(args.send_back.clone());
                        None
                    }),
                    ActorOptions::default().system_id("relay"),
                );
            }),
        },
        ActorOptions::default(),
    );
    collector.start();

    let send_back = sender_slot.borrow().clone().expect("callback body ran at start");
    send_back.send(7);
    assert_eq!(collector.snapshot().received, vec![7]);

    // Stop the callback actor; a late send_back must not reach the former
    // parent.
    system.get("relay").expect("callback registered").stop();
    send_back.send(9);
    assert_eq!(collector.snapshot().received, vec![7]);
}

#[test]
fn test_callback_listeners_fan_out_and_detach_on_stop() {
    let system = ActorSystem::new();
    let first = Rc::new(Cell::new(0u64));
    let second = Rc::new(Cell::new(0u64));

    let (a, b) = (first.clone(), second.clone());
    let callback = create_actor(
        &system,
        from_callback(move |args: CallbackArgs<u64, (), (), ()>| {
            let (a, b) = (a.clone(), b.clone());
            args.receive.listen(move |event| a.set(a.get() + *event));
            args.receive.listen(move |event| b.set(b.get() + *event * 10));
            None
        }),
        ActorOptions::default(),
    );
    callback.start();

    callback.send(3);
    assert_eq!(first.get(), 3);
    assert_eq!(second.get(), 30, "every listener sees every event");

    // The snapshot of a callback actor never changes in response to events.
    assert_eq!(callback.status(), Status::Active);
}

#[test]
fn test_callback_emit_reaches_on_emit_listeners() {
    let system = ActorSystem::new();
    let emitted: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));

    let callback = create_actor(
        &system,
        from_callback(move |args: CallbackArgs<u64, (), (), String>| {
            let emit = args.emit.clone();
            args.receive
                .listen(move |event| emit.emit(format!("saw {event}")));
            None
        }),
        ActorOptions::default(),
    );
    callback.start();

    let sink = emitted.clone();
    let subscription = callback.on_emit(move |event: &String| sink.borrow_mut().push(event.clone()));

    callback.send(4);
    callback.send(5);
    assert_eq!(
        *emitted.borrow(),
        vec!["saw 4".to_string(), "saw 5".to_string()]
    );

    subscription.unsubscribe();
    callback.send(6);
    assert_eq!(emitted.borrow().len(), 2, "unsubscribed listener is detached");
}

#[tokio::test]
async fn test_plain_stream_tracks_latest_item_then_completes() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let system = ActorSystem::new();
            let actor = create_actor(
                &system,
                from_stream(|_args: actor_core::logic::StreamArgs<()>| {
                    futures::stream::iter(vec![Ok(1u64), Ok(2), Ok(3)])
                }),
                ActorOptions::default(),
            );
            actor.start();

            let snapshot = wait_for(&actor, |s| s.status == Status::Done, Duration::from_secs(1))
                .await
                .expect("stream completes");
            assert_eq!(snapshot.context, Some(3), "context is the latest item");
        })
        .await;
}

#[tokio::test]
async fn test_event_stream_forwards_items_to_parent() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let system = ActorSystem::new();
            let collector = create_actor(
                &system,
                CollectorLogic {
                    spawn: Box::new(|scope| {
                        scope.spawn_child(
                            from_event_stream(|_args: actor_core::logic::StreamArgs<()>| {
                                futures::stream::iter(vec![Ok(10u64), Ok(20)])
                            }),
                            ActorOptions::default(),
                        );
                    }),
                },
                ActorOptions::default(),
            );
            collector.start();

            let snapshot = wait_for(
                &collector,
                |s| s.received.len() == 2,
                Duration::from_secs(1),
            )
            .await
            .expect("items forwarded");
            assert_eq!(snapshot.received, vec![10, 20]);
        })
        .await;
}

#[tokio::test]
async fn test_stream_error_fails_the_actor() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let system = ActorSystem::new();
            let actor = create_actor(
                &system,
                from_stream(|_args: actor_core::logic::StreamArgs<()>| {
                    futures::stream::iter(vec![Ok(1u64), Err(ActorFault::new("feed dropped"))])
                }),
                ActorOptions::default(),
            );
            actor.start();

            let err = wait_for(&actor, |_| false, Duration::from_secs(1))
                .await
                .expect_err("stream fails");
            assert_eq!(
                err,
                actor_core::WaitForError::Faulted(ActorFault::new("feed dropped"))
            );
        })
        .await;
}

fn add(total: &u64, delta: &u64) -> u64 {
    total + delta
}

type CounterLogic = ReducerLogic<u64, u64, u64, fn(&u64, &u64) -> u64>;

/// Parent holding a bridge onto an external counter actor.
struct BridgeParent {
    source: ActorRef<CounterLogic>,
}

impl ActorLogic for BridgeParent {
    type Snapshot = CollectorSnapshot;
    type Event = u64;
    type Input = ();
    type Emitted = ();

    fn initial_snapshot(&self, scope: &ActorScope<Self>, _input: ()) -> CollectorSnapshot {
        scope.spawn_child(
            from_actor(&self.source, |update| match update {
                SourceUpdate::Next(snapshot) => Some(snapshot.context),
                SourceUpdate::Error(_) | SourceUpdate::Complete => None,
            }),
            ActorOptions::default().system_id("bridge"),
        );
        CollectorSnapshot {
            status: Status::Active,
            error: None,
            received: Vec::new(),
        }
    }

    fn transition(
        &self,
        mut snapshot: CollectorSnapshot,
        event: u64,
        _scope: &ActorScope<Self>,
    ) -> Result<CollectorSnapshot, ActorFault> {
        snapshot.received.push(event);
        Ok(snapshot)
    }

    fn persisted_snapshot(&self, snapshot: &CollectorSnapshot) -> Result<serde_json::Value, PersistError> {
        serde_json::to_value(snapshot).map_err(PersistError::Serialize)
    }

    fn restore_snapshot(&self, persisted: serde_json::Value) -> Result<CollectorSnapshot, PersistError> {
        serde_json::from_value(persisted).map_err(|e| PersistError::Malformed(e.to_string()))
    }
}

#[test]
fn test_bridge_maps_source_updates_into_parent_events() {
    let system = ActorSystem::new();
    let source: ActorRef<CounterLogic> = create_actor(
        &system,
        from_reducer(add as fn(&u64, &u64) -> u64),
        ActorOptions::with_input(0),
    );
    source.start();

    let parent = create_actor(&system, BridgeParent { source: source.clone() }, ActorOptions::default());
    parent.start();

    source.send(1);
    source.send(2);
    assert_eq!(parent.snapshot().received, vec![1, 3]);

    // Source completion completes the bridge, which then unregisters.
    source.stop();
    assert!(system.get("bridge").is_none(), "completed bridge unregisters");
    assert_eq!(parent.snapshot().received, vec![1, 3]);
}

#[tokio::test]
async fn test_wait_for_times_out_when_nothing_matches() {
    let system = ActorSystem::new();
    let counter = create_actor(
        &system,
        from_reducer(add as fn(&u64, &u64) -> u64),
        ActorOptions::with_input(0),
    );
    counter.start();

    let err = wait_for(&counter, |s| s.context > 10, Duration::from_millis(30))
        .await
        .expect_err("nothing ever matches");
    assert_eq!(err, actor_core::WaitForError::Timeout);
    assert_eq!(counter.status(), Status::Active, "waiting leaves the actor untouched");
}

#[tokio::test]
async fn test_wait_for_reports_termination_without_a_match() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let system = ActorSystem::new();

            // Already terminal at call time: reported without waiting.
            let stopped = create_actor(
                &system,
                from_reducer(add as fn(&u64, &u64) -> u64),
                ActorOptions::with_input(0),
            );
            stopped.start();
            stopped.stop();
            let err = wait_for(&stopped, |s| s.context > 0, Duration::from_secs(1))
                .await
                .expect_err("stopped before any match");
            assert_eq!(err, actor_core::WaitForError::Terminated(Status::Stopped));

            // Terminal transition while waiting: completion wins over the
            // predicate, which never matches the final snapshot.
            let task = create_actor(
                &system,
                from_task(|_args: TaskArgs<()>| async move { Ok(1u64) }),
                ActorOptions::default(),
            );
            task.start();
            let err = wait_for(&task, |s| s.output == Some(99), Duration::from_secs(1))
                .await
                .expect_err("task finishes without matching");
            assert_eq!(err, actor_core::WaitForError::Terminated(Status::Done));
        })
        .await;
}
