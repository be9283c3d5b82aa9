use actor_core::kernel::{create_actor, ActorOptions};
use actor_core::logic::from_reducer;
use actor_core::message::AnyMessage;
use actor_core::snapshot::Status;
use actor_core::system::ActorSystem;

#[derive(Debug)]
enum Tick {
    Tick,
}

fn counter(system: &ActorSystem, key: &str) -> actor_core::ActorRef<impl actor_core::ActorLogic<Event = Tick, Snapshot = actor_core::logic::ReducerSnapshot<u64>, Input = u64>> {
    create_actor(
        system,
        from_reducer(|count: &u64, _event: &Tick| count + 1),
        ActorOptions::with_input(0).system_id(key),
    )
}

#[test]
fn test_ids_are_stable_and_monotonic() {
    let system = ActorSystem::new();
    let first = counter(&system, "first");
    let second = counter(&system, "second");
    assert!(second.id() > first.id());
    assert_eq!(first.system_id(), Some("first"));
}

#[test]
fn test_duplicate_system_id_fails_only_the_new_registrant() {
    let system = ActorSystem::new();
    let incumbent = counter(&system, "singleton");
    incumbent.start();

    let challenger = counter(&system, "singleton");
    challenger.start();

    // The incumbent keeps the slot and keeps working.
    assert_eq!(incumbent.status(), Status::Active);
    incumbent.send(Tick::Tick);
    assert_eq!(incumbent.snapshot().context, 1);

    // The challenger fails on its own error channel with a descriptive
    // message; nothing is thrown anywhere else.
    assert_eq!(challenger.status(), Status::Error);
    let fault = challenger.snapshot().error.expect("fault recorded");
    assert!(
        fault.message.contains("singleton"),
        "message names the conflicting key, got: {}",
        fault.message
    );

    // The registry still resolves to the incumbent.
    let resolved = system.get("singleton").expect("key still registered");
    assert_eq!(resolved.id(), incumbent.id());
}

#[test]
fn test_key_becomes_claimable_after_the_incumbent_terminates() {
    let system = ActorSystem::new();
    let incumbent = counter(&system, "rotating");
    incumbent.start();
    incumbent.stop();
    assert!(system.get("rotating").is_none());

    let successor = counter(&system, "rotating");
    successor.start();
    assert_eq!(successor.status(), Status::Active);
    assert_eq!(
        system.get("rotating").map(|a| a.id()),
        Some(successor.id())
    );
}

#[test]
fn test_get_all_lists_live_actors_only() {
    let system = ActorSystem::new();
    let a = counter(&system, "a");
    let b = counter(&system, "b");
    a.start();
    b.start();
    assert_eq!(system.get_all().len(), 2);

    a.stop();
    let remaining = system.get_all();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id(), b.id());
}

#[test]
fn test_event_to_terminated_actor_yields_exactly_one_dead_letter() {
    let system = ActorSystem::new();
    let actor = counter(&system, "doomed");
    actor.start();
    let erased = actor.as_any();
    actor.stop();

    erased.send_any(AnyMessage::new(Tick::Tick));

    let letters = system.dead_letters();
    assert_eq!(letters.len(), 1, "exactly one record per undeliverable event");
    assert_eq!(letters[0].target, actor.id());
    assert!(letters[0].event_type.contains("Tick"));
}

#[test]
fn test_type_mismatched_event_is_dead_lettered_not_thrown() {
    let system = ActorSystem::new();
    let actor = counter(&system, "typed");
    actor.start();

    // A payload the actor's event type cannot absorb.
    actor.as_any().send_any(AnyMessage::new("not a tick"));

    assert_eq!(actor.status(), Status::Active, "the target is unaffected");
    assert_eq!(actor.snapshot().context, 0);
    let letters = system.dead_letters();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].event, "\"not a tick\"");
}

#[test]
fn test_dead_letter_sink_is_lazy() {
    let system = ActorSystem::new();
    let actor = counter(&system, "quiet");
    actor.start();

    // No dead letters yet: the sink actor must not exist.
    assert_eq!(system.get_all().len(), 1);
    assert!(system.dead_letters().is_empty());

    actor.stop();
    actor.as_any().send_any(AnyMessage::new(Tick::Tick));

    // Now the sink exists and holds the record.
    assert_eq!(system.dead_letters().len(), 1);
}
