#![doc(html_logo_url = "https://www.rust-lang.org/logos/rust-logo-128x128.png")]
#![doc(html_favicon_url = "https://www.rust-lang.org/favicon.ico")]
//! # Actor Core
//!
//! > **A cooperative actor kernel with run-to-completion semantics.**
//!
//! This crate provides the machinery for building actor trees out of small,
//! strongly-typed units of logic: a scheduling kernel, a system registry with
//! a single delivery relay, five built-in logic variants, and a two-phase
//! action protocol for effects.
//!
//! ## 🏗️ Design Philosophy
//!
//! ### Why a cooperative, single-threaded kernel?
//!
//! An actor here is not a thread — it is a unit of *sequential logic* with an
//! observable snapshot. One logical thread of control drives a whole actor
//! tree:
//! - **Determinism**: `send()` completes the receiver's entire macrostep
//!   before returning, so tests and callers never race the scheduler.
//! - **No locks**: each actor processes its mailbox sequentially; shared
//!   state simply does not exist.
//! - **Async at the edges only**: timers, async tasks and stream consumers
//!   run on a tokio `LocalSet`; everything they learn re-enters the tree as
//!   an ordinary event.
//!
//! ### Generics: The Power of `L`
//! You'll see `ActorRef<L: ActorLogic>` everywhere. This means "I can be a
//! handle for *anything*, as long as it behaves like actor logic."
//! -   **Benefit**: The kernel's scheduling loop is written **once**, and it
//!     works for reducers, async tasks, callbacks, streams and bridges.
//! -   **Trade-off**: Heterogeneous trees need a type-erased handle; that is
//!     exactly what [`AnyActorRef`](kernel::AnyActorRef) is for.
//!
//! ## 👩‍💻 Architecture Notes
//!
//! ### 1. Snapshots, not shared state
//! An actor's observable state is an immutable snapshot, *replaced* on every
//! processed event and monotone in status: once `done`, `error` or `stopped`,
//! it never returns to `active` and further events are absorbed.
//!
//! ### 2. Faults as values
//! A failed transition or start hook never unwinds into the sender's call
//! stack. The fault is captured on the snapshot, surfaced to subscribers'
//! error channel, and replayed to subscribers that attach later.
//!
//! ### 3. Effects after commit
//! Everything outward-facing — sends, emits, child starts — goes through a
//! deferred-effect queue flushed only after the macrostep commits. No
//! recipient ever observes a sender mid-update.
//!
//! ### 4. Observability
//! We use `tracing` everywhere with structured logging: every macrostep,
//! microstep, action execution and dead letter carries the actor's id.
//! See the [`runtime::tracing`] module for setup.
//!
//! ## 🗺️ Module Tour
//!
//! ### 1. The Engine ([`kernel`])
//! Scheduling, lifecycle, handles and scopes.
//! - **Key items**: [`create_actor`](kernel::create_actor),
//!   [`ActorRef`](kernel::ActorRef), [`ActorScope`](kernel::ActorScope).
//!
//! ### 2. The Registry ([`system`])
//! Id allocation, keyed lookup, the delivery relay and the dead-letter sink.
//! - **Key items**: [`ActorSystem`](system::ActorSystem),
//!   [`DeadLetter`](system::DeadLetter).
//!
//! ### 3. The Logic Variants ([`logic`])
//! Five ways to express sequential behavior behind one contract.
//! - **Key items**: [`ActorLogic`](logic::ActorLogic),
//!   [`from_reducer`](logic::from_reducer), [`from_task`](logic::from_task),
//!   [`from_callback`](logic::from_callback),
//!   [`from_stream`](logic::from_stream), [`from_actor`](logic::from_actor).
//!
//! ### 4. The Effects ([`actions`])
//! The raise/send family with its resolve/execute phases.
//! - **Key items**: [`DynamicAction`](actions::DynamicAction),
//!   [`SendTarget`](actions::SendTarget).
//!
//! ## 🚀 Quick Start
//!
//! ```no_run
//! use actor_core::kernel::{create_actor, ActorOptions};
//! use actor_core::logic::from_reducer;
//! use actor_core::system::ActorSystem;
//!
//! #[derive(Debug)]
//! enum Count {
//!     Increment,
//! }
//!
//! let system = ActorSystem::new();
//! let counter = create_actor(
//!     &system,
//!     from_reducer(|count: &u64, _event: &Count| count + 1),
//!     ActorOptions::with_input(0),
//! );
//! counter.start();
//! counter.send(Count::Increment);
//! assert_eq!(counter.snapshot().context, 1);
//! ```
//!
//! ### Running Tests
//!
//! ```bash
//! cargo test
//! ```

pub mod actions;
pub mod error;
pub mod kernel;
pub mod logic;
pub mod message;
pub mod runtime;
pub mod snapshot;
pub mod system;
pub mod wait_for;

pub use error::{ActorFault, PersistError, RegistryError, WaitForError};
pub use kernel::{
    create_actor, ActorOptions, ActorRef, ActorScope, AnyActorRef, Observer, Spawner, Subscription,
};
pub use logic::ActorLogic;
pub use message::AnyMessage;
pub use snapshot::{SnapshotLike, Status};
pub use system::{ActorId, ActorSystem, DeadLetter};
pub use wait_for::wait_for;
