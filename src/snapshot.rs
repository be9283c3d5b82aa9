//! # Snapshots
//!
//! Every actor exposes its observable state as a *snapshot*: a cheap-to-clone,
//! serializable value that is **replaced, never mutated** on each processed
//! event. This module defines the lifecycle [`Status`] shared by all snapshot
//! shapes and the [`SnapshotLike`] contract the kernel relies on.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::error::ActorFault;

/// Lifecycle status of an actor.
///
/// # Invariant: Monotone Status
/// Status only ever moves away from [`Status::Active`]. Once a snapshot is
/// terminal, no transition may return it to `Active`, and the kernel absorbs
/// further inbound events without producing new effects. `snapshot()` and
/// `subscribe` keep answering with the final value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The actor is processing events.
    Active,
    /// The actor completed successfully (its output, if any, is final).
    Done,
    /// The actor captured a fault; see [`SnapshotLike::fault`].
    Error,
    /// The actor was stopped by its owner or by an explicit `stop()`.
    Stopped,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::Active)
    }
}

/// Contract every logic variant's snapshot satisfies.
///
/// The kernel is generic over the snapshot shape; it only needs to read the
/// status, read the captured fault, and force the two kernel-driven terminal
/// transitions (stop and error capture). Everything else on a snapshot is
/// variant-specific and opaque to the kernel.
pub trait SnapshotLike: Clone + Debug + 'static {
    fn status(&self) -> Status;

    /// The captured fault, present exactly when `status() == Status::Error`.
    fn fault(&self) -> Option<&ActorFault>;

    /// Kernel-driven stop. Implementations must set status to
    /// [`Status::Stopped`] and must not touch variant fields.
    fn mark_stopped(&mut self);

    /// Kernel-driven error capture. Implementations must set status to
    /// [`Status::Error`] and retain the fault for later observers.
    fn mark_error(&mut self, fault: ActorFault);
}
