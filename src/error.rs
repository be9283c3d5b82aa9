//! # Error Types
//!
//! This module defines the error types used throughout the actor kernel.
//! By centralizing error definitions, we ensure consistent error handling
//! across the kernel, the system registry and the built-in logic variants.
//!
//! # Design Note: Faults as Values
//! A fault inside one actor must never unwind through an unrelated call
//! stack. Anything that crosses an actor boundary is therefore carried as an
//! [`ActorFault`] *value*: cloneable, serializable, and stored on the failed
//! actor's snapshot where subscribers (including ones that attach later) can
//! retrieve it. Only call-site programmer errors surface as ordinary `Result`
//! errors at the call site.

use serde::{Deserialize, Serialize};

use crate::snapshot::Status;

/// A fault captured inside an actor: a failed transition or start hook, a
/// rejected asynchronous task, a stream error, or an escalated child failure.
///
/// Faults are plain values so they can live on a snapshot, round-trip through
/// persistence, and be replayed to observers that subscribe after the fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct ActorFault {
    /// Human-readable description of what went wrong.
    pub message: String,
}

impl ActorFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<&str> for ActorFault {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for ActorFault {
    fn from(message: String) -> Self {
        Self { message }
    }
}

/// Errors raised by the system registry.
///
/// A registry conflict is surfaced on the *newly registering* actor's own
/// error channel rather than thrown into whichever call stack happened to
/// trigger registration; the incumbent actor is unaffected.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("another actor is already registered under system id `{0}`")]
    DuplicateSystemId(String),
}

/// Errors raised while persisting or restoring a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("persisted snapshot is malformed: {0}")]
    Malformed(String),
}

/// Errors returned by [`wait_for`](crate::wait_for::wait_for).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WaitForError {
    #[error("timed out before the predicate matched")]
    Timeout,
    #[error("actor reached status `{0:?}` before the predicate matched")]
    Terminated(Status),
    #[error("actor failed before the predicate matched: {0}")]
    Faulted(ActorFault),
}
