//! # Runtime Support
//!
//! Process-level concerns that sit outside the actor tree itself: tracing
//! subscriber setup.

pub mod tracing;

pub use self::tracing::setup_tracing;
