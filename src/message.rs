//! # Type-Erased Messages
//!
//! Actors are strongly typed, but the system relay and the registry are not:
//! a heterogeneous actor tree needs one wire shape. [`AnyMessage`] erases an
//! event behind `dyn Any` while keeping enough metadata (type name, debug
//! renderer) to log it, dead-letter it, and downcast it back at the receiving
//! cell.
//!
//! # Architecture Note
//! Keeping the erasure in one small type means every built-in logic variant
//! can deliver through the same relay choke point without giving up its typed
//! event enum. A failed downcast at delivery is treated exactly like an
//! undeliverable message: it is routed to the dead-letter sink, never thrown.

use std::any::Any;
use std::fmt;

/// A type-erased event in flight between actors.
pub struct AnyMessage {
    type_name: &'static str,
    payload: Box<dyn Any>,
    // Captured at construction so a dead-lettered message can still be
    // rendered after its concrete type is out of reach.
    render: fn(&dyn Any) -> String,
}

impl AnyMessage {
    pub fn new<E: Any + fmt::Debug>(event: E) -> Self {
        Self {
            type_name: std::any::type_name::<E>(),
            payload: Box::new(event),
            render: |payload| match payload.downcast_ref::<E>() {
                Some(event) => format!("{event:?}"),
                None => "<opaque>".to_string(),
            },
        }
    }

    /// Full type name of the erased event.
    pub fn event_type(&self) -> &'static str {
        self.type_name
    }

    /// Debug rendering of the erased event.
    pub fn describe(&self) -> String {
        (self.render)(self.payload.as_ref())
    }

    pub fn is<E: Any>(&self) -> bool {
        self.payload.is::<E>()
    }

    /// Recover the typed event, or get the message back intact on mismatch.
    pub fn downcast<E: Any>(self) -> Result<E, AnyMessage> {
        match self.payload.downcast::<E>() {
            Ok(event) => Ok(*event),
            Err(payload) => Err(AnyMessage {
                type_name: self.type_name,
                payload,
                render: self.render,
            }),
        }
    }
}

impl fmt::Debug for AnyMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyMessage")
            .field("type", &self.type_name)
            .field("event", &self.describe())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Ping(u32);

    #[test]
    fn round_trips_through_erasure() {
        let message = AnyMessage::new(Ping(7));
        assert!(message.is::<Ping>());
        assert!(message.event_type().ends_with("Ping"));
        assert_eq!(message.describe(), "Ping(7)");
        assert_eq!(message.downcast::<Ping>().unwrap(), Ping(7));
    }

    #[test]
    fn downcast_mismatch_returns_message() {
        let message = AnyMessage::new(Ping(1));
        let message = message.downcast::<String>().unwrap_err();
        // Metadata survives the failed downcast.
        assert_eq!(message.describe(), "Ping(1)");
    }
}
