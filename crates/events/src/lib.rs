#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Progress bus for the otad update agent
//!
//! Two complementary channels:
//!
//! - A domain event channel (`EventSender`/`EventReceiver`) carrying
//!   [`UpdateEvent`] values from workers to the log mirror in the binary.
//! - A [`SnapshotBus`] holding the current [`ProgressSnapshot`]
//!   last-writer-wins; the poll endpoint reads it without any lock and the
//!   callback client wakes on every replacement.

pub mod events;
pub mod snapshot;

pub use events::UpdateEvent;
pub use snapshot::{SnapshotBus, SnapshotReader};

use tokio::sync::mpsc::UnboundedSender;

/// Type alias for the domain event sender
pub type EventSender = UnboundedSender<UpdateEvent>;

/// Type alias for the domain event receiver
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<UpdateEvent>;

/// Create a new domain event channel
#[must_use]
pub fn channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

/// Unified trait for emitting events throughout the agent
///
/// Send errors are ignored: a dropped receiver must never block or fail an
/// update operation.
pub trait EventEmitter {
    /// Get the event sender for this emitter
    fn event_sender(&self) -> Option<&EventSender>;

    /// Emit an event through this emitter
    fn emit(&self, event: UpdateEvent) {
        if let Some(sender) = self.event_sender() {
            let _ = sender.send(event);
        }
    }

    /// Emit a warning event
    fn emit_warning(&self, message: impl Into<String>) {
        self.emit(UpdateEvent::Warning {
            message: message.into(),
        });
    }

    /// Emit a debug event
    fn emit_debug(&self, message: impl Into<String>) {
        self.emit(UpdateEvent::Debug {
            message: message.into(),
        });
    }
}

impl EventEmitter for EventSender {
    fn event_sender(&self) -> Option<&EventSender> {
        Some(self)
    }
}

impl EventEmitter for Option<EventSender> {
    fn event_sender(&self) -> Option<&EventSender> {
        self.as_ref()
    }
}
