#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Event bus for macfetch
//!
//! Library crates report what they are doing through typed events rather
//! than printing. Every event travels with an [`EventMeta`] so consumers can
//! correlate it with the task that produced it and route it to `tracing`
//! at the right level.
//!
//! The bus is a broadcast channel: each task holds a sender, and any
//! number of consumers (the CLI renderer, a log forwarder, tests) subscribe.
//! Slow consumers may miss intermediate progress events; terminal task
//! outcomes are also delivered through [`TaskEvent::Finished`].

pub mod meta;
pub use meta::{EventLevel, EventMeta, EventSource};

pub mod events;
pub use events::{
    AppEvent, DownloadEvent, FailureContext, GeneralEvent, RecoveryEvent, TaskEvent, TaskOutcome,
    VerificationEvent,
};

use serde::Serialize;
use tokio::sync::broadcast;

/// Default capacity of the broadcast buffer
pub const DEFAULT_CAPACITY: usize = 1024;

/// An event together with its metadata
#[derive(Debug, Clone, Serialize)]
pub struct EventMessage {
    pub meta: EventMeta,
    pub event: AppEvent,
}

/// Receiving side of the bus
pub type EventReceiver = broadcast::Receiver<EventMessage>;

/// Sending side of the bus, optionally bound to a correlation id
#[derive(Debug, Clone)]
pub struct EventSender {
    inner: broadcast::Sender<EventMessage>,
    correlation_id: Option<String>,
}

impl EventSender {
    /// Subscribe a new consumer; it sees events sent from now on
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        self.inner.subscribe()
    }

    /// Clone this sender with every event stamped with `correlation_id`
    #[must_use]
    pub fn with_correlation(&self, correlation_id: impl Into<String>) -> Self {
        Self {
            inner: self.inner.clone(),
            correlation_id: Some(correlation_id.into()),
        }
    }

    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Wrap `event` in metadata and publish it
    pub fn send(&self, event: AppEvent) {
        let mut meta = EventMeta::new(event.log_level(), event.event_source());
        if let Some(id) = &self.correlation_id {
            meta = meta.with_correlation_id(id.clone());
        }
        // No subscribers is not an error
        let _ = self.inner.send(EventMessage { meta, event });
    }
}

/// Create a new event bus with the default capacity
#[must_use]
pub fn channel() -> (EventSender, EventReceiver) {
    channel_with_capacity(DEFAULT_CAPACITY)
}

/// Create a new event bus
#[must_use]
pub fn channel_with_capacity(capacity: usize) -> (EventSender, EventReceiver) {
    let (inner, rx) = broadcast::channel(capacity.max(1));
    (
        EventSender {
            inner,
            correlation_id: None,
        },
        rx,
    )
}

/// The unified trait for emitting events throughout macfetch
///
/// Implemented for the raw [`EventSender`] and for anything that may or may
/// not carry one, so call sites never need to check.
pub trait EventEmitter {
    /// Get the event sender for this emitter
    fn event_sender(&self) -> Option<&EventSender>;

    /// Emit an event through this emitter
    fn emit(&self, event: AppEvent) {
        if let Some(sender) = self.event_sender() {
            sender.send(event);
        }
    }

    /// Emit a debug log event
    fn emit_debug(&self, message: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::debug(message)));
    }

    /// Emit a warning event
    fn emit_warning(&self, message: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::warning(message)));
    }

    /// Emit an error event
    fn emit_error(&self, message: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::error(message)));
    }

    fn emit_operation_started(&self, operation: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::OperationStarted {
            operation: operation.into(),
        }));
    }

    fn emit_operation_completed(&self, operation: impl Into<String>, success: bool) {
        self.emit(AppEvent::General(GeneralEvent::OperationCompleted {
            operation: operation.into(),
            success,
        }));
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
