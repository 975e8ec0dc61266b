//! Event fan-out.
//!
//! Every event frame is handed to each matching subscription, in
//! registration order, on the connection task. Handlers run inside
//! `catch_unwind`: a panicking handler is logged and the remaining
//! handlers still run.
//!
//! Frames are not buffered. A handler registered after a frame was
//! dispatched never sees it.

// ============================================================================
// Imports
// ============================================================================

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::warn;

use crate::identifiers::SubscriptionId;
use crate::protocol::EventFrame;
use crate::transport::EventSink;

// ============================================================================
// Types
// ============================================================================

/// Event handler callback.
pub type EventHandler = Arc<dyn Fn(&EventFrame) + Send + Sync>;

/// A registered handler.
struct Subscription {
    id: SubscriptionId,
    filter: StreamFilter,
    handler: EventHandler,
}

// ============================================================================
// StreamFilter
// ============================================================================

/// Which frames a subscription receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFilter {
    /// Every event frame.
    All,
    /// Frames whose `stream` equals the given name.
    Stream(String),
}

impl StreamFilter {
    /// Frames for one stream.
    #[inline]
    #[must_use]
    pub fn stream(name: impl Into<String>) -> Self {
        Self::Stream(name.into())
    }

    /// Returns `true` if `event` passes this filter.
    #[inline]
    #[must_use]
    pub fn matches(&self, event: &EventFrame) -> bool {
        match self {
            Self::All => true,
            Self::Stream(name) => event.stream == *name,
        }
    }
}

impl From<&str> for StreamFilter {
    fn from(name: &str) -> Self {
        match name {
            "*" => Self::All,
            name => Self::stream(name),
        }
    }
}

// ============================================================================
// EventDispatcher
// ============================================================================

/// Subscription registry shared by the client and its connections.
///
/// Registrations outlive connections: a reconnect keeps every handler.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    subscriptions: Arc<RwLock<Vec<Subscription>>>,
    next_id: Arc<AtomicU64>,
}

impl EventDispatcher {
    /// Creates an empty dispatcher.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for frames matching `filter`.
    pub fn subscribe(&self, filter: StreamFilter, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.subscriptions.write().push(Subscription {
            id,
            filter,
            handler,
        });
        id
    }

    /// Removes a subscription. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }

    /// Returns the number of subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Returns `true` if nothing is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.read().is_empty()
    }

    /// Delivers `event` to every matching handler in registration order.
    ///
    /// Returns the number of handlers that ran to completion.
    pub fn dispatch(&self, event: &EventFrame) -> usize {
        // Snapshot so handlers may subscribe or unsubscribe while running.
        let handlers: Vec<(SubscriptionId, EventHandler)> = self
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.filter.matches(event))
            .map(|s| (s.id, Arc::clone(&s.handler)))
            .collect();

        let mut delivered = 0;
        for (id, handler) in handlers {
            if run_isolated(|| handler(event)) {
                delivered += 1;
            } else {
                warn!(subscription = %id, stream = %event.stream, "Event handler panicked");
            }
        }
        delivered
    }

    /// Adapts this dispatcher into a connection's event sink.
    pub(crate) fn sink(&self) -> EventSink {
        let dispatcher = self.clone();
        Arc::new(move |event| {
            dispatcher.dispatch(&event);
        })
    }
}

/// Runs a user callback, containing any panic. Returns `false` on panic.
pub(crate) fn run_isolated(callback: impl FnOnce()) -> bool {
    catch_unwind(AssertUnwindSafe(callback)).is_ok()
}

// ============================================================================
// Tests
// ============================================================================
