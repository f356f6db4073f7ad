//! Synchronous in-process event bus.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::trace;

use super::{AgentEvent, EventKind};
use crate::{AppError, Result};

/// Boxed event listener.
pub type Listener = Arc<dyn Fn(&AgentEvent) + Send + Sync>;

/// Which events a listener receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    /// Events of one category.
    Only(EventKind),
    /// Every event.
    All,
}

/// Handle returned by a subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    filter: EventFilter,
    listener: Listener,
}

/// Single-writer, multi-reader typed broadcaster.
///
/// Listeners run synchronously inside [`EventBus::emit`], category listeners
/// first and wildcard listeners second, each group in subscription order. The
/// bus keeps no history.
#[derive(Default)]
pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen for events of one category.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> SubscriptionId
    where
        F: Fn(&AgentEvent) + Send + Sync + 'static,
    {
        self.subscribe(EventFilter::Only(kind), Arc::new(listener))
    }

    /// Listen for every event.
    pub fn on_any<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&AgentEvent) + Send + Sync + 'static,
    {
        self.subscribe(EventFilter::All, Arc::new(listener))
    }

    /// Register a listener under an explicit filter.
    pub fn subscribe(&self, filter: EventFilter, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut subscriptions = self
            .subscriptions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        subscriptions.push(Subscription {
            id,
            filter,
            listener,
        });
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self
            .subscriptions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let before = subscriptions.len();
        subscriptions.retain(|sub| sub.id != id);
        subscriptions.len() != before
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.subscriptions
            .read()
            .map_or(0, |subscriptions| subscriptions.len())
    }

    /// Validate and deliver an event.
    ///
    /// Listeners are collected before delivery, so a listener may subscribe
    /// or unsubscribe without deadlocking; such changes apply from the next
    /// emission.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the event is malformed; nothing is
    /// delivered in that case.
    pub fn emit(&self, event: &AgentEvent) -> Result<()> {
        event.validate().map_err(|err| {
            AppError::Validation(format!("invalid {} event: {err}", event.kind().as_str()))
        })?;

        let kind = event.kind();
        let (exact, wildcard): (Vec<Listener>, Vec<Listener>) = {
            let subscriptions = self
                .subscriptions
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let exact = subscriptions
                .iter()
                .filter(|sub| sub.filter == EventFilter::Only(kind))
                .map(|sub| Arc::clone(&sub.listener))
                .collect();
            let wildcard = subscriptions
                .iter()
                .filter(|sub| sub.filter == EventFilter::All)
                .map(|sub| Arc::clone(&sub.listener))
                .collect();
            (exact, wildcard)
        };

        trace!(
            event = kind.as_str(),
            execution_id = event.execution_id(),
            listeners = exact.len() + wildcard.len(),
            "emitting event"
        );

        for listener in exact.iter().chain(wildcard.iter()) {
            listener(event);
        }
        Ok(())
    }
}
