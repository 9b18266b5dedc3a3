use async_trait::async_trait;
use std::time::Duration;

use crate::config;
use crate::observer::error::ObserverError;
use crate::observer::event::{EventKind, ForumEvent};

/// Observer rings, executed in ascending order after the write commits
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ObserverRing {
    Audit = 7,        // Structured audit trail
    Integration = 8,  // Derived state such as automatic trophies
    Notification = 9, // Stored notifications and real-time push
}

#[async_trait]
pub trait EventObserver: Send + Sync {
    /// Observer name for logging and debugging
    fn name(&self) -> &'static str;

    fn ring(&self) -> ObserverRing;

    fn applies_to(&self, kind: EventKind) -> bool;

    fn timeout(&self) -> Duration {
        Duration::from_millis(config::config().notifications.observer_timeout_ms)
    }

    /// Priority within ring (lower numbers execute first)
    fn priority(&self) -> u8 {
        50
    }

    /// Returns follow-up events, which are dispatched through the pipeline in turn
    async fn execute(&self, event: &ForumEvent) -> Result<Vec<ForumEvent>, ObserverError>;
}
