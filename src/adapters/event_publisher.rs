//! Event Sinks
//!
//! - [`LoggingEventPublisher`] writes each event to the tracing pipeline at a
//!   level chosen from what the event says about the fleet.
//! - [`EventJournal`] keeps a bounded window of recent events for the
//!   `/api/events` route and for tests.
//! - [`FanoutEventPublisher`] delivers every event to each of its sinks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::domain::events::ClusterEvent;
use crate::domain::ports::EventPublisher;
use crate::error::Result;

/// Default number of events a journal retains.
pub const DEFAULT_JOURNAL_CAPACITY: usize = 1024;

// =============================================================================
// Logging
// =============================================================================

/// Log level assigned to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSeverity {
    Debug,
    Info,
    Warn,
}

impl EventSeverity {
    /// Failed or unverified work warns, routine probing stays at debug.
    pub fn of(event: &ClusterEvent) -> Self {
        match event {
            ClusterEvent::NodeProbed { .. } | ClusterEvent::NodeSelected { .. } => {
                EventSeverity::Debug
            }
            ClusterEvent::UploadFailed { .. } | ClusterEvent::ReplicationUnverified { .. } => {
                EventSeverity::Warn
            }
            ClusterEvent::FleetHealthEvaluated { healthy: false, .. } => EventSeverity::Warn,
            _ => EventSeverity::Info,
        }
    }
}

/// Writes cluster events to the tracing pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventPublisher {
    /// Also log debug-severity events at info
    verbose: bool,
}

impl LoggingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verbose() -> Self {
        Self { verbose: true }
    }

    fn severity(&self, event: &ClusterEvent) -> EventSeverity {
        match EventSeverity::of(event) {
            EventSeverity::Debug if self.verbose => EventSeverity::Info,
            severity => severity,
        }
    }
}

#[async_trait]
impl EventPublisher for LoggingEventPublisher {
    async fn publish(&self, event: ClusterEvent) -> Result<()> {
        let event_type = event.event_type();
        let summary = event.describe();

        match self.severity(&event) {
            EventSeverity::Debug => debug!(event_type, "{}", summary),
            EventSeverity::Info => info!(event_type, "{}", summary),
            EventSeverity::Warn => warn!(event_type, "{}", summary),
        }
        Ok(())
    }

    async fn publish_all(&self, events: Vec<ClusterEvent>) -> Result<()> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}

// =============================================================================
// Journal
// =============================================================================

/// Bounded window of the most recent events, oldest evicted first.
#[derive(Debug)]
pub struct EventJournal {
    capacity: usize,
    events: RwLock<VecDeque<ClusterEvent>>,
    evicted: AtomicU64,
}

impl Default for EventJournal {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_JOURNAL_CAPACITY)
    }
}

impl EventJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// A capacity of zero is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: RwLock::new(VecDeque::with_capacity(capacity.min(DEFAULT_JOURNAL_CAPACITY))),
            evicted: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// All retained events, oldest first.
    pub fn events(&self) -> Vec<ClusterEvent> {
        self.events.read().iter().cloned().collect()
    }

    /// Up to `limit` of the newest events, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<ClusterEvent> {
        let events = self.events.read();
        let skip = events.len().saturating_sub(limit);
        events.iter().skip(skip).cloned().collect()
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<ClusterEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Events pushed out of the window since creation.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    fn push(&self, events: &mut VecDeque<ClusterEvent>, event: ClusterEvent) {
        if events.len() == self.capacity {
            events.pop_front();
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        events.push_back(event);
    }
}

#[async_trait]
impl EventPublisher for EventJournal {
    async fn publish(&self, event: ClusterEvent) -> Result<()> {
        let mut events = self.events.write();
        self.push(&mut events, event);
        Ok(())
    }

    async fn publish_all(&self, batch: Vec<ClusterEvent>) -> Result<()> {
        let mut events = self.events.write();
        for event in batch {
            self.push(&mut events, event);
        }
        Ok(())
    }
}

// =============================================================================
// Fan-out
// =============================================================================

/// Delivers every event to each sink.
///
/// A failing sink does not stop delivery to the others; the first error is
/// returned once all sinks have been tried.
#[derive(Default)]
pub struct FanoutEventPublisher {
    sinks: Vec<Arc<dyn EventPublisher>>,
}

impl FanoutEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventPublisher>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl std::fmt::Debug for FanoutEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutEventPublisher")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

#[async_trait]
impl EventPublisher for FanoutEventPublisher {
    async fn publish(&self, event: ClusterEvent) -> Result<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.publish(event.clone()).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn publish_all(&self, events: Vec<ClusterEvent>) -> Result<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.publish_all(events.clone()).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
