//! Event system for engine operations
//!
//! Provides an event bus for notifying listeners about status transitions,
//! report handling, connection rebuilds and sync passes. Useful for:
//! - Audit logging
//! - Refreshing a rendered facility list
//! - Sync triggers

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::db::StoreKind;

/// Events emitted by services
#[derive(Debug, Clone)]
pub enum EngineEvent {
    // Cascade events
    FacilityFailed {
        id: String,
        at_risk: Vec<String>,
    },
    FacilityAtRisk {
        id: String,
        caused_by: String,
    },
    FacilityRestored {
        id: String,
    },

    // Report events
    ReportStored {
        report_id: String,
        facility_id: String,
        applied: bool,
        adjustment: f64,
    },

    // Graph and ingest events
    ConnectionsRebuilt {
        store: StoreKind,
        count: usize,
    },
    FacilitiesIngested {
        store: StoreKind,
        count: usize,
    },

    // Sync events
    SyncCompleted {
        reports_synced: usize,
        facilities_merged: usize,
    },
    SyncSkipped {
        reason: String,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    /// Handle an event
    fn on_event(&self, event: &EngineEvent);
}

/// Event bus for broadcasting engine events
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a new event bus with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: EngineEvent) {
        trace!(event = ?event, "Emitting engine event");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Logging event listener for audit trails
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &EngineEvent) {
        match event {
            EngineEvent::FacilityFailed { id, at_risk } => {
                debug!(id = %id, at_risk = at_risk.len(), "Facility failed");
            }
            EngineEvent::FacilityAtRisk { id, caused_by } => {
                debug!(id = %id, caused_by = %caused_by, "Facility at risk");
            }
            EngineEvent::FacilityRestored { id } => {
                debug!(id = %id, "Facility restored");
            }
            EngineEvent::ReportStored {
                report_id,
                facility_id,
                applied,
                adjustment,
            } => {
                debug!(
                    report = %report_id,
                    facility = %facility_id,
                    applied,
                    adjustment,
                    "Report stored"
                );
            }
            _ => {
                trace!(event = ?event, "Engine event");
            }
        }
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_emit_receive() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.emit(EngineEvent::FacilityAtRisk {
            id: "s1".into(),
            caused_by: "p1".into(),
        });

        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .expect("timeout")
            .expect("receive error");

        match event {
            EngineEvent::FacilityAtRisk { id, caused_by } => {
                assert_eq!(id, "s1");
                assert_eq!(caused_by, "p1");
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_event_bus_no_subscribers() {
        let bus = EventBus::new();
        // Should not panic even with no subscribers
        bus.emit(EngineEvent::FacilityRestored { id: "test".into() });
        assert_eq!(bus.subscriber_count(), 0);
    }
}
