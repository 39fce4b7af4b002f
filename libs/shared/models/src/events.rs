use serde::{Deserialize, Serialize};

use crate::monitor::{Alert, AlertState, Metric};

/// Kinds carried by the in-process event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Metric,
    Alert,
}

impl EventKind {
    pub const ALL: [EventKind; 2] = [EventKind::Metric, EventKind::Alert];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Metric => "metric",
            EventKind::Alert => "alert",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// A metric has been durably written.
    Metric(Metric),
    /// An alert was created (triggered) or resolved.
    Alert(AlertChanged),
}

impl BusEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BusEvent::Metric(_) => EventKind::Metric,
            BusEvent::Alert(_) => EventKind::Alert,
        }
    }
}

/// Alert record together with the transition that produced the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertChanged {
    pub transition: AlertState,
    #[serde(flatten)]
    pub alert: Alert,
}

impl AlertChanged {
    pub fn new(alert: Alert) -> Self {
        Self {
            transition: alert.state,
            alert,
        }
    }
}

/// Body of the `ping` stream event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    /// Epoch milliseconds at emission.
    pub t: i64,
}

impl Heartbeat {
    pub fn now() -> Self {
        Self {
            t: chrono::Utc::now().timestamp_millis(),
        }
    }
}
