pub mod error;
pub mod events;
pub mod monitor;

pub use error::AppError;
pub use events::{AlertChanged, BusEvent, EventKind, Heartbeat};
pub use monitor::{Alert, AlertPayload, AlertState, Metric, Rule, RuleKind, Target};
