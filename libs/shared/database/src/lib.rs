pub mod memory;
pub mod store;

pub use memory::InMemoryStore;
pub use store::{
    AlertFilter, CascadeSummary, MonitorStore, StoreError, TargetUpdate, DEFAULT_ALERT_LIMIT,
    MAX_ALERT_LIMIT,
};
