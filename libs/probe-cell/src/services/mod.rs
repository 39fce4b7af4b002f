pub mod ingest_client;
pub mod prober;
pub mod runner;
pub mod sink;

pub use ingest_client::{IngestClient, RetryPolicy};
pub use prober::ProbeClient;
pub use runner::{ProbeJob, ProbeRunner};
pub use sink::MetricSink;
