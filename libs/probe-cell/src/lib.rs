// =====================================================================================
// PROBE CELL - SYNTHETIC PROBES
// =====================================================================================
//
// Times a GET against a target, classifies the outcome, turns it into a
// metric and delivers it to ingestion with bounded retry. Used by the
// continuous probe binary and the on-demand probe endpoint.
//
// =====================================================================================

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{ProbeError, ProbeOutcome, ProbeResult, ProbeTrigger};

pub use services::{IngestClient, MetricSink, ProbeClient, ProbeJob, ProbeRunner, RetryPolicy};

pub use handlers::ProbeHandlers;
pub use router::create_probe_router;
