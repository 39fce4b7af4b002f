// =====================================================================================
// STREAM CELL - LIVE EVENT STREAMING
// =====================================================================================
//
// Server side: fans bus events out to SSE observers with periodic pings.
// Client side: consumes the stream, reconnecting with backoff and falling
// back to polling after repeated failures.
//
// =====================================================================================

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{
    ClientSnapshot, ConnectionState, ReconnectConfig, SseFrame, StreamError, StreamEvent,
    ALERT_EVENT, METRIC_EVENT, PING_EVENT,
};

pub use services::{
    ReconnectMachine, SseParser, SseTransport, StreamCallbacks, StreamClient, StreamHub,
    StreamTransport,
};

pub use router::create_stream_router;
