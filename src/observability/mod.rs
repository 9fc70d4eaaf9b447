//! Observability for shardstore
//!
//! - Structured logging (JSON lines) through an injected sink
//! - Typed events
//! - Per-shard counters
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on execution
//! 3. No background threads
//! 4. Deterministic output
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use shardstore::observability::{Event, Logger, MemorySink};
//!
//! let sink = Arc::new(MemorySink::new());
//! let logger = Logger::new(sink.clone());
//! logger.warn(Event::CommitFailed, &[("error", "disk full")]);
//! assert!(sink.contains(Event::CommitFailed));
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{format_line, LogRecord, LogSink, Logger, MemorySink, NullSink, Severity, StderrSink};
pub use metrics::{MetricsSnapshot, StoreMetrics};
