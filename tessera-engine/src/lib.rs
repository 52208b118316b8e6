//! tessera-engine: the segmentation orchestrator
//!
//! [`Orchestrator::process`] takes a request naming one to four algorithms,
//! serves what it can from the result cache, runs the rest under a shared
//! concurrency cap and returns the successes in submission order.

pub mod batch;
pub mod events;
pub mod orchestrator;
pub mod stats;

pub use batch::{BatchItemError, BatchResponse};
pub use events::{ChannelSink, EventSink, NoopSink, SegmentationEvent};
pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use stats::OrchestratorStats;
