//! Polypus trace viewer core
//!
//! Orders the sent and received halves of a distributed-system message trace
//! as they stream in, keeps the chart and graph view models consistent with
//! that order, and drives live, scrubbed and replayed playback.

pub mod connectivity;
pub mod dataflow;
pub mod export;
pub mod playback;
pub mod session;
pub mod trace;
pub mod views;

pub use session::{MessageCompleted, MessageInserted, TraceEvent, VizSession};
