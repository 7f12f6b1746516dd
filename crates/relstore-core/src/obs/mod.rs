//! Observability: metrics events emitted by sessions and an in-memory sink.
//!
//! Engine code only ever talks to [`sink::MetricsSink`]; nothing under `db`
//! reaches into [`metrics`] directly.

pub mod metrics;
pub mod sink;

pub use metrics::{EntityCounters, EventOps, EventState, MetricsState};
pub use sink::{ExecKind, MetricsEvent, MetricsSink};
