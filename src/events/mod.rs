//! Lifecycle event bus and telemetry span tree.

pub mod bus;
pub mod telemetry;

pub use bus::{EngineEvent, EventBus, Subscription};
pub use telemetry::{Span, SpanData, SpanStatus, TelemetryExporter, TelemetrySession};
