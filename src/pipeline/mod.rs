//! The build pipeline: planner, resolver, dependency tracker, transform and
//! formatter executors, composed by the orchestrator.

pub mod formatter;
pub mod orchestrator;
pub mod planner;
pub mod resolver;
pub mod tracker;
pub mod transform;

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Span names forming the per-run telemetry tree.
pub const SPAN_RUN: &str = "dtifx.pipeline.run";
pub const SPAN_PLAN: &str = "dtifx.pipeline.plan";
pub const SPAN_RESOLVE: &str = "dtifx.pipeline.resolve";
pub const SPAN_TRANSFORM: &str = "dtifx.pipeline.transform";
pub const SPAN_FORMAT: &str = "dtifx.pipeline.format";
/// Outer span wrapping each watch-mode iteration.
pub const SPAN_WATCH_ITERATION: &str = "dtifx.watch.iteration";

/// Cooperative cancellation token threaded into every stage.
///
/// Stages check the token at their boundaries; on cancellation the current
/// task runs to a safe point and the pipeline returns
/// [`crate::errors::DtifxError::Cancelled`].
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::CancellationToken;

    /// Clones observe cancellation from any handle.
    #[test]
    fn cancellation_is_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
