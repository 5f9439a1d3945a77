//! Wall-clock limits and cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Tracks elapsed solve time against an optional limit, and polls a
/// cooperative cancellation flag at safe points.
#[derive(Debug, Clone)]
pub struct SolveTimer {
    start: Instant,
    time_limit: Option<f64>,
    cancel: Option<Arc<AtomicBool>>,
}

impl SolveTimer {
    /// Start the timer with an optional limit in seconds.
    pub fn start(time_limit: Option<f64>, cancel: Option<Arc<AtomicBool>>) -> Self {
        Self {
            start: Instant::now(),
            time_limit,
            cancel,
        }
    }

    /// Elapsed seconds since the solve began.
    pub fn elapsed(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// True once the time limit has been exceeded.
    pub fn limit_exceeded(&self) -> bool {
        match self.time_limit {
            Some(limit) => self.elapsed() >= limit,
            None => false,
        }
    }

    /// True once cancellation has been requested.
    pub fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }
}
