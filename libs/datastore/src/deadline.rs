//! Deadline-bounded query execution
//!
//! The host execution environment enforces a hard wall-clock limit per
//! invocation. Racing a read against the caller's remaining runway turns a
//! hard kill mid-query into a graceful degraded response: when the timer
//! wins, the losing operation is dropped (cancelling its in-flight cursor
//! and releasing the server-side handle) and a caller-supplied fallback
//! value is returned instead of an error.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::error::StoreResult;

/// Time budget for one bounded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    /// Maximum time the operation itself may take
    pub budget: Duration,
    /// Wall-clock time left before the host kills the invocation
    pub remaining: Duration,
    /// Runway reserved for building the response after a timeout
    pub safety_margin: Duration,
}

impl Deadline {
    /// True when the caller has no runway left to start the operation.
    pub fn exhausted(&self) -> bool {
        self.remaining <= self.safety_margin
    }

    /// Length of the race timer: the smaller of the budget and the runway
    /// that remains after the safety margin.
    pub fn window(&self) -> Duration {
        self.budget.min(self.remaining.saturating_sub(self.safety_margin))
    }
}

/// A deadline together with the value returned when it fires.
#[derive(Debug, Clone)]
pub struct Fallback<T> {
    pub deadline: Deadline,
    pub value: T,
}

/// Run `op`, optionally racing it against a deadline.
///
/// Without a bound the operation runs to completion and its result or
/// error is returned untouched. With a bound:
///
/// - if the runway is already exhausted, `op` is dropped unpolled (the
///   operation never starts) and the fallback is returned immediately;
/// - otherwise `op` races a timer of [`Deadline::window`]; if the timer
///   fires first, `op` is dropped (cancelling its cursor) and the fallback
///   is returned.
///
/// A timeout with a configured fallback is not an error.
pub async fn run_bounded<T, F>(op: F, bound: Option<Fallback<T>>) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    let Some(Fallback { deadline, value }) = bound else {
        return op.await;
    };

    if deadline.exhausted() {
        warn!(
            remaining_ms = deadline.remaining.as_millis() as u64,
            margin_ms = deadline.safety_margin.as_millis() as u64,
            "runway exhausted before dispatch, returning fallback"
        );
        return Ok(value);
    }

    let window = deadline.window();
    tokio::pin!(op);
    tokio::select! {
        result = &mut op => result,
        _ = sleep(window) => {
            warn!(window_ms = window.as_millis() as u64, "query exceeded its deadline, returning fallback");
            Ok(value)
        }
    }
}
