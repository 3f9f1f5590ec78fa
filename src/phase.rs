//! Resilient phase: run independent sub-queries concurrently and keep going
//! when some of them fail.
//!
//! Every query is awaited to completion. A failed (or panicking) query
//! leaves the sentinel in its slot, so the phase always yields exactly as
//! many slots as it was given queries. One aggregate warning is reported
//! when anything failed.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use futures::future::join_all;

use crate::error::Error;
use crate::jobs::JobReporter;

/// Slot value for a text sub-query whose data could not be fetched.
pub const MISSING_DATA_SENTINEL: &str = "[DATA UNAVAILABLE] This query failed and its data is missing. \
     Do not invent content for it; note the gap instead.";

/// A sub-query that did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseFailure {
    pub index: usize,
    pub reason: String,
}

/// Settled phase: one slot per query, in query order.
#[derive(Debug, Clone)]
pub struct PhaseOutcome<T> {
    pub slots: Vec<T>,
    pub failures: Vec<PhaseFailure>,
}

impl<T> PhaseOutcome<T> {
    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    pub fn succeeded_count(&self) -> usize {
        self.slots.len() - self.failures.len()
    }

    pub fn is_slot_missing(&self, index: usize) -> bool {
        self.failures.iter().any(|f| f.index == index)
    }
}

/// Run `queries` concurrently, substituting `sentinel` for each failure.
///
/// Never returns an error. `phase` names the queries in the warning, e.g.
/// "research" gives "Warning: 1 of 3 research queries failed ...".
pub async fn run_resilient_phase<T, Fut>(
    reporter: &JobReporter,
    phase: &str,
    queries: Vec<Fut>,
    sentinel: T,
) -> PhaseOutcome<T>
where
    T: Clone,
    Fut: Future<Output = Result<T, Error>>,
{
    let total = queries.len();
    let settled = join_all(
        queries
            .into_iter()
            .map(|query| AssertUnwindSafe(query).catch_unwind()),
    )
    .await;

    let mut slots = Vec::with_capacity(total);
    let mut failures = Vec::new();
    for (index, result) in settled.into_iter().enumerate() {
        match result {
            Ok(Ok(value)) => slots.push(value),
            Ok(Err(e)) => {
                tracing::debug!(job_id = %reporter.job_id(), index, error = %e, "Phase query failed");
                failures.push(PhaseFailure {
                    index,
                    reason: e.to_string(),
                });
                slots.push(sentinel.clone());
            }
            Err(_) => {
                tracing::debug!(job_id = %reporter.job_id(), index, "Phase query panicked");
                failures.push(PhaseFailure {
                    index,
                    reason: "query panicked".to_string(),
                });
                slots.push(sentinel.clone());
            }
        }
    }

    if !failures.is_empty() {
        reporter
            .warn(format!(
                "Warning: {} of {} {} queries failed; continuing with partial results",
                failures.len(),
                total,
                phase
            ))
            .await;
    }

    PhaseOutcome { slots, failures }
}
