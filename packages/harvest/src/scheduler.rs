//! Bounded fan-out over independent asynchronous units of work.
//!
//! Units are started lazily in submission order, never more than
//! `max_concurrency` at once. A unit's error is logged and returned with its
//! outcome; it never cancels siblings. [`Scheduler::run`] resolves only once
//! every unit has settled.

use std::fmt::Display;
use std::future::Future;

use futures::stream::{self, StreamExt as _};

/// The settled result of one unit, tagged with its submission index.
#[derive(Debug)]
pub struct UnitOutcome<T, E> {
    pub index: usize,
    pub result: Result<T, E>,
}

/// Runs units with a fixed upper bound on how many are in flight.
#[derive(Debug, Clone)]
pub struct Scheduler {
    label: &'static str,
    max_concurrency: usize,
}

impl Scheduler {
    /// Creates a scheduler. A bound of zero is treated as one.
    #[must_use]
    pub fn new(label: &'static str, max_concurrency: usize) -> Self {
        Self {
            label,
            max_concurrency: max_concurrency.max(1),
        }
    }

    #[must_use]
    pub const fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Drives every unit to completion and returns their outcomes in
    /// submission order, regardless of completion order.
    pub async fn run<I, F, T, E>(&self, units: I) -> Vec<UnitOutcome<T, E>>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        let label = self.label;

        let mut outcomes: Vec<UnitOutcome<T, E>> =
            stream::iter(units.into_iter().enumerate().map(|(index, unit)| async move {
                let result = unit.await;
                if let Err(e) = &result {
                    log::error!("{label} unit {index} failed: {e}");
                }
                UnitOutcome { index, result }
            }))
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        outcomes.sort_by_key(|outcome| outcome.index);
        outcomes
    }
}

/// Splits outcomes into successes (submission order) and failures.
#[must_use]
pub fn split<T, E>(outcomes: Vec<UnitOutcome<T, E>>) -> (Vec<T>, Vec<(usize, E)>) {
    let mut successes = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();

    for UnitOutcome { index, result } in outcomes {
        match result {
            Ok(value) => successes.push(value),
            Err(e) => failures.push((index, e)),
        }
    }

    (successes, failures)
}
