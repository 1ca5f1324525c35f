/*! Schedule-graph states

A state abstracts all execution prefixes that have dispatched the same
set of jobs and leave the processor available within the same finish
interval. States live in an arena owned by the explorer; merging
widens the finish interval in place.
*/

use crate::index_set::IndexSet;
use crate::interval::Interval;
use crate::time::Time;

/// One node of the schedule graph.
#[derive(Debug, Clone)]
pub(crate) struct State<T: Time> {
    scheduled_jobs: IndexSet,
    finish_range: Interval<T>,
    earliest_pending_release: T,
    certain_job_release: T,
    key: u64,
    depth: usize,
}

impl<T: Time> State<T> {
    pub(crate) fn new(
        scheduled_jobs: IndexSet,
        finish_range: Interval<T>,
        earliest_pending_release: T,
        certain_job_release: T,
        key: u64,
    ) -> Self {
        let depth = scheduled_jobs.len();
        State {
            scheduled_jobs,
            finish_range,
            earliest_pending_release,
            certain_job_release,
            key,
            depth,
        }
    }

    pub(crate) fn scheduled_jobs(&self) -> &IndexSet {
        &self.scheduled_jobs
    }

    pub(crate) fn finish_range(&self) -> Interval<T> {
        self.finish_range
    }

    pub(crate) fn earliest_finish_time(&self) -> T {
        self.finish_range.from()
    }

    pub(crate) fn latest_finish_time(&self) -> T {
        self.finish_range.until()
    }

    pub(crate) fn earliest_pending_release(&self) -> T {
        self.earliest_pending_release
    }

    pub(crate) fn certain_job_release(&self) -> T {
        self.certain_job_release
    }

    /// Lookup key of this state: XOR over the keys of the scheduled
    /// jobs.
    pub(crate) fn key(&self) -> u64 {
        self.key
    }

    /// Lookup key of the successor reached by dispatching a unit with
    /// the given key (a single job or a whole reduction set).
    pub(crate) fn next_key(&self, unit_key: u64) -> u64 {
        self.key ^ unit_key
    }

    /// Number of scheduled jobs.
    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    /// Merge another finish interval into this state.
    pub(crate) fn update_finish_range(&mut self, other: Interval<T>) {
        self.finish_range.widen(other);
    }
}
