/*! Selection criteria for growing reduction sets

When a pending job may interfere with a reduction set, one of the
interfering jobs has to be absorbed before the closure check can be
repeated. Which one is picked does not affect soundness, only how fast
the set closes, so the choice is a small pluggable policy.
*/

use auto_impl::auto_impl;

use crate::jobs::Job;
use crate::time::Time;

/// Policy choosing which interfering job to absorb next.
///
/// `candidates` is a non-empty list of indices into `jobs`; the
/// returned value is one of them. Implementations must be total and
/// deterministic.
#[auto_impl(&, Box)]
pub trait PorCriterion<T: Time> {
    fn select_job(&self, candidates: &[usize], jobs: &[Job<T>]) -> usize;
}

/// Pick the candidate with the smallest earliest arrival; ties are
/// broken by priority, then by task id, then by job id.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReleaseOrder;

impl<T: Time> PorCriterion<T> for ReleaseOrder {
    fn select_job(&self, candidates: &[usize], jobs: &[Job<T>]) -> usize {
        let mut best = candidates[0];
        for &c in &candidates[1..] {
            let (a, b) = (&jobs[c], &jobs[best]);
            let earlier = match a.earliest_arrival().total_order(b.earliest_arrival()) {
                std::cmp::Ordering::Less => true,
                std::cmp::Ordering::Greater => false,
                std::cmp::Ordering::Equal => a.higher_priority_than(b),
            };
            if earlier {
                best = c;
            }
        }
        best
    }
}

/// Pick the highest-priority candidate (smallest numeric priority
/// value, with the usual task-id/job-id tie-breaking).
#[derive(Debug, Default, Clone, Copy)]
pub struct PriorityOrder;

impl<T: Time> PorCriterion<T> for PriorityOrder {
    fn select_job(&self, candidates: &[usize], jobs: &[Job<T>]) -> usize {
        let mut best = candidates[0];
        for &c in &candidates[1..] {
            if jobs[c].higher_priority_than(&jobs[best]) {
                best = c;
            }
        }
        best
    }
}
