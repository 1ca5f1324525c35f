/*! Job-level precedence constraints

Precedence constraints are ordered pairs of [JobID]s. Before
exploration they are turned into per-job predecessor index sets, the
job set is topologically sorted, and every job's arrival window is
tightened against its transitive ancestors: a job cannot be released
before any of its ancestors.
*/

use std::collections::{HashMap, VecDeque};

use thiserror::Error;

use crate::index_set::IndexSet;
use crate::interval::Interval;
use crate::jobs::{InvalidJobReference, Job, JobID};
use crate::time::Time;

/// An ordered precedence pair: the first job must complete before the
/// second may start.
pub type PrecedenceConstraint = (JobID, JobID);

/// The predecessor indices of one job.
pub type JobPrecedenceSet = Vec<usize>;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PrecedenceError {
    /// The constraints contain a cycle, so no dispatch order exists.
    #[error("cyclic precedence constraints")]
    CyclicPrecedence,
    #[error(transparent)]
    InvalidJobReference(#[from] InvalidJobReference),
}

/// Resolve `(JobID, JobID)` pairs into per-job predecessor index sets
/// relative to the given job vector.
pub fn build_precedence_sets<T: Time>(
    constraints: &[PrecedenceConstraint],
    jobs: &[Job<T>],
) -> Result<Vec<JobPrecedenceSet>, InvalidJobReference> {
    let positions: HashMap<JobID, usize> =
        jobs.iter().enumerate().map(|(i, j)| (j.id(), i)).collect();
    let mut sets = vec![Vec::new(); jobs.len()];
    for (from, to) in constraints {
        let from_idx = *positions.get(from).ok_or(InvalidJobReference(*from))?;
        let to_idx = *positions.get(to).ok_or(InvalidJobReference(*to))?;
        sets[to_idx].push(from_idx);
    }
    Ok(sets)
}

/// Tighten every job's arrival window against its transitive
/// ancestors: `[max(eft, max anc.eft), max(lft, max anc.lft)]`.
///
/// The result is a widening relative to the raw release: a job is
/// never assumed to arrive earlier than declared.
pub fn propagate_arrivals<T: Time>(
    precedence_sets: &[JobPrecedenceSet],
    mut jobs: Vec<Job<T>>,
) -> Vec<Job<T>> {
    for idx in 0..jobs.len() {
        let ancestors = transitive_ancestors(precedence_sets, idx);
        if ancestors.is_empty() {
            continue;
        }
        let mut eft = jobs[idx].earliest_arrival();
        let mut lft = jobs[idx].latest_arrival();
        for anc in ancestors.iter() {
            eft = eft.max_time(jobs[anc].earliest_arrival());
            lft = lft.max_time(jobs[anc].latest_arrival());
        }
        jobs[idx].set_arrival(Interval::new(eft, lft));
    }
    jobs
}

/// BFS up the predecessor graph.
fn transitive_ancestors(precedence_sets: &[JobPrecedenceSet], job: usize) -> IndexSet {
    let mut seen = IndexSet::new();
    let mut queue: VecDeque<usize> = precedence_sets[job].iter().copied().collect();
    while let Some(p) = queue.pop_front() {
        if seen.contains(p) {
            continue;
        }
        seen.add(p);
        queue.extend(precedence_sets[p].iter().copied());
    }
    seen
}

/// Kahn-style topological sort: roots are emitted first in input
/// order, then any job whose predecessors have all been emitted.
///
/// Fails with [PrecedenceError::CyclicPrecedence] if a residual set of
/// jobs remains whose predecessors never complete.
pub fn topological_sort<T: Time>(
    precedence_sets: &[JobPrecedenceSet],
    jobs: Vec<Job<T>>,
) -> Result<Vec<Job<T>>, PrecedenceError> {
    let mut emitted = IndexSet::with_capacity(jobs.len());
    let mut sorted: Vec<Job<T>> = Vec::with_capacity(jobs.len());
    let mut queue: VecDeque<usize> = VecDeque::new();

    for idx in 0..jobs.len() {
        if precedence_sets[idx].is_empty() {
            emitted.add(idx);
            sorted.push(jobs[idx].clone());
        } else {
            queue.push_back(idx);
        }
    }

    let mut since_progress = 0;
    while let Some(idx) = queue.pop_front() {
        if emitted.contains_all(&precedence_sets[idx]) {
            emitted.add(idx);
            sorted.push(jobs[idx].clone());
            since_progress = 0;
        } else {
            queue.push_back(idx);
            since_progress += 1;
            if since_progress > queue.len() {
                return Err(PrecedenceError::CyclicPrecedence);
            }
        }
    }

    Ok(sorted)
}

/// Full preprocessing pipeline for a job set about to be explored:
/// resolve constraints, propagate arrival times through ancestors, and
/// topologically sort the jobs.
pub fn preprocess_jobs<T: Time>(
    constraints: &[PrecedenceConstraint],
    jobs: Vec<Job<T>>,
) -> Result<Vec<Job<T>>, PrecedenceError> {
    let sets = build_precedence_sets(constraints, &jobs)?;
    topological_sort(&sets, propagate_arrivals(&sets, jobs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(task: u64, jid: u64, arr: (i64, i64)) -> Job<i64> {
        Job::new(
            JobID::new(jid, task),
            Interval::new(arr.0, arr.1),
            Interval::new(1, 2),
            Interval::new(1, 2),
            100,
            100,
            100,
            0,
        )
    }

    fn id(task: u64, jid: u64) -> JobID {
        JobID::new(jid, task)
    }

    #[test]
    fn sort_emits_roots_first_in_input_order() {
        // input order: C (depends on A and B), A, B
        let jobs = vec![job(3, 2, (0, 0)), job(1, 0, (0, 0)), job(2, 1, (0, 0))];
        let constraints = vec![(id(1, 0), id(3, 2)), (id(2, 1), id(3, 2))];
        let sets = build_precedence_sets(&constraints, &jobs).unwrap();
        let sorted = topological_sort(&sets, jobs).unwrap();
        let order: Vec<u64> = sorted.iter().map(|j| j.task_id()).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn sort_detects_cycles() {
        let jobs = vec![job(1, 0, (0, 0)), job(2, 1, (0, 0))];
        let constraints = vec![(id(1, 0), id(2, 1)), (id(2, 1), id(1, 0))];
        let sets = build_precedence_sets(&constraints, &jobs).unwrap();
        assert_eq!(
            topological_sort(&sets, jobs).unwrap_err(),
            PrecedenceError::CyclicPrecedence
        );
    }

    #[test]
    fn unknown_job_reference_is_reported() {
        let jobs = vec![job(1, 0, (0, 0))];
        let constraints = vec![(id(1, 0), id(9, 9))];
        assert_eq!(
            build_precedence_sets(&constraints, &jobs).unwrap_err(),
            InvalidJobReference(id(9, 9))
        );
    }

    #[test]
    fn arrival_propagation_tightens_against_ancestors() {
        // A [0,4] -> B [1,2] -> C [0,3]
        let jobs = vec![job(1, 0, (0, 4)), job(2, 1, (1, 2)), job(3, 2, (0, 3))];
        let constraints = vec![(id(1, 0), id(2, 1)), (id(2, 1), id(3, 2))];
        let sets = build_precedence_sets(&constraints, &jobs).unwrap();
        let out = propagate_arrivals(&sets, jobs);
        // B: [max(1,0), max(2,4)] = [1,4]
        assert_eq!(*out[1].arrival_window(), Interval::new(1, 4));
        // C sees both A and B (transitively): [max(0,0,1), max(3,4,2)]
        assert_eq!(*out[2].arrival_window(), Interval::new(1, 4));
        // roots stay untouched
        assert_eq!(*out[0].arrival_window(), Interval::new(0, 4));
    }

    #[test]
    fn preprocessing_is_idempotent_without_constraints() {
        let jobs = vec![job(1, 0, (0, 1)), job(2, 1, (2, 3))];
        let out = preprocess_jobs(&[], jobs.clone()).unwrap();
        assert_eq!(out.len(), 2);
        for (a, b) in out.iter().zip(jobs.iter()) {
            assert_eq!(a.id(), b.id());
            assert_eq!(a.arrival_window(), b.arrival_window());
        }
    }
}
