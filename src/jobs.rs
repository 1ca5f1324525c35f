/*! Jobs and job identities

A [Job] is one materialized instance of a task within the observation
window: an arrival window, an execution-cost window, a recovery-cost
window, an absolute deadline, and a priority. Under EDF the priority
*is* the absolute deadline; a numerically lower value always denotes a
higher priority.
*/

use derive_more::Display;
use thiserror::Error;

use crate::interval::Interval;
use crate::time::Time;

/// Identity of a job: the pair of task id and per-run job id.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[display(fmt = "T{}J{}", task, job)]
pub struct JobID {
    /// Monotonically assigned id, unique across the whole job set.
    pub job: u64,
    /// Id of the task this job is an instance of.
    pub task: u64,
}

impl JobID {
    pub fn new(job: u64, task: u64) -> Self {
        JobID { job, task }
    }
}

/// A single job instance.
#[derive(Debug, Clone)]
pub struct Job<T: Time> {
    arrival: Interval<T>,
    cost: Interval<T>,
    recovery_cost: Interval<T>,
    deadline: T,
    priority: T,
    recovery_priority: T,
    id: JobID,
    pe: u32,
    key: u64,
}

impl<T: Time> Job<T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: JobID,
        arrival: Interval<T>,
        cost: Interval<T>,
        recovery_cost: Interval<T>,
        deadline: T,
        priority: T,
        recovery_priority: T,
        pe: u32,
    ) -> Self {
        let key = compute_key(&id, &arrival, &cost, deadline, priority);
        Job {
            arrival,
            cost,
            recovery_cost,
            deadline,
            priority,
            recovery_priority,
            id,
            pe,
            key,
        }
    }

    /// Stable hash of the job's identity and parameters.
    pub fn key(&self) -> u64 {
        self.key
    }

    pub fn earliest_arrival(&self) -> T {
        self.arrival.from()
    }

    pub fn latest_arrival(&self) -> T {
        self.arrival.until()
    }

    pub fn arrival_window(&self) -> &Interval<T> {
        &self.arrival
    }

    /// Replace the arrival window. Used once, by the precedence
    /// preprocessor; the key is recomputed to stay consistent.
    pub fn set_arrival(&mut self, arrival: Interval<T>) {
        self.arrival = arrival;
        self.key = compute_key(&self.id, &self.arrival, &self.cost, self.deadline, self.priority);
    }

    pub fn least_cost(&self) -> T {
        self.cost.from()
    }

    pub fn maximal_cost(&self) -> T {
        self.cost.upto()
    }

    pub fn cost_window(&self) -> &Interval<T> {
        &self.cost
    }

    pub fn least_recovery_cost(&self) -> T {
        self.recovery_cost.from()
    }

    pub fn maximal_recovery_cost(&self) -> T {
        self.recovery_cost.upto()
    }

    pub fn recovery_cost_window(&self) -> &Interval<T> {
        &self.recovery_cost
    }

    pub fn deadline(&self) -> T {
        self.deadline
    }

    pub fn priority(&self) -> T {
        self.priority
    }

    pub fn recovery_priority(&self) -> T {
        self.recovery_priority
    }

    pub fn id(&self) -> JobID {
        self.id
    }

    pub fn job_id(&self) -> u64 {
        self.id.job
    }

    pub fn task_id(&self) -> u64 {
        self.id.task
    }

    pub fn pe(&self) -> u32 {
        self.pe
    }

    pub fn is(&self, id: &JobID) -> bool {
        self.id == *id
    }

    /// Does completing at `t` constitute a deadline miss beyond the
    /// time model's tolerance?
    pub fn exceeds_deadline(&self, t: T) -> bool {
        t > self.deadline && (t - self.deadline) > T::deadline_miss_tolerance()
    }

    /// Total priority order: lower numeric priority value wins, ties
    /// broken first by task id, then by job id.
    pub fn higher_priority_than(&self, other: &Job<T>) -> bool {
        match self.priority.total_order(other.priority) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Greater => false,
            std::cmp::Ordering::Equal => {
                (self.id.task, self.id.job) < (other.id.task, other.id.job)
            }
        }
    }

    /// Is this job's priority value strictly below `prio_level`?
    pub fn priority_exceeds(&self, prio_level: T) -> bool {
        self.priority.total_order(prio_level) == std::cmp::Ordering::Less
    }

    /// Is this job's priority value at most `prio_level`?
    pub fn priority_at_least(&self, prio_level: T) -> bool {
        self.priority.total_order(prio_level) != std::cmp::Ordering::Greater
    }

    /// The window in which the job must start to have any chance of
    /// finishing by its deadline (inclusive, hence one epsilon short).
    pub fn scheduling_window(&self) -> Interval<T> {
        Interval::new(self.earliest_arrival(), self.deadline - T::epsilon())
    }
}

fn compute_key<T: Time>(
    id: &JobID,
    arrival: &Interval<T>,
    cost: &Interval<T>,
    deadline: T,
    priority: T,
) -> u64 {
    let mut key = arrival.from().key_bits();
    key = (key << 4) ^ id.task;
    key = (key << 4) ^ arrival.until().key_bits();
    key = (key << 4) ^ cost.from().key_bits();
    key = (key << 4) ^ deadline.key_bits();
    key = (key << 4) ^ cost.upto().key_bits();
    key = (key << 4) ^ id.job;
    key = (key << 4) ^ priority.key_bits();
    key
}

/// Error raised when a precedence constraint or a lookup names a job
/// that is not part of the job set.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("invalid job reference: {0}")]
pub struct InvalidJobReference(pub JobID);

/// Find the job with the given id.
pub fn lookup<'a, T: Time>(
    jobs: &'a [Job<T>],
    id: &JobID,
) -> Result<&'a Job<T>, InvalidJobReference> {
    jobs.iter().find(|j| j.is(id)).ok_or(InvalidJobReference(*id))
}

/// Is a job with the given id part of the job set?
pub fn contains_job_with_id<T: Time>(jobs: &[Job<T>], id: &JobID) -> bool {
    jobs.iter().any(|j| j.is(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Discrete;

    fn job(task: u64, jid: u64, arr: (i64, i64), cost: (i64, i64), dl: i64) -> Job<Discrete> {
        Job::new(
            JobID::new(jid, task),
            Interval::new(arr.0, arr.1),
            Interval::new(cost.0, cost.1),
            Interval::new(cost.0, cost.1),
            dl,
            dl,
            dl,
            0,
        )
    }

    #[test]
    fn priority_tie_breaking() {
        let a = job(1, 0, (0, 0), (1, 2), 10);
        let b = job(2, 1, (0, 0), (1, 2), 10);
        let c = job(1, 2, (0, 0), (1, 2), 5);
        // same priority: lower task id wins
        assert!(a.higher_priority_than(&b));
        assert!(!b.higher_priority_than(&a));
        // numerically lower priority value always wins
        assert!(c.higher_priority_than(&a));
        assert!(c.higher_priority_than(&b));
        // same task and priority: lower job id wins
        let d = job(1, 3, (5, 5), (1, 2), 10);
        assert!(a.higher_priority_than(&d));
    }

    #[test]
    fn deadline_miss_respects_tolerance() {
        let j = job(1, 0, (0, 0), (1, 2), 10);
        assert!(!j.exceeds_deadline(10));
        assert!(j.exceeds_deadline(11));
        let k: Job<f64> = Job::new(
            JobID::new(0, 1),
            Interval::new(0.0, 0.0),
            Interval::new(1.0, 2.0),
            Interval::new(1.0, 2.0),
            10.0,
            10.0,
            10.0,
            0,
        );
        // within the dense-time tolerance
        assert!(!k.exceeds_deadline(10.0000001));
        assert!(k.exceeds_deadline(10.1));
    }

    #[test]
    fn key_depends_on_parameters() {
        let a = job(1, 0, (0, 0), (1, 2), 10);
        let b = job(1, 1, (0, 0), (1, 2), 10);
        let c = job(1, 0, (0, 3), (1, 2), 10);
        assert_ne!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
    }

    #[test]
    fn lookup_reports_missing_jobs() {
        let jobs = vec![job(1, 0, (0, 0), (1, 2), 10)];
        assert!(lookup(&jobs, &JobID::new(0, 1)).is_ok());
        let missing = JobID::new(7, 3);
        assert_eq!(lookup(&jobs, &missing).unwrap_err(), InvalidJobReference(missing));
        assert!(!contains_job_with_id(&jobs, &missing));
    }
}
