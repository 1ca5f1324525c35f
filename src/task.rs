/*! Periodic tasks

A [Task] is the static description from which jobs are materialized:
best- and worst-case execution times, a recovery-cost window, a period,
a release-jitter window, a relative deadline, and the processing element
the task is mapped to. Tasks are immutable after construction; the
graph structure connecting them lives in [crate::dag].
*/

use crate::interval::Interval;
use crate::time::Time;

/// An immutable periodic task.
#[derive(Debug, Clone)]
pub struct Task<T: Time> {
    task_id: u64,
    bcet: T,
    wcet: T,
    rec_cost_min: T,
    rec_cost_max: T,
    period: T,
    jitter: Interval<T>,
    deadline: T,
    pe: u32,
}

impl<T: Time> Task<T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        task_id: u64,
        bcet: T,
        wcet: T,
        rec_cost_min: T,
        rec_cost_max: T,
        period: T,
        jitter: Interval<T>,
        deadline: T,
        pe: u32,
    ) -> Self {
        debug_assert!(period > T::zero());
        Task {
            task_id,
            bcet,
            wcet,
            rec_cost_min,
            rec_cost_max,
            period,
            jitter,
            deadline,
            pe,
        }
    }

    /// Convenience constructor for tasks without recovery cost and
    /// jitter: the recovery-cost window defaults to `[bcet, wcet]`.
    pub fn simple(task_id: u64, bcet: T, wcet: T, period: T, deadline: T, pe: u32) -> Self {
        Task::new(
            task_id,
            bcet,
            wcet,
            bcet,
            wcet,
            period,
            Interval::point(T::zero()),
            deadline,
            pe,
        )
    }

    pub fn task_id(&self) -> u64 {
        self.task_id
    }

    /// Derived display name, e.g. `T3`.
    pub fn name(&self) -> String {
        format!("T{}", self.task_id)
    }

    pub fn bcet(&self) -> T {
        self.bcet
    }

    pub fn wcet(&self) -> T {
        self.wcet
    }

    pub fn rec_cost_min(&self) -> T {
        self.rec_cost_min
    }

    pub fn rec_cost_max(&self) -> T {
        self.rec_cost_max
    }

    pub fn recovery_cost_window(&self) -> Interval<T> {
        Interval::new(self.rec_cost_min, self.rec_cost_max)
    }

    pub fn period(&self) -> T {
        self.period
    }

    pub fn deadline(&self) -> T {
        self.deadline
    }

    pub fn pe(&self) -> u32 {
        self.pe
    }

    pub fn min_jitter(&self) -> T {
        self.jitter.from()
    }

    pub fn max_jitter(&self) -> T {
        self.jitter.until()
    }

    pub fn jitter_window(&self) -> &Interval<T> {
        &self.jitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_defaults() {
        let t: Task<i64> = Task::simple(3, 1, 2, 10, 10, 0);
        assert_eq!(t.name(), "T3");
        assert_eq!(t.recovery_cost_window(), Interval::new(1, 2));
        assert_eq!(t.min_jitter(), 0);
        assert_eq!(t.max_jitter(), 0);
    }
}
