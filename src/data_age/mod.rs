/*! End-to-end data-age analysis over task chains

Given the per-job start- and finish-time tables of a schedulability
analysis and a task chain `t1 -> t2 -> ... -> tk`, this module bounds
the *data age*: the delay between the arrival of an input at the chain
source and the completion of the sink job that (transitively) consumed
it.

For every sink-job instance inside the observation window, the
propagator walks the chain backwards and enumerates all producer
instances whose output the consumer may have read. Which producer
instance is visible depends on the platform: on the same processing
element under non-preemptive scheduling a producer's output is visible
once the producer has *started* before the consumer starts; across
processing elements (or with preemption) it must have *finished*.
*/

use std::collections::HashMap;
use std::time::{Duration, Instant};

use log::debug;

use crate::interval::Interval;
use crate::jobs::{Job, JobID};
use crate::task::Task;
use crate::time::Time;

/// Per-job interval tables, keyed by job identity.
pub type ResponseTimes<T> = HashMap<JobID, Interval<T>>;

/// Tuning knobs of the propagation.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataAgeOptions {
    /// Assume preemptive scheduling when deciding producer
    /// visibility.
    pub preemptive: bool,
    /// Keep only the first and last producer instance per step; a
    /// monotone over-approximation that preserves the extremes.
    pub pruning: bool,
}

/// Result of one data-age analysis over a single chain.
#[derive(Debug, Clone)]
pub struct DataAgeAnalysis<T: Time> {
    data_age: Option<Interval<T>>,
    elapsed: Duration,
}

impl<T: Time> DataAgeAnalysis<T> {
    /// Bound the data age of `chain` given the response-time tables of
    /// a completed schedulability analysis. `jobs` is the full job
    /// vector of the run, with each task's instances in time order.
    pub fn run(
        jobs: &[Job<T>],
        sta: &ResponseTimes<T>,
        rta: &ResponseTimes<T>,
        chain: &[&Task<T>],
        options: DataAgeOptions,
    ) -> Self {
        let started = Instant::now();
        let mut propagator = Propagator {
            jobs,
            sta,
            rta,
            chain,
            options,
            data_age: None,
        };
        propagator.calculate_latencies();
        DataAgeAnalysis {
            data_age: propagator.data_age,
            elapsed: started.elapsed(),
        }
    }

    /// The widened `[min, max]` end-to-end latency, or `None` when no
    /// temporally consistent producer/consumer pairing exists.
    pub fn data_age(&self) -> Option<Interval<T>> {
        self.data_age
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

struct Propagator<'a, T: Time> {
    jobs: &'a [Job<T>],
    sta: &'a ResponseTimes<T>,
    rta: &'a ResponseTimes<T>,
    chain: &'a [&'a Task<T>],
    options: DataAgeOptions,
    data_age: Option<Interval<T>>,
}

impl<'a, T: Time> Propagator<'a, T> {
    fn calculate_latencies(&mut self) {
        let Some(sink) = self.chain.last() else {
            return;
        };
        for (index, job) in self.jobs.iter().enumerate() {
            if job.task_id() != sink.task_id() {
                continue;
            }
            if self.chain.len() == 1 {
                // degenerate chain: the latency of a job is simply its
                // response time relative to its own arrival
                let Some(finish) = self.rta.get(&job.id()) else {
                    continue;
                };
                self.update_data_age(*finish - job.earliest_arrival());
            } else {
                let Some(start) = self.sta.get(&job.id()) else {
                    continue;
                };
                let Some(finish) = self.rta.get(&job.id()) else {
                    continue;
                };
                let origins =
                    self.find_origin_jobs(vec![index], start.until(), self.chain.len());
                for t in origins {
                    self.update_data_age(*finish - t);
                }
            }
        }
    }

    /// Walk one level down the chain: for every tracked consumer
    /// instance, locate the producer instances it may have read from.
    /// At the final level the producers' earliest arrivals are the
    /// origin timestamps.
    fn find_origin_jobs(&self, origin_jobs: Vec<usize>, lst: T, level: usize) -> Vec<T> {
        let mut origins: Vec<T> = Vec::new();
        let mut tracked: Vec<usize> = Vec::new();

        for &consumer in &origin_jobs {
            let Some(producer) = self.producer_of(self.jobs[consumer].task_id(), level) else {
                continue;
            };
            let Some(start) = self.sta.get(&self.jobs[consumer].id()) else {
                continue;
            };

            let first = self.first_producer_index(*start, &self.jobs[consumer], producer);
            let last = self.last_producer_index(*start, producer, first);

            if let Some(f) = first {
                tracked.push(f);
                origins.push(self.jobs[f].earliest_arrival());
            }
            if let Some(l) = last {
                let from = first.map(|f| f + 1).unwrap_or(0);
                for i in from..=l {
                    if self.jobs[i].task_id() != producer.task_id() {
                        continue;
                    }
                    let Some(producer_start) = self.sta.get(&self.jobs[i].id()) else {
                        continue;
                    };
                    if producer_start.from() < lst {
                        tracked.push(i);
                        origins.push(self.jobs[i].earliest_arrival());
                    }
                }
            }
        }

        if level == 2 {
            if origins.len() > 2 && self.options.pruning {
                origins.drain(1..origins.len() - 1);
            }
            origins
        } else {
            if tracked.len() > 2 && self.options.pruning {
                tracked.drain(1..tracked.len() - 1);
            }
            self.find_origin_jobs(tracked, lst, level - 1)
        }
    }

    /// The latest producer instance whose output is certainly visible
    /// to a consumer starting within `start`.
    fn first_producer_index(
        &self,
        start: Interval<T>,
        consumer: &Job<T>,
        producer: &Task<T>,
    ) -> Option<usize> {
        let same_pe_nonpreemptive =
            consumer.pe() == producer.pe() && !self.options.preemptive;
        for i in (0..self.jobs.len()).rev() {
            if self.jobs[i].task_id() != producer.task_id() {
                continue;
            }
            let table = if same_pe_nonpreemptive { self.sta } else { self.rta };
            let Some(bound) = table.get(&self.jobs[i].id()) else {
                continue;
            };
            if bound.until() <= start.from() {
                return Some(i);
            }
        }
        None
    }

    /// The latest producer instance that may still publish before the
    /// consumer has certainly started. Monotone scan with early
    /// termination once a producer certainly finishes too late.
    fn last_producer_index(
        &self,
        start: Interval<T>,
        producer: &Task<T>,
        first: Option<usize>,
    ) -> Option<usize> {
        let mut tracked = None;
        let from = first.map(|f| f + 1).unwrap_or(0);
        for i in from..self.jobs.len() {
            if self.jobs[i].task_id() != producer.task_id() {
                continue;
            }
            let Some(finish) = self.rta.get(&self.jobs[i].id()) else {
                continue;
            };
            if finish.from() <= start.until() {
                tracked = Some(i);
            } else {
                return tracked;
            }
        }
        tracked
    }

    /// The direct producer of `task_id` within the first `level`
    /// elements of the chain.
    fn producer_of(&self, task_id: u64, level: usize) -> Option<&'a Task<T>> {
        let prefix = &self.chain[..level.min(self.chain.len())];
        let position = prefix
            .iter()
            .rposition(|t| t.task_id() == task_id)
            .filter(|&p| p > 0)?;
        Some(prefix[position - 1])
    }

    fn update_data_age(&mut self, latency: Interval<T>) {
        debug!("chain latency contribution: {latency}");
        match &mut self.data_age {
            Some(age) => age.widen(latency),
            slot => *slot = Some(latency),
        }
    }
}

#[cfg(test)]
mod tests;
