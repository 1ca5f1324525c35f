/*! Reachability-based schedulability analysis

This module explores the space of possible non-preemptive schedules of
a job set by symbolic simulation of job dispatch. States abstract sets
of execution prefixes; states that dispatched the same jobs and whose
processor-availability intervals overlap are merged. When several
eligible jobs commute, partial-order reduction aggregates them into a
single [ReductionSet] edge instead of enumerating every interleaving.

The analysis computes, per job, best- and worst-case start and finish
times, and decides schedulability by checking every dispatch against
the job's deadline.
*/

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::time::Instant;

use itertools::Itertools;
use log::{debug, trace, warn};
use thiserror::Error;

use crate::index_set::IndexSet;
use crate::interval::Interval;
use crate::jobs::{InvalidJobReference, Job, JobID};
use crate::precedence::{self, JobPrecedenceSet, PrecedenceConstraint, PrecedenceError};
use crate::time::Time;

mod criterion;
mod reduction;
mod state;

pub use criterion::{PorCriterion, PriorityOrder, ReleaseOrder};
pub use reduction::{ReductionSet, ReductionSetStatistics};

use state::State;

/// A uniprocessor scheduling problem: the jobs of one processing
/// element plus job-level precedence constraints.
#[derive(Debug, Clone)]
pub struct Problem<T: Time> {
    pub jobs: Vec<Job<T>>,
    pub precedence: Vec<PrecedenceConstraint>,
    pub num_processors: usize,
}

impl<T: Time> Problem<T> {
    pub fn new(jobs: Vec<Job<T>>) -> Self {
        Problem {
            jobs,
            precedence: Vec::new(),
            num_processors: 1,
        }
    }

    pub fn with_precedence(jobs: Vec<Job<T>>, precedence: Vec<PrecedenceConstraint>) -> Self {
        Problem {
            jobs,
            precedence,
            num_processors: 1,
        }
    }
}

/// Knobs controlling one exploration.
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// Wall-clock budget in seconds; zero means no limit.
    pub timeout: f64,
    /// Abort once a state with this many scheduled jobs is reached;
    /// zero means no limit.
    pub max_depth: usize,
    /// Initial capacity of the state-bucket map.
    pub num_buckets: usize,
    /// Disable partial-order reduction and emit one successor per
    /// eligible job.
    pub be_naive: bool,
    /// Stop at the first observed deadline miss instead of
    /// enumerating all of them.
    pub early_exit: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        AnalysisOptions {
            timeout: 0.0,
            max_depth: 0,
            num_buckets: 1000,
            be_naive: false,
            early_exit: true,
        }
    }
}

/// Error type for problems that cannot be explored at all.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ExplorationError {
    #[error(transparent)]
    InvalidJobReference(#[from] InvalidJobReference),
    #[error("cyclic precedence constraints")]
    CyclicPrecedence,
}

impl From<PrecedenceError> for ExplorationError {
    fn from(e: PrecedenceError) -> Self {
        match e {
            PrecedenceError::CyclicPrecedence => ExplorationError::CyclicPrecedence,
            PrecedenceError::InvalidJobReference(r) => ExplorationError::InvalidJobReference(r),
        }
    }
}

/// Outcome of one exploration: the verdict, per-job response bounds,
/// and assorted statistics.
#[derive(Debug, Clone)]
pub struct Analysis<T: Time> {
    schedulable: bool,
    timed_out: bool,
    number_of_states: usize,
    number_of_edges: usize,
    max_width: usize,
    start_times: HashMap<JobID, Interval<T>>,
    finish_times: HashMap<JobID, Interval<T>>,
    por_successes: usize,
    por_failures: usize,
    reduction_statistics: Vec<ReductionSetStatistics<T>>,
    cpu_time: f64,
    #[cfg(feature = "schedule-graph")]
    graph: ScheduleGraph,
}

impl<T: Time> Analysis<T> {
    /// Did every dispatched job meet its deadline?
    pub fn is_schedulable(&self) -> bool {
        self.schedulable
    }

    pub fn was_timed_out(&self) -> bool {
        self.timed_out
    }

    pub fn number_of_states(&self) -> usize {
        self.number_of_states
    }

    pub fn number_of_edges(&self) -> usize {
        self.number_of_edges
    }

    pub fn max_exploration_front_width(&self) -> usize {
        self.max_width
    }

    pub fn number_of_por_successes(&self) -> usize {
        self.por_successes
    }

    pub fn number_of_por_failures(&self) -> usize {
        self.por_failures
    }

    pub fn reduction_set_statistics(&self) -> &[ReductionSetStatistics<T>] {
        &self.reduction_statistics
    }

    /// Wall-clock seconds spent exploring.
    pub fn cpu_time(&self) -> f64 {
        self.cpu_time
    }

    /// Best- and worst-case start times per job. Partial if the run
    /// timed out or stopped early.
    pub fn start_times(&self) -> &HashMap<JobID, Interval<T>> {
        &self.start_times
    }

    /// Best- and worst-case finish times per job.
    pub fn finish_times(&self) -> &HashMap<JobID, Interval<T>> {
        &self.finish_times
    }

    pub fn start_time(&self, id: &JobID) -> Option<Interval<T>> {
        self.start_times.get(id).copied()
    }

    pub fn finish_time(&self, id: &JobID) -> Option<Interval<T>> {
        self.finish_times.get(id).copied()
    }

    /// The collected schedule graph.
    #[cfg(feature = "schedule-graph")]
    pub fn schedule_graph(&self) -> &ScheduleGraph {
        &self.graph
    }
}

/// Explore a scheduling problem with the default (release-order) POR
/// criterion.
pub fn explore<T: Time>(
    problem: &Problem<T>,
    opts: &AnalysisOptions,
) -> Result<Analysis<T>, ExplorationError> {
    explore_with_criterion(problem, opts, ReleaseOrder)
}

/// Explore a scheduling problem with an explicit POR criterion.
pub fn explore_with_criterion<T: Time, C: PorCriterion<T>>(
    problem: &Problem<T>,
    opts: &AnalysisOptions,
    criterion: C,
) -> Result<Analysis<T>, ExplorationError> {
    // this is a uniprocessor analysis
    debug_assert_eq!(problem.num_processors, 1);

    // jobs must release at or after their predecessors
    let jobs = precedence::preprocess_jobs(&problem.precedence, problem.jobs.clone())?;
    let precedence_sets = precedence::build_precedence_sets(&problem.precedence, &jobs)
        .map_err(PrecedenceError::from)?;

    let started = Instant::now();
    let mut space = Space::new(&jobs, &precedence_sets, opts.clone(), criterion, started);
    space.run();
    let cpu_time = started.elapsed().as_secs_f64();
    Ok(space.into_analysis(cpu_time))
}

/// Convenience interface for tests: explore a plain job set.
pub fn explore_jobs<T: Time>(jobs: Vec<Job<T>>) -> Result<Analysis<T>, ExplorationError> {
    explore(&Problem::new(jobs), &AnalysisOptions::default())
}

/// Convenience interface for tests: explore a plain job set without
/// partial-order reduction.
pub fn explore_jobs_naively<T: Time>(jobs: Vec<Job<T>>) -> Result<Analysis<T>, ExplorationError> {
    let opts = AnalysisOptions {
        be_naive: true,
        ..AnalysisOptions::default()
    };
    explore(&Problem::new(jobs), &opts)
}

/// Entry of the open front, ordered by earliest pending release, then
/// state key, then arena index, so exploration order is deterministic.
struct FrontEntry<T: Time> {
    release: T,
    key: u64,
    index: usize,
}

impl<T: Time> PartialEq for FrontEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T: Time> Eq for FrontEntry<T> {}

impl<T: Time> Ord for FrontEntry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.release
            .total_order(other.release)
            .then(self.key.cmp(&other.key))
            .then(self.index.cmp(&other.index))
    }
}

impl<T: Time> PartialOrd for FrontEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Space<'a, T: Time, C> {
    jobs: &'a [Job<T>],
    precedence: &'a [JobPrecedenceSet],
    by_earliest_arrival: Vec<usize>,
    by_latest_arrival: Vec<usize>,
    criterion: C,
    opts: AnalysisOptions,
    started: Instant,
    states: Vec<State<T>>,
    states_by_key: HashMap<u64, Vec<usize>>,
    todo: BinaryHeap<Reverse<FrontEntry<T>>>,
    start_times: Vec<Option<Interval<T>>>,
    finish_times: Vec<Option<Interval<T>>>,
    number_of_edges: usize,
    max_width: usize,
    observed_deadline_miss: bool,
    timed_out: bool,
    por_successes: usize,
    por_failures: usize,
    reduction_statistics: Vec<ReductionSetStatistics<T>>,
    #[cfg(feature = "schedule-graph")]
    graph_edges: Vec<DotEdge>,
}

impl<'a, T: Time, C: PorCriterion<T>> Space<'a, T, C> {
    fn new(
        jobs: &'a [Job<T>],
        precedence: &'a [JobPrecedenceSet],
        opts: AnalysisOptions,
        criterion: C,
        started: Instant,
    ) -> Self {
        let by_earliest_arrival = (0..jobs.len())
            .sorted_by(|&a, &b| {
                jobs[a]
                    .earliest_arrival()
                    .total_order(jobs[b].earliest_arrival())
                    .then(a.cmp(&b))
            })
            .collect_vec();
        let by_latest_arrival = (0..jobs.len())
            .sorted_by(|&a, &b| {
                jobs[a]
                    .latest_arrival()
                    .total_order(jobs[b].latest_arrival())
                    .then(a.cmp(&b))
            })
            .collect_vec();
        let num_buckets = opts.num_buckets.max(1);
        Space {
            jobs,
            precedence,
            by_earliest_arrival,
            by_latest_arrival,
            criterion,
            opts,
            started,
            states: Vec::new(),
            states_by_key: HashMap::with_capacity(num_buckets),
            todo: BinaryHeap::new(),
            start_times: vec![None; jobs.len()],
            finish_times: vec![None; jobs.len()],
            number_of_edges: 0,
            max_width: 0,
            observed_deadline_miss: false,
            timed_out: false,
            por_successes: 0,
            por_failures: 0,
            reduction_statistics: Vec::new(),
            #[cfg(feature = "schedule-graph")]
            graph_edges: Vec::new(),
        }
    }

    fn run(&mut self) {
        self.add_root();
        while let Some(Reverse(entry)) = self.todo.pop() {
            if self.opts.max_depth > 0 && self.states[entry.index].depth() >= self.opts.max_depth {
                debug!(
                    "aborting exploration: depth limit {} reached",
                    self.opts.max_depth
                );
                break;
            }
            self.expand(entry.index);
            if self.observed_deadline_miss && self.opts.early_exit {
                debug!("aborting exploration after first deadline miss");
                break;
            }
            if self.timeout_expired() {
                warn!("exploration timed out after {}s", self.opts.timeout);
                self.timed_out = true;
                break;
            }
        }
    }

    fn add_root(&mut self) {
        let scheduled = IndexSet::with_capacity(self.jobs.len());
        let release = self.earliest_pending_release(&scheduled);
        let certain = self.certain_job_release(&scheduled);
        let root = State::new(scheduled, Interval::point(T::zero()), release, certain, 0);
        self.push_state(root);
    }

    fn expand(&mut self, state: usize) {
        let eligible = self.eligible_successors(state);
        trace!(
            "expanding S{} ({} eligible successors)",
            state,
            eligible.len()
        );

        if eligible.is_empty() {
            if self.states[state].depth() < self.jobs.len() {
                warn!("state S{state} has pending jobs but no eligible successor");
            }
            return;
        }

        if !self.opts.be_naive && eligible.len() > 1 {
            let set = self.create_reduction_set(state, &eligible);
            if !set.has_potential_deadline_misses() {
                self.dispatch_reduction_set(state, &set);
                return;
            }
        }

        for &(job, est, lst) in &eligible {
            self.dispatch_job(state, job, est, lst);
            if self.observed_deadline_miss && self.opts.early_exit {
                return;
            }
        }
    }

    /// Enumerate the jobs that may be dispatched next in the given
    /// state, along with their earliest and latest start times.
    ///
    /// A ready job `j` is an eligible successor iff it can start
    /// (`est = max(availability, release)`) no later than the moment
    /// the processor is certainly busy again (`t_wc`) and no later
    /// than one epsilon before a higher-priority job is certainly
    /// present.
    fn eligible_successors(&self, state: usize) -> Vec<(usize, T, T)> {
        let jobs = self.jobs;
        let s = &self.states[state];
        let scheduled = s.scheduled_jobs();
        let t_wc = s.latest_finish_time().max_time(s.certain_job_release());

        let mut eligible = Vec::new();
        for &j in &self.by_earliest_arrival {
            let job = &jobs[j];
            if job.earliest_arrival() > t_wc {
                break;
            }
            if scheduled.contains(j) || !self.ready(j, scheduled) {
                continue;
            }
            let est = s.earliest_finish_time().max_time(job.earliest_arrival());
            let t_high = self.next_certain_higher_priority_release(scheduled, j);
            let lst = t_wc.min_time(t_high - T::epsilon());
            if est <= lst {
                eligible.push((j, est, lst));
            }
        }
        eligible
    }

    /// Are all predecessors of `job` already scheduled?
    fn ready(&self, job: usize, scheduled: &IndexSet) -> bool {
        self.predecessors(job)
            .iter()
            .all(|&p| scheduled.contains(p))
    }

    fn predecessors(&self, job: usize) -> &[usize] {
        if self.precedence.is_empty() {
            &[]
        } else {
            &self.precedence[job]
        }
    }

    /// Earliest release of any pending job, or infinity.
    fn earliest_pending_release(&self, scheduled: &IndexSet) -> T {
        self.by_earliest_arrival
            .iter()
            .find(|&&j| !scheduled.contains(j))
            .map(|&j| self.jobs[j].earliest_arrival())
            .unwrap_or_else(T::infinity)
    }

    /// Earliest time some ready job is certainly released, or
    /// infinity.
    fn certain_job_release(&self, scheduled: &IndexSet) -> T {
        self.by_latest_arrival
            .iter()
            .find(|&&j| !scheduled.contains(j) && self.ready(j, scheduled))
            .map(|&j| self.jobs[j].latest_arrival())
            .unwrap_or_else(T::infinity)
    }

    /// Earliest certain release of a ready higher-priority job, or
    /// infinity.
    fn next_certain_higher_priority_release(&self, scheduled: &IndexSet, job: usize) -> T {
        self.by_latest_arrival
            .iter()
            .find(|&&k| {
                k != job
                    && !scheduled.contains(k)
                    && self.ready(k, scheduled)
                    && self.jobs[k].higher_priority_than(&self.jobs[job])
            })
            .map(|&k| self.jobs[k].latest_arrival())
            .unwrap_or_else(T::infinity)
    }

    fn dispatch_job(&mut self, state: usize, job: usize, est: T, lst: T) {
        let jobs = self.jobs;
        let j = &jobs[job];
        let start = Interval::new(est, lst);
        let finish = Interval::new(est + j.least_cost(), lst + j.maximal_cost());
        trace!("dispatching {} from S{state}: start {start}, finish {finish}", j.id());

        self.update_tables(job, start, finish);
        let miss = j.exceeds_deadline(finish.until());
        if miss {
            debug!(
                "deadline miss: {} may finish at {} past its deadline {}",
                j.id(),
                finish.until(),
                j.deadline()
            );
            self.observed_deadline_miss = true;
        }

        let (key, mut scheduled) = {
            let s = &self.states[state];
            (s.next_key(j.key()), s.scheduled_jobs().clone())
        };
        scheduled.add(job);
        self.link(state, key, scheduled, finish, &[job], start, miss);
    }

    fn dispatch_reduction_set(&mut self, state: usize, set: &ReductionSet<'a, T>) {
        let jobs = self.jobs;
        let finish = Interval::new(set.earliest_finish_time(), set.latest_busy_time());
        trace!(
            "dispatching reduction set of {} jobs from S{state}: finish {finish}",
            set.len()
        );

        let mut miss = false;
        for &m in set.members() {
            let start = Interval::new(set.earliest_start_time_of(m), set.latest_start_time_of(m));
            let member_finish =
                Interval::new(set.earliest_finish_time_of(m), set.latest_finish_time_of(m));
            self.update_tables(m, start, member_finish);
            if jobs[m].exceeds_deadline(member_finish.until()) {
                self.observed_deadline_miss = true;
                miss = true;
            }
        }

        let (key, mut scheduled) = {
            let s = &self.states[state];
            (s.next_key(set.key()), s.scheduled_jobs().clone())
        };
        for &m in set.members() {
            scheduled.add(m);
        }
        let start = Interval::new(set.earliest_start_time(), set.latest_start_time());
        self.link(state, key, scheduled, finish, set.members(), start, miss);
    }

    /// Grow the reduction set around the eligible successors until it
    /// is closed under interference, or until a member may miss its
    /// deadline.
    fn create_reduction_set(
        &mut self,
        state: usize,
        eligible: &[(usize, T, T)],
    ) -> ReductionSet<'a, T> {
        let jobs = self.jobs;
        let availability = self.states[state].finish_range();
        let scheduled = self.states[state].scheduled_jobs().clone();
        let members = eligible.iter().map(|&(j, _, _)| j).collect_vec();
        let mut set = ReductionSet::new(jobs, self.precedence, availability, members);

        loop {
            if set.has_potential_deadline_misses() {
                debug!("partial-order reduction unsafe, falling back to per-job dispatch");
                self.por_failures += 1;
                self.reduction_statistics
                    .push(ReductionSetStatistics::of(false, &set));
                return set;
            }

            let horizon = set.latest_busy_time() - set.min_wcet();
            let mut interfering = Vec::new();
            for &x in &self.by_earliest_arrival {
                if jobs[x].earliest_arrival() > horizon {
                    break;
                }
                if scheduled.contains(x) {
                    continue;
                }
                if set.can_interfere(x, &scheduled) {
                    interfering.push(x);
                }
            }

            if interfering.is_empty() {
                trace!("reduction set closed with {} members", set.len());
                self.por_successes += 1;
                self.reduction_statistics
                    .push(ReductionSetStatistics::of(true, &set));
                return set;
            }

            let pick = self.criterion.select_job(&interfering, jobs);
            trace!("absorbing interfering job {}", jobs[pick].id());
            set.add_job(pick);
        }
    }

    fn update_tables(&mut self, job: usize, start: Interval<T>, finish: Interval<T>) {
        match &mut self.start_times[job] {
            Some(cur) => cur.widen(start),
            slot => *slot = Some(start),
        }
        match &mut self.finish_times[job] {
            Some(cur) => cur.widen(finish),
            slot => *slot = Some(finish),
        }
    }

    /// Attach an edge from `state` to the successor characterized by
    /// `scheduled` and `finish`: either merge into a matching existing
    /// state or create a new one.
    #[cfg_attr(not(feature = "schedule-graph"), allow(unused_variables))]
    fn link(
        &mut self,
        state: usize,
        key: u64,
        scheduled: IndexSet,
        finish: Interval<T>,
        dispatched: &[usize],
        start: Interval<T>,
        deadline_miss: bool,
    ) {
        self.number_of_edges += 1;

        let mut target = None;
        if let Some(bucket) = self.states_by_key.get(&key) {
            for &candidate in bucket {
                // key collisions are resolved by comparing the job
                // sets; merging requires overlapping finish intervals
                if *self.states[candidate].scheduled_jobs() == scheduled
                    && self.states[candidate].finish_range().intersects(&finish)
                {
                    target = Some(candidate);
                    break;
                }
            }
        }

        let target = match target {
            Some(existing) => {
                trace!("merging into S{existing}");
                self.states[existing].update_finish_range(finish);
                existing
            }
            None => {
                let release = self.earliest_pending_release(&scheduled);
                let certain = self.certain_job_release(&scheduled);
                let successor = State::new(scheduled, finish, release, certain, key);
                self.push_state(successor)
            }
        };

        #[cfg(feature = "schedule-graph")]
        self.graph_edges.push(DotEdge {
            source: state,
            target,
            label: dot_edge_label(self.jobs, dispatched, start, finish),
            deadline_miss,
        });
    }

    fn push_state(&mut self, state: State<T>) -> usize {
        let index = self.states.len();
        let entry = FrontEntry {
            release: state.earliest_pending_release(),
            key: state.key(),
            index,
        };
        self.states_by_key.entry(state.key()).or_default().push(index);
        self.states.push(state);
        self.todo.push(Reverse(entry));
        self.max_width = self.max_width.max(self.todo.len());
        index
    }

    fn timeout_expired(&self) -> bool {
        self.opts.timeout > 0.0 && self.started.elapsed().as_secs_f64() > self.opts.timeout
    }

    fn into_analysis(self, cpu_time: f64) -> Analysis<T> {
        let start_times = self
            .start_times
            .iter()
            .enumerate()
            .filter_map(|(i, st)| st.map(|s| (self.jobs[i].id(), s)))
            .collect();
        let finish_times = self
            .finish_times
            .iter()
            .enumerate()
            .filter_map(|(i, ft)| ft.map(|f| (self.jobs[i].id(), f)))
            .collect();
        Analysis {
            schedulable: !self.observed_deadline_miss,
            timed_out: self.timed_out,
            number_of_states: self.states.len(),
            number_of_edges: self.number_of_edges,
            max_width: self.max_width,
            start_times,
            finish_times,
            por_successes: self.por_successes,
            por_failures: self.por_failures,
            reduction_statistics: self.reduction_statistics,
            cpu_time,
            #[cfg(feature = "schedule-graph")]
            graph: ScheduleGraph {
                node_labels: self
                    .states
                    .iter()
                    .map(|s| format!("{}", s.finish_range()))
                    .collect(),
                edges: self.graph_edges,
            },
        }
    }
}

/// The schedule graph in abstract form, collected when the
/// `schedule-graph` feature is enabled.
#[cfg(feature = "schedule-graph")]
#[derive(Debug, Clone, Default)]
pub struct ScheduleGraph {
    node_labels: Vec<String>,
    edges: Vec<DotEdge>,
}

#[cfg(feature = "schedule-graph")]
#[derive(Debug, Clone)]
struct DotEdge {
    source: usize,
    target: usize,
    label: String,
    deadline_miss: bool,
}

#[cfg(feature = "schedule-graph")]
impl ScheduleGraph {
    /// Render the graph body in Graphviz dot syntax. Node names are
    /// prefixed so graphs of several processing elements can share one
    /// digraph.
    pub fn to_dot(&self, prefix: &str) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        for (i, label) in self.node_labels.iter().enumerate() {
            let _ = writeln!(out, "\t{prefix}S{i}[label=\"S{i}: {label}\"];");
        }
        for e in &self.edges {
            let color = if e.deadline_miss {
                ",color=Red,fontcolor=Red"
            } else {
                ""
            };
            let _ = writeln!(
                out,
                "\t{prefix}S{} -> {prefix}S{}[label=\"{}\"{color},fontsize=8];",
                e.source, e.target, e.label
            );
            if e.deadline_miss {
                let _ = writeln!(out, "\t{prefix}S{}[color=Red];", e.target);
            }
        }
        out
    }
}

#[cfg(feature = "schedule-graph")]
fn dot_edge_label<T: Time>(
    jobs: &[Job<T>],
    dispatched: &[usize],
    start: Interval<T>,
    finish: Interval<T>,
) -> String {
    use std::fmt::Write;

    let mut label = String::new();
    for &j in dispatched {
        let _ = write!(
            label,
            "T{} J{}\\nDL={}\\n",
            jobs[j].task_id(),
            jobs[j].job_id(),
            jobs[j].deadline()
        );
    }
    let _ = write!(
        label,
        "ES={}\\nLS={}\\nEF={}\\nLF={}",
        start.from(),
        start.until(),
        finish.from(),
        finish.until()
    );
    label
}
