/*! Reduction sets for partial-order reduction

A reduction set aggregates eligible jobs that commute: dispatched in
any order, none of them can miss a deadline, and no pending job outside
the set can change their response bounds by running in between. The
derived quantities follow Ranjha, Gohari, Nelissen, and Nasri,
"Partial-order reduction in reachability-based response-time analyses
of limited-preemptive DAG tasks", Real-Time Systems 59(2), 2023:
the latest busy time is their Algorithm 2, the latest idle time their
Algorithm 3, and the per-job latest start times their Eqs. 11-13 & 16.
*/

use std::collections::{HashMap, VecDeque};

use crate::index_set::IndexSet;
use crate::interval::Interval;
use crate::jobs::Job;
use crate::precedence::JobPrecedenceSet;
use crate::time::Time;

/// A set of commuting eligible jobs together with the bounds needed to
/// dispatch them as a single schedule-graph edge.
///
/// `jobs` is the complete per-analysis job vector; members are indices
/// into it. `precedence` may be empty when the job set carries no
/// precedence constraints.
#[derive(Debug, Clone)]
pub struct ReductionSet<'a, T: Time> {
    jobs: &'a [Job<T>],
    precedence: &'a [JobPrecedenceSet],
    cpu_availability: Interval<T>,
    members: Vec<usize>,
    by_latest_arrival: Vec<usize>,
    by_earliest_arrival: Vec<usize>,
    by_wcet: Vec<usize>,
    latest_busy_time: T,
    latest_idle_time: Option<T>,
    latest_start_times: HashMap<usize, T>,
    max_priority_value: T,
    key: u64,
    num_interfering_jobs_added: usize,
}

impl<'a, T: Time> ReductionSet<'a, T> {
    pub fn new(
        jobs: &'a [Job<T>],
        precedence: &'a [JobPrecedenceSet],
        cpu_availability: Interval<T>,
        members: Vec<usize>,
    ) -> Self {
        debug_assert!(!members.is_empty());
        let key = members.iter().fold(0u64, |k, &m| k ^ jobs[m].key());
        let mut set = ReductionSet {
            jobs,
            precedence,
            cpu_availability,
            by_latest_arrival: members.clone(),
            by_earliest_arrival: members.clone(),
            by_wcet: members.clone(),
            members,
            latest_busy_time: T::zero(),
            latest_idle_time: None,
            latest_start_times: HashMap::new(),
            max_priority_value: T::zero(),
            key,
            num_interfering_jobs_added: 0,
        };
        set.recompute();
        set
    }

    /// Absorb an interfering job and bring all derived quantities to
    /// their fixed point again.
    pub fn add_job(&mut self, index: usize) {
        self.num_interfering_jobs_added += 1;
        self.members.push(index);
        self.by_latest_arrival.push(index);
        self.by_earliest_arrival.push(index);
        self.by_wcet.push(index);
        self.key ^= self.jobs[index].key();
        self.recompute();
    }

    fn recompute(&mut self) {
        let jobs = self.jobs;
        self.by_latest_arrival.sort_by(|&a, &b| {
            jobs[a]
                .latest_arrival()
                .total_order(jobs[b].latest_arrival())
                .then(a.cmp(&b))
        });
        self.by_earliest_arrival.sort_by(|&a, &b| {
            jobs[a]
                .earliest_arrival()
                .total_order(jobs[b].earliest_arrival())
                .then(a.cmp(&b))
        });
        self.by_wcet.sort_by(|&a, &b| {
            jobs[a]
                .maximal_cost()
                .total_order(jobs[b].maximal_cost())
                .then(a.cmp(&b))
        });
        self.latest_busy_time = self.compute_latest_busy_time();
        self.latest_idle_time = self.compute_latest_idle_time();
        self.latest_start_times = self.compute_latest_start_times();
        self.max_priority_value = self
            .members
            .iter()
            .map(|&m| self.jobs[m].priority())
            .reduce(|a, b| a.max_time(b))
            .unwrap_or_else(T::zero);
    }

    pub fn members(&self) -> &[usize] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// XOR over the member job keys.
    pub fn key(&self) -> u64 {
        self.key
    }

    pub fn cpu_availability(&self) -> Interval<T> {
        self.cpu_availability
    }

    pub fn latest_busy_time(&self) -> T {
        self.latest_busy_time
    }

    pub fn latest_idle_time(&self) -> Option<T> {
        self.latest_idle_time
    }

    pub fn num_interfering_jobs_added(&self) -> usize {
        self.num_interfering_jobs_added
    }

    /// The numerically largest (i.e., lowest) priority value among the
    /// members.
    pub fn max_priority_value(&self) -> T {
        self.max_priority_value
    }

    /// Smallest worst-case execution time among the members.
    pub fn min_wcet(&self) -> T {
        self.jobs[self.by_wcet[0]].maximal_cost()
    }

    /// Latest arrival among the members.
    pub fn max_arrival(&self) -> T {
        self.jobs[self.by_latest_arrival[self.by_latest_arrival.len() - 1]].latest_arrival()
    }

    /// Earliest time any member can start.
    pub fn earliest_start_time(&self) -> T {
        self.cpu_availability
            .from()
            .max_time(self.jobs[self.by_earliest_arrival[0]].earliest_arrival())
    }

    /// Latest time the first member to run may start.
    pub fn latest_start_time(&self) -> T {
        self.cpu_availability
            .until()
            .max_time(self.jobs[self.by_latest_arrival[0]].latest_arrival())
    }

    /// Earliest time at which all members can have completed.
    pub fn earliest_finish_time(&self) -> T {
        let mut t = self.cpu_availability.from();
        for &j in &self.by_earliest_arrival {
            t = t.max_time(self.jobs[j].earliest_arrival()) + self.jobs[j].least_cost();
        }
        t
    }

    /// Earliest completion of one member, dispatched as early as
    /// possible.
    pub fn earliest_finish_time_of(&self, member: usize) -> T {
        self.earliest_start_time_of(member) + self.jobs[member].least_cost()
    }

    /// Earliest start of one member.
    pub fn earliest_start_time_of(&self, member: usize) -> T {
        self.cpu_availability
            .from()
            .max_time(self.jobs[member].earliest_arrival())
    }

    /// Latest start of one member (Eq. 16).
    pub fn latest_start_time_of(&self, member: usize) -> T {
        debug_assert!(self.latest_start_times.contains_key(&member));
        self.latest_start_times
            .get(&member)
            .copied()
            .unwrap_or_else(T::zero)
    }

    /// Latest completion of one member.
    pub fn latest_finish_time_of(&self, member: usize) -> T {
        self.latest_start_time_of(member) + self.jobs[member].maximal_cost()
    }

    /// Can any member miss its deadline when the whole set is
    /// dispatched together? If so, the caller must fall back to
    /// per-job dispatching.
    pub fn has_potential_deadline_misses(&self) -> bool {
        self.members
            .iter()
            .any(|&m| self.jobs[m].exceeds_deadline(self.latest_finish_time_of(m)))
    }

    /// May the pending job `index` interfere with this set
    /// (Corollary 1 / Lemma 5, plus the precedence admissibility of
    /// Eq. 17)?
    pub fn can_interfere(&self, index: usize, scheduled_jobs: &IndexSet) -> bool {
        if !self.satisfies_precedence_constraints(index, scheduled_jobs) {
            return false;
        }
        self.can_interfere_with_members(index)
    }

    fn satisfies_precedence_constraints(&self, index: usize, scheduled_jobs: &IndexSet) -> bool {
        if self.precedence.is_empty() || self.precedence[index].is_empty() {
            return true;
        }
        let preds = &self.precedence[index];
        // ances(x) must lie within the scheduled jobs and the set itself
        let admissible = preds
            .iter()
            .all(|&p| scheduled_jobs.contains(p) || self.members.contains(&p));
        // and the set must not consist solely of ancestors of x
        let not_all_ancestors = !self.members.iter().all(|m| preds.contains(m));
        admissible && not_all_ancestors
    }

    fn can_interfere_with_members(&self, index: usize) -> bool {
        // a job cannot interfere with itself
        if self.members.contains(&index) {
            return false;
        }

        let job = &self.jobs[index];

        // the job may arrive before the processor is certainly busy
        if let Some(idle) = self.latest_idle_time {
            if job.earliest_arrival() <= idle {
                return true;
            }
        }

        // quick rejection: a job that is neither higher-priority than
        // some member nor able to arrive among them cannot interfere
        if !job.priority_exceeds(self.max_priority_value)
            && job.earliest_arrival() > self.max_arrival()
        {
            return false;
        }

        // otherwise it interferes iff it can preempt the start of a
        // lower-priority member
        self.members.iter().any(|&m| {
            job.earliest_arrival() <= self.latest_start_time_of(m)
                && job.higher_priority_than(&self.jobs[m])
        })
    }

    /// Algorithm 2: fold the members in latest-arrival order on top of
    /// the latest availability.
    fn compute_latest_busy_time(&self) -> T {
        let mut t = self.cpu_availability.until();
        for &j in &self.by_latest_arrival {
            t = t.max_time(self.jobs[j].latest_arrival()) + self.jobs[j].maximal_cost();
        }
        t
    }

    /// Algorithm 3: the latest point at which the processor may still
    /// be idle, or `None` when the members keep it busy throughout.
    fn compute_latest_idle_time(&self) -> Option<T> {
        let a_min = self.cpu_availability.from();

        // no member arrives after the processor may become free, so no
        // idle instant can open up before the last member
        if !self
            .by_latest_arrival
            .iter()
            .any(|&j| self.jobs[j].latest_arrival() > a_min)
        {
            return None;
        }

        let mut idle_job: Option<usize> = None;
        for &i in &self.by_latest_arrival {
            let la_i = self.jobs[i].latest_arrival();

            // earliest time at which all jobs certainly arriving
            // before i can have completed
            let mut t = a_min;
            for &j in &self.by_earliest_arrival {
                if self.jobs[j].latest_arrival() < la_i {
                    t = t.max_time(self.jobs[j].earliest_arrival()) + self.jobs[j].least_cost();
                }
                if t >= la_i {
                    break;
                }
            }

            if t < la_i {
                let later = match idle_job {
                    None => true,
                    Some(prev) => la_i > self.jobs[prev].latest_arrival(),
                };
                if later {
                    idle_job = Some(i);
                }
            }
        }

        let idle = idle_job?;
        let first_arrival = self.jobs[self.by_latest_arrival[0]].latest_arrival();
        if self.jobs[idle].latest_arrival() == first_arrival {
            None
        } else {
            Some(self.jobs[idle].latest_arrival() - T::epsilon())
        }
    }

    fn compute_latest_start_times(&self) -> HashMap<usize, T> {
        let prio = self.preprocess_priorities();
        self.members
            .iter()
            .map(|&m| (m, self.compute_latest_start_time(m, &prio)))
            .collect()
    }

    /// Eq. 11: propagate priorities down the induced member subgraph,
    /// so that a job never counts as more urgent than the least urgent
    /// of its ancestors inside the set.
    fn preprocess_priorities(&self) -> HashMap<usize, T> {
        let mut prio: HashMap<usize, T> = HashMap::new();

        if self.precedence.is_empty() {
            for &m in &self.members {
                prio.insert(m, self.jobs[m].priority());
            }
            return prio;
        }

        // Kahn walk over the induced subgraph; predecessors outside
        // the set are ignored.
        let member_preds: HashMap<usize, Vec<usize>> = self
            .members
            .iter()
            .map(|&m| {
                let preds = self.precedence[m]
                    .iter()
                    .copied()
                    .filter(|p| self.members.contains(p))
                    .collect::<Vec<_>>();
                (m, preds)
            })
            .collect();
        let mut pending: VecDeque<usize> = self.members.iter().copied().collect();
        while let Some(m) = pending.pop_front() {
            let preds = &member_preds[&m];
            if preds.iter().all(|p| prio.contains_key(p)) {
                let mut p = self.jobs[m].priority();
                for pred in preds {
                    p = p.max_time(prio[pred]);
                }
                prio.insert(m, p);
            } else {
                pending.push_back(m);
            }
        }
        prio
    }

    /// Eq. 16.
    fn compute_latest_start_time(&self, member: usize, prio: &HashMap<usize, T>) -> T {
        let s_i = self.compute_si(member, prio);
        s_i.min_time(self.second_lst_bound(member))
    }

    /// Eqs. 12 and 13.
    fn compute_si(&self, member: usize, prio: &HashMap<usize, T>) -> T {
        let job = &self.jobs[member];

        // longest lower-priority job that could block the start
        let mut blocking_time = T::zero();
        for &j in &self.members {
            if j == member {
                continue;
            }
            if job.priority_exceeds(prio[&j]) {
                blocking_time = blocking_time.max_time(self.jobs[j].maximal_cost());
            }
        }

        // Eq. 12
        let mut lst = self
            .cpu_availability
            .until()
            .max_time(job.latest_arrival())
            .max_time(job.latest_arrival() - T::epsilon() + blocking_time);

        // Eq. 13: higher- and equal-priority members that can arrive
        // before the candidate start push it further out
        for &j in &self.by_earliest_arrival {
            if j == member {
                continue;
            }
            if self.jobs[j].earliest_arrival() <= lst && !job.priority_exceeds(prio[&j]) {
                lst = lst + self.jobs[j].maximal_cost();
            } else if self.jobs[j].earliest_arrival() > lst {
                break;
            }
        }

        lst
    }

    /// Second half of Eq. 16: the member and all its descendants in
    /// the set still have to fit before the latest busy time.
    fn second_lst_bound(&self, member: usize) -> T {
        let mut bound = self.latest_busy_time - self.jobs[member].maximal_cost();
        for d in self.descendants(member) {
            bound = bound - self.jobs[d].maximal_cost();
        }
        bound
    }

    /// BFS over the successor relation restricted to the members.
    fn descendants(&self, member: usize) -> Vec<usize> {
        let mut found = Vec::new();
        if self.precedence.is_empty() {
            return found;
        }
        let mut visited = IndexSet::new();
        visited.add(member);
        let mut queue = VecDeque::from([member]);
        while let Some(j) = queue.pop_front() {
            for &k in &self.members {
                if !visited.contains(k) && self.precedence[k].contains(&j) {
                    visited.add(k);
                    found.push(k);
                    queue.push_back(k);
                }
            }
        }
        found
    }
}

/// Summary of one attempted reduction, kept for reporting.
#[derive(Debug, Clone)]
pub struct ReductionSetStatistics<T: Time> {
    pub reduction_success: bool,
    pub num_jobs: usize,
    pub num_interfering_jobs_added: usize,
    pub priorities: Vec<T>,
}

impl<T: Time> ReductionSetStatistics<T> {
    pub fn of(reduction_success: bool, set: &ReductionSet<'_, T>) -> Self {
        ReductionSetStatistics {
            reduction_success,
            num_jobs: set.len(),
            num_interfering_jobs_added: set.num_interfering_jobs_added(),
            priorities: set.members().iter().map(|&m| set.jobs[m].priority()).collect(),
        }
    }
}
