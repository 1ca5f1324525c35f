/*! Per-processor partitioning driver

The schedulability analysis itself is a uniprocessor analysis. For a
partitioned platform, the driver splits the generated job set by
processing element, explores each partition independently, aggregates
the per-partition verdicts and statistics, and finally runs the
data-age analysis per task chain over the combined response-time
tables.
*/

use itertools::Itertools;
use log::{debug, info};

use crate::dag::Dag;
use crate::data_age::{DataAgeAnalysis, DataAgeOptions, ResponseTimes};
use crate::interval::Interval;
use crate::io;
use crate::space::{self, AnalysisOptions, ExplorationError, Problem};
use crate::task::Task;
use crate::time::Time;

/// Data-age bound of one task chain.
#[derive(Debug, Clone)]
pub struct ChainLatency<T: Time> {
    pub chain_index: usize,
    /// Human-readable chain description, e.g. `T1 -> T2`.
    pub label: String,
    /// `None` when no temporally consistent chain instance exists.
    pub data_age: Option<Interval<T>>,
}

/// Aggregated result of analyzing one DAG on a partitioned platform.
#[derive(Debug, Clone)]
pub struct RunOutcome<T: Time> {
    pub schedulable: bool,
    pub timed_out: bool,
    pub number_of_jobs: usize,
    pub number_of_states: usize,
    pub number_of_edges: usize,
    pub max_width: usize,
    /// Wall-clock seconds summed over all partitions.
    pub cpu_time: f64,
    pub por_successes: usize,
    pub por_failures: usize,
    pub start_times: ResponseTimes<T>,
    pub finish_times: ResponseTimes<T>,
    pub chain_latencies: Vec<ChainLatency<T>>,
    /// Graphviz dot body of the collected schedule graphs.
    #[cfg(feature = "schedule-graph")]
    pub graph: String,
}

/// Analyze a DAG: generate its job set over the observation window,
/// explore every processing element's partition, and bound the data
/// age of every task chain.
///
/// If the DAG declares no chains, the longest source-to-sink path is
/// analyzed. The data-age pass only runs when the job set is
/// schedulable.
pub fn analyze_dag<T: Time>(
    dag: &mut Dag<T>,
    num_processors: u32,
    opts: &AnalysisOptions,
    da_options: DataAgeOptions,
) -> Result<RunOutcome<T>, ExplorationError> {
    if dag.task_chains().is_empty() {
        dag.find_longest_task_chain();
    }

    let jobs = io::generate_job_set(dag);
    debug!(
        "generated {} jobs over an observation window of {} ticks",
        jobs.len(),
        dag.observation_window()
    );

    let mut outcome = RunOutcome {
        schedulable: true,
        timed_out: false,
        number_of_jobs: 0,
        number_of_states: 0,
        number_of_edges: 0,
        max_width: 0,
        cpu_time: 0.0,
        por_successes: 0,
        por_failures: 0,
        start_times: ResponseTimes::new(),
        finish_times: ResponseTimes::new(),
        chain_latencies: Vec::new(),
        #[cfg(feature = "schedule-graph")]
        graph: String::new(),
    };

    for pe in 0..num_processors {
        let partition: Vec<_> = jobs.iter().filter(|j| j.pe() == pe).cloned().collect();
        if partition.is_empty() {
            continue;
        }
        info!("exploring {} jobs on PE {pe}", partition.len());

        let pe_opts = AnalysisOptions {
            num_buckets: partition.len(),
            ..opts.clone()
        };
        let problem = Problem::new(partition);
        let analysis = space::explore(&problem, &pe_opts)?;

        outcome.schedulable &= analysis.is_schedulable();
        outcome.timed_out |= analysis.was_timed_out();
        outcome.number_of_jobs += problem.jobs.len();
        outcome.number_of_states += analysis.number_of_states();
        outcome.number_of_edges += analysis.number_of_edges();
        outcome.max_width = outcome.max_width.max(analysis.max_exploration_front_width());
        outcome.cpu_time += analysis.cpu_time();
        outcome.por_successes += analysis.number_of_por_successes();
        outcome.por_failures += analysis.number_of_por_failures();
        outcome.start_times.extend(analysis.start_times().clone());
        outcome.finish_times.extend(analysis.finish_times().clone());
        #[cfg(feature = "schedule-graph")]
        outcome
            .graph
            .push_str(&analysis.schedule_graph().to_dot(&format!("P{pe}")));
    }

    if outcome.schedulable {
        for (chain_index, chain) in dag.task_chains().iter().enumerate() {
            let tasks: Vec<&Task<T>> = chain.iter().map(|&t| dag.task(t)).collect();
            let label = tasks.iter().map(|t| t.name()).join(" -> ");
            let analysis = DataAgeAnalysis::run(
                &jobs,
                &outcome.start_times,
                &outcome.finish_times,
                &tasks,
                da_options,
            );
            debug!(
                "chain {label}: data age {:?} ({:?})",
                analysis.data_age(),
                analysis.elapsed()
            );
            outcome.chain_latencies.push(ChainLatency {
                chain_index,
                label,
                data_age: analysis.data_age(),
            });
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Discrete;

    const SINGLE_TASK: &str = "
vertexset:
  - TaskID: 1
    BCET: 2
    WCET: 3
    Period: 10
    Deadline: 10
    Jitter: 0
    PE: 0
";

    const TWO_TASK_CHAIN: &str = "
vertexset:
  - TaskID: 1
    BCET: 1
    WCET: 2
    Period: 10
    Deadline: 10
    Jitter: 0
    PE: 0
    Successors: [2]
  - TaskID: 2
    BCET: 2
    WCET: 3
    Period: 10
    Deadline: 10
    Jitter: 0
    PE: 0
taskchains:
  - Chain: [1, 2]
";

    fn run(input: &str) -> RunOutcome<Discrete> {
        let mut dag = io::parse_dag(input, false).unwrap();
        analyze_dag(
            &mut dag,
            1,
            &AnalysisOptions::default(),
            DataAgeOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn single_periodic_task_end_to_end() {
        let outcome = run(SINGLE_TASK);
        assert!(outcome.schedulable);
        assert!(!outcome.timed_out);
        // observation window: ceil(2*10/10) + 1 = 3 hyperperiods
        assert_eq!(outcome.number_of_jobs, 3);
        // the derived chain is the task itself
        assert_eq!(outcome.chain_latencies.len(), 1);
        assert_eq!(outcome.chain_latencies[0].label, "T1");
        assert_eq!(
            outcome.chain_latencies[0].data_age,
            Some(Interval::new(2, 3))
        );
    }

    #[test]
    fn two_task_chain_end_to_end() {
        let outcome = run(TWO_TASK_CHAIN);
        assert!(outcome.schedulable);
        assert_eq!(outcome.number_of_jobs, 10);

        // first instances behave exactly as the fixed-priority hand
        // calculation predicts
        let t1 = outcome
            .finish_times
            .iter()
            .find(|(id, _)| id.task == 1 && id.job == 0)
            .map(|(_, f)| *f)
            .unwrap();
        assert_eq!(t1, Interval::new(1, 2));
        let t2 = outcome
            .finish_times
            .iter()
            .find(|(id, _)| id.task == 2)
            .map(|(_, f)| *f);
        assert!(t2.is_some());

        assert_eq!(outcome.chain_latencies.len(), 1);
        assert_eq!(outcome.chain_latencies[0].label, "T1 -> T2");
        assert_eq!(
            outcome.chain_latencies[0].data_age,
            Some(Interval::new(3, 5))
        );
    }

    #[test]
    fn unschedulable_sets_skip_the_data_age_pass() {
        let input = "
vertexset:
  - TaskID: 1
    BCET: 5
    WCET: 5
    Period: 10
    Deadline: 10
    Jitter: 0
    PE: 0
  - TaskID: 2
    BCET: 6
    WCET: 6
    Period: 10
    Deadline: 10
    Jitter: 0
    PE: 0
";
        let outcome = run(input);
        assert!(!outcome.schedulable);
        assert!(outcome.chain_latencies.is_empty());
    }

    #[test]
    fn partitions_are_analyzed_independently() {
        let input = "
vertexset:
  - TaskID: 1
    BCET: 4
    WCET: 8
    Period: 10
    Deadline: 10
    Jitter: 0
    PE: 0
  - TaskID: 2
    BCET: 4
    WCET: 8
    Period: 10
    Deadline: 10
    Jitter: 0
    PE: 1
";
        // each task alone fits on its core; on a shared core the set
        // would be overloaded
        let mut dag = io::parse_dag(input, false).unwrap();
        let outcome: RunOutcome<Discrete> = analyze_dag(
            &mut dag,
            2,
            &AnalysisOptions::default(),
            DataAgeOptions::default(),
        )
        .unwrap();
        assert!(outcome.schedulable);
        assert_eq!(outcome.number_of_jobs, 6);
        assert!(outcome.finish_times.keys().any(|id| id.task == 1));
        assert!(outcome.finish_times.keys().any(|id| id.task == 2));
    }

    #[test]
    fn data_age_is_monotone_under_wcet_inflation() {
        let inflated = TWO_TASK_CHAIN.replace("BCET: 2\n    WCET: 3", "BCET: 2\n    WCET: 4");
        let baseline = run(TWO_TASK_CHAIN).chain_latencies[0].data_age.unwrap();
        let bigger = run(&inflated).chain_latencies[0].data_age.unwrap();
        assert!(bigger.until() >= baseline.until());
    }

    #[test]
    fn worst_case_override_preserves_the_worst_case() {
        let plain = run(TWO_TASK_CHAIN);
        let mut pinned_dag = io::parse_dag(TWO_TASK_CHAIN, true).unwrap();
        let pinned: RunOutcome<Discrete> = analyze_dag(
            &mut pinned_dag,
            1,
            &AnalysisOptions::default(),
            DataAgeOptions::default(),
        )
        .unwrap();
        assert!(pinned.schedulable);
        for (id, finish) in &pinned.finish_times {
            let reference = plain.finish_times[id];
            // pinning every job to its WCET singles out the worst
            // case the interval analysis already covers
            assert!(finish.until() <= reference.until());
            assert_eq!(finish.from(), finish.until());
        }
    }
}
