/*! Input parsing and result serialization

The input format is a YAML document with a `vertexset` list describing
the tasks of the DAG (including their successors) and an optional
`taskchains` list naming the chains to analyze. Outputs are CSV: a
per-job response-time table and an appending data-age results sink.
*/

use std::fs::OpenOptions;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::dag::{Dag, InvalidTaskReference};
use crate::data_age::ResponseTimes;
use crate::interval::Interval;
use crate::jobs::{Job, JobID};
use crate::task::Task;
use crate::time::Time;

/// Error raised for malformed input documents.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("error reading YAML input: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Task(#[from] InvalidTaskReference),
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: serde::Deserialize<'de>"))]
struct InputDocument<T> {
    vertexset: Vec<TaskEntry<T>>,
    #[serde(default)]
    taskchains: Vec<ChainEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: serde::Deserialize<'de>"))]
struct TaskEntry<T> {
    #[serde(rename = "TaskID")]
    task_id: u64,
    #[serde(rename = "BCET")]
    bcet: T,
    #[serde(rename = "WCET")]
    wcet: T,
    #[serde(rename = "RecoveryCostMin")]
    recovery_cost_min: Option<T>,
    #[serde(rename = "RecoveryCostMax")]
    recovery_cost_max: Option<T>,
    #[serde(rename = "Period")]
    period: T,
    #[serde(rename = "Deadline")]
    deadline: T,
    #[serde(rename = "Jitter")]
    jitter: T,
    #[serde(rename = "PE")]
    pe: u32,
    #[serde(rename = "Successors", default)]
    successors: Vec<u64>,
}

#[derive(Debug, Deserialize)]
struct ChainEntry {
    #[serde(rename = "Chain")]
    chain: Vec<u64>,
}

/// Parse a DAG description.
///
/// With `worst_case` set, every task is pinned to its worst case:
/// `BCET := WCET`, zero jitter, and the recovery-cost window collapsed
/// to its maximum.
pub fn parse_dag<T>(input: &str, worst_case: bool) -> Result<Dag<T>, ParseError>
where
    T: Time + serde::de::DeserializeOwned,
{
    let doc: InputDocument<T> = serde_yaml::from_str(input)?;
    let mut dag = Dag::new();

    for entry in &doc.vertexset {
        let bcet = if worst_case { entry.wcet } else { entry.bcet };
        let rec_max = entry.recovery_cost_max.unwrap_or(entry.wcet);
        let rec_min = if worst_case {
            rec_max
        } else {
            entry.recovery_cost_min.unwrap_or(entry.bcet)
        };
        let jitter = if worst_case {
            Interval::point(T::zero())
        } else {
            Interval::new(T::zero(), entry.jitter)
        };
        dag.add_task(Task::new(
            entry.task_id,
            bcet,
            entry.wcet,
            rec_min,
            rec_max,
            entry.period,
            jitter,
            entry.deadline,
            entry.pe,
        ));
    }

    for entry in &doc.vertexset {
        for &successor in &entry.successors {
            dag.add_edge(entry.task_id, successor)?;
        }
    }

    for entry in &doc.taskchains {
        dag.add_task_chain_by_ids(&entry.chain)?;
    }

    Ok(dag)
}

/// Materialize the job set of a DAG over its observation window.
///
/// Jobs are generated task by task, instances in time order, with
/// globally unique, monotonically assigned job ids. Under EDF the
/// priority of a job is its absolute deadline.
pub fn generate_job_set<T: Time>(dag: &Dag<T>) -> Vec<Job<T>> {
    let window = dag.observation_window();
    let mut jobs = Vec::new();
    let mut id_counter = 0u64;

    for task in dag.tasks() {
        let period = task.period().to_ticks();
        let mut release = 0i64;
        while release < window {
            let r = T::from_ticks(release);
            let arrival = Interval::new(r + task.min_jitter(), r + task.max_jitter());
            let deadline = r + task.deadline();
            let priority = deadline;
            jobs.push(Job::new(
                JobID::new(id_counter, task.task_id()),
                arrival,
                Interval::new(task.bcet(), task.wcet()),
                task.recovery_cost_window(),
                deadline,
                priority,
                priority,
                task.pe(),
            ));
            id_counter += 1;
            release += period;
        }
    }

    jobs
}

/// Write the per-job completion and response times as CSV.
///
/// Columns: `Task ID, Job ID, BCCT, WCCT, BCRT, WCRT`. Jobs without an
/// entry in the table (possible after a timeout) are omitted.
pub fn write_response_times<T: Time, W: std::io::Write>(
    out: W,
    jobs: &[Job<T>],
    rta: &ResponseTimes<T>,
) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(["Task ID", "Job ID", "BCCT", "WCCT", "BCRT", "WCRT"])?;
    for job in jobs {
        let Some(finish) = rta.get(&job.id()) else {
            continue;
        };
        let bcrt = (finish.from() - job.earliest_arrival()).max_time(T::zero());
        let wcrt = finish.until() - job.earliest_arrival();
        writer.write_record([
            job.task_id().to_string(),
            job.job_id().to_string(),
            finish.from().to_string(),
            finish.until().to_string(),
            bcrt.to_string(),
            wcrt.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Appending CSV sink for data-age results.
///
/// The sink is passed to whoever produces results instead of being a
/// process-global file; the CLI wires it to `results_DA.csv`.
pub struct DataAgeCsv {
    writer: csv::Writer<std::fs::File>,
}

impl DataAgeCsv {
    /// Open (or create) the sink file in append mode.
    pub fn append<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(DataAgeCsv {
            writer: csv::Writer::from_writer(file),
        })
    }

    /// Record one chain result. An undetermined data age (no
    /// temporally consistent chain instance) is recorded as the
    /// `[0, 0]` sentinel.
    pub fn record<T: Time>(
        &mut self,
        label: &str,
        data_age: Option<Interval<T>>,
    ) -> Result<(), csv::Error> {
        let (lo, hi) = match data_age {
            Some(age) => (age.from().to_string(), age.until().to_string()),
            None => (T::zero().to_string(), T::zero().to_string()),
        };
        self.writer.write_record([label, lo.as_str(), hi.as_str(), ""])?;
        self.writer.flush()?;
        Ok(())
    }
}
