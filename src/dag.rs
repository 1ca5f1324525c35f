/*! The task graph

A [Dag] owns all tasks of one analysis problem in an arena and connects
them with directed edges stored as index pairs. The incident-edge
relation is kept as per-task edge-index lists; it is a pure relation,
not ownership. Task chains (producer-consumer pipelines for the
data-age analysis) are sequences of task indices.
*/

use std::fmt;

use num::integer::{div_ceil, lcm};
use thiserror::Error;

use crate::task::Task;
use crate::time::Time;

/// Position of a task in the DAG's task arena.
pub type TaskIndex = usize;

/// Position of an edge in the DAG's edge list.
pub type EdgeIndex = usize;

/// A directed edge between two tasks, by arena index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    src: TaskIndex,
    dst: TaskIndex,
}

impl Edge {
    pub fn src(&self) -> TaskIndex {
        self.src
    }

    pub fn dst(&self) -> TaskIndex {
        self.dst
    }
}

/// Error raised when an edge or chain references an unknown task id.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("invalid task reference: T{0}")]
pub struct InvalidTaskReference(pub u64);

/// A directed acyclic graph of tasks, plus the task chains declared
/// for (or derived by) the data-age analysis.
#[derive(Debug, Clone)]
pub struct Dag<T: Time> {
    tasks: Vec<Task<T>>,
    edges: Vec<Edge>,
    rcv_edges: Vec<Vec<EdgeIndex>>,
    snd_edges: Vec<Vec<EdgeIndex>>,
    chains: Vec<Vec<TaskIndex>>,
}

impl<T: Time> Dag<T> {
    pub fn new() -> Self {
        Dag {
            tasks: Vec::new(),
            edges: Vec::new(),
            rcv_edges: Vec::new(),
            snd_edges: Vec::new(),
            chains: Vec::new(),
        }
    }

    pub fn add_task(&mut self, task: Task<T>) -> TaskIndex {
        self.tasks.push(task);
        self.rcv_edges.push(Vec::new());
        self.snd_edges.push(Vec::new());
        self.tasks.len() - 1
    }

    /// Connect two tasks, identified by their task ids.
    pub fn add_edge(&mut self, src_id: u64, dst_id: u64) -> Result<EdgeIndex, InvalidTaskReference> {
        let src = self.find_task(src_id)?;
        let dst = self.find_task(dst_id)?;
        let idx = self.edges.len();
        self.edges.push(Edge { src, dst });
        self.snd_edges[src].push(idx);
        self.rcv_edges[dst].push(idx);
        Ok(idx)
    }

    pub fn find_task(&self, task_id: u64) -> Result<TaskIndex, InvalidTaskReference> {
        self.tasks
            .iter()
            .position(|t| t.task_id() == task_id)
            .ok_or(InvalidTaskReference(task_id))
    }

    pub fn task(&self, index: TaskIndex) -> &Task<T> {
        &self.tasks[index]
    }

    pub fn tasks(&self) -> &[Task<T>] {
        &self.tasks
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Derived edge name, e.g. `E12` for the edge from T1 to T2.
    pub fn edge_name(&self, index: EdgeIndex) -> String {
        let e = self.edges[index];
        format!(
            "E{}{}",
            self.tasks[e.src].task_id(),
            self.tasks[e.dst].task_id()
        )
    }

    /// Edges arriving at the given task.
    pub fn rcv_edges(&self, task: TaskIndex) -> &[EdgeIndex] {
        &self.rcv_edges[task]
    }

    /// Edges leaving the given task.
    pub fn snd_edges(&self, task: TaskIndex) -> &[EdgeIndex] {
        &self.snd_edges[task]
    }

    /// All tasks mapped to the given processing element.
    pub fn mapped_tasks(&self, pe: u32) -> Vec<TaskIndex> {
        (0..self.tasks.len())
            .filter(|&i| self.tasks[i].pe() == pe)
            .collect()
    }

    /// Tasks without incoming edges.
    pub fn source_tasks(&self) -> Vec<TaskIndex> {
        (0..self.tasks.len())
            .filter(|&i| self.rcv_edges[i].is_empty())
            .collect()
    }

    /// Tasks without outgoing edges.
    pub fn sink_tasks(&self) -> Vec<TaskIndex> {
        (0..self.tasks.len())
            .filter(|&i| self.snd_edges[i].is_empty())
            .collect()
    }

    /// The hyperperiod: least common multiple of all task periods, in
    /// ticks.
    pub fn hyperperiod(&self) -> i64 {
        self.tasks
            .iter()
            .fold(1, |h, t| lcm(h, t.period().to_ticks()))
    }

    /// Total number of jobs released per hyperperiod.
    pub fn number_of_jobs_per_hyperperiod(&self) -> i64 {
        let h = self.hyperperiod();
        self.tasks.iter().map(|t| h / t.period().to_ticks()).sum()
    }

    /// All simple paths from `source` to `sink`.
    pub fn find_all_paths(&self, source: TaskIndex, sink: TaskIndex) -> Vec<Vec<TaskIndex>> {
        let mut paths = Vec::new();
        let mut visited = vec![false; self.tasks.len()];
        let mut path = Vec::new();
        self.collect_paths(source, sink, &mut visited, &mut path, &mut paths);
        paths
    }

    fn collect_paths(
        &self,
        at: TaskIndex,
        sink: TaskIndex,
        visited: &mut [bool],
        path: &mut Vec<TaskIndex>,
        paths: &mut Vec<Vec<TaskIndex>>,
    ) {
        visited[at] = true;
        path.push(at);

        if at == sink {
            paths.push(path.clone());
        } else {
            for &e in &self.snd_edges[at] {
                let next = self.edges[e].dst;
                if !visited[next] {
                    self.collect_paths(next, sink, visited, path, paths);
                }
            }
        }

        path.pop();
        visited[at] = false;
    }

    pub fn add_task_chain(&mut self, chain: Vec<TaskIndex>) {
        self.chains.push(chain);
    }

    /// Build a chain from a sequence of task ids.
    pub fn add_task_chain_by_ids(&mut self, ids: &[u64]) -> Result<(), InvalidTaskReference> {
        let chain = ids
            .iter()
            .map(|&id| self.find_task(id))
            .collect::<Result<Vec<_>, _>>()?;
        self.chains.push(chain);
        Ok(())
    }

    /// Register every source-to-sink path as a task chain.
    pub fn find_task_chains(&mut self) {
        let mut found = Vec::new();
        for &s in &self.source_tasks() {
            for &d in &self.sink_tasks() {
                found.extend(self.find_all_paths(s, d));
            }
        }
        self.chains.extend(found);
    }

    /// Register the single longest source-to-sink path as a task
    /// chain. Among equally long paths, the first one found wins.
    pub fn find_longest_task_chain(&mut self) {
        let mut longest: Vec<TaskIndex> = Vec::new();
        for &s in &self.source_tasks() {
            for &d in &self.sink_tasks() {
                for path in self.find_all_paths(s, d) {
                    if longest.is_empty() || path.len() > longest.len() {
                        longest = path;
                    }
                }
            }
        }
        if !longest.is_empty() {
            self.chains.push(longest);
        }
    }

    pub fn task_chains(&self) -> &[Vec<TaskIndex>] {
        &self.chains
    }

    /// Hyperperiod restricted to the tasks of one chain, in ticks.
    pub fn chain_hyperperiod(&self, chain_index: usize) -> i64 {
        self.chains[chain_index]
            .iter()
            .fold(1, |h, &t| lcm(h, self.tasks[t].period().to_ticks()))
    }

    /// Number of hyperperiods that make up the observation window:
    /// `ceil(max over chains of 2 * sum of chain periods / hyperperiod)
    /// + 1`.
    pub fn observation_window_hyperperiods(&self) -> i64 {
        let h = self.hyperperiod();
        let ow = self
            .chains
            .iter()
            .map(|chain| {
                let wct: i64 = chain
                    .iter()
                    .map(|&t| 2 * self.tasks[t].period().to_ticks())
                    .sum();
                div_ceil(wct, h)
            })
            .max()
            .unwrap_or(0);
        ow + 1
    }

    /// The job-generation horizon, in ticks.
    pub fn observation_window(&self) -> i64 {
        self.observation_window_hyperperiods() * self.hyperperiod()
    }
}

impl<T: Time> fmt::Display for Dag<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Input tasks:")?;
        for t in &self.tasks {
            writeln!(
                f,
                "\t{}: C=[{}, {}], P={}, J={}, D={}, PE={}",
                t.name(),
                t.bcet(),
                t.wcet(),
                t.period(),
                t.jitter_window(),
                t.deadline(),
                t.pe()
            )?;
        }
        writeln!(f, "Edges:")?;
        for i in 0..self.edges.len() {
            let e = self.edges[i];
            writeln!(
                f,
                "\t{}: {} --> {}",
                self.edge_name(i),
                self.tasks[e.src].name(),
                self.tasks[e.dst].name()
            )?;
        }
        writeln!(f, "Task chains:")?;
        for chain in &self.chains {
            let names: Vec<String> = chain.iter().map(|&t| self.tasks[t].name()).collect();
            writeln!(f, "\t{}", names.join(" => "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::Interval;

    fn diamond() -> Dag<i64> {
        // T1 -> {T2, T3} -> T4
        let mut dag = Dag::new();
        dag.add_task(Task::simple(1, 1, 2, 10, 10, 0));
        dag.add_task(Task::simple(2, 1, 2, 20, 20, 0));
        dag.add_task(Task::simple(3, 1, 2, 5, 5, 0));
        dag.add_task(Task::simple(4, 1, 2, 20, 20, 0));
        dag.add_edge(1, 2).unwrap();
        dag.add_edge(1, 3).unwrap();
        dag.add_edge(2, 4).unwrap();
        dag.add_edge(3, 4).unwrap();
        dag
    }

    #[test]
    fn hyperperiod_is_lcm_of_periods() {
        let dag = diamond();
        assert_eq!(dag.hyperperiod(), 20);
        assert_eq!(dag.number_of_jobs_per_hyperperiod(), 2 + 1 + 4 + 1);
    }

    #[test]
    fn sources_sinks_and_paths() {
        let dag = diamond();
        assert_eq!(dag.source_tasks(), vec![0]);
        assert_eq!(dag.sink_tasks(), vec![3]);
        let paths = dag.find_all_paths(0, 3);
        assert_eq!(paths.len(), 2);
        assert!(paths.contains(&vec![0, 1, 3]));
        assert!(paths.contains(&vec![0, 2, 3]));
    }

    #[test]
    fn longest_chain_derivation() {
        let mut dag: Dag<i64> = Dag::new();
        dag.add_task(Task::simple(1, 1, 1, 10, 10, 0));
        dag.add_task(Task::simple(2, 1, 1, 10, 10, 0));
        dag.add_task(Task::simple(3, 1, 1, 10, 10, 0));
        dag.add_edge(1, 2).unwrap();
        dag.add_edge(2, 3).unwrap();
        // a direct shortcut that must lose against the longer path
        dag.add_edge(1, 3).unwrap();
        dag.find_longest_task_chain();
        assert_eq!(dag.task_chains(), &[vec![0, 1, 2]]);
    }

    #[test]
    fn observation_window_size() {
        let mut dag: Dag<i64> = Dag::new();
        dag.add_task(Task::simple(1, 1, 1, 5, 5, 0));
        dag.add_task(Task::simple(2, 2, 2, 10, 10, 0));
        dag.add_edge(1, 2).unwrap();
        dag.add_task_chain(vec![0, 1]);
        // hyperperiod 10; 2 * (5 + 10) = 30; ceil(30 / 10) + 1 = 4
        assert_eq!(dag.hyperperiod(), 10);
        assert_eq!(dag.observation_window_hyperperiods(), 4);
        assert_eq!(dag.observation_window(), 40);
    }

    #[test]
    fn bad_references_are_recoverable() {
        let mut dag: Dag<i64> = Dag::new();
        dag.add_task(Task::new(
            1,
            1,
            2,
            1,
            2,
            10,
            Interval::new(0, 1),
            10,
            0,
        ));
        assert_eq!(dag.add_edge(1, 9).unwrap_err(), InvalidTaskReference(9));
        assert_eq!(
            dag.add_task_chain_by_ids(&[1, 9]).unwrap_err(),
            InvalidTaskReference(9)
        );
        assert!(dag.task_chains().is_empty());
    }
}
