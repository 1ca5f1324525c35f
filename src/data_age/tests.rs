use super::*;
use crate::interval::Interval;
use crate::jobs::{Job, JobID};
use crate::task::Task;
use crate::time::Discrete;

fn job(task: u64, jid: u64, arr: i64, pe: u32) -> Job<Discrete> {
    Job::new(
        JobID::new(jid, task),
        Interval::new(arr, arr),
        Interval::new(1, 2),
        Interval::new(1, 2),
        arr + 100,
        arr + 100,
        arr + 100,
        pe,
    )
}

fn tables(
    entries: &[(JobID, (i64, i64), (i64, i64))],
) -> (ResponseTimes<Discrete>, ResponseTimes<Discrete>) {
    let mut sta = ResponseTimes::new();
    let mut rta = ResponseTimes::new();
    for (id, start, finish) in entries {
        sta.insert(*id, Interval::new(start.0, start.1));
        rta.insert(*id, Interval::new(finish.0, finish.1));
    }
    (sta, rta)
}

fn id(task: u64, jid: u64) -> JobID {
    JobID::new(jid, task)
}

#[test]
fn single_task_chain_uses_response_times() {
    let t1: Task<Discrete> = Task::simple(1, 2, 3, 10, 10, 0);
    let jobs = vec![job(1, 0, 0, 0), job(1, 1, 10, 0), job(1, 2, 20, 0)];
    let (sta, rta) = tables(&[
        (id(1, 0), (0, 0), (2, 3)),
        (id(1, 1), (10, 10), (12, 13)),
        (id(1, 2), (20, 20), (22, 23)),
    ]);
    let chain = [&t1];
    let analysis = DataAgeAnalysis::run(&jobs, &sta, &rta, &chain, DataAgeOptions::default());
    assert_eq!(analysis.data_age(), Some(Interval::new(2, 3)));
}

#[test]
fn harmonic_producer_consumer_chain() {
    let t1: Task<Discrete> = Task::simple(1, 1, 2, 10, 10, 0);
    let t2: Task<Discrete> = Task::simple(2, 2, 3, 10, 10, 0);
    let jobs = vec![job(1, 0, 0, 0), job(1, 1, 10, 0), job(2, 2, 0, 0), job(2, 3, 10, 0)];
    let (sta, rta) = tables(&[
        (id(1, 0), (0, 0), (1, 2)),
        (id(1, 1), (10, 10), (11, 12)),
        (id(2, 2), (1, 2), (3, 5)),
        (id(2, 3), (11, 12), (13, 15)),
    ]);
    let chain = [&t1, &t2];
    let analysis = DataAgeAnalysis::run(&jobs, &sta, &rta, &chain, DataAgeOptions::default());
    // every consumer reads the producer instance of its own period
    assert_eq!(analysis.data_age(), Some(Interval::new(3, 5)));
}

#[test]
fn multi_rate_chain_tracks_oldest_input() {
    // T1 at period 5 produces twice per T2 period; the data age is
    // measured from the arrival of the instance actually consumed
    let t1: Task<Discrete> = Task::simple(1, 1, 1, 5, 5, 0);
    let t2: Task<Discrete> = Task::simple(2, 2, 2, 10, 10, 0);
    let mut jobs = Vec::new();
    for k in 0..8u64 {
        jobs.push(job(1, k, 5 * k as i64, 0));
    }
    for m in 0..4u64 {
        jobs.push(job(2, 8 + m, 10 * m as i64, 0));
    }
    let mut entries = Vec::new();
    for k in 0..8i64 {
        entries.push((id(1, k as u64), (5 * k, 5 * k), (5 * k + 1, 5 * k + 1)));
    }
    for m in 0..4i64 {
        entries.push((
            id(2, (8 + m) as u64),
            (10 * m + 1, 10 * m + 1),
            (10 * m + 3, 10 * m + 3),
        ));
    }
    let (sta, rta) = tables(&entries);
    let chain = [&t1, &t2];
    let analysis = DataAgeAnalysis::run(&jobs, &sta, &rta, &chain, DataAgeOptions::default());
    // each consumer starts right after the even-indexed producer
    // instance of the same period: latency is always 3
    assert_eq!(analysis.data_age(), Some(Interval::new(3, 3)));
}

fn overlapping_scenario(consumer_pe: u32) -> (Vec<Job<Discrete>>, ResponseTimes<Discrete>, ResponseTimes<Discrete>) {
    let jobs = vec![job(1, 0, 0, 0), job(1, 1, 4, 0), job(2, 2, 5, consumer_pe)];
    let (sta, rta) = tables(&[
        (id(1, 0), (0, 0), (1, 2)),
        (id(1, 1), (6, 6), (8, 10)),
        (id(2, 2), (7, 9), (12, 14)),
    ]);
    (jobs, sta, rta)
}

#[test]
fn same_pe_nonpreemptive_visibility_is_start_based() {
    // on the same PE without preemption, a producer that has started
    // before the consumer is already overwritten by it
    let t1: Task<Discrete> = Task::simple(1, 1, 2, 10, 100, 0);
    let t2: Task<Discrete> = Task::simple(2, 2, 3, 10, 100, 0);
    let (jobs, sta, rta) = overlapping_scenario(0);
    let chain = [&t1, &t2];
    let analysis = DataAgeAnalysis::run(&jobs, &sta, &rta, &chain, DataAgeOptions::default());
    // the second producer instance (started at 6 <= 7) is the oldest
    // visible input
    assert_eq!(analysis.data_age(), Some(Interval::new(8, 10)));
}

#[test]
fn cross_pe_visibility_is_finish_based() {
    let t1: Task<Discrete> = Task::simple(1, 1, 2, 10, 100, 0);
    let t2: Task<Discrete> = Task::simple(2, 2, 3, 10, 100, 1);
    let (jobs, sta, rta) = overlapping_scenario(1);
    let chain = [&t1, &t2];
    let analysis = DataAgeAnalysis::run(&jobs, &sta, &rta, &chain, DataAgeOptions::default());
    // across PEs the second instance may not have finished in time, so
    // both producer instances are possible origins
    assert_eq!(analysis.data_age(), Some(Interval::new(8, 14)));
}

#[test]
fn preemptive_visibility_matches_cross_pe() {
    let t1: Task<Discrete> = Task::simple(1, 1, 2, 10, 100, 0);
    let t2: Task<Discrete> = Task::simple(2, 2, 3, 10, 100, 0);
    let (jobs, sta, rta) = overlapping_scenario(0);
    let chain = [&t1, &t2];
    let options = DataAgeOptions {
        preemptive: true,
        ..DataAgeOptions::default()
    };
    let analysis = DataAgeAnalysis::run(&jobs, &sta, &rta, &chain, options);
    assert_eq!(analysis.data_age(), Some(Interval::new(8, 14)));
}

#[test]
fn pruning_preserves_the_extremes() {
    let t1: Task<Discrete> = Task::simple(1, 1, 1, 5, 100, 0);
    let t2: Task<Discrete> = Task::simple(2, 2, 2, 20, 100, 1);
    // four producer instances may all be read by the one consumer
    let jobs = vec![
        job(1, 0, 0, 0),
        job(1, 1, 5, 0),
        job(1, 2, 10, 0),
        job(1, 3, 15, 0),
        job(2, 4, 0, 1),
    ];
    let (sta, rta) = tables(&[
        (id(1, 0), (0, 0), (1, 1)),
        (id(1, 1), (5, 5), (6, 6)),
        (id(1, 2), (10, 10), (11, 11)),
        (id(1, 3), (15, 15), (16, 16)),
        (id(2, 4), (2, 17), (19, 21)),
    ]);
    let chain = [&t1, &t2];
    let plain = DataAgeAnalysis::run(&jobs, &sta, &rta, &chain, DataAgeOptions::default());
    let pruned = DataAgeAnalysis::run(
        &jobs,
        &sta,
        &rta,
        &chain,
        DataAgeOptions {
            pruning: true,
            ..DataAgeOptions::default()
        },
    );
    assert_eq!(plain.data_age(), pruned.data_age());
    assert!(plain.data_age().is_some());
}

#[test]
fn three_level_chain_recurses_to_the_source() {
    let t1: Task<Discrete> = Task::simple(1, 1, 1, 10, 100, 0);
    let t2: Task<Discrete> = Task::simple(2, 2, 2, 10, 100, 0);
    let t3: Task<Discrete> = Task::simple(3, 3, 3, 10, 100, 0);
    let jobs = vec![job(1, 0, 0, 0), job(2, 1, 0, 0), job(3, 2, 0, 0)];
    let (sta, rta) = tables(&[
        (id(1, 0), (0, 0), (1, 1)),
        (id(2, 1), (1, 1), (3, 3)),
        (id(3, 2), (3, 3), (6, 6)),
    ]);
    let chain = [&t1, &t2, &t3];
    let analysis = DataAgeAnalysis::run(&jobs, &sta, &rta, &chain, DataAgeOptions::default());
    assert_eq!(analysis.data_age(), Some(Interval::new(6, 6)));
}

#[test]
fn missing_table_entries_skip_the_instance() {
    let t1: Task<Discrete> = Task::simple(1, 1, 2, 10, 10, 0);
    let t2: Task<Discrete> = Task::simple(2, 2, 3, 10, 10, 0);
    let jobs = vec![job(1, 0, 0, 0), job(2, 1, 0, 0), job(2, 2, 10, 0)];
    // only the first consumer has bounds (e.g., after a timeout)
    let (sta, rta) = tables(&[
        (id(1, 0), (0, 0), (1, 2)),
        (id(2, 1), (1, 2), (3, 5)),
    ]);
    let chain = [&t1, &t2];
    let analysis = DataAgeAnalysis::run(&jobs, &sta, &rta, &chain, DataAgeOptions::default());
    assert_eq!(analysis.data_age(), Some(Interval::new(3, 5)));
}

#[test]
fn no_consistent_origin_means_no_data_age() {
    let t1: Task<Discrete> = Task::simple(1, 1, 2, 10, 10, 0);
    let t2: Task<Discrete> = Task::simple(2, 2, 3, 10, 10, 0);
    // the producer never finishes (or starts) before the consumer
    let jobs = vec![job(1, 0, 0, 0), job(2, 1, 0, 0)];
    let (sta, rta) = tables(&[
        (id(1, 0), (5, 6), (7, 8)),
        (id(2, 1), (0, 1), (3, 4)),
    ]);
    let chain = [&t1, &t2];
    let analysis = DataAgeAnalysis::run(&jobs, &sta, &rta, &chain, DataAgeOptions::default());
    assert_eq!(analysis.data_age(), None);
}
