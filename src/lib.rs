/*!
# Data-Age Analysis for Multi-Rate Task Chains

This crate decides the schedulability of multi-rate task chains running
under limited-preemptive EDF or fixed-priority scheduling on a
(partitioned) multiprocessor platform, and bounds the end-to-end *data
age* along every producer-consumer chain.

## Scope

The core of the crate is a reachability-based response-time analysis:
the space of possible non-preemptive schedules is explored by symbolic
simulation of job dispatch, equivalent states are merged, and commuting
dispatch decisions are aggregated by partial-order reduction
([space::ReductionSet]). On top of the per-job start- and finish-time
tables it produces, the [data_age] module propagates latency bounds
through each task chain via producer-instance lookup.

The analysis is generic in the time model ([time::Discrete] or
[time::Dense]) and is replicated per processing element by the
[driver] for partitioned platforms. Parsing of the YAML input format
and the CSV outputs live in [io]; a thin CLI binary wires everything
together.

## Citations

The partial-order reduction implemented here follows S. Ranjha,
P. Gohari, G. Nelissen, and M. Nasri, "Partial-order reduction in
reachability-based response-time analyses of limited-preemptive DAG
tasks", Real-Time Systems 59(2), 2023. If you use this crate for
academic work, please cite the paper.
*/

pub mod dag;
pub mod data_age;
pub mod driver;
pub mod index_set;
pub mod interval;
pub mod io;
pub mod jobs;
pub mod precedence;
pub mod space;
pub mod task;
pub mod time;
