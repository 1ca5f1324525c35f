/*! Command-line front end of the data-age analysis.

Reads DAG descriptions in YAML, runs the per-PE schedulability
analysis and the per-chain data-age analysis, and reports one summary
line per input file plus optional CSV and Graphviz artifacts.
*/

use std::fs;
use std::io::Read;
use std::process::exit;

use clap::{Parser, ValueEnum};
use log::LevelFilter;
use serde::de::DeserializeOwned;
use simple_logger::SimpleLogger;
use thiserror::Error;

use data_age_analysis::data_age::DataAgeOptions;
use data_age_analysis::driver::{analyze_dag, RunOutcome};
use data_age_analysis::io::{generate_job_set, parse_dag, write_response_times, DataAgeCsv, ParseError};
use data_age_analysis::space::{AnalysisOptions, ExplorationError};
use data_age_analysis::time::{Dense, Discrete, Time};

const MAX_PROCESSORS: u32 = 512;

#[derive(Parser, Debug)]
#[command(
    name = "data-age-analysis",
    about = "Schedulability and data-age analysis for multi-rate task chains",
    next_line_help = true
)]
struct Args {
    /// Input DAG descriptions (YAML). Use '-' or no argument to read
    /// from stdin.
    inputs: Vec<String>,

    /// Set the number of processors of the platform.
    #[arg(short = 'm', long = "multiprocessor", default_value_t = 1, value_name = "N")]
    num_processors: u32,

    /// Choose 'discrete' or 'dense' time.
    #[arg(
        short = 't',
        long = "time",
        value_enum,
        default_value = "discrete",
        value_name = "TIME-MODEL"
    )]
    time_model: TimeModel,

    /// Maximum CPU time allowed, in seconds (zero means no limit).
    #[arg(short = 'l', long = "time-limit", default_value_t = 0.0, value_name = "SEC")]
    timeout: f64,

    /// Abort graph exploration after reaching the given depth (>= 2).
    #[arg(short = 'd', long = "depth-limit", value_name = "DEPTH")]
    depth: Option<usize>,

    /// Use the naive exploration method (default: merging).
    #[arg(short = 'n', long = "naive")]
    naive: bool,

    /// Use the WCET as the actual execution time and zero jitter for
    /// every job.
    #[arg(short = 'w', long = "wcet")]
    worst_case: bool,

    /// Print a column header.
    #[arg(long = "header")]
    header: bool,

    /// Store the state graph in Graphviz dot format.
    #[arg(short = 'g', long = "save-graph")]
    save_graph: bool,

    /// Store the best- and worst-case response times.
    #[arg(short = 'r', long = "save-response-times")]
    save_response_times: bool,

    /// Do not abort the analysis on the first deadline miss.
    #[arg(short = 'c', long = "continue-after-deadline-miss")]
    continue_after_deadline_miss: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TimeModel {
    Dense,
    Discrete,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("{0}")]
    Exploration(#[from] ExplorationError),
    #[error("{0}")]
    Csv(#[from] csv::Error),
}

fn exit_code(error: &CliError) -> i32 {
    match error {
        CliError::Exploration(ExplorationError::InvalidJobReference(_)) => 3,
        _ => 1,
    }
}

fn main() {
    SimpleLogger::new()
        .with_level(LevelFilter::Warn)
        .env()
        .init()
        .ok();

    let args = Args::parse();

    if args.num_processors == 0 || args.num_processors > MAX_PROCESSORS {
        eprintln!("Error: invalid number of processors");
        exit(1);
    }

    let max_depth = match args.depth {
        None => 0,
        Some(depth) if depth >= 2 => depth - 1,
        Some(_) => {
            eprintln!("Error: invalid depth argument");
            exit(1);
        }
    };

    if args.save_graph && !cfg!(feature = "schedule-graph") {
        eprintln!(
            "Error: graph collection support must be enabled during \
             compilation (the schedule-graph feature is not set)."
        );
        exit(2);
    }

    if args.header {
        print_header();
    }

    let opts = AnalysisOptions {
        timeout: args.timeout,
        max_depth,
        be_naive: args.naive,
        early_exit: !args.continue_after_deadline_miss,
        ..AnalysisOptions::default()
    };

    let inputs = if args.inputs.is_empty() {
        vec!["-".to_string()]
    } else {
        args.inputs.clone()
    };

    for input in &inputs {
        let status = match args.time_model {
            TimeModel::Discrete => process_file::<Discrete>(input, &args, &opts),
            TimeModel::Dense => process_file::<Dense>(input, &args, &opts),
        };
        if let Err(error) = status {
            eprintln!("{input}: {error}");
            exit(exit_code(&error));
        }
    }
}

fn process_file<T>(path: &str, args: &Args, opts: &AnalysisOptions) -> Result<(), CliError>
where
    T: Time + DeserializeOwned,
{
    let content = if path == "-" {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(path)?
    };

    let mut dag = parse_dag::<T>(&content, args.worst_case)?;
    let outcome = analyze_dag(&mut dag, args.num_processors, opts, DataAgeOptions::default())?;

    if args.save_response_times && path != "-" {
        let jobs = generate_job_set(&dag);
        let file = fs::File::create(derived_name(path, ".rta.csv"))?;
        write_response_times(file, &jobs, &outcome.finish_times)?;
    }

    #[cfg(feature = "schedule-graph")]
    if args.save_graph && path != "-" {
        fs::write(
            derived_name(path, ".dot"),
            format!("digraph G {{\n{}}}\n", outcome.graph),
        )?;
    }

    if !outcome.chain_latencies.is_empty() {
        let mut sink = DataAgeCsv::append("results_DA.csv")?;
        for chain in &outcome.chain_latencies {
            sink.record(&format!("{path} - {}", chain.chain_index), chain.data_age)?;
        }
    }

    print_summary(path, args, &outcome);
    Ok(())
}

/// Derive an output file name by replacing a `.yaml` suffix.
fn derived_name(path: &str, suffix: &str) -> String {
    match path.strip_suffix(".yaml") {
        Some(stem) => format!("{stem}{suffix}"),
        None => format!("{path}{suffix}"),
    }
}

fn print_header() {
    println!(
        "# file name, schedulable?, #jobs, #states, #edges, max width, \
         CPU time, memory, timeout, #CPUs"
    );
}

fn print_summary<T: Time>(path: &str, args: &Args, outcome: &RunOutcome<T>) {
    // a depth-limited run that did not cover every job is marked
    // invalid rather than reported as a verdict
    let verdict = match args.depth {
        Some(depth) if depth - 1 < outcome.number_of_jobs => "X".to_string(),
        _ => (outcome.schedulable as i32).to_string(),
    };
    println!(
        "{}, {}, {}, {}, {}, {}, {:.6}, {}, {}, {}",
        path,
        verdict,
        outcome.number_of_jobs,
        outcome.number_of_states,
        outcome.number_of_edges,
        outcome.max_width,
        outcome.cpu_time,
        peak_rss_kb(),
        outcome.timed_out as i32,
        args.num_processors
    );
}

/// Peak resident set size in KB, or 0 where unavailable.
fn peak_rss_kb() -> u64 {
    let Ok(status) = fs::read_to_string("/proc/self/status") else {
        return 0;
    };
    status
        .lines()
        .find(|line| line.starts_with("VmHWM:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse().ok())
        .unwrap_or(0)
}
