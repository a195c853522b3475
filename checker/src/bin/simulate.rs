use std::{
    path::PathBuf,
    sync::{Arc, Mutex, mpsc},
};

use checker::{DecisionTally, Mode, TrialRecord, timestamp_string};
use clap::Parser;
use colored::Colorize;
use csv::Writer;
use rand::Rng;
use sprt_core::params::{Alternative, Decision, TestParams};
use sprt_core::sample_size::{sequential_asn, two_sample_sequential_asn};
use sprt_core::simulation::{RngSource, run_one_sample, run_two_sample};

#[derive(Parser, Debug, Clone)]
struct Args {
    #[arg(short, long, default_value = "one-sample")]
    mode: Mode,
    #[arg(short = 'A', long, default_value = "greater")]
    alternative: Alternative,

    #[arg(long, default_value_t = 0.1)]
    p0: f64,
    #[arg(long, default_value_t = 0.02)]
    d: f64,
    #[arg(long, default_value_t = 0.05)]
    alpha: f64,
    #[arg(long, default_value_t = 0.2)]
    beta: f64,

    /// True success probability (first arm in two-sample mode).
    #[arg(short, long)]
    p: f64,
    /// True second-arm probability; defaults to --p.
    #[arg(long)]
    p2: Option<f64>,

    #[arg(short, long, default_value_t = 1000)]
    trials: usize,
    #[arg(short, long, default_value_t = 1000)]
    batch_size: usize,
    /// Stop undecided trials after this many batches.
    #[arg(long)]
    max_chunks: Option<u64>,
    /// Base RNG seed; random when omitted.
    #[arg(short, long)]
    seed: Option<u64>,
    #[arg(short, long)]
    workers: Option<usize>,

    #[arg(short, long, default_value = "tmp/simulate.csv")]
    out: PathBuf,
}

#[derive(Clone, Copy, Debug)]
struct Job {
    start: usize,
    count: usize,
    seed: u64,
}

enum WorkerMessage {
    Records(Vec<TrialRecord>),
    Failed(String),
    Done,
}

fn simulation_worker(
    jobs_queue: Arc<Mutex<Vec<Job>>>,
    args: Args,
    params: TestParams,
    result_channel: mpsc::Sender<WorkerMessage>,
) {
    loop {
        let job = {
            let mut queue = jobs_queue.lock().unwrap();
            queue.pop()
        };
        let Some(job) = job else {
            break;
        };

        let mut source = RngSource::seeded(job.seed);
        let records = match args.mode {
            Mode::OneSample => run_one_sample(
                &mut source,
                args.p,
                job.count,
                args.batch_size,
                &params,
                args.max_chunks,
            )
            .map(|run| {
                (0..job.count)
                    .map(|i| {
                        TrialRecord::new(
                            job.start + i,
                            run.decision[i],
                            run.duration[i],
                            run.successes[i],
                            None,
                        )
                    })
                    .collect::<Vec<_>>()
            }),
            Mode::TwoSample => run_two_sample(
                &mut source,
                args.p,
                args.p2.unwrap_or(args.p),
                job.count,
                args.batch_size,
                &params,
                args.max_chunks,
            )
            .map(|run| {
                (0..job.count)
                    .map(|i| {
                        TrialRecord::new(
                            job.start + i,
                            run.decision[i],
                            run.duration[i],
                            run.first_successes[i],
                            Some(run.second_successes[i]),
                        )
                    })
                    .collect::<Vec<_>>()
            }),
        };

        let message = match records {
            Ok(records) => WorkerMessage::Records(records),
            Err(e) => WorkerMessage::Failed(e.to_string()),
        };
        if result_channel.send(message).is_err() {
            break;
        }
    }
}

/// The error budget the run can be held against, when the true
/// parameter sits exactly at the null or at the alternative.
fn budget_line(
    args: &Args,
    params: &TestParams,
    tally: &DecisionTally,
) -> Option<(&'static str, f64, f64)> {
    let effect = match args.mode {
        Mode::OneSample => args.p - params.p0,
        Mode::TwoSample => args.p - args.p2.unwrap_or(args.p),
    };
    let reject_rate = match params.alternative {
        Alternative::Greater => tally.rate(Decision::AcceptHigh),
        Alternative::Less => tally.rate(Decision::AcceptLow),
        Alternative::TwoSided => {
            tally.rate(Decision::AcceptGreater) + tally.rate(Decision::AcceptLess)
        }
    };
    let null_rate = match params.alternative {
        Alternative::Greater => tally.rate(Decision::AcceptLow),
        Alternative::Less => tally.rate(Decision::AcceptHigh),
        Alternative::TwoSided => tally.rate(Decision::AcceptNull),
    };

    let at_alternative = match params.alternative {
        Alternative::Greater => (effect - params.d).abs() < 1e-12,
        Alternative::Less => (effect + params.d).abs() < 1e-12,
        Alternative::TwoSided => (effect.abs() - params.d).abs() < 1e-12,
    };
    if effect.abs() < 1e-12 {
        Some(("false rejection rate", reject_rate, params.alpha))
    } else if at_alternative {
        Some(("missed effect rate", null_rate, params.beta))
    } else {
        None
    }
}

fn print_summary(args: &Args, params: &TestParams, tally: &DecisionTally) {
    eprintln!();
    eprintln!(
        "{}",
        format!(
            "{} {} test, p0={} d={} alpha={} beta={}",
            args.mode, params.alternative, params.p0, params.d, params.alpha, params.beta
        )
        .bold()
    );
    let truth = match args.mode {
        Mode::OneSample => format!("true p = {}", args.p),
        Mode::TwoSample => format!("true p = {} vs {}", args.p, args.p2.unwrap_or(args.p)),
    };
    eprintln!("{truth}, {} trials", tally.total());

    for decision in [
        Decision::AcceptLow,
        Decision::AcceptHigh,
        Decision::AcceptGreater,
        Decision::AcceptLess,
        Decision::AcceptNull,
        Decision::Continue,
    ] {
        let count = tally.count(decision);
        if count > 0 {
            eprintln!("  {decision:>14}: {count:>6}  ({:.4})", tally.rate(decision));
        }
    }

    if let Some((label, rate, budget)) = budget_line(args, params, tally) {
        let line = format!("{label}: {rate:.4} vs budget {budget}");
        if rate <= budget * 1.5 {
            eprintln!("{}", line.green());
        } else {
            eprintln!("{}", line.red());
        }
    }

    let asn = match args.mode {
        Mode::OneSample => sequential_asn(args.p, params).ok().map(|n| n as f64),
        Mode::TwoSample => two_sample_sequential_asn(args.p, params).ok(),
    };
    match asn {
        Some(asn) => {
            let line = format!(
                "mean duration {:.1} vs expected {asn:.1}",
                tally.mean_duration()
            );
            if tally.mean_duration() <= asn * 1.2 {
                eprintln!("{}", line.green());
            } else {
                eprintln!("{}", line.yellow());
            }
        }
        None => eprintln!("mean duration {:.1} (no closed-form expectation)", tally.mean_duration()),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let params = TestParams::new(args.p0, args.d, args.alpha, args.beta, args.alternative)?;

    let num_workers = args
        .workers
        .unwrap_or_else(|| (num_cpus::get() / 2).max(1));
    let base_seed = args.seed.unwrap_or_else(|| rand::rng().random());
    let job_size = (args.trials / (num_workers * 4)).max(1);
    let mut jobs = Vec::new();
    let mut start = 0;
    while start < args.trials {
        let count = job_size.min(args.trials - start);
        jobs.push(Job {
            start,
            count,
            seed: base_seed.wrapping_add(jobs.len() as u64),
        });
        start += count;
    }
    let jobs_queue = Arc::new(Mutex::new(jobs));

    if let Some(parent) = args.out.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut writer = Writer::from_path(&args.out)?;

    eprintln!("Starting {num_workers} workers at {}", timestamp_string());
    let (tx, rx) = mpsc::channel::<WorkerMessage>();
    for _ in 0..num_workers {
        let tx = tx.clone();
        let jobs_queue = Arc::clone(&jobs_queue);
        let args = args.clone();
        std::thread::spawn(move || {
            simulation_worker(jobs_queue, args, params, tx.clone());
            tx.send(WorkerMessage::Done).ok();
        });
    }
    drop(tx);

    let mut tally = DecisionTally::default();
    let mut done_workers_count = 0;
    loop {
        let msg = rx.recv()?;
        match msg {
            WorkerMessage::Records(records) => {
                for record in &records {
                    tally.add(record);
                    writer.serialize(record)?;
                }
                writer.flush()?;
                eprintln!(
                    "{} reported: {}/{}",
                    timestamp_string(),
                    tally.total(),
                    args.trials
                );
            }
            WorkerMessage::Failed(message) => {
                return Err(message.into());
            }
            WorkerMessage::Done => {
                done_workers_count += 1;
                if done_workers_count >= num_workers {
                    break;
                }
            }
        }
    }

    print_summary(&args, &params, &tally);
    std::fs::write(
        args.out.with_extension("json"),
        serde_json::to_string_pretty(&tally)?,
    )?;
    Ok(())
}
// cargo run -p checker --bin simulate -r -- -m one-sample -A greater -p 0.1 -t 2000
