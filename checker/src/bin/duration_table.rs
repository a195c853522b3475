use std::path::PathBuf;

use checker::Mode;
use clap::Parser;
use colored::Colorize;
use csv::Writer;
use serde::Serialize;
use sprt_core::params::{Alternative, TestParams};
use sprt_core::sample_size::{
    classic_sample_size, classic_two_sample_size, maximin_asn, operating_characteristic,
    sequential_asn, two_sample_maximin_asn, two_sample_sequential_asn,
};

#[derive(Parser, Debug)]
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

    /// Grid points across [p_low, p_high], endpoints included.
    #[arg(short, long, default_value_t = 21)]
    rows: usize,

    #[arg(short, long, default_value = "tmp/duration_table.csv")]
    out: PathBuf,
}

#[derive(Serialize)]
struct TableRow {
    p: f64,
    oc: f64,
    asn: f64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let params = TestParams::new(args.p0, args.d, args.alpha, args.beta, args.alternative)?;
    if !params.alternative.is_one_sided() {
        return Err("the two-sided composite has no closed-form duration curve".into());
    }
    if args.rows < 2 {
        return Err("need at least two grid rows".into());
    }

    // Band of true probabilities and the budgets attached to the low
    // and high boundaries of the one-sided test.
    let (p_low, p_high, alpha_low, alpha_high) = match params.alternative {
        Alternative::Less => (params.p0 - params.d, params.p0, params.alpha, params.beta),
        _ => (params.p0, params.p0 + params.d, params.beta, params.alpha),
    };

    let mut table = Vec::with_capacity(args.rows);
    for i in 0..args.rows {
        // Endpoints must hit the thresholds exactly for the closed-form
        // drift roots to apply.
        let p = if i == args.rows - 1 {
            p_high
        } else {
            p_low + (p_high - p_low) * i as f64 / (args.rows - 1) as f64
        };
        let oc = operating_characteristic(p, p_low, p_high, alpha_low, alpha_high)?;
        let asn = match args.mode {
            Mode::OneSample => sequential_asn(p, &params)? as f64,
            Mode::TwoSample => two_sample_sequential_asn(p, &params)?,
        };
        table.push(TableRow { p, oc, asn });
    }

    if let Some(parent) = args.out.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut writer = Writer::from_path(&args.out)?;
    for row in &table {
        writer.serialize(row)?;
    }
    writer.flush()?;

    println!(
        "{}",
        format!(
            "{} {} test, p0={} d={} alpha={} beta={}",
            args.mode, params.alternative, params.p0, params.d, params.alpha, params.beta
        )
        .bold()
    );
    println!("{:>10} {:>10} {:>12}", "p", "oc", "asn");
    for row in &table {
        println!("{:>10.5} {:>10.4} {:>12.1}", row.p, row.oc, row.asn);
    }

    let classic = match args.mode {
        Mode::OneSample => classic_sample_size(&params)?,
        Mode::TwoSample => classic_two_sample_size(&params)?,
    };
    println!("classic fixed-horizon size: {classic}");
    match args.mode {
        Mode::OneSample => {
            let (worst_asn, worst_p) = maximin_asn(&params)?;
            println!(
                "{}",
                format!("worst-case expected duration: {worst_asn} at p = {worst_p:.5}").yellow()
            );
        }
        Mode::TwoSample => {
            let worst_asn = two_sample_maximin_asn(&params)?;
            println!(
                "{}",
                format!("worst-case expected per-arm duration: {worst_asn:.1}").yellow()
            );
        }
    }

    Ok(())
}
// cargo run -p checker --bin duration_table -r -- -A greater --p0 0.1 --d 0.02
