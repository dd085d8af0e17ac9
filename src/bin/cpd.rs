//! `cpd` CLI driver — ingest a `.tns` tensor, run CPD-ALS, and emit the
//! recovered factor matrices and lambda vector.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use hacoo_core::cpd::{cpd_als_with_progress, Algorithm};
use hacoo_core::ingest::{read_tns, Base};
use hacoo_core::runtime;

struct Args {
    tensor_path: String,
    rank: usize,
    max_iter: usize,
    tol: f64,
    base: Base,
    out_tsv: bool,
}

fn usage() -> &'static str {
    "usage: cpd <tensor.tns> [--rank R] [--max_iter N] [--tol EPS] [--base 0|1] [--tsv]"
}

fn parse_args() -> Result<Args> {
    let mut args = std::env::args().skip(1);
    let tensor_path = args.next().with_context(|| usage().to_string())?;

    let mut rank = 2usize;
    let mut max_iter = 200usize;
    let mut tol = 1e-8;
    let mut base = Base::Zero;
    let mut out_tsv = false;

    while let Some(flag) = args.next() {
        match flag.as_str() {
            "--rank" => {
                rank = args.next().context("--rank requires a value")?.parse().context("--rank must be an integer")?;
            }
            "--max_iter" => {
                max_iter = args
                    .next()
                    .context("--max_iter requires a value")?
                    .parse()
                    .context("--max_iter must be an integer")?;
            }
            "--tol" => {
                tol = args.next().context("--tol requires a value")?.parse().context("--tol must be a float")?;
            }
            "--base" => {
                let v = args.next().context("--base requires 0 or 1")?;
                base = match v.as_str() {
                    "0" => Base::Zero,
                    "1" => Base::One,
                    other => bail!("--base must be 0 or 1, got {other:?}"),
                };
            }
            "--tsv" => out_tsv = true,
            other => bail!("unrecognized flag {other:?}\n{}", usage()),
        }
    }

    Ok(Args {
        tensor_path,
        rank,
        max_iter,
        tol,
        base,
        out_tsv,
    })
}

fn write_tsv_outputs(factors: &[hacoo_core::Matrix], lambda: &[f64]) -> Result<()> {
    for (mode, factor) in factors.iter().enumerate() {
        let path = format!("factor_mode_{mode}.tsv");
        let file = File::create(&path).with_context(|| format!("creating {path}"))?;
        let mut w = BufWriter::new(file);
        for r in 0..factor.rows() {
            let row: Vec<String> = (0..factor.cols()).map(|c| factor.get(r, c).to_string()).collect();
            writeln!(w, "{}", row.join("\t"))?;
        }
    }

    let file = File::create("lambdas.tsv").context("creating lambdas.tsv")?;
    let mut w = BufWriter::new(file);
    for &v in lambda {
        writeln!(w, "{v}")?;
    }
    Ok(())
}

fn print_stdout(factors: &[hacoo_core::Matrix], lambda: &[f64]) {
    println!("lambda: {lambda:?}");
    for (mode, factor) in factors.iter().enumerate() {
        println!("factor mode {mode} ({}x{}):", factor.rows(), factor.cols());
        for r in 0..factor.rows() {
            let row: Vec<String> = (0..factor.cols()).map(|c| format!("{:.6}", factor.get(r, c))).collect();
            println!("  {}", row.join(" "));
        }
    }
}

fn run() -> Result<()> {
    runtime::init_logging();
    let args = parse_args()?;

    let file = File::open(&args.tensor_path).with_context(|| format!("opening {}", args.tensor_path))?;
    let tensor = read_tns(BufReader::new(file), args.base).with_context(|| format!("parsing {}", args.tensor_path))?;
    log::info!(
        "loaded tensor: dims={:?} nnz={} nbuckets={}",
        tensor.dims(),
        tensor.nnz(),
        tensor.nbuckets()
    );

    runtime::configure_thread_pool();
    let num_threads = runtime::resolve_thread_count();

    let progress = ProgressBar::new(args.max_iter as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40} iter {pos}/{len} fit={msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let result = cpd_als_with_progress(
        &tensor,
        args.rank,
        args.max_iter,
        args.tol,
        Algorithm::Parallel { num_threads },
        |iter, fit| {
            progress.set_position(iter as u64);
            progress.set_message(format!("{fit:.6}"));
        },
    )
    .context("CPD-ALS failed")?;
    progress.finish_and_clear();

    log::info!(
        "cpd-als finished: iterations={} fit={:.6}",
        result.iterations_run,
        result.final_fit
    );

    if args.out_tsv {
        write_tsv_outputs(&result.factors, &result.lambda)?;
        println!("wrote factor_mode_<k>.tsv and lambdas.tsv");
    } else {
        print_stdout(&result.factors, &result.lambda);
    }

    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("cpd: error: {err:#}");
        std::process::exit(1);
    }
}
