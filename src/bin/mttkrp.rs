//! `mttkrp` CLI — benchmark or verify the MTTKRP kernel against a `.tns`
//! tensor, mirroring the original library's bench/verify harness.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::time::Instant;

use anyhow::{bail, Context, Result};

use hacoo_core::ingest::{read_tns, Base};
use hacoo_core::matrix::Matrix;
use hacoo_core::mttkrp::{mttkrp_parallel, mttkrp_serial};
use hacoo_core::runtime;
use hacoo_core::table::Tensor;

/// Relative tolerance for verify mode, matching `matrix.c`'s `are_equal`.
const EPSILON: f64 = 1.0e-2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModeSelector {
    All,
    One(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Algo {
    Serial,
    Parallel,
}

struct Args {
    input: String,
    base: Base,
    rank: usize,
    mode: ModeSelector,
    algo: Algo,
    threads: usize,
    iterations: usize,
    bench: bool,
    factors_path: Option<String>,
    expected_path: Option<String>,
}

fn usage() -> &'static str {
    "usage: mttkrp -i <tensor.tns> [-z] [-r RANK] [-m MODE|all] [-a serial|parallel] \
     [-t THREADS] [-n ITER] [-b] [-f FACTORS] [-e EXPECTED]"
}

fn parse_args() -> Result<Args> {
    let mut input = None;
    let mut base = Base::One;
    let mut rank = 16usize;
    let mut mode = ModeSelector::All;
    let mut algo = Algo::Serial;
    let mut threads = 1usize;
    let mut iterations = 1usize;
    let mut bench = false;
    let mut factors_path = None;
    let mut expected_path = None;

    let mut args = std::env::args().skip(1);
    while let Some(flag) = args.next() {
        match flag.as_str() {
            "-i" | "--input" => input = Some(args.next().context("-i requires a path")?),
            "-z" | "--zero-based" => base = Base::Zero,
            "-r" | "--rank" => rank = args.next().context("-r requires a value")?.parse().context("-r must be an integer")?,
            "-m" | "--target-mode" => {
                let v = args.next().context("-m requires a value or 'all'")?;
                mode = if v == "all" {
                    ModeSelector::All
                } else {
                    ModeSelector::One(v.parse().context("-m must be an integer or 'all'")?)
                };
            }
            "-a" | "--algorithm" => {
                let v = args.next().context("-a requires serial|parallel")?;
                algo = match v.as_str() {
                    "serial" => Algo::Serial,
                    "parallel" => Algo::Parallel,
                    other => bail!("-a must be serial or parallel, got {other:?}"),
                };
            }
            "-t" | "--number-threads" => {
                threads = args.next().context("-t requires a value")?.parse().context("-t must be an integer")?;
            }
            "-n" | "--iterations" => {
                iterations = args.next().context("-n requires a value")?.parse().context("-n must be an integer")?;
            }
            "-b" | "--bench" => bench = true,
            "-f" | "--factors" => factors_path = Some(args.next().context("-f requires a path")?),
            "-e" | "--expected" => expected_path = Some(args.next().context("-e requires a path")?),
            "-h" | "--help" => {
                println!("{}", usage());
                std::process::exit(0);
            }
            other => bail!("unrecognized flag {other:?}\n{}", usage()),
        }
    }

    Ok(Args {
        input: input.with_context(|| format!("missing -i <tensor.tns>\n{}", usage()))?,
        base,
        rank,
        mode,
        algo,
        threads,
        iterations,
        bench,
        factors_path,
        expected_path,
    })
}

fn load_tensor(path: &str, base: Base) -> Result<Tensor> {
    let file = File::open(path).with_context(|| format!("opening {path}"))?;
    read_tns(BufReader::new(file), base).with_context(|| format!("parsing {path}"))
}

/// Parses the factor-matrix file format: repeated `rows cols` headers
/// followed by rows*cols whitespace-separated doubles, one matrix per
/// block, in order.
fn read_factor_matrices(path: &str) -> Result<Vec<Matrix>> {
    let file = File::open(path).with_context(|| format!("opening {path}"))?;
    let reader = BufReader::new(file);
    let tokens: Vec<String> = reader
        .lines()
        .collect::<std::io::Result<Vec<_>>>()?
        .iter()
        .flat_map(|l| l.split_whitespace().map(str::to_string).collect::<Vec<_>>())
        .collect();

    let mut matrices = Vec::new();
    let mut cursor = 0usize;
    while cursor < tokens.len() {
        if cursor + 1 >= tokens.len() {
            bail!("factor file truncated: expected a column count after row count {:?}", tokens[cursor]);
        }
        let rows: usize = tokens[cursor].parse().context("expected row count")?;
        let cols: usize = tokens[cursor + 1].parse().context("expected column count")?;
        cursor += 2;
        let needed = rows * cols;
        let available = tokens.len() - cursor;
        if available < needed {
            bail!("factor file truncated: expected {needed} values, found {available}");
        }
        let mut values = Vec::with_capacity(needed);
        for _ in 0..needed {
            values.push(tokens[cursor].parse::<f64>().context("expected a double")?);
            cursor += 1;
        }
        matrices.push(Matrix::from_rows(rows, cols, &values));
    }
    Ok(matrices)
}

fn are_equal(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON * a.abs().max(b.abs()).max(1.0)
}

fn run_bench(args: &Args, tensor: &Tensor, factors: &[Matrix]) -> Result<()> {
    let modes: Vec<usize> = match args.mode {
        ModeSelector::All => (0..tensor.ndims()).collect(),
        ModeSelector::One(m) => vec![m],
    };

    for mode in modes {
        let start = Instant::now();
        for _ in 0..args.iterations {
            let _ = match args.algo {
                Algo::Serial => mttkrp_serial(tensor, factors, mode)?,
                Algo::Parallel => mttkrp_parallel(tensor, factors, mode, args.threads)?,
            };
        }
        let elapsed = start.elapsed().as_secs_f64();
        println!(
            "mode={mode} algo={:?} threads={} iterations={} total={:.6}s avg={:.6}s",
            args.algo,
            args.threads,
            args.iterations,
            elapsed,
            elapsed / args.iterations as f64
        );
    }
    Ok(())
}

fn run_verify(args: &Args, tensor: &Tensor, factors: &[Matrix]) -> Result<()> {
    let expected_path = args
        .expected_path
        .as_ref()
        .context("verify mode requires -e <expected_mttkrp_file>")?;
    let expected = read_factor_matrices(expected_path)?;

    let modes: Vec<usize> = match args.mode {
        ModeSelector::All => (0..tensor.ndims()).collect(),
        ModeSelector::One(m) => vec![m],
    };

    let mut all_ok = true;
    for &mode in &modes {
        let got = match args.algo {
            Algo::Serial => mttkrp_serial(tensor, factors, mode)?,
            Algo::Parallel => mttkrp_parallel(tensor, factors, mode, args.threads)?,
        };
        let want = expected.get(mode).with_context(|| format!("no expected matrix for mode {mode}"))?;

        let mut mismatches = 0;
        for r in 0..got.rows() {
            for c in 0..got.cols() {
                if !are_equal(got.get(r, c), want.get(r, c)) {
                    mismatches += 1;
                }
            }
        }
        if mismatches == 0 {
            println!("mode {mode}: OK ({} x {})", got.rows(), got.cols());
        } else {
            println!("mode {mode}: MISMATCH ({mismatches} entries differ by more than epsilon={EPSILON})");
            all_ok = false;
        }
    }

    if !all_ok {
        bail!("mttkrp verification failed");
    }
    Ok(())
}

fn run() -> Result<()> {
    runtime::init_logging();
    let args = parse_args()?;
    runtime::configure_thread_pool();

    let tensor = load_tensor(&args.input, args.base)?;
    log::info!(
        "loaded tensor: dims={:?} nnz={} nbuckets={}",
        tensor.dims(),
        tensor.nnz(),
        tensor.nbuckets()
    );

    let factors = match &args.factors_path {
        Some(path) => read_factor_matrices(path)?,
        None => tensor
            .dims()
            .iter()
            .map(|&d| Matrix::from_rows(d as usize, args.rank, &vec![1.0; d as usize * args.rank]))
            .collect(),
    };

    if args.bench {
        run_bench(&args, &tensor, &factors)
    } else {
        run_verify(&args, &tensor, &factors)
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("mttkrp: error: {err:#}");
        std::process::exit(1);
    }
}
