//! Document n-gram demo — tokenizes a text file and stores n-gram
//! co-occurrence counts in a [`Tensor`], showing `ingest`-adjacent code
//! consuming the HaCOO API without going through the `.tns` format.

use std::fs;

use ahash::AHashMap;
use anyhow::{Context, Result};
use itertools::Itertools;

use hacoo_core::table::Tensor;

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|tok| !tok.is_empty())
        .map(|tok| tok.to_lowercase())
        .collect()
}

fn run() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let path = args.next().context("usage: ngram-demo <text-file> [n]")?;
    let n: usize = args.next().map(|s| s.parse()).transpose().context("n must be an integer")?.unwrap_or(2);

    let text = fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let tokens = tokenize(&text);

    let vocab: Vec<String> = tokens.iter().cloned().unique().sorted().collect();
    let index_of: AHashMap<&str, u32> = vocab.iter().enumerate().map(|(i, tok)| (tok.as_str(), i as u32)).collect();

    let dims = vec![vocab.len() as u32; n];
    let mut tensor = Tensor::with_defaults(dims)?;

    for window in tokens.windows(n) {
        let coord: Vec<u32> = window.iter().map(|tok| index_of[tok.as_str()]).collect();
        let prior = tensor.get(&coord)?;
        tensor.set(&coord, prior + 1.0)?;
    }

    println!("vocabulary size: {}", vocab.len());
    println!("{n}-gram nonzeros: {}", tensor.nnz());

    let mut counts = Vec::new();
    tensor.iterate_coords(|coord, value| counts.push((coord, value)));
    counts.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
    for (coord, value) in counts.into_iter().take(10) {
        let words: Vec<&str> = coord.iter().map(|&i| vocab[i as usize].as_str()).collect();
        println!("  {:>5}  {}", value, words.join(" "));
    }

    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("ngram-demo: error: {err:#}");
        std::process::exit(1);
    }
}
