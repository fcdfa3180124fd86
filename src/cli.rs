//! # Command line interface
use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

fn sample_name_from_path(path: &str) -> Result<String> {
    std::path::Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .with_context(|| format!("could not infer sample name from path '{path}'"))
}

fn threads_in_range(s: &str) -> Result<usize> {
    let threads: usize = s.parse().context("could not parse value passed to --threads as an integer")?;
    if threads < 1 {
        bail!("--threads must be at least 1");
    }
    Ok(threads)
}

#[derive(Parser)]
#[command(
    name = "repeatgt",
    author,
    version,
    about = "Repeat and small-variant genotyping from paired-end alignments",
    long_about = None
)]
pub struct Cli {
    /// Alignment file to genotype. Can be SAM/BAM/CRAM.
    #[arg(short, long)]
    pub alignment: String,

    /// Variant catalog describing the loci to genotype. Expected format is JSON.
    #[arg(short, long)]
    pub catalog: String,

    /// Reference genome (FASTA, not gzipped; an index must exist alongside it).
    /// Required when the alignment file is in CRAM format.
    #[arg(long)]
    pub reference: Option<String>,

    /// Sample name. Inferred from the alignment file name if not given.
    #[arg(long)]
    pub sample: Option<String>,

    /// Whether the sample is female (affects expected allele counts on chrX/chrY).
    #[arg(long)]
    pub female: bool,

    /// Number of worker threads to use.
    #[arg(long, default_value_t = 1, value_parser = threads_in_range)]
    pub threads: usize,
}

impl Cli {
    pub fn sample_name(&self) -> Result<String> {
        if let Some(name) = &self.sample {
            Ok(name.clone())
        } else {
            let name = sample_name_from_path(&self.alignment)?;
            info!("inferring sample name from filename: {name}");
            Ok(name)
        }
    }
}
