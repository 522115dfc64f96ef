//! Command-line argument parsing

use clap::Parser;

/// Stillinger-Weber molecular dynamics with YAML configuration
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "run.yaml")]
    pub config_file: String,

    /// Override output file: (default stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Override total number of steps
    #[arg(long)]
    pub steps: Option<usize>,

    /// Override the seed of Maxwell-Boltzmann initial velocities
    #[arg(long)]
    pub seed: Option<u64>,
}
