//! Logging setup and the end-of-run report

use md::Thermo;
use std::fmt;
use std::fs::File;
use std::time::SystemTime as StdSystemTime;
use tracing::info;
use tracing_subscriber::{
    fmt::format::Writer, fmt::layer, fmt::time::FormatTime, layer::SubscriberExt,
    util::SubscriberInitExt, Registry,
};

/// Custom time formatter that shows only seconds
struct SecondPrecisionTimer;

impl FormatTime for SecondPrecisionTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        let now = StdSystemTime::now();
        let duration = now
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();

        // HH:MM:SS
        let total_seconds = duration.as_secs();
        let hours = (total_seconds / 3600) % 24;
        let minutes = (total_seconds / 60) % 60;
        let seconds = total_seconds % 60;

        write!(w, "{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}

/// Setup output logging to file or stdout
pub fn setup_output(output_path: Option<&String>) {
    match output_path {
        Some(path) => {
            if let Ok(log) = File::create(path) {
                let file_layer = layer()
                    .with_writer(log)
                    .with_timer(SecondPrecisionTimer)
                    .with_ansi(false);
                Registry::default().with(file_layer).init();
                info!("Output will be written to: {}", path);
            } else {
                eprintln!("Could not create output file: {}", path);
            }
        }
        None => {
            let stdout_layer = layer()
                .with_writer(std::io::stdout)
                .with_timer(SecondPrecisionTimer)
                .with_ansi(true);
            Registry::default().with(stdout_layer).init();
        }
    }
}

/// Averages over the recorded thermo lines, skipping the initial state
pub fn report_summary(thermo: &[Thermo]) {
    let Some((first, rest)) = thermo.split_first() else {
        return;
    };
    if rest.is_empty() {
        return;
    }
    let n = rest.len() as f64;
    let mean_temperature = rest.iter().map(|t| t.temperature).sum::<f64>() / n;
    let mean_potential = rest.iter().map(|t| t.potential_energy).sum::<f64>() / n;
    let drift = rest
        .iter()
        .map(|t| (t.total_energy() - first.total_energy()).abs())
        .fold(0.0, f64::max);
    info!("Run summary over {} thermo samples:", rest.len());
    info!("  <T>  = {:.3} K", mean_temperature);
    info!("  <Ep> = {:.6} eV", mean_potential);
    info!("  max |E - E0| = {:.3e} eV", drift);
}
