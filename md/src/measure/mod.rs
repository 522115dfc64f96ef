//! Online measurements driven by the step loop.
//!
//! Every measurement sees every step; each one gates its own work on its sample and
//! output intervals.

pub mod binning;
pub mod eigen;
pub mod modal;
pub mod reduce;
pub mod spectrum;
pub mod vac;

pub use binning::ModeBinning;
pub use eigen::ModeBasis;
pub use modal::{BinningMode, HnemaPhase, ModalAnalysis, ModalMethod, ModalSettings};
pub use vac::{CorrelationMode, Vac, VacSettings};

use crate::atom::AtomState;
use crate::error::MdResult;
use crate::units::Units;
use nalgebra::Vector3;
use std::fs::{self, File, OpenOptions};
use std::io::BufWriter;
use std::path::Path;

/// Run-wide quantities a measurement may need besides the atoms.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub units: &'a Units,
    /// integration time step in natural time units
    pub time_step: f64,
    /// target temperature in K
    pub temperature: f64,
    /// cell volume in Å³
    pub volume: f64,
    /// HNEMD driving force in 1/Å
    pub driving_force: Vector3<f64>,
    pub output_dir: &'a Path,
}

pub trait Measure {
    fn preprocess(&mut self, ctx: &StepContext, atoms: &AtomState) -> MdResult<()>;

    /// Called after the forces and velocities of `step` (0-based) are final.
    fn process(&mut self, step: usize, ctx: &StepContext, atoms: &AtomState) -> MdResult<()>;

    fn postprocess(&mut self, ctx: &StepContext) -> MdResult<()>;
}

/// Open `name` in `dir` for appending, creating both if needed.
pub(crate) fn open_append(dir: &Path, name: &str) -> MdResult<BufWriter<File>> {
    fs::create_dir_all(dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(name))?;
    Ok(BufWriter::new(file))
}

#[cfg(test)]
mod tests;
