//! Modal decomposition of the heat current (GKMA and HNEMA).
//!
//! Velocities and per-atom virials are projected onto a phonon basis. Each mode
//! gets a five-component heat current (x-in, x-out, y-in, y-out, z), and modes are
//! summed into bins by index or by frequency.

use super::binning::ModeBinning;
use super::eigen::ModeBasis;
use super::reduce::{segmented_reduce, tree_reduce};
use super::{open_append, Measure, StepContext};
use crate::atom::AtomState;
use crate::error::{MdError, MdResult};
use nalgebra::Vector3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info};

pub const NUM_COMPONENTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModalMethod {
    /// equilibrium: instantaneous modal heat currents
    Gkma,
    /// driven: block-averaged modal conductivity
    Hnema,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BinningMode {
    Index { bin_size: usize },
    /// bin width in THz
    Frequency { width: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModalSettings {
    pub method: ModalMethod,
    pub sample_interval: usize,
    /// HNEMA only: steps per output block
    #[serde(default = "default_output_interval")]
    pub output_interval: usize,
    /// first and last mode to use, 1-based and inclusive
    pub first_mode: usize,
    pub last_mode: usize,
    pub eigenvector_file: PathBuf,
    pub binning: BinningMode,
    /// `(grouping method, group id)` of the participating atoms; all atoms when absent
    #[serde(default)]
    pub group: Option<(usize, usize)>,
}

fn default_output_interval() -> usize {
    1000
}

impl ModalSettings {
    pub fn validate(&self) -> MdResult<()> {
        if self.sample_interval == 0 {
            return Err(MdError::Config(
                "modal sample interval must be positive".to_string(),
            ));
        }
        if self.first_mode == 0 || self.first_mode > self.last_mode {
            return Err(MdError::Config(format!(
                "invalid mode range {}..={}",
                self.first_mode, self.last_mode
            )));
        }
        if self.method == ModalMethod::Hnema
            && (self.output_interval == 0 || self.output_interval % self.sample_interval != 0)
        {
            return Err(MdError::Config(
                "HNEMA output interval must be a positive multiple of the sample interval"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Life cycle of the HNEMA block accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HnemaPhase {
    Accumulating,
    /// block complete and written; zeroed when the next sample arrives
    Flushing,
}

/// Buffers owned between preprocess and postprocess.
#[derive(Debug)]
struct ModalBuffers {
    basis: ModeBasis,
    binning: ModeBinning,
    atoms: Vec<usize>,
    sqrt_mass: Vec<f64>,
    /// projected velocity per mode
    xdot: Vec<Vector3<f64>>,
    /// heat current of atom `n` in mode `m` at `m * np + n`
    jmn: Vec<[f64; NUM_COMPONENTS]>,
    samples_in_block: usize,
}

impl ModalBuffers {
    fn project_velocities(&mut self, velocities: &[Vector3<f64>]) {
        let basis = &self.basis;
        let atoms = &self.atoms;
        let sqrt_mass = &self.sqrt_mass;
        self.xdot
            .par_iter_mut()
            .enumerate()
            .for_each(|(m, xdot)| {
                let (ex, ey, ez) = (
                    basis.direction(0, m),
                    basis.direction(1, m),
                    basis.direction(2, m),
                );
                let sums = tree_reduce::<3, _>(atoms.len(), |n| {
                    let v = velocities[atoms[n]];
                    let s = sqrt_mass[n];
                    [s * ex[n] * v.x, s * ey[n] * v.y, s * ez[n] * v.z]
                });
                *xdot = Vector3::from(sums);
            });
    }

    /// Per-mode per-atom heat current; overwrites or adds into `jmn`.
    fn heat_current(&mut self, atoms: &AtomState, accumulate: bool) {
        let np = self.atoms.len();
        let basis = &self.basis;
        let indices = &self.atoms;
        let sqrt_mass = &self.sqrt_mass;
        let xdot = &self.xdot;
        self.jmn
            .par_chunks_mut(np.max(1))
            .enumerate()
            .for_each(|(m, jm)| {
                for (n, j) in jm.iter_mut().enumerate() {
                    let inv = 1.0 / sqrt_mass[n];
                    let u = Vector3::new(
                        basis.component(0, m, n) * xdot[m].x * inv,
                        basis.component(1, m, n) * xdot[m].y * inv,
                        basis.component(2, m, n) * xdot[m].z * inv,
                    );
                    let s = &atoms.virial[indices[n]];
                    let current = [
                        s[(0, 0)] * u.x + s[(0, 1)] * u.y,
                        s[(0, 2)] * u.z,
                        s[(1, 0)] * u.x + s[(1, 1)] * u.y,
                        s[(1, 2)] * u.z,
                        s[(2, 0)] * u.x + s[(2, 1)] * u.y + s[(2, 2)] * u.z,
                    ];
                    if accumulate {
                        for (acc, c) in j.iter_mut().zip(current) {
                            *acc += c;
                        }
                    } else {
                        *j = current;
                    }
                }
            });
    }

    /// Sum over atoms, then over the modes of each bin.
    fn binned(&self) -> Vec<[f64; NUM_COMPONENTS]> {
        let np = self.atoms.len();
        let jm: Vec<[f64; NUM_COMPONENTS]> = (0..self.basis.num_modes())
            .into_par_iter()
            .map(|m| {
                let block = &self.jmn[m * np..(m + 1) * np];
                tree_reduce::<NUM_COMPONENTS, _>(np, |n| block[n])
            })
            .collect();
        segmented_reduce::<NUM_COMPONENTS, _>(self.binning.counts(), self.binning.offsets(), |m| {
            jm[m]
        })
    }

    fn reset(&mut self) {
        self.jmn
            .par_iter_mut()
            .for_each(|j| *j = [0.0; NUM_COMPONENTS]);
        self.samples_in_block = 0;
    }
}

fn write_bins(
    ctx: &StepContext,
    name: &str,
    bins: &[[f64; NUM_COMPONENTS]],
    factor: f64,
) -> MdResult<()> {
    let mut out = open_append(ctx.output_dir, name)?;
    for bin in bins {
        for value in bin {
            write!(out, "{:25.15e}", value * factor)?;
        }
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

/// GKMA / HNEMA measurement.
#[derive(Debug)]
pub struct ModalAnalysis {
    settings: ModalSettings,
    buffers: Option<ModalBuffers>,
    phase: HnemaPhase,
}

impl ModalAnalysis {
    pub fn new(settings: ModalSettings) -> MdResult<Self> {
        settings.validate()?;
        Ok(ModalAnalysis {
            settings,
            buffers: None,
            phase: HnemaPhase::Accumulating,
        })
    }

    pub fn settings(&self) -> &ModalSettings {
        &self.settings
    }

    pub fn phase(&self) -> HnemaPhase {
        self.phase
    }

    pub fn binning(&self) -> Option<&ModeBinning> {
        self.buffers.as_ref().map(|b| &b.binning)
    }

    /// Current per-mode per-atom heat currents, mode-major.
    pub fn mode_atom_currents(&self) -> Option<&[[f64; NUM_COMPONENTS]]> {
        self.buffers.as_ref().map(|b| b.jmn.as_slice())
    }

    pub fn projected_velocities(&self) -> Option<&[Vector3<f64>]> {
        self.buffers.as_ref().map(|b| b.xdot.as_slice())
    }

    pub fn samples_in_block(&self) -> usize {
        self.buffers.as_ref().map_or(0, |b| b.samples_in_block)
    }

    fn flush_block(&mut self, ctx: &StepContext) -> MdResult<()> {
        let Some(buffers) = self.buffers.as_mut() else {
            return Ok(());
        };
        let samples = buffers.samples_in_block.max(1) as f64;
        let factor = ctx.units.kappa_conversion
            / (ctx.volume * ctx.temperature * ctx.driving_force.norm() * samples);
        let bins = buffers.binned();
        write_bins(ctx, "kappamode.out", &bins, factor)?;
        debug!("HNEMA block of {} samples written", samples);
        self.phase = HnemaPhase::Flushing;
        Ok(())
    }
}

impl Measure for ModalAnalysis {
    fn preprocess(&mut self, ctx: &StepContext, atoms: &AtomState) -> MdResult<()> {
        let participating = match self.settings.group {
            Some((method, group)) => atoms.group_contents(method, group)?.to_vec(),
            None => (0..atoms.number_of_atoms()).collect(),
        };
        let np = participating.len();
        let basis = ModeBasis::read(
            &self.settings.eigenvector_file,
            np,
            self.settings.first_mode..=self.settings.last_mode,
        )?;
        let num_modes = basis.num_modes();
        let binning = match self.settings.binning {
            BinningMode::Index { bin_size } => ModeBinning::by_index(num_modes, bin_size)?,
            BinningMode::Frequency { width } => {
                ModeBinning::by_frequency(&basis.frequencies(), width)?
            }
        };

        if self.settings.method == ModalMethod::Hnema {
            if ctx.driving_force.norm() == 0.0 {
                return Err(MdError::Config(
                    "HNEMA needs a non-zero driving force".to_string(),
                ));
            }
            if ctx.temperature <= 0.0 {
                return Err(MdError::Config(
                    "HNEMA needs a positive temperature".to_string(),
                ));
            }
        }

        info!(
            "{:?} on {} atoms, {} modes in {} bins",
            self.settings.method,
            np,
            num_modes,
            binning.num_bins()
        );
        let sqrt_mass = participating
            .iter()
            .map(|&n| atoms.masses[n].sqrt())
            .collect();
        self.buffers = Some(ModalBuffers {
            basis,
            binning,
            atoms: participating,
            sqrt_mass,
            xdot: vec![Vector3::zeros(); num_modes],
            jmn: vec![[0.0; NUM_COMPONENTS]; num_modes * np],
            samples_in_block: 0,
        });
        self.phase = HnemaPhase::Accumulating;
        Ok(())
    }

    fn process(&mut self, step: usize, ctx: &StepContext, atoms: &AtomState) -> MdResult<()> {
        let Some(buffers) = self.buffers.as_mut() else {
            return Ok(());
        };
        if (step + 1) % self.settings.sample_interval != 0 {
            return Ok(());
        }

        if self.phase == HnemaPhase::Flushing {
            buffers.reset();
            self.phase = HnemaPhase::Accumulating;
        }
        buffers.project_velocities(&atoms.velocities);
        match self.settings.method {
            ModalMethod::Gkma => {
                buffers.heat_current(atoms, false);
                let bins = buffers.binned();
                write_bins(ctx, "heatmode.out", &bins, ctx.units.velocity_to_a_per_ps())?;
            }
            ModalMethod::Hnema => {
                buffers.heat_current(atoms, true);
                buffers.samples_in_block += 1;
                if (step + 1) % self.settings.output_interval == 0 {
                    self.flush_block(ctx)?;
                }
            }
        }
        Ok(())
    }

    fn postprocess(&mut self, _ctx: &StepContext) -> MdResult<()> {
        if let Some(buffers) = self.buffers.take() {
            if self.phase == HnemaPhase::Accumulating && buffers.samples_in_block > 0 {
                info!(
                    "Dropping {} HNEMA samples of an incomplete block",
                    buffers.samples_in_block
                );
            }
        }
        self.phase = HnemaPhase::Accumulating;
        Ok(())
    }
}
