//! Velocity autocorrelation with a ring buffer of the last `Nc` snapshots.
//!
//! Every sample the newest snapshot is correlated against all retained time origins,
//! so the cost per sample is `O(Nc · N)` and no trajectory is stored. The result is
//! turned into a phonon DOS (mass-weighted) or a self-diffusion coefficient.

use super::reduce::tree_reduce;
use super::spectrum::{dos_transform, integrate_sdc, isotropic_diffusion};
use super::{open_append, Measure, StepContext};
use crate::atom::AtomState;
use crate::error::{MdError, MdResult};
use nalgebra::Vector3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::io::Write;
use tracing::info;

/// What the correlation is for. Computing both at once is not representable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationMode {
    #[default]
    None,
    /// mass-weighted VAC, transformed into a density of states
    Dos,
    /// plain VAC, integrated into a self-diffusion coefficient
    Sdc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VacSettings {
    #[serde(default)]
    pub mode: CorrelationMode,
    pub sample_interval: usize,
    pub num_correlation_steps: usize,
    /// Largest angular frequency of the DOS in rad/ps
    #[serde(default)]
    pub omega_max: f64,
    #[serde(default = "default_dos_points")]
    pub num_dos_points: usize,
    /// `(grouping method, group id)`; all atoms when absent
    #[serde(default)]
    pub group: Option<(usize, usize)>,
}

fn default_dos_points() -> usize {
    1000
}

impl VacSettings {
    pub fn validate(&self) -> MdResult<()> {
        if self.mode == CorrelationMode::None {
            return Ok(());
        }
        if self.sample_interval == 0 {
            return Err(MdError::Config("VAC sample interval must be positive".to_string()));
        }
        if self.num_correlation_steps < 2 {
            return Err(MdError::Config(
                "VAC needs at least 2 correlation steps".to_string(),
            ));
        }
        if self.mode == CorrelationMode::Dos {
            if self.omega_max <= 0.0 {
                return Err(MdError::Config("omega_max must be positive".to_string()));
            }
            if self.num_dos_points == 0 {
                return Err(MdError::Config("num_dos_points must be positive".to_string()));
            }
        }
        Ok(())
    }
}

/// Atoms whose velocities are sampled.
#[derive(Debug, Clone)]
enum Tracked {
    All(usize),
    Subset(Vec<usize>),
}

impl Tracked {
    fn len(&self) -> usize {
        match self {
            Tracked::All(n) => *n,
            Tracked::Subset(atoms) => atoms.len(),
        }
    }
}

/// Ring buffer plus per-lag accumulators, alive between preprocess and postprocess.
#[derive(Debug, Clone)]
struct CorrelationWindow {
    tracked: Tracked,
    /// `None` for SDC, where every weight is one
    masses: Option<Vec<f64>>,
    /// snapshot `slot` occupies `slot * N..(slot + 1) * N`
    velocities: Vec<Vector3<f64>>,
    vac: Vec<Vector3<f64>>,
    num_time_origins: usize,
    /// sample spacing in natural time units
    sample_time: f64,
}

impl CorrelationWindow {
    fn slot(&self, slot: usize) -> &[Vector3<f64>] {
        let n = self.tracked.len();
        &self.velocities[slot * n..(slot + 1) * n]
    }
}

pub fn copy_velocity_all(velocities: &[Vector3<f64>], slot: &mut [Vector3<f64>]) {
    slot.par_iter_mut()
        .zip(velocities.par_iter())
        .for_each(|(dst, src)| *dst = *src);
}

pub fn copy_velocity_subset(
    velocities: &[Vector3<f64>],
    atoms: &[usize],
    slot: &mut [Vector3<f64>],
) {
    slot.par_iter_mut()
        .zip(atoms.par_iter())
        .for_each(|(dst, &n)| *dst = velocities[n]);
}

/// VAC / DOS / SDC measurement.
#[derive(Debug)]
pub struct Vac {
    settings: VacSettings,
    window: Option<CorrelationWindow>,
}

impl Vac {
    pub fn new(settings: VacSettings) -> MdResult<Self> {
        settings.validate()?;
        Ok(Vac {
            settings,
            window: None,
        })
    }

    pub fn settings(&self) -> &VacSettings {
        &self.settings
    }

    pub fn is_active(&self) -> bool {
        self.window.is_some()
    }

    /// Accumulated per-lag sums, before any normalization.
    pub fn raw_correlation(&self) -> Option<&[Vector3<f64>]> {
        self.window.as_ref().map(|w| w.vac.as_slice())
    }

    pub fn num_time_origins(&self) -> usize {
        self.window.as_ref().map_or(0, |w| w.num_time_origins)
    }

    /// Correlate the snapshot in `current` against every slot.
    fn correlate(window: &mut CorrelationWindow, current: usize) {
        let nc = window.vac.len();
        let n = window.tracked.len();
        let now = window.slot(current);
        let masses = window.masses.as_deref();

        let lags: Vec<(usize, Vector3<f64>)> = (0..nc)
            .into_par_iter()
            .map(|b| {
                let origin = window.slot(b);
                let sums = tree_reduce::<3, _>(n, |i| {
                    let m = masses.map_or(1.0, |m| m[i]);
                    let v0 = origin[i];
                    let v1 = now[i];
                    [m * v0.x * v1.x, m * v0.y * v1.y, m * v0.z * v1.z]
                });
                ((current + nc - b) % nc, Vector3::from(sums))
            })
            .collect();

        for (lag, value) in lags {
            window.vac[lag] += value;
        }
    }

    fn write_dos(&self, window: &CorrelationWindow, ctx: &StepContext) -> MdResult<()> {
        let c0 = window.vac[0];
        if c0.iter().any(|&c| c == 0.0) {
            return Err(MdError::Config(
                "zero-lag VAC vanishes; cannot normalize the DOS".to_string(),
            ));
        }
        let normalized: Vec<Vector3<f64>> = window
            .vac
            .iter()
            .map(|c| c.component_div(&c0))
            .collect();
        let dt_ps = ctx.units.time_to_ps(window.sample_time);

        let mut mvac = open_append(ctx.output_dir, "mvac.out")?;
        for (lag, c) in normalized.iter().enumerate() {
            writeln!(
                mvac,
                "{:25.15e}{:25.15e}{:25.15e}{:25.15e}",
                lag as f64 * dt_ps,
                c.x,
                c.y,
                c.z
            )?;
        }
        mvac.flush()?;

        let dos = dos_transform(
            &normalized,
            dt_ps,
            self.settings.omega_max,
            self.settings.num_dos_points,
            window.tracked.len(),
        );
        let mut out = open_append(ctx.output_dir, "dos.out")?;
        for (omega, d) in &dos {
            writeln!(out, "{:25.15e}{:25.15e}{:25.15e}{:25.15e}", omega, d.x, d.y, d.z)?;
        }
        out.flush()?;
        info!("DOS written to dos.out ({} points)", dos.len());
        Ok(())
    }

    fn write_sdc(&self, window: &CorrelationWindow, ctx: &StepContext) -> MdResult<()> {
        let norm = (window.tracked.len() * window.num_time_origins) as f64;
        let vac: Vec<Vector3<f64>> = window.vac.iter().map(|c| c / norm).collect();
        let sdc = integrate_sdc(&vac, window.sample_time);

        let v_factor = ctx.units.velocity_to_a_per_ps();
        let dt_ps = ctx.units.time_to_ps(window.sample_time);
        let mut out = open_append(ctx.output_dir, "sdc.out")?;
        for (lag, (c, d)) in vac.iter().zip(&sdc).enumerate() {
            let c = c * (v_factor * v_factor);
            let d = d * v_factor;
            writeln!(
                out,
                "{:25.15e}{:25.15e}{:25.15e}{:25.15e}{:25.15e}{:25.15e}{:25.15e}",
                lag as f64 * dt_ps,
                c.x,
                c.y,
                c.z,
                d.x,
                d.y,
                d.z
            )?;
        }
        out.flush()?;
        if let Some(last) = sdc.last() {
            info!(
                "Self-diffusion coefficient D = {:.6e} Å²/ps",
                isotropic_diffusion(last) * v_factor
            );
        }
        Ok(())
    }
}

impl Measure for Vac {
    fn preprocess(&mut self, ctx: &StepContext, atoms: &AtomState) -> MdResult<()> {
        if self.settings.mode == CorrelationMode::None {
            return Ok(());
        }
        let nc = self.settings.num_correlation_steps;
        let sample_time = ctx.time_step * self.settings.sample_interval as f64;

        let tracked = match self.settings.group {
            Some((method, group)) => {
                Tracked::Subset(atoms.group_contents(method, group)?.to_vec())
            }
            None => Tracked::All(atoms.number_of_atoms()),
        };

        let masses = match self.settings.mode {
            CorrelationMode::Dos => {
                let nyquist = PI / ctx.units.time_to_ps(sample_time);
                if self.settings.omega_max > nyquist {
                    return Err(MdError::Config(format!(
                        "omega_max {:.4} rad/ps exceeds the sampling limit {:.4} rad/ps",
                        self.settings.omega_max, nyquist
                    )));
                }
                Some(match &tracked {
                    Tracked::All(_) => atoms.masses.clone(),
                    Tracked::Subset(list) => list.iter().map(|&n| atoms.masses[n]).collect(),
                })
            }
            _ => None,
        };

        let n = tracked.len();
        info!(
            "VAC ({:?}) on {} atoms: sample every {} steps, {} correlation steps",
            self.settings.mode, n, self.settings.sample_interval, nc
        );
        self.window = Some(CorrelationWindow {
            tracked,
            masses,
            velocities: vec![Vector3::zeros(); nc * n],
            vac: vec![Vector3::zeros(); nc],
            num_time_origins: 0,
            sample_time,
        });
        Ok(())
    }

    fn process(&mut self, step: usize, _ctx: &StepContext, atoms: &AtomState) -> MdResult<()> {
        let interval = self.settings.sample_interval;
        let Some(window) = self.window.as_mut() else {
            return Ok(());
        };
        if (step + 1) % interval != 0 {
            return Ok(());
        }
        let nc = window.vac.len();
        let sample_step = step / interval;
        let current = sample_step % nc;

        let n = window.tracked.len();
        let slot = &mut window.velocities[current * n..(current + 1) * n];
        match &window.tracked {
            Tracked::All(_) => copy_velocity_all(&atoms.velocities, slot),
            Tracked::Subset(list) => copy_velocity_subset(&atoms.velocities, list, slot),
        }

        if sample_step + 1 >= nc {
            window.num_time_origins += 1;
            Self::correlate(window, current);
        }
        Ok(())
    }

    fn postprocess(&mut self, ctx: &StepContext) -> MdResult<()> {
        let Some(window) = self.window.take() else {
            return Ok(());
        };
        if window.num_time_origins == 0 {
            info!("VAC window never filled; nothing written");
            return Ok(());
        }
        match self.settings.mode {
            CorrelationMode::Dos => self.write_dos(&window, ctx),
            CorrelationMode::Sdc => self.write_sdc(&window, ctx),
            CorrelationMode::None => Ok(()),
        }
    }
}
