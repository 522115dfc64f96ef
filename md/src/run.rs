//! Step driver: owns the system and runs the integrate / force / measure loop.

use crate::atom::AtomState;
use crate::cell::SimBox;
use crate::config::{EnsembleConfig, MdConfig, PotentialConfig};
use crate::error::MdResult;
use crate::integrate::{apply_driving_force, Integrator, NoseHoover, VelocityVerlet};
use crate::measure::{CorrelationMode, Measure, ModalAnalysis, StepContext, Vac};
use crate::neighbor::NeighborList;
use crate::potential::{ForceEvaluator, SwParameters, SwPotential};
use crate::units::Units;
use nalgebra::Vector3;
use std::path::PathBuf;
use tracing::{debug, info};

/// One line of the thermodynamic log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thermo {
    pub step: usize,
    /// K
    pub temperature: f64,
    /// eV
    pub kinetic_energy: f64,
    /// eV
    pub potential_energy: f64,
    /// amu·Å per natural time unit
    pub momentum: Vector3<f64>,
}

impl Thermo {
    pub fn total_energy(&self) -> f64 {
        self.kinetic_energy + self.potential_energy
    }
}

pub struct Simulation {
    units: Units,
    cell: SimBox,
    atoms: AtomState,
    neighbors: NeighborList,
    forces: ForceEvaluator,
    integrator: Box<dyn Integrator>,
    measures: Vec<Box<dyn Measure>>,
    /// natural time units
    time_step: f64,
    total_steps: usize,
    thermo_interval: usize,
    temperature: f64,
    driving_force: Vector3<f64>,
    output_dir: PathBuf,
    thermo: Vec<Thermo>,
}

impl Simulation {
    pub fn from_config(config: &MdConfig, units: Units) -> MdResult<Self> {
        config.validate()?;

        let cell = config.generate_box()?;
        let positions: Vec<Vector3<f64>> = config
            .generate_positions()?
            .into_iter()
            .map(|r| cell.wrap(r))
            .collect();
        let n_atoms = positions.len();
        let masses = config.generate_masses(n_atoms)?;
        let types = config.generate_types(n_atoms)?;
        let velocities = config.generate_velocities(&positions, &masses, &units)?;
        let groupings = config.generate_groupings(&cell, &positions)?;

        let mut atoms = AtomState::new(positions, velocities, masses, types)?;
        for label in groupings {
            atoms.add_grouping(label)?;
        }

        let neighbor = &config.simulation.neighbor;
        let mut forces = ForceEvaluator::new();
        match &config.potential {
            PotentialConfig::StillingerWeber {
                parameter_file,
                num_types,
                type_shift,
            } => {
                let params = SwParameters::from_file(parameter_file, *num_types)?;
                forces.add(Box::new(SwPotential::new(
                    params,
                    0..n_atoms,
                    *type_shift,
                    n_atoms,
                    neighbor.capacity,
                )?));
            }
        }
        let neighbors = NeighborList::build(
            &cell,
            &atoms.positions,
            forces.cutoff(),
            neighbor.skin,
            neighbor.capacity,
        )?;

        let time_step = units.fs_to_time(config.simulation.integration.time_step);
        let integrator: Box<dyn Integrator> = match &config.simulation.ensemble {
            EnsembleConfig::NVE => Box::new(VelocityVerlet),
            EnsembleConfig::NVT {
                target_temperature,
                thermostat_coupling,
            } => Box::new(NoseHoover::new(
                n_atoms,
                *target_temperature,
                thermostat_coupling * time_step,
                units.k_b,
            )),
        };

        let mut measures: Vec<Box<dyn Measure>> = Vec::new();
        if let Some(vac) = &config.measure.vac {
            if vac.mode != CorrelationMode::None {
                measures.push(Box::new(Vac::new(vac.clone())?));
            }
        }
        if let Some(modal) = &config.measure.modal {
            measures.push(Box::new(ModalAnalysis::new(modal.clone())?));
        }

        info!(
            "{} atoms in a {:.3} Å³ box, {} integrator, dt = {} fs",
            n_atoms,
            cell.volume(),
            integrator.name(),
            config.simulation.integration.time_step
        );

        Ok(Simulation {
            units,
            cell,
            atoms,
            neighbors,
            forces,
            integrator,
            measures,
            time_step,
            total_steps: config.simulation.integration.total_steps,
            thermo_interval: config.output.thermo_interval,
            temperature: config.target_temperature(),
            driving_force: config.driving_force(),
            output_dir: config.output.directory.clone(),
            thermo: Vec::new(),
        })
    }

    /// Register an additional measurement; it sees every step of `run`.
    pub fn add_measure(&mut self, measure: Box<dyn Measure>) {
        self.measures.push(measure);
    }

    pub fn atoms(&self) -> &AtomState {
        &self.atoms
    }

    pub fn cell(&self) -> &SimBox {
        &self.cell
    }

    pub fn thermo(&self) -> &[Thermo] {
        &self.thermo
    }

    fn compute_forces(&mut self) -> MdResult<()> {
        if self.neighbors.needs_rebuild(&self.cell, &self.atoms.positions) {
            self.neighbors.rebuild(&self.cell, &self.atoms.positions)?;
        }
        self.forces
            .compute(&self.cell, &self.neighbors, &mut self.atoms)?;
        if self.driving_force.norm() > 0.0 {
            apply_driving_force(&mut self.atoms, &self.driving_force);
        }
        Ok(())
    }

    fn record_thermo(&mut self, step: usize) {
        let thermo = Thermo {
            step,
            temperature: self.atoms.temperature(self.units.k_b),
            kinetic_energy: self.atoms.kinetic_energy(),
            potential_energy: self.atoms.potential_energy(),
            momentum: self.atoms.total_momentum(),
        };
        info!(
            "Step {:>8}: T = {:10.3} K, Ek = {:14.6} eV, Ep = {:14.6} eV, E = {:14.6} eV",
            thermo.step,
            thermo.temperature,
            thermo.kinetic_energy,
            thermo.potential_energy,
            thermo.total_energy()
        );
        self.thermo.push(thermo);
    }

    /// Run all steps. Measurements are pre- and postprocessed even when a step fails
    /// partway, so no buffers outlive the run.
    pub fn run(&mut self) -> MdResult<()> {
        let output_dir = self.output_dir.clone();
        let volume = self.cell.volume();
        let units = self.units;
        let ctx = StepContext {
            units: &units,
            time_step: self.time_step,
            temperature: self.temperature,
            volume,
            driving_force: self.driving_force,
            output_dir: &output_dir,
        };

        self.compute_forces()?;
        for measure in &mut self.measures {
            measure.preprocess(&ctx, &self.atoms)?;
        }
        self.record_thermo(0);

        let result = self.step_loop(&ctx);
        let mut post = Ok(());
        for measure in &mut self.measures {
            let done = measure.postprocess(&ctx);
            if post.is_ok() {
                post = done;
            }
        }
        result?;
        post
    }

    fn step_loop(&mut self, ctx: &StepContext) -> MdResult<()> {
        for step in 0..self.total_steps {
            self.integrator
                .first_half(&self.cell, &mut self.atoms, self.time_step);
            self.compute_forces()?;
            self.integrator.second_half(&mut self.atoms, self.time_step);

            for measure in &mut self.measures {
                measure.process(step, ctx, &self.atoms)?;
            }
            if (step + 1) % self.thermo_interval == 0 {
                self.record_thermo(step + 1);
            }
        }
        debug!("Finished {} steps", self.total_steps);
        Ok(())
    }
}
