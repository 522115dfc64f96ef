use crate::atom::AtomState;
use crate::cell::SimBox;
use itertools::izip;
use nalgebra::Vector3;
use rayon::prelude::*;

/// Split velocity-Verlet step; forces are recomputed between the two halves.
pub trait Integrator: Send {
    /// Half kick and full drift
    fn first_half(&mut self, cell: &SimBox, atoms: &mut AtomState, dt: f64);

    /// Second half kick with the new forces
    fn second_half(&mut self, atoms: &mut AtomState, dt: f64);

    fn name(&self) -> &'static str;
}

fn kick(atoms: &mut AtomState, half_dt: f64) {
    atoms
        .velocities
        .par_iter_mut()
        .zip(atoms.forces.par_iter())
        .zip(atoms.masses.par_iter())
        .for_each(|((v, f), &m)| *v += f * (half_dt / m));
}

fn drift(cell: &SimBox, atoms: &mut AtomState, dt: f64) {
    atoms
        .positions
        .par_iter_mut()
        .zip(atoms.velocities.par_iter())
        .for_each(|(r, v)| *r = cell.wrap(*r + v * dt));
}

/// NVE
#[derive(Debug, Default, Clone)]
pub struct VelocityVerlet;

impl Integrator for VelocityVerlet {
    fn first_half(&mut self, cell: &SimBox, atoms: &mut AtomState, dt: f64) {
        kick(atoms, 0.5 * dt);
        drift(cell, atoms, dt);
    }

    fn second_half(&mut self, atoms: &mut AtomState, dt: f64) {
        kick(atoms, 0.5 * dt);
    }

    fn name(&self) -> &'static str {
        "velocity-Verlet (NVE)"
    }
}

/// NVT with a single Nose-Hoover thermostat variable.
#[derive(Debug, Clone)]
pub struct NoseHoover {
    xi: f64,
    eta: f64,
    q: f64,
    gk_t: f64,
}

impl NoseHoover {
    /// `tau` is the thermostat period in natural time units.
    pub fn new(number_of_atoms: usize, target_temp: f64, tau: f64, k_b: f64) -> Self {
        let dof = 3 * number_of_atoms;
        let gk_t = dof as f64 * k_b * target_temp;
        NoseHoover {
            xi: 0.0,
            eta: 0.0,
            q: gk_t * tau * tau,
            gk_t,
        }
    }

    pub fn xi(&self) -> f64 {
        self.xi
    }

    /// Thermostat contribution to the conserved quantity.
    pub fn thermostat_energy(&self) -> f64 {
        0.5 * self.q * self.xi * self.xi + self.gk_t * self.eta
    }

    fn update_xi(&mut self, atoms: &AtomState, half_dt: f64) {
        let kin = atoms.kinetic_energy();
        let xi_dot = (2.0 * kin - self.gk_t) / self.q;
        self.xi += xi_dot * half_dt;
        // keep a badly equilibrated start from running away
        self.xi = self.xi.clamp(-10.0, 10.0);
    }
}

impl Integrator for NoseHoover {
    fn first_half(&mut self, cell: &SimBox, atoms: &mut AtomState, dt: f64) {
        let half_dt = 0.5 * dt;
        self.update_xi(atoms, half_dt);

        let scaling_factor = 1.0 / (1.0 + self.xi * half_dt);
        for (v, f, &m) in izip!(&mut atoms.velocities, &atoms.forces, &atoms.masses) {
            *v = (*v + f * (half_dt / m)) * scaling_factor;
        }
        drift(cell, atoms, dt);
    }

    fn second_half(&mut self, atoms: &mut AtomState, dt: f64) {
        let half_dt = 0.5 * dt;
        let scaling_factor = 1.0 / (1.0 + self.xi * half_dt);
        for (v, f, &m) in izip!(&mut atoms.velocities, &atoms.forces, &atoms.masses) {
            *v = (*v + f * (half_dt / m)) * scaling_factor;
        }
        self.update_xi(atoms, half_dt);
        self.eta += self.xi * dt;
    }

    fn name(&self) -> &'static str {
        "Nose-Hoover (NVT)"
    }
}

/// HNEMD driving force `F_i += W_i · F_e`, followed by removal of the mean so the
/// total momentum is conserved.
pub fn apply_driving_force(atoms: &mut AtomState, fe: &Vector3<f64>) {
    let n = atoms.number_of_atoms();
    if n == 0 {
        return;
    }
    atoms
        .forces
        .par_iter_mut()
        .zip(atoms.virial.par_iter())
        .for_each(|(f, w)| *f += w * fe);
    let mean = atoms.forces.iter().sum::<Vector3<f64>>() / n as f64;
    atoms.forces.par_iter_mut().for_each(|f| *f -= mean);
}
