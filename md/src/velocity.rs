//! Initial velocities.

use crate::error::{MdError, MdResult};
use itertools::izip;
use nalgebra::{Matrix3, Vector3};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

/// Maxwell-Boltzmann velocities with zero total momentum, rescaled to exactly `temperature`.
///
/// Velocities are in Å per natural time unit: `sqrt(k_B T / m)` with `k_B` in eV/K and
/// `m` in amu.
pub fn maxwell_boltzmann<R: Rng + ?Sized>(
    rng: &mut R,
    positions: &[Vector3<f64>],
    masses: &[f64],
    temperature: f64,
    k_b: f64,
    zero_angular: bool,
) -> MdResult<Vec<Vector3<f64>>> {
    let mut velocities: Vec<Vector3<f64>> = masses
        .iter()
        .map(|&m| {
            let sigma = (k_b * temperature / m).sqrt();
            Vector3::<f64>::new(
                StandardNormal.sample(rng),
                StandardNormal.sample(rng),
                StandardNormal.sample(rng),
            ) * sigma
        })
        .collect::<Vec<Vector3<f64>>>();

    zero_linear_momentum(masses, &mut velocities);
    if zero_angular {
        zero_angular_momentum(positions, masses, &mut velocities)?;
    }
    scale_to_temperature(masses, &mut velocities, temperature, k_b);
    Ok(velocities)
}

pub fn zero_linear_momentum(masses: &[f64], velocities: &mut [Vector3<f64>]) {
    let total_mass: f64 = masses.iter().sum();
    if total_mass <= 0.0 {
        return;
    }
    let momentum: Vector3<f64> = velocities.iter().zip(masses).map(|(v, &m)| v * m).sum();
    let v_cm = momentum / total_mass;
    for v in velocities.iter_mut() {
        *v -= v_cm;
    }
}

/// Remove the rigid rotation about the center of mass. Fails when the inertia tensor
/// cannot be inverted, e.g. for a single atom or collinear atoms.
pub fn zero_angular_momentum(
    positions: &[Vector3<f64>],
    masses: &[f64],
    velocities: &mut [Vector3<f64>],
) -> MdResult<()> {
    let total_mass: f64 = masses.iter().sum();
    let center: Vector3<f64> =
        positions.iter().zip(masses).map(|(r, &m)| r * m).sum::<Vector3<f64>>() / total_mass;

    let mut angular = Vector3::<f64>::zeros();
    let mut inertia = Matrix3::<f64>::zeros();
    for (r, v, &m) in izip!(positions, velocities.iter(), masses) {
        let d = r - center;
        angular += d.cross(v) * m;
        inertia += (Matrix3::identity() * d.norm_squared() - d * d.transpose()) * m;
    }

    let omega = inertia
        .try_inverse()
        .filter(|inv| inv.iter().all(|x| x.is_finite()))
        .ok_or(MdError::SingularInertia)?
        * angular;

    for (r, v) in positions.iter().zip(velocities.iter_mut()) {
        *v -= omega.cross(&(r - center));
    }
    Ok(())
}

pub fn scale_to_temperature(
    masses: &[f64],
    velocities: &mut [Vector3<f64>],
    temperature: f64,
    k_b: f64,
) {
    let dof = 3 * velocities.len();
    if dof == 0 {
        return;
    }
    let kinetic: f64 = velocities
        .iter()
        .zip(masses)
        .map(|(v, &m)| 0.5 * m * v.norm_squared())
        .sum();
    let current = 2.0 * kinetic / (dof as f64 * k_b);
    if current > 0.0 {
        let factor = (temperature / current).sqrt();
        for v in velocities.iter_mut() {
            *v *= factor;
        }
    }
}
