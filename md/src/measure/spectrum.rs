//! Post-processing of a finished velocity autocorrelation.

use nalgebra::Vector3;
use rayon::prelude::*;
use std::f64::consts::PI;

/// Hann window over `nc` lags; non-zero lags are doubled because the cosine transform
/// only runs over non-negative times.
pub fn hann_weights(nc: usize) -> Vec<f64> {
    (0..nc)
        .map(|n| {
            let hann = 0.5 * ((PI * n as f64 / nc as f64).cos() + 1.0);
            if n == 0 {
                hann
            } else {
                2.0 * hann
            }
        })
        .collect()
}

/// Windowed cosine transform of a normalized VAC onto `num_points` angular frequencies
/// `(k + 1) · omega_max / num_points` (rad/ps). `dt_ps` is the lag spacing.
///
/// The scale `2·N·dt` makes `∫ dos dω / 2π` equal the number of atoms per axis.
pub fn dos_transform(
    normalized: &[Vector3<f64>],
    dt_ps: f64,
    omega_max: f64,
    num_points: usize,
    num_atoms: usize,
) -> Vec<(f64, Vector3<f64>)> {
    let weights = hann_weights(normalized.len());
    let windowed: Vec<Vector3<f64>> = normalized
        .iter()
        .zip(&weights)
        .map(|(c, &w)| c * w)
        .collect();
    let d_omega = omega_max / num_points as f64;
    let scale = 2.0 * num_atoms as f64 * dt_ps;

    (0..num_points)
        .into_par_iter()
        .map(|k| {
            let omega = (k + 1) as f64 * d_omega;
            let dos: Vector3<f64> = windowed
                .iter()
                .enumerate()
                .map(|(n, c)| c * (omega * n as f64 * dt_ps).cos())
                .sum();
            (omega, dos * scale)
        })
        .collect()
}

/// Running trapezoidal integral of the VAC, per axis. Entry `k` integrates lags `0..=k`.
pub fn integrate_sdc(vac: &[Vector3<f64>], dt: f64) -> Vec<Vector3<f64>> {
    let mut sdc = Vec::with_capacity(vac.len());
    let mut integral = Vector3::zeros();
    if let Some(&first) = vac.first() {
        sdc.push(integral);
        let mut previous = first;
        for &c in &vac[1..] {
            integral += (previous + c) * (0.5 * dt);
            sdc.push(integral);
            previous = c;
        }
    }
    sdc
}

/// `D = (D_x + D_y + D_z) / 3`
pub fn isotropic_diffusion(sdc: &Vector3<f64>) -> f64 {
    (sdc.x + sdc.y + sdc.z) / 3.0
}
