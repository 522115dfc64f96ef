use super::spectrum::{dos_transform, hann_weights, integrate_sdc, isotropic_diffusion};
use super::*;
use crate::error::MdError;
use approx::assert_relative_eq;
use nalgebra::Matrix3;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn context<'a>(units: &'a Units, dir: &'a Path) -> StepContext<'a> {
    StepContext {
        units,
        time_step: units.fs_to_time(1.0),
        temperature: 300.0,
        volume: 1000.0,
        driving_force: Vector3::new(0.0, 0.0, 1.0e-5),
        output_dir: dir,
    }
}

fn moving_atoms() -> AtomState {
    AtomState::new(
        vec![Vector3::zeros(), Vector3::new(2.0, 0.0, 0.0), Vector3::new(0.0, 2.0, 0.0)],
        vec![
            Vector3::new(0.01, -0.02, 0.03),
            Vector3::new(-0.015, 0.005, 0.0),
            Vector3::new(0.002, 0.004, -0.02),
        ],
        vec![28.0, 12.0, 72.6],
        vec![0, 0, 0],
    )
    .unwrap()
}

fn read_table(path: PathBuf) -> Vec<Vec<f64>> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| l.split_whitespace().map(|v| v.parse().unwrap()).collect())
        .collect()
}

fn vac_settings(mode: CorrelationMode, nc: usize) -> VacSettings {
    VacSettings {
        mode,
        sample_interval: 1,
        num_correlation_steps: nc,
        omega_max: 400.0,
        num_dos_points: 50,
        group: None,
    }
}

#[test]
fn vac_lag_zero_is_mass_weighted_square_on_first_fill() {
    let units = Units::natural();
    let dir = TempDir::new().unwrap();
    let ctx = context(&units, dir.path());
    let atoms = moving_atoms();

    let mut vac = Vac::new(vac_settings(CorrelationMode::Dos, 4)).unwrap();
    vac.preprocess(&ctx, &atoms).unwrap();
    for step in 0..3 {
        vac.process(step, &ctx, &atoms).unwrap();
        assert_eq!(vac.num_time_origins(), 0);
    }
    vac.process(3, &ctx, &atoms).unwrap();
    assert_eq!(vac.num_time_origins(), 1);

    let expected: Vector3<f64> = atoms
        .velocities
        .iter()
        .zip(&atoms.masses)
        .map(|(v, &m)| v.component_mul(v) * m)
        .sum();
    let raw = vac.raw_correlation().unwrap();
    assert_relative_eq!(raw[0], expected, epsilon = 1e-15);
    let mvv: f64 = atoms
        .velocities
        .iter()
        .zip(&atoms.masses)
        .map(|(v, &m)| m * v.dot(v))
        .sum();
    assert_relative_eq!(raw[0].sum(), mvv, epsilon = 1e-15);
    // a constant trajectory correlates equally at every lag
    for lag in raw {
        assert_relative_eq!(*lag, expected, epsilon = 1e-15);
    }
}

#[test]
fn vac_subset_tracks_only_the_group() {
    let units = Units::natural();
    let dir = TempDir::new().unwrap();
    let ctx = context(&units, dir.path());
    let mut atoms = moving_atoms();
    atoms.add_grouping(vec![0, 1, 1]).unwrap();

    let mut settings = vac_settings(CorrelationMode::Sdc, 2);
    settings.group = Some((0, 1));
    let mut vac = Vac::new(settings).unwrap();
    vac.preprocess(&ctx, &atoms).unwrap();
    vac.process(0, &ctx, &atoms).unwrap();
    vac.process(1, &ctx, &atoms).unwrap();

    let v1 = atoms.velocities[1];
    let v2 = atoms.velocities[2];
    let expected = v1.component_mul(&v1) + v2.component_mul(&v2);
    assert_relative_eq!(vac.raw_correlation().unwrap()[0], expected, epsilon = 1e-15);
}

#[test]
fn vac_requires_valid_group() {
    let units = Units::natural();
    let dir = TempDir::new().unwrap();
    let ctx = context(&units, dir.path());
    let atoms = moving_atoms();
    let mut settings = vac_settings(CorrelationMode::Sdc, 2);
    settings.group = Some((0, 0));
    let mut vac = Vac::new(settings).unwrap();
    assert!(vac.preprocess(&ctx, &atoms).is_err());
}

#[test]
fn nyquist_violation_is_fatal() {
    let units = Units::natural();
    let dir = TempDir::new().unwrap();
    let ctx = context(&units, dir.path());
    let atoms = moving_atoms();
    let mut settings = vac_settings(CorrelationMode::Dos, 4);
    // 1 fs sampling allows up to π / 0.001 ps ≈ 3141.6 rad/ps
    settings.omega_max = 3200.0;
    let mut vac = Vac::new(settings).unwrap();
    assert!(matches!(
        vac.preprocess(&ctx, &atoms),
        Err(MdError::Config(_))
    ));
}

#[test]
fn disabled_vac_does_nothing() {
    let units = Units::natural();
    let dir = TempDir::new().unwrap();
    let ctx = context(&units, dir.path());
    let atoms = moving_atoms();
    let mut vac = Vac::new(vac_settings(CorrelationMode::None, 4)).unwrap();
    vac.preprocess(&ctx, &atoms).unwrap();
    vac.process(0, &ctx, &atoms).unwrap();
    assert!(!vac.is_active());
    vac.postprocess(&ctx).unwrap();
    assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[test]
fn hann_window_doubles_nonzero_lags() {
    let w = hann_weights(4);
    assert_relative_eq!(w[0], 1.0);
    assert_relative_eq!(w[2], 2.0 * 0.5 * ((std::f64::consts::PI * 0.5).cos() + 1.0));
    assert!(w[3] < w[1]);
}

#[test]
fn dos_of_single_oscillation_peaks_at_its_frequency() {
    let omega0 = 30.0;
    let dt_ps = 0.01;
    let nc = 500;
    let normalized: Vec<Vector3<f64>> = (0..nc)
        .map(|n| {
            let c = (omega0 * n as f64 * dt_ps).cos();
            Vector3::new(c, c, c)
        })
        .collect();
    let dos = dos_transform(&normalized, dt_ps, 100.0, 400, 1);

    let (peak_omega, peak) = dos
        .iter()
        .map(|(w, d)| (*w, d.x))
        .fold((0.0, f64::MIN), |acc, p| if p.1 > acc.1 { p } else { acc });
    assert!((peak_omega - omega0).abs() < 1.0, "peak at {}", peak_omega);
    for (w, d) in &dos {
        if (w - omega0).abs() > 10.0 {
            assert!(d.x.abs() < 0.05 * peak, "leak {} at {}", d.x, w);
        }
    }
}

#[test]
fn trapezoid_sdc_is_exact_for_linear_vac() {
    let dt = 0.5;
    let vac: Vec<Vector3<f64>> = (0..11)
        .map(|k| {
            let k = k as f64;
            Vector3::new(3.0 - 0.2 * k, 1.0, 0.1 * k)
        })
        .collect();
    let sdc = integrate_sdc(&vac, dt);
    assert_eq!(sdc.len(), vac.len());
    for (k, d) in sdc.iter().enumerate() {
        let t = k as f64 * dt;
        // ∫ (3 - 0.4 t), ∫ 1, ∫ 0.2 t
        let expected = Vector3::new(3.0 * t - 0.2 * t * t, t, 0.1 * t * t);
        assert_relative_eq!(*d, expected, epsilon = 1e-12);
    }
    let last = sdc[10];
    assert_relative_eq!(isotropic_diffusion(&last), last.sum() / 3.0);
}

#[test]
fn sdc_output_for_ballistic_atoms() {
    let units = Units::natural();
    let dir = TempDir::new().unwrap();
    let ctx = context(&units, dir.path());
    let atoms = moving_atoms();

    let mut vac = Vac::new(vac_settings(CorrelationMode::Sdc, 3)).unwrap();
    vac.preprocess(&ctx, &atoms).unwrap();
    for step in 0..5 {
        vac.process(step, &ctx, &atoms).unwrap();
    }
    assert_eq!(vac.num_time_origins(), 3);
    vac.postprocess(&ctx).unwrap();
    assert!(!vac.is_active());

    let table = read_table(dir.path().join("sdc.out"));
    assert_eq!(table.len(), 3);
    let n = atoms.number_of_atoms() as f64;
    let mean_vx2: f64 = atoms.velocities.iter().map(|v| v.x * v.x).sum::<f64>() / n;
    let conv = units.velocity_to_a_per_ps();
    let dt_ps = units.time_to_ps(ctx.time_step);

    let last = &table[2];
    assert_relative_eq!(last[0], 2.0 * dt_ps, max_relative = 1e-12);
    assert_relative_eq!(last[1], mean_vx2 * conv * conv, max_relative = 1e-12);
    // constant VAC integrates to c · t; with c in Å²/ps² and t in ps
    assert_relative_eq!(last[4], mean_vx2 * conv * conv * 2.0 * dt_ps, max_relative = 1e-10);
}

#[test]
fn dos_output_files_are_appended() {
    let units = Units::natural();
    let dir = TempDir::new().unwrap();
    let ctx = context(&units, dir.path());
    let atoms = moving_atoms();

    for _ in 0..2 {
        let mut vac = Vac::new(vac_settings(CorrelationMode::Dos, 4)).unwrap();
        vac.preprocess(&ctx, &atoms).unwrap();
        for step in 0..6 {
            vac.process(step, &ctx, &atoms).unwrap();
        }
        vac.postprocess(&ctx).unwrap();
    }
    let mvac = read_table(dir.path().join("mvac.out"));
    assert_eq!(mvac.len(), 2 * 4);
    assert_relative_eq!(mvac[0][1], 1.0);
    let dos = read_table(dir.path().join("dos.out"));
    assert_eq!(dos.len(), 2 * 50);
    assert_relative_eq!(dos[0][0], 400.0 / 50.0);
}

/// Six modes for two atoms, each a unit displacement of one degree of freedom.
fn unit_basis(dir: &Path) -> PathBuf {
    let np = 2;
    let mut eig = vec![0.0; 6 * 3 * np];
    for m in 0..6 {
        let (dir_index, atom) = (m / 2, m % 2);
        eig[(dir_index + 3 * m) * np + atom] = 1.0;
    }
    let omega2 = vec![-1.0, 4.0, 9.0, 400.0, 420.0, 900.0];
    let path = dir.join("eigenvector.in");
    ModeBasis::new(omega2, np, eig).unwrap().write(&path).unwrap();
    path
}

fn modal_atoms() -> AtomState {
    let mut atoms = AtomState::new(
        vec![Vector3::zeros(), Vector3::new(2.0, 1.0, 0.0)],
        vec![Vector3::new(0.01, 0.02, -0.03), Vector3::new(-0.02, 0.01, 0.015)],
        vec![28.0, 12.0],
        vec![0, 0],
    )
    .unwrap();
    atoms.virial[0] = Matrix3::new(1.0, 0.2, -0.3, 0.4, 2.0, 0.1, -0.5, 0.6, 3.0);
    atoms.virial[1] = Matrix3::new(-1.0, 0.3, 0.2, 0.1, 0.5, -0.4, 0.7, 0.2, -2.0);
    atoms
}

fn modal_settings(method: ModalMethod, eigenvector_file: PathBuf) -> ModalSettings {
    ModalSettings {
        method,
        sample_interval: 1,
        output_interval: 3,
        first_mode: 1,
        last_mode: 6,
        eigenvector_file,
        binning: BinningMode::Index { bin_size: 2 },
        group: None,
    }
}

/// Heat current of every atom, `S · v` split into the five components.
fn direct_current(atoms: &AtomState) -> [f64; 5] {
    let mut total = [0.0; 5];
    for (s, v) in atoms.virial.iter().zip(&atoms.velocities) {
        total[0] += s[(0, 0)] * v.x + s[(0, 1)] * v.y;
        total[1] += s[(0, 2)] * v.z;
        total[2] += s[(1, 0)] * v.x + s[(1, 1)] * v.y;
        total[3] += s[(1, 2)] * v.z;
        total[4] += s[(2, 0)] * v.x + s[(2, 1)] * v.y + s[(2, 2)] * v.z;
    }
    total
}

#[test]
fn eigenvector_round_trip() {
    let dir = TempDir::new().unwrap();
    let np = 3;
    let omega2 = vec![-0.5, 1.25, 7.0, 1.0e3];
    let eig: Vec<f64> = (0..4 * 3 * np).map(|i| (i as f64 * 0.731).sin() / 3.0).collect();
    let basis = ModeBasis::new(omega2.clone(), np, eig).unwrap();
    let path = dir.path().join("eig.in");
    basis.write(&path).unwrap();

    let read = ModeBasis::read(&path, np, 1..=4).unwrap();
    assert_eq!(read, basis);
    assert_eq!(read.omega2(), omega2.as_slice());

    let subset = ModeBasis::read(&path, np, 2..=3).unwrap();
    assert_eq!(subset.num_modes(), 2);
    assert_eq!(subset.omega2(), &omega2[1..3]);
    assert_eq!(subset.component(1, 0, 2), basis.component(1, 1, 2));
}

#[test]
fn eigenvector_mode_count_mismatch_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = unit_basis(dir.path());
    // the file holds two atoms per mode
    assert!(matches!(
        ModeBasis::read(&path, 3, 1..=6),
        Err(MdError::ModeMismatch(_))
    ));
    assert!(matches!(
        ModeBasis::read(&path, 2, 1..=7),
        Err(MdError::ModeMismatch(_))
    ));
    assert!(matches!(
        ModeBasis::read(dir.path().join("missing.in"), 2, 1..=6),
        Err(MdError::Config(_))
    ));
}

#[test]
fn frequencies_are_signed() {
    let dir = TempDir::new().unwrap();
    let basis = ModeBasis::read(unit_basis(dir.path()), 2, 1..=6).unwrap();
    let nu = basis.frequencies();
    let two_pi = 2.0 * std::f64::consts::PI;
    assert_relative_eq!(nu[0], -1.0 / two_pi);
    assert_relative_eq!(nu[3], 20.0 / two_pi);
}

#[test]
fn gkma_overwrites_every_sample() {
    let units = Units::natural();
    let dir = TempDir::new().unwrap();
    let ctx = context(&units, dir.path());
    let atoms = modal_atoms();
    let mut gkma =
        ModalAnalysis::new(modal_settings(ModalMethod::Gkma, unit_basis(dir.path()))).unwrap();
    gkma.preprocess(&ctx, &atoms).unwrap();

    gkma.process(0, &ctx, &atoms).unwrap();
    let first = gkma.mode_atom_currents().unwrap().to_vec();
    gkma.process(1, &ctx, &atoms).unwrap();
    assert_eq!(gkma.mode_atom_currents().unwrap(), first.as_slice());

    // a complete basis recovers the total heat current
    let mut total = [0.0; 5];
    for j in &first {
        for (t, c) in total.iter_mut().zip(j) {
            *t += c;
        }
    }
    let direct = direct_current(&atoms);
    for (t, d) in total.iter().zip(direct) {
        assert_relative_eq!(*t, d, epsilon = 1e-14);
    }

    let heatmode = read_table(dir.path().join("heatmode.out"));
    // three bins per sample, two samples
    assert_eq!(heatmode.len(), 6);
    assert!(heatmode.iter().all(|row| row.len() == 5));
    let conv = units.velocity_to_a_per_ps();
    let binned: f64 = heatmode[..3].iter().map(|row| row[4]).sum();
    assert_relative_eq!(binned, direct[4] * conv, max_relative = 1e-10);
}

#[test]
fn hnema_block_is_zeroed_after_flush() {
    let units = Units::natural();
    let dir = TempDir::new().unwrap();
    let ctx = context(&units, dir.path());
    let atoms = modal_atoms();
    let mut hnema =
        ModalAnalysis::new(modal_settings(ModalMethod::Hnema, unit_basis(dir.path()))).unwrap();
    hnema.preprocess(&ctx, &atoms).unwrap();

    hnema.process(0, &ctx, &atoms).unwrap();
    let once = hnema.mode_atom_currents().unwrap().to_vec();
    hnema.process(1, &ctx, &atoms).unwrap();
    assert_eq!(hnema.samples_in_block(), 2);
    assert_eq!(hnema.phase(), HnemaPhase::Accumulating);
    for (twice, once) in hnema.mode_atom_currents().unwrap().iter().zip(&once) {
        for (a, b) in twice.iter().zip(once) {
            assert_relative_eq!(*a, 2.0 * b, epsilon = 1e-15);
        }
    }

    // the completed block stays in the buffers until the next sample
    hnema.process(2, &ctx, &atoms).unwrap();
    assert_eq!(hnema.phase(), HnemaPhase::Flushing);
    assert_eq!(hnema.samples_in_block(), 3);

    let kappa = read_table(dir.path().join("kappamode.out"));
    assert_eq!(kappa.len(), 3);
    let factor = units.kappa_conversion
        / (ctx.volume * ctx.temperature * ctx.driving_force.norm() * 3.0);
    let z_total: f64 = kappa.iter().map(|row| row[4]).sum();
    // three identical samples averaged over the block
    assert_relative_eq!(
        z_total,
        3.0 * direct_current(&atoms)[4] * factor,
        max_relative = 1e-10
    );

    // the next sample starts a zeroed block
    hnema.process(3, &ctx, &atoms).unwrap();
    assert_eq!(hnema.phase(), HnemaPhase::Accumulating);
    assert_eq!(hnema.samples_in_block(), 1);
    for (fresh, once) in hnema.mode_atom_currents().unwrap().iter().zip(&once) {
        for (a, b) in fresh.iter().zip(once) {
            assert_relative_eq!(*a, *b, epsilon = 1e-15);
        }
    }
    assert_eq!(read_table(dir.path().join("kappamode.out")).len(), 3);
}

#[test]
fn hnema_block_written_at_run_end_is_not_dropped() {
    let units = Units::natural();
    let dir = TempDir::new().unwrap();
    let ctx = context(&units, dir.path());
    let atoms = modal_atoms();
    let mut hnema =
        ModalAnalysis::new(modal_settings(ModalMethod::Hnema, unit_basis(dir.path()))).unwrap();
    hnema.preprocess(&ctx, &atoms).unwrap();
    for step in 0..3 {
        hnema.process(step, &ctx, &atoms).unwrap();
    }
    assert_eq!(hnema.phase(), HnemaPhase::Flushing);
    hnema.postprocess(&ctx).unwrap();
    assert_eq!(hnema.phase(), HnemaPhase::Accumulating);
    assert!(hnema.mode_atom_currents().is_none());
    assert_eq!(read_table(dir.path().join("kappamode.out")).len(), 3);
}

#[test]
fn hnema_needs_driving_force() {
    let units = Units::natural();
    let dir = TempDir::new().unwrap();
    let mut ctx = context(&units, dir.path());
    ctx.driving_force = Vector3::zeros();
    let atoms = modal_atoms();
    let mut hnema =
        ModalAnalysis::new(modal_settings(ModalMethod::Hnema, unit_basis(dir.path()))).unwrap();
    assert!(hnema.preprocess(&ctx, &atoms).is_err());
}

#[test]
fn frequency_binning_from_basis() {
    let units = Units::natural();
    let dir = TempDir::new().unwrap();
    let ctx = context(&units, dir.path());
    let atoms = modal_atoms();
    let mut settings = modal_settings(ModalMethod::Gkma, unit_basis(dir.path()));
    settings.binning = BinningMode::Frequency { width: 1.0 };
    let mut gkma = ModalAnalysis::new(settings).unwrap();
    gkma.preprocess(&ctx, &atoms).unwrap();
    // |ν| = 0.16, 0.32, 0.48, 3.18, 3.26, 4.77 THz
    let binning = gkma.binning().unwrap();
    assert_eq!(binning.counts(), &[3, 0, 0, 2, 1]);
    assert_eq!(binning.num_modes(), 6);
}

#[test]
fn hnema_interval_must_align_with_samples() {
    let mut settings = modal_settings(ModalMethod::Hnema, PathBuf::from("unused"));
    settings.sample_interval = 2;
    assert!(ModalAnalysis::new(settings).is_err());
}
