use crate::error::{MdError, MdResult};
use nalgebra::{Matrix3, Vector3};

/// Simulation cell with per-axis periodicity.
#[derive(Debug, Clone)]
pub enum SimBox {
    /// Rectangular box
    Orthogonal {
        lengths: Vector3<f64>,
        periodic: [bool; 3],
    },
    /// General cell, columns of `lattice` are the cell vectors
    Triclinic {
        lattice: Matrix3<f64>,
        inverse: Matrix3<f64>,
        periodic: [bool; 3],
    },
}

impl SimBox {
    pub fn orthogonal(lengths: Vector3<f64>, periodic: [bool; 3]) -> Self {
        SimBox::Orthogonal { lengths, periodic }
    }

    pub fn triclinic(lattice: Matrix3<f64>, periodic: [bool; 3]) -> MdResult<Self> {
        let inverse = lattice
            .try_inverse()
            .ok_or_else(|| MdError::Config("cell matrix is singular".to_string()))?;
        Ok(SimBox::Triclinic {
            lattice,
            inverse,
            periodic,
        })
    }

    pub fn periodic(&self) -> [bool; 3] {
        match self {
            SimBox::Orthogonal { periodic, .. } | SimBox::Triclinic { periodic, .. } => *periodic,
        }
    }

    pub fn volume(&self) -> f64 {
        match self {
            SimBox::Orthogonal { lengths, .. } => lengths.x * lengths.y * lengths.z,
            SimBox::Triclinic { lattice, .. } => lattice.determinant().abs(),
        }
    }

    /// Minimum-image displacement.
    #[inline]
    pub fn apply_mic(&self, mut d: Vector3<f64>) -> Vector3<f64> {
        match self {
            SimBox::Orthogonal { lengths, periodic } => {
                for k in 0..3 {
                    if periodic[k] {
                        let l = lengths[k];
                        d[k] -= l * (d[k] / l).round();
                    }
                }
                d
            }
            SimBox::Triclinic {
                lattice,
                inverse,
                periodic,
            } => {
                let mut s = inverse * d;
                for k in 0..3 {
                    if periodic[k] {
                        s[k] -= s[k].round();
                    }
                }
                lattice * s
            }
        }
    }

    /// Wrap a position into the primary cell along periodic directions.
    pub fn wrap(&self, mut r: Vector3<f64>) -> Vector3<f64> {
        match self {
            SimBox::Orthogonal { lengths, periodic } => {
                for k in 0..3 {
                    if periodic[k] {
                        let l = lengths[k];
                        r[k] -= l * (r[k] / l).floor();
                    }
                }
                r
            }
            SimBox::Triclinic {
                lattice,
                inverse,
                periodic,
            } => {
                let mut s = inverse * r;
                for k in 0..3 {
                    if periodic[k] {
                        s[k] -= s[k].floor();
                    }
                }
                lattice * s
            }
        }
    }

    /// Distance between opposite faces in each direction.
    pub fn thickness(&self) -> Vector3<f64> {
        match self {
            SimBox::Orthogonal { lengths, .. } => *lengths,
            SimBox::Triclinic { lattice, .. } => {
                let a = lattice.column(0).into_owned();
                let b = lattice.column(1).into_owned();
                let c = lattice.column(2).into_owned();
                let volume = self.volume();
                Vector3::new(
                    volume / b.cross(&c).norm(),
                    volume / c.cross(&a).norm(),
                    volume / a.cross(&b).norm(),
                )
            }
        }
    }

    /// The minimum image is only unique if the cutoff is below half the thickness
    /// of every periodic direction.
    pub fn check_cutoff(&self, cutoff: f64) -> MdResult<()> {
        let thickness = self.thickness();
        let periodic = self.periodic();
        for k in 0..3 {
            if periodic[k] && cutoff >= 0.5 * thickness[k] {
                return Err(MdError::Config(format!(
                    "cutoff {:.4} Å is not below half the box thickness {:.4} Å along axis {}",
                    cutoff, thickness[k], k
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn orthogonal_minimum_image() {
        let cell = SimBox::orthogonal(Vector3::new(10.0, 10.0, 10.0), [true, true, false]);
        let d = cell.apply_mic(Vector3::new(7.0, -6.0, 7.0));
        assert_relative_eq!(d.x, -3.0);
        assert_relative_eq!(d.y, 4.0);
        // non-periodic axis is untouched
        assert_relative_eq!(d.z, 7.0);
    }

    #[test]
    fn triclinic_matches_orthogonal_for_diagonal_cell() {
        let lengths = Vector3::new(8.0, 9.0, 10.0);
        let ortho = SimBox::orthogonal(lengths, [true; 3]);
        let tri = SimBox::triclinic(Matrix3::from_diagonal(&lengths), [true; 3]).unwrap();
        let d = Vector3::new(5.5, -7.0, 9.1);
        assert_relative_eq!(ortho.apply_mic(d), tri.apply_mic(d), epsilon = 1e-12);
        assert_relative_eq!(ortho.volume(), tri.volume(), epsilon = 1e-12);
    }

    #[test]
    fn wrap_brings_positions_into_cell() {
        let cell = SimBox::orthogonal(Vector3::new(5.0, 5.0, 5.0), [true; 3]);
        let r = cell.wrap(Vector3::new(-1.0, 6.0, 2.5));
        assert_relative_eq!(r, Vector3::new(4.0, 1.0, 2.5), epsilon = 1e-12);
    }

    #[test]
    fn cutoff_must_fit_in_box() {
        let cell = SimBox::orthogonal(Vector3::new(6.0, 6.0, 6.0), [true; 3]);
        assert!(cell.check_cutoff(2.9).is_ok());
        assert!(cell.check_cutoff(3.0).is_err());
    }

    #[test]
    fn singular_cell_is_rejected() {
        let lattice = Matrix3::new(1.0, 2.0, 3.0, 2.0, 4.0, 6.0, 0.0, 0.0, 1.0);
        assert!(SimBox::triclinic(lattice, [true; 3]).is_err());
    }
}
