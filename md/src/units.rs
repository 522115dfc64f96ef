//! Unit system used throughout the engine.
//!
//! Internal units: length Å, energy eV, mass amu. The derived natural time unit is
//! `sqrt(amu·Å²/eV)` ≈ 10.18 fs. Output files are written in ps, THz and W/mK.

/// Immutable set of conversion constants, created once and passed by reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Units {
    /// Length of one natural time unit in fs
    pub time_unit_fs: f64,
    /// Boltzmann constant in eV/K
    pub k_b: f64,
    /// Converts eV/(Å·K·natural time) to W/(m·K)
    pub kappa_conversion: f64,
}

impl Units {
    pub const fn natural() -> Self {
        Units {
            time_unit_fs: 1.018_051e1,
            k_b: 8.617_343e-5,
            kappa_conversion: 1.573_769e5,
        }
    }

    /// Natural time units -> ps
    pub fn time_to_ps(&self, t: f64) -> f64 {
        t * self.time_unit_fs / 1000.0
    }

    /// fs -> natural time units
    pub fn fs_to_time(&self, t_fs: f64) -> f64 {
        t_fs / self.time_unit_fs
    }

    /// Factor that turns a natural velocity (Å per time unit) into Å/ps.
    pub fn velocity_to_a_per_ps(&self) -> f64 {
        1000.0 / self.time_unit_fs
    }
}

impl Default for Units {
    fn default() -> Self {
        Self::natural()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn time_conversions_invert() {
        let units = Units::natural();
        let t = units.fs_to_time(1.0);
        assert_relative_eq!(units.time_to_ps(t), 1.0e-3, epsilon = 1e-15);
    }

    #[test]
    fn velocity_factor_matches_time_unit() {
        let units = Units::natural();
        // 1 Å per time unit over 10.18 fs ≈ 98.2 Å/ps
        assert_relative_eq!(units.velocity_to_a_per_ps(), 98.227, epsilon = 1e-3);
    }
}
