//! Phonon eigenvector basis.
//!
//! File layout: the first line lists the signed squared angular frequencies `ω²`
//! ((rad/ps)², negative for imaginary modes), one per mode. The rest of the file holds,
//! for every mode, the x components of all participating atoms, then y, then z.

use crate::error::{MdError, MdResult};
use std::f64::consts::PI;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::ops::RangeInclusive;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct ModeBasis {
    num_participating: usize,
    omega2: Vec<f64>,
    /// component `dir` of atom `n` in mode `m` at `(dir + 3m) · np + n`
    eig: Vec<f64>,
}

fn parse_values(text: &str, what: &str) -> MdResult<Vec<f64>> {
    text.split_whitespace()
        .map(|token| {
            token
                .parse::<f64>()
                .map_err(|_| MdError::Parse(format!("invalid {} value '{}'", what, token)))
        })
        .collect()
}

impl ModeBasis {
    pub fn new(omega2: Vec<f64>, num_participating: usize, eig: Vec<f64>) -> MdResult<Self> {
        let expected = omega2.len() * 3 * num_participating;
        if eig.len() != expected {
            return Err(MdError::ModeMismatch(format!(
                "{} modes of {} atoms need {} components, got {}",
                omega2.len(),
                num_participating,
                expected,
                eig.len()
            )));
        }
        Ok(ModeBasis {
            num_participating,
            omega2,
            eig,
        })
    }

    /// Read the modes `modes` (1-based, inclusive) for `num_participating` atoms.
    pub fn read<P: AsRef<Path>>(
        path: P,
        num_participating: usize,
        modes: RangeInclusive<usize>,
    ) -> MdResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            MdError::Config(format!(
                "cannot read eigenvector file {}: {}",
                path.display(),
                e
            ))
        })?;
        let (header, body) = content.split_once('\n').unwrap_or((content.as_str(), ""));
        let omega2 = parse_values(header, "frequency")?;
        let num_modes = omega2.len();

        let (first, last) = (*modes.start(), *modes.end());
        if first == 0 || first > last || last > num_modes {
            return Err(MdError::ModeMismatch(format!(
                "mode range {}..={} is outside the {} modes in {}",
                first,
                last,
                num_modes,
                path.display()
            )));
        }

        let body = parse_values(body, "eigenvector")?;
        let per_mode = 3 * num_participating;
        if body.len() != num_modes * per_mode {
            return Err(MdError::ModeMismatch(format!(
                "{} lists {} modes, so {} atoms need {} components; found {}",
                path.display(),
                num_modes,
                num_participating,
                num_modes * per_mode,
                body.len()
            )));
        }

        let eig = body[(first - 1) * per_mode..last * per_mode].to_vec();
        info!(
            "Read modes {}..={} of {} for {} atoms from {}",
            first,
            last,
            num_modes,
            num_participating,
            path.display()
        );
        Self::new(omega2[first - 1..last].to_vec(), num_participating, eig)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> MdResult<()> {
        let mut out = BufWriter::new(File::create(path)?);
        let header: Vec<String> = self.omega2.iter().map(|w| format!("{:e}", w)).collect();
        writeln!(out, "{}", header.join(" "))?;
        for block in self.eig.chunks(self.num_participating.max(1)) {
            let line: Vec<String> = block.iter().map(|e| format!("{:e}", e)).collect();
            writeln!(out, "{}", line.join(" "))?;
        }
        out.flush()?;
        Ok(())
    }

    pub fn num_modes(&self) -> usize {
        self.omega2.len()
    }

    pub fn num_participating(&self) -> usize {
        self.num_participating
    }

    pub fn omega2(&self) -> &[f64] {
        &self.omega2
    }

    /// Signed frequencies `ν = sign(ω²) · sqrt(|ω²|) / 2π` in THz.
    pub fn frequencies(&self) -> Vec<f64> {
        self.omega2
            .iter()
            .map(|&w2| w2.signum() * w2.abs().sqrt() / (2.0 * PI))
            .collect()
    }

    #[inline]
    pub fn component(&self, dir: usize, mode: usize, atom: usize) -> f64 {
        self.eig[(dir + 3 * mode) * self.num_participating + atom]
    }

    /// The `num_participating` components of one direction of one mode.
    pub fn direction(&self, dir: usize, mode: usize) -> &[f64] {
        let start = (dir + 3 * mode) * self.num_participating;
        &self.eig[start..start + self.num_participating]
    }
}
