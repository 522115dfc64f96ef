//! Stillinger-Weber potential (Phys. Rev. B 31, 5262, 1985) for up to three species.
//!
//! The kernel writes per (atom, neighbor-slot) partial forces and leaves the
//! Newton's-third-law symmetrization to [`accumulate_many_body`].

use super::many_body::{accumulate_many_body, PartialForces};
use super::Potential;
use crate::atom::AtomState;
use crate::cell::SimBox;
use crate::error::{MdError, MdResult};
use crate::neighbor::NeighborList;
use nalgebra::Vector3;
use rayon::prelude::*;
use std::fs;
use std::ops::Range;
use std::path::Path;
use tracing::info;

const MAX_TYPES: usize = 3;

/// Two-body constants for one type pair.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SwPair {
    /// ε·A in eV
    pub a_energy: f64,
    pub b: f64,
    /// cutoff in units of sigma
    pub a: f64,
    pub sigma: f64,
    pub gamma: f64,
    /// a·sigma in Å
    pub rc: f64,
}

impl SwPair {
    fn new(a_energy: f64, b: f64, a: f64, sigma: f64, gamma: f64) -> Self {
        SwPair {
            a_energy,
            b,
            a,
            sigma,
            gamma,
            rc: a * sigma,
        }
    }

    /// Two-body energy `p2` and `f2 = (dp2/dr) / r`. Only valid for `r < rc`.
    #[inline]
    pub fn energy_and_force(&self, d12: f64) -> (f64, f64) {
        let r12 = d12 / self.sigma;
        let b_over_r4 = self.b / (r12 * r12 * r12 * r12);
        let exp_factor = self.a_energy * (1.0 / (r12 - self.a)).exp();
        let p2 = exp_factor * (b_over_r4 - 1.0);
        let dp2 = -p2 / ((r12 - self.a) * (r12 - self.a)) - exp_factor * 4.0 * b_over_r4 / r12;
        (p2, dp2 / (self.sigma * d12))
    }

    /// Radial factor `exp(γ / (r/σ - a))` of the three-body term.
    #[inline]
    fn three_body_exp(&self, d: f64) -> f64 {
        (self.gamma / (d / self.sigma - self.a)).exp()
    }
}

/// Three-body constants for one type triple (center first).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SwTriple {
    pub lambda: f64,
    pub cos0: f64,
}

#[derive(Debug, Clone)]
pub struct SwParameters {
    num_types: usize,
    pair: [[SwPair; MAX_TYPES]; MAX_TYPES],
    triple: TripleTable,
    rc_max: f64,
}

impl SwParameters {
    /// Number of values a parameter file must contain for `num_types` species.
    pub fn expected_count(num_types: usize) -> Option<usize> {
        match num_types {
            1 => Some(8),
            2 => Some(3 * 5 + 8 * 2),
            3 => Some(9 * 5 + 27 * 2),
            _ => None,
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P, num_types: usize) -> MdResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            MdError::Config(format!(
                "cannot read SW parameter file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content, num_types)
    }

    /// Parse whitespace-separated values.
    ///
    /// * 1 type: `epsilon lambda A B a gamma sigma cos0`
    /// * 2 types: three rows `A B a sigma gamma` for the pairs 00, 01, 11, then eight rows
    ///   `lambda cos0` for every (i, j, k)
    /// * 3 types: nine rows `A B a sigma gamma` for every (i, j), then 27 rows `lambda cos0`
    pub fn parse(content: &str, num_types: usize) -> MdResult<Self> {
        let expected = Self::expected_count(num_types).ok_or_else(|| {
            MdError::Config(format!(
                "SW potential supports 1 to 3 types, got {}",
                num_types
            ))
        })?;
        let values = content
            .split_whitespace()
            .map(|token| {
                token
                    .parse::<f64>()
                    .map_err(|_| MdError::Parse(format!("invalid SW parameter '{}'", token)))
            })
            .collect::<MdResult<Vec<f64>>>()?;
        if values.len() != expected {
            return Err(MdError::ParameterCount {
                what: format!("SW parameters for {} type(s)", num_types),
                expected,
                found: values.len(),
            });
        }

        let mut pair = [[SwPair::default(); MAX_TYPES]; MAX_TYPES];
        let mut triple: TripleTable = Default::default();

        match num_types {
            1 => {
                // epsilon lambda A B a gamma sigma cos0
                let epsilon = values[0];
                pair[0][0] = SwPair::new(epsilon * values[2], values[3], values[4], values[6], values[5]);
                triple[0][0][0] = SwTriple {
                    lambda: epsilon * values[1],
                    cos0: values[7],
                };
            }
            2 => {
                let rows: Vec<SwPair> = values[..15]
                    .chunks_exact(5)
                    .map(|r| SwPair::new(r[0], r[1], r[2], r[3], r[4]))
                    .collect();
                for n1 in 0..2 {
                    for n2 in 0..2 {
                        pair[n1][n2] = rows[n1 + n2];
                    }
                }
                fill_triples(&values[15..], 2, &mut triple)?;
            }
            _ => {
                for (k, r) in values[..45].chunks_exact(5).enumerate() {
                    pair[k / 3][k % 3] = SwPair::new(r[0], r[1], r[2], r[3], r[4]);
                }
                for n1 in 0..3 {
                    for n2 in (n1 + 1)..3 {
                        if pair[n1][n2] != pair[n2][n1] {
                            return Err(MdError::Config(format!(
                                "SW two-body parameters for types ({n1}, {n2}) and ({n2}, {n1}) differ"
                            )));
                        }
                    }
                }
                fill_triples(&values[45..], 3, &mut triple)?;
            }
        }

        let mut rc_max = 0.0_f64;
        for row in pair.iter().take(num_types) {
            for p in row.iter().take(num_types) {
                if p.sigma <= 0.0 || p.a <= 0.0 {
                    return Err(MdError::Config(
                        "SW sigma and a must be positive".to_string(),
                    ));
                }
                rc_max = rc_max.max(p.rc);
            }
        }

        Ok(SwParameters {
            num_types,
            pair,
            triple,
            rc_max,
        })
    }

    pub fn num_types(&self) -> usize {
        self.num_types
    }

    pub fn pair(&self, t1: usize, t2: usize) -> &SwPair {
        &self.pair[t1][t2]
    }

    pub fn triple(&self, t1: usize, t2: usize, t3: usize) -> &SwTriple {
        &self.triple[t1][t2][t3]
    }

    pub fn cutoff(&self) -> f64 {
        self.rc_max
    }
}

type TripleTable = [[[SwTriple; MAX_TYPES]; MAX_TYPES]; MAX_TYPES];

/// The kernel differentiates each (center, j, k) term with the full weight of the
/// unordered pair, so `lambda` and `cos0` must not depend on the order of j and k.
fn fill_triples(values: &[f64], num_types: usize, triple: &mut TripleTable) -> MdResult<()> {
    let mut rows = values.chunks_exact(2);
    for n1 in 0..num_types {
        for n2 in 0..num_types {
            for n3 in 0..num_types {
                if let Some(r) = rows.next() {
                    triple[n1][n2][n3] = SwTriple {
                        lambda: r[0],
                        cos0: r[1],
                    };
                }
            }
        }
    }
    for n1 in 0..num_types {
        for n2 in 0..num_types {
            for n3 in (n2 + 1)..num_types {
                if triple[n1][n2][n3] != triple[n1][n3][n2] {
                    return Err(MdError::Config(format!(
                        "SW three-body parameters for types ({n1}, {n2}, {n3}) and ({n1}, {n3}, {n2}) differ"
                    )));
                }
            }
        }
    }
    Ok(())
}

/// SW potential acting on a contiguous range of atoms.
pub struct SwPotential {
    params: SwParameters,
    range: Range<usize>,
    type_shift: usize,
    partials: PartialForces,
}

impl SwPotential {
    /// `range` selects the atoms this potential owns; their types minus `type_shift`
    /// index the parameter tables.
    pub fn new(
        params: SwParameters,
        range: Range<usize>,
        type_shift: usize,
        number_of_atoms: usize,
        neighbor_capacity: usize,
    ) -> MdResult<Self> {
        if neighbor_capacity == 0 {
            return Err(MdError::Config(
                "SW needs a positive neighbor capacity".to_string(),
            ));
        }
        if range.end > number_of_atoms || range.start > range.end {
            return Err(MdError::Config(format!(
                "SW atom range {:?} is outside 0..{}",
                range, number_of_atoms
            )));
        }
        let partials = PartialForces::new(number_of_atoms, neighbor_capacity);
        info!(
            "Use {}-element Stillinger-Weber potential on atoms {:?} (rc = {:.4} Å, {} partial slots per atom)",
            params.num_types(),
            range,
            params.cutoff(),
            partials.capacity()
        );
        Ok(SwPotential {
            params,
            range,
            type_shift,
            partials,
        })
    }

    pub fn parameters(&self) -> &SwParameters {
        &self.params
    }

    pub fn partials(&self) -> &PartialForces {
        &self.partials
    }

    /// Zero the partial-force buffer.
    pub fn reset_partials(&mut self) {
        self.partials.reset();
    }

    fn check_inputs(&self, neighbors: &NeighborList, types: &[usize]) -> MdResult<()> {
        if neighbors.number_of_atoms() != self.partials.number_of_atoms() {
            return Err(MdError::Config(format!(
                "neighbor list covers {} atoms, SW buffers were sized for {}",
                neighbors.number_of_atoms(),
                self.partials.number_of_atoms()
            )));
        }
        let capacity = self.partials.capacity();
        for n in self.range.clone() {
            let count = neighbors.count(n);
            if count > capacity {
                return Err(MdError::NeighborCapacity {
                    atom: n,
                    count,
                    capacity,
                });
            }
        }
        for n in self.range.clone() {
            self.local_type(types, n)?;
            for m in neighbors.neighbors(n) {
                self.local_type(types, m)?;
            }
        }
        Ok(())
    }

    fn local_type(&self, types: &[usize], n: usize) -> MdResult<usize> {
        types[n]
            .checked_sub(self.type_shift)
            .filter(|&t| t < self.params.num_types())
            .ok_or_else(|| {
                MdError::Config(format!(
                    "atom {} has type {} outside the SW types {}..{}",
                    n,
                    types[n],
                    self.type_shift,
                    self.type_shift + self.params.num_types()
                ))
            })
    }

    /// Fill the partial forces and add per-atom energies for the owned range.
    /// Expects a freshly reset buffer.
    pub fn compute_partials(
        &mut self,
        cell: &SimBox,
        neighbors: &NeighborList,
        positions: &[Vector3<f64>],
        types: &[usize],
        potential: &mut [f64],
    ) {
        let params = &self.params;
        let shift = self.type_shift;
        let capacity = self.partials.capacity();
        let start = self.range.start;

        self.partials
            .atoms_mut(self.range.clone())
            .par_chunks_mut(capacity)
            .zip(potential[self.range.clone()].par_iter_mut())
            .enumerate()
            .for_each(|(offset, (f12, pe))| {
                let n1 = start + offset;
                *pe += find_partials(params, shift, n1, cell, neighbors, positions, types, f12);
            });
    }
}

/// Partial forces of one atom against each of its neighbors; returns its energy.
#[allow(clippy::too_many_arguments)]
fn find_partials(
    params: &SwParameters,
    shift: usize,
    n1: usize,
    cell: &SimBox,
    neighbors: &NeighborList,
    positions: &[Vector3<f64>],
    types: &[usize],
    f12_out: &mut [Vector3<f64>],
) -> f64 {
    let t1 = types[n1] - shift;
    let r1 = positions[n1];
    let count = neighbors.count(n1);
    let mut energy = 0.0;

    for i1 in 0..count {
        let n2 = neighbors.neighbor(n1, i1);
        let t2 = types[n2] - shift;
        let p12 = params.pair(t1, t2);
        let r12 = cell.apply_mic(positions[n2] - r1);
        let d12 = r12.norm();
        if d12 >= p12.rc {
            continue;
        }
        let d12inv = 1.0 / d12;

        let (p2, f2) = p12.energy_and_force(d12);
        let mut f12 = r12 * (0.5 * f2);
        energy += 0.5 * p2;

        let exp12 = p12.three_body_exp(d12);
        // d/dr of γ/(r/σ - a), sign folded in below
        let dexp12 = p12.gamma / (p12.sigma * (d12 / p12.sigma - p12.a).powi(2));

        for i2 in 0..count {
            if i2 == i1 {
                continue;
            }
            let n3 = neighbors.neighbor(n1, i2);
            if n3 == n2 {
                continue;
            }
            let t3 = types[n3] - shift;
            let p13 = params.pair(t1, t3);
            let r13 = cell.apply_mic(positions[n3] - r1);
            let d13 = r13.norm();
            if d13 >= p13.rc {
                continue;
            }

            let exp13 = p13.three_body_exp(d13);
            let one_over_d12d13 = 1.0 / (d12 * d13);
            let cos123 = r12.dot(&r13) * one_over_d12d13;
            let tri = params.triple(t1, t2, t3);
            let cos_minus_cos0 = cos123 - tri.cos0;

            let tmp1 = tri.lambda * exp12 * exp13 * cos_minus_cos0;
            let tmp2 = dexp12 * cos_minus_cos0 * d12inv;

            // each unordered (j, k) is visited twice
            energy += 0.5 * tmp1 * cos_minus_cos0;

            let cos_d = r13 * one_over_d12d13 - r12 * (cos123 * d12inv * d12inv);
            f12 += (cos_d * 2.0 - r12 * tmp2) * tmp1;
        }

        f12_out[i1] = f12;
    }
    energy
}

impl Potential for SwPotential {
    fn cutoff(&self) -> f64 {
        self.params.cutoff()
    }

    fn compute(
        &mut self,
        cell: &SimBox,
        neighbors: &NeighborList,
        atoms: &mut AtomState,
    ) -> MdResult<()> {
        let AtomState {
            positions,
            types,
            forces,
            potential,
            virial,
            ..
        } = atoms;

        self.check_inputs(neighbors, types)?;
        self.reset_partials();
        self.compute_partials(cell, neighbors, positions, types, potential);
        accumulate_many_body(
            self.range.clone(),
            &self.partials,
            neighbors,
            cell,
            positions,
            forces,
            virial,
        );
        Ok(())
    }
}
