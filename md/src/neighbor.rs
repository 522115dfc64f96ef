//! Verlet neighbor list with a column-major index table.
//!
//! Neighbor `i` of atom `n` is stored at `list[i * number_of_atoms + n]`, which is the
//! layout the force kernels walk.

use crate::cell::SimBox;
use crate::error::{MdError, MdResult};
use nalgebra::Vector3;
use rayon::prelude::*;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct NeighborList {
    capacity: usize,
    count: Vec<usize>,
    list: Vec<usize>,
    cutoff: f64,
    skin: f64,
    /// positions at the last build, for the displacement criterion
    reference: Vec<Vector3<f64>>,
}

impl NeighborList {
    /// Assemble a list from explicit per-atom neighbor indices.
    pub fn from_neighbors(neighbors: &[Vec<usize>], capacity: usize) -> MdResult<Self> {
        let n_atoms = neighbors.len();
        let mut count = vec![0; n_atoms];
        let mut list = vec![0; capacity * n_atoms];
        for (n, atom_neighbors) in neighbors.iter().enumerate() {
            if atom_neighbors.len() > capacity {
                return Err(MdError::NeighborCapacity {
                    atom: n,
                    count: atom_neighbors.len(),
                    capacity,
                });
            }
            for (i, &m) in atom_neighbors.iter().enumerate() {
                if m >= n_atoms {
                    return Err(MdError::Config(format!(
                        "neighbor {} of atom {} is out of range",
                        m, n
                    )));
                }
                list[i * n_atoms + n] = m;
            }
            count[n] = atom_neighbors.len();
        }
        Ok(NeighborList {
            capacity,
            count,
            list,
            cutoff: 0.0,
            skin: 0.0,
            reference: Vec::new(),
        })
    }

    /// All-pairs search under the minimum-image convention within `cutoff + skin`.
    pub fn build(
        cell: &SimBox,
        positions: &[Vector3<f64>],
        cutoff: f64,
        skin: f64,
        capacity: usize,
    ) -> MdResult<Self> {
        let rc = cutoff + skin;
        cell.check_cutoff(rc)?;
        let rc2 = rc * rc;

        let neighbors: Vec<Vec<usize>> = positions
            .par_iter()
            .enumerate()
            .map(|(n, &ri)| {
                positions
                    .iter()
                    .enumerate()
                    .filter(|&(m, &rj)| m != n && cell.apply_mic(rj - ri).norm_squared() < rc2)
                    .map(|(m, _)| m)
                    .collect()
            })
            .collect();

        let mut built = Self::from_neighbors(&neighbors, capacity)?;
        built.cutoff = cutoff;
        built.skin = skin;
        built.reference = positions.to_vec();
        debug!(
            "Neighbor list built: {} atoms, max {} neighbors (capacity {})",
            positions.len(),
            built.max_count(),
            capacity
        );
        Ok(built)
    }

    /// True once any atom has moved more than half the skin since the last build.
    pub fn needs_rebuild(&self, cell: &SimBox, positions: &[Vector3<f64>]) -> bool {
        if self.reference.len() != positions.len() {
            return true;
        }
        let half_skin2 = 0.25 * self.skin * self.skin;
        positions
            .par_iter()
            .zip(self.reference.par_iter())
            .any(|(&r, &r0)| cell.apply_mic(r - r0).norm_squared() > half_skin2)
    }

    pub fn rebuild(&mut self, cell: &SimBox, positions: &[Vector3<f64>]) -> MdResult<()> {
        *self = Self::build(cell, positions, self.cutoff, self.skin, self.capacity)?;
        Ok(())
    }

    pub fn number_of_atoms(&self) -> usize {
        self.count.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn count(&self, n: usize) -> usize {
        self.count[n]
    }

    /// Neighbor in slot `i` of atom `n`.
    #[inline]
    pub fn neighbor(&self, n: usize, i: usize) -> usize {
        self.list[i * self.count.len() + n]
    }

    pub fn neighbors(&self, n: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.count[n]).map(move |i| self.neighbor(n, i))
    }

    /// Slot of `target` in the list of `n`, if present.
    pub fn slot_of(&self, n: usize, target: usize) -> Option<usize> {
        (0..self.count[n]).find(|&i| self.neighbor(n, i) == target)
    }

    pub fn max_count(&self) -> usize {
        self.count.iter().copied().max().unwrap_or(0)
    }
}
