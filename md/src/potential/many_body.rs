use crate::cell::SimBox;
use crate::neighbor::NeighborList;
use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;
use std::ops::Range;

/// Upper bound on the neighbor slots kept per atom in a partial-force buffer.
pub const MAX_NEIGHBOR_CAP: usize = 50;

/// Per (atom, neighbor-slot) partial forces `f12 = ∂U_i/∂r_ij`.
///
/// Stored atom-major (`n * capacity + slot`) so that one atom's slots are contiguous
/// and can be written by a single worker.
#[derive(Debug, Clone)]
pub struct PartialForces {
    capacity: usize,
    number_of_atoms: usize,
    f12: Vec<Vector3<f64>>,
}

impl PartialForces {
    pub fn new(number_of_atoms: usize, neighbor_capacity: usize) -> Self {
        let capacity = neighbor_capacity.min(MAX_NEIGHBOR_CAP);
        PartialForces {
            capacity,
            number_of_atoms,
            f12: vec![Vector3::zeros(); number_of_atoms * capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn number_of_atoms(&self) -> usize {
        self.number_of_atoms
    }

    #[inline]
    pub fn get(&self, n: usize, slot: usize) -> Vector3<f64> {
        self.f12[n * self.capacity + slot]
    }

    /// Zero every slot. Must run before the buffer is repopulated.
    pub fn reset(&mut self) {
        self.f12.par_iter_mut().for_each(|f| *f = Vector3::zeros());
    }

    /// Mutable slots of the atoms in `range`, one chunk of `capacity` per atom.
    pub(crate) fn atoms_mut(&mut self, range: Range<usize>) -> &mut [Vector3<f64>] {
        &mut self.f12[range.start * self.capacity..range.end * self.capacity]
    }

    pub fn is_zero(&self) -> bool {
        self.f12.iter().all(|f| f.x == 0.0 && f.y == 0.0 && f.z == 0.0)
    }
}

/// Turn partial forces into atomic forces and per-atom virials for the atoms in `range`.
///
/// `F_i += f12(i, j) - f12(j, i)` and `W_i += r_ij ⊗ f12(j, i)` with `r_ij = r_j - r_i`.
/// A neighbor that does not list `i` back contributes no reverse partial.
pub fn accumulate_many_body(
    range: Range<usize>,
    partials: &PartialForces,
    neighbors: &NeighborList,
    cell: &SimBox,
    positions: &[Vector3<f64>],
    forces: &mut [Vector3<f64>],
    virial: &mut [Matrix3<f64>],
) {
    let start = range.start;
    forces[range.clone()]
        .par_iter_mut()
        .zip(virial[range].par_iter_mut())
        .enumerate()
        .for_each(|(offset, (force, w))| {
            let n1 = start + offset;
            let r1 = positions[n1];
            for i1 in 0..neighbors.count(n1) {
                let n2 = neighbors.neighbor(n1, i1);
                let f12 = partials.get(n1, i1);
                let f21 = neighbors
                    .slot_of(n2, n1)
                    .filter(|&slot| slot < partials.capacity())
                    .map_or_else(Vector3::zeros, |slot| partials.get(n2, slot));
                let r12 = cell.apply_mic(positions[n2] - r1);

                *force += f12 - f21;
                *w += r12 * f21.transpose();
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn capacity_is_capped() {
        let partials = PartialForces::new(10, 120);
        assert_eq!(partials.capacity(), MAX_NEIGHBOR_CAP);
        let partials = PartialForces::new(10, 12);
        assert_eq!(partials.capacity(), 12);
    }

    #[test]
    fn reset_zeroes_every_slot() {
        let mut partials = PartialForces::new(4, 3);
        partials
            .atoms_mut(0..4)
            .iter_mut()
            .enumerate()
            .for_each(|(k, f)| *f = Vector3::new(k as f64 + 1.0, -1.0, 2.0));
        assert!(!partials.is_zero());
        partials.reset();
        assert!(partials.is_zero());
    }

    #[test]
    fn pair_partials_obey_third_law() {
        let cell = SimBox::orthogonal(Vector3::new(20.0, 20.0, 20.0), [false; 3]);
        let positions = vec![Vector3::new(1.0, 1.0, 1.0), Vector3::new(2.0, 1.5, 1.0)];
        let neighbors = NeighborList::from_neighbors(&[vec![1], vec![0]], 4).unwrap();
        let mut partials = PartialForces::new(2, 4);
        // a central pair interaction: f12(i,j) = -f12(j,i)
        let f = Vector3::new(0.3, -0.2, 0.1);
        partials.atoms_mut(0..1)[0] = f;
        partials.atoms_mut(1..2)[0] = -f;

        let mut forces = vec![Vector3::zeros(); 2];
        let mut virial = vec![Matrix3::zeros(); 2];
        accumulate_many_body(
            0..2,
            &partials,
            &neighbors,
            &cell,
            &positions,
            &mut forces,
            &mut virial,
        );
        assert_relative_eq!(forces[0], 2.0 * f, epsilon = 1e-14);
        assert_relative_eq!(forces[0] + forces[1], Vector3::zeros(), epsilon = 1e-14);
        let r12 = positions[1] - positions[0];
        assert_relative_eq!(virial[0], r12 * (-f).transpose(), epsilon = 1e-14);
    }
}
