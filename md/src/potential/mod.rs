//! Interatomic potentials and the shared force-evaluation entry point.

mod many_body;
pub mod sw;

pub use many_body::{accumulate_many_body, PartialForces, MAX_NEIGHBOR_CAP};
pub use sw::{SwParameters, SwPotential};

use crate::atom::AtomState;
use crate::cell::SimBox;
use crate::error::MdResult;
use crate::neighbor::NeighborList;

/// A potential adds its energies, forces and virials for the atoms it owns.
pub trait Potential: Send {
    /// Largest interaction range in Å.
    fn cutoff(&self) -> f64;

    fn compute(
        &mut self,
        cell: &SimBox,
        neighbors: &NeighborList,
        atoms: &mut AtomState,
    ) -> MdResult<()>;
}

/// Runs every registered potential once per step on freshly zeroed outputs.
pub struct ForceEvaluator {
    potentials: Vec<Box<dyn Potential>>,
}

impl ForceEvaluator {
    pub fn new() -> Self {
        ForceEvaluator {
            potentials: Vec::new(),
        }
    }

    pub fn add(&mut self, potential: Box<dyn Potential>) {
        self.potentials.push(potential);
    }

    pub fn cutoff(&self) -> f64 {
        self.potentials
            .iter()
            .map(|p| p.cutoff())
            .fold(0.0, f64::max)
    }

    pub fn compute(
        &mut self,
        cell: &SimBox,
        neighbors: &NeighborList,
        atoms: &mut AtomState,
    ) -> MdResult<()> {
        atoms.zero_forces();
        for potential in &mut self.potentials {
            potential.compute(cell, neighbors, atoms)?;
        }
        Ok(())
    }
}

impl Default for ForceEvaluator {
    fn default() -> Self {
        Self::new()
    }
}
