use crate::error::{MdError, MdResult};
use nalgebra::{Matrix3, Vector3};

/// Partition of all atoms into labelled groups.
#[derive(Debug, Clone)]
pub struct Grouping {
    /// group id of every atom
    pub label: Vec<usize>,
    contents: Vec<Vec<usize>>,
}

impl Grouping {
    pub fn new(label: Vec<usize>) -> Self {
        let num_groups = label.iter().copied().max().map_or(0, |m| m + 1);
        let mut contents = vec![Vec::new(); num_groups];
        for (n, &g) in label.iter().enumerate() {
            contents[g].push(n);
        }
        Grouping { label, contents }
    }

    pub fn num_groups(&self) -> usize {
        self.contents.len()
    }

    /// Atom indices of `group`, ascending.
    pub fn contents(&self, group: usize) -> &[usize] {
        &self.contents[group]
    }
}

/// Per-atom state of the whole system. Every vector has length `number_of_atoms()`
/// and index `n` always refers to the same atom.
#[derive(Debug, Clone)]
pub struct AtomState {
    pub positions: Vec<Vector3<f64>>,
    pub velocities: Vec<Vector3<f64>>,
    pub masses: Vec<f64>,
    pub types: Vec<usize>,
    pub forces: Vec<Vector3<f64>>,
    pub potential: Vec<f64>,
    /// Per-atom virial, row-major (xx, xy, xz, yx, ...)
    pub virial: Vec<Matrix3<f64>>,
    pub groups: Vec<Grouping>,
}

impl AtomState {
    pub fn new(
        positions: Vec<Vector3<f64>>,
        velocities: Vec<Vector3<f64>>,
        masses: Vec<f64>,
        types: Vec<usize>,
    ) -> MdResult<Self> {
        let n = positions.len();
        if velocities.len() != n || masses.len() != n || types.len() != n {
            return Err(MdError::Config(format!(
                "atom arrays differ in length: {} positions, {} velocities, {} masses, {} types",
                n,
                velocities.len(),
                masses.len(),
                types.len()
            )));
        }
        Ok(AtomState {
            positions,
            velocities,
            masses,
            types,
            forces: vec![Vector3::zeros(); n],
            potential: vec![0.0; n],
            virial: vec![Matrix3::zeros(); n],
            groups: Vec::new(),
        })
    }

    pub fn number_of_atoms(&self) -> usize {
        self.positions.len()
    }

    pub fn add_grouping(&mut self, label: Vec<usize>) -> MdResult<()> {
        if label.len() != self.number_of_atoms() {
            return Err(MdError::Config(format!(
                "grouping has {} labels for {} atoms",
                label.len(),
                self.number_of_atoms()
            )));
        }
        self.groups.push(Grouping::new(label));
        Ok(())
    }

    /// Atoms of `group` in grouping `method`, validated.
    pub fn group_contents(&self, method: usize, group: usize) -> MdResult<&[usize]> {
        let grouping = self.groups.get(method).ok_or_else(|| {
            MdError::Config(format!(
                "grouping method {} requested but only {} defined",
                method,
                self.groups.len()
            ))
        })?;
        if group >= grouping.num_groups() || grouping.contents(group).is_empty() {
            return Err(MdError::Config(format!(
                "group {} of grouping method {} is empty",
                group, method
            )));
        }
        Ok(grouping.contents(group))
    }

    pub fn kinetic_energy(&self) -> f64 {
        self.velocities
            .iter()
            .zip(&self.masses)
            .map(|(v, &m)| 0.5 * m * v.dot(v))
            .sum()
    }

    pub fn potential_energy(&self) -> f64 {
        self.potential.iter().sum()
    }

    pub fn total_momentum(&self) -> Vector3<f64> {
        self.velocities
            .iter()
            .zip(&self.masses)
            .map(|(v, &m)| v * m)
            .sum()
    }

    /// Instantaneous temperature in K.
    pub fn temperature(&self, k_b: f64) -> f64 {
        let dof = 3 * self.number_of_atoms();
        if dof == 0 {
            return 0.0;
        }
        2.0 * self.kinetic_energy() / (dof as f64 * k_b)
    }

    pub fn zero_forces(&mut self) {
        self.forces.iter_mut().for_each(|f| *f = Vector3::zeros());
        self.potential.iter_mut().for_each(|p| *p = 0.0);
        self.virial.iter_mut().for_each(|w| *w = Matrix3::zeros());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn two_atoms() -> AtomState {
        AtomState::new(
            vec![Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0)],
            vec![Vector3::new(1.0, 0.0, 0.0), Vector3::new(-0.5, 0.0, 0.0)],
            vec![1.0, 2.0],
            vec![0, 0],
        )
        .unwrap()
    }

    #[test]
    fn momentum_and_kinetic_energy() {
        let atoms = two_atoms();
        assert_relative_eq!(atoms.total_momentum().norm(), 0.0, epsilon = 1e-14);
        assert_relative_eq!(atoms.kinetic_energy(), 0.5 + 0.25, epsilon = 1e-14);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let result = AtomState::new(vec![Vector3::zeros()], vec![], vec![1.0], vec![0]);
        assert!(result.is_err());
    }

    #[test]
    fn grouping_contents_are_ordered() {
        let mut atoms = two_atoms();
        atoms.add_grouping(vec![1, 0]).unwrap();
        assert_eq!(atoms.group_contents(0, 0).unwrap(), &[1]);
        assert_eq!(atoms.group_contents(0, 1).unwrap(), &[0]);
        assert!(atoms.group_contents(0, 2).is_err());
        assert!(atoms.group_contents(1, 0).is_err());
    }
}
