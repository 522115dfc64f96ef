use crate::cell::SimBox;
use crate::error::{MdError, MdResult};
use crate::measure::{ModalSettings, VacSettings};
use crate::units::Units;
use crate::velocity::maxwell_boltzmann;
use nalgebra::{Matrix3, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Run file of a molecular dynamics simulation
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MdConfig {
    /// System setup parameters
    pub system: SystemConfig,
    /// Simulation ensemble and integration parameters
    pub simulation: SimulationConfig,
    /// Potential energy parameters
    pub potential: PotentialConfig,
    /// Output settings
    pub output: OutputConfig,
    /// Online measurements
    #[serde(default)]
    pub measure: MeasureConfig,
}

/// System setup configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Initial atomic positions (explicit or generated)
    pub positions: PositionConfig,
    /// Atom types (single value for all or per atom)
    #[serde(default = "default_types")]
    pub types: TypeConfig,
    /// Initial velocity configuration
    pub velocities: VelocityConfig,
    /// Atomic masses in amu (per atom or single value for all)
    pub masses: MassConfig,
    /// Simulation box configuration
    pub box_setup: BoxConfig,
    /// Grouping methods, referenced by index from the measurements
    #[serde(default)]
    pub groups: Vec<GroupingConfig>,
}

/// Position configuration options
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "type")]
pub enum PositionConfig {
    /// Explicit list of positions in Å
    #[serde(rename = "explicit")]
    Explicit { coords: Vec<[f64; 3]> },
    /// Simple cubic lattice
    #[serde(rename = "cubic_lattice")]
    CubicLattice {
        /// Number of atoms per side
        n_per_side: usize,
        /// Lattice spacing
        spacing: f64,
        /// Optional offset from origin
        offset: Option<[f64; 3]>,
    },
    /// Diamond lattice of conventional 8-atom cubic cells
    #[serde(rename = "diamond")]
    Diamond {
        lattice_constant: f64,
        /// Number of cells along x, y and z
        cells: [usize; 3],
    },
}

/// Type configuration options
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(untagged)]
pub enum TypeConfig {
    Uniform(usize),
    Individual(Vec<usize>),
}

/// Velocity configuration options
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "type")]
pub enum VelocityConfig {
    /// Explicit velocities in Å per natural time unit
    #[serde(rename = "explicit")]
    Explicit { velocities: Vec<[f64; 3]> },
    /// Maxwell-Boltzmann distribution at given temperature (K)
    #[serde(rename = "maxwell_boltzmann")]
    MaxwellBoltzmann {
        temperature: f64,
        /// Optional random seed
        seed: Option<u64>,
        /// Also remove the rigid rotation
        #[serde(default)]
        zero_angular_momentum: bool,
    },
    /// Zero initial velocities
    #[serde(rename = "zero")]
    Zero,
}

/// Mass configuration options
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(untagged)]
pub enum MassConfig {
    /// Single mass for all atoms
    Uniform(f64),
    /// Individual masses per atom
    Individual(Vec<f64>),
}

/// Simulation box configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BoxConfig {
    /// Box lengths [x, y, z] in Å; lattice positions default to the lattice extent
    #[serde(default)]
    pub lengths: Option<[f64; 3]>,
    /// General cell, rows are the cell vectors in Å; takes precedence over `lengths`
    #[serde(default)]
    pub lattice: Option<[[f64; 3]; 3]>,
    /// Periodic boundary conditions per axis
    #[serde(default = "default_periodic")]
    pub periodic: [bool; 3],
}

/// Grouping method options
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "type")]
pub enum GroupingConfig {
    /// Explicit group id per atom
    #[serde(rename = "labels")]
    Labels { labels: Vec<usize> },
    /// Equal-width slabs along one axis
    #[serde(rename = "slabs")]
    Slabs { axis: usize, count: usize },
}

/// Simulation configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SimulationConfig {
    /// Ensemble type and parameters
    pub ensemble: EnsembleConfig,
    /// Integration parameters
    pub integration: IntegrationConfig,
    /// Neighbor list parameters
    #[serde(default)]
    pub neighbor: NeighborConfig,
    /// HNEMD driving force F_e in 1/Å
    #[serde(default)]
    pub driving_force: Option<[f64; 3]>,
}

/// Ensemble configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "type")]
pub enum EnsembleConfig {
    /// Microcanonical (NVE) ensemble
    #[serde(rename = "nve")]
    NVE,
    /// Canonical (NVT) ensemble
    #[serde(rename = "nvt")]
    NVT {
        /// Target temperature in K
        target_temperature: f64,
        /// Thermostat period in time steps
        thermostat_coupling: f64,
    },
}

/// Integration parameters
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IntegrationConfig {
    /// Time step in fs
    pub time_step: f64,
    /// Total number of steps
    pub total_steps: usize,
}

/// Neighbor list parameters
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NeighborConfig {
    /// Verlet skin in Å
    #[serde(default = "default_skin")]
    pub skin: f64,
    /// Maximum neighbors per atom
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for NeighborConfig {
    fn default() -> Self {
        NeighborConfig {
            skin: default_skin(),
            capacity: default_capacity(),
        }
    }
}

/// Potential energy configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "type")]
pub enum PotentialConfig {
    /// Stillinger-Weber three-body potential
    #[serde(rename = "stillinger_weber")]
    StillingerWeber {
        /// Parameter file for `num_types` species
        parameter_file: PathBuf,
        num_types: usize,
        /// Atom type that maps to row 0 of the parameter table
        #[serde(default)]
        type_shift: usize,
    },
}

/// Output configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OutputConfig {
    /// Steps between thermo log lines
    pub thermo_interval: usize,
    /// Directory for measurement output files
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
}

/// Measurement configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct MeasureConfig {
    #[serde(default)]
    pub vac: Option<VacSettings>,
    #[serde(default)]
    pub modal: Option<ModalSettings>,
}

// Default value functions
fn default_types() -> TypeConfig {
    TypeConfig::Uniform(0)
}
fn default_periodic() -> [bool; 3] {
    [true; 3]
}
fn default_skin() -> f64 {
    1.0
}
fn default_capacity() -> usize {
    50
}
fn default_directory() -> PathBuf {
    PathBuf::from(".")
}

const DIAMOND_BASIS: [[f64; 3]; 8] = [
    [0.0, 0.0, 0.0],
    [0.0, 0.5, 0.5],
    [0.5, 0.0, 0.5],
    [0.5, 0.5, 0.0],
    [0.25, 0.25, 0.25],
    [0.25, 0.75, 0.75],
    [0.75, 0.25, 0.75],
    [0.75, 0.75, 0.25],
];

impl MdConfig {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> MdResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: MdConfig = serde_yml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> MdResult<()> {
        let content = serde_yml::to_string(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Command-line overrides for the step count and the velocity seed.
    pub fn apply_overrides(&mut self, steps: Option<usize>, seed: Option<u64>) {
        if let Some(steps) = steps {
            self.simulation.integration.total_steps = steps;
        }
        if let (Some(new_seed), VelocityConfig::MaxwellBoltzmann { seed, .. }) =
            (seed, &mut self.system.velocities)
        {
            *seed = Some(new_seed);
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> MdResult<()> {
        let invalid = |msg: &str| Err(MdError::Config(msg.to_string()));

        if self.simulation.integration.time_step <= 0.0 {
            return invalid("Time step must be positive");
        }
        if self.simulation.integration.total_steps == 0 {
            return invalid("Total steps must be positive");
        }

        if let EnsembleConfig::NVT {
            target_temperature,
            thermostat_coupling,
        } = &self.simulation.ensemble
        {
            if *target_temperature <= 0.0 {
                return invalid("Target temperature must be positive");
            }
            if *thermostat_coupling <= 0.0 {
                return invalid("Thermostat coupling must be positive");
            }
        }

        if self.simulation.neighbor.skin < 0.0 {
            return invalid("Neighbor skin must not be negative");
        }
        if self.simulation.neighbor.capacity == 0 {
            return invalid("Neighbor capacity must be positive");
        }

        match &self.potential {
            PotentialConfig::StillingerWeber { num_types, .. } => {
                if !(1..=3).contains(num_types) {
                    return invalid("Stillinger-Weber supports 1 to 3 atom types");
                }
            }
        }

        match &self.system.positions {
            PositionConfig::Explicit { coords } => {
                if coords.is_empty() {
                    return invalid("Explicit positions must not be empty");
                }
                if self.system.box_setup.lengths.is_none()
                    && self.system.box_setup.lattice.is_none()
                {
                    return invalid("Explicit positions need box lengths");
                }
            }
            PositionConfig::CubicLattice {
                n_per_side,
                spacing,
                ..
            } => {
                if *n_per_side == 0 || *spacing <= 0.0 {
                    return invalid("Cubic lattice needs positive size and spacing");
                }
            }
            PositionConfig::Diamond {
                lattice_constant,
                cells,
            } => {
                if *lattice_constant <= 0.0 || cells.contains(&0) {
                    return invalid("Diamond lattice needs positive constant and cell counts");
                }
            }
        }

        if let Some(lengths) = &self.system.box_setup.lengths {
            if lengths.iter().any(|&l| l <= 0.0) {
                return invalid("Box lengths must be positive");
            }
        }

        for grouping in &self.system.groups {
            if let GroupingConfig::Slabs { axis, count } = grouping {
                if *axis > 2 || *count == 0 {
                    return invalid("Slab grouping needs axis 0..=2 and a positive count");
                }
            }
        }

        if self.output.thermo_interval == 0 {
            return invalid("Thermo interval must be positive");
        }

        if let Some(vac) = &self.measure.vac {
            vac.validate()?;
        }
        if let Some(modal) = &self.measure.modal {
            modal.validate()?;
        }

        Ok(())
    }

    /// Temperature used by the thermostat and the HNEMA normalization.
    pub fn target_temperature(&self) -> f64 {
        match (&self.simulation.ensemble, &self.system.velocities) {
            (
                EnsembleConfig::NVT {
                    target_temperature, ..
                },
                _,
            ) => *target_temperature,
            (EnsembleConfig::NVE, VelocityConfig::MaxwellBoltzmann { temperature, .. }) => {
                *temperature
            }
            (EnsembleConfig::NVE, _) => 0.0,
        }
    }

    pub fn driving_force(&self) -> Vector3<f64> {
        self.simulation
            .driving_force
            .map_or_else(Vector3::zeros, |f| Vector3::new(f[0], f[1], f[2]))
    }

    /// Generate positions based on configuration
    pub fn generate_positions(&self) -> MdResult<Vec<Vector3<f64>>> {
        match &self.system.positions {
            PositionConfig::Explicit { coords } => Ok(coords
                .iter()
                .map(|&c| Vector3::new(c[0], c[1], c[2]))
                .collect()),
            PositionConfig::CubicLattice {
                n_per_side,
                spacing,
                offset,
            } => {
                let mut positions = Vec::new();
                let offset = offset.unwrap_or([0.0, 0.0, 0.0]);

                for i in 0..*n_per_side {
                    for j in 0..*n_per_side {
                        for k in 0..*n_per_side {
                            let pos = Vector3::new(
                                offset[0] + i as f64 * spacing,
                                offset[1] + j as f64 * spacing,
                                offset[2] + k as f64 * spacing,
                            );
                            positions.push(pos);
                        }
                    }
                }
                Ok(positions)
            }
            PositionConfig::Diamond {
                lattice_constant,
                cells,
            } => {
                let mut positions = Vec::with_capacity(8 * cells.iter().product::<usize>());
                for i in 0..cells[0] {
                    for j in 0..cells[1] {
                        for k in 0..cells[2] {
                            let corner = Vector3::new(i as f64, j as f64, k as f64);
                            for b in &DIAMOND_BASIS {
                                positions
                                    .push((corner + Vector3::from(*b)) * *lattice_constant);
                            }
                        }
                    }
                }
                Ok(positions)
            }
        }
    }

    /// Generate the simulation box, falling back to the lattice extent
    pub fn generate_box(&self) -> MdResult<SimBox> {
        if let Some(rows) = &self.system.box_setup.lattice {
            let lattice = Matrix3::from_columns(&rows.map(Vector3::from));
            return SimBox::triclinic(lattice, self.system.box_setup.periodic);
        }
        let lengths = match (&self.system.box_setup.lengths, &self.system.positions) {
            (Some(lengths), _) => Vector3::from(*lengths),
            (None, PositionConfig::CubicLattice {
                n_per_side,
                spacing,
                ..
            }) => Vector3::repeat(*n_per_side as f64 * spacing),
            (None, PositionConfig::Diamond {
                lattice_constant,
                cells,
            }) => Vector3::new(cells[0] as f64, cells[1] as f64, cells[2] as f64)
                * *lattice_constant,
            (None, PositionConfig::Explicit { .. }) => {
                return Err(MdError::Config(
                    "Explicit positions need box lengths".to_string(),
                ))
            }
        };
        Ok(SimBox::orthogonal(lengths, self.system.box_setup.periodic))
    }

    /// Generate atom types based on configuration
    pub fn generate_types(&self, n_atoms: usize) -> MdResult<Vec<usize>> {
        match &self.system.types {
            TypeConfig::Uniform(t) => Ok(vec![*t; n_atoms]),
            TypeConfig::Individual(types) => {
                if types.len() != n_atoms {
                    return Err(MdError::Config(format!(
                        "Number of types ({}) doesn't match number of atoms ({})",
                        types.len(),
                        n_atoms
                    )));
                }
                Ok(types.clone())
            }
        }
    }

    /// Generate velocities based on configuration
    pub fn generate_velocities(
        &self,
        positions: &[Vector3<f64>],
        masses: &[f64],
        units: &Units,
    ) -> MdResult<Vec<Vector3<f64>>> {
        let n_atoms = positions.len();
        match &self.system.velocities {
            VelocityConfig::Explicit { velocities } => {
                if velocities.len() != n_atoms {
                    return Err(MdError::Config(format!(
                        "Number of explicit velocities ({}) doesn't match number of atoms ({})",
                        velocities.len(),
                        n_atoms
                    )));
                }
                Ok(velocities
                    .iter()
                    .map(|&v| Vector3::new(v[0], v[1], v[2]))
                    .collect())
            }
            VelocityConfig::MaxwellBoltzmann {
                temperature,
                seed,
                zero_angular_momentum,
            } => {
                let mut rng = if let Some(seed) = seed {
                    StdRng::seed_from_u64(*seed)
                } else {
                    StdRng::from_entropy()
                };
                maxwell_boltzmann(
                    &mut rng,
                    positions,
                    masses,
                    *temperature,
                    units.k_b,
                    *zero_angular_momentum,
                )
            }
            VelocityConfig::Zero => Ok(vec![Vector3::zeros(); n_atoms]),
        }
    }

    /// Generate masses based on configuration
    pub fn generate_masses(&self, n_atoms: usize) -> MdResult<Vec<f64>> {
        match &self.system.masses {
            MassConfig::Uniform(mass) => {
                if *mass <= 0.0 {
                    return Err(MdError::Config("Mass must be positive".to_string()));
                }
                Ok(vec![*mass; n_atoms])
            }
            MassConfig::Individual(masses) => {
                if masses.len() != n_atoms {
                    return Err(MdError::Config(format!(
                        "Number of masses ({}) doesn't match number of atoms ({})",
                        masses.len(),
                        n_atoms
                    )));
                }
                if masses.iter().any(|&m| m <= 0.0) {
                    return Err(MdError::Config("All masses must be positive".to_string()));
                }
                Ok(masses.clone())
            }
        }
    }

    /// Group labels of every grouping method, in declaration order
    pub fn generate_groupings(
        &self,
        cell: &SimBox,
        positions: &[Vector3<f64>],
    ) -> MdResult<Vec<Vec<usize>>> {
        let thickness = cell.thickness();
        self.system
            .groups
            .iter()
            .map(|grouping| match grouping {
                GroupingConfig::Labels { labels } => {
                    if labels.len() != positions.len() {
                        return Err(MdError::Config(format!(
                            "Number of group labels ({}) doesn't match number of atoms ({})",
                            labels.len(),
                            positions.len()
                        )));
                    }
                    Ok(labels.clone())
                }
                GroupingConfig::Slabs { axis, count } => {
                    let width = thickness[*axis] / *count as f64;
                    Ok(positions
                        .iter()
                        .map(|r| {
                            let slab = (cell.wrap(*r)[*axis] / width).floor();
                            (slab.max(0.0) as usize).min(count - 1)
                        })
                        .collect())
                }
            })
            .collect()
    }
}
