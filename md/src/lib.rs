//! Classical molecular dynamics with a Stillinger-Weber potential and online phonon
//! analyses: velocity autocorrelation (DOS and self diffusion) and modal heat-current
//! decomposition (GKMA and HNEMA).

pub mod atom;
pub mod cell;
pub mod config;
pub mod error;
pub mod integrate;
pub mod measure;
pub mod neighbor;
pub mod potential;
pub mod run;
pub mod units;
pub mod velocity;

pub use atom::{AtomState, Grouping};
pub use cell::SimBox;
pub use config::MdConfig;
pub use error::{MdError, MdResult};
pub use integrate::{Integrator, NoseHoover, VelocityVerlet};
pub use neighbor::NeighborList;
pub use potential::{ForceEvaluator, Potential, SwParameters, SwPotential};
pub use run::{Simulation, Thermo};
pub use units::Units;
