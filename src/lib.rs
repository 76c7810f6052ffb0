//! Monte Carlo photon transport in layered and heterogeneous turbid media.
//!
//! The crate simulates photon random walks through tissue described as a
//! stack of layers with optional embedded inclusions, tallies
//! reflectance / transmittance / absorption / fluence observables through
//! a detector framework, and supports perturbation Monte Carlo (pMC)
//! post-processing: recomputing tallies for perturbed optical properties
//! from a recorded reference run instead of re-simulating it.

pub mod binning;
pub mod boundary;
pub mod controller;
pub mod database;
pub mod detectors;
pub mod error;
pub mod input;
pub mod io;
pub mod optics;
pub mod output;
pub mod phase;
pub mod photon;
pub mod pmc;
pub mod range;
pub mod region;
pub mod rng;
pub mod simulation;
pub mod source;
pub mod tissue;
pub mod transport;
pub mod weighting;

pub use boundary::{VirtualBoundaryGroup, VirtualBoundaryKind};
pub use database::PmcDatabase;
pub use detectors::{DetectorInput, DetectorOutput, TallyKind};
pub use error::{DatabaseError, FactoryError, SimulationError, ValidationError};
pub use input::{SimulationInput, SimulationOptions, TissueInput};
pub use optics::OpticalProperties;
pub use output::{SimulationOutput, SimulationStatistics};
pub use phase::PhaseFunction;
pub use photon::{Photon, PhotonState};
pub use pmc::PhotonDatabasePostProcessor;
pub use range::DoubleRange;
pub use region::TissueRegion;
pub use simulation::MonteCarloSimulation;
pub use source::{Source, SourceInput};
pub use tissue::Tissue;
pub use weighting::AbsorptionWeighting;
