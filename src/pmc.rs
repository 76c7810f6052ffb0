// Perturbation Monte Carlo post-processing engine. Replays a recorded
// reference run from the paired photon/collision databases and re-tallies
// pMC/dMC detectors under perturbed optical properties, without
// re-simulating transport.

use tracing::info;

use crate::boundary::VirtualBoundaryKind;
use crate::database::PmcDatabase;
use crate::detectors::{DetectorInput, DetectorInstance, PmcDetector};
use crate::error::{FactoryError, SimulationError};
use crate::input::SimulationInput;
use crate::output::SimulationOutput;

/// Consumes a [`PmcDatabase`] and recomputes surface tallies for perturbed
/// optical properties from the recorded per-region path lengths and
/// collision counts.
pub struct PhotonDatabasePostProcessor {
    boundary_kind: VirtualBoundaryKind,
    detectors: Vec<Box<dyn PmcDetector>>,
    database: PmcDatabase,
    output_name: String,
    /// Photons launched by the reference run. The database holds only the
    /// photons that hit the capture boundary, so normalization must use
    /// this count, not the record count.
    num_photons: u64,
}

impl PhotonDatabasePostProcessor {
    /// Build the post-processor. Every detector input must resolve to a
    /// pMC-capable detector; anything else fails fast here.
    pub fn new(
        boundary_kind: VirtualBoundaryKind,
        detector_inputs: Vec<DetectorInput>,
        database: PmcDatabase,
        reference_input: &SimulationInput,
    ) -> Result<Self, SimulationError> {
        let tissue = reference_input.tissue.build()?;
        if database.num_regions() != tissue.region_count() {
            return Err(FactoryError::MalformedInput {
                tag: "pMC post-processor".to_string(),
                reason: format!(
                    "collision database records {} regions, reference tissue has {}",
                    database.num_regions(),
                    tissue.region_count()
                ),
            }
            .into());
        }
        let mut detectors = Vec::with_capacity(detector_inputs.len());
        for input in &detector_inputs {
            let instance = input.build(
                &tissue,
                reference_input.options.absorption_weighting,
                reference_input.options.tally_second_moment,
            )?;
            match instance {
                DetectorInstance::Pmc(detector) => detectors.push(detector),
                _ => {
                    return Err(FactoryError::MalformedInput {
                        tag: input.name().to_string(),
                        reason: "not a pMC/dMC detector; post-processing only drives those"
                            .to_string(),
                    }
                    .into())
                }
            }
        }
        Ok(Self {
            boundary_kind,
            detectors,
            database,
            output_name: format!("{}_pmc", reference_input.output_name),
            num_photons: reference_input.n,
        })
    }

    /// Stream the databases once, re-tally, normalize with the reference
    /// run's launched-photon count, and return the named outputs.
    pub fn run(mut self) -> Result<SimulationOutput, SimulationError> {
        let num_photons = self.num_photons;
        info!(
            photons = num_photons,
            records = self.database.count(),
            detectors = self.detectors.len(),
            "pMC post-processing"
        );
        let mut output = SimulationOutput::new(self.output_name.clone(), num_photons);
        while let Some((record, collision_info)) = self.database.read_next()? {
            output.statistics.record(record.state);
            let dp = record.to_data_point(collision_info.clone());
            if !self.boundary_kind.hit_by(&dp.status) {
                continue;
            }
            for detector in &mut self.detectors {
                detector.tally(&dp, &collision_info);
            }
        }
        for detector in &mut self.detectors {
            detector.normalize(num_photons);
            output.insert(detector.output());
        }
        Ok(output)
    }
}
