use serde::{Deserialize, Serialize};

use crate::boundary::VirtualBoundaryGroup;
use crate::error::ValidationError;
use crate::phase::PhaseFunction;
use crate::region::TissueRegion;
use crate::source::SourceInput;
use crate::tissue::Tissue;
use crate::weighting::AbsorptionWeighting;

/// Random number generator choice. One algorithm ships today; the enum is
/// the extension point for alternatives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RngKind {
    #[default]
    PcgLcg,
}

/// Knobs that apply to the whole run rather than a single component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationOptions {
    pub seed: u64,
    pub rng_kind: RngKind,
    pub absorption_weighting: AbsorptionWeighting,
    pub phase_function: PhaseFunction,
    /// Russian-roulette weight threshold; 0 disables roulette.
    pub russian_roulette_threshold: f64,
    pub tally_second_moment: bool,
    pub track_statistics: bool,
    /// Hard cap on real collisions per photon.
    pub max_collisions: u64,
    /// Hard cap on total path length per photon, in mm.
    pub max_path_length: f64,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            seed: 0,
            rng_kind: RngKind::PcgLcg,
            absorption_weighting: AbsorptionWeighting::Discrete,
            phase_function: PhaseFunction::HenyeyGreenstein,
            russian_roulette_threshold: 0.0,
            tally_second_moment: true,
            track_statistics: false,
            max_collisions: 100_000,
            max_path_length: 2_000.0,
        }
    }
}

/// Tissue descriptor: the layer stack plus an optional embedded inclusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TissueInput {
    pub layers: Vec<TissueRegion>,
    pub inclusion: Option<TissueRegion>,
}

impl TissueInput {
    pub fn multi_layer(layers: Vec<TissueRegion>) -> Self {
        Self { layers, inclusion: None }
    }

    pub fn with_inclusion(layers: Vec<TissueRegion>, inclusion: TissueRegion) -> Self {
        Self { layers, inclusion: Some(inclusion) }
    }

    pub fn build(&self) -> Result<Tissue, ValidationError> {
        match &self.inclusion {
            Some(inclusion) => Tissue::with_inclusion(self.layers.clone(), inclusion.clone()),
            None => Tissue::new(self.layers.clone()),
        }
    }
}

/// The full, already-typed descriptor bundle a simulation is built from.
/// Out-of-scope configuration loaders produce this; the core consumes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationInput {
    /// Number of photons to launch.
    pub n: u64,
    pub output_name: String,
    pub options: SimulationOptions,
    pub source: SourceInput,
    pub tissue: TissueInput,
    pub boundary_groups: Vec<VirtualBoundaryGroup>,
}

impl SimulationInput {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.n == 0 {
            return Err(ValidationError::InvalidInput {
                reason: "photon count is zero".to_string(),
                fix: "set n >= 1".to_string(),
            });
        }
        if self.options.russian_roulette_threshold < 0.0
            || self.options.russian_roulette_threshold >= 1.0
        {
            return Err(ValidationError::InvalidInput {
                reason: format!(
                    "russian roulette threshold {} outside [0, 1)",
                    self.options.russian_roulette_threshold
                ),
                fix: "use 0 to disable roulette or a small positive weight such as 0.01".to_string(),
            });
        }
        // tissue geometry errors surface from the build
        self.tissue.build().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optics::OpticalProperties;
    use crate::tissue::single_layer_slab;

    fn input() -> SimulationInput {
        SimulationInput {
            n: 100,
            output_name: "run".to_string(),
            options: SimulationOptions::default(),
            source: SourceInput::directional_point([0.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            tissue: TissueInput::multi_layer(
                single_layer_slab(OpticalProperties::new(0.01, 1.0, 0.8, 1.4), 20.0)
                    .regions()
                    .to_vec(),
            ),
            boundary_groups: vec![],
        }
    }

    #[test]
    fn test_valid_input_passes() {
        assert!(input().validate().is_ok());
    }

    #[test]
    fn test_zero_photons_rejected() {
        let mut bad = input();
        bad.n = 0;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_roulette_threshold_range_checked() {
        let mut bad = input();
        bad.options.russian_roulette_threshold = 1.5;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_input_serde_round_trip() {
        let original = input();
        let json = serde_json::to_string(&original).unwrap();
        let back: SimulationInput = serde_json::from_str(&json).unwrap();
        assert_eq!(original, back);
    }
}
