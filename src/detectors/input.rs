// Detector descriptors and the factory that turns them into live
// detectors. Built-in kinds are a closed enum; user-defined kinds register
// a constructor under a stable tag and are referenced as `Custom`.

use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::FactoryError;
use crate::optics::OpticalProperties;
use crate::range::DoubleRange;
use crate::tissue::Tissue;
use crate::weighting::AbsorptionWeighting;

use super::{
    AOfRhoAndZDetector, ATotalDetector, DMcDROfRhoDMuaDetector, DMcDROfRhoDMusDetector,
    DetectorInstance, FluenceOfRhoAndZAndTimeDetector, FluenceOfRhoAndZDetector,
    PmcROfRhoAndTimeDetector, PmcROfRhoDetector, RDiffuseDetector, ROfAngleDetector,
    ROfFxDetector, ROfRhoAndAngleDetector, ROfRhoAndTimeDetector, ROfRhoDetector,
    ROfXAndYDetector, RSpecularDetector, RadianceOfXAndYAndZAndThetaAndPhiDetector,
    TDiffuseDetector, TOfAngleDetector, TOfRhoDetector,
};

/// Descriptor from which a detector is constructed at simulation start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectorInput {
    RDiffuse { name: String },
    RSpecular { name: String },
    ROfRho { name: String, rho: DoubleRange },
    ROfAngle { name: String, angle: DoubleRange },
    ROfRhoAndAngle { name: String, rho: DoubleRange, angle: DoubleRange },
    ROfRhoAndTime { name: String, rho: DoubleRange, time: DoubleRange },
    ROfXAndY { name: String, x: DoubleRange, y: DoubleRange },
    ROfFx { name: String, fx: DoubleRange },
    TDiffuse { name: String },
    TOfRho { name: String, rho: DoubleRange },
    TOfAngle { name: String, angle: DoubleRange },
    ATotal { name: String },
    AOfRhoAndZ { name: String, rho: DoubleRange, z: DoubleRange },
    FluenceOfRhoAndZ { name: String, rho: DoubleRange, z: DoubleRange },
    FluenceOfRhoAndZAndTime { name: String, rho: DoubleRange, z: DoubleRange, time: DoubleRange },
    RadianceOfXAndYAndZAndThetaAndPhi {
        name: String,
        x: DoubleRange,
        y: DoubleRange,
        z: DoubleRange,
        theta: DoubleRange,
        phi: DoubleRange,
    },
    PmcROfRho {
        name: String,
        rho: DoubleRange,
        perturbed_ops: Vec<OpticalProperties>,
        perturbed_regions: Vec<usize>,
    },
    PmcROfRhoAndTime {
        name: String,
        rho: DoubleRange,
        time: DoubleRange,
        perturbed_ops: Vec<OpticalProperties>,
        perturbed_regions: Vec<usize>,
    },
    DMcDROfRhoDMua {
        name: String,
        rho: DoubleRange,
        perturbed_ops: Vec<OpticalProperties>,
        perturbed_regions: Vec<usize>,
    },
    DMcDROfRhoDMus {
        name: String,
        rho: DoubleRange,
        perturbed_ops: Vec<OpticalProperties>,
        perturbed_regions: Vec<usize>,
    },
    Custom { tag: String, params: serde_json::Value },
}

impl DetectorInput {
    pub fn name(&self) -> &str {
        match self {
            DetectorInput::RDiffuse { name }
            | DetectorInput::RSpecular { name }
            | DetectorInput::ROfRho { name, .. }
            | DetectorInput::ROfAngle { name, .. }
            | DetectorInput::ROfRhoAndAngle { name, .. }
            | DetectorInput::ROfRhoAndTime { name, .. }
            | DetectorInput::ROfXAndY { name, .. }
            | DetectorInput::ROfFx { name, .. }
            | DetectorInput::TDiffuse { name }
            | DetectorInput::TOfRho { name, .. }
            | DetectorInput::TOfAngle { name, .. }
            | DetectorInput::ATotal { name }
            | DetectorInput::AOfRhoAndZ { name, .. }
            | DetectorInput::FluenceOfRhoAndZ { name, .. }
            | DetectorInput::FluenceOfRhoAndZAndTime { name, .. }
            | DetectorInput::RadianceOfXAndYAndZAndThetaAndPhi { name, .. }
            | DetectorInput::PmcROfRho { name, .. }
            | DetectorInput::PmcROfRhoAndTime { name, .. }
            | DetectorInput::DMcDROfRhoDMua { name, .. }
            | DetectorInput::DMcDROfRhoDMus { name, .. } => name,
            DetectorInput::Custom { tag, .. } => tag,
        }
    }

    /// Construct the live detector. Unknown custom tags fail here, before
    /// transport starts.
    pub fn build(
        &self,
        tissue: &Tissue,
        weighting: AbsorptionWeighting,
        second_moment: bool,
    ) -> Result<DetectorInstance, FactoryError> {
        let ops = tissue.optical_properties();
        Ok(match self.clone() {
            DetectorInput::RDiffuse { name } => {
                DetectorInstance::Surface(Box::new(RDiffuseDetector::new(name, second_moment)))
            }
            DetectorInput::RSpecular { name } => {
                DetectorInstance::Surface(Box::new(RSpecularDetector::new(name, second_moment)))
            }
            DetectorInput::ROfRho { name, rho } => {
                DetectorInstance::Surface(Box::new(ROfRhoDetector::new(name, rho, second_moment)))
            }
            DetectorInput::ROfAngle { name, angle } => {
                DetectorInstance::Surface(Box::new(ROfAngleDetector::new(name, angle, second_moment)))
            }
            DetectorInput::ROfRhoAndAngle { name, rho, angle } => DetectorInstance::Surface(
                Box::new(ROfRhoAndAngleDetector::new(name, rho, angle, second_moment)),
            ),
            DetectorInput::ROfRhoAndTime { name, rho, time } => DetectorInstance::Surface(
                Box::new(ROfRhoAndTimeDetector::new(name, rho, time, second_moment)),
            ),
            DetectorInput::ROfXAndY { name, x, y } => {
                DetectorInstance::Surface(Box::new(ROfXAndYDetector::new(name, x, y, second_moment)))
            }
            DetectorInput::ROfFx { name, fx } => {
                DetectorInstance::Surface(Box::new(ROfFxDetector::new(name, fx, second_moment)))
            }
            DetectorInput::TDiffuse { name } => {
                DetectorInstance::Surface(Box::new(TDiffuseDetector::new(name, second_moment)))
            }
            DetectorInput::TOfRho { name, rho } => {
                DetectorInstance::Surface(Box::new(TOfRhoDetector::new(name, rho, second_moment)))
            }
            DetectorInput::TOfAngle { name, angle } => {
                DetectorInstance::Surface(Box::new(TOfAngleDetector::new(name, angle, second_moment)))
            }
            DetectorInput::ATotal { name } => DetectorInstance::History(Box::new(
                ATotalDetector::new(name, weighting, ops, second_moment),
            )),
            DetectorInput::AOfRhoAndZ { name, rho, z } => DetectorInstance::History(Box::new(
                AOfRhoAndZDetector::new(name, rho, z, weighting, ops, second_moment),
            )),
            DetectorInput::FluenceOfRhoAndZ { name, rho, z } => DetectorInstance::History(Box::new(
                FluenceOfRhoAndZDetector::new(name, rho, z, weighting, ops, second_moment),
            )),
            DetectorInput::FluenceOfRhoAndZAndTime { name, rho, z, time } => {
                DetectorInstance::History(Box::new(FluenceOfRhoAndZAndTimeDetector::new(
                    name,
                    rho,
                    z,
                    time,
                    weighting,
                    ops,
                    second_moment,
                )))
            }
            DetectorInput::RadianceOfXAndYAndZAndThetaAndPhi { name, x, y, z, theta, phi } => {
                DetectorInstance::History(Box::new(RadianceOfXAndYAndZAndThetaAndPhiDetector::new(
                    name,
                    x,
                    y,
                    z,
                    theta,
                    phi,
                    weighting,
                    ops,
                    second_moment,
                )))
            }
            DetectorInput::PmcROfRho { name, rho, perturbed_ops, perturbed_regions } => {
                validate_perturbation(self, &ops, &perturbed_ops, &perturbed_regions)?;
                DetectorInstance::Pmc(Box::new(PmcROfRhoDetector::new(
                    name,
                    rho,
                    ops,
                    perturbed_ops,
                    perturbed_regions,
                    second_moment,
                )))
            }
            DetectorInput::PmcROfRhoAndTime { name, rho, time, perturbed_ops, perturbed_regions } => {
                validate_perturbation(self, &ops, &perturbed_ops, &perturbed_regions)?;
                DetectorInstance::Pmc(Box::new(PmcROfRhoAndTimeDetector::new(
                    name,
                    rho,
                    time,
                    ops,
                    perturbed_ops,
                    perturbed_regions,
                    second_moment,
                )))
            }
            DetectorInput::DMcDROfRhoDMua { name, rho, perturbed_ops, perturbed_regions } => {
                validate_perturbation(self, &ops, &perturbed_ops, &perturbed_regions)?;
                DetectorInstance::Pmc(Box::new(DMcDROfRhoDMuaDetector::new(
                    name,
                    rho,
                    ops,
                    perturbed_ops,
                    perturbed_regions,
                    second_moment,
                )))
            }
            DetectorInput::DMcDROfRhoDMus { name, rho, perturbed_ops, perturbed_regions } => {
                validate_perturbation(self, &ops, &perturbed_ops, &perturbed_regions)?;
                DetectorInstance::Pmc(Box::new(DMcDROfRhoDMusDetector::new(
                    name,
                    rho,
                    ops,
                    perturbed_ops,
                    perturbed_regions,
                    second_moment,
                )))
            }
            DetectorInput::Custom { tag, params } => {
                let registry = DETECTOR_REGISTRY.read().expect("detector registry lock");
                let ctor = registry
                    .get(tag.as_str())
                    .ok_or_else(|| FactoryError::NoFactoryRegistered(tag.clone()))?;
                ctor(&params, tissue, weighting, second_moment)?
            }
        })
    }
}

fn validate_perturbation(
    input: &DetectorInput,
    reference_ops: &[OpticalProperties],
    perturbed_ops: &[OpticalProperties],
    perturbed_regions: &[usize],
) -> Result<(), FactoryError> {
    if perturbed_ops.len() != reference_ops.len() {
        return Err(FactoryError::MalformedInput {
            tag: input.name().to_string(),
            reason: format!(
                "perturbed_ops lists {} regions, tissue has {}",
                perturbed_ops.len(),
                reference_ops.len()
            ),
        });
    }
    if let Some(&bad) = perturbed_regions.iter().find(|&&i| i >= reference_ops.len()) {
        return Err(FactoryError::MalformedInput {
            tag: input.name().to_string(),
            reason: format!("perturbed region index {bad} out of range"),
        });
    }
    Ok(())
}

type DetectorCtor = fn(
    &serde_json::Value,
    &Tissue,
    AbsorptionWeighting,
    bool,
) -> Result<DetectorInstance, FactoryError>;

static DETECTOR_REGISTRY: Lazy<RwLock<HashMap<String, DetectorCtor>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register a constructor for a user-defined detector type under a stable
/// tag. Later registrations for the same tag win.
pub fn register_detector(tag: &str, ctor: DetectorCtor) {
    DETECTOR_REGISTRY
        .write()
        .expect("detector registry lock")
        .insert(tag.to_string(), ctor);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tissue::single_layer_slab;

    fn tissue() -> Tissue {
        single_layer_slab(OpticalProperties::new(0.01, 1.0, 0.8, 1.4), 20.0)
    }

    #[test]
    fn test_builtin_detectors_build() {
        let tissue = tissue();
        let inputs = vec![
            DetectorInput::RDiffuse { name: "Rd".to_string() },
            DetectorInput::ROfRho { name: "R_r".to_string(), rho: DoubleRange::new(0.0, 10.0, 101) },
            DetectorInput::ATotal { name: "Atot".to_string() },
        ];
        for input in inputs {
            let built = input.build(&tissue, AbsorptionWeighting::Discrete, true).unwrap();
            match input {
                DetectorInput::ATotal { .. } => assert!(matches!(built, DetectorInstance::History(_))),
                _ => assert!(matches!(built, DetectorInstance::Surface(_))),
            }
        }
    }

    #[test]
    fn test_unknown_custom_tag_fails_fast() {
        let input = DetectorInput::Custom {
            tag: "RadianceOfFancyMesh".to_string(),
            params: serde_json::json!({}),
        };
        let err = input
            .build(&tissue(), AbsorptionWeighting::Discrete, false)
            .unwrap_err();
        assert!(err.to_string().contains("no factory registered"));
    }

    #[test]
    fn test_registered_custom_detector_builds() {
        fn ctor(
            params: &serde_json::Value,
            _tissue: &Tissue,
            _weighting: AbsorptionWeighting,
            second_moment: bool,
        ) -> Result<DetectorInstance, FactoryError> {
            let name = params["name"].as_str().unwrap_or("custom").to_string();
            Ok(DetectorInstance::Surface(Box::new(RDiffuseDetector::new(name, second_moment))))
        }
        register_detector("TotalReflectanceClone", ctor);
        let input = DetectorInput::Custom {
            tag: "TotalReflectanceClone".to_string(),
            params: serde_json::json!({ "name": "Rd_custom" }),
        };
        assert!(input.build(&tissue(), AbsorptionWeighting::Analog, false).is_ok());
    }

    #[test]
    fn test_pmc_input_validates_region_count() {
        let input = DetectorInput::PmcROfRho {
            name: "pMC_R_r".to_string(),
            rho: DoubleRange::new(0.0, 10.0, 101),
            perturbed_ops: vec![OpticalProperties::ambient()],
            perturbed_regions: vec![1],
        };
        let err = input
            .build(&tissue(), AbsorptionWeighting::Discrete, false)
            .unwrap_err();
        assert!(err.to_string().contains("lists 1 regions"));
    }

    #[test]
    fn test_input_serde_round_trip() {
        let input = DetectorInput::ROfRhoAndTime {
            name: "R_rt".to_string(),
            rho: DoubleRange::new(0.0, 10.0, 101),
            time: DoubleRange::new(0.0, 1.0, 101),
        };
        let json = serde_json::to_string(&input).unwrap();
        let back: DetectorInput = serde_json::from_str(&json).unwrap();
        assert_eq!(input, back);
    }
}
