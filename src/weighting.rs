use serde::{Deserialize, Serialize};

use crate::optics::OpticalProperties;
use crate::photon::{PhotonDataPoint, PhotonState};

/// Absorption weighting policy, selected per simulation.
///
/// The policy decides which interaction coefficient parameterizes the
/// free-flight sampling, how the photon weight evolves, and how history
/// detectors recover the absorbed energy between two consecutive history
/// points. [`absorbed_weight`] is the only place the choice is visible
/// outside the transport engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbsorptionWeighting {
    /// Weight stays 1.0 until a true absorption event is sampled; the
    /// photon then dies with its whole weight deposited at the collision.
    Analog,
    /// Discrete absorption weighting: weight multiplied by mus/(mua+mus)
    /// at every real collision.
    Discrete,
    /// Continuous absorption weighting: weight attenuated by
    /// exp(-mua * step) along every step.
    Continuous,
}

impl AbsorptionWeighting {
    /// Interaction coefficient used to sample the free-flight distance.
    pub fn sampling_coefficient(&self, op: &OpticalProperties) -> f64 {
        match self {
            AbsorptionWeighting::Analog | AbsorptionWeighting::Discrete => op.mut_total(),
            AbsorptionWeighting::Continuous => op.mus,
        }
    }

    /// Continuous attenuation applied when the photon moves `distance`
    /// through a region. Only CAW attenuates along the flight.
    pub fn step_attenuation(&self, op: &OpticalProperties, distance: f64) -> f64 {
        match self {
            AbsorptionWeighting::Continuous => (-op.mua * distance).exp(),
            _ => 1.0,
        }
    }

    /// Survival probability applied to the weight at a real collision.
    /// Analog handles absorption by sampling, not deweighting, so its
    /// factor is 1.
    pub fn collision_survival(&self, op: &OpticalProperties) -> f64 {
        match self {
            AbsorptionWeighting::Discrete => {
                let mut_total = op.mut_total();
                if mut_total > 0.0 { op.mus / mut_total } else { 1.0 }
            }
            _ => 1.0,
        }
    }

    /// Probability that an analog collision is an absorption.
    pub fn analog_absorption_probability(&self, op: &OpticalProperties) -> f64 {
        match self {
            AbsorptionWeighting::Analog => {
                let mut_total = op.mut_total();
                if mut_total > 0.0 { op.mua / mut_total } else { 0.0 }
            }
            _ => 0.0,
        }
    }
}

/// Absorbed-energy contribution between two consecutive history points,
/// under the given policy and the optical properties of the region the
/// segment ended in.
pub fn absorbed_weight(
    policy: AbsorptionWeighting,
    previous: &PhotonDataPoint,
    current: &PhotonDataPoint,
    op: &OpticalProperties,
) -> f64 {
    match policy {
        AbsorptionWeighting::Analog => {
            if current.status.state == PhotonState::Absorbed {
                previous.weight
            } else {
                0.0
            }
        }
        AbsorptionWeighting::Discrete => {
            // deposit happens at real collision sites only
            if current.status.is_pseudo_collision() {
                return 0.0;
            }
            match current.status.state {
                PhotonState::InFlight | PhotonState::Absorbed | PhotonState::KilledRoulette => {
                    let mut_total = op.mut_total();
                    if mut_total > 0.0 {
                        previous.weight * op.mua / mut_total
                    } else {
                        0.0
                    }
                }
                _ => 0.0,
            }
        }
        AbsorptionWeighting::Continuous => {
            // weight lost along the segment is the deposit; a roulette boost
            // raises the weight and must not count as negative absorption
            (previous.weight - current.weight).max(0.0)
        }
    }
}
