use crate::detectors::{Detector, DetectorOutput, HistoryDetector, SurfaceDetector};
use crate::optics::OpticalProperties;
use crate::photon::{PhotonDataPoint, PhotonHistory};
use crate::tissue::Tissue;

/// Fans a photon's terminal data point out to surface detectors.
pub struct DetectorController {
    detectors: Vec<Box<dyn SurfaceDetector>>,
}

impl DetectorController {
    pub fn new(detectors: Vec<Box<dyn SurfaceDetector>>) -> Self {
        Self { detectors }
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    pub fn tally(&mut self, dp: &PhotonDataPoint, ops: &[OpticalProperties]) {
        for detector in &mut self.detectors {
            if detector.contains_point(dp) {
                detector.tally(dp, ops);
            }
        }
    }

    pub fn normalize(&mut self, num_photons: u64) {
        for detector in &mut self.detectors {
            detector.normalize(num_photons);
        }
    }

    pub fn outputs(&self) -> Vec<DetectorOutput> {
        self.detectors.iter().map(|d| d.output()).collect()
    }

    /// Fold a replica's raw sums into this controller, detector by
    /// detector. Replicas are built from the same inputs, so the order
    /// matches.
    pub fn merge(&mut self, replica_outputs: &[DetectorOutput]) {
        for (detector, output) in self.detectors.iter_mut().zip(replica_outputs) {
            detector.merge(output);
        }
    }
}

/// Walks a photon's history once and fans every consecutive point pair out
/// to all registered history detectors.
pub struct HistoryDetectorController {
    detectors: Vec<Box<dyn HistoryDetector>>,
}

impl HistoryDetectorController {
    pub fn new(detectors: Vec<Box<dyn HistoryDetector>>) -> Self {
        Self { detectors }
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    pub fn tally(&mut self, history: &PhotonHistory, tissue: &Tissue) {
        for (previous, current) in history.pairs() {
            let region_index = tissue.region_index(current.position);
            for detector in &mut self.detectors {
                detector.tally_single(previous, current, region_index);
            }
        }
    }

    pub fn normalize(&mut self, num_photons: u64) {
        for detector in &mut self.detectors {
            detector.normalize(num_photons);
        }
    }

    pub fn outputs(&self) -> Vec<DetectorOutput> {
        self.detectors.iter().map(|d| d.output()).collect()
    }

    pub fn merge(&mut self, replica_outputs: &[DetectorOutput]) {
        for (detector, output) in self.detectors.iter_mut().zip(replica_outputs) {
            detector.merge(output);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::{ATotalDetector, RDiffuseDetector, TDiffuseDetector};
    use crate::photon::{Photon, PhotonState};
    use crate::rng::PhotonRng;
    use crate::tissue::single_layer_slab;
    use crate::weighting::AbsorptionWeighting;
    use approx::assert_relative_eq;

    #[test]
    fn test_surface_controller_applies_contains_gate() {
        let mut controller = DetectorController::new(vec![
            Box::new(RDiffuseDetector::new("Rd", false)),
            Box::new(TDiffuseDetector::new("Td", false)),
        ]);
        let tissue = single_layer_slab(OpticalProperties::new(0.01, 1.0, 0.8, 1.4), 20.0);
        let mut photon = Photon::new([0.0, 0.0, 0.0], [0.0, 0.0, -1.0], 0.9, 0, 3, PhotonRng::new(1));
        photon.status.state = PhotonState::ExitedTop;
        let dp = photon.data_point();
        controller.tally(&dp, &tissue.optical_properties());
        let outputs = controller.outputs();
        assert_relative_eq!(outputs[0].data.as_real().unwrap()[0], 0.9);
        assert_relative_eq!(outputs[1].data.as_real().unwrap()[0], 0.0);
    }

    #[test]
    fn test_history_controller_walks_pairs_once() {
        let tissue = single_layer_slab(OpticalProperties::new(0.1, 0.9, 0.8, 1.4), 20.0);
        let mut controller = HistoryDetectorController::new(vec![Box::new(ATotalDetector::new(
            "Atot",
            AbsorptionWeighting::Discrete,
            tissue.optical_properties(),
            false,
        ))]);
        let mut photon = Photon::new([0.0, 0.0, 5.0], [0.0, 0.0, 1.0], 1.0, 1, 3, PhotonRng::new(1));
        // two real collisions deep inside the slab
        photon.move_by(1.0);
        photon.weight *= 0.9;
        photon.history.push(photon.data_point());
        photon.move_by(1.0);
        photon.weight *= 0.9;
        photon.history.push(photon.data_point());
        controller.tally(&photon.history, &tissue);
        let outputs = controller.outputs();
        // deposits: 1.0 * 0.1 + 0.9 * 0.1
        assert_relative_eq!(outputs[0].data.as_real().unwrap()[0], 0.19, epsilon = 1e-12);
    }
}
