use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::detectors::DetectorOutput;
use crate::photon::PhotonState;

/// Counts of photon termination states over a run. Cheap enough to track
/// always; reported only when the options ask for statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationStatistics {
    pub exited_top: u64,
    pub exited_bottom: u64,
    pub exited_sides: u64,
    pub absorbed: u64,
    pub killed_path_length: u64,
    pub killed_collisions: u64,
    pub killed_roulette: u64,
}

impl SimulationStatistics {
    pub fn record(&mut self, state: PhotonState) {
        match state {
            PhotonState::ExitedTop => self.exited_top += 1,
            PhotonState::ExitedBottom => self.exited_bottom += 1,
            PhotonState::ExitedSides => self.exited_sides += 1,
            PhotonState::Absorbed => self.absorbed += 1,
            PhotonState::KilledPathLength => self.killed_path_length += 1,
            PhotonState::KilledCollisions => self.killed_collisions += 1,
            PhotonState::KilledRoulette => self.killed_roulette += 1,
            PhotonState::InFlight => {}
        }
    }

    pub fn merge(&mut self, other: &SimulationStatistics) {
        self.exited_top += other.exited_top;
        self.exited_bottom += other.exited_bottom;
        self.exited_sides += other.exited_sides;
        self.absorbed += other.absorbed;
        self.killed_path_length += other.killed_path_length;
        self.killed_collisions += other.killed_collisions;
        self.killed_roulette += other.killed_roulette;
    }

    pub fn total(&self) -> u64 {
        self.exited_top
            + self.exited_bottom
            + self.exited_sides
            + self.absorbed
            + self.killed_path_length
            + self.killed_collisions
            + self.killed_roulette
    }
}

/// Result bundle of a run: normalized detector outputs keyed by name, the
/// launched photon count, and the termination statistics.
#[derive(Debug, Clone)]
pub struct SimulationOutput {
    pub name: String,
    pub num_photons: u64,
    pub detectors: BTreeMap<String, DetectorOutput>,
    pub statistics: SimulationStatistics,
}

impl SimulationOutput {
    pub fn new(name: impl Into<String>, num_photons: u64) -> Self {
        Self {
            name: name.into(),
            num_photons,
            detectors: BTreeMap::new(),
            statistics: SimulationStatistics::default(),
        }
    }

    pub fn insert(&mut self, output: DetectorOutput) {
        self.detectors.insert(output.name.clone(), output);
    }

    pub fn detector(&self, name: &str) -> Option<&DetectorOutput> {
        self.detectors.get(name)
    }

    /// Scalar value of a 0-D detector, if present.
    pub fn scalar(&self, name: &str) -> Option<f64> {
        self.detector(name)
            .and_then(|d| d.data.as_real())
            .and_then(|v| v.first().copied())
    }

    /// Scalar second moment of a 0-D detector, if tracked.
    pub fn scalar_second_moment(&self, name: &str) -> Option<f64> {
        self.detector(name)
            .and_then(|d| d.second_moment.as_ref())
            .and_then(|sm| sm.as_real())
            .and_then(|v| v.first().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_record_and_total() {
        let mut stats = SimulationStatistics::default();
        stats.record(PhotonState::ExitedTop);
        stats.record(PhotonState::ExitedTop);
        stats.record(PhotonState::Absorbed);
        assert_eq!(stats.exited_top, 2);
        assert_eq!(stats.total(), 3);
    }

    #[test]
    fn test_statistics_merge() {
        let mut a = SimulationStatistics { exited_top: 1, ..Default::default() };
        let b = SimulationStatistics { absorbed: 2, ..Default::default() };
        a.merge(&b);
        assert_eq!(a.total(), 3);
    }
}
