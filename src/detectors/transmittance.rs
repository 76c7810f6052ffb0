// Transmittance-side surface detectors: photons leaving through the
// bottom surface.

use crate::binning::{rho, which_bin};
use crate::optics::OpticalProperties;
use crate::photon::{PhotonDataPoint, PhotonState};
use crate::range::DoubleRange;

use super::{
    angle_measure, annulus_area, Accumulator, Detector, DetectorOutput, SurfaceDetector, TallyKind,
};

/// Total diffuse transmittance.
pub struct TDiffuseDetector {
    name: String,
    tally: Accumulator,
}

impl TDiffuseDetector {
    pub fn new(name: impl Into<String>, second_moment: bool) -> Self {
        Self { name: name.into(), tally: Accumulator::new(1, second_moment) }
    }
}

impl Detector for TDiffuseDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TallyKind {
        TallyKind::TDiffuse
    }

    fn tally_count(&self) -> u64 {
        self.tally.tally_count
    }

    fn normalize(&mut self, num_photons: u64) {
        self.tally.normalize(num_photons, |_| 1.0);
    }

    fn output(&self) -> DetectorOutput {
        DetectorOutput {
            name: self.name.clone(),
            kind: self.kind(),
            axes: vec![],
            shape: vec![1],
            tally_count: self.tally.tally_count,
            has_second_moment: self.tally.second_moment.is_some(),
            data: self.tally.data(),
            second_moment: self.tally.second_moment_data(),
        }
    }

    fn merge(&mut self, other: &DetectorOutput) {
        self.tally.merge(other);
    }
}

impl SurfaceDetector for TDiffuseDetector {
    fn contains_point(&self, dp: &PhotonDataPoint) -> bool {
        dp.status.state == PhotonState::ExitedBottom
    }

    fn tally(&mut self, dp: &PhotonDataPoint, _ops: &[OpticalProperties]) {
        self.tally.add(0, dp.weight);
    }
}

/// Transmittance as a function of rho.
pub struct TOfRhoDetector {
    name: String,
    rho: DoubleRange,
    tally: Accumulator,
}

impl TOfRhoDetector {
    pub fn new(name: impl Into<String>, rho: DoubleRange, second_moment: bool) -> Self {
        let bins = rho.bin_count();
        Self { name: name.into(), rho, tally: Accumulator::new(bins, second_moment) }
    }
}

impl Detector for TOfRhoDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TallyKind {
        TallyKind::TOfRho
    }

    fn tally_count(&self) -> u64 {
        self.tally.tally_count
    }

    fn normalize(&mut self, num_photons: u64) {
        let rho = self.rho;
        self.tally.normalize(num_photons, |i| annulus_area(&rho, i));
    }

    fn output(&self) -> DetectorOutput {
        DetectorOutput {
            name: self.name.clone(),
            kind: self.kind(),
            axes: vec![self.rho],
            shape: vec![self.rho.bin_count()],
            tally_count: self.tally.tally_count,
            has_second_moment: self.tally.second_moment.is_some(),
            data: self.tally.data(),
            second_moment: self.tally.second_moment_data(),
        }
    }

    fn merge(&mut self, other: &DetectorOutput) {
        self.tally.merge(other);
    }
}

impl SurfaceDetector for TOfRhoDetector {
    fn contains_point(&self, dp: &PhotonDataPoint) -> bool {
        dp.status.state == PhotonState::ExitedBottom
    }

    fn tally(&mut self, dp: &PhotonDataPoint, _ops: &[OpticalProperties]) {
        let ir = which_bin(
            rho(dp.position[0], dp.position[1]),
            self.rho.bin_count(),
            self.rho.delta(),
            self.rho.start,
        );
        self.tally.add(ir, dp.weight);
    }
}

/// Transmittance binned by exit angle, measured from the outward normal of
/// the bottom surface.
pub struct TOfAngleDetector {
    name: String,
    angle: DoubleRange,
    tally: Accumulator,
}

impl TOfAngleDetector {
    pub fn new(name: impl Into<String>, angle: DoubleRange, second_moment: bool) -> Self {
        let bins = angle.bin_count();
        Self { name: name.into(), angle, tally: Accumulator::new(bins, second_moment) }
    }
}

impl Detector for TOfAngleDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TallyKind {
        TallyKind::TOfAngle
    }

    fn tally_count(&self) -> u64 {
        self.tally.tally_count
    }

    fn normalize(&mut self, num_photons: u64) {
        let angle = self.angle;
        self.tally.normalize(num_photons, |i| angle_measure(&angle, i));
    }

    fn output(&self) -> DetectorOutput {
        DetectorOutput {
            name: self.name.clone(),
            kind: self.kind(),
            axes: vec![self.angle],
            shape: vec![self.angle.bin_count()],
            tally_count: self.tally.tally_count,
            has_second_moment: self.tally.second_moment.is_some(),
            data: self.tally.data(),
            second_moment: self.tally.second_moment_data(),
        }
    }

    fn merge(&mut self, other: &DetectorOutput) {
        self.tally.merge(other);
    }
}

impl SurfaceDetector for TOfAngleDetector {
    fn contains_point(&self, dp: &PhotonDataPoint) -> bool {
        dp.status.state == PhotonState::ExitedBottom
    }

    fn tally(&mut self, dp: &PhotonDataPoint, _ops: &[OpticalProperties]) {
        // exits through the bottom have uz > 0
        let theta = dp.direction[2].clamp(-1.0, 1.0).acos();
        let ia = which_bin(theta, self.angle.bin_count(), self.angle.delta(), self.angle.start);
        self.tally.add(ia, dp.weight);
    }
}
