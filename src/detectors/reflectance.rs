// Reflectance-side surface detectors. All of them consume the terminal
// history point of photons leaving through the top surface, except the
// specular detector, which is fed the launch point by its boundary.

use num_complex::Complex64;

use crate::binning::{rho, which_bin};
use crate::optics::OpticalProperties;
use crate::photon::{PhotonDataPoint, PhotonState};
use crate::range::DoubleRange;

use super::{
    angle_measure, annulus_area, index_2d, Accumulator, ComplexAccumulator, Detector,
    DetectorOutput, SurfaceDetector, TallyKind,
};

/// Total diffuse reflectance.
pub struct RDiffuseDetector {
    name: String,
    tally: Accumulator,
}

impl RDiffuseDetector {
    pub fn new(name: impl Into<String>, second_moment: bool) -> Self {
        Self { name: name.into(), tally: Accumulator::new(1, second_moment) }
    }
}

impl Detector for RDiffuseDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TallyKind {
        TallyKind::RDiffuse
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

impl SurfaceDetector for RDiffuseDetector {
    fn contains_point(&self, dp: &PhotonDataPoint) -> bool {
        dp.status.state == PhotonState::ExitedTop
    }

    fn tally(&mut self, dp: &PhotonDataPoint, _ops: &[OpticalProperties]) {
        self.tally.add(0, dp.weight);
    }
}

/// Specular reflectance at photon entry. The specular boundary feeds this
/// detector a synthetic point whose weight is the specular fraction.
pub struct RSpecularDetector {
    name: String,
    tally: Accumulator,
}

impl RSpecularDetector {
    pub fn new(name: impl Into<String>, second_moment: bool) -> Self {
        Self { name: name.into(), tally: Accumulator::new(1, second_moment) }
    }
}

impl Detector for RSpecularDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TallyKind {
        TallyKind::RSpecular
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

impl SurfaceDetector for RSpecularDetector {
    fn contains_point(&self, _dp: &PhotonDataPoint) -> bool {
        true
    }

    fn tally(&mut self, dp: &PhotonDataPoint, _ops: &[OpticalProperties]) {
        self.tally.add(0, dp.weight);
    }
}

/// Reflectance as a function of source-detector separation rho.
pub struct ROfRhoDetector {
    name: String,
    rho: DoubleRange,
    tally: Accumulator,
}

impl ROfRhoDetector {
    pub fn new(name: impl Into<String>, rho: DoubleRange, second_moment: bool) -> Self {
        let bins = rho.bin_count();
        Self { name: name.into(), rho, tally: Accumulator::new(bins, second_moment) }
    }
}

impl Detector for ROfRhoDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TallyKind {
        TallyKind::ROfRho
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

impl SurfaceDetector for ROfRhoDetector {
    fn contains_point(&self, dp: &PhotonDataPoint) -> bool {
        dp.status.state == PhotonState::ExitedTop
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

/// Reflectance binned by exit angle, measured from the outward normal of
/// the top surface.
pub struct ROfAngleDetector {
    name: String,
    angle: DoubleRange,
    tally: Accumulator,
}

impl ROfAngleDetector {
    pub fn new(name: impl Into<String>, angle: DoubleRange, second_moment: bool) -> Self {
        let bins = angle.bin_count();
        Self { name: name.into(), angle, tally: Accumulator::new(bins, second_moment) }
    }
}

impl Detector for ROfAngleDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TallyKind {
        TallyKind::ROfAngle
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

impl SurfaceDetector for ROfAngleDetector {
    fn contains_point(&self, dp: &PhotonDataPoint) -> bool {
        dp.status.state == PhotonState::ExitedTop
    }

    fn tally(&mut self, dp: &PhotonDataPoint, _ops: &[OpticalProperties]) {
        // exits through the top have uz < 0
        let theta = (-dp.direction[2]).clamp(-1.0, 1.0).acos();
        let ia = which_bin(theta, self.angle.bin_count(), self.angle.delta(), self.angle.start);
        self.tally.add(ia, dp.weight);
    }
}

/// Reflectance over rho and exit angle.
pub struct ROfRhoAndAngleDetector {
    name: String,
    rho: DoubleRange,
    angle: DoubleRange,
    tally: Accumulator,
}

impl ROfRhoAndAngleDetector {
    pub fn new(
        name: impl Into<String>,
        rho: DoubleRange,
        angle: DoubleRange,
        second_moment: bool,
    ) -> Self {
        let bins = rho.bin_count() * angle.bin_count();
        Self { name: name.into(), rho, angle, tally: Accumulator::new(bins, second_moment) }
    }
}

impl Detector for ROfRhoAndAngleDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TallyKind {
        TallyKind::ROfRhoAndAngle
    }

    fn tally_count(&self) -> u64 {
        self.tally.tally_count
    }

    fn normalize(&mut self, num_photons: u64) {
        let (rho, angle) = (self.rho, self.angle);
        let cols = angle.bin_count();
        self.tally.normalize(num_photons, |idx| {
            let (ir, ia) = (idx / cols, idx % cols);
            annulus_area(&rho, ir) * angle_measure(&angle, ia)
        });
    }

    fn output(&self) -> DetectorOutput {
        DetectorOutput {
            name: self.name.clone(),
            kind: self.kind(),
            axes: vec![self.rho, self.angle],
            shape: vec![self.rho.bin_count(), self.angle.bin_count()],
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

impl SurfaceDetector for ROfRhoAndAngleDetector {
    fn contains_point(&self, dp: &PhotonDataPoint) -> bool {
        dp.status.state == PhotonState::ExitedTop
    }

    fn tally(&mut self, dp: &PhotonDataPoint, _ops: &[OpticalProperties]) {
        let ir = which_bin(
            rho(dp.position[0], dp.position[1]),
            self.rho.bin_count(),
            self.rho.delta(),
            self.rho.start,
        );
        let theta = (-dp.direction[2]).clamp(-1.0, 1.0).acos();
        let ia = which_bin(theta, self.angle.bin_count(), self.angle.delta(), self.angle.start);
        self.tally.add(index_2d(ir, ia, self.angle.bin_count()), dp.weight);
    }
}

/// Time-resolved reflectance over rho. The time of flight is reconstructed
/// from the per-region path lengths and refractive indices.
pub struct ROfRhoAndTimeDetector {
    name: String,
    rho: DoubleRange,
    time: DoubleRange,
    tally: Accumulator,
}

impl ROfRhoAndTimeDetector {
    pub fn new(
        name: impl Into<String>,
        rho: DoubleRange,
        time: DoubleRange,
        second_moment: bool,
    ) -> Self {
        let bins = rho.bin_count() * time.bin_count();
        Self { name: name.into(), rho, time, tally: Accumulator::new(bins, second_moment) }
    }
}

impl Detector for ROfRhoAndTimeDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TallyKind {
        TallyKind::ROfRhoAndTime
    }

    fn tally_count(&self) -> u64 {
        self.tally.tally_count
    }

    fn normalize(&mut self, num_photons: u64) {
        let (rho, time) = (self.rho, self.time);
        let cols = time.bin_count();
        self.tally.normalize(num_photons, |idx| {
            let ir = idx / cols;
            annulus_area(&rho, ir) * time.delta()
        });
    }

    fn output(&self) -> DetectorOutput {
        DetectorOutput {
            name: self.name.clone(),
            kind: self.kind(),
            axes: vec![self.rho, self.time],
            shape: vec![self.rho.bin_count(), self.time.bin_count()],
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

impl SurfaceDetector for ROfRhoAndTimeDetector {
    fn contains_point(&self, dp: &PhotonDataPoint) -> bool {
        dp.status.state == PhotonState::ExitedTop
    }

    fn tally(&mut self, dp: &PhotonDataPoint, ops: &[OpticalProperties]) {
        let ir = which_bin(
            rho(dp.position[0], dp.position[1]),
            self.rho.bin_count(),
            self.rho.delta(),
            self.rho.start,
        );
        let it = which_bin(
            dp.total_time(ops),
            self.time.bin_count(),
            self.time.delta(),
            self.time.start,
        );
        self.tally.add(index_2d(ir, it, self.time.bin_count()), dp.weight);
    }
}

/// Reflectance on a Cartesian x/y grid.
pub struct ROfXAndYDetector {
    name: String,
    x: DoubleRange,
    y: DoubleRange,
    tally: Accumulator,
}

impl ROfXAndYDetector {
    pub fn new(name: impl Into<String>, x: DoubleRange, y: DoubleRange, second_moment: bool) -> Self {
        let bins = x.bin_count() * y.bin_count();
        Self { name: name.into(), x, y, tally: Accumulator::new(bins, second_moment) }
    }
}

impl Detector for ROfXAndYDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TallyKind {
        TallyKind::ROfXAndY
    }

    fn tally_count(&self) -> u64 {
        self.tally.tally_count
    }

    fn normalize(&mut self, num_photons: u64) {
        let area = self.x.delta() * self.y.delta();
        self.tally.normalize(num_photons, |_| area);
    }

    fn output(&self) -> DetectorOutput {
        DetectorOutput {
            name: self.name.clone(),
            kind: self.kind(),
            axes: vec![self.x, self.y],
            shape: vec![self.x.bin_count(), self.y.bin_count()],
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

impl SurfaceDetector for ROfXAndYDetector {
    fn contains_point(&self, dp: &PhotonDataPoint) -> bool {
        dp.status.state == PhotonState::ExitedTop
    }

    fn tally(&mut self, dp: &PhotonDataPoint, _ops: &[OpticalProperties]) {
        let ix = which_bin(dp.position[0], self.x.bin_count(), self.x.delta(), self.x.start);
        let iy = which_bin(dp.position[1], self.y.bin_count(), self.y.delta(), self.y.start);
        self.tally.add(index_2d(ix, iy, self.y.bin_count()), dp.weight);
    }
}

/// Spatial-frequency reflectance. The fx axis is sampled pointwise (one
/// complex value per axis point), not binned.
pub struct ROfFxDetector {
    name: String,
    fx: DoubleRange,
    tally: ComplexAccumulator,
}

impl ROfFxDetector {
    pub fn new(name: impl Into<String>, fx: DoubleRange, second_moment: bool) -> Self {
        let points = fx.count;
        Self { name: name.into(), fx, tally: ComplexAccumulator::new(points, second_moment) }
    }

    fn fx_value(&self, i: usize) -> f64 {
        self.fx.start + i as f64 * self.fx.delta()
    }
}

impl Detector for ROfFxDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TallyKind {
        TallyKind::ROfFx
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
            axes: vec![self.fx],
            shape: vec![self.fx.count],
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

impl SurfaceDetector for ROfFxDetector {
    fn contains_point(&self, dp: &PhotonDataPoint) -> bool {
        dp.status.state == PhotonState::ExitedTop
    }

    fn tally(&mut self, dp: &PhotonDataPoint, _ops: &[OpticalProperties]) {
        let x = dp.position[0];
        for i in 0..self.fx.count {
            let fx = self.fx_value(i);
            let phase = 2.0 * std::f64::consts::PI * fx * x;
            self.tally.add(i, dp.weight * Complex64::new(phase.cos(), phase.sin()));
        }
        self.tally.tally_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::photon::{BoundaryCrossing, PhotonStatus};
    use approx::assert_relative_eq;

    fn exit_point(x: f64, y: f64, weight: f64) -> PhotonDataPoint {
        PhotonDataPoint {
            position: [x, y, 0.0],
            direction: [0.0, 0.0, -1.0],
            weight,
            status: PhotonStatus {
                state: PhotonState::ExitedTop,
                crossing: Some(BoundaryCrossing::TopSurface),
            },
            sub_region_info: Vec::new(),
        }
    }

    #[test]
    fn test_r_of_rho_bins_by_radius() {
        let mut det = ROfRhoDetector::new("R_r", DoubleRange::new(0.0, 10.0, 101), true);
        det.tally(&exit_point(0.05, 0.0, 0.8), &[]);
        det.tally(&exit_point(0.0, 0.55, 0.5), &[]);
        let out = det.output();
        let data = out.data.as_real().unwrap();
        assert_relative_eq!(data[0], 0.8);
        assert_relative_eq!(data[5], 0.5);
        assert_eq!(out.tally_count, 2);
    }

    #[test]
    fn test_r_of_rho_normalization_annulus() {
        let rho = DoubleRange::new(0.0, 10.0, 101);
        let mut det = ROfRhoDetector::new("R_r", rho, true);
        det.tally(&exit_point(0.05, 0.0, 1.0), &[]);
        det.normalize(100);
        let out = det.output();
        let expected = 1.0 / (annulus_area(&rho, 0) * 100.0);
        assert_relative_eq!(out.data.as_real().unwrap()[0], expected, epsilon = 1e-12);
    }

    #[test]
    fn test_r_diffuse_ignores_bottom_exits() {
        let det = RDiffuseDetector::new("Rd", false);
        let mut bottom = exit_point(0.0, 0.0, 1.0);
        bottom.status.state = PhotonState::ExitedBottom;
        assert!(!det.contains_point(&bottom));
    }

    #[test]
    fn test_r_of_angle_bins_by_exit_cosine() {
        let angle = DoubleRange::new(0.0, std::f64::consts::FRAC_PI_2, 3);
        let mut det = ROfAngleDetector::new("R_a", angle, false);
        // straight up: theta = 0 -> bin 0
        det.tally(&exit_point(0.0, 0.0, 1.0), &[]);
        // oblique: uz = -0.3 -> theta ~ 1.266 -> bin 1
        let mut oblique = exit_point(0.0, 0.0, 1.0);
        oblique.direction = [0.954, 0.0, -0.3];
        det.tally(&oblique, &[]);
        let out = det.output();
        let data = out.data.as_real().unwrap();
        assert_relative_eq!(data[0], 1.0);
        assert_relative_eq!(data[1], 1.0);
    }

    #[test]
    fn test_r_of_x_and_y_flat_index() {
        let mut det = ROfXAndYDetector::new(
            "R_xy",
            DoubleRange::new(-1.0, 1.0, 3),
            DoubleRange::new(-1.0, 1.0, 3),
            false,
        );
        det.tally(&exit_point(0.5, -0.5, 1.0), &[]);
        let out = det.output();
        let data = out.data.as_real().unwrap();
        // x bin 1, y bin 0 with 2 columns
        assert_relative_eq!(data[2], 1.0);
    }

    #[test]
    fn test_r_of_fx_zero_frequency_equals_diffuse() {
        let mut det = ROfFxDetector::new("R_fx", DoubleRange::new(0.0, 0.5, 11), false);
        det.tally(&exit_point(1.0, 0.0, 0.7), &[]);
        det.tally(&exit_point(-2.0, 0.0, 0.3), &[]);
        det.normalize(2);
        let out = det.output();
        let data = out.data.as_complex().unwrap();
        // fx = 0 carries the plain weight sum / N
        assert_relative_eq!(data[0].re, 0.5, epsilon = 1e-12);
        assert_relative_eq!(data[0].im, 0.0, epsilon = 1e-12);
    }
}
