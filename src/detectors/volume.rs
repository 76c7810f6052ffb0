// Volume (history) detectors: absorbed energy and fluence, recovered from
// consecutive history-point pairs through the absorption-weighting hook.

use crate::binning::{rho, which_bin};
use crate::optics::OpticalProperties;
use crate::photon::PhotonDataPoint;
use crate::range::DoubleRange;
use crate::weighting::{absorbed_weight, AbsorptionWeighting};

use super::{annulus_area, index_2d, Accumulator, Detector, DetectorOutput, HistoryDetector, TallyKind};

/// Total absorbed energy over the whole tissue.
pub struct ATotalDetector {
    name: String,
    weighting: AbsorptionWeighting,
    ops: Vec<OpticalProperties>,
    tally: Accumulator,
}

impl ATotalDetector {
    pub fn new(
        name: impl Into<String>,
        weighting: AbsorptionWeighting,
        ops: Vec<OpticalProperties>,
        second_moment: bool,
    ) -> Self {
        Self { name: name.into(), weighting, ops, tally: Accumulator::new(1, second_moment) }
    }
}

impl Detector for ATotalDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TallyKind {
        TallyKind::ATotal
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

impl HistoryDetector for ATotalDetector {
    fn tally_single(
        &mut self,
        previous: &PhotonDataPoint,
        current: &PhotonDataPoint,
        region_index: usize,
    ) {
        let weight = absorbed_weight(self.weighting, previous, current, &self.ops[region_index]);
        if weight != 0.0 {
            self.tally.add(0, weight);
        }
    }
}

/// Absorbed energy over rho and depth z.
pub struct AOfRhoAndZDetector {
    name: String,
    rho: DoubleRange,
    z: DoubleRange,
    weighting: AbsorptionWeighting,
    ops: Vec<OpticalProperties>,
    tally: Accumulator,
}

impl AOfRhoAndZDetector {
    pub fn new(
        name: impl Into<String>,
        rho: DoubleRange,
        z: DoubleRange,
        weighting: AbsorptionWeighting,
        ops: Vec<OpticalProperties>,
        second_moment: bool,
    ) -> Self {
        let bins = rho.bin_count() * z.bin_count();
        Self { name: name.into(), rho, z, weighting, ops, tally: Accumulator::new(bins, second_moment) }
    }
}

impl Detector for AOfRhoAndZDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TallyKind {
        TallyKind::AOfRhoAndZ
    }

    fn tally_count(&self) -> u64 {
        self.tally.tally_count
    }

    fn normalize(&mut self, num_photons: u64) {
        let (rho, z) = (self.rho, self.z);
        let cols = z.bin_count();
        self.tally.normalize(num_photons, |idx| {
            let ir = idx / cols;
            annulus_area(&rho, ir) * z.delta()
        });
    }

    fn output(&self) -> DetectorOutput {
        DetectorOutput {
            name: self.name.clone(),
            kind: self.kind(),
            axes: vec![self.rho, self.z],
            shape: vec![self.rho.bin_count(), self.z.bin_count()],
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

impl HistoryDetector for AOfRhoAndZDetector {
    fn tally_single(
        &mut self,
        previous: &PhotonDataPoint,
        current: &PhotonDataPoint,
        region_index: usize,
    ) {
        let weight = absorbed_weight(self.weighting, previous, current, &self.ops[region_index]);
        if weight == 0.0 {
            return;
        }
        let ir = which_bin(
            rho(current.position[0], current.position[1]),
            self.rho.bin_count(),
            self.rho.delta(),
            self.rho.start,
        );
        let iz = which_bin(current.position[2], self.z.bin_count(), self.z.delta(), self.z.start);
        self.tally.add(index_2d(ir, iz, self.z.bin_count()), weight);
    }
}

/// Fluence over rho and depth z, estimated as absorbed weight / mua.
pub struct FluenceOfRhoAndZDetector {
    name: String,
    rho: DoubleRange,
    z: DoubleRange,
    weighting: AbsorptionWeighting,
    ops: Vec<OpticalProperties>,
    tally: Accumulator,
}

impl FluenceOfRhoAndZDetector {
    pub fn new(
        name: impl Into<String>,
        rho: DoubleRange,
        z: DoubleRange,
        weighting: AbsorptionWeighting,
        ops: Vec<OpticalProperties>,
        second_moment: bool,
    ) -> Self {
        let bins = rho.bin_count() * z.bin_count();
        Self { name: name.into(), rho, z, weighting, ops, tally: Accumulator::new(bins, second_moment) }
    }
}

impl Detector for FluenceOfRhoAndZDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TallyKind {
        TallyKind::FluenceOfRhoAndZ
    }

    fn tally_count(&self) -> u64 {
        self.tally.tally_count
    }

    fn normalize(&mut self, num_photons: u64) {
        let (rho, z) = (self.rho, self.z);
        let cols = z.bin_count();
        self.tally.normalize(num_photons, |idx| {
            let ir = idx / cols;
            annulus_area(&rho, ir) * z.delta()
        });
    }

    fn output(&self) -> DetectorOutput {
        DetectorOutput {
            name: self.name.clone(),
            kind: self.kind(),
            axes: vec![self.rho, self.z],
            shape: vec![self.rho.bin_count(), self.z.bin_count()],
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

impl HistoryDetector for FluenceOfRhoAndZDetector {
    fn tally_single(
        &mut self,
        previous: &PhotonDataPoint,
        current: &PhotonDataPoint,
        region_index: usize,
    ) {
        let op = &self.ops[region_index];
        // fluence = absorbed / mua; a non-absorbing region deposits nothing
        if op.mua <= 0.0 {
            return;
        }
        let weight = absorbed_weight(self.weighting, previous, current, op) / op.mua;
        if weight == 0.0 {
            return;
        }
        let ir = which_bin(
            rho(current.position[0], current.position[1]),
            self.rho.bin_count(),
            self.rho.delta(),
            self.rho.start,
        );
        let iz = which_bin(current.position[2], self.z.bin_count(), self.z.delta(), self.z.start);
        self.tally.add(index_2d(ir, iz, self.z.bin_count()), weight);
    }
}

/// Time-resolved fluence over rho and depth z.
pub struct FluenceOfRhoAndZAndTimeDetector {
    name: String,
    rho: DoubleRange,
    z: DoubleRange,
    time: DoubleRange,
    weighting: AbsorptionWeighting,
    ops: Vec<OpticalProperties>,
    tally: Accumulator,
}

impl FluenceOfRhoAndZAndTimeDetector {
    pub fn new(
        name: impl Into<String>,
        rho: DoubleRange,
        z: DoubleRange,
        time: DoubleRange,
        weighting: AbsorptionWeighting,
        ops: Vec<OpticalProperties>,
        second_moment: bool,
    ) -> Self {
        let bins = rho.bin_count() * z.bin_count() * time.bin_count();
        Self {
            name: name.into(),
            rho,
            z,
            time,
            weighting,
            ops,
            tally: Accumulator::new(bins, second_moment),
        }
    }
}

impl Detector for FluenceOfRhoAndZAndTimeDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TallyKind {
        TallyKind::FluenceOfRhoAndZAndTime
    }

    fn tally_count(&self) -> u64 {
        self.tally.tally_count
    }

    fn normalize(&mut self, num_photons: u64) {
        let (rho, z, time) = (self.rho, self.z, self.time);
        let cols = z.bin_count() * time.bin_count();
        self.tally.normalize(num_photons, |idx| {
            let ir = idx / cols;
            annulus_area(&rho, ir) * z.delta() * time.delta()
        });
    }

    fn output(&self) -> DetectorOutput {
        DetectorOutput {
            name: self.name.clone(),
            kind: self.kind(),
            axes: vec![self.rho, self.z, self.time],
            shape: vec![self.rho.bin_count(), self.z.bin_count(), self.time.bin_count()],
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

impl HistoryDetector for FluenceOfRhoAndZAndTimeDetector {
    fn tally_single(
        &mut self,
        previous: &PhotonDataPoint,
        current: &PhotonDataPoint,
        region_index: usize,
    ) {
        let op = &self.ops[region_index];
        if op.mua <= 0.0 {
            return;
        }
        let weight = absorbed_weight(self.weighting, previous, current, op) / op.mua;
        if weight == 0.0 {
            return;
        }
        let ir = which_bin(
            rho(current.position[0], current.position[1]),
            self.rho.bin_count(),
            self.rho.delta(),
            self.rho.start,
        );
        let iz = which_bin(current.position[2], self.z.bin_count(), self.z.delta(), self.z.start);
        let it = which_bin(
            current.total_time(&self.ops),
            self.time.bin_count(),
            self.time.delta(),
            self.time.start,
        );
        let idx = (ir * self.z.bin_count() + iz) * self.time.bin_count() + it;
        self.tally.add(idx, weight);
    }
}

/// Radiance resolved over position (x, y, z) and direction (theta, phi).
pub struct RadianceOfXAndYAndZAndThetaAndPhiDetector {
    name: String,
    x: DoubleRange,
    y: DoubleRange,
    z: DoubleRange,
    theta: DoubleRange,
    phi: DoubleRange,
    weighting: AbsorptionWeighting,
    ops: Vec<OpticalProperties>,
    tally: Accumulator,
}

impl RadianceOfXAndYAndZAndThetaAndPhiDetector {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        x: DoubleRange,
        y: DoubleRange,
        z: DoubleRange,
        theta: DoubleRange,
        phi: DoubleRange,
        weighting: AbsorptionWeighting,
        ops: Vec<OpticalProperties>,
        second_moment: bool,
    ) -> Self {
        let bins = x.bin_count() * y.bin_count() * z.bin_count() * theta.bin_count() * phi.bin_count();
        Self {
            name: name.into(),
            x,
            y,
            z,
            theta,
            phi,
            weighting,
            ops,
            tally: Accumulator::new(bins, second_moment),
        }
    }

    fn flat_index(&self, ix: usize, iy: usize, iz: usize, ith: usize, iph: usize) -> usize {
        (((ix * self.y.bin_count() + iy) * self.z.bin_count() + iz) * self.theta.bin_count() + ith)
            * self.phi.bin_count()
            + iph
    }
}

impl Detector for RadianceOfXAndYAndZAndThetaAndPhiDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TallyKind {
        TallyKind::RadianceOfXAndYAndZAndThetaAndPhi
    }

    fn tally_count(&self) -> u64 {
        self.tally.tally_count
    }

    fn normalize(&mut self, num_photons: u64) {
        let voxel = self.x.delta() * self.y.delta() * self.z.delta();
        let (theta, phi) = (self.theta, self.phi);
        let angle_cols = theta.bin_count() * phi.bin_count();
        self.tally.normalize(num_photons, |idx| {
            let ith = (idx % angle_cols) / phi.bin_count();
            // solid angle of the (theta, phi) bin
            voxel * theta.midpoint(ith).sin() * theta.delta() * phi.delta()
        });
    }

    fn output(&self) -> DetectorOutput {
        DetectorOutput {
            name: self.name.clone(),
            kind: self.kind(),
            axes: vec![self.x, self.y, self.z, self.theta, self.phi],
            shape: vec![
                self.x.bin_count(),
                self.y.bin_count(),
                self.z.bin_count(),
                self.theta.bin_count(),
                self.phi.bin_count(),
            ],
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

impl HistoryDetector for RadianceOfXAndYAndZAndThetaAndPhiDetector {
    fn tally_single(
        &mut self,
        previous: &PhotonDataPoint,
        current: &PhotonDataPoint,
        region_index: usize,
    ) {
        let op = &self.ops[region_index];
        if op.mua <= 0.0 {
            return;
        }
        let weight = absorbed_weight(self.weighting, previous, current, op) / op.mua;
        if weight == 0.0 {
            return;
        }
        let ix = which_bin(current.position[0], self.x.bin_count(), self.x.delta(), self.x.start);
        let iy = which_bin(current.position[1], self.y.bin_count(), self.y.delta(), self.y.start);
        let iz = which_bin(current.position[2], self.z.bin_count(), self.z.delta(), self.z.start);
        let ith = which_bin(
            current.direction[2].clamp(-1.0, 1.0).acos(),
            self.theta.bin_count(),
            self.theta.delta(),
            self.theta.start,
        );
        let iph = which_bin(
            current.direction[1].atan2(current.direction[0]) + std::f64::consts::PI,
            self.phi.bin_count(),
            self.phi.delta(),
            self.phi.start,
        );
        self.tally.add(self.flat_index(ix, iy, iz, ith, iph), weight);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::photon::{PhotonState, PhotonStatus};
    use approx::assert_relative_eq;

    fn ops() -> Vec<OpticalProperties> {
        vec![
            OpticalProperties::ambient(),
            OpticalProperties::new(0.1, 0.9, 0.8, 1.4),
            OpticalProperties::ambient(),
        ]
    }

    fn point(z: f64, weight: f64) -> PhotonDataPoint {
        PhotonDataPoint {
            position: [0.0, 0.0, z],
            direction: [0.0, 0.0, 1.0],
            weight,
            status: PhotonStatus { state: PhotonState::InFlight, crossing: None },
            sub_region_info: Vec::new(),
        }
    }

    #[test]
    fn test_a_total_discrete_deposits_mua_fraction() {
        let mut det = ATotalDetector::new("Atot", AbsorptionWeighting::Discrete, ops(), true);
        det.tally_single(&point(0.5, 1.0), &point(1.0, 0.9), 1);
        let out = det.output();
        assert_relative_eq!(out.data.as_real().unwrap()[0], 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_a_of_rho_and_z_bins_by_current_position() {
        let mut det = AOfRhoAndZDetector::new(
            "A_rz",
            DoubleRange::new(0.0, 10.0, 11),
            DoubleRange::new(0.0, 10.0, 11),
            AbsorptionWeighting::Continuous,
            ops(),
            false,
        );
        det.tally_single(&point(0.0, 1.0), &point(2.5, 0.8), 1);
        let out = det.output();
        let data = out.data.as_real().unwrap();
        // rho bin 0, z bin 2, 10 columns
        assert_relative_eq!(data[2], 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_fluence_divides_by_mua() {
        let mut det = FluenceOfRhoAndZDetector::new(
            "Flu_rz",
            DoubleRange::new(0.0, 10.0, 11),
            DoubleRange::new(0.0, 10.0, 11),
            AbsorptionWeighting::Continuous,
            ops(),
            false,
        );
        det.tally_single(&point(0.0, 1.0), &point(0.5, 0.8), 1);
        let out = det.output();
        assert_relative_eq!(out.data.as_real().unwrap()[0], 0.2 / 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_time_resolved_fluence_binning() {
        let mut det = FluenceOfRhoAndZAndTimeDetector::new(
            "Flu_rzt",
            DoubleRange::new(0.0, 10.0, 11),
            DoubleRange::new(0.0, 10.0, 11),
            DoubleRange::new(0.0, 1.0, 11),
            AbsorptionWeighting::Continuous,
            ops(),
            false,
        );
        // give the current point some accumulated path for the time axis
        let mut curr = point(0.5, 0.8);
        curr.sub_region_info = vec![
            crate::photon::SubRegionInfo::default(),
            crate::photon::SubRegionInfo { path_length: 30.0, collision_count: 3 },
            crate::photon::SubRegionInfo::default(),
        ];
        det.tally_single(&point(0.0, 1.0), &curr, 1);
        assert_eq!(det.tally_count(), 1);
        let out = det.output();
        assert_eq!(out.shape, vec![10, 10, 10]);
        // t = 30 mm * 1.4 / c ~ 0.14 ns -> time bin 1
        let flat: f64 = out.data.as_real().unwrap().iter().sum();
        assert_relative_eq!(flat, 0.2 / 0.1, epsilon = 1e-12);
        let idx = (0 * 10 + 0) * 10 + 1;
        assert_relative_eq!(out.data.as_real().unwrap()[idx], 0.2 / 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_radiance_five_dimensional_shape() {
        let mut det = RadianceOfXAndYAndZAndThetaAndPhiDetector::new(
            "Rad_xyztp",
            DoubleRange::new(-5.0, 5.0, 6),
            DoubleRange::new(-5.0, 5.0, 6),
            DoubleRange::new(0.0, 10.0, 6),
            DoubleRange::new(0.0, std::f64::consts::PI, 5),
            DoubleRange::new(0.0, 2.0 * std::f64::consts::PI, 5),
            AbsorptionWeighting::Continuous,
            ops(),
            false,
        );
        det.tally_single(&point(0.0, 1.0), &point(0.5, 0.8), 1);
        let out = det.output();
        assert_eq!(out.shape, vec![5, 5, 5, 4, 4]);
        assert_eq!(out.data.len(), 5 * 5 * 5 * 4 * 4);
        let total: f64 = out.data.as_real().unwrap().iter().sum();
        assert_relative_eq!(total, 0.2 / 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_fluence_skips_non_absorbing_region() {
        let mut det = FluenceOfRhoAndZDetector::new(
            "Flu_rz",
            DoubleRange::new(0.0, 10.0, 11),
            DoubleRange::new(0.0, 10.0, 11),
            AbsorptionWeighting::Continuous,
            ops(),
            false,
        );
        det.tally_single(&point(0.0, 1.0), &point(0.5, 1.0), 0);
        assert_eq!(det.tally_count(), 0);
    }
}
