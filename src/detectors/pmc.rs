// Perturbation and differential Monte Carlo detectors. These replay the
// terminal points of a recorded reference run and reweight each photon by
// the likelihood ratio of its fixed random walk under perturbed optical
// properties, instead of re-simulating transport.

use crate::binning::{rho, time_delay, which_bin};
use crate::optics::OpticalProperties;
use crate::photon::{PhotonDataPoint, PhotonState, SubRegionInfo};
use crate::range::DoubleRange;

use super::{annulus_area, index_2d, Accumulator, Detector, DetectorOutput, PmcDetector, TallyKind};

/// Likelihood ratio of a recorded random walk under perturbed optical
/// properties.
///
/// For each perturbed region i with collision count C_i and path length
/// L_i: (mus_i'/mus_i)^C_i * exp(-(mua_i' + mus_i' - mua_i - mus_i) L_i).
/// The phase-function density cancels because the collision sites and
/// directions are held fixed.
pub fn perturbation_factor(
    reference_ops: &[OpticalProperties],
    perturbed_ops: &[OpticalProperties],
    perturbed_regions: &[usize],
    collision_info: &[SubRegionInfo],
) -> f64 {
    let mut factor = 1.0;
    for &i in perturbed_regions {
        let r = &reference_ops[i];
        let p = &perturbed_ops[i];
        let info = &collision_info[i];
        if info.collision_count > 0 {
            factor *= (p.mus / r.mus).powi(info.collision_count as i32);
        }
        factor *= (-(p.mua + p.mus - r.mua - r.mus) * info.path_length).exp();
    }
    factor
}

/// Partial derivative of [`perturbation_factor`] with respect to a common
/// shift of mua across the perturbed regions.
pub fn perturbation_factor_dmua(
    reference_ops: &[OpticalProperties],
    perturbed_ops: &[OpticalProperties],
    perturbed_regions: &[usize],
    collision_info: &[SubRegionInfo],
) -> f64 {
    let factor = perturbation_factor(reference_ops, perturbed_ops, perturbed_regions, collision_info);
    let path: f64 = perturbed_regions.iter().map(|&i| collision_info[i].path_length).sum();
    -path * factor
}

/// Partial derivative of [`perturbation_factor`] with respect to a common
/// shift of mus across the perturbed regions.
pub fn perturbation_factor_dmus(
    reference_ops: &[OpticalProperties],
    perturbed_ops: &[OpticalProperties],
    perturbed_regions: &[usize],
    collision_info: &[SubRegionInfo],
) -> f64 {
    let factor = perturbation_factor(reference_ops, perturbed_ops, perturbed_regions, collision_info);
    let slope: f64 = perturbed_regions
        .iter()
        .map(|&i| {
            let info = &collision_info[i];
            info.collision_count as f64 / perturbed_ops[i].mus - info.path_length
        })
        .sum();
    slope * factor
}

/// Shared state of the rho-binned pMC/dMC detector family.
struct PmcRho {
    name: String,
    rho: DoubleRange,
    reference_ops: Vec<OpticalProperties>,
    perturbed_ops: Vec<OpticalProperties>,
    perturbed_regions: Vec<usize>,
    tally: Accumulator,
}

impl PmcRho {
    fn new(
        name: String,
        rho: DoubleRange,
        reference_ops: Vec<OpticalProperties>,
        perturbed_ops: Vec<OpticalProperties>,
        perturbed_regions: Vec<usize>,
        second_moment: bool,
    ) -> Self {
        let bins = rho.bin_count();
        Self {
            name,
            rho,
            reference_ops,
            perturbed_ops,
            perturbed_regions,
            tally: Accumulator::new(bins, second_moment),
        }
    }

    fn rho_bin(&self, dp: &PhotonDataPoint) -> usize {
        which_bin(
            rho(dp.position[0], dp.position[1]),
            self.rho.bin_count(),
            self.rho.delta(),
            self.rho.start,
        )
    }

    fn normalize(&mut self, num_photons: u64) {
        let rho = self.rho;
        self.tally.normalize(num_photons, |i| annulus_area(&rho, i));
    }

    fn output(&self, kind: TallyKind) -> DetectorOutput {
        DetectorOutput {
            name: self.name.clone(),
            kind,
            axes: vec![self.rho],
            shape: vec![self.rho.bin_count()],
            tally_count: self.tally.tally_count,
            has_second_moment: self.tally.second_moment.is_some(),
            data: self.tally.data(),
            second_moment: self.tally.second_moment_data(),
        }
    }
}

/// pMC reflectance over rho under perturbed optical properties.
pub struct PmcROfRhoDetector {
    inner: PmcRho,
}

impl PmcROfRhoDetector {
    pub fn new(
        name: impl Into<String>,
        rho: DoubleRange,
        reference_ops: Vec<OpticalProperties>,
        perturbed_ops: Vec<OpticalProperties>,
        perturbed_regions: Vec<usize>,
        second_moment: bool,
    ) -> Self {
        Self {
            inner: PmcRho::new(
                name.into(),
                rho,
                reference_ops,
                perturbed_ops,
                perturbed_regions,
                second_moment,
            ),
        }
    }
}

impl Detector for PmcROfRhoDetector {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn kind(&self) -> TallyKind {
        TallyKind::PmcROfRho
    }

    fn tally_count(&self) -> u64 {
        self.inner.tally.tally_count
    }

    fn normalize(&mut self, num_photons: u64) {
        self.inner.normalize(num_photons);
    }

    fn output(&self) -> DetectorOutput {
        self.inner.output(self.kind())
    }

    fn merge(&mut self, other: &DetectorOutput) {
        self.inner.tally.merge(other);
    }
}

impl PmcDetector for PmcROfRhoDetector {
    fn tally(&mut self, dp: &PhotonDataPoint, collision_info: &[SubRegionInfo]) {
        if dp.status.state != PhotonState::ExitedTop {
            return;
        }
        let factor = perturbation_factor(
            &self.inner.reference_ops,
            &self.inner.perturbed_ops,
            &self.inner.perturbed_regions,
            collision_info,
        );
        let ir = self.inner.rho_bin(dp);
        self.inner.tally.add(ir, dp.weight * factor);
    }
}

/// pMC time-resolved reflectance over rho. The time of flight is rebuilt
/// from the recorded per-region path lengths; a mua/mus perturbation does
/// not change it.
pub struct PmcROfRhoAndTimeDetector {
    inner: PmcRho,
    time: DoubleRange,
}

impl PmcROfRhoAndTimeDetector {
    pub fn new(
        name: impl Into<String>,
        rho: DoubleRange,
        time: DoubleRange,
        reference_ops: Vec<OpticalProperties>,
        perturbed_ops: Vec<OpticalProperties>,
        perturbed_regions: Vec<usize>,
        second_moment: bool,
    ) -> Self {
        let mut inner = PmcRho::new(
            name.into(),
            rho,
            reference_ops,
            perturbed_ops,
            perturbed_regions,
            second_moment,
        );
        inner.tally = Accumulator::new(rho.bin_count() * time.bin_count(), second_moment);
        Self { inner, time }
    }
}

impl Detector for PmcROfRhoAndTimeDetector {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn kind(&self) -> TallyKind {
        TallyKind::PmcROfRhoAndTime
    }

    fn tally_count(&self) -> u64 {
        self.inner.tally.tally_count
    }

    fn normalize(&mut self, num_photons: u64) {
        let rho = self.inner.rho;
        let time = self.time;
        let cols = time.bin_count();
        self.inner.tally.normalize(num_photons, |idx| {
            let ir = idx / cols;
            annulus_area(&rho, ir) * time.delta()
        });
    }

    fn output(&self) -> DetectorOutput {
        DetectorOutput {
            name: self.inner.name.clone(),
            kind: self.kind(),
            axes: vec![self.inner.rho, self.time],
            shape: vec![self.inner.rho.bin_count(), self.time.bin_count()],
            tally_count: self.inner.tally.tally_count,
            has_second_moment: self.inner.tally.second_moment.is_some(),
            data: self.inner.tally.data(),
            second_moment: self.inner.tally.second_moment_data(),
        }
    }

    fn merge(&mut self, other: &DetectorOutput) {
        self.inner.tally.merge(other);
    }
}

impl PmcDetector for PmcROfRhoAndTimeDetector {
    fn tally(&mut self, dp: &PhotonDataPoint, collision_info: &[SubRegionInfo]) {
        if dp.status.state != PhotonState::ExitedTop {
            return;
        }
        let factor = perturbation_factor(
            &self.inner.reference_ops,
            &self.inner.perturbed_ops,
            &self.inner.perturbed_regions,
            collision_info,
        );
        let total_time: f64 = collision_info
            .iter()
            .zip(&self.inner.reference_ops)
            .map(|(info, op)| time_delay(info.path_length, op.n))
            .sum();
        let ir = self.inner.rho_bin(dp);
        let it = which_bin(total_time, self.time.bin_count(), self.time.delta(), self.time.start);
        self.inner
            .tally
            .add(index_2d(ir, it, self.time.bin_count()), dp.weight * factor);
    }
}

/// Sensitivity of reflectance over rho to mua in the perturbed regions,
/// computed analytically rather than by finite differencing.
pub struct DMcDROfRhoDMuaDetector {
    inner: PmcRho,
}

impl DMcDROfRhoDMuaDetector {
    pub fn new(
        name: impl Into<String>,
        rho: DoubleRange,
        reference_ops: Vec<OpticalProperties>,
        perturbed_ops: Vec<OpticalProperties>,
        perturbed_regions: Vec<usize>,
        second_moment: bool,
    ) -> Self {
        Self {
            inner: PmcRho::new(
                name.into(),
                rho,
                reference_ops,
                perturbed_ops,
                perturbed_regions,
                second_moment,
            ),
        }
    }
}

impl Detector for DMcDROfRhoDMuaDetector {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn kind(&self) -> TallyKind {
        TallyKind::DMcDROfRhoDMua
    }

    fn tally_count(&self) -> u64 {
        self.inner.tally.tally_count
    }

    fn normalize(&mut self, num_photons: u64) {
        self.inner.normalize(num_photons);
    }

    fn output(&self) -> DetectorOutput {
        self.inner.output(self.kind())
    }

    fn merge(&mut self, other: &DetectorOutput) {
        self.inner.tally.merge(other);
    }
}

impl PmcDetector for DMcDROfRhoDMuaDetector {
    fn tally(&mut self, dp: &PhotonDataPoint, collision_info: &[SubRegionInfo]) {
        if dp.status.state != PhotonState::ExitedTop {
            return;
        }
        let dfactor = perturbation_factor_dmua(
            &self.inner.reference_ops,
            &self.inner.perturbed_ops,
            &self.inner.perturbed_regions,
            collision_info,
        );
        let ir = self.inner.rho_bin(dp);
        self.inner.tally.add(ir, dp.weight * dfactor);
    }
}

/// Sensitivity of reflectance over rho to mus in the perturbed regions.
pub struct DMcDROfRhoDMusDetector {
    inner: PmcRho,
}

impl DMcDROfRhoDMusDetector {
    pub fn new(
        name: impl Into<String>,
        rho: DoubleRange,
        reference_ops: Vec<OpticalProperties>,
        perturbed_ops: Vec<OpticalProperties>,
        perturbed_regions: Vec<usize>,
        second_moment: bool,
    ) -> Self {
        Self {
            inner: PmcRho::new(
                name.into(),
                rho,
                reference_ops,
                perturbed_ops,
                perturbed_regions,
                second_moment,
            ),
        }
    }
}

impl Detector for DMcDROfRhoDMusDetector {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn kind(&self) -> TallyKind {
        TallyKind::DMcDROfRhoDMus
    }

    fn tally_count(&self) -> u64 {
        self.inner.tally.tally_count
    }

    fn normalize(&mut self, num_photons: u64) {
        self.inner.normalize(num_photons);
    }

    fn output(&self) -> DetectorOutput {
        self.inner.output(self.kind())
    }

    fn merge(&mut self, other: &DetectorOutput) {
        self.inner.tally.merge(other);
    }
}

impl PmcDetector for DMcDROfRhoDMusDetector {
    fn tally(&mut self, dp: &PhotonDataPoint, collision_info: &[SubRegionInfo]) {
        if dp.status.state != PhotonState::ExitedTop {
            return;
        }
        let dfactor = perturbation_factor_dmus(
            &self.inner.reference_ops,
            &self.inner.perturbed_ops,
            &self.inner.perturbed_regions,
            collision_info,
        );
        let ir = self.inner.rho_bin(dp);
        self.inner.tally.add(ir, dp.weight * dfactor);
    }
}
