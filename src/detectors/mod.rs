// Detector (tally) framework.
//
// Surface detectors consume a photon's terminal data point, history
// detectors consume consecutive history-point pairs, pMC detectors replay
// terminal points against a recorded collision database. All of them
// accumulate a mean and an optional second moment per bin and are
// normalized exactly once after the full photon count is known.

pub mod input;
pub mod pmc;
pub mod reflectance;
pub mod transmittance;
pub mod volume;

pub use input::{register_detector, DetectorInput};
pub use pmc::{
    perturbation_factor, DMcDROfRhoDMuaDetector, DMcDROfRhoDMusDetector, PmcROfRhoAndTimeDetector,
    PmcROfRhoDetector,
};
pub use reflectance::{
    RDiffuseDetector, ROfAngleDetector, ROfFxDetector, ROfRhoAndAngleDetector,
    ROfRhoAndTimeDetector, ROfRhoDetector, ROfXAndYDetector, RSpecularDetector,
};
pub use transmittance::{TDiffuseDetector, TOfAngleDetector, TOfRhoDetector};
pub use volume::{
    AOfRhoAndZDetector, ATotalDetector, FluenceOfRhoAndZAndTimeDetector, FluenceOfRhoAndZDetector,
    RadianceOfXAndYAndZAndThetaAndPhiDetector,
};

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::optics::OpticalProperties;
use crate::photon::{PhotonDataPoint, SubRegionInfo};
use crate::range::DoubleRange;

/// Stable tag for every detector kind the crate ships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TallyKind {
    RDiffuse,
    RSpecular,
    ROfRho,
    ROfAngle,
    ROfRhoAndAngle,
    ROfRhoAndTime,
    ROfXAndY,
    ROfFx,
    TDiffuse,
    TOfRho,
    TOfAngle,
    ATotal,
    AOfRhoAndZ,
    FluenceOfRhoAndZ,
    FluenceOfRhoAndZAndTime,
    RadianceOfXAndYAndZAndThetaAndPhi,
    PmcROfRho,
    PmcROfRhoAndTime,
    DMcDROfRhoDMua,
    DMcDROfRhoDMus,
}

impl TallyKind {
    pub fn tag(&self) -> &'static str {
        match self {
            TallyKind::RDiffuse => "RDiffuse",
            TallyKind::RSpecular => "RSpecular",
            TallyKind::ROfRho => "ROfRho",
            TallyKind::ROfAngle => "ROfAngle",
            TallyKind::ROfRhoAndAngle => "ROfRhoAndAngle",
            TallyKind::ROfRhoAndTime => "ROfRhoAndTime",
            TallyKind::ROfXAndY => "ROfXAndY",
            TallyKind::ROfFx => "ROfFx",
            TallyKind::TDiffuse => "TDiffuse",
            TallyKind::TOfRho => "TOfRho",
            TallyKind::TOfAngle => "TOfAngle",
            TallyKind::ATotal => "ATotal",
            TallyKind::AOfRhoAndZ => "AOfRhoAndZ",
            TallyKind::FluenceOfRhoAndZ => "FluenceOfRhoAndZ",
            TallyKind::FluenceOfRhoAndZAndTime => "FluenceOfRhoAndZAndTime",
            TallyKind::RadianceOfXAndYAndZAndThetaAndPhi => "RadianceOfXAndYAndZAndThetaAndPhi",
            TallyKind::PmcROfRho => "pMCROfRho",
            TallyKind::PmcROfRhoAndTime => "pMCROfRhoAndTime",
            TallyKind::DMcDROfRhoDMua => "dMCdROfRhodMua",
            TallyKind::DMcDROfRhoDMus => "dMCdROfRhodMus",
        }
    }

    /// True for detectors that consume only the terminal history point.
    pub fn is_surface(&self) -> bool {
        matches!(
            self,
            TallyKind::RDiffuse
                | TallyKind::RSpecular
                | TallyKind::ROfRho
                | TallyKind::ROfAngle
                | TallyKind::ROfRhoAndAngle
                | TallyKind::ROfRhoAndTime
                | TallyKind::ROfXAndY
                | TallyKind::ROfFx
                | TallyKind::TDiffuse
                | TallyKind::TOfRho
                | TallyKind::TOfAngle
        )
    }

    /// True for detectors that walk the full history.
    pub fn is_history(&self) -> bool {
        matches!(
            self,
            TallyKind::ATotal
                | TallyKind::AOfRhoAndZ
                | TallyKind::FluenceOfRhoAndZ
                | TallyKind::FluenceOfRhoAndZAndTime
                | TallyKind::RadianceOfXAndYAndZAndThetaAndPhi
        )
    }

    /// True for detectors whose bins are complex valued.
    pub fn is_complex(&self) -> bool {
        matches!(self, TallyKind::ROfFx)
    }

    /// True for post-processing detectors fed from the photon database.
    pub fn is_pmc(&self) -> bool {
        matches!(
            self,
            TallyKind::PmcROfRho
                | TallyKind::PmcROfRhoAndTime
                | TallyKind::DMcDROfRhoDMua
                | TallyKind::DMcDROfRhoDMus
        )
    }
}

/// Numeric payload of a detector: real or complex bins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DetectorData {
    Real(Vec<f64>),
    Complex(Vec<Complex64>),
}

impl Default for DetectorData {
    fn default() -> Self {
        DetectorData::Real(Vec::new())
    }
}

impl DetectorData {
    pub fn len(&self) -> usize {
        match self {
            DetectorData::Real(v) => v.len(),
            DetectorData::Complex(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_real(&self) -> Option<&[f64]> {
        match self {
            DetectorData::Real(v) => Some(v),
            DetectorData::Complex(_) => None,
        }
    }

    pub fn as_complex(&self) -> Option<&[Complex64]> {
        match self {
            DetectorData::Complex(v) => Some(v),
            DetectorData::Real(_) => None,
        }
    }
}

/// Snapshot of a detector's state: axis metadata plus the accumulated (or,
/// after `normalize`, normalized) arrays.
///
/// The numeric arrays are skipped by serde; the I/O layer stores them in
/// flat binary blobs next to the JSON descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorOutput {
    pub name: String,
    pub kind: TallyKind,
    pub axes: Vec<DoubleRange>,
    pub shape: Vec<usize>,
    pub tally_count: u64,
    pub has_second_moment: bool,
    #[serde(skip)]
    pub data: DetectorData,
    #[serde(skip)]
    pub second_moment: Option<DetectorData>,
}

/// Common behaviour of every detector.
pub trait Detector: Send {
    fn name(&self) -> &str;
    fn kind(&self) -> TallyKind;
    fn tally_count(&self) -> u64;

    /// Divide each bin by (photon count x bin measure). Must be called
    /// exactly once, with the count of launched photons; calling it twice
    /// corrupts results, and callers own that discipline.
    fn normalize(&mut self, num_photons: u64);

    fn output(&self) -> DetectorOutput;

    /// Fold another replica's raw (un-normalized) sums into this one.
    fn merge(&mut self, other: &DetectorOutput);
}

/// Detector driven once per photon with the terminal data point.
pub trait SurfaceDetector: Detector {
    /// Gate deciding whether this photon's terminal point belongs to the
    /// detector (exit side, pseudo-collision marker, ...).
    fn contains_point(&self, dp: &PhotonDataPoint) -> bool;

    fn tally(&mut self, dp: &PhotonDataPoint, ops: &[OpticalProperties]);
}

/// Detector driven with every consecutive pair of history points.
pub trait HistoryDetector: Detector {
    fn tally_single(
        &mut self,
        previous: &PhotonDataPoint,
        current: &PhotonDataPoint,
        region_index: usize,
    );
}

/// Post-processing detector driven from the photon/collision databases.
pub trait PmcDetector: Detector {
    fn tally(&mut self, dp: &PhotonDataPoint, collision_info: &[SubRegionInfo]);
}

/// A constructed detector, classified by how the controllers drive it.
pub enum DetectorInstance {
    Surface(Box<dyn SurfaceDetector>),
    History(Box<dyn HistoryDetector>),
    Pmc(Box<dyn PmcDetector>),
}

impl std::fmt::Debug for DetectorInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (variant, name) = match self {
            DetectorInstance::Surface(d) => ("Surface", d.name()),
            DetectorInstance::History(d) => ("History", d.name()),
            DetectorInstance::Pmc(d) => ("Pmc", d.name()),
        };
        f.debug_tuple(variant).field(&name).finish()
    }
}

impl DetectorInstance {
    pub fn as_detector(&self) -> &dyn Detector {
        match self {
            DetectorInstance::Surface(d) => d.as_ref(),
            DetectorInstance::History(d) => d.as_ref(),
            DetectorInstance::Pmc(d) => d.as_ref(),
        }
    }

    pub fn as_detector_mut(&mut self) -> &mut dyn Detector {
        match self {
            DetectorInstance::Surface(d) => d.as_mut(),
            DetectorInstance::History(d) => d.as_mut(),
            DetectorInstance::Pmc(d) => d.as_mut(),
        }
    }
}

/// Mean / second-moment / count accumulator over a fixed number of bins.
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulator {
    pub mean: Vec<f64>,
    pub second_moment: Option<Vec<f64>>,
    pub tally_count: u64,
}

impl Accumulator {
    pub fn new(len: usize, track_second_moment: bool) -> Self {
        Self {
            mean: vec![0.0; len],
            second_moment: track_second_moment.then(|| vec![0.0; len]),
            tally_count: 0,
        }
    }

    #[inline]
    pub fn add(&mut self, index: usize, weight: f64) {
        self.mean[index] += weight;
        if let Some(sm) = &mut self.second_moment {
            sm[index] += weight * weight;
        }
        self.tally_count += 1;
    }

    /// Divide bin i of the mean by `measure(i) * num_photons` and of the
    /// second moment by `measure(i)^2 * num_photons`, so that
    /// `(second_moment - mean^2) / num_photons` estimates the variance of
    /// the mean.
    pub fn normalize(&mut self, num_photons: u64, measure: impl Fn(usize) -> f64) {
        let n = num_photons as f64;
        for (i, m) in self.mean.iter_mut().enumerate() {
            *m /= measure(i) * n;
        }
        if let Some(sm) = &mut self.second_moment {
            for (i, s) in sm.iter_mut().enumerate() {
                let f = measure(i);
                *s /= f * f * n;
            }
        }
    }

    pub fn merge(&mut self, other: &DetectorOutput) {
        let Some(data) = other.data.as_real() else { return };
        for (m, o) in self.mean.iter_mut().zip(data) {
            *m += o;
        }
        if let (Some(sm), Some(DetectorData::Real(osm))) =
            (&mut self.second_moment, &other.second_moment)
        {
            for (s, o) in sm.iter_mut().zip(osm) {
                *s += o;
            }
        }
        self.tally_count += other.tally_count;
    }

    pub fn data(&self) -> DetectorData {
        DetectorData::Real(self.mean.clone())
    }

    pub fn second_moment_data(&self) -> Option<DetectorData> {
        self.second_moment.as_ref().map(|sm| DetectorData::Real(sm.clone()))
    }
}

/// Complex-valued accumulator for spatial-frequency detectors. The second
/// moment tracks |w|^2 and stays real-valued in the real part.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexAccumulator {
    pub mean: Vec<Complex64>,
    pub second_moment: Option<Vec<Complex64>>,
    pub tally_count: u64,
}

impl ComplexAccumulator {
    pub fn new(len: usize, track_second_moment: bool) -> Self {
        Self {
            mean: vec![Complex64::new(0.0, 0.0); len],
            second_moment: track_second_moment.then(|| vec![Complex64::new(0.0, 0.0); len]),
            tally_count: 0,
        }
    }

    #[inline]
    pub fn add(&mut self, index: usize, value: Complex64) {
        self.mean[index] += value;
        if let Some(sm) = &mut self.second_moment {
            sm[index] += Complex64::new(value.norm_sqr(), 0.0);
        }
    }

    pub fn normalize(&mut self, num_photons: u64, measure: impl Fn(usize) -> f64) {
        let n = num_photons as f64;
        for (i, m) in self.mean.iter_mut().enumerate() {
            *m /= measure(i) * n;
        }
        if let Some(sm) = &mut self.second_moment {
            for (i, s) in sm.iter_mut().enumerate() {
                let f = measure(i);
                *s /= f * f * n;
            }
        }
    }

    pub fn merge(&mut self, other: &DetectorOutput) {
        let Some(data) = other.data.as_complex() else { return };
        for (m, o) in self.mean.iter_mut().zip(data) {
            *m += o;
        }
        if let (Some(sm), Some(DetectorData::Complex(osm))) =
            (&mut self.second_moment, &other.second_moment)
        {
            for (s, o) in sm.iter_mut().zip(osm) {
                *s += o;
            }
        }
        self.tally_count += other.tally_count;
    }

    pub fn data(&self) -> DetectorData {
        DetectorData::Complex(self.mean.clone())
    }

    pub fn second_moment_data(&self) -> Option<DetectorData> {
        self.second_moment.as_ref().map(|sm| DetectorData::Complex(sm.clone()))
    }
}

/// Annulus area of radial bin `i`: 2 pi (start + (i + 0.5) delta) delta.
/// Accounts for axes whose start is not zero.
pub fn annulus_area(rho: &DoubleRange, i: usize) -> f64 {
    2.0 * std::f64::consts::PI * rho.midpoint(i) * rho.delta()
}

/// Solid-angle measure of polar-angle bin `i`: 2 pi sin(mid) delta.
pub fn angle_measure(angle: &DoubleRange, i: usize) -> f64 {
    2.0 * std::f64::consts::PI * angle.midpoint(i).sin() * angle.delta()
}

/// Standard error of a normalized scalar tally with its second moment.
pub fn standard_error(num_photons: u64, mean: f64, second_moment: f64) -> f64 {
    let n = num_photons as f64;
    ((second_moment - mean * mean) / n).max(0.0).sqrt()
}

/// Row-major flat index for a 2-D detector.
#[inline]
pub fn index_2d(i: usize, j: usize, cols: usize) -> usize {
    i * cols + j
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_accumulator_add_and_second_moment() {
        let mut acc = Accumulator::new(4, true);
        acc.add(1, 0.5);
        acc.add(1, 0.25);
        assert_relative_eq!(acc.mean[1], 0.75);
        assert_relative_eq!(acc.second_moment.as_ref().unwrap()[1], 0.3125);
        assert_eq!(acc.tally_count, 2);
    }

    #[test]
    fn test_accumulator_normalize_squares_the_measure_only() {
        let mut acc = Accumulator::new(2, true);
        acc.add(0, 1.0);
        acc.normalize(10, |_| 2.0);
        // mean / (measure * n), second moment / (measure^2 * n)
        assert_relative_eq!(acc.mean[0], 1.0 / 20.0);
        assert_relative_eq!(acc.second_moment.as_ref().unwrap()[0], 1.0 / 40.0);
    }

    #[test]
    fn test_accumulator_merge() {
        let mut a = Accumulator::new(2, true);
        a.add(0, 1.0);
        let mut b = Accumulator::new(2, true);
        b.add(0, 2.0);
        b.add(1, 1.0);
        let snapshot = DetectorOutput {
            name: "b".to_string(),
            kind: TallyKind::ROfRho,
            axes: vec![],
            shape: vec![2],
            tally_count: b.tally_count,
            has_second_moment: true,
            data: b.data(),
            second_moment: b.second_moment_data(),
        };
        a.merge(&snapshot);
        assert_relative_eq!(a.mean[0], 3.0);
        assert_relative_eq!(a.mean[1], 1.0);
        assert_eq!(a.tally_count, 3);
        assert_relative_eq!(a.second_moment.as_ref().unwrap()[0], 5.0);
    }

    #[test]
    fn test_annulus_area_scales_with_start() {
        let at_origin = DoubleRange::new(0.0, 10.0, 101);
        let offset = DoubleRange::new(5.0, 15.0, 101);
        // same bin width, bin 0 centered at 0.05 vs 5.05
        let ratio = annulus_area(&offset, 0) / annulus_area(&at_origin, 0);
        assert_relative_eq!(ratio, 5.05 / 0.05, epsilon = 1e-9);
    }

    #[test]
    fn test_standard_error_zero_variance() {
        assert_eq!(standard_error(100, 0.5, 0.25), 0.0);
    }
}
