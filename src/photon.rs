use serde::{Deserialize, Serialize};

use crate::rng::PhotonRng;

/// Physical termination state of a photon.
///
/// `InFlight` is the only non-terminal state; everything else ends the
/// random walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhotonState {
    InFlight,
    ExitedTop,
    ExitedBottom,
    ExitedSides,
    Absorbed,
    KilledPathLength,
    KilledCollisions,
    KilledRoulette,
}

impl PhotonState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PhotonState::InFlight)
    }

    /// Stable integer tag used by the binary photon database.
    pub fn to_u8(self) -> u8 {
        match self {
            PhotonState::InFlight => 0,
            PhotonState::ExitedTop => 1,
            PhotonState::ExitedBottom => 2,
            PhotonState::ExitedSides => 3,
            PhotonState::Absorbed => 4,
            PhotonState::KilledPathLength => 5,
            PhotonState::KilledCollisions => 6,
            PhotonState::KilledRoulette => 7,
        }
    }

    pub fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => PhotonState::InFlight,
            1 => PhotonState::ExitedTop,
            2 => PhotonState::ExitedBottom,
            3 => PhotonState::ExitedSides,
            4 => PhotonState::Absorbed,
            5 => PhotonState::KilledPathLength,
            6 => PhotonState::KilledCollisions,
            7 => PhotonState::KilledRoulette,
            _ => return None,
        })
    }
}

/// Virtual-boundary marker attached to a pseudo-collision history point.
///
/// Kept separate from [`PhotonState`] so the transition table stays a plain
/// enum rather than a wide bit-flag value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryCrossing {
    /// Crossed an interior region interface.
    RegionInterface,
    /// Reached the top surface of the tissue.
    TopSurface,
    /// Reached the bottom surface of the tissue.
    BottomSurface,
}

/// Combined status of a photon or history point: physical state plus an
/// optional pseudo-collision marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotonStatus {
    pub state: PhotonState,
    pub crossing: Option<BoundaryCrossing>,
}

impl PhotonStatus {
    pub fn in_flight() -> Self {
        Self { state: PhotonState::InFlight, crossing: None }
    }

    pub fn is_pseudo_collision(&self) -> bool {
        self.crossing.is_some()
    }
}

/// Path length traversed and collisions suffered in one tissue region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubRegionInfo {
    pub path_length: f64,
    pub collision_count: u64,
}

/// Immutable snapshot of a photon at one point of its random walk.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotonDataPoint {
    pub position: [f64; 3],
    pub direction: [f64; 3],
    pub weight: f64,
    pub status: PhotonStatus,
    /// Per-region bookkeeping accumulated up to this point.
    pub sub_region_info: Vec<SubRegionInfo>,
}

impl PhotonDataPoint {
    /// Total time of flight up to this point, summed over regions with the
    /// refractive index of each.
    pub fn total_time(&self, ops: &[crate::optics::OpticalProperties]) -> f64 {
        self.sub_region_info
            .iter()
            .zip(ops)
            .map(|(sub, op)| crate::binning::time_delay(sub.path_length, op.n))
            .sum()
    }
}

/// Append-only ordered record of a photon's random walk.
///
/// Volume detectors consume consecutive point pairs; surface detectors only
/// the terminal point. Nothing mutates a point once appended.
#[derive(Debug, Clone, Default)]
pub struct PhotonHistory {
    points: Vec<PhotonDataPoint>,
}

impl PhotonHistory {
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    pub fn push(&mut self, point: PhotonDataPoint) {
        self.points.push(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[PhotonDataPoint] {
        &self.points
    }

    pub fn terminal_point(&self) -> Option<&PhotonDataPoint> {
        self.points.last()
    }

    /// Iterate over consecutive (previous, current) pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (&PhotonDataPoint, &PhotonDataPoint)> {
        self.points.windows(2).map(|w| (&w[0], &w[1]))
    }
}

/// Mutable simulation unit: one photon and its private random stream.
///
/// Created by a [`Source`](crate::source::Source) per launch, mutated only
/// by the transport engine, handed to detectors at termination. No two
/// photons share mutable state.
#[derive(Debug, Clone)]
pub struct Photon {
    pub position: [f64; 3],
    pub direction: [f64; 3],
    pub weight: f64,
    pub region_index: usize,
    pub status: PhotonStatus,
    pub total_path_length: f64,
    pub sub_region_info: Vec<SubRegionInfo>,
    pub history: PhotonHistory,
    pub rng: PhotonRng,
}

impl Photon {
    pub fn new(
        position: [f64; 3],
        direction: [f64; 3],
        weight: f64,
        region_index: usize,
        region_count: usize,
        rng: PhotonRng,
    ) -> Self {
        let mut photon = Self {
            position,
            direction,
            weight,
            region_index,
            status: PhotonStatus::in_flight(),
            total_path_length: 0.0,
            sub_region_info: vec![SubRegionInfo::default(); region_count],
            history: PhotonHistory::new(),
            rng,
        };
        photon.history.push(photon.data_point());
        photon
    }

    /// Snapshot the current photon state.
    pub fn data_point(&self) -> PhotonDataPoint {
        PhotonDataPoint {
            position: self.position,
            direction: self.direction,
            weight: self.weight,
            status: self.status,
            sub_region_info: self.sub_region_info.clone(),
        }
    }

    /// Advance the photon `distance` along its direction, crediting the
    /// path length to the current region.
    pub fn move_by(&mut self, distance: f64) {
        self.position[0] += distance * self.direction[0];
        self.position[1] += distance * self.direction[1];
        self.position[2] += distance * self.direction[2];
        self.total_path_length += distance;
        self.sub_region_info[self.region_index].path_length += distance;
    }

    pub fn terminal_point(&self) -> &PhotonDataPoint {
        self.history
            .terminal_point()
            .expect("photon history always holds the launch point")
    }
}
