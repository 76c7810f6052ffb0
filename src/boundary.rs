use serde::{Deserialize, Serialize};

use crate::detectors::DetectorInput;
use crate::photon::{BoundaryCrossing, PhotonStatus};

/// Logical surface or volume that detectors attach to. The kind decides
/// when, during a photon's life, the attached detectors fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VirtualBoundaryKind {
    /// Top tissue surface, diffuse exits.
    DiffuseReflectance,
    /// Bottom tissue surface.
    DiffuseTransmittance,
    /// Entry interface; fires once per photon at launch.
    SpecularReflectance,
    /// The whole tissue volume; history detectors attach here.
    GenericVolume,
    /// Interior region interfaces, for radiance-style tallies.
    SurfaceRadiance,
    /// Top tissue surface with database capture for pMC post-processing.
    PmcDiffuseReflectance,
}

impl VirtualBoundaryKind {
    /// Whether a photon with the given terminal status hit this boundary.
    pub fn hit_by(&self, status: &PhotonStatus) -> bool {
        use crate::photon::PhotonState::*;
        match self {
            VirtualBoundaryKind::DiffuseReflectance | VirtualBoundaryKind::PmcDiffuseReflectance => {
                status.state == ExitedTop
            }
            VirtualBoundaryKind::DiffuseTransmittance => status.state == ExitedBottom,
            VirtualBoundaryKind::SpecularReflectance => true,
            VirtualBoundaryKind::GenericVolume => true,
            VirtualBoundaryKind::SurfaceRadiance => {
                status.crossing == Some(BoundaryCrossing::RegionInterface)
            }
        }
    }
}

/// A virtual boundary plus the detectors grouped under it. A group may
/// additionally persist photon termination and collision records for later
/// pMC reuse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualBoundaryGroup {
    pub kind: VirtualBoundaryKind,
    pub detectors: Vec<DetectorInput>,
    pub write_to_database: bool,
    pub name: String,
}

impl VirtualBoundaryGroup {
    pub fn new(kind: VirtualBoundaryKind, detectors: Vec<DetectorInput>, name: impl Into<String>) -> Self {
        Self { kind, detectors, write_to_database: false, name: name.into() }
    }

    pub fn with_database(mut self) -> Self {
        self.write_to_database = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::photon::PhotonState;

    fn status(state: PhotonState, crossing: Option<BoundaryCrossing>) -> PhotonStatus {
        PhotonStatus { state, crossing }
    }

    #[test]
    fn test_reflectance_boundary_fires_on_top_exit() {
        let top = status(PhotonState::ExitedTop, Some(BoundaryCrossing::TopSurface));
        let bottom = status(PhotonState::ExitedBottom, Some(BoundaryCrossing::BottomSurface));
        assert!(VirtualBoundaryKind::DiffuseReflectance.hit_by(&top));
        assert!(!VirtualBoundaryKind::DiffuseReflectance.hit_by(&bottom));
        assert!(VirtualBoundaryKind::PmcDiffuseReflectance.hit_by(&top));
        assert!(VirtualBoundaryKind::DiffuseTransmittance.hit_by(&bottom));
    }

    #[test]
    fn test_volume_boundary_fires_for_any_state() {
        let absorbed = status(PhotonState::Absorbed, None);
        assert!(VirtualBoundaryKind::GenericVolume.hit_by(&absorbed));
    }

    #[test]
    fn test_radiance_boundary_needs_interface_crossing() {
        let crossing = status(PhotonState::InFlight, Some(BoundaryCrossing::RegionInterface));
        let plain = status(PhotonState::InFlight, None);
        assert!(VirtualBoundaryKind::SurfaceRadiance.hit_by(&crossing));
        assert!(!VirtualBoundaryKind::SurfaceRadiance.hit_by(&plain));
    }
}
