use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::FactoryError;
use crate::optics::specular_reflectance;
use crate::photon::Photon;
use crate::rng::PhotonRng;
use crate::tissue::Tissue;

/// Photon launcher.
///
/// Launching through a refractive-index mismatch deweights the photon by
/// the specular reflectance at the entry interface; the specular detector
/// recovers that fraction from the launch history point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Source {
    /// Pencil beam: fixed position and direction.
    DirectionalPoint { position: [f64; 3], direction: [f64; 3] },
    /// Point source emitting uniformly over the full solid angle.
    IsotropicPoint { position: [f64; 3] },
}

impl Source {
    /// Emit the initial photon state for one launch, consuming the
    /// photon's private random stream as needed.
    pub fn launch(&self, tissue: &Tissue, mut rng: PhotonRng) -> Photon {
        let (position, direction) = match self {
            Source::DirectionalPoint { position, direction } => (*position, normalize(*direction)),
            Source::IsotropicPoint { position } => (*position, sample_isotropic(&mut rng)),
        };
        let from_region = tissue.region_index_moving(position, neg(direction));
        let into_region = tissue.region_index_moving(position, direction);
        let n_from = tissue.regions()[from_region].optical_properties().n;
        let n_into = tissue.regions()[into_region].optical_properties().n;
        let weight = 1.0 - specular_reflectance(n_from, n_into);
        Photon::new(position, direction, weight, into_region, tissue.region_count(), rng)
    }
}

fn neg(v: [f64; 3]) -> [f64; 3] {
    [-v[0], -v[1], -v[2]]
}

fn normalize(v: [f64; 3]) -> [f64; 3] {
    let mag = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    [v[0] / mag, v[1] / mag, v[2] / mag]
}

fn sample_isotropic(rng: &mut PhotonRng) -> [f64; 3] {
    let mu = 2.0 * rng.random() - 1.0;
    let phi = 2.0 * std::f64::consts::PI * rng.random();
    let sin_theta = (1.0 - mu * mu).sqrt();
    [sin_theta * phi.cos(), sin_theta * phi.sin(), mu]
}

/// Source descriptor: a built-in source or a custom tag resolved through
/// the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceInput {
    Builtin { source: Source },
    Custom { tag: String, params: serde_json::Value },
}

impl SourceInput {
    pub fn directional_point(position: [f64; 3], direction: [f64; 3]) -> Self {
        SourceInput::Builtin { source: Source::DirectionalPoint { position, direction } }
    }

    pub fn isotropic_point(position: [f64; 3]) -> Self {
        SourceInput::Builtin { source: Source::IsotropicPoint { position } }
    }

    /// Resolve the descriptor to a concrete source. Unknown custom tags
    /// fail fast here, before any photon is launched.
    pub fn build(&self) -> Result<Source, FactoryError> {
        match self {
            SourceInput::Builtin { source } => Ok(source.clone()),
            SourceInput::Custom { tag, params } => {
                let registry = SOURCE_REGISTRY.read().expect("source registry lock");
                let ctor = registry
                    .get(tag.as_str())
                    .ok_or_else(|| FactoryError::NoFactoryRegistered(tag.clone()))?;
                ctor(params)
            }
        }
    }
}

type SourceCtor = fn(&serde_json::Value) -> Result<Source, FactoryError>;

static SOURCE_REGISTRY: Lazy<RwLock<HashMap<String, SourceCtor>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register a constructor for a user-defined source type under a stable
/// tag. Later registrations for the same tag win.
pub fn register_source(tag: &str, ctor: SourceCtor) {
    SOURCE_REGISTRY
        .write()
        .expect("source registry lock")
        .insert(tag.to_string(), ctor);
}
