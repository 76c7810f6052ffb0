use crate::error::ValidationError;
use crate::optics::OpticalProperties;
use crate::region::{TissueRegion, GEOMETRY_TOLERANCE};

/// Nudge distance used to resolve which region a photon sitting exactly on
/// a boundary belongs to: the point is displaced toward the side being
/// entered before the containment scan.
const BOUNDARY_NUDGE: f64 = 1e-9;

/// A tissue: an ordered stack of layers (ambient above, tissue layers,
/// ambient below) with at most one embedded inclusion region.
///
/// Geometry is validated eagerly at construction; a [`Tissue`] that exists
/// is well formed, so the transport loop never re-checks it.
#[derive(Debug, Clone)]
pub struct Tissue {
    regions: Vec<TissueRegion>,
    /// Index into `regions` of the embedded inclusion, if any.
    inclusion: Option<usize>,
    /// Index of the layer hosting the inclusion.
    host_layer: Option<usize>,
}

impl Tissue {
    /// Build a layered tissue. The ordered list must be: semi-infinite
    /// ambient layer, one or more tissue layers, semi-infinite ambient
    /// layer, with adjacent z-ranges sharing a boundary exactly.
    pub fn new(layers: Vec<TissueRegion>) -> Result<Self, ValidationError> {
        validate_layers(&layers)?;
        Ok(Self { regions: layers, inclusion: None, host_layer: None })
    }

    /// Build a heterogeneous tissue: a layered backbone plus one embedded
    /// inclusion (ellipsoid, voxel, cylinder or tetrahedron). The inclusion
    /// must sit strictly inside a single tissue layer and share its
    /// refractive index, so no Fresnel physics happens at its surface.
    pub fn with_inclusion(
        layers: Vec<TissueRegion>,
        inclusion: TissueRegion,
    ) -> Result<Self, ValidationError> {
        validate_layers(&layers)?;
        if inclusion.is_layer() {
            return Err(ValidationError::InvalidTissue {
                reason: "inclusion region cannot be a layer".to_string(),
                fix: "use an ellipsoid, voxel, cylinder or tetrahedron inclusion".to_string(),
            });
        }
        inclusion.optical_properties().validate()?;
        let (z_lo, z_hi) = inclusion_z_extent(&inclusion);
        let host = layers.iter().position(|r| {
            let TissueRegion::Layer { z_start, z_stop, .. } = r else { return false };
            z_lo > *z_start && z_hi < *z_stop
        });
        let Some(host) = host else {
            return Err(ValidationError::InvalidTissue {
                reason: format!(
                    "inclusion spanning z in [{z_lo}, {z_hi}] does not fit strictly inside any single layer"
                ),
                fix: "shrink the inclusion or thicken the host layer so the inclusion does not touch a layer boundary".to_string(),
            });
        };
        let host_n = layers[host].optical_properties().n;
        let incl_n = inclusion.optical_properties().n;
        if (host_n - incl_n).abs() > 1e-12 {
            return Err(ValidationError::InvalidTissue {
                reason: format!(
                    "refractive index mismatch at inclusion surface: host layer n = {host_n}, inclusion n = {incl_n}"
                ),
                fix: "set the inclusion refractive index equal to its host layer".to_string(),
            });
        }
        let mut regions = layers;
        regions.push(inclusion);
        let inclusion_index = regions.len() - 1;
        Ok(Self { regions, inclusion: Some(inclusion_index), host_layer: Some(host) })
    }

    pub fn regions(&self) -> &[TissueRegion] {
        &self.regions
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Optical properties per region, in region-index order.
    pub fn optical_properties(&self) -> Vec<OpticalProperties> {
        self.regions.iter().map(|r| *r.optical_properties()).collect()
    }

    /// Number of layers in the backbone (excludes the inclusion).
    pub fn layer_count(&self) -> usize {
        self.regions.iter().filter(|r| r.is_layer()).count()
    }

    /// z of the top tissue surface (bottom of the upper ambient layer).
    pub fn top_z(&self) -> f64 {
        match &self.regions[0] {
            TissueRegion::Layer { z_stop, .. } => *z_stop,
            _ => unreachable!("validated tissue starts with a layer"),
        }
    }

    /// z of the bottom tissue surface (top of the lower ambient layer).
    pub fn bottom_z(&self) -> f64 {
        match &self.regions[self.layer_count() - 1] {
            TissueRegion::Layer { z_start, .. } => *z_start,
            _ => unreachable!("validated tissue ends with a layer"),
        }
    }

    /// Map a position to its region index. Total and deterministic: the
    /// inclusion wins over its host layer, every other point belongs to
    /// exactly one half-open layer.
    pub fn region_index(&self, p: [f64; 3]) -> usize {
        if let Some(i) = self.inclusion {
            if self.regions[i].contains(p) {
                return i;
            }
        }
        for (i, region) in self.regions.iter().enumerate() {
            if region.is_layer() && region.contains(p) {
                return i;
            }
        }
        // p is exactly at +inf side of the last layer; clamp
        self.layer_count() - 1
    }

    /// Region index for a photon sitting on a boundary, resolved toward the
    /// side it is moving into.
    pub fn region_index_moving(&self, p: [f64; 3], dir: [f64; 3]) -> usize {
        let nudged = [
            p[0] + BOUNDARY_NUDGE * dir[0],
            p[1] + BOUNDARY_NUDGE * dir[1],
            p[2] + BOUNDARY_NUDGE * dir[2],
        ];
        self.region_index(nudged)
    }

    /// Whether a proposed free flight of `step` from `p` along `dir` crosses
    /// a region boundary first, and at what distance.
    ///
    /// Candidates are the current region's own surface (the exit) and, when
    /// the photon travels through the inclusion's host layer, the inclusion
    /// surface (the entry).
    pub fn distance_to_boundary(
        &self,
        p: [f64; 3],
        dir: [f64; 3],
        region_index: usize,
        step: f64,
    ) -> Option<f64> {
        let mut best = self.regions[region_index].ray_intersect(p, dir, step);
        if let (Some(incl), Some(host)) = (self.inclusion, self.host_layer) {
            if region_index == host {
                if let Some(t) = self.regions[incl].ray_intersect(p, dir, step) {
                    best = Some(best.map_or(t, |b: f64| b.min(t)));
                }
            }
        }
        best.filter(|&t| t > GEOMETRY_TOLERANCE)
    }

    /// Outward normal of the surface separating `region_index` from its
    /// neighbor at boundary point `p`.
    pub fn surface_normal(&self, p: [f64; 3], region_index: usize) -> [f64; 3] {
        self.regions[region_index].surface_normal(p)
    }
}

fn validate_layers(layers: &[TissueRegion]) -> Result<(), ValidationError> {
    if layers.len() < 3 {
        return Err(ValidationError::InvalidTissue {
            reason: format!("{} layer(s) given, at least 3 required", layers.len()),
            fix: "provide ambient layer, tissue layer(s), ambient layer".to_string(),
        });
    }
    for (i, region) in layers.iter().enumerate() {
        let TissueRegion::Layer { z_start, z_stop, op } = region else {
            return Err(ValidationError::InvalidTissue {
                reason: format!("region {i} of the layer stack is not a layer"),
                fix: "pass inclusions via Tissue::with_inclusion, not in the layer list".to_string(),
            });
        };
        op.validate()?;
        if z_stop <= z_start {
            return Err(ValidationError::InvalidTissue {
                reason: format!("layer {i} has z_stop {z_stop} <= z_start {z_start}"),
                fix: "order each layer's z range as start < stop".to_string(),
            });
        }
    }
    let first = &layers[0];
    if let TissueRegion::Layer { z_start, .. } = first {
        if !z_start.is_infinite() {
            return Err(ValidationError::InvalidTissue {
                reason: "top ambient layer does not extend to -infinity".to_string(),
                fix: "set the first layer's z_start to f64::NEG_INFINITY".to_string(),
            });
        }
    }
    if let TissueRegion::Layer { z_stop, .. } = &layers[layers.len() - 1] {
        if !z_stop.is_infinite() {
            return Err(ValidationError::InvalidTissue {
                reason: "bottom ambient layer does not extend to +infinity".to_string(),
                fix: "set the last layer's z_stop to f64::INFINITY".to_string(),
            });
        }
    }
    for i in 0..layers.len() - 1 {
        let (TissueRegion::Layer { z_stop, .. }, TissueRegion::Layer { z_start, .. }) =
            (&layers[i], &layers[i + 1])
        else {
            unreachable!("checked above");
        };
        if z_stop != z_start {
            return Err(ValidationError::InvalidTissue {
                reason: format!(
                    "layers {i} and {} do not share a boundary: {} vs {}",
                    i + 1,
                    z_stop,
                    z_start
                ),
                fix: "make each layer's z_stop equal the next layer's z_start exactly".to_string(),
            });
        }
    }
    Ok(())
}

fn inclusion_z_extent(region: &TissueRegion) -> (f64, f64) {
    match region {
        TissueRegion::Ellipsoid { center, axes, .. } => (center[2] - axes[2], center[2] + axes[2]),
        TissueRegion::Voxel { z, .. } => (z[0], z[1]),
        TissueRegion::Cylinder { center, height, .. } => {
            (center[2] - height / 2.0, center[2] + height / 2.0)
        }
        TissueRegion::Tetrahedron { vertices, .. } => {
            let mut lo = f64::INFINITY;
            let mut hi = f64::NEG_INFINITY;
            for v in vertices {
                lo = lo.min(v[2]);
                hi = hi.max(v[2]);
            }
            (lo, hi)
        }
        TissueRegion::Layer { z_start, z_stop, .. } => (*z_start, *z_stop),
    }
}

/// Convenience constructor for the common single-slab benchmark tissue:
/// vacuum / slab / vacuum.
pub fn single_layer_slab(op: OpticalProperties, thickness: f64) -> Tissue {
    Tissue::new(vec![
        TissueRegion::Layer {
            z_start: f64::NEG_INFINITY,
            z_stop: 0.0,
            op: OpticalProperties::ambient(),
        },
        TissueRegion::Layer { z_start: 0.0, z_stop: thickness, op },
        TissueRegion::Layer {
            z_start: thickness,
            z_stop: f64::INFINITY,
            op: OpticalProperties::ambient(),
        },
    ])
    .expect("slab layout is always valid")
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tissue_op() -> OpticalProperties {
        OpticalProperties::new(0.01, 1.0, 0.8, 1.4)
    }

    fn slab() -> Tissue {
        single_layer_slab(tissue_op(), 20.0)
    }

    #[test]
    fn test_region_index_total() {
        let t = slab();
        assert_eq!(t.region_index([0.0, 0.0, -1.0]), 0);
        assert_eq!(t.region_index([0.0, 0.0, 10.0]), 1);
        assert_eq!(t.region_index([0.0, 0.0, 25.0]), 2);
        // boundary point belongs to the lower (entered) half-open layer
        assert_eq!(t.region_index([0.0, 0.0, 0.0]), 1);
        assert_eq!(t.region_index([0.0, 0.0, 20.0]), 2);
    }

    #[test]
    fn test_region_index_moving_resolves_toward_exit_side() {
        let t = slab();
        // photon at the top surface headed up belongs to the ambient layer
        assert_eq!(t.region_index_moving([0.0, 0.0, 0.0], [0.0, 0.0, -1.0]), 0);
        // headed down, it belongs to the tissue
        assert_eq!(t.region_index_moving([0.0, 0.0, 0.0], [0.0, 0.0, 1.0]), 1);
    }

    #[test]
    fn test_distance_to_boundary_truncates() {
        let t = slab();
        let d = t
            .distance_to_boundary([0.0, 0.0, 19.0], [0.0, 0.0, 1.0], 1, 5.0)
            .unwrap();
        assert_relative_eq!(d, 1.0, epsilon = 1e-12);
        assert!(t.distance_to_boundary([0.0, 0.0, 10.0], [0.0, 0.0, 1.0], 1, 5.0).is_none());
    }

    #[test]
    fn test_gapped_layers_rejected() {
        let result = Tissue::new(vec![
            TissueRegion::Layer {
                z_start: f64::NEG_INFINITY,
                z_stop: 0.0,
                op: OpticalProperties::ambient(),
            },
            TissueRegion::Layer { z_start: 0.5, z_stop: 10.0, op: tissue_op() },
            TissueRegion::Layer {
                z_start: 10.0,
                z_stop: f64::INFINITY,
                op: OpticalProperties::ambient(),
            },
        ]);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("do not share a boundary"));
    }

    #[test]
    fn test_too_few_layers_rejected() {
        let result = Tissue::new(vec![TissueRegion::Layer {
            z_start: f64::NEG_INFINITY,
            z_stop: f64::INFINITY,
            op: tissue_op(),
        }]);
        assert!(result.is_err());
    }

    #[test]
    fn test_inclusion_wins_over_host_layer() {
        let mut op = tissue_op();
        op.mua = 0.1;
        let t = Tissue::with_inclusion(
            slab().regions().to_vec(),
            TissueRegion::Ellipsoid { center: [0.0, 0.0, 10.0], axes: [1.0, 1.0, 1.0], op },
        )
        .unwrap();
        assert_eq!(t.region_index([0.0, 0.0, 10.0]), 3);
        assert_eq!(t.region_index([0.0, 0.0, 5.0]), 1);
    }

    #[test]
    fn test_inclusion_touching_boundary_rejected() {
        let result = Tissue::with_inclusion(
            slab().regions().to_vec(),
            TissueRegion::Ellipsoid {
                center: [0.0, 0.0, 1.0],
                axes: [1.0, 1.0, 1.0],
                op: tissue_op(),
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_inclusion_index_mismatch_rejected() {
        let mut op = tissue_op();
        op.n = 1.5;
        let result = Tissue::with_inclusion(
            slab().regions().to_vec(),
            TissueRegion::Ellipsoid { center: [0.0, 0.0, 10.0], axes: [1.0, 1.0, 1.0], op },
        );
        let err = result.unwrap_err();
        assert!(err.to_string().contains("refractive index mismatch"));
    }

    #[test]
    fn test_boundary_sees_inclusion_from_host_layer() {
        let t = Tissue::with_inclusion(
            slab().regions().to_vec(),
            TissueRegion::Ellipsoid {
                center: [0.0, 0.0, 10.0],
                axes: [1.0, 1.0, 1.0],
                op: tissue_op(),
            },
        )
        .unwrap();
        let d = t
            .distance_to_boundary([0.0, 0.0, 5.0], [0.0, 0.0, 1.0], 1, 100.0)
            .unwrap();
        assert_relative_eq!(d, 4.0, epsilon = 1e-9);
    }
}
