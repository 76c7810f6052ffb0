use serde::{Deserialize, Serialize};

use crate::optics::OpticalProperties;

/// Geometric tolerance for ray-boundary intersections. Intersections closer
/// than this are treated as "already on the boundary" and skipped so a
/// photon sitting on an interface does not re-intersect it.
pub const GEOMETRY_TOLERANCE: f64 = 1e-11;

/// One labeled sub-volume of tissue with its optical properties.
///
/// A closed set of shapes: horizontal layers for the slab backbone, and
/// ellipsoid / voxel / cylinder / tetrahedron inclusions for heterogeneous
/// tissue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum TissueRegion {
    /// Horizontal slab, infinite in x and y, spanning [z_start, z_stop).
    Layer {
        #[serde(with = "z_bound")]
        z_start: f64,
        #[serde(with = "z_bound")]
        z_stop: f64,
        op: OpticalProperties,
    },
    /// Axis-aligned ellipsoid with semi-axes (a, b, c).
    Ellipsoid { center: [f64; 3], axes: [f64; 3], op: OpticalProperties },
    /// Axis-aligned rectangular box.
    Voxel { x: [f64; 2], y: [f64; 2], z: [f64; 2], op: OpticalProperties },
    /// Finite cylinder aligned with the z axis.
    Cylinder { center: [f64; 3], radius: f64, height: f64, op: OpticalProperties },
    /// Tetrahedron given by four vertices.
    Tetrahedron { vertices: [[f64; 3]; 4], op: OpticalProperties },
}

impl TissueRegion {
    pub fn optical_properties(&self) -> &OpticalProperties {
        match self {
            TissueRegion::Layer { op, .. }
            | TissueRegion::Ellipsoid { op, .. }
            | TissueRegion::Voxel { op, .. }
            | TissueRegion::Cylinder { op, .. }
            | TissueRegion::Tetrahedron { op, .. } => op,
        }
    }

    pub fn is_layer(&self) -> bool {
        matches!(self, TissueRegion::Layer { .. })
    }

    /// Containment test. Layers are half-open in z so adjacent layers
    /// partition space without overlap.
    pub fn contains(&self, p: [f64; 3]) -> bool {
        match self {
            TissueRegion::Layer { z_start, z_stop, .. } => p[2] >= *z_start && p[2] < *z_stop,
            TissueRegion::Ellipsoid { center, axes, .. } => {
                let dx = (p[0] - center[0]) / axes[0];
                let dy = (p[1] - center[1]) / axes[1];
                let dz = (p[2] - center[2]) / axes[2];
                dx * dx + dy * dy + dz * dz <= 1.0
            }
            TissueRegion::Voxel { x, y, z, .. } => {
                p[0] >= x[0] && p[0] < x[1] && p[1] >= y[0] && p[1] < y[1] && p[2] >= z[0] && p[2] < z[1]
            }
            TissueRegion::Cylinder { center, radius, height, .. } => {
                let dx = p[0] - center[0];
                let dy = p[1] - center[1];
                dx * dx + dy * dy <= radius * radius
                    && (p[2] - center[2]).abs() <= height / 2.0
            }
            TissueRegion::Tetrahedron { vertices, .. } => tet_contains(vertices, p),
        }
    }

    /// Distance along `dir` from `p` to this region's boundary surface, if
    /// the crossing happens within `step`. Works from inside and outside.
    pub fn ray_intersect(&self, p: [f64; 3], dir: [f64; 3], step: f64) -> Option<f64> {
        let t = match self {
            TissueRegion::Layer { z_start, z_stop, .. } => {
                let mut best: Option<f64> = None;
                for plane_z in [*z_start, *z_stop] {
                    if plane_z.is_infinite() {
                        continue;
                    }
                    if let Some(t) = plane_hit(p[2], dir[2], plane_z) {
                        best = Some(best.map_or(t, |b: f64| b.min(t)));
                    }
                }
                best
            }
            TissueRegion::Ellipsoid { center, axes, .. } => {
                // Scale to the unit sphere and solve the ray-sphere quadratic.
                let oc = [
                    (p[0] - center[0]) / axes[0],
                    (p[1] - center[1]) / axes[1],
                    (p[2] - center[2]) / axes[2],
                ];
                let d = [dir[0] / axes[0], dir[1] / axes[1], dir[2] / axes[2]];
                let a = d[0] * d[0] + d[1] * d[1] + d[2] * d[2];
                let b = 2.0 * (oc[0] * d[0] + oc[1] * d[1] + oc[2] * d[2]);
                let c = oc[0] * oc[0] + oc[1] * oc[1] + oc[2] * oc[2] - 1.0;
                quadratic_hit(a, b, c)
            }
            TissueRegion::Voxel { x, y, z, .. } => {
                let mut best: Option<f64> = None;
                let bounds = [x, y, z];
                for axis in 0..3 {
                    for plane in [bounds[axis][0], bounds[axis][1]] {
                        let Some(t) = plane_hit(p[axis], dir[axis], plane) else { continue };
                        // the crossing must land on the box surface
                        let hit = advance(p, dir, t);
                        if on_box_face(&hit, x, y, z, axis) {
                            best = Some(best.map_or(t, |b: f64| b.min(t)));
                        }
                    }
                }
                best
            }
            TissueRegion::Cylinder { center, radius, height, .. } => {
                let mut best: Option<f64> = None;
                // curved side: 2-D quadratic in x/y
                let oc = [p[0] - center[0], p[1] - center[1]];
                let a = dir[0] * dir[0] + dir[1] * dir[1];
                let b = 2.0 * (oc[0] * dir[0] + oc[1] * dir[1]);
                let c = oc[0] * oc[0] + oc[1] * oc[1] - radius * radius;
                if a.abs() > 1e-14 {
                    if let Some(t) = quadratic_hit(a, b, c) {
                        let hit_z = p[2] + t * dir[2];
                        if (hit_z - center[2]).abs() <= height / 2.0 {
                            best = Some(t);
                        }
                    }
                }
                // caps
                for plane_z in [center[2] - height / 2.0, center[2] + height / 2.0] {
                    let Some(t) = plane_hit(p[2], dir[2], plane_z) else { continue };
                    let hx = p[0] + t * dir[0] - center[0];
                    let hy = p[1] + t * dir[1] - center[1];
                    if hx * hx + hy * hy <= radius * radius {
                        best = Some(best.map_or(t, |b: f64| b.min(t)));
                    }
                }
                best
            }
            TissueRegion::Tetrahedron { vertices, .. } => tet_ray_intersect(vertices, p, dir),
        };
        t.filter(|&t| t <= step)
    }

    /// Outward unit normal at a boundary point `p`.
    pub fn surface_normal(&self, p: [f64; 3]) -> [f64; 3] {
        match self {
            TissueRegion::Layer { z_start, z_stop, .. } => {
                // nearest of the two planes
                let to_start = (p[2] - z_start).abs();
                let to_stop = (p[2] - z_stop).abs();
                if to_start <= to_stop { [0.0, 0.0, -1.0] } else { [0.0, 0.0, 1.0] }
            }
            TissueRegion::Ellipsoid { center, axes, .. } => normalize([
                2.0 * (p[0] - center[0]) / (axes[0] * axes[0]),
                2.0 * (p[1] - center[1]) / (axes[1] * axes[1]),
                2.0 * (p[2] - center[2]) / (axes[2] * axes[2]),
            ]),
            TissueRegion::Voxel { x, y, z, .. } => {
                let dists = [
                    (p[0] - x[0]).abs(),
                    (x[1] - p[0]).abs(),
                    (p[1] - y[0]).abs(),
                    (y[1] - p[1]).abs(),
                    (p[2] - z[0]).abs(),
                    (z[1] - p[2]).abs(),
                ];
                let face = dists
                    .iter()
                    .enumerate()
                    .min_by(|a, b| a.1.partial_cmp(b.1).unwrap())
                    .map(|(i, _)| i)
                    .unwrap();
                match face {
                    0 => [-1.0, 0.0, 0.0],
                    1 => [1.0, 0.0, 0.0],
                    2 => [0.0, -1.0, 0.0],
                    3 => [0.0, 1.0, 0.0],
                    4 => [0.0, 0.0, -1.0],
                    _ => [0.0, 0.0, 1.0],
                }
            }
            TissueRegion::Cylinder { center, radius: _, height, .. } => {
                let half = height / 2.0;
                let to_top = (p[2] - (center[2] + half)).abs();
                let to_bottom = (p[2] - (center[2] - half)).abs();
                let dx = p[0] - center[0];
                let dy = p[1] - center[1];
                let radial = (dx * dx + dy * dy).sqrt();
                if to_top < 1e-9 && to_top <= to_bottom {
                    [0.0, 0.0, 1.0]
                } else if to_bottom < 1e-9 {
                    [0.0, 0.0, -1.0]
                } else if radial > 1e-12 {
                    [dx / radial, dy / radial, 0.0]
                } else {
                    [0.0, 0.0, 1.0]
                }
            }
            TissueRegion::Tetrahedron { vertices, .. } => tet_surface_normal(vertices, p),
        }
    }
}

/// Serde helper for layer z bounds: JSON has no infinity literal, so the
/// semi-infinite ambient bounds round-trip as the strings "inf" / "-inf".
mod z_bound {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else if *value > 0.0 {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_str("-inf")
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        struct ZBoundVisitor;

        impl<'de> Visitor<'de> for ZBoundVisitor {
            type Value = f64;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a number, \"inf\" or \"-inf\"")
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<f64, E> {
                Ok(v)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<f64, E> {
                Ok(v as f64)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<f64, E> {
                Ok(v as f64)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<f64, E> {
                match v {
                    "inf" => Ok(f64::INFINITY),
                    "-inf" => Ok(f64::NEG_INFINITY),
                    other => Err(E::custom(format!("bad z bound \"{other}\""))),
                }
            }
        }

        deserializer.deserialize_any(ZBoundVisitor)
    }
}

fn advance(p: [f64; 3], dir: [f64; 3], t: f64) -> [f64; 3] {
    [p[0] + t * dir[0], p[1] + t * dir[1], p[2] + t * dir[2]]
}

fn normalize(v: [f64; 3]) -> [f64; 3] {
    let mag = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if mag < 1e-14 {
        return [0.0, 0.0, 1.0];
    }
    [v[0] / mag, v[1] / mag, v[2] / mag]
}

/// Positive distance along a 1-D direction component to an axis plane.
fn plane_hit(coord: f64, dir: f64, plane: f64) -> Option<f64> {
    if dir.abs() < 1e-14 {
        return None;
    }
    let t = (plane - coord) / dir;
    (t > GEOMETRY_TOLERANCE).then_some(t)
}

/// Smallest positive root of a*t^2 + b*t + c = 0.
fn quadratic_hit(a: f64, b: f64, c: f64) -> Option<f64> {
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 || a.abs() < 1e-14 {
        return None;
    }
    let sqrt_disc = disc.sqrt();
    let t1 = (-b - sqrt_disc) / (2.0 * a);
    let t2 = (-b + sqrt_disc) / (2.0 * a);
    if t1 > GEOMETRY_TOLERANCE {
        Some(t1)
    } else if t2 > GEOMETRY_TOLERANCE {
        Some(t2)
    } else {
        None
    }
}

fn on_box_face(p: &[f64; 3], x: &[f64; 2], y: &[f64; 2], z: &[f64; 2], crossing_axis: usize) -> bool {
    let eps = 1e-9;
    let in_x = p[0] >= x[0] - eps && p[0] <= x[1] + eps;
    let in_y = p[1] >= y[0] - eps && p[1] <= y[1] + eps;
    let in_z = p[2] >= z[0] - eps && p[2] <= z[1] + eps;
    match crossing_axis {
        0 => in_y && in_z,
        1 => in_x && in_z,
        _ => in_x && in_y,
    }
}

fn tet_face_indices() -> [[usize; 3]; 4] {
    [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]]
}

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Same-side test against each face plane.
fn tet_contains(v: &[[f64; 3]; 4], p: [f64; 3]) -> bool {
    for (face, opposite) in tet_face_indices().iter().zip([3usize, 2, 1, 0]) {
        let n = cross(sub(v[face[1]], v[face[0]]), sub(v[face[2]], v[face[0]]));
        let side_p = dot(n, sub(p, v[face[0]]));
        let side_v = dot(n, sub(v[opposite], v[face[0]]));
        if side_p * side_v < 0.0 {
            return false;
        }
    }
    true
}

/// Moller-Trumbore over the four faces, keeping the nearest positive hit.
fn tet_ray_intersect(v: &[[f64; 3]; 4], p: [f64; 3], dir: [f64; 3]) -> Option<f64> {
    let mut best: Option<f64> = None;
    for face in tet_face_indices() {
        let (v0, v1, v2) = (v[face[0]], v[face[1]], v[face[2]]);
        let e1 = sub(v1, v0);
        let e2 = sub(v2, v0);
        let h = cross(dir, e2);
        let det = dot(e1, h);
        if det.abs() < 1e-14 {
            continue;
        }
        let inv_det = 1.0 / det;
        let s = sub(p, v0);
        let u = dot(s, h) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            continue;
        }
        let q = cross(s, e1);
        let w = dot(dir, q) * inv_det;
        if w < 0.0 || u + w > 1.0 {
            continue;
        }
        let t = dot(e2, q) * inv_det;
        if t > GEOMETRY_TOLERANCE {
            best = Some(best.map_or(t, |b: f64| b.min(t)));
        }
    }
    best
}

fn tet_surface_normal(v: &[[f64; 3]; 4], p: [f64; 3]) -> [f64; 3] {
    // face whose plane is nearest to p, oriented away from the opposite vertex
    let mut best = ([0.0, 0.0, 1.0], f64::INFINITY);
    for (face, opposite) in tet_face_indices().iter().zip([3usize, 2, 1, 0]) {
        let n = normalize(cross(sub(v[face[1]], v[face[0]]), sub(v[face[2]], v[face[0]])));
        let dist = dot(n, sub(p, v[face[0]])).abs();
        if dist < best.1 {
            let outward = if dot(n, sub(v[opposite], v[face[0]])) > 0.0 {
                [-n[0], -n[1], -n[2]]
            } else {
                n
            };
            best = (outward, dist);
        }
    }
    best.0
}
