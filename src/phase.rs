// Scattering phase functions and direction rotation.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::rng::PhotonRng;

/// Phase function used to sample the deflection cosine at a collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseFunction {
    /// Henyey-Greenstein with the region's anisotropy g. g = 0 degrades to
    /// isotropic.
    HenyeyGreenstein,
    /// Isotropic scattering regardless of g.
    Isotropic,
}

impl PhaseFunction {
    /// Sample the cosine of the polar deflection angle.
    pub fn sample_mu(&self, g: f64, rng: &mut PhotonRng) -> f64 {
        match self {
            PhaseFunction::HenyeyGreenstein => {
                if g.abs() < 1e-12 {
                    return 2.0 * rng.random() - 1.0;
                }
                let xi = rng.random();
                let term = (1.0 - g * g) / (1.0 - g + 2.0 * g * xi);
                let mu = (1.0 + g * g - term * term) / (2.0 * g);
                mu.clamp(-1.0, 1.0)
            }
            PhaseFunction::Isotropic => 2.0 * rng.random() - 1.0,
        }
    }

    /// Sample a full scattered direction: polar cosine from the phase
    /// function, azimuth uniform.
    pub fn sample_direction(&self, g: f64, direction: [f64; 3], rng: &mut PhotonRng) -> [f64; 3] {
        let mu = self.sample_mu(g, rng);
        let phi = 2.0 * std::f64::consts::PI * rng.random();
        rotate_direction(direction, mu, phi)
    }
}

/// Rotate a unit direction to a new direction with cosine `mu` relative to
/// the original and azimuth `phi` about it, using an orthonormal frame.
pub fn rotate_direction(direction: [f64; 3], mu: f64, phi: f64) -> [f64; 3] {
    let u_old = Vector3::new(direction[0], direction[1], direction[2]);
    let sin_theta = (1.0 - mu * mu).max(0.0).sqrt();

    // Find a vector perpendicular to u_old
    let perp = if u_old.x.abs() < 0.99 {
        Vector3::new(1.0, 0.0, 0.0).cross(&u_old).normalize()
    } else {
        Vector3::new(0.0, 1.0, 0.0).cross(&u_old).normalize()
    };
    let ortho = u_old.cross(&perp);

    let u_new = mu * u_old + sin_theta * phi.cos() * perp + sin_theta * phi.sin() * ortho;
    let u_new = u_new.normalize();
    [u_new.x, u_new.y, u_new.z]
}
