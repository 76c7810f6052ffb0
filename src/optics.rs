use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Optical properties of a tissue region.
///
/// Units follow the biomedical-optics convention: coefficients in 1/mm,
/// lengths in mm. `g` is the scattering anisotropy (mean cosine of the
/// deflection angle), `n` the refractive index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpticalProperties {
    pub mua: f64,
    pub mus: f64,
    pub g: f64,
    pub n: f64,
}

impl OpticalProperties {
    pub fn new(mua: f64, mus: f64, g: f64, n: f64) -> Self {
        Self { mua, mus, g, n }
    }

    /// Reduced scattering coefficient mus' = mus * (1 - g).
    pub fn musp(&self) -> f64 {
        self.mus * (1.0 - self.g)
    }

    /// Total interaction coefficient mua + mus.
    pub fn mut_total(&self) -> f64 {
        self.mua + self.mus
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.mua < 0.0 {
            return Err(ValidationError::InvalidOpticalProperties {
                reason: format!("absorption coefficient mua = {} is negative", self.mua),
                fix: "set mua >= 0".to_string(),
            });
        }
        if self.mus < 0.0 {
            return Err(ValidationError::InvalidOpticalProperties {
                reason: format!("scattering coefficient mus = {} is negative", self.mus),
                fix: "set mus >= 0".to_string(),
            });
        }
        if !(self.n > 0.0) {
            return Err(ValidationError::InvalidOpticalProperties {
                reason: format!("refractive index n = {} is not positive", self.n),
                fix: "set n > 0, e.g. 1.0 for air or 1.4 for soft tissue".to_string(),
            });
        }
        Ok(())
    }

    /// Ambient (near-vacuum) properties used for the semi-infinite layers
    /// bounding a slab.
    pub fn ambient() -> Self {
        Self { mua: 0.0, mus: 1e-10, g: 1.0, n: 1.0 }
    }
}

/// Normal-incidence specular reflectance at an interface n_in -> n_out.
pub fn specular_reflectance(n_in: f64, n_out: f64) -> f64 {
    let r = (n_in - n_out) / (n_in + n_out);
    r * r
}

/// Unpolarized Fresnel reflectance for a ray hitting an interface
/// n_in -> n_out with incident direction cosine `cos_in` (relative to the
/// surface normal, taken positive).
///
/// Returns the reflectance and the transmitted cosine. Total internal
/// reflection yields reflectance 1.0 and a transmitted cosine of 0.
pub fn fresnel(n_in: f64, n_out: f64, cos_in: f64) -> (f64, f64) {
    let cos_in = cos_in.abs().min(1.0);
    if (n_in - n_out).abs() < 1e-12 {
        return (0.0, cos_in);
    }
    let sin_in = (1.0 - cos_in * cos_in).sqrt();
    let sin_t = n_in / n_out * sin_in;
    if sin_t >= 1.0 {
        return (1.0, 0.0);
    }
    let cos_t = (1.0 - sin_t * sin_t).sqrt();
    if cos_in > 1.0 - 1e-12 {
        // normal incidence limit of the unpolarized formula
        return (specular_reflectance(n_in, n_out), cos_t);
    }
    let r_s = (n_in * cos_in - n_out * cos_t) / (n_in * cos_in + n_out * cos_t);
    let r_p = (n_in * cos_t - n_out * cos_in) / (n_in * cos_t + n_out * cos_in);
    (0.5 * (r_s * r_s + r_p * r_p), cos_t)
}
