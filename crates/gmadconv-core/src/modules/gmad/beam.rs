use serde::{Deserialize, Serialize};

/// Gauss-Twiss beam definition attached to a GMAD machine.
///
/// Lengths are metres, `energy` is GeV and `t0` is seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beam {
    pub particle: String,
    pub energy: f64,
    pub distribution: String,
    pub beta_x: f64,
    pub beta_y: f64,
    pub alpha_x: f64,
    pub alpha_y: f64,
    pub emittance_x: f64,
    pub emittance_y: f64,
    #[serde(default)]
    pub disp_x: f64,
    #[serde(default)]
    pub disp_y: f64,
    #[serde(default)]
    pub disp_xp: f64,
    #[serde(default)]
    pub disp_yp: f64,
    /// Relative energy spread.
    #[serde(default)]
    pub sigma_e: f64,
    #[serde(default)]
    pub x0: f64,
    #[serde(default)]
    pub y0: f64,
    #[serde(default)]
    pub xp0: f64,
    #[serde(default)]
    pub yp0: f64,
    pub z0: f64,
    pub t0: f64,
}

impl Beam {
    pub fn new(particle: impl Into<String>, energy: f64) -> Self {
        Self {
            particle: particle.into(),
            energy,
            distribution: "gausstwiss".to_string(),
            beta_x: 1.0,
            beta_y: 1.0,
            alpha_x: 0.0,
            alpha_y: 0.0,
            emittance_x: 0.0,
            emittance_y: 0.0,
            disp_x: 0.0,
            disp_y: 0.0,
            disp_xp: 0.0,
            disp_yp: 0.0,
            sigma_e: 0.0,
            x0: 0.0,
            y0: 0.0,
            xp0: 0.0,
            yp0: 0.0,
            z0: 0.0,
            t0: 0.0,
        }
    }

    /// 250 GeV electron beam at the entrance of the ILC beam delivery system.
    pub fn ilc_default() -> Self {
        Self {
            beta_x: 71.482996720846,
            beta_y: 39.603963961143,
            alpha_x: -1.562625067837,
            alpha_y: 1.283201237991,
            emittance_x: 2.044e-11,
            emittance_y: 8.176e-14,
            z0: -1.0e-6,
            t0: 1.0e-15,
            ..Self::new("e-", 250.0)
        }
    }
}
