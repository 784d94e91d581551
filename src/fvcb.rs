//! The Farquhar-von Caemmerer-Berry (FvCB) model of C3 photosynthesis.
//!
//! Net assimilation is the minimum of three candidate limiting rates minus
//! respiration: the Rubisco-limited rate Ac, the RuBP-regeneration-limited
//! rate Aj, and (optionally) the TPU-limited rate Ap. The minimum operator
//! is the model's essential nonlinearity: it makes the response continuous
//! but non-differentiable at the regime boundary, which is what can defeat
//! a gradient-based fit and why the bilinear fallback exists.
//!
//! Kinetic constants are the Bernacchi in-vivo values at 25 degrees C with
//! Arrhenius temperature corrections.

use crate::data::CurveDataset;
use crate::params::FitParameters;
use ndarray::Array1;

/// Universal gas constant (J mol^-1 K^-1).
pub const GAS_CONSTANT: f64 = 8.314;

/// Reference leaf temperature for the kinetic constants (degrees C).
pub const T_REF: f64 = 25.0;

const T_REF_K: f64 = 273.15 + T_REF;

/// Arrhenius temperature correction of a rate constant known at 25 degrees C.
fn arrhenius(k25: f64, activation_energy: f64, tleaf: f64) -> f64 {
    let tk = tleaf + 273.15;
    k25 * (activation_energy * (tk - T_REF_K) / (T_REF_K * GAS_CONSTANT * tk)).exp()
}

/// The FvCB rate equations with fixed kinetic constants.
///
/// The defaults are suitable for C3 leaves; individual constants can be
/// overridden through the public fields before fitting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FvcbModel {
    /// Michaelis constant of Rubisco for CO2 at 25 C (umol/mol).
    pub kc25: f64,

    /// Michaelis constant of Rubisco for O2 at 25 C (mmol/mol).
    pub ko25: f64,

    /// Photorespiratory CO2 compensation point at 25 C (umol/mol).
    pub gamma_star25: f64,

    /// Activation energy of Kc (J/mol).
    pub ea_kc: f64,

    /// Activation energy of Ko (J/mol).
    pub ea_ko: f64,

    /// Activation energy of Gamma* (J/mol).
    pub ea_gamma_star: f64,

    /// Intercellular O2 concentration (mmol/mol).
    pub oxygen: f64,

    /// Quantum yield of electron transport (mol electrons / mol photons).
    pub alpha: f64,

    /// Curvature of the non-rectangular hyperbola light response.
    pub theta: f64,

    /// Leaf temperature assumed when an observation carries none (degrees C).
    pub default_tleaf: f64,

    /// Photon flux density assumed when an observation carries none
    /// (umol m^-2 s^-1).
    pub default_ppfd: f64,
}

impl Default for FvcbModel {
    fn default() -> Self {
        Self {
            kc25: 404.9,
            ko25: 278.4,
            gamma_star25: 42.75,
            ea_kc: 79_430.0,
            ea_ko: 36_380.0,
            ea_gamma_star: 37_830.0,
            oxygen: 210.0,
            alpha: 0.24,
            theta: 0.85,
            default_tleaf: T_REF,
            default_ppfd: 1500.0,
        }
    }
}

impl FvcbModel {
    /// Create a model with the default constants.
    pub fn new() -> Self {
        Self::default()
    }

    /// Kc at the given leaf temperature (umol/mol).
    pub fn kc(&self, tleaf: f64) -> f64 {
        arrhenius(self.kc25, self.ea_kc, tleaf)
    }

    /// Ko at the given leaf temperature (mmol/mol).
    pub fn ko(&self, tleaf: f64) -> f64 {
        arrhenius(self.ko25, self.ea_ko, tleaf)
    }

    /// Gamma* at the given leaf temperature (umol/mol).
    pub fn gamma_star(&self, tleaf: f64) -> f64 {
        arrhenius(self.gamma_star25, self.ea_gamma_star, tleaf)
    }

    /// Effective Michaelis constant Km = Kc * (1 + O / Ko) (umol/mol).
    pub fn km(&self, tleaf: f64) -> f64 {
        self.kc(tleaf) * (1.0 + self.oxygen / self.ko(tleaf))
    }

    /// Electron-transport rate J from Jmax and PPFD via the
    /// non-rectangular hyperbola:
    /// theta * J^2 - (alpha*Q + Jmax) * J + alpha*Q * Jmax = 0,
    /// taking the lower root.
    pub fn electron_transport(&self, jmax: f64, ppfd: f64) -> f64 {
        let q2 = self.alpha * ppfd;
        if self.theta <= f64::EPSILON {
            // Rectangular limit: J is the Blackman minimum.
            return q2.min(jmax);
        }
        let b = q2 + jmax;
        let disc = (b * b - 4.0 * self.theta * q2 * jmax).max(0.0);
        (b - disc.sqrt()) / (2.0 * self.theta)
    }

    /// Invert the light response: the Jmax that yields electron-transport
    /// rate `j` at the given PPFD. Returns `None` when `j` is not attainable
    /// at that light level (j must satisfy 0 < j < alpha*Q).
    pub fn jmax_from_electron_transport(&self, j: f64, ppfd: f64) -> Option<f64> {
        let q2 = self.alpha * ppfd;
        if j <= 0.0 || j >= q2 {
            return None;
        }
        let jmax = j * (q2 - self.theta * j) / (q2 - j);
        (jmax.is_finite() && jmax > 0.0).then(|| jmax)
    }

    /// Rubisco-limited (carboxylation-limited) gross rate Ac.
    pub fn rubisco_limited(&self, ci: f64, tleaf: f64, vcmax: f64) -> f64 {
        vcmax * (ci - self.gamma_star(tleaf)) / (ci + self.km(tleaf))
    }

    /// RuBP-regeneration-limited gross rate Aj.
    pub fn regeneration_limited(&self, ci: f64, tleaf: f64, ppfd: f64, jmax: f64) -> f64 {
        let j = self.electron_transport(jmax, ppfd);
        let gs = self.gamma_star(tleaf);
        j * (ci - gs) / (4.0 * ci + 8.0 * gs)
    }

    /// TPU-limited gross rate Ap = 3 * TPU, independent of Ci.
    pub fn tpu_limited(&self, tpu: f64) -> f64 {
        3.0 * tpu
    }

    /// Net assimilation rate A = min(Ac, Aj, [Ap]) - Rd.
    ///
    /// `tleaf` and `ppfd` fall back to the model's reference defaults when
    /// the observation carries no measurement.
    pub fn assimilation(
        &self,
        ci: f64,
        tleaf: Option<f64>,
        ppfd: Option<f64>,
        params: &FitParameters,
    ) -> f64 {
        let tleaf = tleaf.unwrap_or(self.default_tleaf);
        let ppfd = ppfd.unwrap_or(self.default_ppfd);

        let ac = self.rubisco_limited(ci, tleaf, params.vcmax);
        let aj = self.regeneration_limited(ci, tleaf, ppfd, params.jmax);
        let mut gross = ac.min(aj);
        if let Some(tpu) = params.tpu {
            gross = gross.min(self.tpu_limited(tpu));
        }
        gross - params.rd
    }

    /// Predicted assimilation for every observation of a curve.
    pub fn predict(&self, data: &CurveDataset, params: &FitParameters) -> Array1<f64> {
        Array1::from_iter(
            data.observations()
                .iter()
                .map(|o| self.assimilation(o.ci, o.tleaf, o.ppfd, params)),
        )
    }
}
