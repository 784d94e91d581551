//! Starting-value heuristics for the nonlinear fit.
//!
//! The estimates here only seed the optimizer, so they trade accuracy for
//! robustness: every branch has a fixed generic default and the estimator
//! never fails outright.

use crate::data::CurveDataset;
use crate::fvcb::FvcbModel;
use crate::params::FitParameters;

/// Generic defaults used when a regime has too few usable points.
const DEFAULT_VCMAX: f64 = 50.0;
const DEFAULT_RD: f64 = 1.5;

/// Typical Jmax:Vcmax ratio, used when the plateau cannot be inverted.
const JMAX_VCMAX_RATIO: f64 = 1.7;

/// Ci below which a point is treated as Rubisco-limited for the Vcmax
/// estimate (umol/mol).
const LOW_CI_LIMIT: f64 = 350.0;

/// Derive initial parameter guesses from the observed curve.
///
/// Heuristics: Rd from the (negated) assimilation at the lowest observed
/// Ci; Vcmax from the Rubisco-limited equation inverted at each low-Ci
/// point; Jmax from the high-Ci plateau via the light-response inversion,
/// falling back to a fixed multiple of Vcmax.
pub fn estimate(data: &CurveDataset, model: &FvcbModel, fit_tpu: bool) -> FitParameters {
    let tleaf = data.mean_tleaf().unwrap_or(model.default_tleaf);
    let ppfd = data.mean_ppfd().unwrap_or(model.default_ppfd);
    let gamma_star = model.gamma_star(tleaf);
    let km = model.km(tleaf);

    let mut sorted: Vec<_> = data.observations().to_vec();
    sorted.sort_by(|a, b| a.ci.total_cmp(&b.ci));

    // Rd: respiration shows as negative assimilation at the lowest Ci.
    let lowest = &sorted[0];
    let rd = if lowest.assimilation < 0.0 && lowest.assimilation.is_finite() {
        -lowest.assimilation
    } else {
        DEFAULT_RD
    };

    // Vcmax: invert Ac = Vcmax * (Ci - Gamma*) / (Ci + Km) at each point of
    // the low-Ci regime, then average the implied values.
    let implied: Vec<f64> = sorted
        .iter()
        .filter(|o| o.ci < LOW_CI_LIMIT && o.ci > 1.5 * gamma_star)
        .map(|o| (o.assimilation + rd) * (o.ci + km) / (o.ci - gamma_star))
        .filter(|v| v.is_finite() && *v > 0.0)
        .collect();
    let vcmax = if implied.is_empty() {
        DEFAULT_VCMAX
    } else {
        implied.iter().sum::<f64>() / implied.len() as f64
    };

    // Jmax: the highest-Ci point approximates the regeneration-limited
    // plateau. Invert Aj for the required J, then invert the light response.
    let highest = &sorted[sorted.len() - 1];
    let jmax = if highest.ci > 1.5 * gamma_star && highest.assimilation.is_finite() {
        let j = (highest.assimilation + rd) * (4.0 * highest.ci + 8.0 * gamma_star)
            / (highest.ci - gamma_star);
        model
            .jmax_from_electron_transport(j, ppfd)
            .unwrap_or(JMAX_VCMAX_RATIO * vcmax)
    } else {
        JMAX_VCMAX_RATIO * vcmax
    };

    let mut params = FitParameters::new(vcmax, jmax, rd);
    if fit_tpu {
        // Ap = 3 * TPU caps the plateau; start just above it so the TPU
        // limit is initially inactive.
        let amax = sorted
            .iter()
            .map(|o| o.assimilation)
            .fold(f64::NEG_INFINITY, f64::max);
        let tpu = if amax.is_finite() && amax > 0.0 {
            (amax + rd) / 3.0 * 1.2
        } else {
            DEFAULT_VCMAX / 6.0
        };
        params = params.with_tpu(tpu);
    }

    if params.is_finite() {
        params.clamped()
    } else {
        let mut fallback = FitParameters::new(DEFAULT_VCMAX, JMAX_VCMAX_RATIO * DEFAULT_VCMAX, DEFAULT_RD);
        if fit_tpu {
            fallback = fallback.with_tpu(DEFAULT_VCMAX / 6.0);
        }
        fallback
    }
}
