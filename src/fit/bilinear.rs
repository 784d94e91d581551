//! Bilinear (segmented two-line) fallback fit.
//!
//! The curve is treated as two linear regimes in (Ci, A) space: a low-Ci
//! Rubisco-limited slope and a high-Ci plateau. The breakpoint search is
//! exhaustive over the interior points of the Ci-sorted data, which is
//! cheap at typical curve sizes (tens of points) and fully deterministic.
//! The fitted low segment is converted to Vcmax and Rd through the
//! Rubisco-limited rate equation at the curve's mean leaf temperature, and
//! the plateau to Jmax through the light-response inversion at mean PPFD.
//!
//! This method never fails, for better or worse: every degenerate input
//! takes a documented fallback, so it is the designated recovery path when
//! the nonlinear fit does not converge.

use crate::data::CurveDataset;
use crate::fvcb::FvcbModel;
use crate::params::FitParameters;

/// Defaults used when a conversion degenerates (constant Ci, positive or
/// non-finite slope conversions).
const DEFAULT_VCMAX: f64 = 50.0;
const DEFAULT_RD: f64 = 1.5;
const JMAX_VCMAX_RATIO: f64 = 1.7;

/// Each segment needs two points for a regression line.
const MIN_SEGMENT: usize = 2;

/// Ordinary least squares over (x, y) pairs: slope, intercept, and residual
/// sum of squares. A constant-x segment regresses to its mean.
fn ols(points: &[(f64, f64)]) -> (f64, f64, f64) {
    let n = points.len() as f64;
    let sum_x: f64 = points.iter().map(|(x, _)| x).sum();
    let sum_y: f64 = points.iter().map(|(_, y)| y).sum();
    let sum_xy: f64 = points.iter().map(|(x, y)| x * y).sum();
    let sum_xx: f64 = points.iter().map(|(x, _)| x * x).sum();

    let denom = n * sum_xx - sum_x * sum_x;
    let (slope, intercept) = if denom.abs() < 1e-10 {
        (0.0, sum_y / n)
    } else {
        let slope = (n * sum_xy - sum_x * sum_y) / denom;
        (slope, (sum_y - slope * sum_x) / n)
    };

    let rss = points
        .iter()
        .map(|(x, y)| {
            let r = y - (slope * x + intercept);
            r * r
        })
        .sum();

    (slope, intercept, rss)
}

/// Fit the segmented two-line model and convert it to FvCB parameters.
///
/// Always returns finite, non-negative parameters.
pub fn fit(data: &CurveDataset, model: &FvcbModel, fit_tpu: bool) -> FitParameters {
    let tleaf = data.mean_tleaf().unwrap_or(model.default_tleaf);
    let ppfd = data.mean_ppfd().unwrap_or(model.default_ppfd);
    let gamma_star = model.gamma_star(tleaf);
    let km = model.km(tleaf);

    let mut points: Vec<(f64, f64)> = data
        .observations()
        .iter()
        .map(|o| (o.ci, o.assimilation))
        .collect();
    points.sort_by(|a, b| a.0.total_cmp(&b.0));
    let n = points.len();

    // Breakpoint search: every split leaving at least two points per
    // segment. Curves too short to split use all points for the slope and
    // their maximum for the plateau.
    let (low_slope, low_intercept, plateau) = if n >= 2 * MIN_SEGMENT {
        let mut best: Option<(f64, (f64, f64), f64)> = None;
        for split in MIN_SEGMENT..=(n - MIN_SEGMENT) {
            let (slope_lo, intercept_lo, rss_lo) = ols(&points[..split]);
            let (slope_hi, intercept_hi, rss_hi) = ols(&points[split..]);
            let total = rss_lo + rss_hi;
            if best.as_ref().map_or(true, |(rss, _, _)| total < *rss) {
                // The plateau is the high line evaluated at the mean Ci of
                // its own segment.
                let mean_ci_hi = points[split..].iter().map(|(x, _)| x).sum::<f64>()
                    / (n - split) as f64;
                let plateau = slope_hi * mean_ci_hi + intercept_hi;
                best = Some((total, (slope_lo, intercept_lo), plateau));
            }
        }
        let (_, (slope, intercept), plateau) = best.unwrap();
        (slope, intercept, plateau)
    } else {
        let (slope, intercept, _) = ols(&points);
        let plateau = points
            .iter()
            .map(|(_, y)| *y)
            .fold(f64::NEG_INFINITY, f64::max);
        (slope, intercept, plateau)
    };

    // Low segment: A = (Vcmax/Km)*Ci - Vcmax*Gamma*/Km - Rd, so
    // Vcmax = slope * Km and Rd = -(intercept + slope * Gamma*).
    let vcmax_raw = low_slope * km;
    let rd_raw = -(low_intercept + low_slope * gamma_star);
    let (vcmax, rd) = if vcmax_raw.is_finite() && vcmax_raw > 0.0 {
        (vcmax_raw, if rd_raw.is_finite() { rd_raw.max(0.0) } else { DEFAULT_RD })
    } else {
        (DEFAULT_VCMAX, DEFAULT_RD)
    };

    // High segment: plateau = Aj = J*(Ci - Gamma*)/(4Ci + 8Gamma*),
    // evaluated at the highest observed Ci; invert for J, then for Jmax.
    let ci_hi = points[n - 1].0;
    let jmax = if plateau.is_finite() && ci_hi > 1.5 * gamma_star {
        let j = (plateau + rd) * (4.0 * ci_hi + 8.0 * gamma_star) / (ci_hi - gamma_star);
        model
            .jmax_from_electron_transport(j, ppfd)
            .unwrap_or(JMAX_VCMAX_RATIO * vcmax)
    } else {
        JMAX_VCMAX_RATIO * vcmax
    };

    let mut params = FitParameters::new(vcmax, jmax, rd);
    if fit_tpu {
        let tpu = if plateau.is_finite() && plateau + rd > 0.0 {
            (plateau + rd) / 3.0
        } else {
            vcmax / 6.0
        };
        params = params.with_tpu(tpu);
    }

    if params.is_finite() {
        params.clamped()
    } else {
        let mut fallback =
            FitParameters::new(DEFAULT_VCMAX, JMAX_VCMAX_RATIO * DEFAULT_VCMAX, DEFAULT_RD);
        if fit_tpu {
            fallback = fallback.with_tpu(DEFAULT_VCMAX / 6.0);
        }
        fallback
    }
}
