//! Biochemical capacity parameters estimated by an A-Ci curve fit.

use crate::error::{FitError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// The FvCB capacity parameters recovered by fitting one curve.
///
/// All rates are non-negative and expressed in umol m^-2 s^-1. `tpu` is
/// present only when the TPU-limited regime is modeled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitParameters {
    /// Maximum carboxylation rate (Vcmax).
    pub vcmax: f64,

    /// Maximum electron-transport rate (Jmax).
    pub jmax: f64,

    /// Day respiration rate (Rd).
    pub rd: f64,

    /// Triose-phosphate-utilization limit (TPU), when modeled.
    pub tpu: Option<f64>,
}

impl FitParameters {
    /// Create a parameter set without a TPU limit.
    pub fn new(vcmax: f64, jmax: f64, rd: f64) -> Self {
        Self {
            vcmax,
            jmax,
            rd,
            tpu: None,
        }
    }

    /// Attach a TPU limit.
    pub fn with_tpu(mut self, tpu: f64) -> Self {
        self.tpu = Some(tpu);
        self
    }

    /// The number of free parameters (3, or 4 when TPU is modeled).
    pub fn free_count(&self) -> usize {
        if self.tpu.is_some() {
            4
        } else {
            3
        }
    }

    /// Pack the parameters into an optimizer vector
    /// `[vcmax, jmax, rd, (tpu)]`.
    pub fn to_array(&self) -> Array1<f64> {
        match self.tpu {
            Some(tpu) => Array1::from_vec(vec![self.vcmax, self.jmax, self.rd, tpu]),
            None => Array1::from_vec(vec![self.vcmax, self.jmax, self.rd]),
        }
    }

    /// Unpack an optimizer vector produced by [`to_array`](Self::to_array).
    ///
    /// # Errors
    ///
    /// Returns `FitError::DimensionMismatch` if the vector length does not
    /// match `fit_tpu`.
    pub fn from_array(values: &Array1<f64>, fit_tpu: bool) -> Result<Self> {
        let expected = if fit_tpu { 4 } else { 3 };
        if values.len() != expected {
            return Err(FitError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                expected,
                values.len()
            )));
        }

        let mut params = Self::new(values[0], values[1], values[2]);
        if fit_tpu {
            params = params.with_tpu(values[3]);
        }
        Ok(params)
    }

    /// Floor every rate at zero.
    ///
    /// The optimizer runs unconstrained; a converged solution can overshoot
    /// a boundary by a numerically small amount, and the bilinear conversion
    /// can produce a negative intercept-derived Rd on noisy segments.
    pub fn clamped(&self) -> Self {
        Self {
            vcmax: self.vcmax.max(0.0),
            jmax: self.jmax.max(0.0),
            rd: self.rd.max(0.0),
            tpu: self.tpu.map(|t| t.max(0.0)),
        }
    }

    /// Whether every rate is a finite number.
    pub fn is_finite(&self) -> bool {
        self.vcmax.is_finite()
            && self.jmax.is_finite()
            && self.rd.is_finite()
            && self.tpu.map_or(true, f64::is_finite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_array_round_trip() {
        let params = FitParameters::new(60.0, 120.0, 1.5);
        let arr = params.to_array();
        assert_eq!(arr.len(), 3);
        assert_eq!(FitParameters::from_array(&arr, false).unwrap(), params);

        let params = params.with_tpu(8.0);
        let arr = params.to_array();
        assert_eq!(arr.len(), 4);
        assert_eq!(FitParameters::from_array(&arr, true).unwrap(), params);
    }

    #[test]
    fn test_from_array_dimension_check() {
        let result = FitParameters::from_array(&array![1.0, 2.0, 3.0], true);
        assert!(result.is_err());
    }

    #[test]
    fn test_clamped() {
        let params = FitParameters::new(60.0, 120.0, -0.3).with_tpu(-1.0).clamped();
        assert_eq!(params.rd, 0.0);
        assert_eq!(params.tpu, Some(0.0));
        assert_eq!(params.vcmax, 60.0);
    }
}
