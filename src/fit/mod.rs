//! Single-curve fitting: method selection, diagnostics, and the result type.
//!
//! `CurveFitter` orchestrates one curve: for the nonlinear method it runs
//! the start-value estimator and the Levenberg-Marquardt solver, and
//! propagates numeric failure as an error for the caller to branch on; for
//! the bilinear method it runs the segmented fallback, which always
//! succeeds. Every success carries per-point predictions, residuals and
//! RMSE.

pub mod bilinear;
pub mod start;

use crate::data::CurveDataset;
use crate::error::Result;
use crate::fvcb::FvcbModel;
use crate::lm::LevenbergMarquardt;
use crate::params::FitParameters;
use crate::problem::AciProblem;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The fitting strategy applied to a curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMethod {
    /// Full FvCB nonlinear least-squares fit.
    Nonlinear,

    /// Segmented two-line fallback; always produces an estimate.
    Bilinear,
}

impl fmt::Display for FitMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitMethod::Nonlinear => write!(f, "nonlinear"),
            FitMethod::Bilinear => write!(f, "bilinear"),
        }
    }
}

/// A successful fit of one curve.
#[derive(Debug, Clone)]
pub struct CurveFit {
    /// The fitted capacity parameters.
    pub parameters: FitParameters,

    /// Model predictions at each observation, in input order.
    pub predicted: Array1<f64>,

    /// Observed minus predicted assimilation at each observation.
    pub residuals: Array1<f64>,

    /// Root-mean-square error of the fit.
    pub rmse: f64,

    /// Solver iterations (0 for the bilinear method).
    pub iterations: usize,

    /// A message describing how the fit concluded.
    pub message: String,

    /// The method that produced this fit.
    pub method: FitMethod,
}

/// Fits a single A-Ci curve with a chosen method.
#[derive(Debug, Clone)]
pub struct CurveFitter {
    model: FvcbModel,
    optimizer: LevenbergMarquardt,
    fit_tpu: bool,
}

impl Default for CurveFitter {
    fn default() -> Self {
        Self::new()
    }
}

impl CurveFitter {
    /// Create a fitter with the default FvCB constants and solver settings.
    pub fn new() -> Self {
        Self {
            model: FvcbModel::new(),
            optimizer: LevenbergMarquardt::new(),
            fit_tpu: false,
        }
    }

    /// Use custom FvCB constants.
    pub fn with_model(mut self, model: FvcbModel) -> Self {
        self.model = model;
        self
    }

    /// Use a custom-configured solver.
    pub fn with_optimizer(mut self, optimizer: LevenbergMarquardt) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Also fit the TPU-limited regime (adds a fourth free parameter).
    pub fn with_tpu(mut self, fit_tpu: bool) -> Self {
        self.fit_tpu = fit_tpu;
        self
    }

    /// The model constants this fitter evaluates with.
    pub fn model(&self) -> &FvcbModel {
        &self.model
    }

    /// Fit one curve with the requested method.
    ///
    /// For `FitMethod::Nonlinear` a numeric failure (`NonConvergence`,
    /// `SingularSystem`, `InsufficientData`) is returned as an error for
    /// the caller to decide on a retry. `FitMethod::Bilinear` always
    /// succeeds.
    pub fn fit_one(&self, data: &CurveDataset, method: FitMethod) -> Result<CurveFit> {
        match method {
            FitMethod::Nonlinear => self.fit_nonlinear(data),
            FitMethod::Bilinear => Ok(self.fit_bilinear(data)),
        }
    }

    fn fit_nonlinear(&self, data: &CurveDataset) -> Result<CurveFit> {
        let initial = start::estimate(data, &self.model, self.fit_tpu);
        let problem = AciProblem::new(&self.model, data, self.fit_tpu);
        let solution = self.optimizer.minimize(&problem, initial.to_array())?;

        let parameters = FitParameters::from_array(&solution.params, self.fit_tpu)?.clamped();
        Ok(self.diagnostics(
            data,
            parameters,
            solution.iterations,
            solution.message,
            FitMethod::Nonlinear,
        ))
    }

    fn fit_bilinear(&self, data: &CurveDataset) -> CurveFit {
        let parameters = bilinear::fit(data, &self.model, self.fit_tpu);
        self.diagnostics(
            data,
            parameters,
            0,
            "Bilinear segmented fit".to_string(),
            FitMethod::Bilinear,
        )
    }

    /// Assemble the result with predictions, residuals and RMSE.
    fn diagnostics(
        &self,
        data: &CurveDataset,
        parameters: FitParameters,
        iterations: usize,
        message: String,
        method: FitMethod,
    ) -> CurveFit {
        let predicted = self.model.predict(data, &parameters);
        let residuals = &data.assimilation_values() - &predicted;
        let rmse = (residuals.iter().map(|r| r.powi(2)).sum::<f64>() / data.len() as f64).sqrt();

        CurveFit {
            parameters,
            predicted,
            residuals,
            rmse,
            iterations,
            message,
            method,
        }
    }
}
