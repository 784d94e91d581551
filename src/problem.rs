//! Least-squares problem definition.
//!
//! This module defines the `Problem` trait consumed by the
//! Levenberg-Marquardt optimizer, and `AciProblem`, which binds the FvCB
//! model to one curve's observations.

use crate::data::CurveDataset;
use crate::error::Result;
use crate::fvcb::FvcbModel;
use crate::params::FitParameters;
use ndarray::{Array1, Array2};

/// A nonlinear least-squares problem.
pub trait Problem {
    /// Evaluate the residuals at the given parameters.
    ///
    /// # Arguments
    ///
    /// * `params` - The parameter values at which to evaluate the residuals
    ///
    /// # Returns
    ///
    /// * A vector of residuals, or an error if the evaluation fails
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>>;

    /// Get the number of parameters in the problem.
    fn parameter_count(&self) -> usize;

    /// Get the number of residuals in the problem.
    fn residual_count(&self) -> usize;

    /// Evaluate the Jacobian matrix at the given parameters.
    ///
    /// The Jacobian is the matrix of partial derivatives of the residuals
    /// with respect to the parameters. The default implementation uses
    /// forward finite differences; this is also the right choice for the
    /// FvCB model, whose min() operator has no analytical derivative at the
    /// regime boundary.
    fn jacobian(&self, params: &Array1<f64>) -> Result<Array2<f64>>
    where
        Self: Sized,
    {
        crate::utils::finite_difference::jacobian(self, params, None)
    }

    /// Evaluate the sum of squared residuals at the given parameters.
    fn eval_cost(&self, params: &Array1<f64>) -> Result<f64> {
        let residuals = self.eval(params)?;
        Ok(residuals.iter().map(|r| r.powi(2)).sum())
    }
}

/// The least-squares problem for one A-Ci curve: residuals are
/// model-predicted minus observed assimilation at each observation.
///
/// The parameter vector layout is `[vcmax, jmax, rd]`, with `tpu` appended
/// when the TPU-limited regime is modeled.
pub struct AciProblem<'a> {
    model: &'a FvcbModel,
    data: &'a CurveDataset,
    fit_tpu: bool,
}

impl<'a> AciProblem<'a> {
    /// Bind a model to one curve's observations.
    pub fn new(model: &'a FvcbModel, data: &'a CurveDataset, fit_tpu: bool) -> Self {
        Self {
            model,
            data,
            fit_tpu,
        }
    }
}

impl Problem for AciProblem<'_> {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        let params = FitParameters::from_array(params, self.fit_tpu)?;
        let residuals = self
            .data
            .observations()
            .iter()
            .map(|o| self.model.assimilation(o.ci, o.tleaf, o.ppfd, &params) - o.assimilation)
            .collect::<Vec<f64>>();
        Ok(Array1::from_vec(residuals))
    }

    fn parameter_count(&self) -> usize {
        if self.fit_tpu {
            4
        } else {
            3
        }
    }

    fn residual_count(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CurveObservation;
    use approx::assert_relative_eq;

    fn synthetic_curve(model: &FvcbModel, params: &FitParameters) -> CurveDataset {
        let observations = [50.0, 150.0, 300.0, 500.0, 800.0, 1200.0]
            .iter()
            .map(|&ci| {
                CurveObservation::new(ci, model.assimilation(ci, None, None, params))
            })
            .collect();
        CurveDataset::new(observations).unwrap()
    }

    #[test]
    fn test_residuals_vanish_at_true_parameters() {
        let model = FvcbModel::new();
        let params = FitParameters::new(60.0, 120.0, 1.5);
        let data = synthetic_curve(&model, &params);

        let problem = AciProblem::new(&model, &data, false);
        let residuals = problem.eval(&params.to_array()).unwrap();

        assert_eq!(residuals.len(), data.len());
        for r in residuals.iter() {
            assert_relative_eq!(*r, 0.0, epsilon = 1e-10);
        }
        assert_relative_eq!(
            problem.eval_cost(&params.to_array()).unwrap(),
            0.0,
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_finite_difference_jacobian_shape() {
        let model = FvcbModel::new();
        let params = FitParameters::new(60.0, 120.0, 1.5);
        let data = synthetic_curve(&model, &params);

        let problem = AciProblem::new(&model, &data, false);
        let jac = problem.jacobian(&params.to_array()).unwrap();
        assert_eq!(jac.shape(), &[data.len(), 3]);

        // At low Ci the curve is Rubisco-limited, so the residual there must
        // respond to Vcmax but not to Jmax.
        assert!(jac[[0, 0]].abs() > 1e-6);
        assert!(jac[[0, 1]].abs() < 1e-6);
    }

    #[test]
    fn test_parameter_counts() {
        let model = FvcbModel::new();
        let params = FitParameters::new(60.0, 120.0, 1.5);
        let data = synthetic_curve(&model, &params);

        assert_eq!(AciProblem::new(&model, &data, false).parameter_count(), 3);
        assert_eq!(AciProblem::new(&model, &data, true).parameter_count(), 4);
        assert_eq!(AciProblem::new(&model, &data, false).residual_count(), 6);
    }
}
