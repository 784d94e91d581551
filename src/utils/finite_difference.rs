//! Finite difference approximation of the Jacobian.

use crate::error::{FitError, Result};
use crate::problem::Problem;
use ndarray::Array2;

/// Default relative step size for finite differences.
const DEFAULT_EPSILON: f64 = 1e-8;

/// Compute the Jacobian matrix using forward finite differences.
///
/// The Jacobian is the matrix of partial derivatives of the residuals with
/// respect to the parameters: J[i,j] = d residual[i] / d param[j]. The step
/// for each parameter is scaled to the parameter's magnitude.
///
/// # Arguments
///
/// * `problem` - The problem to evaluate
/// * `params` - The parameter values at which to evaluate the Jacobian
/// * `epsilon` - The relative step size (optional)
///
/// # Returns
///
/// * `Result<Array2<f64>>` - The Jacobian matrix
pub fn jacobian(
    problem: &dyn Problem,
    params: &ndarray::Array1<f64>,
    epsilon: Option<f64>,
) -> Result<Array2<f64>> {
    let eps = epsilon.unwrap_or(DEFAULT_EPSILON);
    let n_params = params.len();
    let n_residuals = problem.residual_count();

    let residuals = problem.eval(params)?;
    if residuals.len() != n_residuals {
        return Err(FitError::DimensionMismatch(format!(
            "Expected {} residuals, got {}",
            n_residuals,
            residuals.len()
        )));
    }

    let mut jac = Array2::zeros((n_residuals, n_params));

    for j in 0..n_params {
        let mut perturbed = params.clone();

        // Scale the step to the parameter's magnitude.
        let param_j = params[j];
        let eps_j = if param_j.abs() > eps {
            param_j.abs() * eps.sqrt()
        } else {
            eps.sqrt()
        };

        perturbed[j] += eps_j;
        let residuals_perturbed = problem.eval(&perturbed)?;

        for i in 0..n_residuals {
            jac[[i, j]] = (residuals_perturbed[i] - residuals[i]) / eps_j;
        }
    }

    Ok(jac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array1};

    /// f(x) = a * x + b over fixed x data; residual_i = a * x_i + b - y_i.
    struct LinearProblem {
        x: Array1<f64>,
        y: Array1<f64>,
    }

    impl Problem for LinearProblem {
        fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
            let (a, b) = (params[0], params[1]);
            Ok(self
                .x
                .iter()
                .zip(self.y.iter())
                .map(|(x, y)| a * x + b - y)
                .collect())
        }

        fn parameter_count(&self) -> usize {
            2
        }

        fn residual_count(&self) -> usize {
            self.x.len()
        }
    }

    #[test]
    fn test_linear_jacobian() {
        let problem = LinearProblem {
            x: array![1.0, 2.0, 3.0],
            y: array![2.0, 4.0, 6.0],
        };
        let jac = jacobian(&problem, &array![2.0, 0.5], None).unwrap();

        assert_eq!(jac.shape(), &[3, 2]);
        for i in 0..3 {
            assert_relative_eq!(jac[[i, 0]], problem.x[i], epsilon = 1e-4);
            assert_relative_eq!(jac[[i, 1]], 1.0, epsilon = 1e-4);
        }
    }
}
