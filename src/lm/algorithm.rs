//! Implementation of the Levenberg-Marquardt algorithm.
//!
//! A damped Gauss-Newton iteration: each step solves the normal equations
//! (J^T J + lambda * I) delta = J^T r and adapts the damping parameter
//! lambda depending on whether the step reduced the cost. Failure to make
//! progress is reported through `FitError`, never by panicking, so the
//! batch driver can branch on the error kind and fall back.

use ndarray::{Array1, Array2};
use std::fmt;

use crate::error::{FitError, Result};
use crate::problem::Problem;

use super::config::LmConfig;

/// Result of a successful Levenberg-Marquardt optimization.
#[derive(Debug, Clone)]
pub struct LmFit {
    /// Optimized parameter values
    pub params: Array1<f64>,

    /// Residuals at the solution
    pub residuals: Array1<f64>,

    /// Sum of squared residuals at the solution
    pub cost: f64,

    /// Number of iterations performed
    pub iterations: usize,

    /// Number of function evaluations
    pub func_evals: usize,

    /// A message describing how convergence was reached
    pub message: String,
}

impl fmt::Display for LmFit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimization Result:")?;
        writeln!(f, "  Message: {}", self.message)?;
        writeln!(f, "  Cost: {:.6e}", self.cost)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Function evaluations: {}", self.func_evals)?;
        writeln!(f, "  Parameters: {:?}", self.params)?;
        Ok(())
    }
}

/// The Levenberg-Marquardt optimizer.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    /// Configuration options
    config: LmConfig,
}

impl LevenbergMarquardt {
    /// Create a new optimizer with default configuration.
    pub fn new() -> Self {
        Self {
            config: LmConfig::default(),
        }
    }

    /// Create a new optimizer with the given configuration.
    pub fn with_config(config: LmConfig) -> Self {
        Self { config }
    }

    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Set the tolerance for relative change in cost.
    pub fn with_ftol(mut self, ftol: f64) -> Self {
        self.config.ftol = ftol;
        self
    }

    /// Set the tolerance for relative change in parameter values.
    pub fn with_xtol(mut self, xtol: f64) -> Self {
        self.config.xtol = xtol;
        self
    }

    /// Set the tolerance for gradient norm.
    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.config.gtol = gtol;
        self
    }

    /// Set the initial value for the damping parameter.
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.config.initial_lambda = lambda;
        self
    }

    /// Minimize the sum of squared residuals for the given problem.
    ///
    /// # Arguments
    ///
    /// * `problem` - The problem to solve
    /// * `initial_params` - Initial guess for the parameter values
    ///
    /// # Errors
    ///
    /// * `InsufficientData` - fewer residuals than free parameters plus one
    /// * `SingularSystem` - the damped normal equations stayed unsolvable
    ///   up the damping ladder (rank-deficient Jacobian)
    /// * `NonConvergence` - the iteration limit was reached, or damping hit
    ///   its maximum without a cost decrease
    pub fn minimize<P: Problem>(&self, problem: &P, initial_params: Array1<f64>) -> Result<LmFit> {
        let n_params = problem.parameter_count();
        if initial_params.len() != n_params {
            return Err(FitError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                n_params,
                initial_params.len()
            )));
        }

        // At least one degree of freedom: an exactly determined system has
        // nothing to average noise over and is rejected up front.
        let n_residuals = problem.residual_count();
        if n_residuals <= n_params {
            return Err(FitError::InsufficientData(format!(
                "{} observation(s) for {} free parameter(s)",
                n_residuals, n_params
            )));
        }

        let mut params = initial_params;
        let mut residuals = problem.eval(&params)?;
        let mut cost: f64 = residuals.iter().map(|r| r.powi(2)).sum();
        let mut func_evals = 1;
        let mut lambda = self.config.initial_lambda;

        if !cost.is_finite() {
            return Err(FitError::ComputationError(
                "initial residuals are not finite".to_string(),
            ));
        }

        for iteration in 1..=self.config.max_iterations {
            let jacobian = problem.jacobian(&params)?;
            func_evals += n_params;

            let jt = jacobian.t();
            let jtj = jt.dot(&jacobian);
            let gradient = jt.dot(&residuals);

            if gradient.iter().any(|g| !g.is_finite()) {
                return Err(FitError::ComputationError(
                    "non-finite values in the Jacobian".to_string(),
                ));
            }

            // Gradient convergence.
            let gradient_norm = gradient.iter().map(|g| g * g).sum::<f64>().sqrt();
            if gradient_norm < self.config.gtol {
                return Ok(LmFit {
                    params,
                    residuals,
                    cost,
                    iterations: iteration - 1,
                    func_evals,
                    message: format!(
                        "Gradient convergence: ||g|| = {:.2e} < {:.2e}",
                        gradient_norm, self.config.gtol
                    ),
                });
            }

            // Try steps with increasing damping until one is accepted.
            loop {
                let delta = match solve_damped(&jtj, &gradient, lambda) {
                    Some(delta) => delta,
                    None => {
                        lambda *= self.config.lambda_up_factor;
                        if lambda > self.config.max_lambda {
                            return Err(FitError::SingularSystem(format!(
                                "normal equations unsolvable at lambda = {:.2e}",
                                self.config.max_lambda
                            )));
                        }
                        continue;
                    }
                };

                let new_params = &params - &delta;
                let new_residuals = problem.eval(&new_params)?;
                func_evals += 1;
                let new_cost: f64 = new_residuals.iter().map(|r| r.powi(2)).sum();

                if new_cost.is_finite() && new_cost < cost {
                    // Step accepted.
                    let max_rel_step = delta
                        .iter()
                        .zip(params.iter())
                        .map(|(d, p)| d.abs() / p.abs().max(1.0))
                        .fold(0.0, f64::max);
                    let rel_cost_change = (cost - new_cost) / cost.max(f64::MIN_POSITIVE);

                    params = new_params;
                    residuals = new_residuals;
                    cost = new_cost;
                    lambda = (lambda * self.config.lambda_down_factor).max(self.config.min_lambda);

                    if max_rel_step < self.config.xtol {
                        return Ok(LmFit {
                            params,
                            residuals,
                            cost,
                            iterations: iteration,
                            func_evals,
                            message: format!(
                                "Parameter convergence: |dx|/|x| = {:.2e} < {:.2e}",
                                max_rel_step, self.config.xtol
                            ),
                        });
                    }
                    if rel_cost_change < self.config.ftol {
                        return Ok(LmFit {
                            params,
                            residuals,
                            cost,
                            iterations: iteration,
                            func_evals,
                            message: format!(
                                "Cost convergence: |df|/|f| = {:.2e} < {:.2e}",
                                rel_cost_change, self.config.ftol
                            ),
                        });
                    }
                    break;
                }

                // Step rejected: increase damping and retry.
                lambda *= self.config.lambda_up_factor;
                if lambda > self.config.max_lambda {
                    return Err(FitError::NonConvergence(
                        "failed to decrease cost, and lambda reached maximum".to_string(),
                    ));
                }
            }
        }

        Err(FitError::NonConvergence(format!(
            "Maximum iterations ({}) reached",
            self.config.max_iterations
        )))
    }
}

/// Solve (J^T J + lambda * I) x = g.
///
/// Tries Cholesky first, falling back to QR; returns `None` when the damped
/// matrix is numerically rank-deficient under both.
fn solve_damped(jtj: &Array2<f64>, g: &Array1<f64>, lambda: f64) -> Option<Array1<f64>> {
    let n = jtj.nrows();
    let mut a = jtj.clone();
    for i in 0..n {
        a[[i, i]] += lambda;
    }

    cholesky_solve(&a, g).or_else(|| qr_solve(&a, g))
}

/// Solve a symmetric positive-definite system with an unpivoted Cholesky
/// decomposition. Returns `None` if the matrix is not positive definite.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut l = a.clone();

    for k in 0..n {
        for j in 0..k {
            l[[k, k]] -= l[[k, j]] * l[[k, j]];
        }
        if l[[k, k]] <= 0.0 || !l[[k, k]].is_finite() {
            return None;
        }

        let akk_sqrt = l[[k, k]].sqrt();
        l[[k, k]] = akk_sqrt;

        for i in k + 1..n {
            for j in 0..k {
                l[[i, k]] -= l[[i, j]] * l[[k, j]];
            }
            l[[i, k]] /= akk_sqrt;
        }
    }

    // Forward substitution (L * y = b).
    let mut y = b.clone();
    for i in 0..n {
        for j in 0..i {
            let adj = l[[i, j]] * y[j];
            y[i] -= adj;
        }
        y[i] /= l[[i, i]];
    }

    // Backward substitution (L^T * x = y).
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        x[i] = y[i];
        for j in (i + 1)..n {
            let adj = l[[j, i]] * x[j];
            x[i] -= adj;
        }
        x[i] /= l[[i, i]];
    }

    Some(x)
}

/// Solve a square system with Gram-Schmidt QR. Returns `None` when a
/// diagonal of R falls below tolerance (rank deficiency).
fn qr_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut q = a.clone();
    let mut r = Array2::<f64>::zeros((n, n));

    for col in 0..n {
        for k in 0..col {
            let dot = (0..n).map(|i| q[[i, k]] * q[[i, col]]).sum::<f64>();
            r[[k, col]] = dot;
            for i in 0..n {
                let adj = dot * q[[i, k]];
                q[[i, col]] -= adj;
            }
        }

        let norm = (0..n).map(|i| q[[i, col]] * q[[i, col]]).sum::<f64>().sqrt();
        if norm < 1e-12 || !norm.is_finite() {
            return None;
        }
        r[[col, col]] = norm;
        for i in 0..n {
            q[[i, col]] /= norm;
        }
    }

    // Compute Q^T * b.
    let mut qtb = Array1::zeros(n);
    for col in 0..n {
        qtb[col] = (0..n).map(|i| q[[i, col]] * b[i]).sum::<f64>();
    }

    // Solve R * x = Q^T * b by back substitution.
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        x[i] = qtb[i];
        for k in (i + 1)..n {
            let adj = r[[i, k]] * x[k];
            x[i] -= adj;
        }
        x[i] /= r[[i, i]];
    }

    Some(x)
}
