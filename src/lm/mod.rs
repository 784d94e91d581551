//! Levenberg-Marquardt nonlinear least-squares optimizer.
//!
//! This module provides the iterative solver used for the nonlinear A-Ci
//! fit: a damped Gauss-Newton iteration over the `Problem` trait with
//! configurable convergence tolerances.

mod algorithm;
mod config;

pub use algorithm::{LevenbergMarquardt, LmFit};
pub use config::LmConfig;
