//! # aci-fit
//!
//! `aci-fit` fits photosynthetic CO2-response curves (A-Ci curves) measured
//! by leaf gas-exchange instruments, recovering the biochemical capacity
//! parameters of the Farquhar-von Caemmerer-Berry model: the maximum
//! carboxylation rate Vcmax, the maximum electron-transport rate Jmax, day
//! respiration Rd, and optionally the triose-phosphate-utilization limit
//! TPU.
//!
//! The library provides:
//! - The FvCB rate equations with Arrhenius temperature corrections
//! - A Levenberg-Marquardt nonlinear least-squares fit seeded by
//!   data-driven starting values
//! - A deterministic bilinear (segmented two-line) fallback that always
//!   produces an estimate
//! - A batch driver that fits many curves grouped by a table column and
//!   automatically re-fits nonlinear failures with the fallback
//!
//! ## Basic usage
//!
//! ```
//! use aci_fit::{CurveDataset, CurveFitter, CurveObservation, FitMethod};
//!
//! let fitter = CurveFitter::new();
//! let truth = aci_fit::FitParameters::new(60.0, 120.0, 1.5);
//! let data = CurveDataset::new(
//!     [50.0, 150.0, 300.0, 500.0, 800.0, 1200.0]
//!         .iter()
//!         .map(|&ci| {
//!             let a = fitter.model().assimilation(ci, None, None, &truth);
//!             CurveObservation::new(ci, a)
//!         })
//!         .collect(),
//! )
//! .unwrap();
//!
//! let fit = fitter.fit_one(&data, FitMethod::Nonlinear).unwrap();
//! assert!((fit.parameters.vcmax - 60.0).abs() / 60.0 < 0.05);
//! ```

pub mod batch;
pub mod data;
pub mod error;
pub mod fit;
pub mod fvcb;
pub mod lm;
pub mod params;
pub mod problem;

mod utils;

// Re-exports for convenience
pub use batch::{BatchFitter, CoefficientRow, GroupFit, GroupedFitCollection, NoProgress, ProgressSink};
pub use data::{CurveDataset, CurveObservation, FieldValue, GasExchangeTable};
pub use error::{FitError, Result};
pub use fit::{CurveFit, CurveFitter, FitMethod};
pub use fvcb::FvcbModel;
pub use lm::{LevenbergMarquardt, LmConfig};
pub use params::FitParameters;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
