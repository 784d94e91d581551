//! Numeric helper utilities.

pub mod finite_difference;
