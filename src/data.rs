//! Input data types for A-Ci curve fitting.
//!
//! This module defines the observation and dataset types consumed by the
//! fitting components: a single gas-exchange measurement, the ordered
//! per-curve dataset, and a schema-typed table for batch input with named
//! grouping and id columns.

use crate::error::{FitError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A value stored in a named table column (group keys, id fields).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// A numeric value.
    Number(f64),

    /// A text value.
    Text(String),
}

impl FieldValue {
    /// Create a text field value.
    pub fn text(s: impl Into<String>) -> Self {
        FieldValue::Text(s.into())
    }

    /// Create a numeric field value.
    pub fn number(v: f64) -> Self {
        FieldValue::Number(v)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(v) => write!(f, "{}", v),
            FieldValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Number(v)
    }
}

/// One gas-exchange measurement: intercellular CO2 concentration (Ci,
/// umol/mol) and net assimilation rate (A, umol m^-2 s^-1), with optional
/// leaf temperature (Tleaf, degrees C) and photon flux density
/// (PPFD, umol m^-2 s^-1).
///
/// When `tleaf` or `ppfd` is absent, the model uses its fixed reference
/// defaults for temperature and light corrections.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurveObservation {
    /// Intercellular CO2 concentration (umol/mol).
    pub ci: f64,

    /// Net CO2 assimilation rate (umol m^-2 s^-1).
    pub assimilation: f64,

    /// Leaf temperature (degrees C), if measured.
    pub tleaf: Option<f64>,

    /// Photosynthetically active photon flux density (umol m^-2 s^-1),
    /// if measured.
    pub ppfd: Option<f64>,
}

impl CurveObservation {
    /// Create an observation with only the required Ci and assimilation values.
    pub fn new(ci: f64, assimilation: f64) -> Self {
        Self {
            ci,
            assimilation,
            tleaf: None,
            ppfd: None,
        }
    }

    /// Attach a measured leaf temperature (degrees C).
    pub fn with_tleaf(mut self, tleaf: f64) -> Self {
        self.tleaf = Some(tleaf);
        self
    }

    /// Attach a measured photon flux density (umol m^-2 s^-1).
    pub fn with_ppfd(mut self, ppfd: f64) -> Self {
        self.ppfd = Some(ppfd);
        self
    }
}

/// An ordered, non-empty sequence of observations belonging to one physical
/// A-Ci curve.
///
/// Fitting quality requires several points spanning both the CO2-limited and
/// the regeneration-limited regimes, but this is not enforced structurally;
/// under-determined curves fail at fit time with `InsufficientData`.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveDataset {
    observations: Vec<CurveObservation>,
}

impl CurveDataset {
    /// Create a dataset from a vector of observations.
    ///
    /// # Errors
    ///
    /// Returns `FitError::InvalidInput` if `observations` is empty.
    pub fn new(observations: Vec<CurveObservation>) -> Result<Self> {
        if observations.is_empty() {
            return Err(FitError::InvalidInput(
                "a curve dataset must contain at least one observation".to_string(),
            ));
        }
        Ok(Self { observations })
    }

    /// The number of observations in the curve.
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Whether the dataset is empty. Always false for a constructed dataset.
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// The observations in measurement order.
    pub fn observations(&self) -> &[CurveObservation] {
        &self.observations
    }

    /// The Ci values as an array, in measurement order.
    pub fn ci_values(&self) -> Array1<f64> {
        Array1::from_iter(self.observations.iter().map(|o| o.ci))
    }

    /// The assimilation values as an array, in measurement order.
    pub fn assimilation_values(&self) -> Array1<f64> {
        Array1::from_iter(self.observations.iter().map(|o| o.assimilation))
    }

    /// Mean of the measured leaf temperatures, or `None` if no observation
    /// carries one.
    pub fn mean_tleaf(&self) -> Option<f64> {
        let temps: Vec<f64> = self.observations.iter().filter_map(|o| o.tleaf).collect();
        if temps.is_empty() {
            None
        } else {
            Some(temps.iter().sum::<f64>() / temps.len() as f64)
        }
    }

    /// Mean of the measured photon flux densities, or `None` if no
    /// observation carries one.
    pub fn mean_ppfd(&self) -> Option<f64> {
        let vals: Vec<f64> = self.observations.iter().filter_map(|o| o.ppfd).collect();
        if vals.is_empty() {
            None
        } else {
            Some(vals.iter().sum::<f64>() / vals.len() as f64)
        }
    }
}

/// A tabular batch dataset: one `CurveObservation` per row plus named extra
/// columns holding group keys and id fields.
///
/// Column lookup is by name and fails with `FitError::FieldNotFound` rather
/// than silently returning missing data. A column may additionally declare
/// its category levels, which lets the grouping partition retain a category
/// with zero rows (surfaced as `EmptyGroup` at batch-fit time).
#[derive(Debug, Clone, Default)]
pub struct GasExchangeTable {
    observations: Vec<CurveObservation>,
    columns: Vec<(String, Vec<FieldValue>)>,
    levels: HashMap<String, Vec<FieldValue>>,
}

impl GasExchangeTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of rows in the table.
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// The per-row observations.
    pub fn observations(&self) -> &[CurveObservation] {
        &self.observations
    }

    /// Append a row.
    ///
    /// The first row defines the table's extra-column schema; every later
    /// row must supply a value for exactly the same set of field names.
    ///
    /// # Errors
    ///
    /// Returns `FitError::FieldNotFound` if a later row omits an existing
    /// column, or `FitError::InvalidInput` if it introduces a new one.
    pub fn push_row(
        &mut self,
        observation: CurveObservation,
        fields: &[(&str, FieldValue)],
    ) -> Result<()> {
        if self.observations.is_empty() {
            for (name, value) in fields {
                self.columns.push((name.to_string(), vec![value.clone()]));
            }
        } else {
            if fields.len() != self.columns.len() {
                return Err(FitError::InvalidInput(format!(
                    "row supplies {} field(s), table has {} column(s)",
                    fields.len(),
                    self.columns.len()
                )));
            }
            for (name, values) in &mut self.columns {
                let value = fields
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| FitError::FieldNotFound(name.clone()))?;
                values.push(value);
            }
        }
        self.observations.push(observation);
        Ok(())
    }

    /// Whether the table has a column with the given name.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|(n, _)| n == name)
    }

    /// Look up a column by name.
    ///
    /// # Errors
    ///
    /// Returns `FitError::FieldNotFound` if no such column exists.
    pub fn column(&self, name: &str) -> Result<&[FieldValue]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, values)| values.as_slice())
            .ok_or_else(|| FitError::FieldNotFound(name.to_string()))
    }

    /// Declare the category levels of a column.
    ///
    /// A declared level with no matching rows is retained by the grouping
    /// partition and rejected as `EmptyGroup` when the batch fit validates
    /// its input.
    ///
    /// # Errors
    ///
    /// Returns `FitError::FieldNotFound` if the column does not exist.
    pub fn declare_levels(&mut self, name: &str, levels: Vec<FieldValue>) -> Result<()> {
        if !self.has_column(name) {
            return Err(FitError::FieldNotFound(name.to_string()));
        }
        self.levels.insert(name.to_string(), levels);
        Ok(())
    }

    /// The declared category levels of a column, if any.
    pub fn declared_levels(&self, name: &str) -> Option<&[FieldValue]> {
        self.levels.get(name).map(|v| v.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_dataset_rejects_empty() {
        let result = CurveDataset::new(vec![]);
        assert!(matches!(result, Err(FitError::InvalidInput(_))));
    }

    #[test]
    fn test_dataset_accessors() {
        let data = CurveDataset::new(vec![
            CurveObservation::new(100.0, 5.0).with_tleaf(24.0).with_ppfd(1400.0),
            CurveObservation::new(300.0, 15.0).with_tleaf(26.0).with_ppfd(1600.0),
        ])
        .unwrap();

        assert_eq!(data.len(), 2);
        assert_eq!(data.ci_values().to_vec(), vec![100.0, 300.0]);
        assert_eq!(data.assimilation_values().to_vec(), vec![5.0, 15.0]);
        assert_relative_eq!(data.mean_tleaf().unwrap(), 25.0);
        assert_relative_eq!(data.mean_ppfd().unwrap(), 1500.0);
    }

    #[test]
    fn test_dataset_means_absent() {
        let data = CurveDataset::new(vec![CurveObservation::new(100.0, 5.0)]).unwrap();
        assert!(data.mean_tleaf().is_none());
        assert!(data.mean_ppfd().is_none());
    }

    #[test]
    fn test_table_column_lookup() {
        let mut table = GasExchangeTable::new();
        table
            .push_row(
                CurveObservation::new(100.0, 5.0),
                &[("leaf", "leaf1".into()), ("plot", FieldValue::number(3.0))],
            )
            .unwrap();
        table
            .push_row(
                CurveObservation::new(400.0, 18.0),
                &[("leaf", "leaf1".into()), ("plot", FieldValue::number(3.0))],
            )
            .unwrap();

        let leaves = table.column("leaf").unwrap();
        assert_eq!(leaves, &[FieldValue::text("leaf1"), FieldValue::text("leaf1")]);

        let missing = table.column("species");
        assert!(matches!(missing, Err(FitError::FieldNotFound(_))));
    }

    #[test]
    fn test_table_schema_mismatch() {
        let mut table = GasExchangeTable::new();
        table
            .push_row(CurveObservation::new(100.0, 5.0), &[("leaf", "a".into())])
            .unwrap();

        let wrong_name = table.push_row(
            CurveObservation::new(200.0, 9.0),
            &[("tree", "b".into())],
        );
        assert!(wrong_name.is_err());

        let wrong_count = table.push_row(CurveObservation::new(200.0, 9.0), &[]);
        assert!(wrong_count.is_err());
    }

    #[test]
    fn test_declare_levels() {
        let mut table = GasExchangeTable::new();
        table
            .push_row(CurveObservation::new(100.0, 5.0), &[("leaf", "a".into())])
            .unwrap();

        table
            .declare_levels("leaf", vec!["a".into(), "b".into()])
            .unwrap();
        assert_eq!(table.declared_levels("leaf").unwrap().len(), 2);

        let missing = table.declare_levels("species", vec!["x".into()]);
        assert!(matches!(missing, Err(FitError::FieldNotFound(_))));
    }
}
