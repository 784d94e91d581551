//! Batch fitting of many curves grouped by a table column.
//!
//! `BatchFitter` partitions a `GasExchangeTable` by a named grouping field,
//! fits every group with the requested method, and automatically re-fits
//! the groups whose nonlinear fit failed using the bilinear fallback, which
//! cannot fail. Structural problems with the request (unknown grouping
//! field, a declared category with zero rows) abort the whole batch before
//! any fitting starts; per-curve numerical failures never do.

use crate::data::{CurveDataset, FieldValue, GasExchangeTable};
use crate::error::{FitError, Result};
use crate::fit::{CurveFit, CurveFitter, FitMethod};
use crate::params::FitParameters;
use rayon::prelude::*;
use serde::Serialize;

/// Progress sink for the first fitting pass: one tick per group.
///
/// The core never owns any UI state; a caller wanting a progress bar
/// implements this trait and renders the ticks itself.
pub trait ProgressSink {
    /// Called after each group of the first pass, with the number of groups
    /// fitted so far and the total group count.
    fn tick(&mut self, current: usize, total: usize);
}

/// A sink that discards all progress ticks.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn tick(&mut self, _current: usize, _total: usize) {}
}

/// The fit of one group, with the id-field values recorded for it.
#[derive(Debug, Clone)]
pub struct GroupFit {
    /// The group key.
    pub group: FieldValue,

    /// The successful fit for this group.
    pub fit: CurveFit,

    /// Requested id fields, read from the group's first observation.
    ///
    /// Id fields are assumed constant within a curve; if one is not, only
    /// the first row's value is recorded.
    pub ids: Vec<(String, FieldValue)>,
}

/// One row of the batch coefficients table.
#[derive(Debug, Clone, Serialize)]
pub struct CoefficientRow {
    /// The group key.
    pub group: FieldValue,

    /// Fitted capacity parameters.
    #[serde(flatten)]
    pub parameters: FitParameters,

    /// Root-mean-square error of the fit.
    pub rmse: f64,

    /// The method that produced the fit.
    pub method: FitMethod,

    /// Requested id fields for this group.
    pub ids: Vec<(String, FieldValue)>,
}

/// The ordered results of a batch fit.
///
/// Iteration order is the first-appearance order of the group keys in the
/// input table; every group present in the (validated) input has an entry.
#[derive(Debug, Clone)]
pub struct GroupedFitCollection {
    group_field: String,
    groups: Vec<GroupFit>,
    refit_groups: Vec<FieldValue>,
}

impl GroupedFitCollection {
    /// The name of the grouping field, for downstream attribution.
    pub fn group_field(&self) -> &str {
        &self.group_field
    }

    /// The number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether the collection holds no groups.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Iterate over the group fits in first-appearance order.
    pub fn iter(&self) -> impl Iterator<Item = &GroupFit> {
        self.groups.iter()
    }

    /// Look up one group's full fit by key.
    pub fn get(&self, group: &FieldValue) -> Option<&GroupFit> {
        self.groups.iter().find(|g| &g.group == group)
    }

    /// The keys of the groups whose nonlinear fit failed and were re-fit
    /// with the bilinear fallback, in first-appearance order.
    pub fn refit_groups(&self) -> &[FieldValue] {
        &self.refit_groups
    }

    /// The coefficients table: one row per group, in iteration order.
    pub fn coefficients(&self) -> Vec<CoefficientRow> {
        self.groups
            .iter()
            .map(|g| CoefficientRow {
                group: g.group.clone(),
                parameters: g.fit.parameters,
                rmse: g.fit.rmse,
                method: g.fit.method,
                ids: g.ids.clone(),
            })
            .collect()
    }

    /// The coefficients table serialized as JSON.
    pub fn coefficients_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.coefficients())?)
    }
}

/// Fits every curve in a table, with automatic bilinear recovery.
#[derive(Debug, Clone, Default)]
pub struct BatchFitter {
    fitter: CurveFitter,
}

impl BatchFitter {
    /// Create a batch fitter with default single-curve settings.
    pub fn new() -> Self {
        Self {
            fitter: CurveFitter::new(),
        }
    }

    /// Use a custom-configured single-curve fitter.
    pub fn with_fitter(mut self, fitter: CurveFitter) -> Self {
        self.fitter = fitter;
        self
    }

    /// Fit every group of `table` sequentially, ticking `progress` once per
    /// group during the first pass.
    ///
    /// Groups whose fit fails with a numerical error are re-fit with the
    /// bilinear method in a second pass (no progress ticks), so every group
    /// in the returned collection carries a successful fit; fallback use is
    /// visible through [`CurveFit::method`] and
    /// [`GroupedFitCollection::refit_groups`].
    ///
    /// # Errors
    ///
    /// * `InvalidGroupKey` - `group_field` is not a column of the table
    /// * `EmptyGroup` - a declared category level has zero rows
    /// * `FieldNotFound` - an id field is not a column of the table
    pub fn fit_all(
        &self,
        table: &GasExchangeTable,
        group_field: &str,
        method: FitMethod,
        id_fields: &[&str],
        progress: &mut dyn ProgressSink,
    ) -> Result<GroupedFitCollection> {
        let partition = self.partition(table, group_field, id_fields)?;
        let total = partition.len();

        let mut outcomes = Vec::with_capacity(total);
        for (index, group) in partition.iter().enumerate() {
            outcomes.push(self.fitter.fit_one(&group.data, method));
            progress.tick(index + 1, total);
        }

        self.recover_and_assemble(group_field, partition, outcomes, method)
    }

    /// Fit every group of `table` with the first pass parallelized over a
    /// rayon thread pool.
    ///
    /// The output key order is the first-appearance order of the input
    /// regardless of completion order, and the bilinear retry remains a
    /// strict second phase after the whole first pass. No per-group
    /// progress is reported.
    pub fn fit_all_parallel(
        &self,
        table: &GasExchangeTable,
        group_field: &str,
        method: FitMethod,
        id_fields: &[&str],
    ) -> Result<GroupedFitCollection> {
        let partition = self.partition(table, group_field, id_fields)?;

        let outcomes: Vec<Result<CurveFit>> = partition
            .par_iter()
            .map(|group| self.fitter.fit_one(&group.data, method))
            .collect();

        self.recover_and_assemble(group_field, partition, outcomes, method)
    }

    /// Validate the request and split the table into per-group datasets in
    /// first-appearance order.
    fn partition(
        &self,
        table: &GasExchangeTable,
        group_field: &str,
        id_fields: &[&str],
    ) -> Result<Vec<PartitionedGroup>> {
        let keys = table
            .column(group_field)
            .map_err(|_| FitError::InvalidGroupKey(group_field.to_string()))?;

        // Id fields must resolve before any fitting begins.
        for field in id_fields {
            table.column(field)?;
        }

        let mut order: Vec<FieldValue> = Vec::new();
        let mut rows_by_group: Vec<Vec<usize>> = Vec::new();
        for (row, key) in keys.iter().enumerate() {
            match order.iter().position(|k| k == key) {
                Some(at) => rows_by_group[at].push(row),
                None => {
                    order.push(key.clone());
                    rows_by_group.push(vec![row]);
                }
            }
        }

        // A declared category with no rows is a structural defect of the
        // request, not a poor-quality curve: abort before fitting anything.
        if let Some(levels) = table.declared_levels(group_field) {
            for level in levels {
                if !order.contains(level) {
                    return Err(FitError::EmptyGroup(level.to_string()));
                }
            }
        }

        if order.is_empty() {
            return Err(FitError::InvalidInput(
                "the dataset contains no observations".to_string(),
            ));
        }

        let observations = table.observations();
        order
            .into_iter()
            .zip(rows_by_group)
            .map(|(group, rows)| {
                let data =
                    CurveDataset::new(rows.iter().map(|&r| observations[r]).collect())?;
                let first_row = rows[0];
                let ids = id_fields
                    .iter()
                    .map(|field| {
                        let value = table.column(field)?[first_row].clone();
                        Ok((field.to_string(), value))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(PartitionedGroup { group, data, ids })
            })
            .collect()
    }

    /// Re-fit the failed groups with the bilinear fallback and assemble the
    /// ordered collection.
    fn recover_and_assemble(
        &self,
        group_field: &str,
        partition: Vec<PartitionedGroup>,
        outcomes: Vec<Result<CurveFit>>,
        method: FitMethod,
    ) -> Result<GroupedFitCollection> {
        let mut refit_groups = Vec::new();
        let mut groups = Vec::with_capacity(partition.len());

        for (group, outcome) in partition.into_iter().zip(outcomes) {
            let fit = match outcome {
                Ok(fit) => fit,
                Err(err) if method == FitMethod::Nonlinear && err.is_recoverable() => {
                    refit_groups.push(group.group.clone());
                    self.fitter.fit_one(&group.data, FitMethod::Bilinear)?
                }
                Err(err) => return Err(err),
            };
            groups.push(GroupFit {
                group: group.group,
                fit,
                ids: group.ids,
            });
        }

        Ok(GroupedFitCollection {
            group_field: group_field.to_string(),
            groups,
            refit_groups,
        })
    }
}

/// One group's slice of the input table, ready to fit.
struct PartitionedGroup {
    group: FieldValue,
    data: CurveDataset,
    ids: Vec<(String, FieldValue)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CurveObservation;
    use crate::fvcb::FvcbModel;

    fn table_with_groups(groups: &[(&str, &[(f64, f64)])]) -> GasExchangeTable {
        let mut table = GasExchangeTable::new();
        for (name, points) in groups {
            for &(ci, a) in *points {
                table
                    .push_row(CurveObservation::new(ci, a), &[("leaf", (*name).into())])
                    .unwrap();
            }
        }
        table
    }

    fn clean_points(model: &FvcbModel, params: &FitParameters) -> Vec<(f64, f64)> {
        [50.0, 100.0, 200.0, 300.0, 500.0, 800.0, 1200.0, 1600.0]
            .iter()
            .map(|&ci| (ci, model.assimilation(ci, None, None, params)))
            .collect()
    }

    #[test]
    fn test_invalid_group_key() {
        let table = table_with_groups(&[("a", &[(100.0, 5.0)])]);
        let result = BatchFitter::new().fit_all(
            &table,
            "species",
            FitMethod::Nonlinear,
            &[],
            &mut NoProgress,
        );
        assert!(matches!(result, Err(FitError::InvalidGroupKey(_))));
    }

    #[test]
    fn test_empty_declared_level() {
        let mut table = table_with_groups(&[("a", &[(100.0, 5.0), (300.0, 12.0)])]);
        table
            .declare_levels("leaf", vec!["a".into(), "ghost".into()])
            .unwrap();

        let result = BatchFitter::new().fit_all(
            &table,
            "leaf",
            FitMethod::Bilinear,
            &[],
            &mut NoProgress,
        );
        assert!(matches!(result, Err(FitError::EmptyGroup(_))));
    }

    #[test]
    fn test_first_appearance_order() {
        let model = FvcbModel::new();
        let params = FitParameters::new(60.0, 120.0, 1.5);
        let points = clean_points(&model, &params);
        let table = table_with_groups(&[
            ("c", &points[..]),
            ("a", &points[..]),
            ("b", &points[..]),
        ]);

        let fits = BatchFitter::new()
            .fit_all(&table, "leaf", FitMethod::Bilinear, &[], &mut NoProgress)
            .unwrap();
        let order: Vec<String> = fits.iter().map(|g| g.group.to_string()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_progress_ticks_once_per_group() {
        struct Recorder(Vec<(usize, usize)>);
        impl ProgressSink for Recorder {
            fn tick(&mut self, current: usize, total: usize) {
                self.0.push((current, total));
            }
        }

        let table = table_with_groups(&[
            ("a", &[(100.0, 4.0), (500.0, 16.0)]),
            ("b", &[(120.0, 5.0), (600.0, 17.0)]),
        ]);

        let mut recorder = Recorder(Vec::new());
        BatchFitter::new()
            .fit_all(&table, "leaf", FitMethod::Bilinear, &[], &mut recorder)
            .unwrap();
        assert_eq!(recorder.0, vec![(1, 2), (2, 2)]);
    }

    #[test]
    fn test_id_fields_from_first_row() {
        let mut table = GasExchangeTable::new();
        for (ci, a, plot) in [(100.0, 4.0, 1.0), (500.0, 16.0, 2.0)] {
            table
                .push_row(
                    CurveObservation::new(ci, a),
                    &[("leaf", "a".into()), ("plot", FieldValue::number(plot))],
                )
                .unwrap();
        }

        let fits = BatchFitter::new()
            .fit_all(&table, "leaf", FitMethod::Bilinear, &["plot"], &mut NoProgress)
            .unwrap();

        // Not curve-constant here; the first row's value wins.
        let entry = fits.get(&"a".into()).unwrap();
        assert_eq!(entry.ids, vec![("plot".to_string(), FieldValue::number(1.0))]);
    }

    #[test]
    fn test_missing_id_field_aborts() {
        let table = table_with_groups(&[("a", &[(100.0, 5.0)])]);
        let result = BatchFitter::new().fit_all(
            &table,
            "leaf",
            FitMethod::Bilinear,
            &["plot"],
            &mut NoProgress,
        );
        assert!(matches!(result, Err(FitError::FieldNotFound(_))));
    }
}
