//! End-to-end tests of the single-curve nonlinear fit: parameter recovery
//! on synthetic FvCB data with small measurement noise.

use aci_fit::{CurveDataset, CurveFitter, CurveObservation, FitMethod, FitParameters, FvcbModel};
use approx::assert_relative_eq;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

/// Evaluate the model on a Ci grid and add zero-mean Gaussian noise.
fn noisy_curve(
    model: &FvcbModel,
    params: &FitParameters,
    cis: &[f64],
    sigma: f64,
    seed: u64,
) -> CurveDataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let noise = Normal::new(0.0, sigma).unwrap();

    CurveDataset::new(
        cis.iter()
            .map(|&ci| {
                let a = model.assimilation(ci, None, None, params) + noise.sample(&mut rng);
                CurveObservation::new(ci, a)
            })
            .collect(),
    )
    .unwrap()
}

const CI_GRID: [f64; 12] = [
    40.0, 75.0, 120.0, 180.0, 250.0, 350.0, 500.0, 700.0, 900.0, 1200.0, 1500.0, 1800.0,
];

#[test]
fn recovers_known_parameters_with_small_noise() {
    let fitter = CurveFitter::new();
    let truth = FitParameters::new(60.0, 120.0, 1.5);
    let data = noisy_curve(fitter.model(), &truth, &CI_GRID, 0.05, 42);

    let fit = fitter.fit_one(&data, FitMethod::Nonlinear).unwrap();

    assert_eq!(fit.method, FitMethod::Nonlinear);
    assert_relative_eq!(fit.parameters.vcmax, truth.vcmax, max_relative = 0.05);
    assert_relative_eq!(fit.parameters.jmax, truth.jmax, max_relative = 0.05);
    assert!(
        (fit.parameters.rd - truth.rd).abs() < 0.5,
        "Rd = {}",
        fit.parameters.rd
    );
    assert!(fit.rmse < 0.2);
}

#[test]
fn recovers_parameters_across_seeds() {
    let fitter = CurveFitter::new();
    let truth = FitParameters::new(85.0, 150.0, 2.0);

    for seed in [1, 7, 2024] {
        let data = noisy_curve(fitter.model(), &truth, &CI_GRID, 0.05, seed);
        let fit = fitter.fit_one(&data, FitMethod::Nonlinear).unwrap();
        assert_relative_eq!(fit.parameters.vcmax, truth.vcmax, max_relative = 0.05);
        assert_relative_eq!(fit.parameters.jmax, truth.jmax, max_relative = 0.05);
    }
}

#[test]
fn recovery_with_measured_temperature_and_light() {
    let fitter = CurveFitter::new();
    let truth = FitParameters::new(70.0, 140.0, 1.2);
    let model = fitter.model().clone();

    let data = CurveDataset::new(
        CI_GRID
            .iter()
            .map(|&ci| {
                let a = model.assimilation(ci, Some(28.0), Some(1100.0), &truth);
                CurveObservation::new(ci, a).with_tleaf(28.0).with_ppfd(1100.0)
            })
            .collect(),
    )
    .unwrap();

    let fit = fitter.fit_one(&data, FitMethod::Nonlinear).unwrap();
    assert_relative_eq!(fit.parameters.vcmax, truth.vcmax, max_relative = 0.02);
    assert_relative_eq!(fit.parameters.jmax, truth.jmax, max_relative = 0.02);
    assert!(fit.rmse < 0.05);
}

#[test]
fn residuals_and_predictions_are_consistent() {
    let fitter = CurveFitter::new();
    let truth = FitParameters::new(60.0, 120.0, 1.5);
    let data = noisy_curve(fitter.model(), &truth, &CI_GRID, 0.1, 3);

    let fit = fitter.fit_one(&data, FitMethod::Nonlinear).unwrap();

    assert_eq!(fit.predicted.len(), data.len());
    assert_eq!(fit.residuals.len(), data.len());
    for (i, obs) in data.observations().iter().enumerate() {
        assert_relative_eq!(
            fit.residuals[i],
            obs.assimilation - fit.predicted[i],
            epsilon = 1e-10
        );
    }

    let rmse = (fit.residuals.iter().map(|r| r * r).sum::<f64>() / data.len() as f64).sqrt();
    assert_relative_eq!(fit.rmse, rmse, epsilon = 1e-12);
}

#[test]
fn bilinear_is_total_on_pathological_input() {
    let fitter = CurveFitter::new();

    let pathological: [&[(f64, f64)]; 3] = [
        &[(250.0, 9.0), (600.0, 18.0)],
        &[(400.0, 10.0), (400.0, 12.0), (400.0, 11.0)],
        &[(30.0, -2.0), (35.0, -1.9), (40.0, -1.8)],
    ];

    for points in pathological {
        let data = CurveDataset::new(
            points
                .iter()
                .map(|&(ci, a)| CurveObservation::new(ci, a))
                .collect(),
        )
        .unwrap();

        let fit = fitter.fit_one(&data, FitMethod::Bilinear).unwrap();
        assert_eq!(fit.method, FitMethod::Bilinear);
        assert!(fit.parameters.is_finite());
        assert!(fit.parameters.vcmax >= 0.0);
        assert!(fit.parameters.jmax >= 0.0);
        assert!(fit.parameters.rd >= 0.0);
    }
}
