//! Baseline forecasting model.
//!
//! Ordinary least squares with an intercept, fitted on a chronological
//! training prefix and evaluated on the remaining suffix. The design matrix
//! is solved by SVD so that rank-deficient inputs (a constant series, a
//! calendar feature that never varies) still yield the minimum-norm fit
//! instead of failing.

use crate::constants::SOLVER_TOLERANCES;
use crate::error::{ForecastError, Result};
use crate::features::{FeatureMatrix, FeatureSchema};
use crate::models::{EvaluationMetrics, PredictionRecord};
use nalgebra::{DMatrix, DVector};
use tracing::{debug, info};

/// Split rows into a training prefix and a test suffix without reordering.
///
/// The training prefix holds `floor(train_fraction * n)` rows, clamped so
/// that both parts keep at least one row.
pub fn chronological_split(
    matrix: &FeatureMatrix,
    train_fraction: f64,
) -> Result<(FeatureMatrix, FeatureMatrix)> {
    if !(train_fraction > 0.0 && train_fraction < 1.0) {
        return Err(ForecastError::configuration(format!(
            "train_fraction must be in (0, 1), got {}",
            train_fraction
        )));
    }

    let n = matrix.len();
    if n < 2 {
        return Err(ForecastError::InsufficientData {
            needed: 1,
            available: n,
        });
    }

    // the epsilon absorbs representation error such as 0.7 * 10 = 6.999...
    let train_rows = ((train_fraction * n as f64) + 1e-9).floor() as usize;
    let train_rows = train_rows.clamp(1, n - 1);
    debug!("Chronological split: {} train, {} test", train_rows, n - train_rows);

    Ok((matrix.slice(0..train_rows), matrix.slice(train_rows..n)))
}

/// Fitted linear model, frozen after fitting
#[derive(Debug, Clone, PartialEq)]
pub struct LinearModel {
    schema: FeatureSchema,
    intercept: f64,
    coefficients: Vec<f64>,
}

impl LinearModel {
    /// Fit by least squares on every row with a known target
    pub fn fit(train: &FeatureMatrix) -> Result<Self> {
        let rows: Vec<(&[f64], f64)> = train
            .vectors()
            .iter()
            .zip(train.targets())
            .filter_map(|(v, t)| t.map(|t| (v.values.as_slice(), t)))
            .collect();

        if rows.is_empty() {
            return Err(ForecastError::NoTrainingTargets { rows: train.len() });
        }
        check_finite(train)?;

        let width = train.schema().len() + 1;
        let x = DMatrix::from_fn(rows.len(), width, |r, c| {
            if c == 0 { 1.0 } else { rows[r].0[c - 1] }
        });
        let y = DVector::from_iterator(rows.len(), rows.iter().map(|(_, t)| *t));

        let beta = solve_least_squares(&x, &y).ok_or_else(|| ForecastError::Solver {
            message: format!(
                "design matrix of {} rows x {} columns is too ill-conditioned",
                rows.len(),
                width
            ),
        })?;

        let model = Self {
            schema: train.schema().clone(),
            intercept: beta[0],
            coefficients: beta.iter().skip(1).copied().collect(),
        };
        info!(
            "Fitted linear model on {} rows with {} features",
            rows.len(),
            model.coefficients.len()
        );
        debug!("Intercept {:.6}, coefficients {:?}", model.intercept, model.coefficients);
        Ok(model)
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Coefficient per feature name, in schema order
    pub fn named_coefficients(&self) -> Vec<(&str, f64)> {
        self.schema
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.coefficients.iter().copied())
            .collect()
    }

    /// Predict every row of `features`.
    ///
    /// Features are matched by name, so the presented schema may order them
    /// differently or carry extra columns; a missing feature is an error.
    pub fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        let positions = self
            .schema
            .names()
            .iter()
            .map(|name| {
                features
                    .schema()
                    .index_of(name)
                    .ok_or_else(|| ForecastError::SchemaMismatch {
                        missing: name.clone(),
                        expected: self.schema.names().to_vec(),
                    })
            })
            .collect::<Result<Vec<usize>>>()?;

        Ok(features
            .vectors()
            .iter()
            .map(|vector| {
                positions
                    .iter()
                    .zip(&self.coefficients)
                    .fold(self.intercept, |acc, (&p, &c)| acc + c * vector.values[p])
            })
            .collect())
    }

    /// Predict `features` and pair each prediction with its actual value
    pub fn prediction_records(&self, features: &FeatureMatrix) -> Result<Vec<PredictionRecord>> {
        let predicted = self.predict(features)?;
        Ok(features
            .vectors()
            .iter()
            .zip(features.targets())
            .zip(predicted)
            .map(|((vector, actual), predicted)| {
                PredictionRecord::new(vector.timestamp, *actual, predicted)
            })
            .collect())
    }
}

/// Reject NaN or infinite features and targets; the SVD does not converge on them
fn check_finite(train: &FeatureMatrix) -> Result<()> {
    for (vector, target) in train.vectors().iter().zip(train.targets()) {
        if let Some(position) = vector.values.iter().position(|v| !v.is_finite()) {
            return Err(ForecastError::NonFiniteValue {
                column: train.schema().names()[position].clone(),
                timestamp: vector.timestamp.to_string(),
            });
        }
        if target.is_some_and(|t| !t.is_finite()) {
            return Err(ForecastError::NonFiniteValue {
                column: "target".to_string(),
                timestamp: vector.timestamp.to_string(),
            });
        }
    }
    Ok(())
}

/// Solve a least squares problem using SVD.
///
/// Singular values below `tol` times the largest one are treated as zero.
/// Returns `None` if the system is too ill-conditioned to solve robustly.
fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);
    let largest = svd.singular_values.max();

    for &tol in SOLVER_TOLERANCES {
        if let Ok(beta) = svd.solve(y, tol * largest) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// MAE, RMSE and R² over predictions with a known actual
pub fn evaluate(predictions: &[PredictionRecord], train_rows: usize) -> EvaluationMetrics {
    let pairs: Vec<(f64, f64)> = predictions
        .iter()
        .filter_map(|p| p.actual.map(|a| (a, p.predicted)))
        .collect();
    let n = pairs.len() as f64;

    if pairs.is_empty() {
        return EvaluationMetrics {
            mae: f64::NAN,
            rmse: f64::NAN,
            r_squared: f64::NAN,
            train_rows,
            test_rows: 0,
        };
    }

    let mae = pairs.iter().map(|(a, p)| (a - p).abs()).sum::<f64>() / n;
    let sse = pairs.iter().map(|(a, p)| (a - p).powi(2)).sum::<f64>();
    let rmse = (sse / n).sqrt();

    let mean_actual = pairs.iter().map(|(a, _)| a).sum::<f64>() / n;
    let sst = pairs
        .iter()
        .map(|(a, _)| (a - mean_actual).powi(2))
        .sum::<f64>();
    // R² is undefined for a constant test set; report a perfect fit as 1
    let r_squared = if sst > 0.0 {
        1.0 - sse / sst
    } else if sse == 0.0 {
        1.0
    } else {
        f64::NAN
    };

    EvaluationMetrics {
        mae,
        rmse,
        r_squared,
        train_rows,
        test_rows: pairs.len(),
    }
}

/// A fitted model with its test-suffix predictions and scores
#[derive(Debug, Clone)]
pub struct ModelRun {
    pub model: LinearModel,
    pub predictions: Vec<PredictionRecord>,
    pub metrics: EvaluationMetrics,
}

/// Split, fit on the prefix, predict and score the suffix
pub fn fit_and_evaluate(matrix: &FeatureMatrix, train_fraction: f64) -> Result<ModelRun> {
    let (train, test) = chronological_split(matrix, train_fraction)?;
    let model = LinearModel::fit(&train)?;
    let predictions = model.prediction_records(&test)?;
    let metrics = evaluate(&predictions, train.len());

    info!(
        "Test set of {} rows: MAE {:.4}, RMSE {:.4}, R² {:.4}",
        metrics.test_rows, metrics.mae, metrics.rmse, metrics.r_squared
    );
    Ok(ModelRun {
        model,
        predictions,
        metrics,
    })
}
