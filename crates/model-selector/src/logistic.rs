//! L2-Regularized Logistic Regression

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::candidate::{class_weights, ClassWeight};
use crate::SelectionError;

/// Hyperparameters of the linear candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegressionParams {
    /// Iteration cap of the gradient solver
    pub max_iter: usize,
    /// Inverse regularization strength
    pub c: f64,
    /// Stop once every gradient component is below this
    pub tolerance: f64,
    pub class_weight: ClassWeight,
    /// Seed recorded with the preset; the full-batch solver draws no random numbers
    pub seed: u64,
}

impl Default for LogisticRegressionParams {
    fn default() -> Self {
        Self {
            max_iter: 1000,
            c: 1.0,
            tolerance: 1e-4,
            class_weight: ClassWeight::Balanced,
            seed: crate::DEFAULT_SEED,
        }
    }
}

/// Fitted logistic regression over standardized inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    means: Vec<f64>,
    scales: Vec<f64>,
    coefficients: Vec<f64>,
    intercept: f64,
    iterations: usize,
}

impl LogisticRegression {
    /// Fit by gradient descent with Armijo backtracking.
    ///
    /// Columns are standardized first; the objective is the weighted mean
    /// log-loss plus `||w||^2 / (2 * C * sum(weights))`.
    pub fn fit(
        params: &LogisticRegressionParams,
        x: ArrayView2<'_, f64>,
        y: &[bool],
    ) -> Result<Self, SelectionError> {
        if params.c <= 0.0 {
            return Err(SelectionError::InvalidConfig(format!(
                "C must be positive, got {}",
                params.c
            )));
        }

        let means: Vec<f64> = x.mean_axis(Axis(0)).map_or_else(Vec::new, |m| m.to_vec());
        let scales: Vec<f64> = x
            .std_axis(Axis(0), 0.0)
            .iter()
            .map(|&s| if s > 0.0 { s } else { 1.0 })
            .collect();
        let standardized = standardize(x, &means, &scales);

        let (w_neg, w_pos) = class_weights(params.class_weight, y);
        let targets = Array1::from_iter(y.iter().map(|&l| if l { 1.0 } else { 0.0 }));
        let weights = Array1::from_iter(y.iter().map(|&l| if l { w_pos } else { w_neg }));
        let objective = Objective {
            x: standardized.view(),
            targets: targets.view(),
            weights: weights.view(),
            penalty: 1.0 / (params.c * weights.sum()),
        };

        let mut coefficients = Array1::<f64>::zeros(x.ncols());
        let mut intercept = 0.0;
        let mut step = 1.0;
        let mut iterations = 0;

        while iterations < params.max_iter {
            iterations += 1;
            let (loss, grad_w, grad_b) = objective.loss_and_gradient(coefficients.view(), intercept);

            let grad_max = grad_w.iter().fold(grad_b.abs(), |acc, g| acc.max(g.abs()));
            if grad_max < params.tolerance {
                break;
            }

            let grad_sq = grad_w.dot(&grad_w) + grad_b * grad_b;
            let mut accepted = false;
            while step > 1e-12 {
                let candidate_w = &coefficients - &(&grad_w * step);
                let candidate_b = intercept - step * grad_b;
                if objective.loss(candidate_w.view(), candidate_b) <= loss - 0.5 * step * grad_sq {
                    coefficients = candidate_w;
                    intercept = candidate_b;
                    accepted = true;
                    break;
                }
                step *= 0.5;
            }

            if !accepted {
                break;
            }
            step = (step * 2.0).min(1e3);
        }

        debug!("Logistic regression finished after {} iterations", iterations);

        Ok(Self {
            means,
            scales,
            coefficients: coefficients.to_vec(),
            intercept,
            iterations,
        })
    }

    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Positive-class probability per row
    pub fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        let standardized = standardize(x, &self.means, &self.scales);
        let coefficients = ArrayView1::from(&self.coefficients);
        standardized
            .dot(&coefficients)
            .mapv(|z| sigmoid(z + self.intercept))
    }
}

struct Objective<'a> {
    x: ArrayView2<'a, f64>,
    targets: ArrayView1<'a, f64>,
    weights: ArrayView1<'a, f64>,
    penalty: f64,
}

impl Objective<'_> {
    fn loss(&self, w: ArrayView1<'_, f64>, b: f64) -> f64 {
        let z = self.x.dot(&w);
        let data: f64 = z
            .iter()
            .zip(self.targets)
            .zip(self.weights)
            .map(|((&z, &t), &weight)| weight * (softplus(z + b) - t * (z + b)))
            .sum();
        data / self.weights.sum() + 0.5 * self.penalty * w.dot(&w)
    }

    fn loss_and_gradient(&self, w: ArrayView1<'_, f64>, b: f64) -> (f64, Array1<f64>, f64) {
        let total_weight = self.weights.sum();
        let z = self.x.dot(&w) + b;

        let mut loss = 0.0;
        let residual = Array1::from_iter(
            z.iter()
                .zip(self.targets)
                .zip(self.weights)
                .map(|((&z, &t), &weight)| {
                    loss += weight * (softplus(z) - t * z);
                    weight * (sigmoid(z) - t) / total_weight
                }),
        );

        let grad_w = self.x.t().dot(&residual) + &w * self.penalty;
        let grad_b = residual.sum();
        let loss = loss / total_weight + 0.5 * self.penalty * w.dot(&w);
        (loss, grad_w, grad_b)
    }
}

fn standardize(x: ArrayView2<'_, f64>, means: &[f64], scales: &[f64]) -> Array2<f64> {
    let means = ArrayView1::from(means);
    let scales = ArrayView1::from(scales);
    (&x - &means) / &scales
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// ln(1 + e^z) without overflow
fn softplus(z: f64) -> f64 {
    z.max(0.0) + (-z.abs()).exp().ln_1p()
}
