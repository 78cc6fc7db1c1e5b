//! Multinomial logistic regression trained with full-batch gradient descent.

use serde::{Deserialize, Serialize};

/// Optimiser settings for [`SoftmaxRegression::fit`].
#[derive(Debug, Clone, Copy)]
pub struct TrainParams {
    /// Inverse L2 strength, as in `C` of the usual formulation.
    pub inverse_regularization: f64,
    pub max_iter: usize,
    pub learning_rate: f64,
    pub tolerance: f64,
}

/// Fitted weights: one row per class over the feature columns, plus bias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftmaxRegression {
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
}

/// Outcome of a fit, reported for logging.
#[derive(Debug, Clone, Copy)]
pub struct FitReport {
    pub iterations: usize,
    pub converged: bool,
}

impl SoftmaxRegression {
    /// Fit on dense rows `x` with class indices `y` in `0..n_classes`.
    ///
    /// Minimises mean cross-entropy plus `||W||² / (2·C·n)`; the bias is not
    /// penalised.
    pub fn fit(
        x: &[Vec<f64>],
        y: &[usize],
        n_classes: usize,
        params: TrainParams,
    ) -> (Self, FitReport) {
        let n_features = x.first().map_or(0, Vec::len);
        let n = x.len().max(1) as f64;
        let penalty = 1.0 / (params.inverse_regularization * n);
        // Rows are unit length, so the loss curvature is bounded by 1 + penalty.
        let step = params.learning_rate / (1.0 + penalty);

        let mut model = Self {
            weights: vec![vec![0.0; n_features]; n_classes],
            bias: vec![0.0; n_classes],
        };
        let mut grad_w = vec![vec![0.0; n_features]; n_classes];
        let mut grad_b = vec![0.0; n_classes];

        let mut report = FitReport {
            iterations: 0,
            converged: false,
        };

        for iter in 0..params.max_iter {
            for (row, w) in grad_w.iter_mut().zip(&model.weights) {
                for (g, wj) in row.iter_mut().zip(w) {
                    *g = wj * penalty;
                }
            }
            grad_b.iter_mut().for_each(|g| *g = 0.0);

            for (xi, &yi) in x.iter().zip(y) {
                let probs = model.probabilities(xi);
                for (k, p) in probs.iter().enumerate() {
                    let delta = (p - if k == yi { 1.0 } else { 0.0 }) / n;
                    grad_b[k] += delta;
                    if delta != 0.0 {
                        for (g, xj) in grad_w[k].iter_mut().zip(xi) {
                            *g += delta * xj;
                        }
                    }
                }
            }

            let max_grad = grad_w
                .iter()
                .flatten()
                .chain(grad_b.iter())
                .fold(0.0_f64, |acc, g| acc.max(g.abs()));

            for (w, g) in model.weights.iter_mut().zip(&grad_w) {
                for (wj, gj) in w.iter_mut().zip(g) {
                    *wj -= step * gj;
                }
            }
            for (b, g) in model.bias.iter_mut().zip(&grad_b) {
                *b -= step * g;
            }

            report.iterations = iter + 1;
            if max_grad < params.tolerance {
                report.converged = true;
                break;
            }
        }

        (model, report)
    }

    pub fn n_classes(&self) -> usize {
        self.bias.len()
    }

    pub(crate) fn check_shape(
        &self,
        n_classes: usize,
        n_features: usize,
    ) -> std::result::Result<(), String> {
        if self.bias.len() != n_classes || self.weights.len() != n_classes {
            return Err(format!(
                "model has {} weight rows and {} biases for {n_classes} labels",
                self.weights.len(),
                self.bias.len()
            ));
        }
        if let Some(row) = self.weights.iter().find(|row| row.len() != n_features) {
            return Err(format!(
                "weight row has {} columns, vectorizer produces {n_features}",
                row.len()
            ));
        }
        if self
            .weights
            .iter()
            .flatten()
            .chain(&self.bias)
            .any(|v| !v.is_finite())
        {
            return Err("model contains non-finite weights".into());
        }
        Ok(())
    }

    /// Class probabilities; always sums to 1 and each entry is in `[0, 1]`.
    pub fn probabilities(&self, x: &[f64]) -> Vec<f64> {
        let logits: Vec<f64> = self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(w, b)| w.iter().zip(x).map(|(wj, xj)| wj * xj).sum::<f64>() + b)
            .collect();
        softmax(&logits)
    }
}

fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|z| (z - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.iter().map(|e| (e / sum).clamp(0.0, 1.0)).collect()
}

/// Index of the largest probability; ties go to the lowest index.
pub(crate) fn argmax(probs: &[f64]) -> Option<usize> {
    probs
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &p)| match best {
            Some((_, bp)) if bp >= p => best,
            _ => Some((i, p)),
        })
        .map(|(i, _)| i)
}
