use crate::error::ModelError;
use crate::indicators::mean;
use crate::models::ForecastResult;

/// Below this many prices no model is fitted
pub const MIN_FORECAST_SAMPLES: usize = 30;

/// Confidence reported when there is not enough history to attempt a fit
pub const NO_ATTEMPT_CONFIDENCE: f64 = 0.5;

/// Confidence reported when the model was attempted but failed
pub const FAILED_FIT_CONFIDENCE: f64 = 0.3;

/// One-step-ahead forecast plus an in-sample fit error
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelForecast {
    pub next: f64,
    /// Mean squared in-sample residual
    pub fit_error: f64,
}

/// Stateless-per-call time-series model
pub trait ForecastModel: Send + Sync {
    fn forecast(&self, series: &[f64]) -> Result<ModelForecast, ModelError>;

    fn name(&self) -> &str;
}

/// Autoregressive model of order `p` on first differences
///
/// Fits `d[t] = sum(phi_i * d[t-i])` by least squares with a tiny ridge term
/// (no intercept), then forecasts `x[n] = x[n-1] + d_hat[n]`.
#[derive(Debug, Clone)]
pub struct DifferencedAutoRegressive {
    order: usize,
}

impl DifferencedAutoRegressive {
    pub fn new(order: usize) -> Self {
        Self {
            order: order.max(1),
        }
    }
}

impl Default for DifferencedAutoRegressive {
    fn default() -> Self {
        Self::new(5)
    }
}

impl ForecastModel for DifferencedAutoRegressive {
    fn forecast(&self, series: &[f64]) -> Result<ModelForecast, ModelError> {
        let p = self.order;
        // Need p lags plus at least p+1 equations
        let needed = 2 * p + 2;
        if series.len() < needed {
            return Err(ModelError::InsufficientData {
                got: series.len(),
                needed,
            });
        }
        if series.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::NonFiniteInput);
        }

        let diffs: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();

        // Normal equations: (X'X + lambda*I) phi = X'y
        let mut xtx = vec![vec![0.0; p]; p];
        let mut xty = vec![0.0; p];
        for t in p..diffs.len() {
            for i in 0..p {
                let xi = diffs[t - 1 - i];
                xty[i] += xi * diffs[t];
                for j in 0..p {
                    xtx[i][j] += xi * diffs[t - 1 - j];
                }
            }
        }

        let trace: f64 = (0..p).map(|i| xtx[i][i]).sum();
        let lambda = 1e-6 * trace / p as f64 + 1e-12;
        for (i, row) in xtx.iter_mut().enumerate() {
            row[i] += lambda;
        }

        let phi = solve(xtx, xty)?;

        let predict = |t: usize| -> f64 { (0..p).map(|i| phi[i] * diffs[t - 1 - i]).sum() };

        let residuals: Vec<f64> = (p..diffs.len())
            .map(|t| {
                let err = diffs[t] - predict(t);
                err * err
            })
            .collect();
        let fit_error = residuals.iter().sum::<f64>() / residuals.len() as f64;

        let next_diff = predict(diffs.len());
        let last = series[series.len() - 1];
        let next = last + next_diff;

        if !next.is_finite() || !fit_error.is_finite() {
            return Err(ModelError::NonFiniteOutput);
        }

        Ok(ModelForecast { next, fit_error })
    }

    fn name(&self) -> &str {
        "DifferencedAutoRegressive"
    }
}

/// Gaussian elimination with partial pivoting
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>, ModelError> {
    let n = b.len();
    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&x, &y| a[x][col].abs().total_cmp(&a[y][col].abs()))
            .ok_or(ModelError::Singular)?;
        if a[pivot_row][col].abs() < 1e-300 {
            return Err(ModelError::Singular);
        }
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }

    if x.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::Singular);
    }
    Ok(x)
}

/// Turns price history into a [`ForecastResult`]
///
/// - fewer than 30 prices: `(last_price, 0.5)`, no fit attempted
/// - model failure: `(last_price, 0.3)`
/// - otherwise `confidence = 1 - min(1, fit_error / mean(prices))`, clamped to [0, 1]
pub struct PriceForecaster {
    model: Box<dyn ForecastModel>,
}

impl PriceForecaster {
    pub fn new(model: Box<dyn ForecastModel>) -> Self {
        Self { model }
    }

    /// Returns `None` only for an empty history
    pub fn forecast(&self, prices: &[f64]) -> Option<ForecastResult> {
        let last_price = *prices.last()?;

        if prices.len() < MIN_FORECAST_SAMPLES {
            return Some(ForecastResult {
                predicted_price: last_price,
                confidence: NO_ATTEMPT_CONFIDENCE,
            });
        }

        let fitted = self.model.forecast(prices).and_then(|fit| {
            let avg = mean(prices).ok_or(ModelError::InsufficientData {
                got: 0,
                needed: 1,
            })?;
            let ratio = fit.fit_error / avg;
            if !ratio.is_finite() {
                return Err(ModelError::NonFiniteOutput);
            }
            Ok((fit.next, (1.0 - ratio.min(1.0)).clamp(0.0, 1.0)))
        });

        match fitted {
            Ok((predicted_price, confidence)) => {
                tracing::debug!(
                    model = self.model.name(),
                    predicted_price,
                    confidence,
                    "Price forecast"
                );
                Some(ForecastResult {
                    predicted_price,
                    confidence,
                })
            }
            Err(e) => {
                tracing::warn!(
                    model = self.model.name(),
                    "Price prediction failed, using last price: {}",
                    e
                );
                Some(ForecastResult {
                    predicted_price: last_price,
                    confidence: FAILED_FIT_CONFIDENCE,
                })
            }
        }
    }
}

impl Default for PriceForecaster {
    fn default() -> Self {
        Self::new(Box::new(DifferencedAutoRegressive::default()))
    }
}
