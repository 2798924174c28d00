use serde::Serialize;

use crate::{Dataset, PartialSums, RegressionErr, Result};

/// A fitted line `y = slope·x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Model {
    pub slope: f64,
    pub intercept: f64,
}

impl Model {
    /// Solves the normal equations from the grand totals of `n` points.
    ///
    /// # Errors
    /// `DegenerateModel` when the denominator `Σx·Σx − n·Σx²` vanishes up to
    /// rounding, which happens when every `x` is the same value, or when the
    /// result is not finite.
    ///
    /// Rounding is bounded by `n·ε·max(|Σx·Σx|, |n·Σx²|)`, the worst case
    /// error of summing `n` terms. Data whose variance of `x` relative to the
    /// squared mean is below `n·ε` cannot be told apart from a constant `x`
    /// and is reported as degenerate too, e.g. `10⁴` points alternating
    /// between `10⁴` and `10⁴ + 0.01`. Centering `x` before fitting avoids it.
    pub fn solve(totals: &PartialSums, n: usize) -> Result<Self> {
        let n_f = n as f64;
        let PartialSums {
            sum_x,
            sum_y,
            sum_xy,
            sum_xx,
        } = *totals;

        let lhs = sum_x * sum_x;
        let rhs = n_f * sum_xx;
        let denominator = lhs - rhs;

        // Cancellation leaves an error proportional to the operands' size.
        let tolerance = n_f.max(1.0) * f64::EPSILON * lhs.abs().max(rhs.abs());
        if n == 0 || denominator.abs() <= tolerance {
            return Err(RegressionErr::DegenerateModel { denominator });
        }

        let slope = (sum_x * sum_y - n_f * sum_xy) / denominator;
        let intercept = (sum_y - slope * sum_x) / n_f;

        if !slope.is_finite() || !intercept.is_finite() {
            return Err(RegressionErr::DegenerateModel { denominator });
        }

        Ok(Self { slope, intercept })
    }

    #[inline]
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    /// Evaluates the model against every point of `dataset`.
    pub fn residuals(&self, dataset: &Dataset) -> Residuals {
        let rows: Vec<_> = dataset
            .points()
            .map(|(x, y)| {
                let estimate = self.predict(x);
                ResidualRow {
                    x,
                    y,
                    estimate,
                    residual: y - estimate,
                }
            })
            .collect();

        let sum_of_squares = rows.iter().map(|r| r.residual * r.residual).sum();

        Residuals {
            rows,
            sum_of_squares,
        }
    }
}

/// Outcome of solving: either a model or the reason there is none.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum Fit {
    Defined(Model),
    Undefined { denominator: f64 },
}

impl Fit {
    pub fn model(&self) -> Option<&Model> {
        match self {
            Fit::Defined(model) => Some(model),
            Fit::Undefined { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResidualRow {
    pub x: f64,
    pub y: f64,
    pub estimate: f64,
    pub residual: f64,
}

/// Per-point residuals and their sum of squares.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Residuals {
    pub rows: Vec<ResidualRow>,
    pub sum_of_squares: f64,
}
