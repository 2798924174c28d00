use std::fmt;

use serde::Serialize;

use crate::model::{Fit, Residuals};

const RULE: &str = "--------------------------------------------------";

/// What the coordinator prints at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub points: usize,
    pub workers: usize,
    pub fit: Fit,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub residuals: Option<Residuals>,
}

impl Report {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Result (worker 0):")?;
        writeln!(f, "  n = {}, workers = {}", self.points, self.workers)?;
        writeln!(f)?;

        match &self.fit {
            Fit::Defined(model) => {
                writeln!(f, "  Slope (m) = {:12.6}", model.slope)?;
                writeln!(f, "  Intercept (b) = {:12.6}", model.intercept)?;
            }
            Fit::Undefined { denominator } => {
                writeln!(
                    f,
                    "  Model undefined: every x is identical (denominator {denominator:e})"
                )?;
            }
        }

        let Some(residuals) = &self.residuals else {
            return Ok(());
        };

        writeln!(f)?;
        writeln!(f, "   Original (x,y)        Estimate       Residual")?;
        writeln!(f, "{RULE}")?;
        for row in &residuals.rows {
            writeln!(
                f,
                "   ({:8.4}, {:8.4})    {:12.6}   {:12.6}",
                row.x, row.y, row.estimate, row.residual
            )?;
        }
        writeln!(f, "{RULE}")?;
        writeln!(f, "Residual sum of squares = {:12.6}", residuals.sum_of_squares)
    }
}
