use std::path::{Path, PathBuf};

use crate::{RegressionErr, Result, partition::Partition};

/// An ordered, non-empty set of `(x, y)` points stored column-wise.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl Dataset {
    /// Builds a dataset from point pairs.
    ///
    /// # Errors
    /// `MalformedDataset` if `points` is empty.
    pub fn from_points<I>(points: I) -> Result<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let (x, y): (Vec<f64>, Vec<f64>) = points.into_iter().unzip();
        if x.is_empty() {
            return Err(RegressionErr::MalformedDataset(
                "a dataset needs at least one point".into(),
            ));
        }

        Ok(Self { x, y })
    }

    /// Parses the textual dataset format.
    ///
    /// The first whitespace separated token is the amount of points `n > 0`,
    /// followed by `n` pairs of `x y` values. Anything after the last pair is
    /// ignored.
    pub fn parse(text: &str) -> Result<Self> {
        let mut tokens = text.split_ascii_whitespace();

        let header = tokens
            .next()
            .ok_or_else(|| RegressionErr::MalformedDataset("missing the amount of points".into()))?;
        let n: usize = header.parse().map_err(|_| {
            RegressionErr::MalformedDataset(format!("invalid amount of points {header:?}"))
        })?;
        if n == 0 {
            return Err(RegressionErr::MalformedDataset(
                "the amount of points must be greater than 0".into(),
            ));
        }

        // Every point takes at least 4 bytes of text, the header may lie.
        let capacity = n.min(text.len() / 4);
        let mut x = Vec::with_capacity(capacity);
        let mut y = Vec::with_capacity(capacity);

        for i in 0..n {
            x.push(coordinate(tokens.next(), i, "x")?);
            y.push(coordinate(tokens.next(), i, "y")?);
        }

        Ok(Self { x, y })
    }

    /// Reads and parses a dataset file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::parse(&text)
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Always false, kept for parity with `len`.
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    /// The `x` and `y` columns of `part`.
    pub fn columns(&self, part: Partition) -> (&[f64], &[f64]) {
        let range = part.range();
        (&self.x[range.clone()], &self.y[range])
    }

    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.x.iter().copied().zip(self.y.iter().copied())
    }
}

fn coordinate(token: Option<&str>, index: usize, axis: &str) -> Result<f64> {
    let token = token.ok_or_else(|| {
        RegressionErr::MalformedDataset(format!("point {index} is missing its {axis} value"))
    })?;

    token.parse().map_err(|_| {
        let msg = format!("point {index} has an invalid {axis} value {token:?}");
        RegressionErr::MalformedDataset(msg)
    })
}

/// Where the coordinator gets the dataset from.
#[derive(Debug, Clone)]
pub enum DatasetSource {
    File(PathBuf),
    Inline(Dataset),
}

impl DatasetSource {
    /// Produces a fresh copy of the dataset, re-reading files every time.
    pub async fn load(&self) -> Result<Dataset> {
        match self {
            DatasetSource::File(path) => Dataset::load(path).await,
            DatasetSource::Inline(dataset) => Ok(dataset.clone()),
        }
    }
}
