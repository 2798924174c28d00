//! Parallel least-squares regression over a mesh of message passing workers.
//!
//! Worker 0 loads the dataset and ships every worker a balanced contiguous
//! share. Each worker reduces its share to four partial sums, the sums are
//! combined in a binary tree towards worker 0 and worker 0 solves the normal
//! equations.

mod aggregate;
pub mod config;
mod dataset;
pub mod distribute;
mod error;
pub mod model;
pub mod partition;
pub mod reduce;
pub mod report;
mod worker;

use std::num::NonZeroUsize;

use comms::mesh;
use futures::future::join_all;
use log::debug;

pub use aggregate::PartialSums;
pub use dataset::{Dataset, DatasetSource};
pub use error::{Phase, RegressionErr, Result};
pub use model::{Fit, Model};
pub use report::Report;
pub use worker::Worker;

/// Fits a line using `workers` tasks of this process.
///
/// # Args
/// * `source` - Where worker 0 loads the dataset from.
/// * `workers` - The amount of workers.
/// * `residuals` - Whether the report includes the residual table.
///
/// # Returns
/// The report of worker 0.
///
/// # Errors
/// The error that stopped the run. When several workers fail, the one that
/// caused the abort is returned rather than the aborts it triggered.
pub async fn fit_local(
    source: DatasetSource,
    workers: NonZeroUsize,
    residuals: bool,
) -> Result<Report> {
    let endpoints = mesh::local(workers)?;
    let mut source = Some(source);

    let handles: Vec<_> = endpoints
        .into_iter()
        .map(|endpoint| {
            let source = if endpoint.rank() == 0 { source.take() } else { None };
            let worker = Worker::new(endpoint, source).with_residuals(residuals);
            tokio::spawn(worker.run())
        })
        .collect();

    let mut report = None;
    let mut errors = Vec::new();

    for (rank, joined) in join_all(handles).await.into_iter().enumerate() {
        match joined {
            Ok(Ok(Some(r))) => report = Some(r),
            Ok(Ok(None)) => {}
            Ok(Err(e)) => errors.push(e),
            Err(e) => {
                debug!(rank = rank; "worker task failed: {e}");
                errors.push(RegressionErr::WorkerPanicked { rank });
            }
        }
    }

    if !errors.is_empty() {
        let root = errors
            .iter()
            .position(|e| !e.is_peer_abort())
            .unwrap_or(0);
        return Err(errors.swap_remove(root));
    }

    report.ok_or(RegressionErr::MissingReport)
}
