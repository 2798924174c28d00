use comms::Endpoint;
use log::{debug, error, info, warn};

use crate::{
    DatasetSource, RegressionErr, Result,
    distribute::distribute,
    model::{Fit, Model},
    reduce::tree_reduce,
    report::Report,
};

/// One participant of a regression run.
pub struct Worker {
    endpoint: Endpoint,
    source: Option<DatasetSource>,
    residuals: bool,
}

/// What the coordinator knows once the reduction is over.
struct Outcome {
    points: usize,
    fit: Fit,
}

impl Worker {
    /// Creates a new worker.
    ///
    /// # Args
    /// * `endpoint` - This worker's handle on the run, its rank decides the role.
    /// * `source` - Where to load the dataset from, only read by worker 0.
    ///
    /// # Returns
    /// A new worker that also reports residuals.
    pub fn new(endpoint: Endpoint, source: Option<DatasetSource>) -> Self {
        Self {
            endpoint,
            source,
            residuals: true,
        }
    }

    /// Whether the coordinator re-reads the dataset to report residuals.
    pub fn with_residuals(mut self, residuals: bool) -> Self {
        self.residuals = residuals;
        self
    }

    /// Runs every phase of the pipeline on this worker.
    ///
    /// # Returns
    /// The report on worker 0, `None` on every other worker.
    ///
    /// # Errors
    /// The first failure of this worker. The run is aborted on every peer
    /// before returning.
    pub async fn run(self) -> Result<Option<Report>> {
        let Self {
            endpoint,
            source,
            residuals,
        } = self;

        let rank = endpoint.rank();
        let workers = endpoint.size();

        if rank != 0 && source.is_some() {
            debug!(rank = rank; "only the coordinator reads the dataset, ignoring source");
        }

        let outcome = match pipeline(&endpoint, source.as_ref()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let phase = e.phase().map(|p| p.to_string());
                let phase = phase.as_deref().unwrap_or("unknown");

                if e.is_peer_abort() {
                    warn!(rank = rank, phase = phase; "stopped by a peer: {e}");
                } else {
                    error!(rank = rank, phase = phase; "{e}");
                }

                endpoint.abort(&e.to_string()).await;
                return Err(e);
            }
        };

        endpoint.close().await;

        let Some(Outcome { points, fit }) = outcome else {
            info!(rank = rank; "worker finished");
            return Ok(None);
        };

        let residuals = match (&fit, source) {
            (Fit::Defined(model), Some(source)) if residuals => {
                match source.load().await {
                    Ok(dataset) => Some(model.residuals(&dataset)),
                    Err(e) => {
                        warn!(rank = rank; "could not reload the dataset for residuals: {e}");
                        None
                    }
                }
            }
            _ => None,
        };

        info!(rank = rank, points = points, workers = workers; "run finished");

        Ok(Some(Report {
            points,
            workers,
            fit,
            residuals,
        }))
    }
}

async fn pipeline(endpoint: &Endpoint, source: Option<&DatasetSource>) -> Result<Option<Outcome>> {
    let rank = endpoint.rank();

    let dataset = if rank == 0 {
        let source = source.ok_or(RegressionErr::MissingDataset)?;
        let dataset = source.load().await?;
        info!(rank = rank, points = dataset.len(); "dataset loaded");
        Some(dataset)
    } else {
        None
    };

    let slice = distribute(endpoint, dataset).await?;
    let points = slice.total;
    debug!(
        rank = rank,
        count = slice.partition.count,
        offset = slice.partition.offset;
        "slice ready"
    );

    let local = slice.sums();
    drop(slice);
    debug!(rank = rank; "local sums {local:?}");

    let Some(totals) = tree_reduce(endpoint, local).await? else {
        return Ok(None);
    };
    debug!(rank = rank; "global totals {totals:?}");

    let fit = match Model::solve(&totals, points) {
        Ok(model) => Fit::Defined(model),
        Err(RegressionErr::DegenerateModel { denominator }) => {
            warn!(rank = rank; "model undefined, denominator {denominator:e}");
            Fit::Undefined { denominator }
        }
        Err(e) => return Err(e),
    };

    Ok(Some(Outcome { points, fit }))
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use comms::mesh;

    use super::*;
    use crate::Dataset;

    #[tokio::test]
    async fn single_worker_reports_alone() {
        let endpoint = mesh::local(NonZeroUsize::MIN).unwrap().remove(0);
        let dataset = Dataset::from_points([(0.0, 1.0), (1.0, 3.0), (2.0, 5.0)]).unwrap();

        let report = Worker::new(endpoint, Some(DatasetSource::Inline(dataset)))
            .run()
            .await
            .unwrap()
            .unwrap();

        let model = report.fit.model().unwrap();
        assert_eq!(model.slope, 2.0);
        assert_eq!(model.intercept, 1.0);
        assert_eq!(report.residuals.unwrap().rows.len(), 3);
    }

    #[tokio::test]
    async fn residuals_can_be_skipped() {
        let endpoint = mesh::local(NonZeroUsize::MIN).unwrap().remove(0);
        let dataset = Dataset::from_points([(0.0, 0.0), (1.0, 1.0)]).unwrap();

        let report = Worker::new(endpoint, Some(DatasetSource::Inline(dataset)))
            .with_residuals(false)
            .run()
            .await
            .unwrap()
            .unwrap();

        assert!(report.residuals.is_none());
    }

    #[tokio::test]
    async fn coordinator_without_source_fails() {
        let endpoint = mesh::local(NonZeroUsize::MIN).unwrap().remove(0);

        let err = Worker::new(endpoint, None).run().await.unwrap_err();
        assert!(matches!(err, RegressionErr::MissingDataset));
    }

    #[tokio::test]
    async fn degenerate_data_reports_an_undefined_model() {
        let endpoint = mesh::local(NonZeroUsize::MIN).unwrap().remove(0);
        let dataset = Dataset::from_points([(2.0, 0.0), (2.0, 1.0)]).unwrap();

        let report = Worker::new(endpoint, Some(DatasetSource::Inline(dataset)))
            .run()
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(report.fit, Fit::Undefined { .. }));
        assert!(report.residuals.is_none());
    }
}
