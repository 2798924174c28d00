use comms::{Endpoint, Tag};
use log::{debug, trace};

use crate::{
    Dataset, PartialSums, Phase, RegressionErr, Result,
    partition::{self, Partition},
};

pub const N_TAG: Tag = Tag::new(100);
pub const COUNT_TAG: Tag = Tag::new(110);
pub const X_TAG: Tag = Tag::new(111);
pub const Y_TAG: Tag = Tag::new(112);

/// A worker's own copy of its share of the dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalSlice {
    pub total: usize,
    pub partition: Partition,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl LocalSlice {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// The four partial sums of this slice.
    pub fn sums(&self) -> PartialSums {
        PartialSums::accumulate(&self.x, &self.y)
    }
}

/// Ships every worker its share of the dataset.
///
/// Worker 0 is the coordinator: it must be given the dataset and sends the
/// amount of points, then each peer's count and, for non empty shares, its
/// `x` and `y` columns. Every other worker must be given `None` and receives
/// in the same order.
///
/// # Returns
/// The slice owned by this worker.
pub async fn distribute(endpoint: &Endpoint, dataset: Option<Dataset>) -> Result<LocalSlice> {
    match (endpoint.rank(), dataset) {
        (0, Some(dataset)) => scatter(endpoint, dataset).await,
        (0, None) => Err(RegressionErr::MissingDataset),
        (_, _) => gather(endpoint).await,
    }
}

async fn scatter(endpoint: &Endpoint, dataset: Dataset) -> Result<LocalSlice> {
    let workers = endpoint.size();
    let total = dataset.len();
    let parts = partition::partitions(total, workers)?;

    for peer in 1..workers {
        endpoint
            .isend_count(peer, N_TAG, total as u64)
            .map_err(RegressionErr::transmission(Phase::Distribute))?
            .wait()
            .await
            .map_err(RegressionErr::transmission(Phase::Distribute))?;
    }

    for (peer, &part) in parts.iter().enumerate().skip(1) {
        send(endpoint, peer, &dataset, part).await?;
    }

    let (x, y) = dataset.columns(parts[0]);
    debug!(rank = 0, count = parts[0].count, offset = parts[0].offset; "kept own slice");

    Ok(LocalSlice {
        total,
        partition: parts[0],
        x: x.to_vec(),
        y: y.to_vec(),
    })
}

async fn send(endpoint: &Endpoint, peer: usize, dataset: &Dataset, part: Partition) -> Result<()> {
    endpoint
        .isend_count(peer, COUNT_TAG, part.count as u64)
        .map_err(RegressionErr::transmission(Phase::Distribute))?
        .wait()
        .await
        .map_err(RegressionErr::transmission(Phase::Distribute))?;

    if part.count == 0 {
        trace!(peer = peer; "nothing to ship");
        return Ok(());
    }

    let (x, y) = dataset.columns(part);
    for (tag, column) in [(X_TAG, x), (Y_TAG, y)] {
        endpoint
            .isend_values(peer, tag, column)
            .map_err(RegressionErr::transmission(Phase::Distribute))?
            .wait()
            .await
            .map_err(RegressionErr::transmission(Phase::Distribute))?;
    }

    debug!(peer = peer, count = part.count, offset = part.offset; "shipped slice");
    Ok(())
}

async fn gather(endpoint: &Endpoint) -> Result<LocalSlice> {
    let rank = endpoint.rank();

    let total = endpoint
        .irecv_count(0, N_TAG)
        .map_err(RegressionErr::transmission(Phase::Distribute))?
        .wait()
        .await
        .map_err(RegressionErr::transmission(Phase::Distribute))?;
    let total = usize::try_from(total).map_err(|_| {
        mismatch(format!("{total} points do not fit in this worker's memory"))
    })?;

    let part = partition::partition(total, rank, endpoint.size())?;

    let count = endpoint
        .irecv_count(0, COUNT_TAG)
        .map_err(RegressionErr::transmission(Phase::Distribute))?
        .wait()
        .await
        .map_err(RegressionErr::transmission(Phase::Distribute))?;
    if count != part.count as u64 {
        return Err(mismatch(format!(
            "worker {rank} expected {} point(s) but was assigned {count}",
            part.count
        )));
    }

    // Columns come straight out of their frames, nothing is sized from the wire.
    let (x, y) = if part.count > 0 {
        let x = recv_column(endpoint, X_TAG, part.count).await?;
        let y = recv_column(endpoint, Y_TAG, part.count).await?;
        (x, y)
    } else {
        (Vec::new(), Vec::new())
    };

    debug!(rank = rank, count = part.count, offset = part.offset; "received slice");
    for (i, (xv, yv)) in x.iter().zip(&y).enumerate() {
        trace!(rank = rank; "x[{}]={xv} y={yv}", part.offset + i);
    }

    Ok(LocalSlice {
        total,
        partition: part,
        x,
        y,
    })
}

async fn recv_column(endpoint: &Endpoint, tag: Tag, expected: usize) -> Result<Vec<f64>> {
    let values = endpoint
        .irecv_values(0, tag)
        .map_err(RegressionErr::transmission(Phase::Distribute))?
        .wait()
        .await
        .map_err(RegressionErr::transmission(Phase::Distribute))?;

    if values.len() != expected {
        return Err(mismatch(format!(
            "worker {} expected {expected} value(s) under {tag}, got {}",
            endpoint.rank(),
            values.len()
        )));
    }

    Ok(values)
}

fn mismatch(msg: String) -> RegressionErr {
    RegressionErr::Transmission {
        phase: Phase::Distribute,
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, msg),
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use comms::mesh;
    use futures::future::join_all;

    use super::*;

    fn dataset(n: usize) -> Dataset {
        Dataset::from_points((0..n).map(|i| (i as f64, 10.0 * i as f64))).unwrap()
    }

    async fn run(n: usize, workers: usize) -> Vec<LocalSlice> {
        let endpoints = mesh::local(NonZeroUsize::new(workers).unwrap()).unwrap();

        let handles = endpoints.into_iter().map(|endpoint| {
            let data = (endpoint.rank() == 0).then(|| dataset(n));
            tokio::spawn(async move {
                let slice = distribute(&endpoint, data).await.unwrap();
                endpoint.close().await;
                slice
            })
        });

        join_all(handles)
            .await
            .into_iter()
            .map(|res| res.unwrap())
            .collect()
    }

    #[tokio::test]
    async fn every_worker_gets_its_partition() {
        let slices = run(10, 3).await;

        assert_eq!(slices[0].x, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(slices[1].x, vec![4.0, 5.0, 6.0]);
        assert_eq!(slices[2].x, vec![7.0, 8.0, 9.0]);
        assert_eq!(slices[2].y, vec![70.0, 80.0, 90.0]);
        assert!(slices.iter().all(|s| s.total == 10));
    }

    #[tokio::test]
    async fn more_workers_than_points() {
        let slices = run(2, 4).await;

        let counts: Vec<_> = slices.iter().map(LocalSlice::len).collect();
        assert_eq!(counts, vec![1, 1, 0, 0]);
        assert!(slices[3].is_empty());
        assert_eq!(slices[3].sums(), PartialSums::default());
    }

    #[tokio::test]
    async fn single_worker_keeps_everything() {
        let slices = run(5, 1).await;
        assert_eq!(slices[0].len(), 5);
    }

    fn assert_invalid_data(err: RegressionErr) {
        match err {
            RegressionErr::Transmission {
                phase: Phase::Distribute,
                source,
            } => assert_eq!(source.kind(), std::io::ErrorKind::InvalidData),
            other => panic!("expected a distribute transmission error, got {other}"),
        }
    }

    #[tokio::test]
    async fn wrong_count_is_rejected() {
        let mut endpoints = mesh::local(NonZeroUsize::new(2).unwrap()).unwrap();
        let peer = endpoints.pop().unwrap();
        let coordinator = endpoints.pop().unwrap();

        let receiving = tokio::spawn(async move { distribute(&peer, None).await });

        // 4 points over 2 workers assign 2 to worker 1.
        coordinator.send_count(1, N_TAG, 4).await.unwrap();
        coordinator.send_count(1, COUNT_TAG, 5).await.unwrap();

        assert_invalid_data(receiving.await.unwrap().unwrap_err());
    }

    #[tokio::test]
    async fn short_slice_is_rejected() {
        let mut endpoints = mesh::local(NonZeroUsize::new(2).unwrap()).unwrap();
        let peer = endpoints.pop().unwrap();
        let coordinator = endpoints.pop().unwrap();

        let receiving = tokio::spawn(async move { distribute(&peer, None).await });

        coordinator.send_count(1, N_TAG, 4).await.unwrap();
        coordinator.send_count(1, COUNT_TAG, 2).await.unwrap();
        coordinator.send_values(1, X_TAG, &[1.0]).await.unwrap();

        assert_invalid_data(receiving.await.unwrap().unwrap_err());
    }

    #[tokio::test]
    async fn coordinator_without_dataset_fails() {
        let mut endpoints = mesh::local(NonZeroUsize::new(1).unwrap()).unwrap();
        let endpoint = endpoints.remove(0);

        let err = distribute(&endpoint, None).await.unwrap_err();
        assert!(matches!(err, RegressionErr::MissingDataset));
    }
}
