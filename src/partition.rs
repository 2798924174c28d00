use std::ops::Range;

use crate::{RegressionErr, Result};

/// The contiguous share of the dataset owned by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub count: usize,
    pub offset: usize,
}

impl Partition {
    #[inline]
    pub fn range(self) -> Range<usize> {
        self.offset..self.offset + self.count
    }
}

/// Splits `total` points among `workers` and returns the share of `worker_id`.
///
/// Properties:
/// - Shares are contiguous, disjoint and cover `[0..total)`.
/// - Sizes differ by at most 1, the first `total % workers` workers hold the
///   extra point.
///
/// Pure, so every worker derives the same layout without exchanging it.
///
/// # Errors
/// `InvalidPartition` if `total` or `workers` is zero, or `worker_id` is not
/// below `workers`.
pub fn partition(total: usize, worker_id: usize, workers: usize) -> Result<Partition> {
    if total == 0 || workers == 0 || worker_id >= workers {
        return Err(RegressionErr::InvalidPartition {
            points: total,
            workers,
            worker_id,
        });
    }

    let base = total / workers;
    let rem = total % workers;

    let offset = worker_id * base + worker_id.min(rem);
    let extra = usize::from(worker_id < rem);

    Ok(Partition {
        count: base + extra,
        offset,
    })
}

/// The partition of every worker, indexed by worker id.
pub fn partitions(total: usize, workers: usize) -> Result<Vec<Partition>> {
    if workers == 0 {
        return Err(RegressionErr::InvalidPartition {
            points: total,
            workers,
            worker_id: 0,
        });
    }

    (0..workers)
        .map(|worker_id| partition(total, worker_id, workers))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(total: usize, workers: usize) -> Vec<usize> {
        partitions(total, workers)
            .unwrap()
            .into_iter()
            .map(|p| p.count)
            .collect()
    }

    #[test]
    fn partition_balanced() {
        // total 10, workers 3 => sizes 4,3,3
        assert_eq!(partition(10, 0, 3).unwrap().range(), 0..4);
        assert_eq!(partition(10, 1, 3).unwrap().range(), 4..7);
        assert_eq!(partition(10, 2, 3).unwrap().range(), 7..10);
    }

    #[test]
    fn first_workers_take_the_remainder() {
        assert_eq!(counts(5, 3), vec![2, 2, 1]);
    }

    #[test]
    fn single_worker_owns_everything() {
        let p = partition(7, 0, 1).unwrap();
        assert_eq!(p, Partition { count: 7, offset: 0 });
    }

    #[test]
    fn more_workers_than_points() {
        assert_eq!(counts(3, 5), vec![1, 1, 1, 0, 0]);

        let tail = partition(3, 4, 5).unwrap();
        assert!(tail.range().is_empty());
        assert_eq!(tail.offset, 3);
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        assert!(matches!(
            partition(0, 0, 2),
            Err(RegressionErr::InvalidPartition { points: 0, .. })
        ));
        assert!(matches!(
            partition(4, 0, 0),
            Err(RegressionErr::InvalidPartition { workers: 0, .. })
        ));
        assert!(matches!(
            partition(4, 2, 2),
            Err(RegressionErr::InvalidPartition { worker_id: 2, .. })
        ));
        assert!(partitions(4, 0).is_err());
    }

    #[test]
    fn partitions_cover_the_dataset_without_gaps() {
        for total in 1..=64 {
            for workers in 1..=17 {
                let parts = partitions(total, workers).unwrap();

                let sum: usize = parts.iter().map(|p| p.count).sum();
                assert_eq!(sum, total, "n={total} P={workers}");

                let max = parts.iter().map(|p| p.count).max().unwrap();
                let min = parts.iter().map(|p| p.count).min().unwrap();
                assert!(max - min <= 1, "n={total} P={workers}");

                let mut next = 0;
                for p in &parts {
                    assert_eq!(p.offset, next, "n={total} P={workers}");
                    next = p.range().end;
                }
                assert_eq!(next, total);
            }
        }
    }
}
