//! Binary-tree reduction of partial sums towards worker 0.
//!
//! Round `k` uses `step = 2^k`. Workers whose id is a multiple of `2·step`
//! receive from `id + step`, every other still active worker sends to
//! `id − step` and leaves. Worker 0 holds the grand total after
//! `⌈log2 P⌉` rounds.

use comms::{Endpoint, Tag};
use log::debug;

use crate::{PartialSums, Phase, RegressionErr, Result};

const REDUCE_TAG_BASE: u32 = 200;

/// What a worker does in one reduction round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Adds the accumulator of `from` into its own.
    Receiver { from: usize },
    /// Ships its accumulator to `to` and leaves the reduction.
    Sender { to: usize },
    /// Active, but without a partner this round.
    Idle,
    /// Already sent in an earlier round.
    Retired,
}

/// The role of `worker_id` in the round of `step` for a run of `workers`.
pub fn role(worker_id: usize, step: usize, workers: usize) -> Role {
    if worker_id % step != 0 {
        return Role::Retired;
    }

    if worker_id % (2 * step) == 0 {
        let from = worker_id + step;
        if from < workers {
            Role::Receiver { from }
        } else {
            Role::Idle
        }
    } else {
        Role::Sender {
            to: worker_id - step,
        }
    }
}

/// One round of the reduction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round {
    pub step: usize,
    /// `(sender, receiver)` pairs exchanging in this round.
    pub transfers: Vec<(usize, usize)>,
}

/// Every round of the reduction of `workers` accumulators, in order.
pub fn schedule(workers: usize) -> Vec<Round> {
    let mut rounds = Vec::new();
    let mut step = 1;

    while step < workers {
        let transfers = (0..workers)
            .filter_map(|id| match role(id, step, workers) {
                Role::Sender { to } => Some((id, to)),
                _ => None,
            })
            .collect();

        rounds.push(Round { step, transfers });
        step *= 2;
    }

    rounds
}

/// The tag of the round of `step`, unique per round.
pub fn round_tag(step: usize) -> Tag {
    Tag::new(REDUCE_TAG_BASE + step.trailing_zeros())
}

/// Combines the accumulators of every worker into worker 0.
///
/// # Arguments
/// * `endpoint` - This worker's handle on the run.
/// * `local` - This worker's partial sums.
///
/// # Returns
/// The grand totals on worker 0, `None` on every other worker.
pub async fn tree_reduce(endpoint: &Endpoint, local: PartialSums) -> Result<Option<PartialSums>> {
    let rank = endpoint.rank();
    let workers = endpoint.size();
    let mut acc = local;
    let mut step = 1;

    while step < workers {
        let tag = round_tag(step);

        match role(rank, step, workers) {
            Role::Receiver { from } => {
                let values = endpoint
                    .irecv_values(from, tag)
                    .map_err(RegressionErr::transmission(Phase::Reduce))?
                    .wait()
                    .await
                    .map_err(RegressionErr::transmission(Phase::Reduce))?;

                let incoming = PartialSums::try_from(values.as_slice())
                    .map_err(RegressionErr::transmission(Phase::Reduce))?;

                debug!(rank = rank, step = step; "merged the sums of worker {from}");
                acc += incoming;
            }
            Role::Sender { to } => {
                endpoint
                    .isend_values(to, tag, &acc.to_array())
                    .map_err(RegressionErr::transmission(Phase::Reduce))?
                    .wait()
                    .await
                    .map_err(RegressionErr::transmission(Phase::Reduce))?;

                debug!(rank = rank, step = step; "handed the sums over to worker {to}");
                return Ok(None);
            }
            Role::Idle => {}
            Role::Retired => return Ok(None),
        }

        step *= 2;
    }

    Ok((rank == 0).then_some(acc))
}
