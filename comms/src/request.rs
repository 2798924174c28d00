use std::io;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Handle of an issued send or receive.
///
/// The operation makes progress in the background once issued, `wait` only
/// suspends the caller until it completes. Dropping the handle does not cancel
/// the operation.
#[must_use = "a request does nothing observable until it is waited on"]
#[derive(Debug)]
pub struct Request<T> {
    rx: oneshot::Receiver<io::Result<T>>,
    abort: CancellationToken,
}

impl<T> Request<T> {
    pub(crate) fn new(rx: oneshot::Receiver<io::Result<T>>, abort: CancellationToken) -> Self {
        Self { rx, abort }
    }

    /// Waits until the operation completes.
    ///
    /// # Returns
    /// The operation's output, or an error if the link failed or the run was
    /// aborted by any peer while waiting.
    pub async fn wait(self) -> io::Result<T> {
        let Self { rx, abort } = self;

        tokio::select! {
            biased;

            res = rx => res.map_err(|_| {
                io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "link dropped before the request completed",
                )
            })?,
            _ = abort.cancelled() => Err(aborted()),
        }
    }
}

pub(crate) fn aborted() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "the run was aborted")
}
