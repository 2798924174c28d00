use std::{borrow::Cow, io};

use log::{debug, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{mpsc, oneshot},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;

use crate::{
    OnoReceiver, OnoSender,
    link::{self, Event, Outgoing, Waiter},
    msg::{Command, Msg, Payload, Tag},
    request::{Request, aborted},
};

struct Link {
    outgoing: mpsc::UnboundedSender<Outgoing>,
    events: mpsc::UnboundedSender<Event>,
    // Resolves once the reader task stops, i.e. the peer disconnected.
    finished: oneshot::Receiver<()>,
}

/// One worker's handle on the message substrate.
///
/// An endpoint knows its own rank, the size of the run and holds one link per
/// peer. Sends and receives are issued without blocking and return a `Request`
/// to wait on; the `send_*`/`recv_*` shorthands issue and wait at once.
pub struct Endpoint {
    rank: usize,
    size: usize,
    links: Vec<Option<Link>>,
    abort: CancellationToken,
    tasks: JoinSet<()>,
}

impl Endpoint {
    /// Creates an endpoint without any links.
    ///
    /// # Arguments
    /// * `rank` - This worker's id, in `[0, size)`.
    /// * `size` - The amount of workers in the run.
    ///
    /// # Returns
    /// A new endpoint or an `InvalidInput` error if `rank` is out of range.
    pub fn new(rank: usize, size: usize) -> io::Result<Self> {
        if rank >= size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("rank {rank} is out of range for a run of {size} worker(s)"),
            ));
        }

        Ok(Self {
            rank,
            size,
            links: (0..size).map(|_| None).collect(),
            abort: CancellationToken::new(),
            tasks: JoinSet::new(),
        })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Binds a framed stream to `peer` and starts its background tasks.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Arguments
    /// * `peer` - The rank on the other side of the stream.
    /// * `rx` - Receiving end of the stream.
    /// * `tx` - Sending end of the stream.
    pub fn attach<R, W>(
        &mut self,
        peer: usize,
        rx: OnoReceiver<R>,
        tx: OnoSender<W>,
    ) -> io::Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.check_peer(peer)?;
        if self.links[peer].is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("worker {} is already linked with worker {peer}", self.rank),
            ));
        }

        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();
        let (finished_tx, finished) = oneshot::channel::<()>();
        let reader_events = events.clone();

        self.tasks.spawn(link::write_loop(peer, tx, outgoing_rx));
        self.tasks.spawn(async move {
            link::read_loop(peer, rx, reader_events).await;
            drop(finished_tx);
        });
        self.tasks.spawn(link::route(peer, events_rx, self.abort.clone()));

        self.links[peer] = Some(Link {
            outgoing,
            events,
            finished,
        });

        Ok(())
    }

    /// Issues the send of a single count to `dest`.
    pub fn isend_count(&self, dest: usize, tag: Tag, count: u64) -> io::Result<Request<()>> {
        let payload = Payload::Count(count);
        self.post(dest, Msg::Data { tag, payload })
    }

    /// Issues the send of `values` to `dest`.
    ///
    /// The values are copied into the outgoing frame, the caller keeps its
    /// buffer.
    pub fn isend_values(&self, dest: usize, tag: Tag, values: &[f64]) -> io::Result<Request<()>> {
        let payload = Payload::Values(Cow::Owned(values.to_vec()));
        self.post(dest, Msg::Data { tag, payload })
    }

    /// Issues the receive of a count sent by `src` under `tag`.
    pub fn irecv_count(&self, src: usize, tag: Tag) -> io::Result<Request<u64>> {
        self.expect(src, tag, Payload::into_count)
    }

    /// Issues the receive of values sent by `src` under `tag`.
    pub fn irecv_values(&self, src: usize, tag: Tag) -> io::Result<Request<Vec<f64>>> {
        self.expect(src, tag, Payload::into_values)
    }

    pub async fn send_count(&self, dest: usize, tag: Tag, count: u64) -> io::Result<()> {
        self.isend_count(dest, tag, count)?.wait().await
    }

    pub async fn send_values(&self, dest: usize, tag: Tag, values: &[f64]) -> io::Result<()> {
        self.isend_values(dest, tag, values)?.wait().await
    }

    pub async fn recv_count(&self, src: usize, tag: Tag) -> io::Result<u64> {
        self.irecv_count(src, tag)?.wait().await
    }

    pub async fn recv_values(&self, src: usize, tag: Tag) -> io::Result<Vec<f64>> {
        self.irecv_values(src, tag)?.wait().await
    }

    /// Terminates the run: notifies every peer and drops all links.
    ///
    /// Peers fail every pending and future request once the notification
    /// arrives. Delivery is best effort, unreachable peers are skipped.
    ///
    /// # Arguments
    /// * `reason` - A diagnostic forwarded to the peers.
    pub async fn abort(self, reason: &str) {
        warn!(rank = self.rank; "aborting the run: {reason}");
        self.abort.cancel();

        let cmd = Command::Abort {
            rank: self.rank,
            reason: reason.to_string(),
        };

        let mut pending = Vec::new();
        for (peer, link) in self.links.iter().enumerate() {
            let Some(link) = link else { continue };

            let (done, sent) = oneshot::channel();
            let msg = Msg::Control(cmd.clone());
            if link.outgoing.send(Outgoing { msg, done }).is_ok() {
                pending.push((peer, sent));
            }
        }

        for (peer, sent) in pending {
            if let Ok(Err(e)) = sent.await {
                debug!(rank = self.rank; "could not notify worker {peer}: {e}");
            }
        }
    }

    /// Gracefully shuts the endpoint down.
    ///
    /// Sends a disconnect to every peer and waits until every peer has
    /// disconnected as well, so no frame in flight is lost when the streams
    /// are dropped.
    pub async fn close(self) {
        let Self {
            rank, links, tasks, ..
        } = self;

        let mut pending = Vec::new();
        for (peer, link) in links.into_iter().enumerate() {
            let Some(Link {
                outgoing, finished, ..
            }) = link
            else {
                continue;
            };

            let (done, sent) = oneshot::channel();
            let msg = Msg::Control(Command::Disconnect);
            let _ = outgoing.send(Outgoing { msg, done });
            pending.push((peer, sent, finished));
        }

        for (peer, sent, finished) in pending {
            if let Ok(Err(e)) = sent.await {
                debug!(rank = rank; "could not say goodbye to worker {peer}: {e}");
            }

            let _ = finished.await;
        }

        debug!(rank = rank; "endpoint closed");
        drop(tasks);
    }

    fn post(&self, dest: usize, msg: Msg<'static>) -> io::Result<Request<()>> {
        if self.abort.is_cancelled() {
            return Err(aborted());
        }

        let link = self.link(dest)?;
        let (done, rx) = oneshot::channel();
        link.outgoing
            .send(Outgoing { msg, done })
            .map_err(|_| link_down(dest))?;

        Ok(Request::new(rx, self.abort.clone()))
    }

    fn expect<T>(
        &self,
        src: usize,
        tag: Tag,
        convert: fn(Payload<'static>) -> io::Result<T>,
    ) -> io::Result<Request<T>>
    where
        T: Send + 'static,
    {
        if self.abort.is_cancelled() {
            return Err(aborted());
        }

        let link = self.link(src)?;
        let (tx, rx) = oneshot::channel();
        let waiter: Waiter = Box::new(move |res| {
            let _ = tx.send(res.and_then(convert));
        });

        link.events
            .send(Event::Expect { tag, waiter })
            .map_err(|_| link_down(src))?;

        Ok(Request::new(rx, self.abort.clone()))
    }

    fn link(&self, peer: usize) -> io::Result<&Link> {
        self.check_peer(peer)?;
        self.links[peer].as_ref().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotConnected,
                format!("worker {} has no link with worker {peer}", self.rank),
            )
        })
    }

    fn check_peer(&self, peer: usize) -> io::Result<()> {
        if peer >= self.size || peer == self.rank {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "worker {} cannot address worker {peer} in a run of {}",
                    self.rank, self.size
                ),
            ));
        }

        Ok(())
    }
}

fn link_down(peer: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::BrokenPipe,
        format!("the link with worker {peer} is down"),
    )
}
