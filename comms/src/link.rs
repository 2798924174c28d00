//! Background tasks backing one peer link of an `Endpoint`.
//!
//! Every link runs three tasks: a writer draining the outgoing queue into the
//! stream, a reader decoding frames off the stream, and a router matching the
//! decoded messages with the receives issued by the owner.

use std::{
    collections::{HashMap, VecDeque},
    io,
};

use log::{debug, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{mpsc, oneshot},
};
use tokio_util::sync::CancellationToken;

use crate::{
    OnoReceiver, OnoSender,
    msg::{Command, Msg, Payload, Tag},
};

/// Completion callback of an issued receive.
pub(crate) type Waiter = Box<dyn FnOnce(io::Result<Payload<'static>>) + Send>;

/// A message queued for the writer task.
pub(crate) struct Outgoing {
    pub msg: Msg<'static>,
    pub done: oneshot::Sender<io::Result<()>>,
}

/// Input of the router task.
pub(crate) enum Event {
    Expect { tag: Tag, waiter: Waiter },
    Delivered { tag: Tag, payload: Payload<'static> },
    Aborted { rank: usize, reason: String },
    Closed { kind: io::ErrorKind, reason: String },
}

pub(crate) async fn write_loop<W>(
    peer: usize,
    mut tx: OnoSender<W>,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(Outgoing { msg, done }) = outgoing.recv().await {
        let res = tx.send(&msg).await;
        if let Err(e) = &res {
            debug!(peer = peer; "failed to write {}: {e}", msg.kind());
        }

        // The issuer may have dropped its request handle, that is fine.
        let _ = done.send(res);
    }

    if let Err(e) = tx.shutdown().await {
        debug!(peer = peer; "failed to shut down the link: {e}");
    }
}

pub(crate) async fn read_loop<R>(
    peer: usize,
    mut rx: OnoReceiver<R>,
    events: mpsc::UnboundedSender<Event>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf: Vec<u64> = Vec::new();

    loop {
        let event = match rx.recv_into::<Msg<'_>, _>(&mut buf).await {
            Ok(Msg::Data { tag, payload }) => Event::Delivered {
                tag,
                payload: payload.into_owned(),
            },
            Ok(Msg::Control(Command::Abort { rank, reason })) => Event::Aborted { rank, reason },
            Ok(Msg::Control(Command::Disconnect)) => {
                debug!(peer = peer; "peer disconnected");
                let _ = events.send(Event::Closed {
                    kind: io::ErrorKind::UnexpectedEof,
                    reason: format!("worker {peer} disconnected"),
                });
                return;
            }
            Ok(msg @ Msg::Control(Command::Hello { .. })) => {
                warn!(peer = peer; "ignoring unexpected {}", msg.kind());
                continue;
            }
            Ok(Msg::Err(detail)) => {
                let _ = events.send(Event::Closed {
                    kind: io::ErrorKind::Other,
                    reason: format!("worker {peer} reported: {detail}"),
                });
                return;
            }
            Err(e) => {
                let _ = events.send(Event::Closed {
                    kind: e.kind(),
                    reason: format!("link with worker {peer} failed: {e}"),
                });
                return;
            }
        };

        if events.send(event).is_err() {
            return;
        }
    }
}

/// Matches delivered payloads with issued receives by tag, in arrival order.
pub(crate) async fn route(
    peer: usize,
    mut events: mpsc::UnboundedReceiver<Event>,
    abort: CancellationToken,
) {
    let mut stash: HashMap<Tag, VecDeque<Payload<'static>>> = HashMap::new();
    let mut waiters: HashMap<Tag, VecDeque<Waiter>> = HashMap::new();
    let mut closed: Option<(io::ErrorKind, String)> = None;

    while let Some(event) = events.recv().await {
        match event {
            Event::Expect { tag, waiter } => {
                if let Some(payload) = stash.get_mut(&tag).and_then(VecDeque::pop_front) {
                    waiter(Ok(payload));
                } else if let Some((kind, reason)) = &closed {
                    waiter(Err(io::Error::new(*kind, reason.clone())));
                } else {
                    waiters.entry(tag).or_default().push_back(waiter);
                }
            }
            Event::Delivered { tag, payload } => {
                match waiters.get_mut(&tag).and_then(VecDeque::pop_front) {
                    Some(waiter) => waiter(Ok(payload)),
                    None => stash.entry(tag).or_default().push_back(payload),
                }
            }
            Event::Aborted { rank, reason } => {
                warn!(peer = peer; "worker {rank} aborted the run: {reason}");
                abort.cancel();

                let reason = format!("worker {rank} aborted the run: {reason}");
                fail_waiters(&mut waiters, io::ErrorKind::ConnectionAborted, &reason);
                if closed.is_none() {
                    closed = Some((io::ErrorKind::ConnectionAborted, reason));
                }
            }
            Event::Closed { kind, reason } => {
                let pending: usize = waiters.values().map(VecDeque::len).sum();
                if pending > 0 {
                    warn!(peer = peer; "{reason} with {pending} receive(s) pending");
                }

                fail_waiters(&mut waiters, kind, &reason);
                if closed.is_none() {
                    closed = Some((kind, reason));
                }
            }
        }
    }
}

fn fail_waiters(waiters: &mut HashMap<Tag, VecDeque<Waiter>>, kind: io::ErrorKind, reason: &str) {
    for waiter in waiters.drain().flat_map(|(_, queue)| queue) {
        waiter(Err(io::Error::new(kind, reason.to_string())));
    }
}
