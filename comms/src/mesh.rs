//! Bootstraps connecting every worker of a run with every other one.

use std::{io, net::SocketAddr, num::NonZeroUsize, time::Duration};

use log::{debug, info, warn};
use tokio::{
    io as tio,
    net::{TcpListener, TcpStream},
};

use crate::{
    Endpoint,
    msg::{Command, Msg},
};

const LOCAL_BUFFER: usize = 64 * 1024;
const DIAL_ATTEMPTS: usize = 120;
const DIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Builds the endpoints of an in-process run, linked through memory pipes.
///
/// Must be called from within a Tokio runtime.
///
/// # Arguments
/// * `size` - The amount of workers.
///
/// # Returns
/// One endpoint per worker, indexed by rank.
pub fn local(size: NonZeroUsize) -> io::Result<Vec<Endpoint>> {
    let size = size.get();
    let mut endpoints = (0..size)
        .map(|rank| Endpoint::new(rank, size))
        .collect::<io::Result<Vec<_>>>()?;

    for a in 0..size {
        for b in a + 1..size {
            let (one, two) = tio::duplex(LOCAL_BUFFER);

            let (rx, tx) = tio::split(one);
            let (rx, tx) = crate::channel(rx, tx);
            endpoints[a].attach(b, rx, tx)?;

            let (rx, tx) = tio::split(two);
            let (rx, tx) = crate::channel(rx, tx);
            endpoints[b].attach(a, rx, tx)?;
        }
    }

    Ok(endpoints)
}

/// Joins a run spread over the network.
///
/// The worker listens on its own address, dials every lower rank and accepts a
/// connection from every higher rank, which introduce themselves with a
/// `Hello` command.
///
/// # Arguments
/// * `rank` - This worker's id.
/// * `addrs` - The listening address of every worker, indexed by rank.
///
/// # Returns
/// The connected endpoint or an io error if the mesh could not be built.
pub async fn connect(rank: usize, addrs: &[SocketAddr]) -> io::Result<Endpoint> {
    let size = addrs.len();
    let mut endpoint = Endpoint::new(rank, size)?;

    let listener = TcpListener::bind(addrs[rank]).await?;
    info!(rank = rank; "listening at {}", addrs[rank]);

    for (peer, &addr) in addrs.iter().enumerate().take(rank) {
        let stream = dial(addr).await?;
        stream.set_nodelay(true)?;

        let (rx, tx) = stream.into_split();
        let (rx, mut tx) = crate::channel(rx, tx);
        tx.send(&Msg::Control(Command::Hello { rank, size })).await?;
        endpoint.attach(peer, rx, tx)?;
        debug!(rank = rank, peer = peer; "dialed {addr}");
    }

    let mut buf: Vec<u64> = Vec::new();
    for _ in rank + 1..size {
        let (stream, addr) = listener.accept().await?;
        stream.set_nodelay(true)?;

        let (rx, tx) = stream.into_split();
        let (mut rx, tx) = crate::channel(rx, tx);

        let peer = match rx.recv_into::<Msg<'_>, _>(&mut buf).await? {
            Msg::Control(Command::Hello {
                rank: peer,
                size: peer_size,
            }) if peer_size == size && peer > rank => peer,
            msg => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("expected a hello from {addr}, got {}", msg.kind()),
                ));
            }
        };

        endpoint.attach(peer, rx, tx)?;
        debug!(rank = rank, peer = peer; "accepted {addr}");
    }

    info!(rank = rank; "joined a run of {size} worker(s)");
    Ok(endpoint)
}

async fn dial(addr: SocketAddr) -> io::Result<TcpStream> {
    let mut attempt = 1;

    loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) if attempt < DIAL_ATTEMPTS => {
                warn!("failed to reach {addr}: {e}, retrying...");
                attempt += 1;
                tokio::time::sleep(DIAL_BACKOFF).await;
            }
            Err(e) => return Err(e),
        }
    }
}
