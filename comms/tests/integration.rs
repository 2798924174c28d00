use std::{borrow::Cow, io, num::NonZeroUsize};

use comms::{
    Deserialize, Endpoint, Serialize, Tag,
    msg::{Command, Msg, Payload},
};
use tokio::io as tio;

fn world(size: usize) -> Vec<Endpoint> {
    comms::mesh::local(NonZeroUsize::new(size).unwrap()).unwrap()
}

#[test]
fn serialize_deserialize_count() {
    let msg = Msg::Data {
        tag: Tag::new(110),
        payload: Payload::Count(42),
    };

    let mut buf = Vec::new();
    assert!(msg.serialize(&mut buf).is_none());

    let decoded = Msg::deserialize(&buf).unwrap();
    assert_eq!(decoded, msg);
}

#[test]
fn deserialize_rejects_truncated_header() {
    let err = Msg::deserialize(&[0, 0, 0]).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
}

#[tokio::test]
async fn send_recv_values_frame() -> io::Result<()> {
    const SIZE: usize = 128;

    let values = [1.5, -2.0, 3.25];
    let msg = Msg::Data {
        tag: Tag::new(111),
        payload: Payload::Values(Cow::Borrowed(&values)),
    };

    let (one, two) = tio::duplex(SIZE);
    let (rx, tx) = tio::split(one);
    let (_, mut tx) = comms::channel(rx, tx);

    tx.send(&msg).await?;

    let (rx, tx) = tio::split(two);
    let (mut rx, _) = comms::channel(rx, tx);

    let mut buf: Vec<u64> = Vec::new();
    let received: Msg = rx.recv_into(&mut buf).await?;

    assert_eq!(received, msg);
    Ok(())
}

#[tokio::test]
async fn control_frames_survive_the_wire() -> io::Result<()> {
    let msg = Msg::Control(Command::Abort {
        rank: 3,
        reason: "boom".into(),
    });

    let (one, two) = tio::duplex(256);
    let (_, tx) = tio::split(one);
    let (rx, _) = tio::split(two);
    let mut tx = comms::channel(tio::empty(), tx).1;
    let mut rx = comms::channel(rx, tio::sink()).0;

    tx.send(&msg).await?;

    let mut buf: Vec<u64> = Vec::new();
    let received: Msg = rx.recv_into(&mut buf).await?;
    assert_eq!(received, msg);
    Ok(())
}

#[tokio::test]
async fn oversized_frame_length_is_rejected() {
    use tokio::io::AsyncWriteExt;

    let (mut one, two) = tio::duplex(64);
    one.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();

    let (rx, tx) = tio::split(two);
    let (mut rx, _) = comms::channel(rx, tx);

    let mut buf: Vec<u64> = Vec::new();
    let err = rx.recv_into::<Msg, _>(&mut buf).await.unwrap_err();

    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    assert!(buf.is_empty());
}

#[tokio::test]
async fn oversized_frame_after_a_valid_one_is_rejected() {
    use tokio::io::AsyncWriteExt;

    // A valid count frame followed by a length past the limit.
    let msg = Msg::Data {
        tag: Tag::new(9),
        payload: Payload::Count(1),
    };
    let mut body = Vec::new();
    assert!(msg.serialize(&mut body).is_none());

    let (mut one, two) = tio::duplex(256);
    one.write_all(&(body.len() as u64).to_be_bytes()).await.unwrap();
    one.write_all(&body).await.unwrap();
    one.write_all(&(comms::MAX_FRAME_LEN + 1).to_be_bytes()).await.unwrap();

    let (rx, tx) = tio::split(two);
    let (mut rx, _) = comms::channel(rx, tx);

    let mut buf: Vec<u64> = Vec::new();
    let received: Msg = rx.recv_into(&mut buf).await.unwrap();
    assert_eq!(received, msg);

    let err = rx.recv_into::<Msg, _>(&mut buf).await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
}

#[tokio::test]
async fn receives_match_by_tag_not_arrival_order() -> io::Result<()> {
    let mut endpoints = world(2);
    let one = endpoints.pop().unwrap();
    let zero = endpoints.pop().unwrap();

    zero.send_count(1, Tag::new(7), 70).await?;
    zero.send_values(1, Tag::new(8), &[8.0, 80.0]).await?;

    let values = one.recv_values(0, Tag::new(8)).await?;
    let count = one.recv_count(0, Tag::new(7)).await?;

    assert_eq!(values, vec![8.0, 80.0]);
    assert_eq!(count, 70);

    tokio::join!(zero.close(), one.close());
    Ok(())
}

#[tokio::test]
async fn same_tag_messages_arrive_in_send_order() -> io::Result<()> {
    let mut endpoints = world(2);
    let one = endpoints.pop().unwrap();
    let zero = endpoints.pop().unwrap();

    let first = one.irecv_count(0, Tag::new(1))?;
    let second = one.irecv_count(0, Tag::new(1))?;

    for n in [10, 20, 30] {
        zero.isend_count(1, Tag::new(1), n)?.wait().await?;
    }

    assert_eq!(first.wait().await?, 10);
    assert_eq!(second.wait().await?, 20);
    assert_eq!(one.recv_count(0, Tag::new(1)).await?, 30);

    tokio::join!(zero.close(), one.close());
    Ok(())
}

#[tokio::test]
async fn empty_values_are_delivered() -> io::Result<()> {
    let mut endpoints = world(2);
    let one = endpoints.pop().unwrap();
    let zero = endpoints.pop().unwrap();

    zero.send_values(1, Tag::new(5), &[]).await?;
    assert!(one.recv_values(0, Tag::new(5)).await?.is_empty());

    tokio::join!(zero.close(), one.close());
    Ok(())
}

#[tokio::test]
async fn mismatched_payload_kind_is_an_error() -> io::Result<()> {
    let mut endpoints = world(2);
    let one = endpoints.pop().unwrap();
    let zero = endpoints.pop().unwrap();

    zero.send_count(1, Tag::new(2), 5).await?;
    let err = one.recv_values(0, Tag::new(2)).await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);

    tokio::join!(zero.close(), one.close());
    Ok(())
}

#[tokio::test]
async fn abort_fails_pending_receives_on_every_peer() -> io::Result<()> {
    let mut endpoints = world(3);
    let two = endpoints.pop().unwrap();
    let one = endpoints.pop().unwrap();
    let zero = endpoints.pop().unwrap();

    // Worker 1 waits on worker 0, which never sends; worker 2 aborts.
    let pending = one.irecv_count(0, Tag::new(100))?;
    two.abort("dataset missing").await;

    let err = pending.wait().await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::ConnectionAborted);

    let err = zero.recv_count(2, Tag::new(100)).await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::ConnectionAborted);
    Ok(())
}

#[tokio::test]
async fn addressing_self_or_unknown_rank_is_rejected() {
    let mut endpoints = world(2);
    let zero = endpoints.remove(0);

    let err = zero.isend_count(0, Tag::new(1), 1).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

    let err = zero.irecv_values(5, Tag::new(1)).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
}

#[tokio::test]
async fn close_waits_for_every_peer() {
    let endpoints = world(4);
    let handles: Vec<_> = endpoints
        .into_iter()
        .map(|endpoint| tokio::spawn(endpoint.close()))
        .collect();

    for handle in handles {
        handle.await.unwrap();
    }
}

#[test]
fn endpoint_rank_must_be_in_range() {
    let err = Endpoint::new(3, 3).err().unwrap();
    assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
}
