use std::io;

use bytes::Bytes;
use futures::channel::mpsc;
use futures::future::BoxFuture;
use futures::{FutureExt, SinkExt, StreamExt};

use crate::fs::ByteStream;

/// Two readers of one byte stream.
///
/// Nothing flows until `pump` is polled, and `pump` only advances while
/// both branches are being read (each channel holds at most `capacity`
/// chunks). Drive all three together, e.g. with `try_join!`.
pub struct Tee {
    pub pump: BoxFuture<'static, io::Result<()>>,
    pub left: ByteStream,
    pub right: ByteStream,
}

fn copy_error(e: &io::Error) -> io::Error {
    io::Error::new(e.kind(), e.to_string())
}

/// Splits `input` into two identical streams.
pub fn tee(input: ByteStream, capacity: usize) -> Tee {
    let (left_tx, left_rx) = mpsc::channel(capacity);
    let (right_tx, right_rx) = mpsc::channel(capacity);
    Tee {
        pump: pump(input, left_tx, right_tx).boxed(),
        left: left_rx.boxed(),
        right: right_rx.boxed(),
    }
}

async fn pump(
    mut input: ByteStream,
    mut left: mpsc::Sender<io::Result<Bytes>>,
    mut right: mpsc::Sender<io::Result<Bytes>>,
) -> io::Result<()> {
    while let Some(item) = input.next().await {
        match item {
            Ok(chunk) => {
                // A branch that hung up does not stop the other one.
                let _ = left.send(Ok(chunk.clone())).await;
                let _ = right.send(Ok(chunk)).await;
            }
            Err(e) => {
                let _ = left.send(Err(copy_error(&e))).await;
                let _ = right.send(Err(copy_error(&e))).await;
                return Err(e);
            }
        }
    }
    Ok(())
}
