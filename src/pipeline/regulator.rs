use std::collections::VecDeque;
use std::io;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, Stream, StreamExt};

/// Re-chunks arbitrary input into pieces of exactly `chunk_len` bytes.
///
/// Bytes that do not yet fill a chunk stay in a residue buffer. At the end
/// the residue, if any, comes out once: zero-padded to `chunk_len` when
/// padding is on, as a short chunk otherwise.
///
/// ```
/// use bytes::Bytes;
/// use std::collections::VecDeque;
/// use torrentkit::pipeline::ChunkRegulator;
///
/// let mut regulator = ChunkRegulator::new(4, false);
/// let mut out = VecDeque::new();
/// regulator.push(Bytes::from_static(b"abcdef"), &mut out);
/// assert_eq!(out.pop_front().unwrap().as_ref(), b"abcd");
/// assert!(out.is_empty());
/// assert_eq!(regulator.finish().unwrap().as_ref(), b"ef");
/// ```
#[derive(Debug)]
pub struct ChunkRegulator {
    chunk_len: usize,
    padding: bool,
    residue: BytesMut,
}

impl ChunkRegulator {
    pub fn new(chunk_len: usize, padding: bool) -> Self {
        let chunk_len = chunk_len.max(1);
        Self {
            chunk_len,
            padding,
            residue: BytesMut::with_capacity(chunk_len),
        }
    }

    /// Feeds `data`, appending every completed chunk to `out`.
    pub fn push(&mut self, mut data: Bytes, out: &mut VecDeque<Bytes>) {
        if !self.residue.is_empty() {
            let take = (self.chunk_len - self.residue.len()).min(data.len());
            self.residue.extend_from_slice(&data.split_to(take));
            if self.residue.len() < self.chunk_len {
                return;
            }
            out.push_back(self.residue.split().freeze());
        }
        // Whole chunks straight from the input are sliced, not copied.
        while data.len() >= self.chunk_len {
            out.push_back(data.split_to(self.chunk_len));
        }
        self.residue.extend_from_slice(&data);
    }

    /// Flushes the residue.
    pub fn finish(&mut self) -> Option<Bytes> {
        if self.residue.is_empty() {
            return None;
        }
        if self.padding {
            self.residue.resize(self.chunk_len, 0);
        }
        Some(self.residue.split().freeze())
    }
}

struct State<S> {
    input: S,
    regulator: ChunkRegulator,
    ready: VecDeque<Bytes>,
    done: bool,
}

/// Stream form of [`ChunkRegulator`].
///
/// An input error is passed through and ends the output.
pub fn regulate<S>(input: S, chunk_len: usize, padding: bool) -> BoxStream<'static, io::Result<Bytes>>
where
    S: Stream<Item = io::Result<Bytes>> + Send + 'static,
{
    let state = State {
        input: input.boxed(),
        regulator: ChunkRegulator::new(chunk_len, padding),
        ready: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(chunk) = state.ready.pop_front() {
                return Some((Ok(chunk), state));
            }
            if state.done {
                return None;
            }
            match state.input.next().await {
                Some(Ok(data)) => state.regulator.push(data, &mut state.ready),
                Some(Err(e)) => {
                    state.done = true;
                    state.ready.clear();
                    return Some((Err(e), state));
                }
                None => {
                    state.done = true;
                    state.ready.extend(state.regulator.finish());
                }
            }
        }
    })
    .boxed()
}
