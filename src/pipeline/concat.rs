use std::io;
use std::sync::Arc;

use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};

use crate::fs::{ByteStream, FileSource};

/// Flattens a stream of streams, draining each inner stream completely
/// before the next one is pulled.
pub fn concat<T, S, St>(sources: St) -> BoxStream<'static, io::Result<T>>
where
    T: Send + 'static,
    S: Stream<Item = io::Result<T>> + Send + 'static,
    St: Stream<Item = io::Result<S>> + Send + 'static,
{
    sources.try_flatten().boxed()
}

/// Reads `files` back to back as one continuous byte stream.
///
/// Each file is opened only once the previous one has been read to the end.
pub fn concat_files(files: Vec<Arc<dyn FileSource>>) -> ByteStream {
    concat(stream::iter(files).then(|file| async move { file.open().await }))
}
