use std::io;

use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt, TryStreamExt};
use sha1::Sha1;
use sha2::digest::{Digest, Output};
use sha2::Sha256;

use super::progress::Progress;

/// A SHA-1 piece hash.
pub type PieceHash = [u8; 20];

/// A SHA-256 block hash or merkle node.
pub type Hash256 = [u8; 32];

/// Hashes each chunk with `D`, in arrival order, ticking `progress` once
/// per digest.
pub fn hash_chunks<D, S>(
    chunks: S,
    progress: Option<Progress>,
) -> impl Stream<Item = io::Result<Output<D>>> + Send
where
    D: Digest,
    Output<D>: Send,
    S: Stream<Item = io::Result<Bytes>> + Send,
{
    chunks.map_ok(move |chunk| {
        let digest = D::digest(&chunk);
        if let Some(progress) = &progress {
            progress.tick();
        }
        digest
    })
}

/// SHA-1 over v1 pieces.
pub fn hash_pieces<S>(chunks: S, progress: Option<Progress>) -> BoxStream<'static, io::Result<PieceHash>>
where
    S: Stream<Item = io::Result<Bytes>> + Send + 'static,
{
    hash_chunks::<Sha1, _>(chunks, progress)
        .map_ok(Into::into)
        .boxed()
}

/// SHA-256 over v2 blocks. Blocks are merkle leaves, so no progress here.
pub fn hash_blocks<S>(chunks: S) -> BoxStream<'static, io::Result<Hash256>>
where
    S: Stream<Item = io::Result<Bytes>> + Send + 'static,
{
    hash_chunks::<Sha256, _>(chunks, None)
        .map_ok(Into::into)
        .boxed()
}

/// SHA-256 of a single block.
pub fn hash_block(data: &[u8]) -> Hash256 {
    Sha256::digest(data).into()
}

/// SHA-1 of a single piece.
pub fn hash_piece(data: &[u8]) -> PieceHash {
    Sha1::digest(data).into()
}
