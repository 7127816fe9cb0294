//! Streaming hash pipeline.
//!
//! The stages compose as plain [`Stream`](futures::Stream)s:
//!
//! ```text
//! file bytes ─► regulate(piece, pad) ─► hash_pieces ─► 20-byte piece hashes     (v1)
//! file bytes ─► regulate(block)      ─► hash_blocks ─► file_merkle ─► root/layer (v2)
//! ```
//!
//! [`concat_files`] turns many files into one stream for v1 hashing, and
//! [`tee`] lets hybrid torrents run both branches over a single read.
//!
//! # Examples
//!
//! ```
//! use bytes::Bytes;
//! use futures::{stream, TryStreamExt};
//! use torrentkit::pipeline::{hash_pieces, regulate};
//!
//! # futures::executor::block_on(async {
//! let input = stream::iter(vec![Ok(Bytes::from_static(b"hello ")), Ok(Bytes::from_static(b"world"))]);
//! let pieces: Vec<[u8; 20]> = hash_pieces(regulate(input, 4, false), None)
//!     .try_collect()
//!     .await
//!     .unwrap();
//! assert_eq!(pieces.len(), 3);
//! # });
//! ```

mod concat;
mod hasher;
mod merkle;
mod progress;
mod regulator;
mod tee;

pub use concat::{concat, concat_files};
pub use hasher::{
    hash_block, hash_blocks, hash_chunks, hash_piece, hash_pieces, Hash256, PieceHash,
};
pub use merkle::{
    balanced_root, file_merkle, hash_pair, merkle_root, FileMerkle, LeafGrouper, MerkleError,
    PadLeaf, ZERO_LEAF,
};
pub use progress::{Progress, ProgressCallback};
pub use regulator::{regulate, ChunkRegulator};
pub use tee::{tee, Tee};
