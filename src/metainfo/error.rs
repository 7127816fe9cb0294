use thiserror::Error;

use super::file_tree::FileTreeError;
use crate::bencode::BencodeError;
use crate::pipeline::MerkleError;

/// Errors raised while building or parsing torrent metainfo.
#[derive(Debug, Error)]
pub enum MetainfoError {
    /// The metainfo contains invalid bencode.
    #[error("bencode error: {0}")]
    Bencode(#[from] BencodeError),

    /// A merkle tree could not be computed.
    #[error("merkle error: {0}")]
    Merkle(#[from] MerkleError),

    /// The inputs could not be merged into one file tree.
    #[error("file tree error: {0}")]
    FileTree(#[from] FileTreeError),

    /// No files were supplied, or every supplied directory was empty.
    #[error("no input files")]
    EmptyInput,

    #[error("piece length {0} is not a power of two")]
    PieceLengthNotPowerOfTwo(u64),

    #[error("piece length {piece_length} is smaller than the block length {block_length}")]
    PieceLengthTooSmall { piece_length: u64, block_length: u64 },

    #[error("invalid block length {0}")]
    InvalidBlockLength(u64),

    /// A required field is missing from the metainfo.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A field has an invalid value or type.
    #[error("invalid field: {0}")]
    InvalidField(&'static str),

    /// The info hash has an invalid length (must be 20 or 32 bytes).
    #[error("invalid info hash length")]
    InvalidInfoHashLength,

    /// Reading file content failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
