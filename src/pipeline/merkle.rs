use std::io;
use std::sync::OnceLock;

use futures::{pin_mut, Stream, TryStreamExt};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::hasher::Hash256;
use super::progress::Progress;

/// Leaf used past the end of a file's blocks.
pub const ZERO_LEAF: Hash256 = [0u8; 32];

#[derive(Debug, Error)]
pub enum MerkleError {
    #[error("cannot compute a merkle root of no leaves")]
    EmptyLeaves,

    #[error("leaf count {0} is not a power of two")]
    NotPowerOfTwo(usize),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub fn hash_pair(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Root of a binary SHA-256 tree over `leaves`.
///
/// The leaf count must be a power of two. A single leaf is its own root.
///
/// ```
/// use torrentkit::pipeline::{hash_pair, merkle_root};
///
/// let a = [1u8; 32];
/// let b = [2u8; 32];
/// assert_eq!(merkle_root(&[a]).unwrap(), a);
/// assert_eq!(merkle_root(&[a, b]).unwrap(), hash_pair(&a, &b));
/// assert!(merkle_root(&[]).is_err());
/// ```
pub fn merkle_root(leaves: &[Hash256]) -> Result<Hash256, MerkleError> {
    if leaves.is_empty() {
        return Err(MerkleError::EmptyLeaves);
    }
    if !leaves.len().is_power_of_two() {
        return Err(MerkleError::NotPowerOfTwo(leaves.len()));
    }

    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = level
            .chunks_exact(2)
            .map(|pair| hash_pair(&pair[0], &pair[1]))
            .collect();
    }
    Ok(level[0])
}

/// Collects block hashes into groups of `blocks_per_piece` leaves.
///
/// The tail is zero-padded. A file shorter than one piece pads to the next
/// power of two of its block count; a longer file pads only its last group
/// up to `blocks_per_piece`.
#[derive(Debug)]
pub struct LeafGrouper {
    blocks_per_piece: usize,
    count: usize,
    group: Vec<Hash256>,
}

impl LeafGrouper {
    pub fn new(blocks_per_piece: usize) -> Self {
        let blocks_per_piece = blocks_per_piece.max(1);
        Self {
            blocks_per_piece,
            count: 0,
            group: Vec::with_capacity(blocks_per_piece),
        }
    }

    /// Adds a leaf, returning a group once it is full.
    pub fn push(&mut self, leaf: Hash256) -> Option<Vec<Hash256>> {
        self.count += 1;
        self.group.push(leaf);
        if self.group.len() == self.blocks_per_piece {
            return Some(std::mem::replace(
                &mut self.group,
                Vec::with_capacity(self.blocks_per_piece),
            ));
        }
        None
    }

    /// Pads and returns the last partial group, if there is one.
    pub fn finish(&mut self) -> Option<Vec<Hash256>> {
        if self.group.is_empty() {
            return None;
        }
        let target = if self.count < self.blocks_per_piece {
            self.count.next_power_of_two()
        } else {
            self.blocks_per_piece
        };
        let mut group = std::mem::take(&mut self.group);
        group.resize(target, ZERO_LEAF);
        Some(group)
    }
}

/// Root of a piece made entirely of zero blocks, computed on first use.
#[derive(Debug)]
pub struct PadLeaf {
    blocks_per_piece: usize,
    value: OnceLock<Hash256>,
}

impl PadLeaf {
    pub fn new(blocks_per_piece: usize) -> Self {
        Self {
            blocks_per_piece: blocks_per_piece.max(1),
            value: OnceLock::new(),
        }
    }

    pub fn get(&self) -> Result<Hash256, MerkleError> {
        if let Some(value) = self.value.get() {
            return Ok(*value);
        }
        let root = merkle_root(&vec![ZERO_LEAF; self.blocks_per_piece])?;
        Ok(*self.value.get_or_init(|| root))
    }

    pub fn is_computed(&self) -> bool {
        self.value.get().is_some()
    }
}

/// Pads `piece_roots` to a power of two with `pad` and returns the root.
pub fn balanced_root(piece_roots: &[Hash256], pad: &PadLeaf) -> Result<Hash256, MerkleError> {
    if piece_roots.is_empty() {
        return Err(MerkleError::EmptyLeaves);
    }
    let target = piece_roots.len().next_power_of_two();
    if target == piece_roots.len() {
        return merkle_root(piece_roots);
    }
    let mut leaves = piece_roots.to_vec();
    leaves.resize(target, pad.get()?);
    merkle_root(&leaves)
}

/// Per-file result of v2 hashing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMerkle {
    /// Root of the whole file. `None` for an empty file.
    pub pieces_root: Option<Hash256>,
    /// One merkle root per piece.
    pub piece_layer: Vec<Hash256>,
}

/// Consumes a file's block hashes and builds its piece layer and root.
///
/// `progress` ticks once per piece root.
pub async fn file_merkle<S>(
    blocks: S,
    blocks_per_piece: usize,
    progress: Option<&Progress>,
) -> Result<FileMerkle, MerkleError>
where
    S: Stream<Item = io::Result<Hash256>>,
{
    pin_mut!(blocks);
    let mut grouper = LeafGrouper::new(blocks_per_piece);
    let mut piece_layer = Vec::new();

    let mut add_group = |group: Vec<Hash256>| -> Result<(), MerkleError> {
        piece_layer.push(merkle_root(&group)?);
        if let Some(progress) = progress {
            progress.tick();
        }
        Ok(())
    };

    while let Some(leaf) = blocks.try_next().await? {
        if let Some(group) = grouper.push(leaf) {
            add_group(group)?;
        }
    }
    if let Some(group) = grouper.finish() {
        add_group(group)?;
    }

    if piece_layer.is_empty() {
        return Ok(FileMerkle {
            pieces_root: None,
            piece_layer,
        });
    }

    let pad = PadLeaf::new(blocks_per_piece);
    let pieces_root = balanced_root(&piece_layer, &pad)?;
    Ok(FileMerkle {
        pieces_root: Some(pieces_root),
        piece_layer,
    })
}
