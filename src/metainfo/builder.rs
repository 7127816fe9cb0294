//! Torrent builder for creating v1, v2, and hybrid torrents.
//!
//! # Overview
//!
//! [`TorrentBuilder`] collects inputs (anything convertible to a
//! [`FileDirLike`]) and options, then hashes everything in one async call:
//!
//! - **V1**: SHA-1 piece hashes over the concatenated content. With padding
//!   files, every file but the last is padded to a piece boundary.
//! - **V2**: a SHA-256 merkle tree per file over 16 KiB blocks (BEP-52).
//!   Files are hashed concurrently, up to one per available CPU at a time.
//! - **Hybrid**: both, over a single read of each file. Padding is always on.
//!
//! # Examples
//!
//! ## Creating a v1 torrent from files in memory
//!
//! ```
//! use torrentkit::fs::MemoryFile;
//! use torrentkit::metainfo::TorrentBuilder;
//!
//! # futures::executor::block_on(async {
//! let torrent = TorrentBuilder::new()
//!     .add(MemoryFile::new("hello.txt", "Hello world"))
//!     .announce("http://tracker.example.com/announce")
//!     .build()
//!     .await
//!     .unwrap();
//!
//! assert_eq!(torrent.name(), "hello.txt");
//! let info = torrent.info().unwrap();
//! assert_eq!(info.get(b"length").and_then(|v| v.as_integer()), Some(11));
//! # });
//! ```
//!
//! ## Creating a hybrid torrent from a directory on disk
//!
//! ```no_run
//! use torrentkit::fs::DiskDirectory;
//! use torrentkit::metainfo::{TorrentBuilder, TorrentVersion};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let torrent = TorrentBuilder::new()
//!     .version(TorrentVersion::Hybrid)
//!     .add(DiskDirectory::open("path/to/album").await?)
//!     .piece_length(262144)
//!     .private(true)
//!     .comment("Created with torrentkit")
//!     .on_progress(|current, total| println!("{current}/{total}"))
//!     .build()
//!     .await?;
//!
//! let encoded = torrent.encode()?;
//! tokio::fs::write("album.torrent", &encoded.bytes).await?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::io;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use futures::TryFutureExt;
use uuid::Uuid;

use super::error::MetainfoError;
use super::file_tree::{FileTree, NodeId, NodeKind};
use super::torrent::{Torrent, TorrentVersion};
use crate::bencode::Value;
use crate::fs::{FileAttributes, FileDirLike, FileSource};
use crate::pipeline::{
    concat, concat_files, file_merkle, hash_blocks, hash_pieces, regulate, tee, FileMerkle,
    Hash256, PieceHash, Progress, ProgressCallback, Tee,
};

/// Merkle leaf size mandated by BEP-52 (16 KiB).
pub const BLOCK_LENGTH: u64 = 16384;

/// The only `meta version` this crate writes.
pub const META_VERSION: i64 = 2;

/// Chunks buffered per branch while teeing a file for hybrid hashing.
const TEE_CAPACITY: usize = 16;

type PieceLayers = BTreeMap<Hash256, Vec<Hash256>>;

type Dict = BTreeMap<Bytes, Value>;

/// A file to hash, in tree order.
struct Input {
    id: NodeId,
    source: Arc<dyn FileSource>,
}

/// Builder for creating torrents.
///
/// Supports v1, v2, and hybrid torrents with a fluent API.
pub struct TorrentBuilder {
    /// Torrent version to create.
    version: TorrentVersion,
    /// Files and directories to include.
    inputs: Vec<FileDirLike>,
    /// v2 merkle leaf size; v1 pieces never go below it when auto-sized.
    block_length: u64,
    /// Piece length in bytes; derived from the total size when unset.
    piece_length: Option<u64>,
    /// Align every v1 file but the last to a piece boundary.
    add_padding_files: bool,
    /// Order v1 files by name instead of arrival. Always on for v2.
    sort_files: bool,
    /// Whether this is a private torrent.
    private: bool,
    meta_version: i64,
    /// Torrent name; derived from the inputs when unset.
    name: Option<String>,
    comment: Option<String>,
    /// Primary tracker URL.
    announce: Option<String>,
    /// Tracker tiers (BEP-12).
    announce_list: Vec<Vec<String>>,
    source: Option<String>,
    /// Web seed URLs (BEP-19).
    url_list: Vec<String>,
    add_created_by: bool,
    add_creation_date: bool,
    /// Creator string, replacing the crate's own.
    created_by: Option<String>,
    /// Creation timestamp (defaults to now).
    creation_date: Option<i64>,
    on_progress: Option<ProgressCallback>,
}

impl Default for TorrentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TorrentBuilder {
    pub fn new() -> Self {
        Self {
            version: TorrentVersion::V1,
            inputs: Vec::new(),
            block_length: BLOCK_LENGTH,
            piece_length: None,
            add_padding_files: false,
            sort_files: true,
            private: false,
            meta_version: META_VERSION,
            name: None,
            comment: None,
            announce: None,
            announce_list: Vec::new(),
            source: None,
            url_list: Vec::new(),
            add_created_by: true,
            add_creation_date: true,
            created_by: None,
            creation_date: None,
            on_progress: None,
        }
    }

    /// Sets the torrent version (V1, V2, or Hybrid).
    pub fn version(mut self, version: TorrentVersion) -> Self {
        self.version = version;
        self
    }

    /// Sets the merkle block length.
    ///
    /// BEP-52 fixes this at 16 KiB; other values produce torrents that v2
    /// clients will reject.
    pub fn block_length(mut self, length: u64) -> Self {
        self.block_length = length;
        self
    }

    /// Sets the piece length in bytes.
    ///
    /// For v2 and hybrid torrents, this must be a power of two no smaller
    /// than the block length. When unset, it is derived from the total size
    /// as `max(block length, next_power_of_two(total / 1024))`.
    pub fn piece_length(mut self, length: u64) -> Self {
        self.piece_length = Some(length);
        self
    }

    /// Inserts padding files so each v1 file starts on a piece boundary.
    /// Hybrid torrents are always padded.
    pub fn add_padding_files(mut self, enabled: bool) -> Self {
        self.add_padding_files = enabled;
        self
    }

    /// Keeps v1 files in arrival order when disabled. Ignored for v2 and
    /// hybrid torrents, whose file trees are always sorted.
    pub fn sort_files(mut self, enabled: bool) -> Self {
        self.sort_files = enabled;
        self
    }

    pub fn private(mut self, private: bool) -> Self {
        self.private = private;
        self
    }

    /// Sets `meta version`. Only [`META_VERSION`] is accepted.
    pub fn meta_version(mut self, version: i64) -> Self {
        self.meta_version = version;
        self
    }

    /// Sets the torrent name.
    ///
    /// Without one, a single top-level file or directory lends its name and
    /// anything else gets a random UUID.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Sets the primary tracker URL.
    pub fn announce(mut self, url: impl Into<String>) -> Self {
        self.announce = Some(url.into());
        self
    }

    /// Replaces the tracker tiers.
    pub fn announce_list(mut self, tiers: Vec<Vec<String>>) -> Self {
        self.announce_list = tiers;
        self
    }

    /// Adds a tracker tier (for multi-tracker torrents).
    pub fn add_tracker_tier(mut self, urls: Vec<String>) -> Self {
        self.announce_list.push(urls);
        self
    }

    /// Sets the `source` info field, which private trackers use to give
    /// cross-seeded torrents distinct info hashes.
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Replaces the web seed URLs.
    pub fn url_list(mut self, urls: Vec<String>) -> Self {
        self.url_list = urls;
        self
    }

    /// Adds a web seed URL (BEP-19).
    pub fn add_web_seed(mut self, url: impl Into<String>) -> Self {
        self.url_list.push(url.into());
        self
    }

    pub fn add_created_by(mut self, enabled: bool) -> Self {
        self.add_created_by = enabled;
        self
    }

    pub fn add_creation_date(mut self, enabled: bool) -> Self {
        self.add_creation_date = enabled;
        self
    }

    pub fn created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    /// Sets the creation date (Unix timestamp).
    pub fn creation_date(mut self, timestamp: i64) -> Self {
        self.creation_date = Some(timestamp);
        self
    }

    /// Registers a callback invoked with `(current, total)` after every
    /// piece hash or piece merkle root. Hybrid torrents count both passes.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(u64, u64) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    /// Adds a file or directory.
    pub fn add(mut self, input: impl Into<FileDirLike>) -> Self {
        self.inputs.push(input.into());
        self
    }

    pub fn add_all<I>(mut self, inputs: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<FileDirLike>,
    {
        self.inputs.extend(inputs.into_iter().map(Into::into));
        self
    }

    /// Hashes every input and assembles the metainfo.
    ///
    /// Options are validated before anything is read.
    pub async fn build(mut self) -> Result<Torrent, MetainfoError> {
        self.validate()?;

        let sorted = self.sort_files || self.version.supports_v2();
        let inputs = std::mem::take(&mut self.inputs);
        let mut tree = FileTree::build(inputs, sorted).await?;
        if tree.file_count() == 0 {
            return Err(MetainfoError::EmptyInput);
        }

        let piece_length = match self.piece_length {
            Some(length) => length,
            None => {
                let length = self
                    .block_length
                    .max((tree.total_size() >> 10).next_power_of_two());
                self.check_piece_length(length)?;
                length
            }
        };
        let (name, common_dir) = self.resolve_name(&tree);
        tracing::debug!(
            %name,
            piece_length,
            total_size = tree.total_size(),
            files = tree.file_count(),
            version = ?self.version,
            "building torrent"
        );

        let inputs: Vec<Input> = tree
            .files()
            .map(|(id, _, source)| Input {
                id,
                source: source.clone(),
            })
            .collect();
        let per_file_pieces: u64 = tree
            .files()
            .map(|(_, file, _)| file.length.div_ceil(piece_length))
            .sum();

        let mut info = Dict::new();
        info.insert(Bytes::from_static(b"name"), Value::from(name.as_str()));
        info.insert(Bytes::from_static(b"piece length"), Value::from(piece_length));
        if self.private {
            info.insert(Bytes::from_static(b"private"), Value::Integer(1));
        }
        if let Some(source) = &self.source {
            info.insert(Bytes::from_static(b"source"), Value::from(source.as_str()));
        }

        let mut piece_layers = None;
        match self.version {
            TorrentVersion::V1 => {
                let padding = self.add_padding_files;
                let total = if padding {
                    per_file_pieces
                } else {
                    tree.total_size().div_ceil(piece_length)
                };
                let progress = Progress::new(total, self.on_progress.clone());
                let pieces = hash_v1(inputs, piece_length, padding, progress).await?;
                add_v1_fields(&mut info, &tree, common_dir, piece_length, padding, &pieces);
            }
            TorrentVersion::V2 => {
                let progress = Progress::new(per_file_pieces, self.on_progress.clone());
                let merkles = hash_v2(inputs, piece_length, self.block_length, progress).await?;
                piece_layers = Some(apply_merkles(&mut tree, merkles, piece_length));
                add_v2_fields(&mut info, &tree, common_dir);
            }
            TorrentVersion::Hybrid => {
                let progress = Progress::new(per_file_pieces * 2, self.on_progress.clone());
                let hashed = hash_hybrid(inputs, piece_length, self.block_length, progress).await?;
                let mut pieces = Vec::new();
                let mut merkles = Vec::with_capacity(hashed.len());
                for (id, file_pieces, merkle) in hashed {
                    pieces.extend(file_pieces);
                    merkles.push((id, merkle));
                }
                piece_layers = Some(apply_merkles(&mut tree, merkles, piece_length));
                add_v1_fields(&mut info, &tree, common_dir, piece_length, true, &pieces);
                add_v2_fields(&mut info, &tree, common_dir);
            }
        }

        let mut root = self.common_fields();
        root.insert(Bytes::from_static(b"info"), Value::Dict(info));
        if let Some(layers) = piece_layers {
            root.insert(
                Bytes::from_static(b"piece layers"),
                encode_piece_layers(&layers),
            );
        }

        Ok(Torrent {
            version: self.version,
            name,
            piece_length,
            total_size: tree.total_size(),
            file_count: tree.file_count(),
            value: Value::Dict(root),
        })
    }

    /// Validates the builder configuration.
    fn validate(&self) -> Result<(), MetainfoError> {
        if self.inputs.is_empty() {
            return Err(MetainfoError::EmptyInput);
        }
        if self.meta_version != META_VERSION {
            return Err(MetainfoError::InvalidField("meta version"));
        }
        if self.block_length == 0
            || (self.version.supports_v2() && !self.block_length.is_power_of_two())
        {
            return Err(MetainfoError::InvalidBlockLength(self.block_length));
        }
        if let Some(piece_length) = self.piece_length {
            self.check_piece_length(piece_length)?;
        }
        Ok(())
    }

    /// v2 layouts need power-of-two pieces of whole blocks; v1 only warns.
    fn check_piece_length(&self, piece_length: u64) -> Result<(), MetainfoError> {
        if piece_length == 0 {
            return Err(MetainfoError::PieceLengthNotPowerOfTwo(0));
        }
        if self.version.supports_v2() {
            if piece_length < self.block_length {
                return Err(MetainfoError::PieceLengthTooSmall {
                    piece_length,
                    block_length: self.block_length,
                });
            }
            if !piece_length.is_power_of_two() {
                return Err(MetainfoError::PieceLengthNotPowerOfTwo(piece_length));
            }
        } else if !piece_length.is_power_of_two() {
            tracing::warn!(piece_length, "piece length is not a power of two");
        }
        Ok(())
    }

    /// Picks the torrent name and the directory whose name it borrowed.
    ///
    /// Paths inside the torrent are relative to that directory.
    fn resolve_name(&self, tree: &FileTree) -> (String, Option<NodeId>) {
        let (default_name, common_dir) = match tree.single_root_entry() {
            Some(id) => {
                let common_dir = match tree.node(id).kind() {
                    NodeKind::Directory => Some(id),
                    NodeKind::File => None,
                };
                (tree.name(id).to_string(), common_dir)
            }
            None => (Uuid::new_v4().to_string(), None),
        };
        (self.name.clone().unwrap_or(default_name), common_dir)
    }

    /// Fields outside `info`.
    fn common_fields(&self) -> Dict {
        let mut root = Dict::new();

        let announce_list: Vec<Vec<String>> = self
            .announce_list
            .iter()
            .filter(|tier| !tier.is_empty())
            .cloned()
            .collect();
        let announce = self
            .announce
            .clone()
            .or_else(|| announce_list.first().and_then(|tier| tier.first().cloned()));

        if let Some(announce) = announce {
            root.insert(Bytes::from_static(b"announce"), Value::from(announce));
        }
        if !announce_list.is_empty() {
            let tiers = announce_list
                .into_iter()
                .map(|tier| Value::List(tier.into_iter().map(Value::from).collect()))
                .collect();
            root.insert(Bytes::from_static(b"announce-list"), Value::List(tiers));
        }

        if let Some(comment) = &self.comment {
            root.insert(Bytes::from_static(b"comment"), Value::from(comment.as_str()));
        }

        if self.add_created_by {
            let created_by = self
                .created_by
                .clone()
                .unwrap_or_else(|| format!("torrentkit/{}", env!("CARGO_PKG_VERSION")));
            root.insert(Bytes::from_static(b"created by"), Value::from(created_by));
        }

        if self.add_creation_date {
            let timestamp = self.creation_date.unwrap_or_else(|| {
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs() as i64)
                    .unwrap_or(0)
            });
            root.insert(Bytes::from_static(b"creation date"), Value::Integer(timestamp));
        }

        if !self.url_list.is_empty() {
            let urls = self.url_list.iter().map(|url| Value::from(url.as_str())).collect();
            root.insert(Bytes::from_static(b"url-list"), Value::List(urls));
        }

        root
    }
}

fn to_usize(length: u64, field: &'static str) -> Result<usize, MetainfoError> {
    usize::try_from(length).map_err(|_| MetainfoError::InvalidField(field))
}

/// SHA-1 over the files in order.
///
/// With padding each file is regulated on its own, so its last piece is
/// zero-filled unless it is the final file; without padding the files are
/// read as one continuous stream.
async fn hash_v1(
    inputs: Vec<Input>,
    piece_length: u64,
    padding: bool,
    progress: Progress,
) -> Result<Vec<PieceHash>, MetainfoError> {
    let piece_length = to_usize(piece_length, "piece length")?;
    let sources: Vec<Arc<dyn FileSource>> = inputs.into_iter().map(|input| input.source).collect();

    let pieces: Vec<PieceHash> = if padding {
        let last = sources.len().saturating_sub(1);
        let per_file = stream::iter(sources.into_iter().enumerate()).then(move |(index, source)| {
            let progress = progress.clone();
            async move {
                tracing::debug!(name = source.name(), "hashing v1 pieces");
                let content = source.open().await?;
                Ok::<_, io::Error>(hash_pieces(
                    regulate(content, piece_length, index != last),
                    Some(progress),
                ))
            }
        });
        concat(per_file).try_collect().await?
    } else {
        let content = concat_files(sources);
        hash_pieces(regulate(content, piece_length, false), Some(progress))
            .try_collect()
            .await?
    };
    Ok(pieces)
}

/// Number of files hashed at once. Each one holds an open file handle.
pub(crate) fn file_concurrency() -> usize {
    std::thread::available_parallelism().map_or(4, NonZeroUsize::get)
}

/// Merkle trees of every file, computed concurrently.
async fn hash_v2(
    inputs: Vec<Input>,
    piece_length: u64,
    block_length: u64,
    progress: Progress,
) -> Result<Vec<(NodeId, FileMerkle)>, MetainfoError> {
    let block = to_usize(block_length, "block length")?;
    let blocks_per_piece = to_usize(piece_length / block_length, "piece length")?;

    stream::iter(inputs)
        .map(|Input { id, source }| {
            let progress = progress.clone();
            async move {
                tracing::debug!(name = source.name(), "hashing v2 merkle tree");
                let content = source.open().await?;
                let blocks = hash_blocks(regulate(content, block, false));
                let merkle = file_merkle(blocks, blocks_per_piece, Some(&progress)).await?;
                Ok::<_, MetainfoError>((id, merkle))
            }
        })
        .buffered(file_concurrency())
        .try_collect()
        .await
}

/// v1 pieces and the v2 merkle tree of every file from a single read each.
async fn hash_hybrid(
    inputs: Vec<Input>,
    piece_length: u64,
    block_length: u64,
    progress: Progress,
) -> Result<Vec<(NodeId, Vec<PieceHash>, FileMerkle)>, MetainfoError> {
    let piece = to_usize(piece_length, "piece length")?;
    let block = to_usize(block_length, "block length")?;
    let blocks_per_piece = to_usize(piece_length / block_length, "piece length")?;
    let last = inputs.len().saturating_sub(1);

    stream::iter(inputs.into_iter().enumerate())
        .map(|(index, Input { id, source })| {
            let progress = progress.clone();
            async move {
                tracing::debug!(name = source.name(), "hashing v1 pieces and v2 merkle tree");
                let Tee { pump, left, right } = tee(source.open().await?, TEE_CAPACITY);

                let pieces = hash_pieces(regulate(left, piece, index != last), Some(progress.clone()))
                    .try_collect::<Vec<_>>()
                    .map_err(MetainfoError::from);
                let blocks = hash_blocks(regulate(right, block, false));
                let merkle = file_merkle(blocks, blocks_per_piece, Some(&progress))
                    .map_err(MetainfoError::from);

                let ((), pieces, merkle) =
                    futures::try_join!(pump.map_err(MetainfoError::from), pieces, merkle)?;
                Ok::<_, MetainfoError>((id, pieces, merkle))
            }
        })
        .buffered(file_concurrency())
        .try_collect()
        .await
}

/// Stores pieces roots on the tree and collects the piece layers of files
/// longer than one piece.
fn apply_merkles(
    tree: &mut FileTree,
    merkles: Vec<(NodeId, FileMerkle)>,
    piece_length: u64,
) -> PieceLayers {
    let mut layers = PieceLayers::new();
    for (id, merkle) in merkles {
        let Some(root) = merkle.pieces_root else {
            continue;
        };
        tree.set_pieces_root(id, root);
        let length = tree.file(id).map_or(0, |file| file.length);
        if length > piece_length {
            layers.insert(root, merkle.piece_layer);
        }
    }
    layers
}

fn add_v1_fields(
    info: &mut Dict,
    tree: &FileTree,
    common_dir: Option<NodeId>,
    piece_length: u64,
    padding: bool,
    pieces: &[PieceHash],
) {
    info.insert(Bytes::from_static(b"pieces"), Value::from(pieces.concat()));

    let single_file = tree
        .single_root_entry()
        .is_some_and(|id| tree.node(id).kind() == NodeKind::File);
    if single_file {
        info.insert(Bytes::from_static(b"length"), Value::from(tree.total_size()));
        return;
    }

    let skip = usize::from(common_dir.is_some());
    let count = tree.file_count();
    let mut files = Vec::with_capacity(count);
    for (index, (id, file, _)) in tree.files().enumerate() {
        let path: Vec<Value> = tree.path(id)[skip..].iter().map(|s| Value::from(*s)).collect();
        files.push(file_entry(file.length, file.attributes, path));

        let remainder = file.length % piece_length;
        if padding && index + 1 < count && remainder != 0 {
            let size = piece_length - remainder;
            let path = vec![Value::from(".pad"), Value::from(size.to_string())];
            files.push(file_entry(size, FileAttributes::PADDING, path));
        }
    }
    info.insert(Bytes::from_static(b"files"), Value::List(files));
}

fn file_entry(length: u64, attributes: FileAttributes, path: Vec<Value>) -> Value {
    let mut entry = Dict::new();
    entry.insert(Bytes::from_static(b"length"), Value::from(length));
    entry.insert(Bytes::from_static(b"path"), Value::List(path));
    if let Some(attr) = attributes.to_attr_string() {
        entry.insert(Bytes::from_static(b"attr"), Value::from(attr));
    }
    Value::Dict(entry)
}

fn add_v2_fields(info: &mut Dict, tree: &FileTree, common_dir: Option<NodeId>) {
    info.insert(Bytes::from_static(b"meta version"), Value::Integer(META_VERSION));
    let root = common_dir.unwrap_or(tree.root());
    info.insert(Bytes::from_static(b"file tree"), tree.to_value(root));
}

/// Encodes piece layers to bencode value.
fn encode_piece_layers(layers: &PieceLayers) -> Value {
    let mut dict = Dict::new();
    for (root, hashes) in layers {
        dict.insert(Bytes::copy_from_slice(root), Value::from(hashes.concat()));
    }
    Value::Dict(dict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::decode;
    use crate::fs::{DiskDirectory, MemoryDirectory, MemoryFile};
    use crate::metainfo::Metainfo;
    use crate::pipeline::{hash_block, hash_pair, hash_piece, ZERO_LEAF};
    use crate::fs::ByteStream;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn info(torrent: &Torrent) -> &Dict {
        torrent.info().and_then(|v| v.as_dict()).unwrap()
    }

    fn pieces(torrent: &Torrent) -> Vec<u8> {
        info(torrent)
            .get(b"pieces".as_slice())
            .and_then(|v| v.as_bytes())
            .unwrap()
            .to_vec()
    }

    fn reparse(torrent: &Torrent) -> Metainfo {
        Metainfo::from_bytes(&torrent.encode().unwrap().bytes).unwrap()
    }

    #[tokio::test]
    async fn test_builder_v1_single_file() {
        let torrent = TorrentBuilder::new()
            .add(MemoryFile::new("hello.txt", "Hello world"))
            .build()
            .await
            .unwrap();

        let info = info(&torrent);
        assert_eq!(info.get(b"length".as_slice()), Some(&Value::Integer(11)));
        assert_eq!(info.get(b"name".as_slice()).and_then(|v| v.as_str()), Some("hello.txt"));
        assert_eq!(pieces(&torrent), hash_piece(b"Hello world").to_vec());
        assert!(info.get(b"files".as_slice()).is_none());
        assert_eq!(torrent.piece_length(), BLOCK_LENGTH);
    }

    #[tokio::test]
    async fn test_builder_v1_padding_files() {
        let first = vec![1u8; 20000];
        let second = vec![2u8; 20000];
        let torrent = TorrentBuilder::new()
            .add(MemoryFile::new("a.bin", first.clone()).with_chunk_size(3000))
            .add(MemoryFile::new("b.bin", second.clone()))
            .piece_length(16384)
            .add_padding_files(true)
            .build()
            .await
            .unwrap();

        let mut padded = first[16384..].to_vec();
        padded.resize(16384, 0);
        let expected = [
            hash_piece(&first[..16384]),
            hash_piece(&padded),
            hash_piece(&second[..16384]),
            hash_piece(&second[16384..]),
        ]
        .concat();
        assert_eq!(pieces(&torrent), expected);

        let metainfo = reparse(&torrent);
        let files = &metainfo.info.files;
        assert_eq!(files.len(), 3);
        assert!(files[1].is_padding());
        assert_eq!(files[1].length, 16384 - 20000 % 16384);
        assert!(files[1].path.ends_with(".pad/12768"));
        assert_eq!(files[2].offset, 32768);
        assert_eq!(metainfo.info.total_length, 52768);
    }

    #[tokio::test]
    async fn test_builder_v1_without_padding_hashes_across_files() {
        let torrent = TorrentBuilder::new()
            .add(MemoryFile::new("a", "abc"))
            .add(MemoryFile::new("b", "defgh"))
            .piece_length(4)
            .block_length(4)
            .build()
            .await
            .unwrap();

        let expected = [hash_piece(b"abcd"), hash_piece(b"efgh")].concat();
        assert_eq!(pieces(&torrent), expected);
        assert!(Uuid::parse_str(torrent.name()).is_ok());
    }

    #[tokio::test]
    async fn test_builder_v1_unsorted_keeps_arrival_order() {
        let torrent = TorrentBuilder::new()
            .name("mixed")
            .add(MemoryFile::new("zeta", "z"))
            .add(MemoryFile::new("alpha", "a"))
            .sort_files(false)
            .build()
            .await
            .unwrap();

        let metainfo = reparse(&torrent);
        let names: Vec<String> = metainfo
            .info
            .files
            .iter()
            .map(|f| f.path.display().to_string())
            .collect();
        assert_eq!(names, ["mixed/zeta", "mixed/alpha"]);
        assert_eq!(pieces(&torrent), hash_piece(b"za").to_vec());
    }

    #[tokio::test]
    async fn test_builder_v2_small_file() {
        let torrent = TorrentBuilder::new()
            .version(TorrentVersion::V2)
            .add(MemoryFile::new("small.txt", "tiny content"))
            .build()
            .await
            .unwrap();

        let layers = torrent.value().get(b"piece layers").and_then(|v| v.as_dict()).unwrap();
        assert!(layers.is_empty());

        let metainfo = reparse(&torrent);
        assert!(metainfo.is_v2());
        assert_eq!(metainfo.info.meta_version, Some(2));
        assert_eq!(metainfo.info.files.len(), 1);
        assert_eq!(metainfo.info.files[0].path.to_str(), Some("small.txt"));
        assert_eq!(
            metainfo.info.files[0].pieces_root,
            Some(hash_block(b"tiny content"))
        );
    }

    #[tokio::test]
    async fn test_builder_v2_piece_layers() {
        let data: Vec<u8> = (0..40000u32).map(|i| (i % 251) as u8).collect();
        let torrent = TorrentBuilder::new()
            .version(TorrentVersion::V2)
            .add(MemoryFile::new("big.bin", data.clone()).with_chunk_size(5000))
            .piece_length(32768)
            .build()
            .await
            .unwrap();

        let blocks: Vec<Hash256> = data.chunks(16384).map(hash_block).collect();
        let p0 = hash_pair(&blocks[0], &blocks[1]);
        let p1 = hash_pair(&blocks[2], &ZERO_LEAF);
        let root = hash_pair(&p0, &p1);

        let metainfo = reparse(&torrent);
        assert_eq!(metainfo.info.files[0].pieces_root, Some(root));
        assert_eq!(metainfo.piece_layers.get(&root), Some(&vec![p0, p1]));
        assert!(metainfo.info.pieces.is_empty());
    }

    #[tokio::test]
    async fn test_builder_v2_identical_files_share_layer() {
        let data = vec![9u8; 40000];
        let torrent = TorrentBuilder::new()
            .version(TorrentVersion::V2)
            .add(MemoryFile::new("one", data.clone()))
            .add(MemoryFile::new("two", data))
            .build()
            .await
            .unwrap();

        let metainfo = reparse(&torrent);
        assert_eq!(metainfo.piece_layers.len(), 1);
        assert_eq!(
            metainfo.info.files[0].pieces_root,
            metainfo.info.files[1].pieces_root
        );
    }

    #[tokio::test]
    async fn test_builder_hybrid_empty_file() {
        let torrent = TorrentBuilder::new()
            .version(TorrentVersion::Hybrid)
            .add(MemoryFile::new("empty", Bytes::new()))
            .build()
            .await
            .unwrap();

        assert!(pieces(&torrent).is_empty());
        let tree = info(&torrent).get(b"file tree".as_slice()).unwrap();
        let leaf = tree.get(b"empty").and_then(|node| node.get(b"")).unwrap();
        assert_eq!(leaf.get(b"length"), Some(&Value::Integer(0)));
        assert!(leaf.get(b"pieces root").is_none());

        let metainfo = reparse(&torrent);
        assert!(metainfo.is_hybrid());
        assert!(metainfo.piece_layers.is_empty());
    }

    #[tokio::test]
    async fn test_builder_hybrid_matches_v1_and_v2() {
        fn album() -> MemoryDirectory {
            MemoryDirectory::new("album")
                .with_file(MemoryFile::new("b.bin", vec![2u8; 20000]).with_chunk_size(777))
                .with_file(MemoryFile::new("a.bin", vec![1u8; 20000]))
        }
        let build = |version: TorrentVersion| async move {
            TorrentBuilder::new()
                .version(version)
                .add(album())
                .piece_length(16384)
                .add_padding_files(true)
                .build()
                .await
                .unwrap()
        };

        let v1 = build(TorrentVersion::V1).await;
        let v2 = build(TorrentVersion::V2).await;
        let hybrid = build(TorrentVersion::Hybrid).await;

        assert_eq!(pieces(&hybrid), pieces(&v1));
        assert_eq!(
            info(&hybrid).get(b"file tree".as_slice()),
            info(&v2).get(b"file tree".as_slice())
        );
        assert_eq!(
            info(&hybrid).get(b"files".as_slice()),
            info(&v1).get(b"files".as_slice())
        );
        assert_eq!(hybrid.name(), "album");

        let metainfo = reparse(&hybrid);
        let real: Vec<_> = metainfo.info.files.iter().filter(|f| !f.is_padding()).collect();
        assert_eq!(real.len(), 2);
        assert!(real.iter().all(|f| f.pieces_root.is_some()));
        assert_eq!(real[0].path.display().to_string(), "album/a.bin");
        assert!(metainfo.info_hash.is_hybrid());
    }

    #[tokio::test]
    async fn test_builder_progress_counts() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        TorrentBuilder::new()
            .version(TorrentVersion::Hybrid)
            .add(MemoryFile::new("a", vec![0u8; 20000]))
            .add(MemoryFile::new("b", vec![0u8; 20000]))
            .piece_length(16384)
            .on_progress(move |current, total| sink.lock().push((current, total)))
            .build()
            .await
            .unwrap();

        let calls = calls.lock();
        assert_eq!(calls.len(), 8);
        assert!(calls.iter().all(|&(_, total)| total == 8));
        assert_eq!(calls.last(), Some(&(8, 8)));
    }

    #[tokio::test]
    async fn test_builder_progress_v1_unpadded_total() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        TorrentBuilder::new()
            .add(MemoryFile::new("a", vec![0u8; 20000]))
            .add(MemoryFile::new("b", vec![0u8; 20000]))
            .piece_length(16384)
            .on_progress(move |current, total| sink.lock().push((current, total)))
            .build()
            .await
            .unwrap();

        assert_eq!(*calls.lock(), vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[tokio::test]
    async fn test_builder_rejects_bad_piece_lengths() {
        let build = |version: TorrentVersion, piece_length: u64| {
            TorrentBuilder::new()
                .version(version)
                .add(MemoryFile::new("f", "data"))
                .piece_length(piece_length)
                .build()
        };

        assert!(matches!(
            build(TorrentVersion::V2, 8192).await,
            Err(MetainfoError::PieceLengthTooSmall {
                piece_length: 8192,
                block_length: BLOCK_LENGTH
            })
        ));
        assert!(matches!(
            build(TorrentVersion::Hybrid, 30000).await,
            Err(MetainfoError::PieceLengthNotPowerOfTwo(30000))
        ));
        assert!(matches!(
            build(TorrentVersion::V1, 0).await,
            Err(MetainfoError::PieceLengthNotPowerOfTwo(0))
        ));
        // v1 only warns
        assert!(build(TorrentVersion::V1, 30000).await.is_ok());
    }

    #[tokio::test]
    async fn test_builder_rejects_bad_options() {
        assert!(matches!(
            TorrentBuilder::new().build().await,
            Err(MetainfoError::EmptyInput)
        ));
        assert!(matches!(
            TorrentBuilder::new().add(MemoryDirectory::new("empty")).build().await,
            Err(MetainfoError::EmptyInput)
        ));
        assert!(matches!(
            TorrentBuilder::new()
                .version(TorrentVersion::V2)
                .block_length(10000)
                .add(MemoryFile::new("f", "x"))
                .build()
                .await,
            Err(MetainfoError::InvalidBlockLength(10000))
        ));
        assert!(matches!(
            TorrentBuilder::new()
                .meta_version(3)
                .add(MemoryFile::new("f", "x"))
                .build()
                .await,
            Err(MetainfoError::InvalidField("meta version"))
        ));
    }

    #[tokio::test]
    async fn test_builder_name_collision_fails() {
        let result = TorrentBuilder::new()
            .add(MemoryFile::new("a", "file"))
            .add(MemoryDirectory::new("a").with_file(MemoryFile::new("x", "y")))
            .build()
            .await;
        assert!(matches!(result, Err(MetainfoError::FileTree(_))));
    }

    #[tokio::test]
    async fn test_builder_common_fields() {
        let torrent = TorrentBuilder::new()
            .add(MemoryFile::new("f", "data"))
            .add_tracker_tier(vec![])
            .add_tracker_tier(vec![
                "http://a.example/announce".to_string(),
                "http://b.example/announce".to_string(),
            ])
            .add_web_seed("http://seed.example/f")
            .comment("Test comment")
            .source("tracker-x")
            .private(true)
            .creation_date(1_700_000_000)
            .build()
            .await
            .unwrap();

        let metainfo = reparse(&torrent);
        assert_eq!(metainfo.announce.as_deref(), Some("http://a.example/announce"));
        assert_eq!(metainfo.announce_list.len(), 1);
        assert_eq!(metainfo.url_list, ["http://seed.example/f"]);
        assert_eq!(metainfo.comment.as_deref(), Some("Test comment"));
        assert_eq!(metainfo.creation_date, Some(1_700_000_000));
        assert_eq!(
            metainfo.created_by,
            Some(format!("torrentkit/{}", env!("CARGO_PKG_VERSION")))
        );
        assert!(metainfo.info.private);
        assert_eq!(metainfo.info.source.as_deref(), Some("tracker-x"));

        let url_list = torrent.value().get(b"url-list").unwrap();
        assert!(url_list.as_list().is_some());
    }

    #[tokio::test]
    async fn test_builder_omits_optional_fields() {
        let torrent = TorrentBuilder::new()
            .add(MemoryFile::new("f", "data"))
            .add_created_by(false)
            .add_creation_date(false)
            .build()
            .await
            .unwrap();

        let root = torrent.value().as_dict().unwrap();
        let keys: Vec<&[u8]> = root.keys().map(|k| k.as_ref()).collect();
        assert_eq!(keys, [b"info".as_slice()]);
        assert!(info(&torrent).get(b"private".as_slice()).is_none());
    }

    #[tokio::test]
    async fn test_builder_info_hash_matches_reparse() {
        let torrent = TorrentBuilder::new()
            .version(TorrentVersion::Hybrid)
            .name("named")
            .add(MemoryFile::at_path("dir/one.txt", "one"))
            .add(MemoryFile::at_path("two.txt", "two"))
            .build()
            .await
            .unwrap();

        let encoded = torrent.encode().unwrap();
        let metainfo = Metainfo::from_bytes(&encoded.bytes).unwrap();
        assert_eq!(metainfo.info_hash, encoded.info_hash);
        assert_eq!(decode(&encoded.bytes).unwrap(), *torrent.value());
        assert_eq!(torrent.name(), "named");
    }

    #[tokio::test]
    async fn test_builder_from_disk_directory() {
        let tmp = TempDir::new().unwrap();
        let album = tmp.path().join("album");
        std::fs::create_dir_all(album.join("disc1")).unwrap();
        std::fs::write(album.join("disc1/track.flac"), vec![3u8; 30000]).unwrap();
        std::fs::write(album.join("cover.jpg"), vec![4u8; 1000]).unwrap();

        let torrent = TorrentBuilder::new()
            .version(TorrentVersion::V2)
            .add(DiskDirectory::open(&album).await.unwrap())
            .build()
            .await
            .unwrap();

        assert_eq!(torrent.name(), "album");
        assert_eq!(torrent.file_count(), 2);
        assert_eq!(torrent.total_size(), 31000);

        let metainfo = reparse(&torrent);
        let paths: Vec<String> = metainfo
            .info
            .files
            .iter()
            .map(|f| f.path.display().to_string())
            .collect();
        assert_eq!(paths, ["album/cover.jpg", "album/disc1/track.flac"]);
        assert_eq!(
            metainfo.info.files[0].pieces_root,
            Some(hash_block(&[4u8; 1000]))
        );
    }

    struct OpenGuard(Arc<AtomicUsize>);

    impl Drop for OpenGuard {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Records how many of its streams are open at the same time.
    struct CountingFile {
        name: String,
        content: Bytes,
        open: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl FileSource for CountingFile {
        fn name(&self) -> &str {
            &self.name
        }

        fn size(&self) -> u64 {
            self.content.len() as u64
        }

        async fn open(&self) -> io::Result<ByteStream> {
            let now = self.open.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let guard = OpenGuard(self.open.clone());
            let chunks: Vec<Bytes> = self.content.chunks(1000).map(|c| self.content.slice_ref(c)).collect();
            Ok(stream::iter(chunks)
                .then(move |chunk| {
                    let _open = &guard;
                    async move {
                        tokio::task::yield_now().await;
                        Ok(chunk)
                    }
                })
                .boxed())
        }
    }

    #[tokio::test]
    async fn test_builder_bounds_open_files() {
        let bound = file_concurrency();
        for version in [TorrentVersion::V2, TorrentVersion::Hybrid] {
            let open = Arc::new(AtomicUsize::new(0));
            let peak = Arc::new(AtomicUsize::new(0));
            let count = bound * 2 + 3;
            let mut builder = TorrentBuilder::new().version(version).name("many");
            for i in 0..count {
                builder = builder.add(FileDirLike::file(CountingFile {
                    name: format!("f{i:03}"),
                    content: Bytes::from(vec![i as u8; 5000]),
                    open: open.clone(),
                    peak: peak.clone(),
                }));
            }

            let torrent = builder.build().await.unwrap();
            assert_eq!(torrent.file_count(), count);
            assert_eq!(open.load(Ordering::SeqCst), 0);
            let peak = peak.load(Ordering::SeqCst);
            assert!(peak >= 1 && peak <= bound, "{version:?}: {peak} open, bound {bound}");
        }
    }
}
