//! torrentkit - Build and parse BitTorrent metainfo
//!
//! This library creates `.torrent` files for BitTorrent v1, v2 and hybrid
//! swarms from any mix of in-memory, on-disk or caller-provided files, with
//! content hashed as a stream.
//!
//! # Modules
//!
//! - [`bencode`] - BEP-3 Bencode encoding/decoding, streaming in both directions
//! - [`fs`] - File and directory sources the builder reads from
//! - [`pipeline`] - Chunking, piece hashing and BEP-52 merkle trees
//! - [`metainfo`] - BEP-3/47/52 torrent building and parsing
//!
//! # Example
//!
//! ```
//! use torrentkit::fs::MemoryFile;
//! use torrentkit::{Metainfo, TorrentBuilder, TorrentVersion};
//!
//! # futures::executor::block_on(async {
//! let torrent = TorrentBuilder::new()
//!     .version(TorrentVersion::V2)
//!     .add(MemoryFile::new("notes.txt", "some notes"))
//!     .build()
//!     .await
//!     .unwrap();
//!
//! let encoded = torrent.encode().unwrap();
//! let parsed = Metainfo::from_bytes(&encoded.bytes).unwrap();
//! assert_eq!(parsed.info.name, "notes.txt");
//! # });
//! ```

pub mod bencode;
pub mod fs;
pub mod metainfo;
pub mod pipeline;

pub use bencode::{decode, encode, BencodeError, Value};
pub use fs::{FileAttributes, FileDirLike, FileSource};
pub use metainfo::{
    EncodedTorrent, FileTree, InfoHash, Metainfo, MetainfoError, Torrent, TorrentBuilder,
    TorrentVersion,
};
pub use pipeline::{Hash256, PieceHash, Progress};
