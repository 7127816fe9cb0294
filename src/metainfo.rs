//! Torrent metainfo creation and parsing ([BEP-3], [BEP-47], [BEP-52]).
//!
//! # Overview
//!
//! A torrent file (`.torrent`) is a bencoded dictionary describing the
//! content being shared:
//! - File names, sizes, and directory structure
//! - Piece hashes (v1) and per-file merkle roots (v2)
//! - Tracker and web seed URLs
//!
//! [`TorrentBuilder`] turns files and directories into a [`Torrent`], and
//! [`Metainfo`] parses an existing `.torrent` back into typed fields.
//! Inputs are merged into a [`FileTree`] first, which rejects conflicting
//! names before anything is hashed.
//!
//! # Examples
//!
//! ## Building a torrent
//!
//! ```
//! use torrentkit::fs::{MemoryDirectory, MemoryFile};
//! use torrentkit::metainfo::{Metainfo, TorrentBuilder, TorrentVersion};
//!
//! # futures::executor::block_on(async {
//! let torrent = TorrentBuilder::new()
//!     .version(TorrentVersion::Hybrid)
//!     .add(
//!         MemoryDirectory::new("photos")
//!             .with_file(MemoryFile::new("a.jpg", vec![1u8; 40000]))
//!             .with_file(MemoryFile::new("b.jpg", vec![2u8; 100])),
//!     )
//!     .announce("http://tracker.example.com/announce")
//!     .build()
//!     .await
//!     .unwrap();
//!
//! let encoded = torrent.encode().unwrap();
//! let parsed = Metainfo::from_bytes(&encoded.bytes).unwrap();
//! assert_eq!(parsed.info.name, "photos");
//! assert_eq!(parsed.info_hash, encoded.info_hash);
//! # });
//! ```
//!
//! ## Parsing a torrent file
//!
//! ```no_run
//! use torrentkit::metainfo::Metainfo;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = std::fs::read("example.torrent")?;
//! let torrent = Metainfo::from_bytes(&data)?;
//!
//! println!("Name: {}", torrent.info.name);
//! println!("Info hash: {}", torrent.info_hash);
//! println!("Total size: {} bytes", torrent.info.total_length);
//!
//! for file in torrent.info.files.iter().filter(|f| !f.is_padding()) {
//!     println!("  {} ({} bytes)", file.path.display(), file.length);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Working with info hashes
//!
//! ```
//! use torrentkit::metainfo::InfoHash;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let hash = InfoHash::from_hex("c12fe1c06bba254a9dc9f519b335aa7c1367a88a")?;
//! assert!(hash.is_v1());
//! assert_eq!(hash.as_bytes().len(), 20);
//! # Ok(())
//! # }
//! ```
//!
//! [BEP-3]: http://bittorrent.org/beps/bep_0003.html
//! [BEP-47]: http://bittorrent.org/beps/bep_0047.html
//! [BEP-52]: http://bittorrent.org/beps/bep_0052.html

mod builder;
mod error;
mod file_tree;
mod info_hash;
mod torrent;

pub use builder::{TorrentBuilder, BLOCK_LENGTH, META_VERSION};
pub use error::MetainfoError;
pub use file_tree::{FileNode, FileTree, FileTreeError, Files, Node, NodeId, NodeKind};
pub use info_hash::InfoHash;
pub use torrent::{EncodedTorrent, File, Info, Metainfo, Torrent, TorrentVersion};

#[cfg(test)]
mod tests;
