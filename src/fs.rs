//! File-system capabilities consumed by the torrent builder.
//!
//! The builder never touches paths directly. Everything it hashes comes in
//! through one of five capability shapes, collected in [`FileDirLike`]:
//!
//! | Variant | Shape |
//! |---------|-------|
//! | [`FileDirLike::File`] | a readable file with a name, a size and an optional relative path |
//! | [`FileDirLike::DirectoryHandle`] | a directory whose children arrive as an async stream |
//! | [`FileDirLike::DirectoryEntry`] | a directory read page by page through a [`DirectoryReader`] |
//! | [`FileDirLike::FileHandle`] | a file that must be materialized before its size is known |
//! | [`FileDirLike::FileEntry`] | same as a handle, without an identity to compare |
//!
//! Two adapters ship with the crate: [`MemoryFile`]/[`MemoryDirectory`] keep
//! content in memory, [`DiskFile`]/[`DiskDirectory`] read from disk with tokio.
//!
//! # Examples
//!
//! ```
//! use torrentkit::fs::{FileDirLike, MemoryDirectory, MemoryFile};
//!
//! let docs = MemoryDirectory::new("docs")
//!     .with_file(MemoryFile::new("a.txt", "alpha"))
//!     .with_file(MemoryFile::new("b.txt", "beta"));
//!
//! let input = FileDirLike::directory_handle(docs);
//! assert_eq!(input.name(), "docs");
//! ```

mod disk;
mod memory;

use std::fmt;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

pub use disk::{DiskDirectory, DiskFile, DiskPath};
pub use memory::{MemoryDirectory, MemoryFile};

/// A stream of file content.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// A stream of directory children.
pub type EntryStream = BoxStream<'static, io::Result<FileDirLike>>;

/// [BEP-47] file attributes.
///
/// [BEP-47]: http://bittorrent.org/beps/bep_0047.html
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FileAttributes {
    pub symlink: bool,
    pub executable: bool,
    pub hidden: bool,
    pub padding: bool,
}

impl FileAttributes {
    /// Attributes of a synthetic padding file.
    pub const PADDING: Self = Self {
        symlink: false,
        executable: false,
        hidden: false,
        padding: true,
    };

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Renders the `attr` string, or `None` when no attribute is set.
    ///
    /// ```
    /// use torrentkit::fs::FileAttributes;
    ///
    /// let attrs = FileAttributes { executable: true, hidden: true, ..Default::default() };
    /// assert_eq!(attrs.to_attr_string().as_deref(), Some("xh"));
    /// assert_eq!(FileAttributes::default().to_attr_string(), None);
    /// ```
    pub fn to_attr_string(&self) -> Option<String> {
        let mut attr = String::new();
        if self.symlink {
            attr.push('l');
        }
        if self.executable {
            attr.push('x');
        }
        if self.hidden {
            attr.push('h');
        }
        if self.padding {
            attr.push('p');
        }
        (!attr.is_empty()).then_some(attr)
    }

    /// Parses an `attr` string. Unknown characters are ignored.
    pub fn parse(attr: &[u8]) -> Self {
        let mut attrs = Self::default();
        for c in attr {
            match c {
                b'l' => attrs.symlink = true,
                b'x' => attrs.executable = true,
                b'h' => attrs.hidden = true,
                b'p' => attrs.padding = true,
                _ => {}
            }
        }
        attrs
    }
}

/// A readable file.
///
/// `open` may be called more than once; every call starts a fresh stream
/// from the first byte.
#[async_trait]
pub trait FileSource: Send + Sync {
    fn name(&self) -> &str;

    fn size(&self) -> u64;

    /// Path relative to the directory the file is submitted in (the torrent
    /// root at top level), segments joined by `/`.
    ///
    /// When present, every segment before the last becomes a directory.
    fn relative_path(&self) -> Option<&str> {
        None
    }

    fn attributes(&self) -> FileAttributes {
        FileAttributes::default()
    }

    async fn open(&self) -> io::Result<ByteStream>;
}

/// A directory whose children are enumerated as a stream.
pub trait DirectoryHandle: Send + Sync {
    fn name(&self) -> &str;

    /// Stable identity of the underlying directory. Two handles with the
    /// same identity point at the same directory.
    fn identity(&self) -> &str;

    fn values(&self) -> EntryStream;
}

/// A directory enumerated through a paginated reader.
pub trait DirectoryEntry: Send + Sync {
    fn name(&self) -> &str;

    fn reader(&self) -> Box<dyn DirectoryReader>;
}

/// Reads directory children in batches. An empty batch ends enumeration.
#[async_trait]
pub trait DirectoryReader: Send {
    async fn read_entries(&mut self) -> io::Result<Vec<FileDirLike>>;
}

/// A file that needs an async step before its content is available.
#[async_trait]
pub trait FileHandle: Send + Sync {
    fn name(&self) -> &str;

    /// Stable identity of the underlying file.
    fn identity(&self) -> &str;

    async fn get_file(&self) -> io::Result<Arc<dyn FileSource>>;
}

/// Like [`FileHandle`], without identity.
#[async_trait]
pub trait FileEntry: Send + Sync {
    fn name(&self) -> &str;

    async fn file(&self) -> io::Result<Arc<dyn FileSource>>;
}

/// Any input the file tree builder accepts.
#[derive(Clone)]
pub enum FileDirLike {
    File(Arc<dyn FileSource>),
    DirectoryHandle(Arc<dyn DirectoryHandle>),
    DirectoryEntry(Arc<dyn DirectoryEntry>),
    FileHandle(Arc<dyn FileHandle>),
    FileEntry(Arc<dyn FileEntry>),
}

impl FileDirLike {
    pub fn file(source: impl FileSource + 'static) -> Self {
        FileDirLike::File(Arc::new(source))
    }

    pub fn directory_handle(dir: impl DirectoryHandle + 'static) -> Self {
        FileDirLike::DirectoryHandle(Arc::new(dir))
    }

    pub fn directory_entry(dir: impl DirectoryEntry + 'static) -> Self {
        FileDirLike::DirectoryEntry(Arc::new(dir))
    }

    pub fn file_handle(handle: impl FileHandle + 'static) -> Self {
        FileDirLike::FileHandle(Arc::new(handle))
    }

    pub fn file_entry(entry: impl FileEntry + 'static) -> Self {
        FileDirLike::FileEntry(Arc::new(entry))
    }

    pub fn name(&self) -> &str {
        match self {
            FileDirLike::File(f) => f.name(),
            FileDirLike::DirectoryHandle(d) => d.name(),
            FileDirLike::DirectoryEntry(d) => d.name(),
            FileDirLike::FileHandle(f) => f.name(),
            FileDirLike::FileEntry(f) => f.name(),
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(
            self,
            FileDirLike::DirectoryHandle(_) | FileDirLike::DirectoryEntry(_)
        )
    }
}

impl fmt::Debug for FileDirLike {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            FileDirLike::File(_) => "File",
            FileDirLike::DirectoryHandle(_) => "DirectoryHandle",
            FileDirLike::DirectoryEntry(_) => "DirectoryEntry",
            FileDirLike::FileHandle(_) => "FileHandle",
            FileDirLike::FileEntry(_) => "FileEntry",
        };
        f.debug_tuple(kind).field(&self.name()).finish()
    }
}

impl From<MemoryFile> for FileDirLike {
    fn from(file: MemoryFile) -> Self {
        FileDirLike::file(file)
    }
}

impl From<MemoryDirectory> for FileDirLike {
    fn from(dir: MemoryDirectory) -> Self {
        FileDirLike::directory_handle(dir)
    }
}

impl From<DiskFile> for FileDirLike {
    fn from(file: DiskFile) -> Self {
        FileDirLike::file(file)
    }
}

impl From<DiskDirectory> for FileDirLike {
    fn from(dir: DiskDirectory) -> Self {
        FileDirLike::directory_handle(dir)
    }
}
