use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use uuid::Uuid;

use super::{
    ByteStream, DirectoryEntry, DirectoryHandle, DirectoryReader, EntryStream, FileAttributes,
    FileDirLike, FileEntry, FileHandle, FileSource,
};

/// A file held in memory.
///
/// Clones share content and identity, so submitting a clone through a file
/// handle is recognized as the same file.
#[derive(Debug, Clone)]
pub struct MemoryFile {
    name: String,
    relative_path: Option<String>,
    identity: String,
    data: Bytes,
    attributes: FileAttributes,
    chunk_size: Option<usize>,
}

impl MemoryFile {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            relative_path: None,
            identity: Uuid::new_v4().to_string(),
            data: data.into(),
            attributes: FileAttributes::default(),
            chunk_size: None,
        }
    }

    /// Creates a file placed at `path` (segments joined by `/`). The name is
    /// the last segment.
    ///
    /// ```
    /// use torrentkit::fs::{FileSource, MemoryFile};
    ///
    /// let file = MemoryFile::at_path("music/album/track.flac", vec![0u8; 4]);
    /// assert_eq!(file.name(), "track.flac");
    /// assert_eq!(file.relative_path(), Some("music/album/track.flac"));
    /// ```
    pub fn at_path(path: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let path = path.into();
        let name = path.rsplit('/').next().unwrap_or_default().to_string();
        let mut file = Self::new(name, data);
        file.relative_path = Some(path);
        file
    }

    pub fn with_attributes(mut self, attributes: FileAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Makes `open` deliver the content in chunks of at most `size` bytes
    /// instead of a single chunk.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = Some(size.max(1));
        self
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

#[async_trait]
impl FileSource for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn relative_path(&self) -> Option<&str> {
        self.relative_path.as_deref()
    }

    fn attributes(&self) -> FileAttributes {
        self.attributes
    }

    async fn open(&self) -> io::Result<ByteStream> {
        let data = self.data.clone();
        let chunks: Vec<io::Result<Bytes>> = match self.chunk_size {
            Some(size) => (0..data.len())
                .step_by(size)
                .map(|start| Ok(data.slice(start..(start + size).min(data.len()))))
                .collect(),
            None if data.is_empty() => Vec::new(),
            None => vec![Ok(data)],
        };
        Ok(stream::iter(chunks).boxed())
    }
}

#[async_trait]
impl FileHandle for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn identity(&self) -> &str {
        &self.identity
    }

    async fn get_file(&self) -> io::Result<Arc<dyn FileSource>> {
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl FileEntry for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    async fn file(&self) -> io::Result<Arc<dyn FileSource>> {
        Ok(Arc::new(self.clone()))
    }
}

/// A directory held in memory.
///
/// Works both as a [`DirectoryHandle`] and as a [`DirectoryEntry`]; the
/// latter hands out children in pages of `page_size`.
#[derive(Debug, Clone)]
pub struct MemoryDirectory {
    name: String,
    identity: String,
    children: Vec<FileDirLike>,
    page_size: usize,
}

impl MemoryDirectory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identity: Uuid::new_v4().to_string(),
            children: Vec::new(),
            page_size: 100,
        }
    }

    pub fn with(mut self, child: impl Into<FileDirLike>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn with_file(self, file: MemoryFile) -> Self {
        self.with(FileDirLike::file(file))
    }

    pub fn with_dir(self, dir: MemoryDirectory) -> Self {
        self.with(FileDirLike::directory_handle(dir))
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn children(&self) -> &[FileDirLike] {
        &self.children
    }
}

impl DirectoryHandle for MemoryDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    fn identity(&self) -> &str {
        &self.identity
    }

    fn values(&self) -> EntryStream {
        stream::iter(self.children.clone().into_iter().map(Ok)).boxed()
    }
}

impl DirectoryEntry for MemoryDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    fn reader(&self) -> Box<dyn DirectoryReader> {
        Box::new(MemoryReader {
            children: self.children.clone(),
            position: 0,
            page_size: self.page_size,
        })
    }
}

struct MemoryReader {
    children: Vec<FileDirLike>,
    position: usize,
    page_size: usize,
}

#[async_trait]
impl DirectoryReader for MemoryReader {
    async fn read_entries(&mut self) -> io::Result<Vec<FileDirLike>> {
        let end = (self.position + self.page_size).min(self.children.len());
        let page = self.children[self.position..end].to_vec();
        self.position = end;
        Ok(page)
    }
}
