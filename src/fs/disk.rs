use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use tokio::fs;
use tokio_util::io::ReaderStream;

use super::{
    ByteStream, DirectoryEntry, DirectoryHandle, DirectoryReader, EntryStream, FileAttributes,
    FileDirLike, FileEntry, FileHandle, FileSource,
};

const READ_BUFFER_SIZE: usize = 64 * 1024;
const READ_DIR_PAGE: usize = 64;

fn file_name(path: &Path) -> io::Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("path has no file name: {}", path.display()),
            )
        })
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    false
}

/// A regular file on disk. Size and attributes are read once, on open.
#[derive(Debug, Clone)]
pub struct DiskFile {
    path: PathBuf,
    name: String,
    relative_path: Option<String>,
    size: u64,
    attributes: FileAttributes,
}

impl DiskFile {
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            ));
        }
        let name = file_name(&path)?;
        let attributes = FileAttributes {
            executable: is_executable(&metadata),
            hidden: name.starts_with('.'),
            ..FileAttributes::default()
        };
        Ok(Self {
            path,
            name,
            relative_path: None,
            size: metadata.len(),
            attributes,
        })
    }

    /// Places the file at `relative_path` inside the torrent, segments
    /// joined by `/`.
    pub fn with_relative_path(mut self, relative_path: impl Into<String>) -> Self {
        self.relative_path = Some(relative_path.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FileSource for DiskFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn relative_path(&self) -> Option<&str> {
        self.relative_path.as_deref()
    }

    fn attributes(&self) -> FileAttributes {
        self.attributes
    }

    async fn open(&self) -> io::Result<ByteStream> {
        let file = fs::File::open(&self.path).await?;
        Ok(ReaderStream::with_capacity(file, READ_BUFFER_SIZE).boxed())
    }
}

/// A not-yet-opened path found while walking a [`DiskDirectory`].
///
/// Acts as a file handle: metadata is read when the file is materialized.
#[derive(Debug, Clone)]
pub struct DiskPath {
    path: PathBuf,
    name: String,
    identity: String,
}

impl DiskPath {
    pub fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let name = file_name(&path)?;
        let identity = path.to_string_lossy().into_owned();
        Ok(Self {
            path,
            name,
            identity,
        })
    }
}

#[async_trait]
impl FileHandle for DiskPath {
    fn name(&self) -> &str {
        &self.name
    }

    fn identity(&self) -> &str {
        &self.identity
    }

    async fn get_file(&self) -> io::Result<Arc<dyn FileSource>> {
        Ok(Arc::new(DiskFile::open(&self.path).await?))
    }
}

#[async_trait]
impl FileEntry for DiskPath {
    fn name(&self) -> &str {
        &self.name
    }

    async fn file(&self) -> io::Result<Arc<dyn FileSource>> {
        Ok(Arc::new(DiskFile::open(&self.path).await?))
    }
}

/// A directory on disk.
///
/// Subdirectories come back as [`DiskDirectory`] handles and files as
/// [`DiskPath`] handles. Symbolic links and entries that are neither are
/// skipped.
#[derive(Debug, Clone)]
pub struct DiskDirectory {
    path: PathBuf,
    name: String,
    identity: String,
}

impl DiskDirectory {
    /// Opens a directory, resolving it to its canonical path.
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = fs::canonicalize(path.as_ref()).await?;
        if !fs::metadata(&path).await?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a directory: {}", path.display()),
            ));
        }
        Self::from_canonical(path)
    }

    fn from_canonical(path: PathBuf) -> io::Result<Self> {
        let name = file_name(&path)?;
        let identity = path.to_string_lossy().into_owned();
        Ok(Self {
            path,
            name,
            identity,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn classify(entry: fs::DirEntry) -> io::Result<Option<FileDirLike>> {
    // file_type does not follow symlinks, so a link back to an ancestor is
    // never walked
    let file_type = entry.file_type().await?;
    if file_type.is_dir() {
        let dir = DiskDirectory::from_canonical(entry.path())?;
        Ok(Some(FileDirLike::directory_handle(dir)))
    } else if file_type.is_file() {
        Ok(Some(FileDirLike::file_handle(DiskPath::new(entry.path())?)))
    } else {
        tracing::trace!(path = %entry.path().display(), "skipping symlink or special file");
        Ok(None)
    }
}

impl DirectoryHandle for DiskDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    fn identity(&self) -> &str {
        &self.identity
    }

    fn values(&self) -> EntryStream {
        let path = self.path.clone();
        stream::once(async move { fs::read_dir(path).await })
            .map_ok(|read_dir| {
                stream::try_unfold(read_dir, |mut read_dir| async move {
                    let entry = read_dir.next_entry().await?;
                    Ok::<_, io::Error>(entry.map(|entry| (entry, read_dir)))
                })
            })
            .try_flatten()
            .and_then(classify)
            .try_filter_map(|entry| async move { Ok(entry) })
            .boxed()
    }
}

impl DirectoryEntry for DiskDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    fn reader(&self) -> Box<dyn DirectoryReader> {
        Box::new(DiskReader {
            path: self.path.clone(),
            read_dir: None,
            finished: false,
        })
    }
}

struct DiskReader {
    path: PathBuf,
    read_dir: Option<fs::ReadDir>,
    finished: bool,
}

#[async_trait]
impl DirectoryReader for DiskReader {
    async fn read_entries(&mut self) -> io::Result<Vec<FileDirLike>> {
        if self.finished {
            return Ok(Vec::new());
        }
        if self.read_dir.is_none() {
            self.read_dir = Some(fs::read_dir(&self.path).await?);
        }
        let Some(read_dir) = self.read_dir.as_mut() else {
            return Ok(Vec::new());
        };

        let mut page = Vec::new();
        while page.len() < READ_DIR_PAGE {
            match read_dir.next_entry().await? {
                Some(entry) => page.extend(classify(entry).await?),
                None => {
                    self.finished = true;
                    break;
                }
            }
        }
        Ok(page)
    }
}
