//! Merges heterogeneous inputs into one hierarchical file tree.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. The byte sources
//! behind file nodes and the identities of the handles that created them are
//! kept in side tables keyed by node id, so the nodes themselves stay plain
//! data that can be rendered straight into a `file tree` dictionary.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use thiserror::Error;

use crate::bencode::Value;
use crate::fs::{DirectoryReader, EntryStream, FileAttributes, FileDirLike, FileSource};
use crate::pipeline::Hash256;

/// Errors raised while merging inputs into a [`FileTree`].
#[derive(Debug, Error)]
pub enum FileTreeError {
    #[error("name collision on {name:?}: a {existing} with that name already exists")]
    NameCollision { name: String, existing: NodeKind },

    /// A handle resolved to an entry first registered by a different handle.
    #[error("{name:?} is already registered by a different handle")]
    HandleMismatch { name: String },

    #[error("empty segment in path {0:?}")]
    EmptyPathSegment(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Index of a node in a [`FileTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::File => f.write_str("file"),
            NodeKind::Directory => f.write_str("directory"),
        }
    }
}

/// A file leaf.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileNode {
    pub length: u64,
    pub attributes: FileAttributes,
    /// Set once by v2 hashing, for non-empty files only.
    pub pieces_root: Option<Hash256>,
}

#[derive(Debug, Clone)]
pub enum Node {
    /// Child ids, ordered by name when the tree is sorted, by arrival otherwise.
    Directory(Vec<NodeId>),
    File(FileNode),
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Directory(_) => NodeKind::Directory,
            Node::File(_) => NodeKind::File,
        }
    }
}

#[derive(Debug)]
struct Slot {
    name: String,
    parent: Option<NodeId>,
    node: Node,
}

/// Where the children of the directory on top of the work stack come from.
enum Children {
    Inputs(std::vec::IntoIter<FileDirLike>),
    Stream(EntryStream),
    Reader {
        reader: Box<dyn DirectoryReader>,
        page: VecDeque<FileDirLike>,
        exhausted: bool,
    },
}

impl Children {
    async fn next(&mut self) -> io::Result<Option<FileDirLike>> {
        match self {
            Children::Inputs(inputs) => Ok(inputs.next()),
            Children::Stream(stream) => stream.next().await.transpose(),
            Children::Reader {
                reader,
                page,
                exhausted,
            } => loop {
                if let Some(entry) = page.pop_front() {
                    return Ok(Some(entry));
                }
                if *exhausted {
                    return Ok(None);
                }
                let batch = reader.read_entries().await?;
                *exhausted = batch.is_empty();
                page.extend(batch);
            },
        }
    }
}

struct Frame {
    dir: NodeId,
    children: Children,
}

/// A hierarchical tree of directories and files.
///
/// Names are unique within a directory, and a name never refers to both a
/// file and a directory. Submitting a file that is already in the tree is
/// a no-op.
///
/// # Examples
///
/// ```
/// use torrentkit::fs::{FileDirLike, MemoryDirectory, MemoryFile};
/// use torrentkit::metainfo::FileTree;
///
/// # futures::executor::block_on(async {
/// let tree = FileTree::build(
///     vec![
///         MemoryDirectory::new("docs")
///             .with_file(MemoryFile::new("b.txt", "bb"))
///             .with_file(MemoryFile::new("a.txt", "a"))
///             .into(),
///         FileDirLike::file(MemoryFile::at_path("docs/c.txt", "ccc")),
///     ],
///     true,
/// )
/// .await
/// .unwrap();
///
/// let paths: Vec<String> = tree.files().map(|(id, _, _)| tree.path(id).join("/")).collect();
/// assert_eq!(paths, ["docs/a.txt", "docs/b.txt", "docs/c.txt"]);
/// assert_eq!(tree.total_size(), 6);
/// # });
/// ```
pub struct FileTree {
    slots: Vec<Slot>,
    sources: HashMap<NodeId, Arc<dyn FileSource>>,
    identities: HashMap<NodeId, String>,
    sorted: bool,
    total_size: u64,
    file_count: usize,
}

const ROOT: NodeId = NodeId(0);

impl FileTree {
    /// Creates an empty tree. With `sorted`, siblings are kept in byte order
    /// of their names; otherwise they keep arrival order.
    pub fn new(sorted: bool) -> Self {
        Self {
            slots: vec![Slot {
                name: String::new(),
                parent: None,
                node: Node::Directory(Vec::new()),
            }],
            sources: HashMap::new(),
            identities: HashMap::new(),
            sorted,
            total_size: 0,
            file_count: 0,
        }
    }

    /// Builds a tree from `inputs`.
    pub async fn build(inputs: Vec<FileDirLike>, sorted: bool) -> Result<Self, FileTreeError> {
        let mut tree = Self::new(sorted);
        tree.extend(inputs).await?;
        Ok(tree)
    }

    /// Merges more inputs into the root of the tree.
    ///
    /// Directories are walked depth first with an explicit work stack, so
    /// nesting depth is bounded by memory rather than by the call stack.
    pub async fn extend(&mut self, inputs: Vec<FileDirLike>) -> Result<(), FileTreeError> {
        let mut stack = vec![Frame {
            dir: ROOT,
            children: Children::Inputs(inputs.into_iter()),
        }];

        while let Some(frame) = stack.last_mut() {
            let dir = frame.dir;
            let Some(input) = frame.children.next().await? else {
                stack.pop();
                continue;
            };

            match input {
                FileDirLike::DirectoryHandle(handle) => {
                    let child = self.enter_directory(dir, handle.name(), Some(handle.identity()))?;
                    stack.push(Frame {
                        dir: child,
                        children: Children::Stream(handle.values()),
                    });
                }
                FileDirLike::DirectoryEntry(entry) => {
                    let child = self.enter_directory(dir, entry.name(), None)?;
                    stack.push(Frame {
                        dir: child,
                        children: Children::Reader {
                            reader: entry.reader(),
                            page: VecDeque::new(),
                            exhausted: false,
                        },
                    });
                }
                FileDirLike::FileHandle(handle) => {
                    let name = handle.name();
                    if let Some(existing) = self.visit_file(dir, name, Some(handle.identity()))? {
                        tracing::trace!(name, ?existing, "file handle already in tree");
                        continue;
                    }
                    let source = handle.get_file().await?;
                    let id = self.insert_file(dir, name, source)?;
                    self.identities.insert(id, handle.identity().to_string());
                }
                FileDirLike::FileEntry(entry) => {
                    let name = entry.name();
                    if self.visit_file(dir, name, None)?.is_some() {
                        continue;
                    }
                    let source = entry.file().await?;
                    self.insert_file(dir, name, source)?;
                }
                FileDirLike::File(source) => self.insert_path(dir, source)?,
            }
        }
        Ok(())
    }

    /// Places a raw file at its relative path below `dir`, creating the
    /// intermediate directories.
    fn insert_path(&mut self, dir: NodeId, source: Arc<dyn FileSource>) -> Result<(), FileTreeError> {
        let path = source.relative_path().unwrap_or(source.name()).to_string();
        let segments: Vec<&str> = path.split('/').collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(FileTreeError::EmptyPathSegment(path));
        }

        let Some((file_name, parents)) = segments.split_last() else {
            return Err(FileTreeError::EmptyPathSegment(path));
        };
        let mut current = dir;
        for segment in parents {
            current = self.enter_directory(current, segment, None)?;
        }
        if self.visit_file(current, file_name, None)?.is_none() {
            self.insert_file(current, file_name, source)?;
        }
        Ok(())
    }

    /// Finds or creates the directory `name` below `parent`.
    fn enter_directory(
        &mut self,
        parent: NodeId,
        name: &str,
        identity: Option<&str>,
    ) -> Result<NodeId, FileTreeError> {
        match self.lookup(parent, name) {
            Ok(existing) => {
                if let Node::File(_) = self.slots[existing.0].node {
                    return Err(FileTreeError::NameCollision {
                        name: name.to_string(),
                        existing: NodeKind::File,
                    });
                }
                if let Some(identity) = identity {
                    if self.identities.get(&existing).map(String::as_str) != Some(identity) {
                        return Err(FileTreeError::HandleMismatch {
                            name: name.to_string(),
                        });
                    }
                }
                tracing::trace!(name, "descending into existing directory");
                Ok(existing)
            }
            Err(index) => {
                let id = self.attach(parent, index, name, Node::Directory(Vec::new()));
                if let Some(identity) = identity {
                    self.identities.insert(id, identity.to_string());
                }
                tracing::trace!(name, "created directory");
                Ok(id)
            }
        }
    }

    /// Checks whether a file `name` may be inserted below `parent`.
    ///
    /// Returns the existing node when the file is already present.
    fn visit_file(
        &self,
        parent: NodeId,
        name: &str,
        identity: Option<&str>,
    ) -> Result<Option<NodeId>, FileTreeError> {
        let Ok(existing) = self.lookup(parent, name) else {
            return Ok(None);
        };
        if let Node::Directory(_) = self.slots[existing.0].node {
            return Err(FileTreeError::NameCollision {
                name: name.to_string(),
                existing: NodeKind::Directory,
            });
        }
        if let Some(identity) = identity {
            if self.identities.get(&existing).map(String::as_str) != Some(identity) {
                return Err(FileTreeError::HandleMismatch {
                    name: name.to_string(),
                });
            }
        }
        Ok(Some(existing))
    }

    fn insert_file(
        &mut self,
        parent: NodeId,
        name: &str,
        source: Arc<dyn FileSource>,
    ) -> Result<NodeId, FileTreeError> {
        let index = match self.lookup(parent, name) {
            Ok(existing) => {
                return Err(FileTreeError::NameCollision {
                    name: name.to_string(),
                    existing: self.slots[existing.0].node.kind(),
                })
            }
            Err(index) => index,
        };
        let node = FileNode {
            length: source.size(),
            attributes: source.attributes(),
            pieces_root: None,
        };
        self.total_size += node.length;
        self.file_count += 1;
        tracing::trace!(name, length = node.length, "inserted file");

        let id = self.attach(parent, index, name, Node::File(node));
        self.sources.insert(id, source);
        Ok(id)
    }

    /// Looks up `name` among the children of `parent`: `Ok` with the match,
    /// or `Err` with the position a new child must take.
    fn lookup(&self, parent: NodeId, name: &str) -> Result<NodeId, usize> {
        let children = self.children(parent);
        if self.sorted {
            children
                .binary_search_by(|child| self.slots[child.0].name.as_str().cmp(name))
                .map(|index| children[index])
        } else {
            children
                .iter()
                .copied()
                .find(|child| self.slots[child.0].name == name)
                .ok_or(children.len())
        }
    }

    fn attach(&mut self, parent: NodeId, index: usize, name: &str, node: Node) -> NodeId {
        let id = NodeId(self.slots.len());
        self.slots.push(Slot {
            name: name.to_string(),
            parent: Some(parent),
            node,
        });
        if let Node::Directory(children) = &mut self.slots[parent.0].node {
            children.insert(index, id);
        }
        id
    }

    pub fn root(&self) -> NodeId {
        ROOT
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    /// Sum of the lengths of all files.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn file_count(&self) -> usize {
        self.file_count
    }

    pub fn name(&self, id: NodeId) -> &str {
        &self.slots[id.0].name
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.slots[id.0].node
    }

    /// Children of a directory. Empty for files.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.slots[id.0].node {
            Node::Directory(children) => children,
            Node::File(_) => &[],
        }
    }

    pub fn file(&self, id: NodeId) -> Option<&FileNode> {
        match &self.slots[id.0].node {
            Node::File(file) => Some(file),
            Node::Directory(_) => None,
        }
    }

    /// The byte source a file node was created from.
    pub fn source(&self, id: NodeId) -> Option<&Arc<dyn FileSource>> {
        self.sources.get(&id)
    }

    /// Records the v2 pieces root of a file. Directories are left untouched.
    pub fn set_pieces_root(&mut self, id: NodeId, root: Hash256) {
        if let Node::File(file) = &mut self.slots[id.0].node {
            file.pieces_root = Some(root);
        }
    }

    /// Names from the root down to `id`, the root itself excluded.
    pub fn path(&self, id: NodeId) -> Vec<&str> {
        let mut path = Vec::new();
        let mut current = id;
        while let Some(parent) = self.slots[current.0].parent {
            path.push(self.slots[current.0].name.as_str());
            current = parent;
        }
        path.reverse();
        path
    }

    /// The only top-level entry, if the root holds exactly one.
    pub fn single_root_entry(&self) -> Option<NodeId> {
        match self.children(ROOT) {
            [only] => Some(*only),
            _ => None,
        }
    }

    /// Depth-first traversal of every file, in tree order.
    pub fn files(&self) -> Files<'_> {
        self.files_under(ROOT)
    }

    /// Depth-first traversal of the files below `id` (or `id` itself, when
    /// it is a file). Each call starts a fresh traversal.
    pub fn files_under(&self, id: NodeId) -> Files<'_> {
        Files {
            tree: self,
            stack: vec![id],
        }
    }

    /// Renders the subtree at `id` as a BEP-52 `file tree` dictionary.
    pub fn to_value(&self, id: NodeId) -> Value {
        match &self.slots[id.0].node {
            Node::File(file) => {
                let mut props = BTreeMap::new();
                props.insert(Bytes::from_static(b"length"), Value::from(file.length));
                if let Some(root) = file.pieces_root {
                    props.insert(
                        Bytes::from_static(b"pieces root"),
                        Value::Bytes(Bytes::copy_from_slice(&root)),
                    );
                }
                if let Some(attr) = file.attributes.to_attr_string() {
                    props.insert(Bytes::from_static(b"attr"), Value::from(attr));
                }
                let mut leaf = BTreeMap::new();
                leaf.insert(Bytes::new(), Value::Dict(props));
                Value::Dict(leaf)
            }
            Node::Directory(children) => Value::Dict(
                children
                    .iter()
                    .map(|child| {
                        (
                            Bytes::from(self.slots[child.0].name.clone()),
                            self.to_value(*child),
                        )
                    })
                    .collect(),
            ),
        }
    }
}

impl fmt::Debug for FileTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileTree")
            .field("nodes", &self.slots.len())
            .field("sorted", &self.sorted)
            .field("total_size", &self.total_size)
            .field("file_count", &self.file_count)
            .finish()
    }
}

/// Iterator returned by [`FileTree::files`].
pub struct Files<'a> {
    tree: &'a FileTree,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for Files<'a> {
    type Item = (NodeId, &'a FileNode, &'a Arc<dyn FileSource>);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            match &self.tree.slots[id.0].node {
                Node::Directory(children) => self.stack.extend(children.iter().rev()),
                Node::File(file) => {
                    if let Some(source) = self.tree.sources.get(&id) {
                        return Some((id, file, source));
                    }
                }
            }
        }
        None
    }
}
