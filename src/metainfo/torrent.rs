use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use bytes::Bytes;

use super::error::MetainfoError;
use super::info_hash::InfoHash;
use crate::bencode::{decode, encode, encode_with_hooks, EncodeHooks, Value};
use crate::fs::FileAttributes;
use crate::pipeline::{Hash256, PieceHash};

/// The version of a torrent file.
///
/// BitTorrent has evolved through multiple versions:
/// - **V1**: Original BitTorrent protocol (BEP-3)
/// - **V2**: BitTorrent v2 with merkle trees over 16 KiB blocks (BEP-52)
/// - **Hybrid**: Both layouts over the same piece-aligned content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TorrentVersion {
    /// SHA-1 piece hashes.
    #[default]
    V1,
    /// SHA-256 merkle trees.
    V2,
    /// Both v1 piece hashes and a v2 file tree.
    Hybrid,
}

impl TorrentVersion {
    /// Returns true if this version carries v1 piece hashes.
    pub fn supports_v1(&self) -> bool {
        matches!(self, TorrentVersion::V1 | TorrentVersion::Hybrid)
    }

    /// Returns true if this version carries a v2 file tree.
    pub fn supports_v2(&self) -> bool {
        matches!(self, TorrentVersion::V2 | TorrentVersion::Hybrid)
    }
}

/// A torrent produced by [`TorrentBuilder`](super::TorrentBuilder).
///
/// Holds the metainfo as a bencode [`Value`]; [`Torrent::encode`] turns it
/// into bytes.
#[derive(Debug, Clone)]
pub struct Torrent {
    pub(crate) version: TorrentVersion,
    pub(crate) name: String,
    pub(crate) piece_length: u64,
    pub(crate) total_size: u64,
    pub(crate) file_count: usize,
    pub(crate) value: Value,
}

/// The bencoded form of a [`Torrent`].
#[derive(Debug, Clone)]
pub struct EncodedTorrent {
    pub bytes: Bytes,
    pub info_hash: InfoHash,
}

impl Torrent {
    pub fn version(&self) -> TorrentVersion {
        self.version
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn piece_length(&self) -> u64 {
        self.piece_length
    }

    /// Sum of the lengths of the real files, padding excluded.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Number of real files, padding excluded.
    pub fn file_count(&self) -> usize {
        self.file_count
    }

    /// The metainfo dictionary.
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// The `info` dictionary.
    pub fn info(&self) -> Option<&Value> {
        self.value.get(b"info")
    }

    /// Encodes the metainfo and hashes the `info` dictionary in the same
    /// pass.
    ///
    /// ```
    /// use torrentkit::fs::MemoryFile;
    /// use torrentkit::metainfo::TorrentBuilder;
    ///
    /// # futures::executor::block_on(async {
    /// let torrent = TorrentBuilder::new()
    ///     .add(MemoryFile::new("hello.txt", "Hello world"))
    ///     .build()
    ///     .await
    ///     .unwrap();
    /// let encoded = torrent.encode().unwrap();
    /// assert!(encoded.info_hash.is_v1());
    /// assert!(encoded.bytes.starts_with(b"d"));
    /// # });
    /// ```
    pub fn encode(&self) -> Result<EncodedTorrent, MetainfoError> {
        let mut hooks = EncodeHooks::new();
        let info = hooks.capture(["info"]);
        let bytes = Bytes::from(encode_with_hooks(&self.value, &mut hooks));
        let info = info.bytes().ok_or(MetainfoError::MissingField("info"))?;
        Ok(EncodedTorrent {
            bytes,
            info_hash: InfoHash::compute(&info, self.version),
        })
    }
}

/// A parsed torrent file.
///
/// Contains all metadata from a `.torrent` file, including file information,
/// piece hashes, and tracker URLs.
///
/// # Examples
///
/// ```no_run
/// use torrentkit::metainfo::Metainfo;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let data = std::fs::read("example.torrent")?;
/// let metainfo = Metainfo::from_bytes(&data)?;
///
/// println!("Torrent: {}", metainfo.info.name);
/// println!("Size: {} bytes", metainfo.info.total_length);
/// println!("Info hash: {}", metainfo.info_hash);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Metainfo {
    /// The info dictionary containing file and piece information.
    pub info: Info,
    /// The unique identifier for this torrent (hash of the info dictionary).
    pub info_hash: InfoHash,
    /// Primary tracker URL.
    pub announce: Option<String>,
    /// Multi-tier tracker list ([BEP-12](http://bittorrent.org/beps/bep_0012.html)).
    pub announce_list: Vec<Vec<String>>,
    /// Web seeds ([BEP-19](http://bittorrent.org/beps/bep_0019.html)).
    pub url_list: Vec<String>,
    /// Unix timestamp when the torrent was created.
    pub creation_date: Option<i64>,
    /// Optional comment about the torrent.
    pub comment: Option<String>,
    /// Name/version of the program that created the torrent.
    pub created_by: Option<String>,
    /// Merkle piece layers keyed by pieces root (v2 and hybrid).
    pub piece_layers: BTreeMap<Hash256, Vec<Hash256>>,
    /// The torrent version (V1, V2, or Hybrid).
    pub version: TorrentVersion,
    raw_info: Bytes,
}

/// The info dictionary from a torrent file.
#[derive(Debug, Clone)]
pub struct Info {
    /// Suggested name for the file or directory.
    pub name: String,
    /// Number of bytes per piece.
    pub piece_length: u64,
    /// SHA-1 hash of each piece. Empty for v2-only torrents.
    pub pieces: Vec<PieceHash>,
    /// Files in content order, padding files included.
    pub files: Vec<File>,
    /// Total size of all files combined, padding included.
    pub total_length: u64,
    /// If true, clients should only use trackers in the metainfo (no DHT/PEX).
    pub private: bool,
    pub source: Option<String>,
    pub meta_version: Option<i64>,
}

impl Info {
    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }
}

/// A file within a torrent.
///
/// Paths start with the torrent name for multi-file torrents and are just
/// the name for single-file torrents.
#[derive(Debug, Clone)]
pub struct File {
    pub path: PathBuf,
    pub length: u64,
    /// Byte offset within the torrent's piece data.
    pub offset: u64,
    pub attributes: FileAttributes,
    /// Merkle root of the file (v2 and hybrid, non-empty files).
    pub pieces_root: Option<Hash256>,
}

impl File {
    pub fn is_padding(&self) -> bool {
        self.attributes.padding
    }
}

impl Metainfo {
    /// Parses a torrent file from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The data is not valid bencode
    /// - Required fields are missing (info, name, pieces or file tree, etc.)
    /// - The pieces field length is not a multiple of 20
    pub fn from_bytes(data: &[u8]) -> Result<Self, MetainfoError> {
        let value = decode(data)?;
        let dict = value.as_dict().ok_or(MetainfoError::InvalidField("root"))?;

        let info_value = dict
            .get(b"info".as_slice())
            .ok_or(MetainfoError::MissingField("info"))?;
        let info_dict = info_value
            .as_dict()
            .ok_or(MetainfoError::InvalidField("info"))?;

        let raw_info = Bytes::from(encode(info_value));

        let has_pieces = info_dict.contains_key(b"pieces".as_slice());
        let has_file_tree = info_dict.contains_key(b"file tree".as_slice());
        let version = match (has_pieces, has_file_tree) {
            (true, true) => TorrentVersion::Hybrid,
            (false, true) => TorrentVersion::V2,
            (true, false) => TorrentVersion::V1,
            (false, false) => return Err(MetainfoError::MissingField("pieces")),
        };
        let info_hash = InfoHash::compute(&raw_info, version);
        let info = parse_info(info_value, version)?;

        let announce = dict
            .get(b"announce".as_slice())
            .and_then(|v| v.as_str())
            .map(String::from);

        let announce_list = dict
            .get(b"announce-list".as_slice())
            .and_then(|v| v.as_list())
            .map(|list| {
                list.iter()
                    .filter_map(|tier| tier.as_list().map(|urls| string_list(urls)))
                    .collect()
            })
            .unwrap_or_default();

        let url_list = match dict.get(b"url-list".as_slice()) {
            Some(Value::List(urls)) => string_list(urls),
            Some(url) => url.as_str().map(String::from).into_iter().collect(),
            None => Vec::new(),
        };

        let piece_layers = match dict.get(b"piece layers".as_slice()) {
            Some(layers) => parse_piece_layers(layers)?,
            None => BTreeMap::new(),
        };

        let creation_date = dict
            .get(b"creation date".as_slice())
            .and_then(|v| v.as_integer());

        let comment = dict
            .get(b"comment".as_slice())
            .and_then(|v| v.as_str())
            .map(String::from);

        let created_by = dict
            .get(b"created by".as_slice())
            .and_then(|v| v.as_str())
            .map(String::from);

        Ok(Self {
            info,
            info_hash,
            announce,
            announce_list,
            url_list,
            creation_date,
            comment,
            created_by,
            piece_layers,
            version,
            raw_info,
        })
    }

    /// Returns the raw bencoded info dictionary.
    pub fn raw_info(&self) -> &Bytes {
        &self.raw_info
    }

    /// Returns all tracker URLs from both `announce` and `announce-list`.
    ///
    /// The primary tracker (from `announce`) comes first, followed by
    /// trackers from `announce-list`. Duplicates are removed.
    pub fn trackers(&self) -> Vec<String> {
        let mut trackers = Vec::new();

        if let Some(ref announce) = self.announce {
            trackers.push(announce.clone());
        }

        for tier in &self.announce_list {
            for tracker in tier {
                if !trackers.contains(tracker) {
                    trackers.push(tracker.clone());
                }
            }
        }

        trackers
    }

    pub fn is_v2(&self) -> bool {
        matches!(self.version, TorrentVersion::V2)
    }

    pub fn is_hybrid(&self) -> bool {
        matches!(self.version, TorrentVersion::Hybrid)
    }
}

fn string_list(values: &[Value]) -> Vec<String> {
    values
        .iter()
        .filter_map(|v| v.as_str().map(String::from))
        .collect()
}

fn hash256(bytes: &[u8]) -> Option<Hash256> {
    bytes.try_into().ok()
}

fn parse_info(value: &Value, version: TorrentVersion) -> Result<Info, MetainfoError> {
    let dict = value.as_dict().ok_or(MetainfoError::InvalidField("info"))?;

    let name = dict
        .get(b"name".as_slice())
        .and_then(|v| v.as_str())
        .ok_or(MetainfoError::MissingField("name"))?
        .to_string();

    let piece_length = dict
        .get(b"piece length".as_slice())
        .and_then(|v| v.as_integer())
        .ok_or(MetainfoError::MissingField("piece length"))?;
    let piece_length =
        u64::try_from(piece_length).map_err(|_| MetainfoError::InvalidField("piece length"))?;

    let pieces = match dict.get(b"pieces".as_slice()) {
        Some(pieces) => {
            let bytes = pieces
                .as_bytes()
                .ok_or(MetainfoError::InvalidField("pieces"))?;
            if bytes.len() % 20 != 0 {
                return Err(MetainfoError::InvalidField("pieces"));
            }
            bytes
                .chunks_exact(20)
                .map(|chunk| {
                    let mut arr = [0u8; 20];
                    arr.copy_from_slice(chunk);
                    arr
                })
                .collect()
        }
        None => Vec::new(),
    };

    let private = dict
        .get(b"private".as_slice())
        .and_then(|v| v.as_integer())
        .map(|v| v == 1)
        .unwrap_or(false);

    let source = dict
        .get(b"source".as_slice())
        .and_then(|v| v.as_str())
        .map(String::from);

    let meta_version = dict
        .get(b"meta version".as_slice())
        .and_then(|v| v.as_integer());

    let tree_files = match dict.get(b"file tree".as_slice()) {
        Some(tree) => flatten_file_tree(tree, &name)?,
        None => Vec::new(),
    };

    let files = if version.supports_v1() {
        let mut files = parse_v1_files(dict, &name)?;
        if files.len() == 1 && tree_files.len() == 1 {
            files[0].pieces_root = tree_files[0].pieces_root;
        } else {
            let roots: HashMap<&PathBuf, Option<Hash256>> =
                tree_files.iter().map(|f| (&f.path, f.pieces_root)).collect();
            for file in &mut files {
                file.pieces_root = roots.get(&file.path).copied().flatten();
            }
        }
        files
    } else {
        let mut offset = 0;
        let mut files = tree_files;
        for file in &mut files {
            file.offset = offset;
            offset += file.length;
        }
        files
    };
    let total_length = files.iter().map(|f| f.length).sum();

    Ok(Info {
        name,
        piece_length,
        pieces,
        files,
        total_length,
        private,
        source,
        meta_version,
    })
}

fn file_length(dict: &BTreeMap<Bytes, Value>) -> Result<u64, MetainfoError> {
    let length = dict
        .get(b"length".as_slice())
        .and_then(|v| v.as_integer())
        .ok_or(MetainfoError::MissingField("length"))?;
    u64::try_from(length).map_err(|_| MetainfoError::InvalidField("length"))
}

fn file_attributes(dict: &BTreeMap<Bytes, Value>) -> FileAttributes {
    dict.get(b"attr".as_slice())
        .and_then(|v| v.as_bytes())
        .map(|attr| FileAttributes::parse(attr))
        .unwrap_or_default()
}

fn parse_v1_files(dict: &BTreeMap<Bytes, Value>, name: &str) -> Result<Vec<File>, MetainfoError> {
    if dict.contains_key(b"length".as_slice()) {
        return Ok(vec![File {
            path: PathBuf::from(name),
            length: file_length(dict)?,
            offset: 0,
            attributes: file_attributes(dict),
            pieces_root: None,
        }]);
    }

    let files_list = dict
        .get(b"files".as_slice())
        .and_then(|v| v.as_list())
        .ok_or(MetainfoError::MissingField("length or files"))?;

    let mut files = Vec::with_capacity(files_list.len());
    let mut offset = 0u64;
    for file_value in files_list {
        let file_dict = file_value
            .as_dict()
            .ok_or(MetainfoError::InvalidField("files"))?;
        let length = file_length(file_dict)?;
        let path_list = file_dict
            .get(b"path".as_slice())
            .and_then(|v| v.as_list())
            .ok_or(MetainfoError::MissingField("file path"))?;

        let path: PathBuf = std::iter::once(name.to_string())
            .chain(string_list(path_list))
            .collect();

        files.push(File {
            path,
            length,
            offset,
            attributes: file_attributes(file_dict),
            pieces_root: None,
        });
        offset += length;
    }
    Ok(files)
}

/// Flattens a BEP-52 `file tree` into files in key order.
///
/// A tree holding only a file keyed by the torrent name is a single-file
/// torrent and the file path is that key alone; otherwise paths start with
/// `name`.
fn flatten_file_tree(tree: &Value, name: &str) -> Result<Vec<File>, MetainfoError> {
    let root = tree
        .as_dict()
        .ok_or(MetainfoError::InvalidField("file tree"))?;
    let single_file = root.len() == 1
        && root
            .get(name.as_bytes())
            .and_then(|node| node.get(b""))
            .is_some();
    let base = if single_file {
        PathBuf::new()
    } else {
        PathBuf::from(name)
    };

    let mut files = Vec::new();
    let mut stack = Vec::new();
    push_children(&mut stack, &base, root)?;
    while let Some((path, node)) = stack.pop() {
        let node = node
            .as_dict()
            .ok_or(MetainfoError::InvalidField("file tree"))?;
        match node.get(b"".as_slice()) {
            Some(props) => {
                let props = props
                    .as_dict()
                    .ok_or(MetainfoError::InvalidField("file tree entry"))?;
                files.push(File {
                    path,
                    length: file_length(props)?,
                    offset: 0,
                    attributes: file_attributes(props),
                    pieces_root: props
                        .get(b"pieces root".as_slice())
                        .and_then(|v| v.as_bytes())
                        .and_then(|b| hash256(b)),
                });
            }
            None => push_children(&mut stack, &path, node)?,
        }
    }
    Ok(files)
}

/// Pushes directory children in reverse so the smallest key pops first.
fn push_children<'a>(
    stack: &mut Vec<(PathBuf, &'a Value)>,
    path: &std::path::Path,
    dir: &'a BTreeMap<Bytes, Value>,
) -> Result<(), MetainfoError> {
    for (key, node) in dir.iter().rev() {
        let segment =
            std::str::from_utf8(key).map_err(|_| MetainfoError::InvalidField("file tree key"))?;
        stack.push((path.join(segment), node));
    }
    Ok(())
}

fn parse_piece_layers(value: &Value) -> Result<BTreeMap<Hash256, Vec<Hash256>>, MetainfoError> {
    let dict = value
        .as_dict()
        .ok_or(MetainfoError::InvalidField("piece layers"))?;
    dict.iter()
        .map(|(root, layer)| {
            let root = hash256(root).ok_or(MetainfoError::InvalidField("piece layers"))?;
            let layer = layer
                .as_bytes()
                .filter(|b| b.len() % 32 == 0)
                .ok_or(MetainfoError::InvalidField("piece layers"))?;
            let hashes = layer.chunks_exact(32).filter_map(hash256).collect();
            Ok((root, hashes))
        })
        .collect()
}
