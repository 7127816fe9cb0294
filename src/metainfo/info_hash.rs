use std::fmt;

use sha1::{Digest, Sha1};
use sha2::Sha256;

use super::error::MetainfoError;
use super::torrent::TorrentVersion;

/// The identifier of a torrent: the hash of its bencoded `info` dictionary.
///
/// v1 torrents are identified by SHA-1, v2 torrents by SHA-256, and hybrid
/// torrents carry both.
///
/// ```
/// use torrentkit::metainfo::{InfoHash, TorrentVersion};
///
/// let hash = InfoHash::compute(b"d4:name1:xe", TorrentVersion::Hybrid);
/// assert!(hash.v1().is_some());
/// assert!(hash.v2().is_some());
/// assert_eq!(hash.to_hex().len(), 40);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum InfoHash {
    V1([u8; 20]),
    V2([u8; 32]),
    Hybrid { v1: [u8; 20], v2: [u8; 32] },
}

impl InfoHash {
    /// Hashes a bencoded `info` dictionary the way `version` requires.
    pub fn compute(info: &[u8], version: TorrentVersion) -> Self {
        match version {
            TorrentVersion::V1 => InfoHash::V1(Sha1::digest(info).into()),
            TorrentVersion::V2 => InfoHash::V2(Sha256::digest(info).into()),
            TorrentVersion::Hybrid => InfoHash::Hybrid {
                v1: Sha1::digest(info).into(),
                v2: Sha256::digest(info).into(),
            },
        }
    }

    pub fn from_v1_bytes(bytes: &[u8]) -> Result<Self, MetainfoError> {
        let hash: [u8; 20] = bytes
            .try_into()
            .map_err(|_| MetainfoError::InvalidInfoHashLength)?;
        Ok(InfoHash::V1(hash))
    }

    pub fn from_v2_bytes(bytes: &[u8]) -> Result<Self, MetainfoError> {
        let hash: [u8; 32] = bytes
            .try_into()
            .map_err(|_| MetainfoError::InvalidInfoHashLength)?;
        Ok(InfoHash::V2(hash))
    }

    /// Parses a 40 or 64 digit hex string.
    pub fn from_hex(s: &str) -> Result<Self, MetainfoError> {
        let bytes = hex_decode(s).ok_or(MetainfoError::InvalidInfoHashLength)?;
        match bytes.len() {
            20 => Self::from_v1_bytes(&bytes),
            32 => Self::from_v2_bytes(&bytes),
            _ => Err(MetainfoError::InvalidInfoHashLength),
        }
    }

    pub fn v1(&self) -> Option<[u8; 20]> {
        match self {
            InfoHash::V1(v1) | InfoHash::Hybrid { v1, .. } => Some(*v1),
            InfoHash::V2(_) => None,
        }
    }

    pub fn v2(&self) -> Option<[u8; 32]> {
        match self {
            InfoHash::V2(v2) | InfoHash::Hybrid { v2, .. } => Some(*v2),
            InfoHash::V1(_) => None,
        }
    }

    /// The primary hash: SHA-1 when there is one, SHA-256 otherwise.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            InfoHash::V1(v1) | InfoHash::Hybrid { v1, .. } => v1,
            InfoHash::V2(v2) => v2,
        }
    }

    pub fn is_v1(&self) -> bool {
        matches!(self, InfoHash::V1(_))
    }

    pub fn is_v2(&self) -> bool {
        matches!(self, InfoHash::V2(_))
    }

    pub fn is_hybrid(&self) -> bool {
        matches!(self, InfoHash::Hybrid { .. })
    }

    pub fn to_hex(&self) -> String {
        hex_encode(self.as_bytes())
    }
}

impl fmt::Debug for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InfoHash::Hybrid { v1, v2 } => {
                write!(f, "InfoHash({}, {})", hex_encode(v1), hex_encode(v2))
            }
            _ => write!(f, "InfoHash({})", self.to_hex()),
        }
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
        s
    })
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}
