//! Bencode encoding and decoding ([BEP-3]).
//!
//! Bencode is the serialization format of `.torrent` files.
//!
//! # Data Types
//!
//! | Type | Format | Example |
//! |------|--------|---------|
//! | Integer | `i<number>e` | `i42e` → 42 |
//! | Byte String | `<length>:<data>` | `4:spam` → "spam" |
//! | List | `l<items>e` | `l4:spami42ee` → ["spam", 42] |
//! | Dictionary | `d<key><value>...e` | `d3:foo3:bare` → {"foo": "bar"} |
//!
//! Integers are unbounded on the wire. Values that do not fit in `i64` decode
//! to [`Value::BigInteger`] without losing precision.
//!
//! # Examples
//!
//! ## Decoding
//!
//! ```
//! use torrentkit::bencode::{decode, Value};
//!
//! let value = decode(b"d3:foo3:bar4:sizei9007199254740992ee").unwrap();
//! assert_eq!(value.get(b"foo").and_then(|v| v.as_str()), Some("bar"));
//! assert_eq!(value.get(b"size").and_then(|v| v.as_integer()), Some(9007199254740992));
//!
//! let huge = decode(b"i123456789012345678901234567890e").unwrap();
//! assert!(matches!(huge, Value::BigInteger(_)));
//! ```
//!
//! ## Encoding
//!
//! ```
//! use torrentkit::bencode::{encode, Value};
//!
//! let mut info = Value::dict();
//! info.insert("name", "example.txt");
//! info.insert("length", 1024i64);
//! info.insert("comment", Option::<&str>::None);
//!
//! assert_eq!(encode(&info), b"d6:lengthi1024e4:name11:example.txte");
//! ```
//!
//! ## Capturing a subtree while encoding
//!
//! [`EncodeHooks`] registers side channels by structural path. Each one
//! receives the chunks of its subtree as they are produced, followed by
//! [`HookEvent::Done`].
//!
//! ```
//! use torrentkit::bencode::{encode_with_hooks, EncodeHooks, PathSegment, Value};
//!
//! let value = Value::List(vec![Value::Integer(1), Value::string("ab")]);
//! let mut hooks = EncodeHooks::new();
//! let second = hooks.capture([PathSegment::Index(1)]);
//!
//! encode_with_hooks(&value, &mut hooks);
//! assert_eq!(second.bytes().unwrap().as_ref(), b"2:ab");
//! ```
//!
//! # Error Handling
//!
//! Every decoding failure is fatal. [`BencodeError::is_syntax`] separates
//! malformed input (unbalanced delimiters, negative zero, leading zeros,
//! truncated streams, trailing data) from I/O failures of the source.
//!
//! [BEP-3]: http://bittorrent.org/beps/bep_0003.html

mod decode;
mod encode;
mod error;
mod parse;
mod tokenize;
mod value;

pub use decode::{decode, decode_reader, decode_stream, Decoder};
pub use encode::{
    encode, encode_with_hooks, write_to, Capture, EncodeHooks, Encoder, HookEvent, PathSegment,
};
pub use error::BencodeError;
pub use value::Value;
