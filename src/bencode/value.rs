use bytes::Bytes;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use std::collections::BTreeMap;

/// A bencode value.
///
/// Bencode has four wire types: integers, byte strings, lists, and
/// dictionaries. Integers that overflow `i64` are carried as
/// [`Value::BigInteger`], and [`Value::Null`] marks an absent value that the
/// encoder drops instead of emitting.
///
/// # Examples
///
/// ```
/// use torrentkit::bencode::Value;
///
/// let int = Value::Integer(42);
/// let string = Value::string("hello");
/// let list = Value::List(vec![Value::Integer(1), Value::Integer(2)]);
///
/// // Booleans are integers on the wire
/// let flag: Value = true.into();
/// assert_eq!(flag, Value::Integer(1));
///
/// assert_eq!(int.as_integer(), Some(42));
/// assert_eq!(string.as_str(), Some("hello"));
/// assert_eq!(list.as_list().map(|l| l.len()), Some(2));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// A signed integer that fits in 64 bits.
    Integer(i64),
    /// An integer outside the `i64` range.
    BigInteger(BigInt),
    /// A byte string (may or may not be valid UTF-8).
    Bytes(Bytes),
    /// An ordered list of values.
    List(Vec<Value>),
    /// A dictionary with byte string keys, always encoded in key order.
    Dict(BTreeMap<Bytes, Value>),
    /// An absent value. Never emitted: dictionary entries holding it are
    /// omitted and list elements holding it are skipped.
    Null,
}

impl Value {
    /// Creates a byte string value from a UTF-8 string.
    ///
    /// The wire length is the UTF-8 byte length, not the character count.
    ///
    /// ```
    /// use torrentkit::bencode::{encode, Value};
    ///
    /// assert_eq!(encode(&Value::string("héllo")), b"6:h\xc3\xa9llo");
    /// ```
    pub fn string(s: &str) -> Self {
        Value::Bytes(Bytes::copy_from_slice(s.as_bytes()))
    }

    /// Creates an integer value from an arbitrary-precision integer,
    /// narrowing to [`Value::Integer`] when it fits.
    pub fn big(i: BigInt) -> Self {
        match i.to_i64() {
            Some(small) => Value::Integer(small),
            None => Value::BigInteger(i),
        }
    }

    /// Creates an empty dictionary.
    pub fn dict() -> Self {
        Value::Dict(BTreeMap::new())
    }

    /// Returns the value as an integer, if it is one and fits in `i64`.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value as an arbitrary-precision integer, if it is any
    /// kind of integer.
    pub fn to_big_integer(&self) -> Option<BigInt> {
        match self {
            Value::Integer(i) => Some(BigInt::from(*i)),
            Value::BigInteger(i) => Some(i.clone()),
            _ => None,
        }
    }

    /// Returns the value as a byte string, if it is one.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the value as a UTF-8 string, if it is a valid UTF-8 byte string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Returns the value as a list, if it is one.
    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Returns the value as a dictionary reference, if it is one.
    ///
    /// ```
    /// use torrentkit::bencode::decode;
    ///
    /// let value = decode(b"d3:foo3:bare").unwrap();
    /// let dict = value.as_dict().unwrap();
    /// assert!(dict.contains_key(b"foo".as_slice()));
    /// ```
    pub fn as_dict(&self) -> Option<&BTreeMap<Bytes, Value>> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Returns a mutable dictionary reference, if the value is one.
    pub fn as_dict_mut(&mut self) -> Option<&mut BTreeMap<Bytes, Value>> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Consumes the value and returns the dictionary, if it is one.
    pub fn into_dict(self) -> Option<BTreeMap<Bytes, Value>> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Returns true for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Looks up a key in this value if it is a dictionary.
    ///
    /// ```
    /// use torrentkit::bencode::decode;
    ///
    /// let value = decode(b"d3:foo3:bare").unwrap();
    /// assert_eq!(value.get(b"foo").and_then(|v| v.as_str()), Some("bar"));
    /// assert_eq!(value.get(b"missing"), None);
    /// ```
    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        self.as_dict()?.get(key)
    }

    /// Inserts `value` under `key` if this is a dictionary.
    ///
    /// Returns the previous value for the key, if any.
    pub fn insert(&mut self, key: impl Into<Bytes>, value: impl Into<Value>) -> Option<Value> {
        self.as_dict_mut()?.insert(key.into(), value.into())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<u64> for Value {
    fn from(i: u64) -> Self {
        match i64::try_from(i) {
            Ok(small) => Value::Integer(small),
            Err(_) => Value::BigInteger(BigInt::from(i)),
        }
    }
}

impl From<BigInt> for Value {
    fn from(i: BigInt) -> Self {
        Value::big(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Integer(b as i64)
    }
}

/// Bencode only has integers; a non-integral number is rounded to the
/// nearest integer and a data corruption warning is logged.
impl From<f64> for Value {
    fn from(f: f64) -> Self {
        let rounded = f.round();
        if rounded != f {
            tracing::warn!(
                value = f,
                converted = rounded,
                "possible data corruption: bencode only supports integers"
            );
        }
        match rounded.to_i64() {
            Some(i) => Value::Integer(i),
            None => BigInt::from(rounded as i128).into(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Bytes(Bytes::from(s))
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(Bytes::from(b))
    }
}

impl From<Vec<Value>> for Value {
    fn from(l: Vec<Value>) -> Self {
        Value::List(l)
    }
}

impl From<BTreeMap<Bytes, Value>> for Value {
    fn from(d: BTreeMap<Bytes, Value>) -> Self {
        Value::Dict(d)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
