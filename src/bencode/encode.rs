use std::collections::{btree_map, HashMap};
use std::slice;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use futures::channel::mpsc;
use parking_lot::Mutex;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::value::Value;

const LIST_START: &[u8] = b"l";
const DICT_START: &[u8] = b"d";
const END: &[u8] = b"e";

/// One step of a structural path into a bencode value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// A dictionary key.
    Key(Bytes),
    /// A list index, counted over the source list (skipped nulls included).
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(Bytes::copy_from_slice(key.as_bytes()))
    }
}

impl From<&[u8]> for PathSegment {
    fn from(key: &[u8]) -> Self {
        PathSegment::Key(Bytes::copy_from_slice(key))
    }
}

impl From<Bytes> for PathSegment {
    fn from(key: Bytes) -> Self {
        PathSegment::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// What a hook receives while the encoder walks its subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookEvent {
    /// A chunk of the encoded subtree, identical to the one in the main output.
    Chunk(Bytes),
    /// The subtree is fully encoded. Sent exactly once per visit.
    Done,
}

type HookHandler = Box<dyn FnMut(HookEvent) + Send>;

/// Per-call registry of side-channel handlers keyed by structural path.
///
/// A handler registered for a path sees every chunk the encoder produces
/// for the value at that path, followed by [`HookEvent::Done`]. The main
/// output is unchanged.
///
/// ```
/// use torrentkit::bencode::{decode, encode_with_hooks, EncodeHooks};
///
/// let value = decode(b"d4:infod4:name1:xee").unwrap();
/// let mut hooks = EncodeHooks::new();
/// let info = hooks.capture(["info"]);
///
/// let encoded = encode_with_hooks(&value, &mut hooks);
/// assert_eq!(encoded, b"d4:infod4:name1:xee");
/// assert_eq!(info.bytes().unwrap().as_ref(), b"d4:name1:xe");
/// ```
#[derive(Default)]
pub struct EncodeHooks {
    paths: HashMap<Vec<PathSegment>, usize>,
    handlers: Vec<HookHandler>,
}

impl EncodeHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `path`, replacing any earlier handler there.
    pub fn register<P, F>(&mut self, path: P, handler: F)
    where
        P: IntoIterator,
        P::Item: Into<PathSegment>,
        F: FnMut(HookEvent) + Send + 'static,
    {
        let path: Vec<PathSegment> = path.into_iter().map(Into::into).collect();
        self.handlers.push(Box::new(handler));
        self.paths.insert(path, self.handlers.len() - 1);
    }

    /// Registers a hook that accumulates the subtree bytes into a shared buffer.
    pub fn capture<P>(&mut self, path: P) -> Capture
    where
        P: IntoIterator,
        P::Item: Into<PathSegment>,
    {
        let capture = Capture::default();
        let sink = capture.clone();
        self.register(path, move |event| sink.apply(event));
        capture
    }

    /// Registers a hook that forwards events into an unbounded channel.
    ///
    /// Dropping the receiver is allowed; later events are discarded.
    pub fn channel<P>(&mut self, path: P) -> mpsc::UnboundedReceiver<HookEvent>
    where
        P: IntoIterator,
        P::Item: Into<PathSegment>,
    {
        let (tx, rx) = mpsc::unbounded();
        self.register(path, move |event| {
            let _ = tx.unbounded_send(event);
        });
        rx
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    fn lookup(&self, path: &[PathSegment]) -> Option<usize> {
        self.paths.get(path).copied()
    }

    fn fire(&mut self, id: usize, event: HookEvent) {
        (self.handlers[id])(event);
    }
}

#[derive(Debug, Default)]
struct CaptureState {
    buf: BytesMut,
    done: bool,
}

/// Bytes captured by an [`EncodeHooks::capture`] hook.
#[derive(Debug, Clone, Default)]
pub struct Capture {
    state: Arc<Mutex<CaptureState>>,
}

impl Capture {
    /// Returns the captured bytes once the subtree has been fully encoded.
    pub fn bytes(&self) -> Option<Bytes> {
        let state = self.state.lock();
        state.done.then(|| Bytes::copy_from_slice(&state.buf))
    }

    pub fn is_done(&self) -> bool {
        self.state.lock().done
    }

    fn apply(&self, event: HookEvent) {
        let mut state = self.state.lock();
        match event {
            HookEvent::Chunk(chunk) => state.buf.extend_from_slice(&chunk),
            HookEvent::Done => state.done = true,
        }
    }
}

enum Frame<'a> {
    Value {
        value: &'a Value,
        hook: Option<usize>,
    },
    List {
        items: slice::Iter<'a, Value>,
        index: usize,
    },
    Dict {
        entries: btree_map::Iter<'a, Bytes, Value>,
    },
    Chunk(Bytes),
    Leave {
        hook: Option<usize>,
    },
}

/// Lazy bencode encoder yielding the output as a sequence of chunks.
///
/// Traversal uses an explicit work stack, so deeply nested values never
/// recurse. Dictionary entries come out in ascending byte order of their
/// keys and [`Value::Null`] entries are dropped.
///
/// ```
/// use torrentkit::bencode::{Encoder, Value};
///
/// let list = Value::List(vec![Value::Integer(1), Value::string("two")]);
/// let chunks: Vec<_> = Encoder::new(&list).collect();
/// assert_eq!(chunks.concat(), b"li1e3:twoe");
/// ```
pub struct Encoder<'a> {
    stack: Vec<Frame<'a>>,
    path: Vec<PathSegment>,
    hooks: Option<&'a mut EncodeHooks>,
    active: Vec<usize>,
}

impl<'a> Encoder<'a> {
    pub fn new(value: &'a Value) -> Self {
        Self {
            stack: vec![Frame::Value { value, hook: None }],
            path: Vec::new(),
            hooks: None,
            active: Vec::new(),
        }
    }

    pub fn with_hooks(value: &'a Value, hooks: &'a mut EncodeHooks) -> Self {
        let hook = hooks.lookup(&[]);
        let mut stack = Vec::with_capacity(2);
        if hook.is_some() {
            stack.push(Frame::Leave { hook });
        }
        stack.push(Frame::Value { value, hook });
        Self {
            stack,
            path: Vec::new(),
            hooks: Some(hooks),
            active: Vec::new(),
        }
    }

    fn enter(&mut self, segment: PathSegment, value: &'a Value) {
        self.path.push(segment);
        let hook = self
            .hooks
            .as_deref()
            .and_then(|hooks| hooks.lookup(&self.path));
        self.stack.push(Frame::Leave { hook });
        self.stack.push(Frame::Value { value, hook });
    }

    fn leave(&mut self, hook: Option<usize>) {
        self.path.pop();
        if let Some(id) = hook {
            self.active.pop();
            if let Some(hooks) = self.hooks.as_deref_mut() {
                hooks.fire(id, HookEvent::Done);
            }
        }
    }

    fn emit(&mut self, chunk: Bytes) -> Bytes {
        if let Some(hooks) = self.hooks.as_deref_mut() {
            for &id in &self.active {
                hooks.fire(id, HookEvent::Chunk(chunk.clone()));
            }
        }
        chunk
    }
}

impl Iterator for Encoder<'_> {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        while let Some(frame) = self.stack.pop() {
            match frame {
                Frame::Value { value, hook } => {
                    if let Some(id) = hook {
                        self.active.push(id);
                    }
                    match value {
                        Value::Null => {}
                        Value::Integer(i) => {
                            return Some(self.emit(Bytes::from(format!("i{}e", i))));
                        }
                        Value::BigInteger(i) => {
                            return Some(self.emit(Bytes::from(format!("i{}e", i))));
                        }
                        Value::Bytes(b) => {
                            self.stack.push(Frame::Chunk(b.clone()));
                            return Some(self.emit(Bytes::from(format!("{}:", b.len()))));
                        }
                        Value::List(items) => {
                            self.stack.push(Frame::List {
                                items: items.iter(),
                                index: 0,
                            });
                            return Some(self.emit(Bytes::from_static(LIST_START)));
                        }
                        Value::Dict(entries) => {
                            self.stack.push(Frame::Dict {
                                entries: entries.iter(),
                            });
                            return Some(self.emit(Bytes::from_static(DICT_START)));
                        }
                    }
                }
                Frame::List { mut items, index } => match items.next() {
                    None => return Some(self.emit(Bytes::from_static(END))),
                    Some(item) => {
                        self.stack.push(Frame::List {
                            items,
                            index: index + 1,
                        });
                        if !item.is_null() {
                            self.enter(PathSegment::Index(index), item);
                        }
                    }
                },
                Frame::Dict { mut entries } => match entries.find(|(_, v)| !v.is_null()) {
                    None => return Some(self.emit(Bytes::from_static(END))),
                    Some((key, value)) => {
                        self.stack.push(Frame::Dict { entries });
                        let mut chunk = BytesMut::with_capacity(key.len() + 8);
                        chunk.put_slice(format!("{}:", key.len()).as_bytes());
                        chunk.put_slice(key);
                        // The key belongs to the enclosing dictionary, so it is
                        // emitted before the value's hook becomes active.
                        let chunk = self.emit(chunk.freeze());
                        self.enter(PathSegment::Key(key.clone()), value);
                        return Some(chunk);
                    }
                },
                Frame::Chunk(chunk) => return Some(self.emit(chunk)),
                Frame::Leave { hook } => self.leave(hook),
            }
        }
        None
    }
}

/// Encodes a bencode value to a byte vector.
///
/// ```
/// use torrentkit::bencode::{encode, Value};
/// use std::collections::BTreeMap;
/// use bytes::Bytes;
///
/// assert_eq!(encode(&Value::Integer(42)), b"i42e");
/// assert_eq!(encode(&Value::string("hello")), b"5:hello");
///
/// // Keys come out sorted no matter how the map was filled
/// let mut dict = BTreeMap::new();
/// dict.insert(Bytes::from_static(b"b"), Value::Integer(2));
/// dict.insert(Bytes::from_static(b"a"), Value::Integer(1));
/// dict.insert(Bytes::from_static(b"c"), Value::Null);
/// assert_eq!(encode(&Value::Dict(dict)), b"d1:ai1e1:bi2ee");
/// ```
pub fn encode(value: &Value) -> Vec<u8> {
    collect(Encoder::new(value))
}

/// Encodes a value, feeding the registered hooks along the way.
pub fn encode_with_hooks(value: &Value, hooks: &mut EncodeHooks) -> Vec<u8> {
    collect(Encoder::with_hooks(value, hooks))
}

/// Streams the encoding of `value` into `writer`, returning the byte count.
pub async fn write_to<W>(value: &Value, writer: &mut W) -> std::io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0u64;
    for chunk in Encoder::new(value) {
        writer.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    writer.flush().await?;
    Ok(written)
}

fn collect(encoder: Encoder<'_>) -> Vec<u8> {
    let mut buf = Vec::new();
    for chunk in encoder {
        buf.extend_from_slice(&chunk);
    }
    buf
}
