use bytes::Bytes;
use futures::{pin_mut, Stream, StreamExt};
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

use super::error::BencodeError;
use super::parse::Parser;
use super::tokenize::Tokenizer;
use super::value::Value;

/// Incremental decoder driving the tokenizer and the parser.
///
/// Input can be fed in chunks of any size; the result is only available
/// once [`Decoder::finish`] confirms the input ended cleanly.
///
/// ```
/// use torrentkit::bencode::{Decoder, Value};
///
/// let mut decoder = Decoder::new();
/// decoder.feed(b"l4:sp").unwrap();
/// decoder.feed(b"ami4").unwrap();
/// decoder.feed(b"2ee").unwrap();
///
/// let value = decoder.finish().unwrap();
/// assert_eq!(value, Value::List(vec![Value::string("spam"), Value::Integer(42)]));
/// ```
#[derive(Default)]
pub struct Decoder {
    tokenizer: Tokenizer,
    parser: Parser,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            tokenizer: Tokenizer::new(),
            parser: Parser::new(),
        }
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Result<(), BencodeError> {
        let parser = &mut self.parser;
        self.tokenizer.feed(chunk, |token| parser.push(token))
    }

    pub fn finish(self) -> Result<Value, BencodeError> {
        self.tokenizer.finish()?;
        self.parser.finish()
    }
}

/// Decodes a complete bencode value from a byte slice.
///
/// ```
/// use torrentkit::bencode::{decode, Value};
///
/// assert_eq!(decode(b"i42e").unwrap(), Value::Integer(42));
/// assert!(decode(b"i-0e").is_err());
/// assert!(decode(b"i1ei2e").is_err());
/// ```
pub fn decode(data: &[u8]) -> Result<Value, BencodeError> {
    let mut decoder = Decoder::new();
    decoder.feed(data)?;
    decoder.finish()
}

/// Decodes a value from a stream of byte chunks.
pub async fn decode_stream<S>(stream: S) -> Result<Value, BencodeError>
where
    S: Stream<Item = std::io::Result<Bytes>>,
{
    pin_mut!(stream);
    let mut decoder = Decoder::new();
    while let Some(chunk) = stream.next().await {
        decoder.feed(&chunk?)?;
    }
    decoder.finish()
}

/// Decodes a value from an async reader, reading until EOF.
pub async fn decode_reader<R>(reader: R) -> Result<Value, BencodeError>
where
    R: AsyncRead,
{
    decode_stream(ReaderStream::new(reader)).await
}
