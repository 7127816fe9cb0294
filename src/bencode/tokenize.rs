use bytes::{Bytes, BytesMut};

use super::error::BencodeError;

/// Largest up-front allocation for a byte string body. Longer strings grow
/// as their bytes actually arrive.
const MAX_PREALLOC: usize = 64 * 1024;

/// A lexical unit of the bencode grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    /// Raw bytes between `i` and `e`, not yet validated.
    Integer(Bytes),
    ByteString(Bytes),
    ListStart,
    ListEnd,
    DictStart,
    DictEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delimiter {
    List,
    Dict,
}

#[derive(Debug, Default)]
enum State {
    #[default]
    AwaitingTokenStart,
    InInteger(BytesMut),
    InByteStringLength(usize),
    InByteStringBody {
        buf: BytesMut,
        remaining: usize,
    },
}

/// Byte-level state machine turning arbitrarily split input into tokens.
///
/// Chunk boundaries may fall anywhere, including inside a length prefix or
/// a string body. Every `l`/`d` pushes its closing delimiter on an
/// expectation stack so `e` can be resolved to the right end token.
#[derive(Debug, Default)]
pub(crate) struct Tokenizer {
    state: State,
    ends: Vec<Delimiter>,
    offset: u64,
}

impl Tokenizer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Consumes `chunk`, handing every completed token to `emit` before the
    /// next byte is looked at. Errors therefore surface in input order
    /// whichever side, tokenizer or `emit`, raises them.
    pub(crate) fn feed<F>(&mut self, mut chunk: &[u8], mut emit: F) -> Result<(), BencodeError>
    where
        F: FnMut(Token) -> Result<(), BencodeError>,
    {
        while !chunk.is_empty() {
            let state = std::mem::take(&mut self.state);
            let mut token = None;
            let (next, used) = self.step(state, chunk, &mut token)?;
            self.state = next;
            self.offset += used as u64;
            chunk = &chunk[used..];
            if let Some(token) = token {
                emit(token)?;
            }
        }
        Ok(())
    }

    /// Checks that the input ended on a token boundary with every list and
    /// dictionary closed.
    pub(crate) fn finish(&self) -> Result<(), BencodeError> {
        match self.state {
            State::AwaitingTokenStart if self.ends.is_empty() => Ok(()),
            _ => Err(BencodeError::IncompleteStream),
        }
    }

    fn step(&mut self, state: State, chunk: &[u8], out: &mut Option<Token>) -> Result<(State, usize), BencodeError> {
        match state {
            State::AwaitingTokenStart => {
                let byte = chunk[0];
                let next = match byte {
                    b'i' => State::InInteger(BytesMut::new()),
                    b'0'..=b'9' => State::InByteStringLength((byte - b'0') as usize),
                    b'l' => {
                        self.ends.push(Delimiter::List);
                        *out = Some(Token::ListStart);
                        State::AwaitingTokenStart
                    }
                    b'd' => {
                        self.ends.push(Delimiter::Dict);
                        *out = Some(Token::DictStart);
                        State::AwaitingTokenStart
                    }
                    b'e' => {
                        let end = self
                            .ends
                            .pop()
                            .ok_or(BencodeError::UnbalancedDelimiter { offset: self.offset })?;
                        *out = Some(match end {
                            Delimiter::List => Token::ListEnd,
                            Delimiter::Dict => Token::DictEnd,
                        });
                        State::AwaitingTokenStart
                    }
                    _ => {
                        return Err(BencodeError::UnexpectedByte {
                            byte,
                            offset: self.offset,
                        })
                    }
                };
                Ok((next, 1))
            }
            State::InInteger(mut buf) => match chunk.iter().position(|&b| b == b'e') {
                Some(end) => {
                    buf.extend_from_slice(&chunk[..end]);
                    *out = Some(Token::Integer(buf.freeze()));
                    Ok((State::AwaitingTokenStart, end + 1))
                }
                None => {
                    buf.extend_from_slice(chunk);
                    Ok((State::InInteger(buf), chunk.len()))
                }
            },
            State::InByteStringLength(mut len) => {
                for (i, &byte) in chunk.iter().enumerate() {
                    match byte {
                        b'0'..=b'9' => {
                            len = len
                                .checked_mul(10)
                                .and_then(|l| l.checked_add((byte - b'0') as usize))
                                .ok_or(BencodeError::InvalidStringLength)?;
                        }
                        b':' if len == 0 => {
                            *out = Some(Token::ByteString(Bytes::new()));
                            return Ok((State::AwaitingTokenStart, i + 1));
                        }
                        b':' => {
                            let buf = BytesMut::with_capacity(len.min(MAX_PREALLOC));
                            return Ok((State::InByteStringBody { buf, remaining: len }, i + 1));
                        }
                        _ => {
                            return Err(BencodeError::UnexpectedByte {
                                byte,
                                offset: self.offset + i as u64,
                            })
                        }
                    }
                }
                Ok((State::InByteStringLength(len), chunk.len()))
            }
            State::InByteStringBody { mut buf, remaining } => {
                let take = remaining.min(chunk.len());
                buf.extend_from_slice(&chunk[..take]);
                if take == remaining {
                    *out = Some(Token::ByteString(buf.freeze()));
                    Ok((State::AwaitingTokenStart, take))
                } else {
                    Ok((
                        State::InByteStringBody {
                            buf,
                            remaining: remaining - take,
                        },
                        take,
                    ))
                }
            }
        }
    }
}
