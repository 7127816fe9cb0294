use bytes::Bytes;
use num_bigint::BigInt;
use std::collections::BTreeMap;

use super::error::BencodeError;
use super::tokenize::Token;
use super::value::Value;

enum Context {
    List(Vec<Value>),
    Dict {
        entries: BTreeMap<Bytes, Value>,
        key: Option<Bytes>,
    },
}

/// Token-level state machine assembling a single [`Value`].
///
/// The context stack holds the containers still open. A dictionary context
/// alternates between waiting for a key and waiting for that key's value.
#[derive(Default)]
pub(crate) struct Parser {
    stack: Vec<Context>,
    result: Option<Value>,
}

impl Parser {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, token: Token) -> Result<(), BencodeError> {
        let value = match token {
            Token::ByteString(bytes) => {
                if let Some(Context::Dict { key: key @ None, .. }) = self.stack.last_mut() {
                    *key = Some(bytes);
                    return Ok(());
                }
                self.expect_value()?;
                Value::Bytes(bytes)
            }
            Token::Integer(raw) => {
                self.expect_value()?;
                parse_integer(&raw)?
            }
            Token::ListStart => {
                self.expect_value()?;
                self.stack.push(Context::List(Vec::new()));
                return Ok(());
            }
            Token::DictStart => {
                self.expect_value()?;
                self.stack.push(Context::Dict {
                    entries: BTreeMap::new(),
                    key: None,
                });
                return Ok(());
            }
            Token::ListEnd => match self.stack.pop() {
                Some(Context::List(items)) => Value::List(items),
                _ => return Err(BencodeError::UnexpectedToken("list end")),
            },
            Token::DictEnd => match self.stack.pop() {
                Some(Context::Dict { entries, key: None }) => Value::Dict(entries),
                Some(Context::Dict { .. }) => {
                    return Err(BencodeError::UnexpectedToken("dictionary end before value"))
                }
                _ => return Err(BencodeError::UnexpectedToken("dictionary end")),
            },
        };
        self.complete(value)
    }

    pub(crate) fn finish(self) -> Result<Value, BencodeError> {
        if !self.stack.is_empty() {
            return Err(BencodeError::IncompleteStream);
        }
        self.result.ok_or(BencodeError::IncompleteStream)
    }

    fn expect_value(&self) -> Result<(), BencodeError> {
        match self.stack.last() {
            None if self.result.is_some() => Err(BencodeError::TrailingData),
            Some(Context::Dict { key: None, .. }) => {
                Err(BencodeError::UnexpectedToken("dictionary key must be a byte string"))
            }
            _ => Ok(()),
        }
    }

    fn complete(&mut self, value: Value) -> Result<(), BencodeError> {
        match self.stack.last_mut() {
            None => self.result = Some(value),
            Some(Context::List(items)) => items.push(value),
            Some(Context::Dict { entries, key }) => {
                let key = key
                    .take()
                    .ok_or(BencodeError::UnexpectedToken("value without dictionary key"))?;
                // Duplicate keys: the later value replaces the earlier one.
                entries.insert(key, value);
            }
        }
        Ok(())
    }
}

/// Parses the raw bytes of an integer token.
///
/// Digits accumulate in an `i64` and switch to [`BigInt`] at the first digit
/// that would overflow, so no precision is lost on the way.
pub(crate) fn parse_integer(raw: &[u8]) -> Result<Value, BencodeError> {
    let (negative, digits) = match raw.split_first() {
        Some((b'-', rest)) => (true, rest),
        _ => (false, raw),
    };

    if digits.is_empty() {
        return Err(BencodeError::InvalidInteger(
            String::from_utf8_lossy(raw).into_owned(),
        ));
    }
    if digits[0] == b'0' {
        if negative {
            return Err(BencodeError::NegativeZero);
        }
        if digits.len() > 1 {
            return Err(BencodeError::LeadingZeros);
        }
    }

    let mut small: i64 = 0;
    let mut big: Option<BigInt> = None;

    for &byte in digits {
        if !byte.is_ascii_digit() {
            return Err(BencodeError::InvalidInteger(
                String::from_utf8_lossy(raw).into_owned(),
            ));
        }
        let digit = (byte - b'0') as u32;

        if let Some(n) = big.as_mut() {
            *n *= 10u32;
            if negative {
                *n -= digit;
            } else {
                *n += digit;
            }
            continue;
        }

        let next = small.checked_mul(10).and_then(|v| {
            if negative {
                v.checked_sub(digit as i64)
            } else {
                v.checked_add(digit as i64)
            }
        });
        match next {
            Some(v) => small = v,
            None => {
                let mut n = BigInt::from(small);
                n *= 10u32;
                if negative {
                    n -= digit;
                } else {
                    n += digit;
                }
                big = Some(n);
            }
        }
    }

    Ok(match big {
        Some(n) => Value::BigInteger(n),
        None => Value::Integer(small),
    })
}
