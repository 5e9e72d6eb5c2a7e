use std::borrow::Cow;
use std::result::Result as StdResult;

use thiserror::Error;

/// Alias for `Result<T, bencode::Error>`.
pub type Result<T> = StdResult<T, Error>;

/// Represents all possible errors which can occur when decoding or encoding bencode.
///
/// Every decoding failure records the byte offset at which the violation was detected. No partial
/// value is ever returned alongside an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The input ended in the middle of a value.
    #[error("End of stream at byte {offset}")]
    EndOfStream { offset: usize },

    /// A structural violation of the bencode grammar.
    #[error("Malformed bencode at byte {offset}: {reason}")]
    Malformed {
        offset: usize,
        reason: Cow<'static, str>,
    },

    /// A dictionary contained the same key twice (strict mode only).
    #[error("Duplicate dictionary key `{key}` at byte {offset}")]
    DuplicateKey { offset: usize, key: String },

    /// Bytes remained after the root value (strict mode only).
    #[error("Trailing data after the root value at byte {offset}")]
    TrailingData { offset: usize },

    /// Nesting of lists and dictionaries went deeper than the decoder allows.
    #[error("Nesting deeper than {limit} levels at byte {offset}")]
    TooDeep { offset: usize, limit: usize },

    /// A foreign value (json, yaml, toml) has no bencode representation.
    #[error("Cannot represent {0} as bencode")]
    Unrepresentable(Cow<'static, str>),
}

impl Error {
    pub(crate) fn malformed(offset: usize, reason: impl Into<Cow<'static, str>>) -> Self {
        Error::Malformed {
            offset,
            reason: reason.into(),
        }
    }

    /// Returns `true` when the error was raised while decoding input, as opposed to converting a
    /// foreign value into bencode.
    #[must_use]
    pub fn is_decode_error(&self) -> bool {
        !matches!(self, Error::Unrepresentable(_))
    }

    /// Byte offset of the violation, if the error came from the decoder.
    pub fn offset(&self) -> Option<usize> {
        match *self {
            Error::EndOfStream { offset }
            | Error::Malformed { offset, .. }
            | Error::DuplicateKey { offset, .. }
            | Error::TrailingData { offset }
            | Error::TooDeep { offset, .. } => Some(offset),
            Error::Unrepresentable(_) => None,
        }
    }
}
