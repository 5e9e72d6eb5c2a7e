//! Encode and decode data in the [Bencode](https://en.wikipedia.org/wiki/Bencode) format.
//!
//! Bencode is a simple binary encoding format used in various contexts, most notably in
//! BitTorrent. Input is decoded into the [`Value`] tree with [`parse`] (or [`parse_with`] for
//! strict decoding), and any [`Value`] can be written back with [`to_bytes`], which always
//! produces the canonical form: dictionary keys in ascending byte order.

mod error;
mod ser;
mod value;

pub use error::{Error, Result};
pub use ser::{to_bytes, to_string, Serializer};
pub use value::{Dictionary, Value, ValueInput};

/// Maximum nesting of lists and dictionaries accepted by the decoder.
pub const MAX_DEPTH: usize = 512;

/// Knobs for the decoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Reject dictionaries that repeat a key and input with bytes after the root value. When
    /// disabled the last occurrence of a repeated key wins and trailing bytes are ignored.
    pub strict: bool,
}

impl DecodeOptions {
    pub fn strict() -> Self {
        Self { strict: true }
    }
}

/// Parses the given value into bencode [Value]
///
/// Input can be either in the form of bytes or string
pub fn parse<'a, T>(input: T) -> Result<Value>
where
    T: Into<ValueInput<'a>>,
{
    parse_with(input, DecodeOptions::default())
}

/// Same as [`parse`] but with explicit [`DecodeOptions`].
pub fn parse_with<'a, T>(input: T, options: DecodeOptions) -> Result<Value>
where
    T: Into<ValueInput<'a>>,
{
    let mut bencode = Bencode {
        input: input.into().as_bytes(),
        pos: 0,
        options,
    };

    let value = bencode.parse(0)?;

    if options.strict && bencode.pos != bencode.input.len() {
        return Err(Error::TrailingData {
            offset: bencode.pos,
        });
    }

    Ok(value)
}

struct Bencode<'a> {
    input: &'a [u8],
    pos: usize,
    options: DecodeOptions,
}

impl<'a> Bencode<'a> {
    fn peek(&self) -> Result<u8> {
        self.input
            .get(self.pos)
            .copied()
            .ok_or(Error::EndOfStream { offset: self.pos })
    }

    fn parse(&mut self, depth: usize) -> Result<Value> {
        match self.peek()? {
            b'0'..=b'9' => Ok(Value::Bytes(self.parse_bytes()?)),
            b'i' => Ok(Value::Integer(self.parse_integer()?)),
            b'l' => {
                self.check_depth(depth)?;
                Ok(Value::List(self.parse_list(depth)?))
            }
            b'd' => {
                self.check_depth(depth)?;
                Ok(Value::Dictionary(self.parse_dictionary(depth)?))
            }
            b'-' => Err(Error::malformed(self.pos, "negative byte string length")),
            other => Err(Error::malformed(
                self.pos,
                format!("unexpected byte 0x{other:02x}, expected a bencode value"),
            )),
        }
    }

    fn check_depth(&self, depth: usize) -> Result<()> {
        if depth >= MAX_DEPTH {
            Err(Error::TooDeep {
                offset: self.pos,
                limit: MAX_DEPTH,
            })
        } else {
            Ok(())
        }
    }

    /// Returns the bytes up to (not including) `delim`, moving the cursor past it.
    fn take_until(&mut self, delim: u8) -> Result<&'a [u8]> {
        let input = self.input;
        let rest = &input[self.pos..];
        let end = rest.iter().position(|&b| b == delim).ok_or(Error::EndOfStream {
            offset: self.input.len(),
        })?;
        self.pos += end + 1;
        Ok(&rest[..end])
    }

    fn parse_integer(&mut self) -> Result<i64> {
        let start = self.pos;

        // eat the 'i' tag
        self.pos += 1;
        let int_bytes = self.take_until(b'e')?;

        let (is_negative, digits) = match int_bytes.split_first() {
            Some((b'-', rest)) => (true, rest),
            _ => (false, int_bytes),
        };

        if digits.is_empty() {
            return Err(Error::malformed(start, "empty integer"));
        }

        if digits[0] == b'0' && (digits.len() > 1 || is_negative) {
            return Err(Error::malformed(start, "integer with leading zeros or negative zero"));
        }

        // Accumulating as a negative number lets i64::MIN through without overflowing.
        let mut value: i64 = 0;
        for &byte in digits {
            if !byte.is_ascii_digit() {
                return Err(Error::malformed(start, "invalid character in integer"));
            }

            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_sub(i64::from(byte - b'0')))
                .ok_or_else(|| Error::malformed(start, "integer overflow"))?;
        }

        if is_negative {
            Ok(value)
        } else {
            value
                .checked_neg()
                .ok_or_else(|| Error::malformed(start, "integer overflow"))
        }
    }

    fn parse_bytes(&mut self) -> Result<Vec<u8>> {
        let start = self.pos;
        let len_bytes = self.take_until(b':')?;

        let len = len_bytes.iter().try_fold(0usize, |acc, &byte| {
            if !byte.is_ascii_digit() {
                return Err(Error::malformed(
                    start,
                    format!(
                        "non digit character '{}' in byte string length",
                        char::from(byte).escape_default()
                    ),
                ));
            }

            acc.checked_mul(10)
                .and_then(|v| v.checked_add(usize::from(byte - b'0')))
                .ok_or_else(|| Error::malformed(start, "byte string length overflow"))
        })?;

        let remaining = self.input.len() - self.pos;
        if len > remaining {
            return Err(Error::EndOfStream {
                offset: self.input.len(),
            });
        }

        let bytes = self.input[self.pos..self.pos + len].to_vec();
        self.pos += len;

        Ok(bytes)
    }

    fn parse_list(&mut self, depth: usize) -> Result<Vec<Value>> {
        let mut list = Vec::new();

        // eat the 'l' tag
        self.pos += 1;

        while self.peek()? != b'e' {
            list.push(self.parse(depth + 1)?);
        }

        // eat the 'e' tag
        self.pos += 1;

        Ok(list)
    }

    fn parse_dictionary(&mut self, depth: usize) -> Result<Dictionary> {
        let mut dictionary = Dictionary::new();

        // eat the 'd' tag
        self.pos += 1;

        while self.peek()? != b'e' {
            let key_offset = self.pos;
            if !self.peek()?.is_ascii_digit() {
                return Err(Error::malformed(
                    key_offset,
                    "only byte strings are allowed as dictionary keys",
                ));
            }

            let key = self.parse_bytes()?;
            if self.options.strict && dictionary.contains_key(&key) {
                return Err(Error::DuplicateKey {
                    offset: key_offset,
                    key: String::from_utf8_lossy(&key).into_owned(),
                });
            }

            let value = self.parse(depth + 1)?;
            dictionary.insert(key, value);
        }

        // eat the 'e' tag
        self.pos += 1;

        Ok(dictionary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_string() {
        let bencode = parse("5:hello").unwrap();
        assert_eq!(Value::from("hello"), bencode);

        let bencode = parse(b"0:").unwrap();
        assert_eq!(Value::Bytes(Vec::new()), bencode);

        let bencode_err = parse(b"10:hello");
        assert_eq!(
            bencode_err.unwrap_err(),
            Error::EndOfStream { offset: 8 }
        );

        let bencode_err = parse(b"1d0:hello");
        assert_eq!(
            "Malformed bencode at byte 0: non digit character 'd' in byte string length",
            bencode_err.unwrap_err().to_string()
        );
    }

    #[test]
    fn test_parse_binary_string() {
        let bencode = parse(b"3:\xff\x00\xfe").unwrap();
        assert_eq!(Value::Bytes(vec![0xff, 0x00, 0xfe]), bencode);
    }

    #[test]
    fn test_negative_length_is_rejected() {
        let bencode_err = parse(b"-3:abc").unwrap_err();
        assert_eq!(
            "Malformed bencode at byte 0: negative byte string length",
            bencode_err.to_string()
        );
    }

    #[test]
    fn test_parse_integer() {
        assert_eq!(Value::Integer(21), parse(b"i21e").unwrap());
        assert_eq!(Value::Integer(-21), parse(b"i-21e").unwrap());
        assert_eq!(Value::Integer(0), parse(b"i0e").unwrap());
        assert_eq!(Value::Integer(i64::MIN), parse(b"i-9223372036854775808e").unwrap());
        assert_eq!(Value::Integer(i64::MAX), parse(b"i9223372036854775807e").unwrap());

        assert_eq!(
            "Malformed bencode at byte 0: invalid character in integer",
            parse(b"i32je").unwrap_err().to_string()
        );
        assert_eq!(
            "Malformed bencode at byte 0: empty integer",
            parse(b"ie").unwrap_err().to_string()
        );
        assert_eq!(
            "Malformed bencode at byte 0: integer with leading zeros or negative zero",
            parse(b"i004e").unwrap_err().to_string()
        );
        assert!(parse(b"i-0e").is_err());
        assert!(parse(b"i9223372036854775808e").is_err());
        assert!(parse(b"i12").is_err());
    }

    #[test]
    fn parse_list() {
        let bencode = parse("li32ei42ei52e5:helloe").unwrap();
        assert_eq!(
            Value::List(vec![
                Value::Integer(32),
                Value::Integer(42),
                Value::Integer(52),
                Value::from("hello")
            ]),
            bencode
        );

        let bencode_err = parse(b"li32ei42ei52e5:hello");
        assert_eq!(bencode_err.unwrap_err(), Error::EndOfStream { offset: 20 });
    }

    #[test]
    fn test_dictionary_bencode() {
        let bencode = parse("d3:cow3:moo4:spam4:eggse").unwrap();
        let mut dictionary = Dictionary::new();
        dictionary.insert(b"cow".to_vec(), Value::from("moo"));
        dictionary.insert(b"spam".to_vec(), Value::from("eggs"));
        assert_eq!(bencode, Value::Dictionary(dictionary));

        let bencode_err = parse("di2e3:moo4:spam4:eggse");
        assert_eq!(
            "Malformed bencode at byte 1: only byte strings are allowed as dictionary keys",
            bencode_err.unwrap_err().to_string()
        );
    }

    #[test]
    fn test_dictionary_truncated_length_prefix() {
        let bencode_err = parse("d3:cow3:moo4:spam12").unwrap_err();
        assert!(matches!(bencode_err, Error::EndOfStream { .. }));
        assert!(bencode_err.is_decode_error());
    }

    #[test]
    fn test_duplicate_keys() {
        let input = "d3:cowi1e3:cowi2ee";

        let lenient = parse(input).unwrap();
        assert_eq!(lenient.get("cow"), Some(&Value::Integer(2)));

        let strict = parse_with(input, DecodeOptions::strict()).unwrap_err();
        assert_eq!(
            strict,
            Error::DuplicateKey {
                offset: 9,
                key: "cow".to_string()
            }
        );
    }

    #[test]
    fn test_trailing_data() {
        assert_eq!(parse("i1e\n").unwrap(), Value::Integer(1));
        assert_eq!(
            parse_with("i1e\n", DecodeOptions::strict()).unwrap_err(),
            Error::TrailingData { offset: 3 }
        );
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}{}", "l".repeat(MAX_DEPTH + 1), "e".repeat(MAX_DEPTH + 1));
        assert!(matches!(parse(&deep), Err(Error::TooDeep { .. })));

        let fine = format!("{}{}", "l".repeat(MAX_DEPTH), "e".repeat(MAX_DEPTH));
        assert!(parse(&fine).is_ok());
    }

    #[test]
    fn invalid_becode() {
        let bencode_err = parse("werd");
        assert_eq!(
            "Malformed bencode at byte 0: unexpected byte 0x77, expected a bencode value",
            bencode_err.unwrap_err().to_string()
        );
    }

    #[test]
    fn test_empty_input() {
        let bencode = parse("");
        assert_eq!("End of stream at byte 0", bencode.unwrap_err().to_string());
    }
}
