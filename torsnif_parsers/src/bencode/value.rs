use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use std::{borrow::Cow, collections::BTreeMap, fmt::Display};

use super::error::Error;

/// Dictionary representation used by [`Value::Dictionary`].
///
/// Keys are raw byte strings and the map keeps them in ascending byte order, which is exactly the
/// order canonical bencode requires.
pub type Dictionary = BTreeMap<Vec<u8>, Value>;

/// Reprasents Bencode values as a rust enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Integer(i64),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Dictionary(Dictionary),
}

pub enum ValueInput<'a> {
    Str(&'a str),
    Bytes(&'a [u8]),
}

impl<'a> From<&'a str> for ValueInput<'a> {
    fn from(s: &'a str) -> Self {
        ValueInput::Str(s)
    }
}

impl<'a> From<&'a String> for ValueInput<'a> {
    fn from(s: &'a String) -> Self {
        ValueInput::Str(s)
    }
}

impl<'a> From<&'a [u8]> for ValueInput<'a> {
    fn from(b: &'a [u8]) -> Self {
        ValueInput::Bytes(b)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for ValueInput<'a> {
    fn from(b: &'a [u8; N]) -> Self {
        ValueInput::Bytes(b)
    }
}

impl<'a> From<&'a Vec<u8>> for ValueInput<'a> {
    fn from(b: &'a Vec<u8>) -> Self {
        ValueInput::Bytes(b)
    }
}

impl<'a> ValueInput<'a> {
    pub(crate) fn as_bytes(&self) -> &'a [u8] {
        match *self {
            ValueInput::Str(s) => s.as_bytes(),
            ValueInput::Bytes(b) => b,
        }
    }
}

impl Value {
    /// Human readable name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Bytes(_) => "byte string",
            Value::List(_) => "list",
            Value::Dictionary(_) => "dictionary",
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Interprets a byte string as text. Invalid UTF-8 sequences are replaced rather than
    /// rejected, since torrent files in the wild are frequently mis-encoded.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        self.as_bytes().map(String::from_utf8_lossy)
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dictionary(&self) -> Option<&Dictionary> {
        match self {
            Value::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    /// Looks up `key` when `self` is a dictionary.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_dictionary().and_then(|d| d.get(key.as_bytes()))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Bytes(s.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Bytes(s.into_bytes())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(l: Vec<Value>) -> Self {
        Value::List(l)
    }
}

impl From<Dictionary> for Value {
    fn from(d: Dictionary) -> Self {
        Value::Dictionary(d)
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = Error;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        use serde_json::Value as Json;

        match value {
            Json::Null => Err(Error::Unrepresentable("null".into())),
            Json::Bool(b) => Ok(Value::Integer(i64::from(b))),
            Json::Number(n) => n
                .as_i64()
                .map(Value::Integer)
                .ok_or_else(|| Error::Unrepresentable(format!("the number {n}").into())),
            Json::String(s) => Ok(Value::from(s)),
            Json::Array(items) => items
                .into_iter()
                .map(Value::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Json::Object(map) => map
                .into_iter()
                .map(|(k, v)| Ok((k.into_bytes(), Value::try_from(v)?)))
                .collect::<Result<Dictionary, _>>()
                .map(Value::Dictionary),
        }
    }
}

// Byte strings that are valid UTF-8 are emitted as strings, anything else as a hex string so
// that pieces and other binary blobs survive a trip through json or yaml.
impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Bytes(bytes) => match std::str::from_utf8(bytes) {
                Ok(s) => serializer.serialize_str(s),
                Err(_) => serializer.serialize_str(&hex::encode(bytes)),
            },
            Value::List(list) => {
                let mut seq = serializer.serialize_seq(Some(list.len()))?;
                for item in list {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Dictionary(dictionary) => {
                let mut map = serializer.serialize_map(Some(dictionary.len()))?;
                for (k, v) in dictionary {
                    map.serialize_entry(&String::from_utf8_lossy(k), v)?;
                }
                map.end()
            }
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{i}"),
            Value::Bytes(bytes) => match std::str::from_utf8(bytes) {
                Ok(s) => write!(f, "{s}"),
                Err(_) => write!(f, "/*BYTES*/"),
            },
            Value::List(list) => {
                write!(f, "[")?;
                for (i, bencode) in list.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{bencode}")?;
                }
                write!(f, "]")
            }
            Value::Dictionary(dictionary) => {
                write!(f, "{{")?;
                for (i, (k, v)) in dictionary.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} : {v}", String::from_utf8_lossy(k))?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_nested_values() {
        let mut dictionary = Dictionary::new();
        dictionary.insert(b"spam".to_vec(), Value::from("eggs"));
        dictionary.insert(
            b"list".to_vec(),
            Value::List(vec![Value::Integer(1), Value::from("two")]),
        );

        assert_eq!(
            Value::Dictionary(dictionary).to_string(),
            "{list : [1, two], spam : eggs}"
        );
    }

    #[test]
    fn serialize_binary_bytes_as_hex() {
        let value = Value::List(vec![Value::Bytes(vec![0xff, 0x00]), Value::from("ok")]);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"["ff00","ok"]"#);
    }

    #[test]
    fn from_json_value() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{"b": [1, true, "x"], "a": "y"}"#).unwrap();
        let value = Value::try_from(json).unwrap();

        assert_eq!(value.get("a"), Some(&Value::from("y")));
        assert_eq!(
            value.get("b"),
            Some(&Value::List(vec![
                Value::Integer(1),
                Value::Integer(1),
                Value::from("x")
            ]))
        );
    }

    #[test]
    fn from_json_rejects_null_and_floats() {
        let err = Value::try_from(serde_json::json!({ "a": null })).unwrap_err();
        assert_eq!(err.to_string(), "Cannot represent null as bencode");

        let err = Value::try_from(serde_json::json!(1.5)).unwrap_err();
        assert_eq!(err.to_string(), "Cannot represent the number 1.5 as bencode");
    }
}
