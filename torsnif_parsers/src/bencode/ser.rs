use super::{
    error::{Error, Result},
    Value,
};

/// Canonical bencode writer.
///
/// Dictionaries are emitted in ascending byte order of their keys, so two logically equal values
/// always produce the same bytes no matter how their source was laid out.
#[derive(Default)]
pub struct Serializer {
    buffer: Vec<u8>,
}

impl Serializer {
    pub fn new() -> Serializer {
        Self::default()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buffer
    }

    fn push<T>(&mut self, value: T)
    where
        T: AsRef<[u8]>,
    {
        self.buffer.extend_from_slice(value.as_ref())
    }

    pub fn serialize(&mut self, value: &Value) {
        match value {
            Value::Integer(i) => self.push(format!("i{i}e")),
            Value::Bytes(bytes) => self.serialize_bytes(bytes),
            Value::List(list) => {
                self.push("l");
                for item in list {
                    self.serialize(item);
                }
                self.push("e");
            }
            Value::Dictionary(dictionary) => {
                self.push("d");
                // BTreeMap iteration is already in ascending key order.
                for (k, v) in dictionary {
                    self.serialize_bytes(k);
                    self.serialize(v);
                }
                self.push("e");
            }
        }
    }

    fn serialize_bytes(&mut self, v: &[u8]) {
        self.push(v.len().to_string());
        self.push(":");
        self.push(v);
    }
}

impl AsRef<[u8]> for Serializer {
    fn as_ref(&self) -> &[u8] {
        self.buffer.as_ref()
    }
}

/// Encodes `value` into its canonical bencode bytes.
pub fn to_bytes(value: &Value) -> Vec<u8> {
    let mut serializer = Serializer::new();
    serializer.serialize(value);
    serializer.into_vec()
}

/// Encodes `value` and returns it as a string. Fails when a byte string inside `value` is not
/// valid UTF-8.
pub fn to_string(value: &Value) -> Result<String> {
    String::from_utf8(to_bytes(value))
        .map_err(|_| Error::Unrepresentable("binary byte strings as UTF-8 text".into()))
}
