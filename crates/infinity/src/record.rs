use core::{fmt, str::FromStr};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// One generated data item, as delivered on the wire.
///
/// Every field is serialized as a JSON *string*, including the numeric ones:
///
/// ```
/// use infinity::Record;
///
/// let record = Record::new(0, 1, 1.5, "x");
/// let json = serde_json::to_string(&record).unwrap();
/// assert_eq!(json, r#"{"index":"0","a":"1","b":"1.5","c":"x"}"#);
///
/// let back: Record = serde_json::from_str(&json).unwrap();
/// assert_eq!(back, record);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Zero-based position in the sequence.
    #[serde(serialize_with = "to_text", deserialize_with = "from_text")]
    pub index: u64,
    #[serde(serialize_with = "to_text", deserialize_with = "from_text")]
    pub a: i32,
    #[serde(serialize_with = "to_text", deserialize_with = "from_text")]
    pub b: f32,
    pub c: String,
}

impl Record {
    pub fn new(index: u64, a: i32, b: f32, c: impl Into<String>) -> Self {
        Self {
            index,
            a,
            b,
            c: c.into(),
        }
    }

    /// Stamps a generated payload with its sequence position.
    pub fn from_payload(index: u64, payload: Payload) -> Self {
        let Payload { a, b, c } = payload;
        Self { index, a, b, c }
    }

    /// Heap bytes owned by this record beyond its inline size.
    pub(crate) fn heap_bytes(&self) -> usize {
        self.c.capacity()
    }
}

/// The opaque fields produced by a [`PayloadGenerator`].
///
/// [`PayloadGenerator`]: crate::PayloadGenerator
#[derive(Clone, Debug, PartialEq)]
pub struct Payload {
    pub a: i32,
    pub b: f32,
    pub c: String,
}

impl Payload {
    pub fn new(a: i32, b: f32, c: impl Into<String>) -> Self {
        Self { a, b, c: c.into() }
    }
}

/// Serializes a value through its `Display` impl as a JSON string.
pub(crate) struct Text<'a, T>(pub &'a T);

impl<T: fmt::Display> Serialize for Text<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self.0)
    }
}

fn to_text<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: fmt::Display,
    S: Serializer,
{
    Text(value).serialize(serializer)
}

fn from_text<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    T: FromStr,
    T::Err: fmt::Display,
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    text.parse().map_err(de::Error::custom)
}
