use crate::error::{ErrorKind, Result};
use crate::scalar::{SafeDecode, decode_field};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use exn::ResultExt;
use serde_json::{Map, Value as Json};

/// Types that can be decoded from a wire object.
///
/// Scalar fields should be read with [`Fields::get`] or [`Fields::optional`]
/// which never fail. Only structurally strict fields (binary payloads) can
/// make a decode fail.
pub trait Decode: Sized {
    fn decode(fields: &Fields<'_>) -> Result<Self>;
}

/// Decode a wire value, which must be an object, into `T`.
pub fn decode_value<T: Decode>(value: &Json) -> Result<T> {
    T::decode(&Fields::from_value(value)?)
}

/// Read-only view over the fields of a wire object.
#[derive(Clone, Copy, Debug)]
pub struct Fields<'a> {
    map: &'a Map<String, Json>,
}
impl<'a> Fields<'a> {
    pub fn new(map: &'a Map<String, Json>) -> Self {
        Self { map }
    }

    pub fn from_value(value: &'a Json) -> Result<Self> {
        match value {
            Json::Object(map) => Ok(Self::new(map)),
            _ => exn::bail!(ErrorKind::NotAnObject),
        }
    }

    /// Fail-soft read of a field; drifting representations are cast and
    /// anything unrecognisable becomes the default value.
    pub fn get<T: SafeDecode>(&self, key: &str) -> T {
        decode_field(self.map.get(key))
    }

    /// Like [`get`](Self::get), but an absent or `null` field is `None`.
    pub fn optional<T: SafeDecode>(&self, key: &str) -> Option<T> {
        match self.map.get(key) {
            None | Some(Json::Null) => None,
            value => Some(decode_field(value)),
        }
    }

    /// Strict read of a base64-encoded binary payload.
    pub fn blob(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.map.get(key) {
            None | Some(Json::Null) => Ok(None),
            Some(Json::String(encoded)) => {
                STANDARD.decode(encoded).map(Some).or_raise(|| ErrorKind::Decode(key.to_string()))
            },
            Some(_) => exn::bail!(ErrorKind::Decode(key.to_string())),
        }
    }

    pub fn raw(&self, key: &str) -> Option<&'a Json> {
        self.map.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }
}

/// Serde adapter for optional binary payloads, encoded as base64 strings on
/// the wire (and `null` when absent).
///
/// ```
/// #[derive(serde::Serialize)]
/// struct Thumbnail {
///     #[serde(with = "reel_codec::blob")]
///     data: Option<Vec<u8>>,
/// }
/// ```
pub mod blob {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|encoded| STANDARD.decode(encoded).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fields_from_non_object() {
        let err = Fields::from_value(&json!([1, 2])).unwrap_err();
        assert_eq!(*err, ErrorKind::NotAnObject);
    }

    #[test]
    fn test_optional() {
        let wire = json!({"id": "12", "empty": null});
        let fields = Fields::from_value(&wire).unwrap();
        assert_eq!(fields.optional::<i64>("id"), Some(12));
        assert_eq!(fields.optional::<i64>("empty"), None);
        assert_eq!(fields.optional::<i64>("missing"), None);
    }

    #[test]
    fn test_blob() {
        let wire = json!({"ok": "aGVsbG8=", "bad": "***", "wrong": 12, "none": null});
        let fields = Fields::from_value(&wire).unwrap();
        assert_eq!(fields.blob("ok").unwrap(), Some(b"hello".to_vec()));
        assert_eq!(fields.blob("none").unwrap(), None);
        assert_eq!(fields.blob("missing").unwrap(), None);
        assert_eq!(*fields.blob("bad").unwrap_err(), ErrorKind::Decode("bad".to_string()));
        assert_eq!(*fields.blob("wrong").unwrap_err(), ErrorKind::Decode("wrong".to_string()));
    }
}
