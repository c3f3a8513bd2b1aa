use crate::error::{ErrorKind, Result};
use crate::fields::{Decode, Fields};
use crate::scalar::decode_field;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use derive_more::Display;
use exn::ResultExt;
use serde::Serialize;
use serde_json::{Map, Number, Value as Json};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Storage kind of a declared field.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum Kind {
    #[display("bool")]
    Bool,
    #[display("int")]
    Int,
    #[display("float")]
    Float,
    #[display("text")]
    Text,
    #[display("blob")]
    Blob,
}

/// A flattened attribute value, as written to the entity store.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
}
impl Value {
    /// Storage tag of the value; `"null"` for [`Value::Null`], otherwise the
    /// [`Kind`] name.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
        }
    }

    fn into_wire(self) -> Json {
        match self {
            Self::Null => Json::Null,
            Self::Bool(b) => Json::Bool(b),
            Self::Int(i) => Json::Number(Number::from(i)),
            Self::Float(f) => Number::from_f64(f).map(Json::Number).unwrap_or(Json::Null),
            Self::Text(s) => Json::String(s),
            Self::Blob(bytes) => Json::String(STANDARD.encode(bytes)),
        }
    }
}

#[derive(Debug, Display, Clone, PartialEq, Eq, derive_more::Error)]
#[display("unknown field kind: {_0}")]
pub struct UnknownKind(#[error(not(source))] pub String);

impl FromStr for Kind {
    type Err = UnknownKind;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "bool" => Ok(Self::Bool),
            "int" => Ok(Self::Int),
            "float" => Ok(Self::Float),
            "text" => Ok(Self::Text),
            "blob" => Ok(Self::Blob),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}

impl Kind {
    /// Project a wire value into this kind. `null` is preserved as
    /// [`Value::Null`]; scalar drift is resolved fail-soft.
    fn coerce(self, name: &'static str, wire: &Json) -> Result<Value> {
        if wire.is_null() {
            return Ok(Value::Null);
        }
        Ok(match self {
            Self::Bool => Value::Bool(decode_field(Some(wire))),
            Self::Int => Value::Int(decode_field(Some(wire))),
            Self::Float => Value::Float(decode_field(Some(wire))),
            Self::Text => Value::Text(decode_field(Some(wire))),
            Self::Blob => {
                let Some(encoded) = wire.as_str() else {
                    exn::bail!(ErrorKind::Serialization(name));
                };
                Value::Blob(STANDARD.decode(encoded).or_raise(|| ErrorKind::Serialization(name))?)
            },
        })
    }
}

/// A declared field of an entity: its wire key and storage kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub kind: Kind,
}
impl Field {
    pub const fn new(name: &'static str, kind: Kind) -> Self {
        Self { name, kind }
    }
}

/// The flat key-value mapping of an entity.
pub type Record = BTreeMap<String, Value>;

/// A record type that can be persisted by the entity store.
///
/// Entities declare their field table explicitly; nothing is discovered at
/// runtime. Two entities of the same type are considered the same entity
/// when their identities are equal.
///
/// ```
/// use reel_codec::{Decode, Entity, Field, Fields, Kind, Result};
///
/// #[derive(serde::Serialize)]
/// struct Bookmark {
///     id: Option<i64>,
///     label: String,
/// }
/// impl Decode for Bookmark {
///     fn decode(fields: &Fields<'_>) -> Result<Self> {
///         Ok(Self { id: fields.optional("id"), label: fields.get("label") })
///     }
/// }
/// impl Entity for Bookmark {
///     const NAME: &'static str = "BookmarkModel";
///     const FIELDS: &'static [Field] = &[Field::new("id", Kind::Int), Field::new("label", Kind::Text)];
///     fn id(&self) -> Option<i64> {
///         self.id
///     }
/// }
///
/// assert_eq!(reel_codec::entity_name::<Bookmark>(), "BookmarkEntity");
/// ```
pub trait Entity: Decode + Serialize + Send + Sync + 'static {
    /// Logical type name; the storage name is derived from it.
    const NAME: &'static str;
    /// Every persisted field, keyed by its wire name.
    const FIELDS: &'static [Field];

    fn id(&self) -> Option<i64>;

    /// Whether `other` carries the same (present) identity.
    fn same_identity(&self, other: &Self) -> bool {
        self.id().is_some() && self.id() == other.id()
    }
}

/// Storage name of an entity type: its logical name with a trailing `Model`
/// replaced by `Entity` (`MovieModel` becomes `MovieEntity`).
pub fn entity_name<E: Entity>() -> String {
    match E::NAME.strip_suffix("Model") {
        Some(stem) => format!("{stem}Entity"),
        None => E::NAME.to_string(),
    }
}

/// Flatten an entity into its record by round-tripping it through the wire
/// encoding.
///
/// Fails with [`ErrorKind::Serialization`] if the entity does not encode to
/// an object. Keys that are not declared in [`Entity::FIELDS`] are dropped.
pub fn flatten<E: Entity>(entity: &E) -> Result<Record> {
    let wire = serde_json::to_value(entity).or_raise(|| ErrorKind::Serialization(E::NAME))?;
    let Json::Object(object) = wire else {
        exn::bail!(ErrorKind::Serialization(E::NAME));
    };
    for key in object.keys().filter(|key| !E::FIELDS.iter().any(|field| field.name == key.as_str())) {
        tracing::debug!(entity = E::NAME, key = %key, "Dropping undeclared field");
    }
    let mut record = Record::new();
    for field in E::FIELDS {
        if let Some(wire) = object.get(field.name) {
            record.insert(field.name.to_string(), field.kind.coerce(E::NAME, wire)?);
        }
    }
    Ok(record)
}

/// Rebuild an entity from its record.
pub fn unflatten<E: Entity>(record: &Record) -> Result<E> {
    let object = record.iter().map(|(key, value)| (key.clone(), value.clone().into_wire())).collect::<Map<_, _>>();
    E::decode(&Fields::new(&object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[derive(Debug, Serialize, PartialEq)]
    struct Sample {
        id: Option<i64>,
        name: String,
        score: f64,
        active: bool,
        #[serde(with = "crate::blob")]
        thumb: Option<Vec<u8>>,
        ignored: u8,
    }
    impl Decode for Sample {
        fn decode(fields: &Fields<'_>) -> Result<Self> {
            Ok(Self {
                id: fields.optional("id"),
                name: fields.get("name"),
                score: fields.get("score"),
                active: fields.get("active"),
                thumb: fields.blob("thumb")?,
                ignored: 0,
            })
        }
    }
    impl Entity for Sample {
        const NAME: &'static str = "SampleModel";
        const FIELDS: &'static [Field] = &[
            Field::new("id", Kind::Int),
            Field::new("name", Kind::Text),
            Field::new("score", Kind::Float),
            Field::new("active", Kind::Bool),
            Field::new("thumb", Kind::Blob),
        ];
        fn id(&self) -> Option<i64> {
            self.id
        }
    }

    /// Encodes to a bare string, which cannot be flattened.
    struct Opaque;
    impl Serialize for Opaque {
        fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
            serializer.serialize_str("opaque")
        }
    }
    impl Decode for Opaque {
        fn decode(_fields: &Fields<'_>) -> Result<Self> {
            Ok(Self)
        }
    }
    impl Entity for Opaque {
        const NAME: &'static str = "Opaque";
        const FIELDS: &'static [Field] = &[];
        fn id(&self) -> Option<i64> {
            None
        }
    }

    fn sample() -> Sample {
        Sample {
            id: Some(7),
            name: "Seven".to_string(),
            score: 7.5,
            active: true,
            thumb: Some(vec![0xFF, 0xD8, 0xFF]),
            ignored: 0,
        }
    }

    #[test]
    fn test_flatten() {
        let record = flatten(&sample()).unwrap();
        assert_eq!(record.get("id"), Some(&Value::Int(7)));
        assert_eq!(record.get("name"), Some(&Value::Text("Seven".to_string())));
        assert_eq!(record.get("score"), Some(&Value::Float(7.5)));
        assert_eq!(record.get("active"), Some(&Value::Bool(true)));
        assert_eq!(record.get("thumb"), Some(&Value::Blob(vec![0xFF, 0xD8, 0xFF])));
        assert!(!record.contains_key("ignored"));
    }

    #[test]
    fn test_flatten_keeps_nulls() {
        let mut entity = sample();
        entity.id = None;
        entity.thumb = None;
        let record = flatten(&entity).unwrap();
        assert_eq!(record.get("id"), Some(&Value::Null));
        assert_eq!(record.get("thumb"), Some(&Value::Null));
    }

    #[test]
    fn test_unflatten_restores_entity() {
        let record = flatten(&sample()).unwrap();
        assert_eq!(unflatten::<Sample>(&record).unwrap(), sample());
    }

    #[test]
    fn test_unflatten_tolerates_drift() {
        let mut record = Record::new();
        record.insert("id".to_string(), Value::Text("9".to_string()));
        record.insert("score".to_string(), Value::Int(3));
        record.insert("active".to_string(), Value::Text("yes".to_string()));
        let entity = unflatten::<Sample>(&record).unwrap();
        assert_eq!(entity.id, Some(9));
        assert_eq!(entity.score, 3.0);
        assert!(entity.active);
        assert_eq!(entity.name, "");
        assert_eq!(entity.thumb, None);
    }

    #[test]
    fn test_flatten_non_object() {
        let err = flatten(&Opaque).unwrap_err();
        assert_eq!(*err, ErrorKind::Serialization("Opaque"));
    }

    #[rstest]
    #[case(Kind::Bool)]
    #[case(Kind::Int)]
    #[case(Kind::Float)]
    #[case(Kind::Text)]
    #[case(Kind::Blob)]
    fn test_kind_tag_parses(#[case] kind: Kind) {
        assert_eq!(kind.to_string().parse::<Kind>().unwrap(), kind);
    }

    #[test]
    fn test_entity_name() {
        assert_eq!(entity_name::<Sample>(), "SampleEntity");
        assert_eq!(entity_name::<Opaque>(), "Opaque");
    }

    #[test]
    fn test_same_identity() {
        let a = sample();
        let mut b = sample();
        b.name = "Different".to_string();
        assert!(a.same_identity(&b));
        b.id = None;
        assert!(!a.same_identity(&b));
        assert!(!b.same_identity(&b));
    }
}
