//! Fail-soft scalar decoding.
//!
//! The upstream API is not consistent about the representation of a field:
//! an amount might arrive as an integer, a float, or a string depending on
//! the day. Decoding never fails here. A field is first decoded as its native
//! type, then each attempt in [`FALLBACK_ORDER`] is tried in turn and the
//! first one that recognises the wire value is cast to the target type. If
//! nothing matches, the target type's default value is returned.

use serde_json::Value as Json;

/// A wire value recognised as one of the scalar kinds.
#[derive(Clone, Debug, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// One typed decode attempt in the fallback chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attempt {
    Text,
    Integer,
    Float,
    Boolean,
}

/// Order in which fallback decodes are attempted once the native decode of
/// the expected type has failed.
pub const FALLBACK_ORDER: [Attempt; 4] = [Attempt::Text, Attempt::Integer, Attempt::Float, Attempt::Boolean];

impl Attempt {
    /// Returns the recognised scalar, or `None` if the wire value does not
    /// have this attempt's representation.
    pub fn try_decode(self, value: &Json) -> Option<Scalar> {
        match (self, value) {
            (Self::Text, Json::String(s)) => Some(Scalar::Text(s.clone())),
            (Self::Integer, Json::Number(n)) => n.as_i64().map(Scalar::Int),
            (Self::Float, Json::Number(n)) => n.as_f64().map(Scalar::Float),
            (Self::Boolean, Json::Bool(b)) => Some(Scalar::Bool(*b)),
            _ => None,
        }
    }
}

/// A type that can be decoded from drifting wire representations.
pub trait SafeDecode: Sized {
    /// Value used when no decode attempt succeeds.
    fn default_value() -> Self;
    /// Decode a wire value that already has the expected representation.
    fn decode_native(value: &Json) -> Option<Self>;
    /// Cast a scalar of another kind into this type.
    fn cast_from(scalar: Scalar) -> Self;
}

/// Decode a (possibly absent) wire value into `T`, falling back through
/// [`FALLBACK_ORDER`] and finally to `T::default_value()`.
pub fn decode_field<T: SafeDecode>(value: Option<&Json>) -> T {
    let Some(value) = value else {
        return T::default_value();
    };
    if let Some(native) = T::decode_native(value) {
        return native;
    }
    FALLBACK_ORDER
        .iter()
        .find_map(|attempt| attempt.try_decode(value))
        .map(T::cast_from)
        .unwrap_or_else(T::default_value)
}

/// Formats a float the way the reference clients print them: integral values
/// keep a trailing `.0`.
pub(crate) fn float_to_text(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

impl SafeDecode for i64 {
    fn default_value() -> Self {
        0
    }

    fn decode_native(value: &Json) -> Option<Self> {
        value.as_i64()
    }

    fn cast_from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Int(i) => i,
            // Saturating, NaN becomes zero.
            Scalar::Float(f) => f as i64,
            Scalar::Bool(b) => i64::from(b),
            Scalar::Text(s) => s.parse().unwrap_or_default(),
        }
    }
}

impl SafeDecode for f64 {
    fn default_value() -> Self {
        0.0
    }

    fn decode_native(value: &Json) -> Option<Self> {
        value.as_f64()
    }

    fn cast_from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Int(i) => i as f64,
            Scalar::Float(f) => f,
            Scalar::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            },
            Scalar::Text(s) => s.parse().unwrap_or_default(),
        }
    }
}

/// Narrower integers decode through `i64` and clamp to their range.
macro_rules! narrow_integer {
    ($($ty:ty),+) => {$(
        impl SafeDecode for $ty {
            fn default_value() -> Self {
                0
            }

            fn decode_native(value: &Json) -> Option<Self> {
                value.as_i64().and_then(|i| Self::try_from(i).ok())
            }

            fn cast_from(scalar: Scalar) -> Self {
                let wide = i64::cast_from(scalar);
                Self::try_from(wide).unwrap_or(if wide < 0 { Self::MIN } else { Self::MAX })
            }
        }
    )+};
}
narrow_integer!(i32, u32);

impl SafeDecode for f32 {
    fn default_value() -> Self {
        0.0
    }

    fn decode_native(value: &Json) -> Option<Self> {
        value.as_f64().map(|f| f as f32)
    }

    fn cast_from(scalar: Scalar) -> Self {
        f64::cast_from(scalar) as f32
    }
}

impl SafeDecode for bool {
    fn default_value() -> Self {
        false
    }

    fn decode_native(value: &Json) -> Option<Self> {
        value.as_bool()
    }

    fn cast_from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Bool(b) => b,
            Scalar::Int(i) => i != 0,
            Scalar::Float(f) => f != 0.0,
            Scalar::Text(s) => matches!(s.to_lowercase().as_str(), "true" | "yes" | "1"),
        }
    }
}

impl SafeDecode for String {
    fn default_value() -> Self {
        String::new()
    }

    fn decode_native(value: &Json) -> Option<Self> {
        value.as_str().map(str::to_string)
    }

    fn cast_from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Text(s) => s,
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => float_to_text(f),
            // Asymmetric on purpose: existing stored data depends on `false`
            // becoming an empty string rather than "false".
            Scalar::Bool(b) => {
                if b {
                    "true".to_string()
                } else {
                    String::new()
                }
            },
        }
    }
}

/// Arrays of unknown elements only ever decode natively.
impl SafeDecode for Vec<Json> {
    fn default_value() -> Self {
        Vec::new()
    }

    fn decode_native(value: &Json) -> Option<Self> {
        value.as_array().cloned()
    }

    fn cast_from(_scalar: Scalar) -> Self {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(json!(42), 42)]
    #[case(json!("42"), 42)]
    #[case(json!(42.9), 42)]
    #[case(json!(true), 1)]
    #[case(json!(false), 0)]
    #[case(json!("not a number"), 0)]
    #[case(json!(" 42"), 0)]
    #[case(json!([1, 2, 3]), 0)]
    #[case(json!({"nested": 1}), 0)]
    #[case(json!(null), 0)]
    fn test_decode_integer(#[case] wire: Json, #[case] expected: i64) {
        assert_eq!(decode_field::<i64>(Some(&wire)), expected);
    }

    #[rstest]
    #[case(json!(7.5), 7.5)]
    #[case(json!(7), 7.0)]
    #[case(json!("7.25"), 7.25)]
    #[case(json!(true), 1.0)]
    #[case(json!(false), 0.0)]
    #[case(json!(["7.5"]), 0.0)]
    fn test_decode_float(#[case] wire: Json, #[case] expected: f64) {
        assert_eq!(decode_field::<f64>(Some(&wire)), expected);
    }

    #[rstest]
    #[case(json!(true), true)]
    #[case(json!("TRUE"), true)]
    #[case(json!("Yes"), true)]
    #[case(json!("1"), true)]
    #[case(json!("false"), false)]
    #[case(json!("on"), false)]
    #[case(json!(0), false)]
    #[case(json!(3), true)]
    #[case(json!(0.0), false)]
    #[case(json!(0.5), true)]
    #[case(json!([true]), false)]
    fn test_decode_bool(#[case] wire: Json, #[case] expected: bool) {
        assert_eq!(decode_field::<bool>(Some(&wire)), expected);
    }

    #[rstest]
    #[case(json!("title"), "title")]
    #[case(json!(42), "42")]
    #[case(json!(7.5), "7.5")]
    #[case(json!(8.0), "8.0")]
    #[case(json!(true), "true")]
    #[case(json!(false), "")]
    #[case(json!(["a", "b"]), "")]
    fn test_decode_text(#[case] wire: Json, #[case] expected: &str) {
        assert_eq!(decode_field::<String>(Some(&wire)), expected);
    }

    #[test]
    fn test_decode_narrow_numbers() {
        assert_eq!(decode_field::<i32>(Some(&json!("12"))), 12);
        assert_eq!(decode_field::<i32>(Some(&json!(3_000_000_000_i64))), i32::MAX);
        assert_eq!(decode_field::<u32>(Some(&json!(-4))), 0);
        assert_eq!(decode_field::<u32>(Some(&json!(true))), 1);
        assert_eq!(decode_field::<f32>(Some(&json!("2.5"))), 2.5);
    }

    #[test]
    fn test_decode_array() {
        let wire = json!([1, "two", null]);
        assert_eq!(decode_field::<Vec<Json>>(Some(&wire)), vec![json!(1), json!("two"), json!(null)]);
        assert!(decode_field::<Vec<Json>>(Some(&json!("[1, 2]"))).is_empty());
        assert!(decode_field::<Vec<Json>>(Some(&json!(12))).is_empty());
    }

    #[test]
    fn test_absent_value_is_default() {
        assert_eq!(decode_field::<i64>(None), 0);
        assert_eq!(decode_field::<String>(None), "");
        assert!(!decode_field::<bool>(None));
    }

    #[test]
    fn test_fallback_order() {
        let wire = json!("3");
        assert_eq!(FALLBACK_ORDER.iter().find_map(|a| a.try_decode(&wire)), Some(Scalar::Text("3".to_string())));
        // Floats with no integer representation are only picked up by the float attempt.
        assert_eq!(Attempt::Integer.try_decode(&json!(1.5)), None);
        assert_eq!(Attempt::Float.try_decode(&json!(1.5)), Some(Scalar::Float(1.5)));
    }
}
