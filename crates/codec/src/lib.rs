//! Wire decoding and entity flattening.
//!
//! Upstream payloads drift: the same field may arrive as a number one day and
//! a string the next. This crate absorbs that drift ([`decode_field`] never
//! fails) and provides the canonical conversion between typed [`Entity`]
//! values and the flat [`Record`] mapping that the entity store persists.
//!
//! # Architecture
//! - [`SafeDecode`]: per-type native decode, cast rules, and default value.
//! - [`Fields`]/[`Decode`]: typed decoding of wire objects.
//! - [`Entity`]: a record type with an explicit field table and an optional
//!   integer identity; [`flatten`] and [`unflatten`] move it to and from a
//!   [`Record`].

mod entity;
pub mod error;
mod fields;
mod scalar;

pub use crate::entity::{Entity, Field, Kind, Record, UnknownKind, Value, entity_name, flatten, unflatten};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::fields::{Decode, Fields, blob, decode_value};
pub use crate::scalar::{Attempt, FALLBACK_ORDER, SafeDecode, Scalar, decode_field};
pub use serde_json::Value as Json;
