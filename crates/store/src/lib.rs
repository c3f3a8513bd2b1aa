//! SQLite-backed entity store.
//!
//! This crate persists any [`Entity`](reel_codec::Entity) in a local SQLite
//! database. The database is a cache of what the remote listing returned; it
//! can be cleared at any time and will be refilled on the next online fetch.
//!
//! # Architecture
//! Entities are stored as flat records in two tables:
//! - **records**: one row per stored entity, tagged with the entity's storage
//!   name and (optional) integer identity.
//! - **attributes**: one row per declared field of a record, holding a typed
//!   value column and a kind tag.
//!
//! All writes, across every [`EntityStore`] sharing a [`Database`], are
//! serialised through a single write gate and run in their own transaction.

mod db;
pub mod error;
mod models;
mod store;

pub use crate::db::Database;
pub use crate::store::EntityStore;
