//! Image locators and the in-memory image cache.
//!
//! Images are addressed by a fully resolved locator string built with
//! [`locator`] from a base URL, a resolution tier ([`ImageSize`]) and the
//! relative path found on a listing record. The [`AssetCache`] downloads each
//! locator at most once at a time, verifies the payload really is an image
//! ([`ImageFormat`]), and keeps it for the lifetime of the process.

mod cache;
pub mod error;
mod format;
mod size;

pub use crate::cache::{Asset, AssetCache};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::format::ImageFormat;
pub use crate::size::{ImageSize, UnknownSize, locator};
