//! Local-first movie listing.
//!
//! [`SyncEngine`] pulls pages from the remote listing API, stores every movie
//! through [`reel_store::EntityStore`], merges the page into an
//! [`ObservableCollection`] by identity and then attaches artwork in the
//! background. When [`Connectivity`] reports the network as unavailable the
//! stored movies are replayed instead.

mod collection;
mod connectivity;
mod engine;
pub mod error;
mod models;

pub use crate::collection::{MergeOutcome, ObservableCollection};
pub use crate::connectivity::{Connectivity, ProbeConnectivity, StaticConnectivity};
pub use crate::engine::{Artwork, ArtworkKind, HydrationEvent, Settings, Source, SyncEngine};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::models::{LikedMovie, Movie, OriginalLanguage};
