//! Page state machine, merge, liked set and artwork hydration.
//!
//! A page fetch moves through `idle -> fetching(n) -> merging -> idle`. At most
//! one page is loading at a time; the loading marker is the only thing that
//! enforces this and it is cleared however the fetch ends.

use crate::collection::{MergeOutcome, ObservableCollection};
use crate::connectivity::Connectivity;
use crate::error::{ErrorKind, Result};
use crate::models::{LikedMovie, Movie};
use async_stream::stream;
use derive_more::Display;
use exn::ResultExt;
use futures::Stream;
use reel_assets::{Asset, AssetCache, ImageSize, locator};
use reel_codec::Entity;
use reel_remote::{PageEnvelope, Params, RemoteClient};
use reel_store::{Database, EntityStore};
use serde_json::Value as Json;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::instrument;

const EVENT_CAPACITY: usize = 256;

/// Listing query and artwork settings.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub discover_url: String,
    pub api_key: String,
    pub language: String,
    pub sort_by: String,
    pub include_adult: bool,
    pub include_video: bool,
    pub image_base_url: String,
    pub poster_size: ImageSize,
    pub backdrop_size: ImageSize,
    /// Pause between merging a page and hydrating its artwork.
    pub hydration_delay: Duration,
}
impl Default for Settings {
    fn default() -> Self {
        Self {
            discover_url: "https://api.themoviedb.org/3/discover/movie".to_string(),
            api_key: String::new(),
            language: "en-US".to_string(),
            sort_by: "popularity.desc".to_string(),
            include_adult: false,
            include_video: false,
            image_base_url: "https://image.tmdb.org/t/p".to_string(),
            poster_size: ImageSize::W185,
            backdrop_size: ImageSize::Original,
            hydration_delay: Duration::from_secs(1),
        }
    }
}

impl Settings {
    /// Query parameters of the listing request for `page`. Every value is
    /// sent as a string.
    pub fn params(&self, page: i64) -> Params {
        let text = |value: &str| Json::String(value.to_string());
        Params::from([
            ("api_key".to_string(), text(&self.api_key)),
            ("include_adult".to_string(), text(if self.include_adult { "true" } else { "false" })),
            ("include_video".to_string(), text(if self.include_video { "true" } else { "false" })),
            ("language".to_string(), text(&self.language)),
            ("page".to_string(), Json::String(page.to_string())),
            ("sort_by".to_string(), text(&self.sort_by)),
        ])
    }

    fn artwork_locator(&self, movie: &Movie, kind: ArtworkKind) -> Option<String> {
        match kind {
            ArtworkKind::Poster => locator(&self.image_base_url, self.poster_size, &movie.poster_path),
            ArtworkKind::Backdrop => locator(&self.image_base_url, self.backdrop_size, &movie.backdrop_path),
        }
    }
}

/// Where [`SyncEngine::load`] took the listing from.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum Source {
    #[display("online")]
    Online,
    #[display("offline")]
    Offline,
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum ArtworkKind {
    #[display("poster")]
    Poster,
    #[display("backdrop")]
    Backdrop,
}

/// What to show for a movie's poster or backdrop.
#[derive(Clone, Debug, PartialEq)]
pub enum Artwork {
    /// Downloaded (or cached) from the image host.
    Remote(Asset),
    /// Attached to the stored record by an earlier hydration.
    Stored(Vec<u8>),
    /// Nothing available.
    Placeholder,
}

/// Progress of background artwork hydration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HydrationEvent {
    /// Artwork was attached and the record stored again.
    Hydrated { id: i64, poster: bool, backdrop: bool },
    /// Downloading or storing failed. Artwork that did download is still
    /// attached.
    Failed { id: i64, error: String },
    /// Every movie of a merged page has been handled.
    BatchComplete { hydrated: usize, failed: usize },
}

#[derive(Debug, Default)]
struct PageState {
    current: i64,
    loading: Option<i64>,
}

/// Offline-capable movie listing.
///
/// Cheap to clone; clones drive the same listing.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<Inner>,
}
struct Inner {
    settings: Settings,
    client: RemoteClient,
    assets: AssetCache,
    movies: EntityStore<Movie>,
    liked: EntityStore<LikedMovie>,
    connectivity: Arc<dyn Connectivity>,
    collection: ObservableCollection<Movie>,
    pages: Mutex<PageState>,
    hydration: mpsc::UnboundedSender<Vec<Movie>>,
    events: broadcast::Sender<HydrationEvent>,
}

/// Clears the loading marker of its page when dropped.
struct PageGuard {
    engine: SyncEngine,
    page: i64,
}
impl PageGuard {
    fn commit(&self, page: i64) {
        self.engine.pages().current = page;
    }
}
impl Drop for PageGuard {
    fn drop(&mut self) {
        let mut pages = self.engine.pages();
        if pages.loading == Some(self.page) {
            pages.loading = None;
        }
    }
}

impl SyncEngine {
    /// Build an engine and start its hydration worker.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new(settings: Settings, client: RemoteClient, db: &Database, connectivity: Arc<dyn Connectivity>) -> Self {
        let (hydration, queue) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let inner = Inner {
            assets: AssetCache::new(client.clone()),
            movies: EntityStore::new(db),
            liked: EntityStore::new(db),
            collection: ObservableCollection::default(),
            pages: Mutex::new(PageState::default()),
            settings,
            client,
            connectivity,
            hydration,
            events,
        };
        let hydrator = Hydrator {
            settings: inner.settings.clone(),
            assets: inner.assets.clone(),
            movies: inner.movies.clone(),
            collection: inner.collection.clone(),
            events: inner.events.clone(),
        };
        tokio::spawn(hydrator.run(queue));
        Self { inner: Arc::new(inner) }
    }

    fn pages(&self) -> MutexGuard<'_, PageState> {
        self.inner.pages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    /// The listing shown to the user.
    pub fn movies(&self) -> ObservableCollection<Movie> {
        self.inner.collection.clone()
    }

    /// Last page merged from the remote listing; `0` before the first.
    pub fn current_page(&self) -> i64 {
        self.pages().current
    }

    /// Page currently being fetched, if any.
    pub fn loading_page(&self) -> Option<i64> {
        self.pages().loading
    }

    pub fn is_online(&self) -> bool {
        self.inner.connectivity.current_status()
    }

    /// Fill the listing: the first remote page when online, the stored
    /// movies otherwise.
    pub async fn load(&self) -> Result<Source> {
        if self.is_online() {
            self.fetch_online_movies(1).await?;
            Ok(Source::Online)
        } else {
            self.fetch_offline_movies().await?;
            Ok(Source::Offline)
        }
    }

    /// Fetch a page, store every movie on it, merge it into the listing and
    /// queue its artwork for hydration.
    ///
    /// Fails with [`ErrorKind::PageInFlight`] while another page is loading.
    /// On failure the listing, the store and the current page are left as
    /// they were.
    pub async fn fetch_online_movies(&self, page: i64) -> Result<MergeOutcome> {
        let guard = self.claim(page)?;
        self.clone().run_page(guard).await
    }

    fn claim(&self, page: i64) -> Result<PageGuard> {
        let mut pages = self.pages();
        if let Some(loading) = pages.loading {
            exn::bail!(ErrorKind::PageInFlight(loading));
        }
        pages.loading = Some(page);
        Ok(PageGuard {
            engine: self.clone(),
            page,
        })
    }

    #[instrument(skip_all, fields(page = guard.page))]
    async fn run_page(self, guard: PageGuard) -> Result<MergeOutcome> {
        let outcome = self.merge_page(&guard).await;
        if let Err(err) = &outcome {
            tracing::warn!(error = ?err, "Page fetch failed");
        }
        outcome
    }

    async fn merge_page(&self, guard: &PageGuard) -> Result<MergeOutcome> {
        let settings = &self.inner.settings;
        let envelope: PageEnvelope<Movie> = self
            .inner
            .client
            .page(&settings.discover_url, &settings.params(guard.page))
            .await
            .or_raise(|| ErrorKind::Remote)?;
        self.inner.movies.store_all(&envelope.results).await.or_raise(|| ErrorKind::Store)?;
        let outcome = self.inner.collection.merge(envelope.results.iter().cloned());
        guard.commit(envelope.page);
        tracing::info!(
            page = envelope.page,
            total_pages = envelope.total_pages,
            replaced = outcome.replaced,
            appended = outcome.appended,
            "Merged page"
        );
        if !envelope.results.is_empty() && self.inner.hydration.send(envelope.results).is_err() {
            tracing::warn!("Hydration worker is gone; artwork will not be attached");
        }
        Ok(outcome)
    }

    /// Append every stored movie to the listing, without merging. Returns
    /// how many were appended.
    #[instrument(skip(self))]
    pub async fn fetch_offline_movies(&self) -> Result<usize> {
        let movies = self.inner.movies.fetch_all_data().await.or_raise(|| ErrorKind::Store)?;
        let count = movies.len();
        self.inner.collection.append_all(movies);
        tracing::info!(count, "Replayed stored movies");
        Ok(count)
    }

    /// Load the page after the current one if `item` is the last movie of
    /// the listing and no page is loading. Returns the spawned fetch when it
    /// was admitted.
    ///
    /// The loading marker is set before this returns, so a second call
    /// straight after is always a no-op.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn should_fetch_next_page(&self, item: &Movie) -> Option<JoinHandle<Result<MergeOutcome>>> {
        let guard = {
            let mut pages = self.pages();
            if pages.loading.is_some() || !self.inner.collection.is_last(item) {
                return None;
            }
            let page = pages.current + 1;
            pages.loading = Some(page);
            PageGuard {
                engine: self.clone(),
                page,
            }
        };
        tracing::debug!(page = guard.page, "Fetching next page");
        Some(tokio::spawn(self.clone().run_page(guard)))
    }

    /// Flip whether movie `id` is liked. Returns the new state.
    #[instrument(skip(self))]
    pub async fn toggle_liked(&self, id: i64) -> Result<bool> {
        let marker = LikedMovie::new(id);
        if self.is_liked(id).await? {
            self.inner.liked.delete(&marker).await.or_raise(|| ErrorKind::Store)?;
            Ok(false)
        } else {
            self.inner.liked.store_data(&marker).await.or_raise(|| ErrorKind::Store)?;
            Ok(true)
        }
    }

    pub async fn is_liked(&self, id: i64) -> Result<bool> {
        let found = self.inner.liked.find_data(id).await.or_raise(|| ErrorKind::Store)?;
        Ok(found.is_some())
    }

    /// Artwork to show for `movie`.
    ///
    /// Online, the image host is asked first (through the asset cache). When
    /// offline, when the movie has no such image, or when the download fails,
    /// the bytes stored on the record are used, and failing that the
    /// placeholder.
    pub async fn artwork(&self, movie: &Movie, kind: ArtworkKind) -> Artwork {
        if self.is_online()
            && let Some(locator) = self.inner.settings.artwork_locator(movie, kind)
        {
            match self.inner.assets.fetch(&locator).await {
                Ok(asset) => return Artwork::Remote(asset),
                Err(err) => tracing::debug!(%locator, error = ?err, "Falling back to stored artwork"),
            }
        }
        let stored = match kind {
            ArtworkKind::Poster => &movie.poster_data,
            ArtworkKind::Backdrop => &movie.backdrop_data,
        };
        match stored {
            Some(bytes) => Artwork::Stored(bytes.clone()),
            None => Artwork::Placeholder,
        }
    }

    /// Forget every stored movie and empty the listing. The liked set is
    /// kept. Returns the number of stored movies removed.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<u64> {
        let removed = self.inner.movies.delete_all_data().await.or_raise(|| ErrorKind::Store)?;
        self.inner.collection.clear();
        Ok(removed)
    }

    /// Hydration progress from now on.
    ///
    /// Events sent before this call are not seen. A subscriber that falls too
    /// far behind skips the events it missed.
    pub fn hydration_events(&self) -> impl Stream<Item = HydrationEvent> + Send + 'static {
        let mut receiver = self.inner.events.subscribe();
        stream! {
            loop {
                match receiver.recv().await {
                    Ok(event) => yield event,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Hydration events skipped");
                    },
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }
}

/// Background worker attaching artwork to merged movies, one batch at a time.
struct Hydrator {
    settings: Settings,
    assets: AssetCache,
    movies: EntityStore<Movie>,
    collection: ObservableCollection<Movie>,
    events: broadcast::Sender<HydrationEvent>,
}

impl Hydrator {
    async fn run(self, mut queue: mpsc::UnboundedReceiver<Vec<Movie>>) {
        while let Some(batch) = queue.recv().await {
            tokio::time::sleep(self.settings.hydration_delay).await;
            self.hydrate_batch(batch).await;
        }
        tracing::debug!("Hydration worker stopped");
    }

    #[instrument(skip_all, fields(count = batch.len()))]
    async fn hydrate_batch(&self, batch: Vec<Movie>) {
        let (mut hydrated, mut failed) = (0, 0);
        for movie in batch {
            let Some(id) = movie.id() else {
                tracing::debug!(title = %movie.title, "Skipping movie without identity");
                continue;
            };
            match self.hydrate(id, movie).await {
                Ok(None) => {},
                Ok(Some((poster, backdrop))) => {
                    hydrated += 1;
                    self.emit(HydrationEvent::Hydrated { id, poster, backdrop });
                },
                Err(err) => {
                    failed += 1;
                    tracing::warn!(id, error = ?err, "Hydration failed");
                    self.emit(HydrationEvent::Failed {
                        id,
                        error: err.to_string(),
                    });
                },
            }
        }
        tracing::debug!(hydrated, failed, "Hydration batch complete");
        self.emit(HydrationEvent::BatchComplete { hydrated, failed });
    }

    /// Download both artworks of `movie` and attach those that arrived to
    /// its stored row and its listing entry. Only the artwork fields are
    /// written, so fields refreshed by a later page are kept. `None` when
    /// there is nothing to fetch or the row is gone.
    ///
    /// A failed download is reported after the other artwork is attached.
    async fn hydrate(&self, id: i64, movie: Movie) -> Result<Option<(bool, bool)>> {
        let poster = self.settings.artwork_locator(&movie, ArtworkKind::Poster);
        let backdrop = self.settings.artwork_locator(&movie, ArtworkKind::Backdrop);
        if poster.is_none() && backdrop.is_none() {
            return Ok(None);
        }
        let (poster, backdrop) = futures::future::join(self.fetch(poster), self.fetch(backdrop)).await;

        let mut patch = movie;
        let mut fields = Vec::with_capacity(2);
        if let Ok(Some(asset)) = &poster {
            patch.poster_data = Some(asset.bytes.to_vec());
            fields.push("poster_data");
        }
        if let Ok(Some(asset)) = &backdrop {
            patch.backdrop_data = Some(asset.bytes.to_vec());
            fields.push("backdrop_data");
        }
        if !fields.is_empty() {
            let stored = self.movies.patch_data(id, &patch, &fields).await.or_raise(|| ErrorKind::Store)?;
            if !stored {
                tracing::debug!(id, "Movie was removed before its artwork arrived");
                return Ok(None);
            }
            self.collection.update(&patch, |listed| {
                if fields.contains(&"poster_data") {
                    listed.poster_data = patch.poster_data.clone();
                }
                if fields.contains(&"backdrop_data") {
                    listed.backdrop_data = patch.backdrop_data.clone();
                }
            });
        }
        let (poster, backdrop) = (poster?, backdrop?);
        Ok(Some((poster.is_some(), backdrop.is_some())))
    }

    async fn fetch(&self, locator: Option<String>) -> Result<Option<Asset>> {
        let Some(locator) = locator else {
            return Ok(None);
        };
        let asset = self.assets.fetch(&locator).await.or_raise(|| ErrorKind::Assets)?;
        Ok(Some(asset))
    }

    fn emit(&self, event: HydrationEvent) {
        // No subscribers is fine.
        _ = self.events.send(event);
    }
}
