use crate::error::{ErrorKind, Result};
use crate::format::ImageFormat;
use bytes::Bytes;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use reel_remote::RemoteClient;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::instrument;

/// A downloaded, recognised image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Asset {
    pub locator: String,
    pub format: ImageFormat,
    pub bytes: Bytes,
}

type Download = Shared<BoxFuture<'static, std::result::Result<Asset, ErrorKind>>>;

enum Slot {
    Ready(Asset),
    /// `generation` tells apart two downloads of the same locator, so a
    /// finishing download never settles a slot it does not own.
    Pending { generation: u64, download: Download },
}

/// Process-lifetime image cache keyed by locator.
///
/// At most one download per locator is in flight at any time: callers that
/// ask for a locator that is already downloading wait for that download
/// instead of starting their own. Different locators never wait on each
/// other. Successful downloads are kept for the lifetime of the cache;
/// failures are never cached, so the next call for that locator goes back to
/// the network.
///
/// Cheap to clone; clones share the same entries.
#[derive(Clone)]
pub struct AssetCache {
    inner: Arc<Inner>,
}
struct Inner {
    client: RemoteClient,
    slots: Mutex<HashMap<String, Slot>>,
    generation: AtomicU64,
}

impl AssetCache {
    pub fn new(client: RemoteClient) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                slots: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        // Slots are only ever replaced wholesale; a poisoned map is still consistent.
        self.inner.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the cached asset for `locator`, downloading it if necessary.
    #[instrument(skip(self))]
    pub async fn fetch(&self, locator: &str) -> Result<Asset> {
        let (generation, download) = {
            let mut slots = self.slots();
            match slots.get(locator) {
                Some(Slot::Ready(asset)) => {
                    tracing::trace!("Cache hit");
                    return Ok(asset.clone());
                },
                Some(Slot::Pending { generation, download }) => {
                    tracing::trace!("Joining in-flight download");
                    (*generation, download.clone())
                },
                None => {
                    let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
                    let download = load(self.inner.client.clone(), locator.to_string()).boxed().shared();
                    slots.insert(
                        locator.to_string(),
                        Slot::Pending {
                            generation,
                            download: download.clone(),
                        },
                    );
                    (generation, download)
                },
            }
        };

        let outcome = download.await;

        let mut slots = self.slots();
        let owned = matches!(slots.get(locator), Some(Slot::Pending { generation: current, .. }) if *current == generation);
        if owned {
            match &outcome {
                Ok(asset) => {
                    slots.insert(locator.to_string(), Slot::Ready(asset.clone()));
                },
                Err(_) => {
                    slots.remove(locator);
                },
            }
        }
        outcome.map_err(exn::Exn::from)
    }

    /// Cached asset for `locator`, without touching the network.
    pub fn get(&self, locator: &str) -> Option<Asset> {
        match self.slots().get(locator) {
            Some(Slot::Ready(asset)) => Some(asset.clone()),
            _ => None,
        }
    }

    /// Whether a downloaded asset is cached for `locator`.
    pub fn contains(&self, locator: &str) -> bool {
        matches!(self.slots().get(locator), Some(Slot::Ready(_)))
    }

    /// Number of cached assets (in-flight downloads are not counted).
    pub fn len(&self) -> usize {
        self.slots().values().filter(|slot| matches!(slot, Slot::Ready(_))).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn load(client: RemoteClient, locator: String) -> std::result::Result<Asset, ErrorKind> {
    let bytes = match client.download(&locator).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::debug!(%locator, error = ?err, "Download failed");
            return Err(ErrorKind::Remote((*err).clone()));
        },
    };
    let Some(format) = ImageFormat::from_magic_bytes(&bytes) else {
        tracing::debug!(%locator, bytes = bytes.len(), "Payload is not a recognised image");
        return Err(ErrorKind::Undecodable(locator));
    };
    Ok(Asset { locator, format, bytes })
}
