use base64::Engine;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::types::{Bitmap, PlayerSnapshot};

#[derive(Debug, Error)]
pub enum ArtworkError {
    #[error("invalid artwork reference: {0}")]
    InvalidRef(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server answered {0}")]
    Status(reqwest::StatusCode),
    #[error("bad base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("undecodable image ({len} bytes): {source}")]
    Decode {
        len: usize,
        #[source]
        source: image::ImageError,
    },
}

/// Where artwork bytes come from.
pub trait ArtworkSource: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, ArtworkError>> + Send;
}

/// Downloads artwork over HTTP(S). `data:` URLs are decoded in place.
#[derive(Clone)]
pub struct HttpArtwork {
    client: reqwest::Client,
}

impl HttpArtwork {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self { client })
    }
}

impl ArtworkSource for HttpArtwork {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, ArtworkError>> + Send {
        let client = self.client.clone();
        let url = url.to_string();

        async move {
            if url.starts_with("data:") {
                return decode_data_url(&url);
            }

            let response = client.get(&url).send().await?;
            if !response.status().is_success() {
                return Err(ArtworkError::Status(response.status()));
            }
            Ok(response.bytes().await?.to_vec())
        }
    }
}

/// Decode the payload of a base64 `data:` URL
fn decode_data_url(url: &str) -> Result<Vec<u8>, ArtworkError> {
    let (header, payload) = url
        .split_once(',')
        .ok_or_else(|| ArtworkError::InvalidRef("data URL without payload".to_string()))?;

    if !header.ends_with(";base64") {
        return Err(ArtworkError::InvalidRef(format!("unsupported data URL: {}", header)));
    }

    Ok(base64::engine::general_purpose::STANDARD.decode(payload)?)
}

/// Decode image bytes into a bitmap
pub fn decode_image(bytes: &[u8]) -> Result<Bitmap, ArtworkError> {
    let img = image::load_from_memory(bytes).map_err(|source| ArtworkError::Decode {
        len: bytes.len(),
        source,
    })?;
    Ok(Arc::new(img.to_rgba8()))
}

/// Single-slot artwork cache.
///
/// `bitmap`, when present, always belongs to `last_fetched_ref`.
#[derive(Debug, Clone, Default)]
pub struct ArtworkCache {
    last_fetched_ref: String,
    bitmap: Option<Bitmap>,
}

impl ArtworkCache {
    pub fn last_fetched_ref(&self) -> &str {
        &self.last_fetched_ref
    }

    pub fn bitmap(&self) -> Option<&Bitmap> {
        self.bitmap.as_ref()
    }

    pub fn clear(&mut self) {
        self.last_fetched_ref.clear();
        self.bitmap = None;
    }
}

/// A finished fetch, tagged with the reference it was issued for.
#[derive(Debug)]
pub struct ArtworkLoaded {
    pub artwork_ref: String,
    pub bitmap: Option<Bitmap>,
}

/// Keeps the artwork cache in step with the snapshots.
///
/// Fetches run on spawned tasks and report back over a channel; only the owner
/// of the receiver applies them, via [`ArtworkFetcher::complete`].
pub struct ArtworkFetcher<S> {
    source: Arc<S>,
    cache: ArtworkCache,
    completions: mpsc::UnboundedSender<ArtworkLoaded>,
}

impl<S: ArtworkSource> ArtworkFetcher<S> {
    pub fn new(source: S) -> (Self, mpsc::UnboundedReceiver<ArtworkLoaded>) {
        let (completions, rx) = mpsc::unbounded_channel();
        let fetcher = Self {
            source: Arc::new(source),
            cache: ArtworkCache::default(),
            completions,
        };
        (fetcher, rx)
    }

    pub fn cache(&self) -> &ArtworkCache {
        &self.cache
    }

    /// React to a new snapshot. Must be called from within a tokio runtime.
    pub fn on_snapshot(&mut self, snapshot: &PlayerSnapshot) {
        let artwork_ref = &snapshot.artwork_ref;

        if *artwork_ref == self.cache.last_fetched_ref {
            return;
        }

        if artwork_ref.is_empty() {
            log::debug!("Artwork cleared");
            self.cache.clear();
            return;
        }

        self.cache.last_fetched_ref = artwork_ref.clone();
        self.cache.bitmap = None;
        self.spawn_fetch(artwork_ref.clone());
    }

    /// Apply a finished fetch. Returns false if it was superseded and dropped.
    pub fn complete(&mut self, loaded: ArtworkLoaded) -> bool {
        if loaded.artwork_ref != self.cache.last_fetched_ref {
            log::debug!("Discarding stale artwork for {}", loaded.artwork_ref);
            return false;
        }

        self.cache.bitmap = loaded.bitmap;
        true
    }

    fn spawn_fetch(&self, artwork_ref: String) {
        log::debug!("Fetching artwork {}", artwork_ref);

        let source = self.source.clone();
        let completions = self.completions.clone();

        tokio::spawn(async move {
            // Anything that fails to arrive or decode is simply no artwork
            let bitmap = match source
                .fetch(&artwork_ref)
                .await
                .and_then(|bytes| decode_image(&bytes))
            {
                Ok(bitmap) => Some(bitmap),
                Err(e) => {
                    log::warn!("Failed to load artwork {}: {}", artwork_ref, e);
                    None
                }
            };

            // The receiver is gone only when the poll loop has shut down
            let _ = completions.send(ArtworkLoaded {
                artwork_ref,
                bitmap,
            });
        });
    }
}
