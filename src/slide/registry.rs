//! Reader cache (§4.7): a bounded, concurrency-safe map from slide ID to an
//! opened [`Slide`], with LRU eviction and a synchronous close callback.
//!
//! Concurrent misses on the same key are single-flighted: the first caller
//! opens the slide, later callers for the same key await that result
//! instead of racing duplicate opens. This satisfies §4.7's "acceptable
//! substitute" for the race-on-miss behaviour the spec permits but does
//! not require.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::{Mutex, Notify, RwLock};

use crate::error::{CoreError, IoError};
use crate::io::RangeReader;

use super::reader::{PyramidMetadata, Slide};

/// Default capacity for the slide cache (§4.7: default 100).
pub const DEFAULT_SLIDE_CACHE_CAPACITY: usize = 100;

/// Creates a byte-range reader for a slide identifier. Lets the registry
/// work against any storage backend (local file, S3, ...) without knowing
/// which one it is.
#[async_trait]
pub trait SlideSource: Send + Sync {
    type Reader: RangeReader + 'static;

    async fn create_reader(&self, slide_id: &str) -> Result<Self::Reader, IoError>;
}

/// State for an in-flight `open_slide`, shared by every caller racing the
/// same key.
struct InFlightState<R: RangeReader + 'static> {
    notify: Notify,
    result: Mutex<Option<Result<Arc<Slide<R>>, CoreError>>>,
}

/// Bounded, LRU-evicted cache of opened slides, keyed by an opaque slide ID.
pub struct SlideRegistry<S: SlideSource> {
    source: S,
    cache: RwLock<LruCache<String, Arc<Slide<S::Reader>>>>,
    in_flight: Mutex<HashMap<String, Arc<InFlightState<S::Reader>>>>,
}

impl<S: SlideSource> SlideRegistry<S> {
    /// New registry with the default capacity (100 slides).
    pub fn new(source: S) -> Self {
        Self::with_capacity(source, DEFAULT_SLIDE_CACHE_CAPACITY)
    }

    pub fn with_capacity(source: S, capacity: usize) -> Self {
        Self {
            source,
            cache: RwLock::new(LruCache::new(
                std::num::NonZeroUsize::new(capacity.max(1)).unwrap(),
            )),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Open (or fetch cached) the slide named `slide_id` and return its
    /// metadata, ensuring it is parsed and cached — the `open_slide`
    /// contract of §6.
    pub async fn open_slide(&self, slide_id: &str) -> Result<PyramidMetadata, CoreError> {
        let slide = self.get_slide(slide_id).await?;
        Ok(slide.metadata())
    }

    /// Get a cached or newly-opened `Slide`, single-flighting concurrent
    /// misses on the same key. A failed open never inserts a cache entry
    /// (§7: "the reader cache never catches errors from `open_slide`").
    pub async fn get_slide(&self, slide_id: &str) -> Result<Arc<Slide<S::Reader>>, CoreError> {
        {
            let mut cache = self.cache.write().await;
            if let Some(slide) = cache.get(slide_id) {
                return Ok(slide.clone());
            }
        }

        loop {
            let state = {
                let mut in_flight = self.in_flight.lock().await;
                if let Some(state) = in_flight.get(slide_id) {
                    state.clone()
                } else {
                    let state = Arc::new(InFlightState {
                        notify: Notify::new(),
                        result: Mutex::new(None),
                    });
                    in_flight.insert(slide_id.to_string(), state.clone());
                    drop(in_flight);

                    let result = self.open_slide_internal(slide_id).await;

                    *state.result.lock().await = Some(result.clone());

                    if let Ok(ref slide) = result {
                        let evicted = self
                            .cache
                            .write()
                            .await
                            .push(slide_id.to_string(), slide.clone());
                        if let Some((evicted_key, evicted_slide)) = evicted {
                            if evicted_key != slide_id {
                                evicted_slide.close().await;
                            }
                        }
                    }

                    self.in_flight.lock().await.remove(slide_id);
                    state.notify.notify_waiters();

                    return result;
                }
            };

            state.notify.notified().await;
            if let Some(ref result) = *state.result.lock().await {
                return result.clone();
            }
        }
    }

    async fn open_slide_internal(&self, slide_id: &str) -> Result<Arc<Slide<S::Reader>>, CoreError> {
        let reader = self
            .source
            .create_reader(slide_id)
            .await
            .map_err(CoreError::Io)?;
        let slide = Slide::open(reader).await?;
        Ok(Arc::new(slide))
    }

    /// Remove a slide from the cache, closing it once every other
    /// borrower has dropped its handle.
    pub async fn invalidate(&self, slide_id: &str) {
        let removed = self.cache.write().await.pop(slide_id);
        if let Some(slide) = removed {
            slide.close().await;
        }
    }

    /// Drop every cached slide, closing each one.
    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        let cap = cache.cap();
        let all: Vec<_> = std::mem::replace(&mut *cache, LruCache::new(cap))
            .into_iter()
            .collect();
        drop(cache);
        for (_, slide) in all {
            slide.close().await;
        }
    }

    pub async fn cached_count(&self) -> usize {
        self.cache.read().await.len()
    }
}
