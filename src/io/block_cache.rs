use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, Notify, RwLock};

use super::RangeReader;
use crate::error::IoError;

/// Memoising wrapper around a [`RangeReader`], used only while metadata
/// (the TIFF header and IFD chain) is being parsed.
///
/// Unlike a fixed-size block cache, spans memoised here are whatever the
/// parser asked for — a header, an IFD's entry table, a tag's overflow
/// array — so `read` is served from any previously fetched span that fully
/// contains the request, with no alignment requirement. [`Self::close_metadata`]
/// drops every memoised span once the pyramid has been fully classified;
/// tile and strip payload reads never pass through this cache.
pub struct BlockCache<R> {
    inner: Arc<R>,
    spans: RwLock<Vec<(u64, Bytes)>>,
    in_flight: Mutex<HashMap<(u64, usize), Arc<Notify>>>,
}

impl<R: RangeReader> BlockCache<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: Arc::new(inner),
            spans: RwLock::new(Vec::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch and memoise the span `[offset, offset + size)`, singleflighting
    /// concurrent requests for the identical span.
    pub async fn read_block(&self, offset: u64, size: usize) -> Result<Bytes, IoError> {
        if let Some(hit) = self.find_covering(offset, size).await {
            return Ok(hit);
        }

        let key = (offset, size);
        loop {
            let notify = {
                let mut in_flight = self.in_flight.lock().await;
                if let Some(notify) = in_flight.get(&key) {
                    let notify = notify.clone();
                    drop(in_flight);
                    notify.notified().await;
                    if let Some(hit) = self.find_covering(offset, size).await {
                        return Ok(hit);
                    }
                    continue;
                }
                let notify = Arc::new(Notify::new());
                in_flight.insert(key, notify.clone());
                notify
            };

            let result = self.inner.read_exact_at(offset, size).await;

            {
                let mut in_flight = self.in_flight.lock().await;
                if let Ok(ref data) = result {
                    self.spans.write().await.push((offset, data.clone()));
                }
                in_flight.remove(&key);
            }
            notify.notify_waiters();

            return result;
        }
    }

    /// Serve `[offset, offset + len)` from any memoised span fully
    /// containing it, falling back to an uncached read on the underlying
    /// source. This never grows the cache itself; call [`Self::read_block`]
    /// for reads that should be memoised.
    pub async fn read(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        if let Some(hit) = self.find_covering(offset, len).await {
            return Ok(hit);
        }
        self.inner.read_exact_at(offset, len).await
    }

    /// Drop every memoised span. Called once metadata parsing (header + IFD
    /// walk + tag resolution) is complete.
    pub async fn close_metadata(&self) {
        self.spans.write().await.clear();
    }

    /// Release the underlying source. Forwards to the wrapped reader's
    /// [`RangeReader::close`].
    pub async fn close(&self) {
        self.inner.close().await;
    }

    async fn find_covering(&self, offset: u64, len: usize) -> Option<Bytes> {
        if len == 0 {
            return Some(Bytes::new());
        }
        let end = offset + len as u64;
        let spans = self.spans.read().await;
        for (span_offset, data) in spans.iter() {
            let span_end = span_offset + data.len() as u64;
            if *span_offset <= offset && end <= span_end {
                let start = (offset - span_offset) as usize;
                let stop = (end - span_offset) as usize;
                return Some(data.slice(start..stop));
            }
        }
        None
    }
}

#[async_trait]
impl<R: RangeReader + 'static> RangeReader for BlockCache<R> {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        if offset + len as u64 > self.inner.size() {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size: self.inner.size(),
            });
        }
        self.read(offset, len).await
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }
}
