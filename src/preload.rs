//! Read-ahead/read-behind preload policy.
//!
//! Drives [`crate::cache::ChunkCache`] fills around a moving playback
//! position. Runs as a cooperative loop: each fetched chunk is followed
//! by a [`tokio::task::yield_now`] so a single-threaded runtime still
//! services the controller and decoders between fills.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{chunk_index, chunk_start, ChunkCache, CHUNK_SIZE};
use crate::error::Result;
use crate::source::Source;

/// Chunks to keep filled ahead of the current position.
pub const CHUNKS_AHEAD: u64 = 20;

/// Chunks to keep filled behind the current position (for backward seeks).
pub const CHUNKS_BEHIND: u64 = 5;

/// Stop issuing fills once the cache is this full, to leave headroom for
/// other sources sharing the same cache.
pub const STOP_FILL_UTILIZATION: f32 = 0.95;

/// Approximate cooperative yield interval while filling.
const YIELD_INTERVAL: Duration = Duration::from_millis(8);

/// Drives chunk fills for one source against a shared cache.
pub struct Preloader {
    source: Arc<dyn Source>,
    cache: Arc<std::sync::Mutex<ChunkCache>>,
    chunks_ahead: u64,
    chunks_behind: u64,
}

impl Preloader {
    /// Creates a preloader for `source`, filling into the shared `cache`
    /// using the default [`CHUNKS_AHEAD`]/[`CHUNKS_BEHIND`] window.
    #[must_use]
    pub fn new(source: Arc<dyn Source>, cache: Arc<std::sync::Mutex<ChunkCache>>) -> Self {
        Self::with_window(source, cache, CHUNKS_AHEAD, CHUNKS_BEHIND)
    }

    /// Creates a preloader with an explicit read-ahead/read-behind window,
    /// e.g. from [`crate::config::Config::preload_chunks_ahead`].
    #[must_use]
    pub fn with_window(
        source: Arc<dyn Source>,
        cache: Arc<std::sync::Mutex<ChunkCache>>,
        chunks_ahead: u64,
        chunks_behind: u64,
    ) -> Self {
        Self {
            source,
            cache,
            chunks_ahead,
            chunks_behind,
        }
    }

    /// Fills the window around `position` (a byte offset into the source),
    /// stopping early if the cache reaches [`STOP_FILL_UTILIZATION`].
    ///
    /// # Errors
    ///
    /// Returns an error from the underlying [`Source::read`] on I/O
    /// failure; a partially filled window is left in the cache on error,
    /// which is safe to resume from on the next call.
    pub async fn fill_around(&self, position: u64) -> Result<()> {
        let size = self.source.size()?;
        let last_chunk = chunk_index(size.saturating_sub(1));
        let center = chunk_index(position);

        let start = center.saturating_sub(self.chunks_behind);
        let end = (center + self.chunks_ahead).min(last_chunk);

        let mut last_yield = tokio::time::Instant::now();

        for index in start..=end {
            {
                let mut cache = self.cache.lock()?;
                if cache.utilization() >= STOP_FILL_UTILIZATION {
                    break;
                }
                if cache.get(&self.source.cache_key(), index).is_some() {
                    continue;
                }
            }

            let offset = chunk_start(index);
            let remaining = size.saturating_sub(offset);
            let length = u32::try_from(remaining.min(CHUNK_SIZE)).unwrap_or(u32::MAX);
            if length == 0 {
                continue;
            }

            let data = self.source.read(offset, length)?;
            self.cache.lock()?.set(&self.source.cache_key(), index, data);

            if last_yield.elapsed() >= YIELD_INTERVAL {
                tokio::task::yield_now().await;
                last_yield = tokio::time::Instant::now();
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct FakeSource {
        data: Vec<u8>,
    }

    impl Source for FakeSource {
        fn size(&self) -> Result<u64> {
            Ok(self.data.len() as u64)
        }

        fn read(&self, offset: u64, length: u32) -> Result<Vec<u8>> {
            let offset = offset as usize;
            if offset >= self.data.len() {
                return Ok(Vec::new());
            }
            let end = (offset + length as usize).min(self.data.len());
            Ok(self.data[offset..end].to_vec())
        }

        fn cache_key(&self) -> String {
            "fake".to_owned()
        }
    }

    #[tokio::test]
    async fn fills_window_ahead_of_position() {
        let data = vec![7u8; (CHUNK_SIZE * 3) as usize];
        let source: Arc<dyn Source> = Arc::new(FakeSource { data });
        let cache = Arc::new(std::sync::Mutex::new(ChunkCache::new(CHUNK_SIZE * 10)));
        let preloader = Preloader::new(source, cache.clone());

        preloader.fill_around(0).await.unwrap();

        let mut cache = cache.lock().unwrap();
        assert!(cache.get("fake", 0).is_some());
        assert!(cache.get("fake", 1).is_some());
        assert!(cache.get("fake", 2).is_some());
    }

    #[tokio::test]
    async fn stops_filling_past_end_of_source() {
        let data = vec![1u8; (CHUNK_SIZE / 2) as usize];
        let source: Arc<dyn Source> = Arc::new(FakeSource { data });
        let cache = Arc::new(std::sync::Mutex::new(ChunkCache::new(CHUNK_SIZE * 10)));
        let preloader = Preloader::new(source, cache.clone());

        preloader.fill_around(0).await.unwrap();

        let mut cache = cache.lock().unwrap();
        assert!(cache.get("fake", 0).is_some());
        assert!(cache.get("fake", 1).is_none());
    }

    #[tokio::test]
    async fn respects_stop_fill_threshold() {
        let data = vec![9u8; (CHUNK_SIZE * 20) as usize];
        let source: Arc<dyn Source> = Arc::new(FakeSource { data });
        // Capacity of 2 chunks means utilization hits 100% almost immediately.
        let cache = Arc::new(std::sync::Mutex::new(ChunkCache::new(CHUNK_SIZE * 2)));
        let preloader = Preloader::new(source, cache.clone());

        preloader.fill_around(0).await.unwrap();

        let cache = cache.lock().unwrap();
        assert!(cache.len() <= 2);
    }

    #[test]
    fn error_from_read_propagates() {
        struct FailingSource;
        impl Source for FailingSource {
            fn size(&self) -> Result<u64> {
                Ok(CHUNK_SIZE)
            }
            fn read(&self, _offset: u64, _length: u32) -> Result<Vec<u8>> {
                Err(Error::source_io("boom"))
            }
            fn cache_key(&self) -> String {
                "failing".to_owned()
            }
        }

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let source: Arc<dyn Source> = Arc::new(FailingSource);
        let cache = Arc::new(std::sync::Mutex::new(ChunkCache::new(CHUNK_SIZE * 10)));
        let preloader = Preloader::new(source, cache);

        let result = rt.block_on(preloader.fill_around(0));
        assert!(result.is_err());
    }
}
