//! Chunk-aligned LRU byte cache.
//!
//! Bytes are only ever stored and evicted in whole [`CHUNK_SIZE`]-aligned
//! chunks, keyed by `(source key, chunk index)`. This keeps eviction O(1)
//! per chunk and lets the preloader reason about "chunks ahead/behind"
//! rather than raw byte ranges.

use std::num::NonZeroUsize;

use lru::LruCache;

/// Alignment and unit of both storage and eviction.
pub const CHUNK_SIZE: u64 = 2 * 1024 * 1024;

/// Default total cache capacity.
pub const DEFAULT_CAPACITY_BYTES: u64 = 100 * 1024 * 1024;

/// Index of the chunk containing byte `offset`.
#[must_use]
pub fn chunk_index(offset: u64) -> u64 {
    offset / CHUNK_SIZE
}

/// Byte offset at which chunk `index` starts.
#[must_use]
pub fn chunk_start(index: u64) -> u64 {
    index * CHUNK_SIZE
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
struct ChunkKey {
    source: String,
    index: u64,
}

/// Chunk-aligned LRU cache of source bytes.
///
/// `capacity_bytes` is translated to a chunk count at construction time;
/// partial last chunks (end of source) still count as one full chunk slot.
pub struct ChunkCache {
    chunks: LruCache<ChunkKey, Vec<u8>>,
    capacity_chunks: usize,
}

impl ChunkCache {
    /// Creates a cache sized to hold roughly `capacity_bytes` worth of
    /// chunk data.
    #[must_use]
    pub fn new(capacity_bytes: u64) -> Self {
        let capacity_chunks =
            usize::try_from(capacity_bytes / CHUNK_SIZE).unwrap_or(usize::MAX).max(1);
        Self {
            chunks: LruCache::new(NonZeroUsize::new(capacity_chunks).expect("capped at >= 1")),
            capacity_chunks,
        }
    }

    /// Looks up a single chunk, marking it most-recently-used on hit.
    #[must_use]
    pub fn get(&mut self, source: &str, index: u64) -> Option<&[u8]> {
        self.chunks
            .get(&ChunkKey {
                source: source.to_owned(),
                index,
            })
            .map(Vec::as_slice)
    }

    /// Finds the contiguous run of cached chunks overlapping
    /// `[offset, offset + length)`, returning `(first_index, chunks)` in
    /// ascending order. Stops at the first gap.
    pub fn find_overlapping(&mut self, source: &str, offset: u64, length: u64) -> Vec<(u64, Vec<u8>)> {
        if length == 0 {
            return Vec::new();
        }
        let first = chunk_index(offset);
        let last = chunk_index(offset + length - 1);

        let mut found = Vec::new();
        for index in first..=last {
            match self.get(source, index) {
                Some(data) => found.push((index, data.to_vec())),
                None => break,
            }
        }
        found
    }

    /// Inserts a full chunk's worth of bytes, evicting the least-recently
    /// used chunk if the cache is at capacity.
    pub fn set(&mut self, source: &str, index: u64, data: Vec<u8>) {
        self.chunks.put(
            ChunkKey {
                source: source.to_owned(),
                index,
            },
            data,
        );
    }

    /// Drops every chunk belonging to `source`.
    pub fn clear_source(&mut self, source: &str) {
        let stale: Vec<ChunkKey> = self
            .chunks
            .iter()
            .filter(|(key, _)| key.source == source)
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            self.chunks.pop(&key);
        }
    }

    /// Drops every cached chunk.
    pub fn clear(&mut self) {
        self.chunks.clear();
    }

    /// Fraction of capacity currently occupied, in `[0.0, 1.0]`.
    #[must_use]
    pub fn utilization(&self) -> f32 {
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.chunks.len() as f32 / self.capacity_chunks as f32;
        ratio
    }

    /// Number of chunks currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the cache holds no chunks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_index_and_start_round_trip() {
        assert_eq!(chunk_index(0), 0);
        assert_eq!(chunk_index(CHUNK_SIZE), 1);
        assert_eq!(chunk_index(CHUNK_SIZE + 1), 1);
        assert_eq!(chunk_start(1), CHUNK_SIZE);
    }

    #[test]
    fn set_then_get_hits() {
        let mut cache = ChunkCache::new(CHUNK_SIZE * 4);
        cache.set("a", 0, vec![1, 2, 3]);
        assert_eq!(cache.get("a", 0), Some(&[1u8, 2, 3][..]));
        assert_eq!(cache.get("a", 1), None);
    }

    #[test]
    fn eviction_drops_least_recently_used_chunk() {
        let mut cache = ChunkCache::new(CHUNK_SIZE * 2);
        cache.set("a", 0, vec![0]);
        cache.set("a", 1, vec![1]);
        // Touch chunk 0 so chunk 1 becomes the LRU victim.
        let _ = cache.get("a", 0);
        cache.set("a", 2, vec![2]);

        assert!(cache.get("a", 0).is_some());
        assert!(cache.get("a", 1).is_none());
        assert!(cache.get("a", 2).is_some());
    }

    #[test]
    fn find_overlapping_stops_at_gap() {
        let mut cache = ChunkCache::new(CHUNK_SIZE * 8);
        cache.set("a", 0, vec![0; CHUNK_SIZE as usize]);
        cache.set("a", 1, vec![1; CHUNK_SIZE as usize]);
        // chunk 2 missing
        cache.set("a", 3, vec![3; CHUNK_SIZE as usize]);

        let found = cache.find_overlapping("a", 0, CHUNK_SIZE * 4);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].0, 0);
        assert_eq!(found[1].0, 1);
    }

    #[test]
    fn clear_source_only_drops_matching_keys() {
        let mut cache = ChunkCache::new(CHUNK_SIZE * 8);
        cache.set("a", 0, vec![0]);
        cache.set("b", 0, vec![1]);
        cache.clear_source("a");
        assert!(cache.get("a", 0).is_none());
        assert!(cache.get("b", 0).is_some());
    }

    #[test]
    fn utilization_reflects_fill_ratio() {
        let mut cache = ChunkCache::new(CHUNK_SIZE * 4);
        assert!((cache.utilization() - 0.0).abs() < f32::EPSILON);
        cache.set("a", 0, vec![0]);
        cache.set("a", 1, vec![1]);
        assert!((cache.utilization() - 0.5).abs() < f32::EPSILON);
    }
}
