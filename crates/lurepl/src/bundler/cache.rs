// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Transform cache shared across build cycles.
//!
//! Entries are keyed by the plugin pipeline and the module id, and are only
//! reused when the loaded source still hashes to the recorded value. The
//! cache is bounded by an LRU so long editing sessions do not grow it
//! without limit.

use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::Arc;

use super::plugin::EmittedModule;

/// Default number of cached modules.
pub const DEFAULT_CACHE_CAPACITY: usize = 512;

/// Hex SHA-256 of `text`.
pub fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// A cached transform result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedModule {
    /// Hash of the source the transform ran on.
    pub source_hash: String,
    /// Transformed code.
    pub code: String,
    /// Modules emitted by the transform.
    pub emitted: Vec<EmittedModule>,
    /// Warnings reported by the transform, replayed on hits.
    pub warnings: Vec<String>,
}

/// Bundler cache owned by the build context.
#[derive(Debug)]
pub struct BundlerCache {
    bundler_version: String,
    entries: LruCache<String, Arc<CachedModule>>,
    hits: u64,
    misses: u64,
}

impl BundlerCache {
    /// Creates an empty cache tied to a bundler version.
    pub fn new(bundler_version: impl Into<String>, capacity: usize) -> Self {
        Self {
            bundler_version: bundler_version.into(),
            entries: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
            hits: 0,
            misses: 0,
        }
    }

    /// Version of the bundler that filled this cache.
    pub fn bundler_version(&self) -> &str {
        &self.bundler_version
    }

    fn key(pipeline: &str, id: &str) -> String {
        format!("{}\u{0}{}", pipeline, id)
    }

    /// Returns the cached transform for `id` when its source is unchanged.
    pub fn get(&mut self, pipeline: &str, id: &str, source_hash: &str) -> Option<Arc<CachedModule>> {
        let key = Self::key(pipeline, id);
        match self.entries.get(&key) {
            Some(entry) if entry.source_hash == source_hash => {
                self.hits += 1;
                Some(entry.clone())
            }
            _ => {
                self.misses += 1;
                None
            }
        }
    }

    /// Records a transform result.
    pub fn insert(&mut self, pipeline: &str, id: &str, module: CachedModule) {
        self.entries.put(Self::key(pipeline, id), Arc::new(module));
    }

    /// Number of cached modules.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lookups answered from the cache.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Lookups that required a transform.
    pub fn misses(&self) -> u64 {
        self.misses
    }
}
