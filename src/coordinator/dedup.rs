// src/coordinator/dedup.rs
//! Coarse, bounded-memory duplicate filter.
//!
//! Fingerprint = SHA-256 over `source_id`, the first 100 characters of the
//! content and the event's UTC date. When the set reaches `max_entries` it is
//! cleared wholesale, so a duplicate arriving right after a clear slips
//! through. Exact, time-windowed dedup is out of scope for this cache.

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::debug;

use crate::event::{hex_prefix, RawEvent};

pub const FINGERPRINT_PREFIX_CHARS: usize = 100;

#[derive(Debug)]
pub struct DedupCache {
    seen: HashSet<String>,
    max_entries: usize,
    clears: u64,
}

impl DedupCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            seen: HashSet::new(),
            max_entries: max_entries.max(1),
            clears: 0,
        }
    }

    pub fn fingerprint(event: &RawEvent) -> String {
        let prefix: String = event
            .content()
            .chars()
            .take(FINGERPRINT_PREFIX_CHARS)
            .collect();
        let mut h = Sha256::new();
        h.update(event.source_id().as_bytes());
        h.update([0u8]);
        h.update(prefix.as_bytes());
        h.update([0u8]);
        h.update(event.timestamp().date_naive().to_string().as_bytes());
        hex_prefix(&h.finalize(), 16)
    }

    /// True when the event has not been seen since the last clear.
    pub fn check_and_insert(&mut self, event: &RawEvent) -> bool {
        let fp = Self::fingerprint(event);
        if self.seen.contains(&fp) {
            return false;
        }
        if self.seen.len() >= self.max_entries {
            debug!(target: "ingest", entries = self.seen.len(), "dedup cache full, clearing");
            self.seen.clear();
            self.clears += 1;
        }
        self.seen.insert(fp);
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clears(&self) -> u64 {
        self.clears
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}
