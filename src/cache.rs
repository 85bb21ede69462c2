//! Fingerprint-keyed cache of finished runs
//!
//! A run is a pure function of its parameters, its path mode and the engine
//! configuration, so identical requests within a process can share one
//! output.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::Serialize;

use crate::error::EngineResult;
use crate::params::SimulationParameters;
use crate::pricing::PricePathMode;
use crate::projection::{EngineConfig, SimulationOutput};

/// Everything a run depends on, in serialized form
#[derive(Serialize)]
struct FingerprintInput<'a> {
    params: &'a SimulationParameters,
    mode: PricePathMode,
    config: &'a EngineConfig,
}

/// Stable-within-process fingerprint of a run request
///
/// Floats are hashed through their JSON text, so `0.1` and `0.10` collide
/// while any real change in a value does not.
pub fn fingerprint(
    params: &SimulationParameters,
    mode: PricePathMode,
    config: &EngineConfig,
) -> EngineResult<u64> {
    let text = serde_json::to_string(&FingerprintInput {
        params,
        mode,
        config,
    })?;
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    Ok(hasher.finish())
}

/// Entries a cache holds unless told otherwise
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Finished outputs by fingerprint
///
/// Holds at most `capacity` outputs; inserting past that evicts the oldest
/// entry.
#[derive(Debug)]
pub struct RunCache {
    entries: HashMap<u64, Arc<SimulationOutput>>,
    order: VecDeque<u64>,
    capacity: usize,

    /// Statistics
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub evictions: u64,
}

impl Default for RunCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl RunCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache bounded to `capacity` entries; zero disables storage
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
            cache_hits: 0,
            cache_misses: 0,
            evictions: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Look up a finished run, recording a hit or miss
    pub fn lookup(&mut self, key: u64) -> Option<Arc<SimulationOutput>> {
        match self.entries.get(&key) {
            Some(output) => {
                self.cache_hits += 1;
                Some(Arc::clone(output))
            }
            None => {
                self.cache_misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, key: u64, output: Arc<SimulationOutput>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(key, output).is_some() {
            return;
        }
        self.order.push_back(key);
        while self.entries.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
            self.evictions += 1;
            log::debug!("run cache evicted {:016x}", oldest);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.cache_hits = 0;
        self.cache_misses = 0;
        self.evictions = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::fixtures::healthy_params;
    use crate::projection::PathFrame;
    use std::collections::BTreeMap;

    fn output() -> Arc<SimulationOutput> {
        Arc::new(SimulationOutput {
            price_paths: Vec::new(),
            pathdf: PathFrame::default(),
            accounts_table: BTreeMap::new(),
            debug_msgs: Vec::new(),
        })
    }

    #[test]
    fn test_fingerprint_tracks_inputs() {
        let params = healthy_params();
        let config = EngineConfig::default();
        let base = fingerprint(&params, PricePathMode::Historical, &config).unwrap();

        assert_eq!(base, fingerprint(&params, PricePathMode::Historical, &config).unwrap());

        let mc = fingerprint(&params, PricePathMode::MonteCarlo { seed: 1 }, &config).unwrap();
        assert_ne!(base, mc);

        let mut changed = params.clone();
        changed.annual_income += 1.0;
        assert_ne!(base, fingerprint(&changed, PricePathMode::Historical, &config).unwrap());

        let quarterly = EngineConfig {
            frequency: crate::params::Frequency::Quarterly,
            ..EngineConfig::default()
        };
        assert_ne!(base, fingerprint(&params, PricePathMode::Historical, &quarterly).unwrap());
    }

    #[test]
    fn test_cache_statistics() {
        let mut cache = RunCache::new();
        assert!(cache.lookup(42).is_none());
        cache.insert(42, output());
        assert!(cache.lookup(42).is_some());
        assert!(cache.lookup(42).is_some());

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.cache_hits, 2);
        assert_eq!(cache.cache_misses, 1);
        assert!((cache.hit_rate() - 2.0 / 3.0).abs() < 1e-12);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.hit_rate(), 0.0);
        assert_eq!(cache.capacity(), DEFAULT_CACHE_CAPACITY);
    }

    #[test]
    fn test_cache_evicts_oldest_past_capacity() {
        let mut cache = RunCache::with_capacity(2);
        cache.insert(1, output());
        cache.insert(2, output());
        cache.insert(2, output());
        assert_eq!(cache.evictions, 0);

        cache.insert(3, output());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.evictions, 1);
        assert!(cache.lookup(1).is_none());
        assert!(cache.lookup(2).is_some());
        assert!(cache.lookup(3).is_some());
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let mut cache = RunCache::with_capacity(0);
        cache.insert(1, output());
        assert!(cache.is_empty());
        assert!(cache.lookup(1).is_none());
    }
}
