//! Probability-vector utilities: rounding, degeneracy, memoization.

use std::collections::HashMap;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::config::{EPS_PROB, FRACTION_SUM_TOLERANCE};
use crate::error::TruncError;

/// Round every entry to the nearest multiple of `1/resolution`, then move the
/// largest entry so the vector sums to exactly 1.
///
/// `resolution == 0` returns the input unchanged.
pub fn round_probability_vector(prob: &[f64], resolution: u32) -> Vec<f64> {
    if resolution == 0 || prob.is_empty() {
        return prob.to_vec();
    }
    let r = f64::from(resolution);
    let mut out: Vec<f64> = prob.iter().map(|&p| (p * r).round() / r).collect();
    let sum: f64 = out.iter().sum();
    let mut largest = 0usize;
    for (i, &v) in out.iter().enumerate() {
        if v > out[largest] {
            largest = i;
        }
    }
    out[largest] = (out[largest] + (1.0 - sum)).max(0.0);
    out
}

/// Index of the facies whose probability exceeds `1 - EPS_PROB`, if any.
pub fn degenerate_facies(prob: &[f64]) -> Option<usize> {
    prob.iter().position(|&p| p > 1.0 - EPS_PROB)
}

/// Check length, finiteness, sign and total of a probability vector.
pub fn validate_probabilities(prob: &[f64], expected_len: usize) -> Result<(), TruncError> {
    if prob.len() != expected_len {
        return Err(TruncError::config(format!(
            "probability vector has {} entries, zone models {expected_len} facies",
            prob.len()
        )));
    }
    if let Some(bad) = prob.iter().find(|p| !p.is_finite() || **p < -EPS_PROB) {
        return Err(TruncError::Normalization(format!("invalid facies probability {bad}")));
    }
    let sum: f64 = prob.iter().sum();
    if (sum - 1.0).abs() > FRACTION_SUM_TOLERANCE {
        return Err(TruncError::Normalization(format!(
            "facies probabilities sum to {sum:.6}, expected 1"
        )));
    }
    Ok(())
}

/// Hashable memoization key: probabilities scaled by the resolution and rounded.
///
/// Stored inline for up to eight facies so lookups on the per-cell path do
/// not allocate.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProbabilityKey(pub SmallVec<[i64; 8]>);

/// Function turning a probability vector into a cache key.
pub type Keyer = fn(&[f64], u32) -> ProbabilityKey;

/// Default keyer: `round(p * resolution)` per entry.
pub fn probability_key(prob: &[f64], resolution: u32) -> ProbabilityKey {
    let r = f64::from(resolution.max(1));
    // Rounded probabilities lie in [0, resolution], far inside i64.
    #[allow(clippy::cast_possible_truncation)]
    ProbabilityKey(prob.iter().map(|&p| (p * r).round() as i64).collect())
}

/// Hit/miss counters of a [`PartitionCache`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that required building a partition.
    pub misses: u64,
    /// Distinct partitions stored.
    pub entries: usize,
}

/// Instance-scoped memo of built partitions keyed by rounded probabilities.
///
/// Entries are never evicted; once rounded, the key space is small.
#[derive(Clone, Debug)]
pub struct PartitionCache<P> {
    resolution: u32,
    keyer: Keyer,
    entries: HashMap<ProbabilityKey, Arc<P>>,
    hits: u64,
    misses: u64,
}

impl<P> PartitionCache<P> {
    /// Cache with the default keyer; `resolution == 0` disables it.
    pub fn new(resolution: u32) -> Self {
        Self::with_keyer(resolution, probability_key)
    }

    /// Cache with a caller-supplied keyer.
    pub fn with_keyer(resolution: u32, keyer: Keyer) -> Self {
        Self { resolution, keyer, entries: HashMap::new(), hits: 0, misses: 0 }
    }

    /// True when lookups are performed at all.
    pub fn is_enabled(&self) -> bool {
        self.resolution > 0
    }

    /// Rounding resolution.
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Key for `prob` under this cache's keyer.
    pub fn key(&self, prob: &[f64]) -> ProbabilityKey {
        (self.keyer)(prob, self.resolution)
    }

    /// Look up a partition, counting the hit or miss.
    pub fn get(&mut self, key: &ProbabilityKey) -> Option<Arc<P>> {
        match self.entries.get(key) {
            Some(p) => {
                self.hits += 1;
                Some(Arc::clone(p))
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Store a freshly built partition and return the shared handle.
    pub fn insert(&mut self, key: ProbabilityKey, partition: P) -> Arc<P> {
        let shared = Arc::new(partition);
        self.entries.insert(key, Arc::clone(&shared));
        shared
    }

    /// Drop every stored partition and reset the counters.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.hits = 0;
        self.misses = 0;
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats { hits: self.hits, misses: self.misses, entries: self.entries.len() }
    }
}
