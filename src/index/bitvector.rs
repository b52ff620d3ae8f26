//! Per-term document accumulator deciding whether a term also gets an
//! overflow bitmap.

use bit_vec::BitVec;
use serde::{Deserialize, Serialize};

/// Lower bound of the default crossover limit.
pub const MIN_BITMAP_LIMIT: u32 = 16;

/// Number of documents at which a term gets an overflow bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BitmapThreshold {
    /// Fixed document count.
    Absolute(u32),
    /// Fraction of the doc-id limit.
    Fraction(f64),
}

impl BitmapThreshold {
    /// Crossover limit for a field with `doc_id_limit` documents; at least 1.
    pub fn limit(&self, doc_id_limit: u32) -> u32 {
        let limit = match *self {
            BitmapThreshold::Absolute(count) => count,
            BitmapThreshold::Fraction(fraction) => {
                let scaled = (doc_id_limit as f64 * fraction).ceil();
                if scaled.is_finite() && scaled > 0.0 {
                    scaled.min(u32::MAX as f64) as u32
                } else {
                    0
                }
            }
        };
        limit.max(1)
    }
}

impl Default for BitmapThreshold {
    /// One document in 64. [`BitVectorCandidate::new`] raises the resulting
    /// limit to at least [`MIN_BITMAP_LIMIT`].
    fn default() -> Self {
        BitmapThreshold::Fraction(1.0 / 64.0)
    }
}

/// Collects the doc ids of the current term.
///
/// Ids are kept in a list until the crossover limit is reached, then moved
/// into a bit vector of `doc_id_limit` bits. The bit vector is allocated
/// once and reused for every later term.
///
/// Callers add each doc id at most once, in increasing order.
#[derive(Debug, Clone)]
pub struct BitVectorCandidate {
    doc_id_limit: u32,
    limit: u32,
    doc_ids: Vec<u32>,
    bits: BitVec,
    materialized: bool,
    count: u32,
}

impl BitVectorCandidate {
    /// Accumulator with the default limit: one document in 64, but never
    /// fewer than [`MIN_BITMAP_LIMIT`].
    pub fn new(doc_id_limit: u32) -> Self {
        let limit = BitmapThreshold::default()
            .limit(doc_id_limit)
            .max(MIN_BITMAP_LIMIT);
        Self::with_limit(doc_id_limit, limit)
    }

    /// Accumulator with a caller-chosen threshold, used as given.
    pub fn with_threshold(doc_id_limit: u32, threshold: BitmapThreshold) -> Self {
        Self::with_limit(doc_id_limit, threshold.limit(doc_id_limit))
    }

    fn with_limit(doc_id_limit: u32, limit: u32) -> Self {
        BitVectorCandidate {
            doc_id_limit,
            limit,
            doc_ids: Vec::new(),
            bits: BitVec::new(),
            materialized: false,
            count: 0,
        }
    }

    /// Record `doc_id` (which must be below the doc-id limit).
    pub fn set_bit(&mut self, doc_id: u32) {
        debug_assert!(doc_id < self.doc_id_limit);
        if self.materialized {
            self.bits.set(doc_id as usize, true);
        } else {
            self.doc_ids.push(doc_id);
            if self.doc_ids.len() as u64 >= self.limit as u64 {
                self.materialize();
            }
        }
        self.count += 1;
    }

    fn materialize(&mut self) {
        if self.bits.len() != self.doc_id_limit as usize {
            self.bits = BitVec::from_elem(self.doc_id_limit as usize, false);
        }
        for &doc_id in &self.doc_ids {
            self.bits.set(doc_id as usize, true);
        }
        self.doc_ids.clear();
        self.materialized = true;
    }

    /// Whether the term has reached the crossover limit.
    pub fn crossed_limit(&self) -> bool {
        self.count >= self.limit
    }

    /// The accumulated bitmap, once the limit has been crossed.
    pub fn bit_vector(&self) -> Option<&BitVec> {
        self.materialized.then_some(&self.bits)
    }

    /// Number of doc ids recorded for the current term.
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Forget the current term, keeping the bit vector allocation.
    pub fn clear(&mut self) {
        if self.materialized {
            self.bits.clear();
            self.materialized = false;
        }
        self.doc_ids.clear();
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_limits() {
        assert_eq!(BitmapThreshold::Absolute(5).limit(100), 5);
        assert_eq!(BitmapThreshold::Absolute(0).limit(100), 1);
        assert_eq!(BitmapThreshold::Fraction(0.5).limit(101), 51);
        assert_eq!(BitmapThreshold::Fraction(f64::NAN).limit(100), 1);

    }

    #[test]
    fn test_default_limit_has_floor() {
        assert_eq!(BitVectorCandidate::new(6400).limit(), 100);
        assert_eq!(BitVectorCandidate::new(100).limit(), MIN_BITMAP_LIMIT);
        assert_eq!(BitVectorCandidate::new(10).limit(), MIN_BITMAP_LIMIT);
    }

    #[test]
    fn test_explicit_fraction_is_used_as_given() {
        let threshold = BitmapThreshold::Fraction(0.05);
        assert_eq!(BitVectorCandidate::with_threshold(100, threshold).limit(), 5);
        assert_eq!(
            BitVectorCandidate::with_threshold(100, BitmapThreshold::default()).limit(),
            2
        );

        // A small field still gets bitmaps for its densest terms.
        let mut candidate = BitVectorCandidate::with_threshold(8, BitmapThreshold::Fraction(0.5));
        assert_eq!(candidate.limit(), 4);
        for doc_id in [0, 2, 5, 7] {
            candidate.set_bit(doc_id);
        }
        assert!(candidate.crossed_limit());
        assert_eq!(candidate.bit_vector().unwrap().len(), 8);

        assert_eq!(
            BitVectorCandidate::with_threshold(100, BitmapThreshold::Absolute(3)).limit(),
            3
        );
    }

    #[test]
    fn test_crossing_the_limit() {
        let mut candidate = BitVectorCandidate::with_threshold(100, BitmapThreshold::Absolute(3));
        candidate.set_bit(4);
        candidate.set_bit(9);
        assert!(!candidate.crossed_limit());
        assert!(candidate.bit_vector().is_none());

        candidate.set_bit(50);
        assert!(candidate.crossed_limit());
        candidate.set_bit(99);
        let bits = candidate.bit_vector().unwrap();
        assert_eq!(bits.len(), 100);
        let set: Vec<usize> = (0..bits.len()).filter(|&i| bits[i]).collect();
        assert_eq!(set, vec![4, 9, 50, 99]);
        assert_eq!(candidate.count(), 4);
    }

    #[test]
    fn test_clear_reuses_bits() {
        let mut candidate = BitVectorCandidate::with_threshold(64, BitmapThreshold::Absolute(2));
        candidate.set_bit(1);
        candidate.set_bit(2);
        candidate.clear();
        assert!(candidate.is_empty());
        assert!(!candidate.crossed_limit());
        assert!(candidate.bit_vector().is_none());

        candidate.set_bit(7);
        candidate.set_bit(8);
        let bits = candidate.bit_vector().unwrap();
        assert!(!bits[1] && !bits[2]);
        assert!(bits[7] && bits[8]);
    }
}
