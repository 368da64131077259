//! All-Pairs Similarity Engine
//!
//! Scores every (reference, comparison) pair from the three bit weights:
//!
//! ```text
//! for i in 0..N:                       ┌─────────────── M ──────────────┐
//!   for j in 0..M:                   N │ cell(i, j) = { and_w, coeff }  │
//!     C      = ref[i] & cmp[j]         │ row i owned by exactly one     │
//!     and_w  = popcount(C)             │ worker, written once           │
//!     coeff  = policy(ref_w, cmp_w,    └────────────────────────────────┘
//!                     and_w)
//! ```
//!
//! # Scoring Policies
//!
//! | Policy          | Score                              | Accept         |
//! |-----------------|------------------------------------|----------------|
//! | `Tanimoto`      | `c / (a + b − c)`, 0 if a=b=0       | `>= T`         |
//! | `Dissimilarity` | `1 − tanimoto`                     | `<= T`         |
//! | `WeightSum`     | `a + b`                            | `<= table[c]`  |
//!
//! `WeightSum` mirrors the accelerator, which avoids a divider by looking up
//! `table[c] = floor(c · (2 − T) / (1 − T))` per AND weight.

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::bitpack::{BitVector, Fingerprint, VectorSet, VectorWidth};
use crate::matcher::Direction;
use crate::{Result, TanimotoError};

/// Default minimum rows per parallel work unit
pub const DEFAULT_BATCH_ROWS: usize = 16;

// ============================================================================
// SCORING POLICY
// ============================================================================

/// How a pair's three weights become a coefficient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringPolicy {
    /// Standard Tanimoto similarity in [0, 1]
    #[default]
    Tanimoto,
    /// `1 − tanimoto`
    Dissimilarity,
    /// Hardware emulation: `refWeight + cmpWeight` against a per-AND-weight table
    WeightSum,
}

impl ScoringPolicy {
    /// Score one pair from its weights
    #[inline]
    pub fn score(self, ref_weight: u32, cmp_weight: u32, and_weight: u32) -> f64 {
        match self {
            Self::Tanimoto => tanimoto(ref_weight, cmp_weight, and_weight),
            Self::Dissimilarity => 1.0 - tanimoto(ref_weight, cmp_weight, and_weight),
            Self::WeightSum => (ref_weight as f64) + (cmp_weight as f64),
        }
    }

    /// Direction in which a scalar threshold applies
    pub fn direction(self) -> Direction {
        match self {
            Self::Tanimoto => Direction::AtLeast,
            Self::Dissimilarity | Self::WeightSum => Direction::AtMost,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Tanimoto => "tanimoto",
            Self::Dissimilarity => "dissimilarity",
            Self::WeightSum => "weight_sum",
        }
    }
}

impl fmt::Display for ScoringPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScoringPolicy {
    type Err = TanimotoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tanimoto" | "similarity" => Ok(Self::Tanimoto),
            "dissimilarity" | "distance" => Ok(Self::Dissimilarity),
            "weight_sum" | "weight-sum" | "hardware" => Ok(Self::WeightSum),
            other => Err(TanimotoError::InvalidConfig(format!(
                "unknown scoring policy {:?}",
                other
            ))),
        }
    }
}

/// Tanimoto coefficient from bit weights; 0.0 for a zero denominator
#[inline]
pub fn tanimoto(ref_weight: u32, cmp_weight: u32, and_weight: u32) -> f64 {
    let and_w = and_weight as f64;
    let denominator = ref_weight as f64 + cmp_weight as f64 - and_w;
    if denominator == 0.0 {
        return 0.0;
    }
    and_w / denominator
}

// ============================================================================
// THRESHOLD TABLE
// ============================================================================

/// Per-AND-weight upper bound on `refWeight + cmpWeight`
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdTable {
    threshold: f64,
    entries: Vec<u32>,
}

impl ThresholdTable {
    /// Build the table for a dissimilarity threshold `T` in `[0, 1)`
    pub fn from_dissimilarity(threshold: f64, width: VectorWidth) -> Result<Self> {
        if !(0.0..1.0).contains(&threshold) {
            return Err(TanimotoError::InvalidConfig(format!(
                "weight-sum threshold must lie in [0, 1), got {}",
                threshold
            )));
        }
        let ratio = (2.0 - threshold) / (1.0 - threshold);
        let entries = (0..=width.bits())
            .map(|c| (c as f64 * ratio) as u32)
            .collect();
        Ok(Self { threshold, entries })
    }

    #[inline]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Table entries indexed by AND weight (`W + 1` of them)
    #[inline]
    pub fn entries(&self) -> &[u32] {
        &self.entries
    }

    /// Upper bound for a given AND weight
    #[inline]
    pub fn bound(&self, and_weight: u32) -> u32 {
        self.entries
            .get(and_weight as usize)
            .copied()
            .unwrap_or(u32::MAX)
    }

    #[inline]
    pub fn accepts(&self, weight_sum: f64, and_weight: u32) -> bool {
        weight_sum <= self.bound(and_weight) as f64
    }
}

// ============================================================================
// PAIR DATA
// ============================================================================

/// Scratch AND vector for one (i, j) pair with its cached weight
#[derive(Debug, Clone)]
pub struct IntermediaryVector {
    weight: u32,
    data: BitVector,
}

impl IntermediaryVector {
    pub fn new(width: VectorWidth) -> Self {
        Self {
            weight: 0,
            data: BitVector::zero(width),
        }
    }

    /// AND of one reference and one comparison fingerprint
    pub fn of(reference: &Fingerprint, comparison: &Fingerprint) -> Self {
        let mut v = Self::new(reference.width());
        v.compute(reference, comparison);
        v
    }

    /// Overwrite in place with `reference & comparison`
    #[inline]
    pub fn compute(&mut self, reference: &Fingerprint, comparison: &Fingerprint) {
        let a = reference.data().words();
        let b = comparison.data().words();
        let mut weight = 0u32;
        for ((out, x), y) in self.data.words_mut().iter_mut().zip(a).zip(b) {
            *out = x & y;
            weight += out.count_ones();
        }
        self.weight = weight;
    }

    #[inline]
    pub fn weight(&self) -> u32 {
        self.weight
    }

    #[inline]
    pub fn data(&self) -> &BitVector {
        &self.data
    }
}

/// One matrix cell
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PairScore {
    pub and_weight: u32,
    pub coefficient: f64,
}

/// ID and weight of a scored vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub id: u32,
    pub weight: u32,
}

impl From<&Fingerprint> for Slot {
    fn from(fp: &Fingerprint) -> Self {
        Self {
            id: fp.id(),
            weight: fp.weight(),
        }
    }
}

/// Row-major N × M score matrix
#[derive(Debug, Clone)]
pub struct SimilarityMatrix {
    policy: ScoringPolicy,
    refs: Vec<Slot>,
    cmps: Vec<Slot>,
    cells: Vec<PairScore>,
}

impl SimilarityMatrix {
    #[inline]
    pub fn policy(&self) -> ScoringPolicy {
        self.policy
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.refs.len()
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cmps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    pub fn reference(&self, i: usize) -> Slot {
        self.refs[i]
    }

    #[inline]
    pub fn comparison(&self, j: usize) -> Slot {
        self.cmps[j]
    }

    pub fn get(&self, i: usize, j: usize) -> Option<&PairScore> {
        if i >= self.rows() || j >= self.cols() {
            return None;
        }
        self.cells.get(i * self.cols() + j)
    }

    pub fn row(&self, i: usize) -> &[PairScore] {
        let m = self.cols();
        &self.cells[i * m..(i + 1) * m]
    }

    /// Cells in ascending (i, j) order
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &PairScore)> + '_ {
        let m = self.cols();
        self.cells
            .iter()
            .enumerate()
            .map(move |(k, cell)| (k / m, k % m, cell))
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// Brute-force all-pairs scorer
#[derive(Debug, Clone)]
pub struct SimilarityEngine {
    policy: ScoringPolicy,
    num_threads: usize,
    batch_size: usize,
}

impl Default for SimilarityEngine {
    fn default() -> Self {
        Self::new(ScoringPolicy::default())
    }
}

impl SimilarityEngine {
    /// Create a single-threaded engine
    pub fn new(policy: ScoringPolicy) -> Self {
        Self {
            policy,
            num_threads: 1,
            batch_size: DEFAULT_BATCH_ROWS,
        }
    }

    /// Use a fixed-size worker pool
    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads.max(1);
        self
    }

    /// Minimum reference rows handed to a worker at once
    pub fn with_batch_size(mut self, rows: usize) -> Self {
        self.batch_size = rows.max(1);
        self
    }

    #[inline]
    pub fn policy(&self) -> ScoringPolicy {
        self.policy
    }

    /// Score a single pair
    pub fn score_pair(&self, reference: &Fingerprint, comparison: &Fingerprint) -> PairScore {
        let and = IntermediaryVector::of(reference, comparison);
        self.cell(reference, comparison, &and)
    }

    #[inline]
    fn cell(&self, r: &Fingerprint, c: &Fingerprint, and: &IntermediaryVector) -> PairScore {
        PairScore {
            and_weight: and.weight(),
            coefficient: self.policy.score(r.weight(), c.weight(), and.weight()),
        }
    }

    /// Score every (reference, comparison) pair
    pub fn compare_all(&self, refs: &VectorSet, cmps: &VectorSet) -> Result<SimilarityMatrix> {
        if refs.width() != cmps.width() {
            return Err(TanimotoError::DimensionMismatch {
                expected: refs.width().bits(),
                got: cmps.width().bits(),
            });
        }
        let (n, m) = (refs.len(), cmps.len());
        let total = n.checked_mul(m).ok_or_else(|| {
            TanimotoError::InvalidConfig(format!("{} × {} pairs overflow", n, m))
        })?;

        tracing::info!(
            refs = n,
            cmps = m,
            width = refs.width().bits(),
            policy = %self.policy,
            threads = self.num_threads,
            "similarity pass"
        );
        let start = Instant::now();

        let mut cells = vec![PairScore::default(); total];
        if total > 0 {
            self.fill(refs, cmps, &mut cells)?;
        }

        tracing::debug!(pairs = total, elapsed_us = start.elapsed().as_micros() as u64, "similarity pass done");

        Ok(SimilarityMatrix {
            policy: self.policy,
            refs: refs.iter().map(Slot::from).collect(),
            cmps: cmps.iter().map(Slot::from).collect(),
            cells,
        })
    }

    /// Fill one row; the scratch AND vector is reused across the row
    fn fill_row(
        &self,
        scratch: &mut IntermediaryVector,
        reference: &Fingerprint,
        cmps: &[Fingerprint],
        row: &mut [PairScore],
    ) {
        for (cell, comparison) in row.iter_mut().zip(cmps) {
            scratch.compute(reference, comparison);
            *cell = self.cell(reference, comparison, scratch);
        }
    }

    fn fill(&self, refs: &VectorSet, cmps: &VectorSet, cells: &mut [PairScore]) -> Result<()> {
        let width = refs.width();
        let m = cmps.len();

        if self.num_threads == 1 {
            let mut scratch = IntermediaryVector::new(width);
            for (row, reference) in cells.chunks_mut(m).zip(refs.iter()) {
                self.fill_row(&mut scratch, reference, cmps.as_slice(), row);
            }
            return Ok(());
        }

        self.fill_parallel(refs, cmps, cells)
    }

    #[cfg(feature = "rayon")]
    fn fill_parallel(&self, refs: &VectorSet, cmps: &VectorSet, cells: &mut [PairScore]) -> Result<()> {
        use rayon::prelude::*;

        let width = refs.width();
        let m = cmps.len();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .build()
            .map_err(|e| TanimotoError::InvalidConfig(format!("worker pool: {}", e)))?;

        pool.install(|| {
            cells
                .par_chunks_mut(m)
                .zip(refs.as_slice().par_iter())
                .with_min_len(self.batch_size)
                .for_each_init(
                    || IntermediaryVector::new(width),
                    |scratch, (row, reference)| {
                        self.fill_row(scratch, reference, cmps.as_slice(), row)
                    },
                );
        });
        Ok(())
    }

    #[cfg(not(feature = "rayon"))]
    fn fill_parallel(&self, refs: &VectorSet, cmps: &VectorSet, cells: &mut [PairScore]) -> Result<()> {
        let width = refs.width();
        let m = cmps.len();
        let rows_per_worker = ((refs.len() + self.num_threads - 1) / self.num_threads).max(self.batch_size);

        std::thread::scope(|scope| {
            for (block, ref_block) in cells
                .chunks_mut(rows_per_worker * m)
                .zip(refs.as_slice().chunks(rows_per_worker))
            {
                scope.spawn(move || {
                    let mut scratch = IntermediaryVector::new(width);
                    for (row, reference) in block.chunks_mut(m).zip(ref_block) {
                        self.fill_row(&mut scratch, reference, cmps.as_slice(), row);
                    }
                });
            }
        });
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
