//! Similarity Backends
//!
//! Anything that turns two vector sets and a threshold into ID pairs:
//!
//! ```text
//!                    ┌──────────────────┐
//! refs, cmps, T ───► │ SimilarityBackend│ ───► Vec<IdPair>
//!                    └──────────────────┘
//!                      ▲              ▲
//!          SoftwareBackend     LoopbackAccelerator
//!      (engine + matcher)      (bursts → weight-sum table → sentinel buffer)
//! ```
//!
//! The loopback accelerator runs the whole device round trip in-process so
//! framing and verification can be exercised without hardware. Device-side
//! IDs are positional and translated back to the caller's IDs on decode.

use crate::bitpack::VectorSet;
use crate::matcher::ThresholdMatcher;
use crate::similarity::{ScoringPolicy, SimilarityEngine, ThresholdTable};
use crate::transfer::{
    decode_sentinel_stream, encode_sentinel_stream, BurstConsumer, BurstProducer, IdLayout,
    TransferConfig,
};
use crate::verify::IdPair;
use crate::{Result, TanimotoError};

/// A source of thresholded ID pairs
pub trait SimilarityBackend {
    /// Short name for logs and reports
    fn name(&self) -> &str;

    /// All `(ref, cmp)` pairs passing `threshold`, in row-major order
    fn search(&mut self, refs: &VectorSet, cmps: &VectorSet, threshold: f64)
        -> Result<Vec<IdPair>>;
}

// ============================================================================
// SOFTWARE
// ============================================================================

/// Host-side scoring with a configurable policy
#[derive(Debug, Clone, Default)]
pub struct SoftwareBackend {
    engine: SimilarityEngine,
}

impl SoftwareBackend {
    pub fn new(engine: SimilarityEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &SimilarityEngine {
        &self.engine
    }
}

impl SimilarityBackend for SoftwareBackend {
    fn name(&self) -> &str {
        "software"
    }

    fn search(&mut self, refs: &VectorSet, cmps: &VectorSet, threshold: f64) -> Result<Vec<IdPair>> {
        let matcher = ThresholdMatcher::for_policy(self.engine.policy(), threshold, refs.width())?;
        let matrix = self.engine.compare_all(refs, cmps)?;
        Ok(matcher.filter_ids(&matrix))
    }
}

// ============================================================================
// LOOPBACK ACCELERATOR
// ============================================================================

/// Deliberate result corruption, applied before framing
///
/// Counting is 1-based over the emitted pairs: `drop_every: Some(3)` drops
/// the 3rd, 6th, ... pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultInjection {
    pub duplicate_every: Option<usize>,
    pub drop_every: Option<usize>,
}

impl FaultInjection {
    fn hits(every: Option<usize>, nth: usize) -> bool {
        every.is_some_and(|k| k > 0 && nth % k == 0)
    }

    fn apply(&self, pairs: Vec<IdPair>) -> Vec<IdPair> {
        if *self == Self::default() {
            return pairs;
        }
        let mut out = Vec::with_capacity(pairs.len());
        for (i, pair) in pairs.into_iter().enumerate() {
            let nth = i + 1;
            if Self::hits(self.drop_every, nth) {
                continue;
            }
            out.push(pair);
            if Self::hits(self.duplicate_every, nth) {
                out.push(pair);
            }
        }
        out
    }
}

/// In-process emulation of the FPGA search pipeline
///
/// The threshold is a dissimilarity in `[0, 1)` applied through the
/// weight-sum table, exactly as the device does.
#[derive(Debug, Clone, Default)]
pub struct LoopbackAccelerator {
    transfer: TransferConfig,
    layout: IdLayout,
    faults: FaultInjection,
    num_threads: usize,
}

impl LoopbackAccelerator {
    pub fn new(transfer: TransferConfig, layout: IdLayout) -> Self {
        Self {
            transfer,
            layout,
            faults: FaultInjection::default(),
            num_threads: 1,
        }
    }

    pub fn with_faults(mut self, faults: FaultInjection) -> Self {
        self.faults = faults;
        self
    }

    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads.max(1);
        self
    }

    #[inline]
    pub fn layout(&self) -> IdLayout {
        self.layout
    }

    /// Run the device side and return its raw result buffer
    ///
    /// IDs in the buffer are positional: reference `1..=N`, comparison
    /// `N+1..=N+M`.
    pub fn result_buffer(&self, refs: &VectorSet, cmps: &VectorSet, threshold: f64) -> Result<Vec<u8>> {
        let width = refs.width();
        let table = ThresholdTable::from_dissimilarity(threshold, width)?;

        let mut consumer = BurstConsumer::new(width);
        for burst in BurstProducer::new(refs, cmps, self.transfer)? {
            consumer.accept(burst)?;
        }
        let bursts = consumer.bursts();
        let (dev_refs, dev_cmps) = consumer.finish()?;
        tracing::debug!(bursts, refs = dev_refs.len(), cmps = dev_cmps.len(), "vectors transferred");

        let matrix = SimilarityEngine::new(ScoringPolicy::WeightSum)
            .with_threads(self.num_threads)
            .compare_all(&dev_refs, &dev_cmps)?;
        let pairs = self
            .faults
            .apply(ThresholdMatcher::with_table(table).filter_ids(&matrix));

        encode_sentinel_stream(&pairs, self.layout)
    }

    /// Map a positional device pair back to the caller's IDs
    fn translate(refs: &VectorSet, cmps: &VectorSet, pair: IdPair) -> Result<IdPair> {
        let n = refs.len();
        let ref_pos = pair.ref_id as usize;
        let cmp_pos = (pair.cmp_id as usize).checked_sub(n + 1);

        let reference = ref_pos.checked_sub(1).and_then(|i| refs.get(i));
        let comparison = cmp_pos.and_then(|j| cmps.get(j));
        match (reference, comparison) {
            (Some(r), Some(c)) => Ok(IdPair::new(r.id(), c.id())),
            _ => Err(TanimotoError::Framing(format!(
                "device pair {} outside {} references and {} comparisons",
                pair,
                n,
                cmps.len()
            ))),
        }
    }
}

impl SimilarityBackend for LoopbackAccelerator {
    fn name(&self) -> &str {
        "loopback"
    }

    fn search(&mut self, refs: &VectorSet, cmps: &VectorSet, threshold: f64) -> Result<Vec<IdPair>> {
        let buffer = self.result_buffer(refs, cmps, threshold)?;
        let pairs = decode_sentinel_stream(&buffer, self.layout)?;
        tracing::info!(pairs = pairs.len(), bytes = buffer.len(), "accelerator results decoded");

        pairs
            .into_iter()
            .map(|p| Self::translate(refs, cmps, p))
            .collect()
    }
}
