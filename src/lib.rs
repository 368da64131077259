//! # Tanimoto - Brute-Force Similarity Search over Binary Fingerprints
//!
//! Software side of a fingerprint similarity accelerator:
//! - **Bitpacked fingerprints** of configurable width (920 or 128 bits)
//! - **Word-wise popcount** for binary weights
//! - **All-pairs Tanimoto** between a reference set and a comparison set
//! - **Threshold matching** into ordered ID pairs
//! - **Burst transfer model** with sentinel-framed result streams
//! - **Result verification** (missing / unexpected / duplicate)
//!
//! ## The Pipeline
//!
//! ```text
//! vector file ──► codec ──► weight ──► similarity (N × M) ──► matcher
//!                                                               │
//!                         ┌──────────── ID pairs ◄──────────────┘
//!                         ▼
//!           transfer (bursts / sentinel) ──► accelerator
//!                         │
//!                         ▼
//!                  verify(expected, actual)
//! ```
//!
//! ## Tanimoto on Bit Weights
//!
//! ```text
//! T(A, B) = |A ∧ B| / (|A| + |B| − |A ∧ B|)
//!
//! |x| = popcount(x), T = 0.0 when both vectors are all-zero
//! ```
//!
//! Every pass is O(N·M·W) with no index.

// === Core primitives ===
pub mod bitpack;
pub mod weight;
pub mod codec;

// === Search ===
pub mod similarity;
pub mod matcher;

// === Host / accelerator boundary ===
pub mod transfer;
pub mod backend;
pub mod verify;

// === Files & test data ===
pub mod storage;
pub mod fixtures;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ========================================================================
// Re-exports
// ========================================================================

pub use bitpack::{
    BitVector, Fingerprint, VectorSet, VectorWidth,
    DEFAULT_VECTOR_BITS, LEGACY_VECTOR_BITS,
};
pub use weight::{weight, weight_kernighan};
pub use codec::{FingerprintCodec, PaddingPolicy};
pub use similarity::{
    IntermediaryVector, PairScore, ScoringPolicy, SimilarityEngine, SimilarityMatrix,
    ThresholdTable,
};
pub use matcher::{Bound, Direction, MatchResult, ThresholdMatcher};
pub use transfer::{
    Burst, BurstConsumer, BurstProducer, IdLayout, PairOrder, Phase, TransferConfig,
    decode_sentinel_stream, encode_sentinel_stream,
};
pub use backend::{FaultInjection, LoopbackAccelerator, SimilarityBackend, SoftwareBackend};
pub use verify::{ComparisonResult, CountMismatch, IdPair, ResultVerifier};

// ========================================================================
// Error types
// ========================================================================

/// Error types for fingerprint search operations
#[derive(Debug, thiserror::Error)]
pub enum TanimotoError {
    #[error("IO error while trying to {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Size mismatch: {len} bytes is not a whole number of {record}-byte records")]
    SizeMismatch { len: usize, record: usize },

    #[error("Vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Duplicate vector ID {0} within one set")]
    DuplicateId(u32),

    #[error("Vector ID 0 is reserved for stream termination")]
    ReservedId,

    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TanimotoError {
    /// Wrap an I/O error with the failing operation and file
    pub fn io(op: &'static str, path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, TanimotoError>;

// ========================================================================
// Configuration
// ========================================================================

/// Global configuration for a similarity pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Fingerprint width in bits (default: 920)
    pub vector_bits: usize,
    /// Scoring policy for pair coefficients
    pub policy: ScoringPolicy,
    /// Threshold, interpreted in the policy's direction
    pub threshold: f64,
    /// How the codec treats hex strings shorter than W/4
    pub padding: PaddingPolicy,
    /// Vectors per transfer burst
    pub burst_len: usize,
    /// Number of worker threads for the all-pairs pass
    pub num_threads: usize,
    /// Minimum reference rows per parallel work unit
    pub batch_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            vector_bits: DEFAULT_VECTOR_BITS,
            policy: ScoringPolicy::Tanimoto,
            threshold: 0.67,
            padding: PaddingPolicy::ZeroPad,
            burst_len: transfer::DEFAULT_BURST_LEN,
            num_threads: num_cpus::get().max(1),
            batch_size: similarity::DEFAULT_BATCH_ROWS,
        }
    }
}

impl SearchConfig {
    /// Load from a JSON file; missing fields keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| TanimotoError::io("read config", path, e))?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges before any data is touched
    pub fn validate(&self) -> Result<()> {
        self.width()?;
        if !self.threshold.is_finite() {
            return Err(TanimotoError::InvalidConfig(format!(
                "threshold must be finite, got {}",
                self.threshold
            )));
        }
        if self.policy == ScoringPolicy::WeightSum && !(0.0..1.0).contains(&self.threshold) {
            return Err(TanimotoError::InvalidConfig(format!(
                "weight-sum threshold must lie in [0, 1), got {}",
                self.threshold
            )));
        }
        if self.burst_len == 0 {
            return Err(TanimotoError::InvalidConfig("burst_len must be > 0".into()));
        }
        if self.num_threads == 0 {
            return Err(TanimotoError::InvalidConfig("num_threads must be > 0".into()));
        }
        if self.batch_size == 0 {
            return Err(TanimotoError::InvalidConfig("batch_size must be > 0".into()));
        }
        Ok(())
    }

    /// Validated vector width
    pub fn width(&self) -> Result<VectorWidth> {
        VectorWidth::new(self.vector_bits)
    }

    /// Codec matching this configuration
    pub fn codec(&self) -> Result<FingerprintCodec> {
        Ok(FingerprintCodec::new(self.width()?, self.padding))
    }

    /// Matcher matching this configuration
    pub fn matcher(&self) -> Result<ThresholdMatcher> {
        ThresholdMatcher::for_policy(self.policy, self.threshold, self.width()?)
    }

    /// Engine matching this configuration
    pub fn engine(&self) -> SimilarityEngine {
        SimilarityEngine::new(self.policy)
            .with_threads(self.num_threads)
            .with_batch_size(self.batch_size)
    }
}

// Inline helper for CPU count when num_cpus isn't available
mod num_cpus {
    pub fn get() -> usize {
        std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(4)
    }
}
