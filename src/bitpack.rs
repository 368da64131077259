//! Bitpacked Fingerprint Vectors
//!
//! Core data structures for fingerprint search:
//! - `W` bits packed into `ceil(W/64)` little-endian u64 words
//! - Bits above `W` in the last word are always zero
//! - MSB-first byte layout for files and hex text
//!
//! # Memory Layout (W = 920)
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │ word[0]   │ word[1]    │ ... │ word[13]  │ word[14]│
//! │ bits 0-63 │ bits 64-127│     │           │bits 896-│
//! │           │            │     │           │    919  │
//! └────────────────────────────────────────────────────┘
//!   64 bits     64 bits            64 bits    24 bits used
//! ```
//!
//! # Byte Layout (files, bursts)
//!
//! ```text
//! byte 0        byte 1              byte W/8 - 1
//! bits W-1..W-8 bits W-9..W-16 ...  bits 7..0
//! ```

use std::collections::HashSet;
use std::fmt;
use std::ops::BitAnd;

use serde::{Deserialize, Serialize};

use crate::weight::weight;
use crate::{Result, TanimotoError};

/// Width of the production fingerprints: 920 bits = 115 bytes
pub const DEFAULT_VECTOR_BITS: usize = 920;

/// Width of the early prototype fingerprints
pub const LEGACY_VECTOR_BITS: usize = 128;

// ============================================================================
// WIDTH
// ============================================================================

/// Validated fingerprint width in bits (positive multiple of 8)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct VectorWidth(usize);

impl VectorWidth {
    pub fn new(bits: usize) -> Result<Self> {
        if bits == 0 || bits % 8 != 0 {
            return Err(TanimotoError::InvalidConfig(format!(
                "vector width must be a positive multiple of 8 bits, got {}",
                bits
            )));
        }
        Ok(Self(bits))
    }

    #[inline]
    pub fn bits(self) -> usize {
        self.0
    }

    /// Bytes per vector in the file format
    #[inline]
    pub fn bytes(self) -> usize {
        self.0 / 8
    }

    /// u64 words per vector in memory
    #[inline]
    pub fn words(self) -> usize {
        (self.0 + 63) / 64
    }

    /// Hex characters per vector
    #[inline]
    pub fn nibbles(self) -> usize {
        self.0 / 4
    }

    /// Mask for the valid bits of the last word
    #[inline]
    fn last_word_mask(self) -> u64 {
        match self.0 % 64 {
            0 => !0u64,
            used => (1u64 << used) - 1,
        }
    }
}

impl Default for VectorWidth {
    fn default() -> Self {
        Self(DEFAULT_VECTOR_BITS)
    }
}

impl TryFrom<usize> for VectorWidth {
    type Error = TanimotoError;

    fn try_from(bits: usize) -> Result<Self> {
        Self::new(bits)
    }
}

impl From<VectorWidth> for usize {
    fn from(width: VectorWidth) -> usize {
        width.0
    }
}

impl fmt::Display for VectorWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bits", self.0)
    }
}

// ============================================================================
// BIT VECTOR
// ============================================================================

/// A `W`-bit vector stored as packed u64 words.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BitVector {
    width: VectorWidth,
    words: Box<[u64]>,
}

impl BitVector {
    // =========================================================================
    // CONSTRUCTORS
    // =========================================================================

    /// Create a zero vector (all bits 0)
    pub fn zero(width: VectorWidth) -> Self {
        Self {
            width,
            words: vec![0u64; width.words()].into_boxed_slice(),
        }
    }

    /// Create a vector with all `W` bits set
    pub fn ones(width: VectorWidth) -> Self {
        Self::masked(width, vec![!0u64; width.words()])
    }

    /// Create from raw words (exactly `ceil(W/64)` of them); bits beyond
    /// `W` are masked off
    pub fn from_words(width: VectorWidth, words: Vec<u64>) -> Result<Self> {
        if words.len() != width.words() {
            return Err(TanimotoError::DimensionMismatch {
                expected: width.words(),
                got: words.len(),
            });
        }
        Ok(Self::masked(width, words))
    }

    fn masked(width: VectorWidth, words: Vec<u64>) -> Self {
        debug_assert_eq!(words.len(), width.words());
        let mut v = Self {
            width,
            words: words.into_boxed_slice(),
        };
        v.mask_tail();
        v
    }

    /// Create from MSB-first bytes (exactly `W/8` of them)
    pub fn from_be_bytes(width: VectorWidth, bytes: &[u8]) -> Result<Self> {
        if bytes.len() != width.bytes() {
            return Err(TanimotoError::DimensionMismatch {
                expected: width.bytes(),
                got: bytes.len(),
            });
        }
        Ok(Self::pack_be(width, bytes))
    }

    /// Fill every byte with the same pattern (fixed test vectors)
    pub fn from_byte_pattern(width: VectorWidth, pattern: u8) -> Self {
        Self::pack_be(width, &vec![pattern; width.bytes()])
    }

    // Caller guarantees bytes.len() == width.bytes()
    fn pack_be(width: VectorWidth, bytes: &[u8]) -> Self {
        let mut v = Self::zero(width);
        let n = bytes.len();
        for (i, &byte) in bytes.iter().enumerate() {
            let bit = 8 * (n - 1 - i);
            v.words[bit / 64] |= (byte as u64) << (bit % 64);
        }
        v
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    #[inline]
    pub fn width(&self) -> VectorWidth {
        self.width
    }

    /// Get the raw words
    #[inline]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    #[inline]
    pub(crate) fn words_mut(&mut self) -> &mut [u64] {
        &mut self.words
    }

    /// Convert to MSB-first bytes
    pub fn to_be_bytes(&self) -> Vec<u8> {
        let n = self.width.bytes();
        (0..n)
            .map(|i| {
                let bit = 8 * (n - 1 - i);
                (self.words[bit / 64] >> (bit % 64)) as u8
            })
            .collect()
    }

    /// Get a specific bit (0 = least significant)
    #[inline]
    pub fn get_bit(&self, index: usize) -> bool {
        debug_assert!(index < self.width.bits());
        (self.words[index / 64] >> (index % 64)) & 1 == 1
    }

    /// Set a specific bit
    #[inline]
    pub fn set_bit(&mut self, index: usize, value: bool) {
        debug_assert!(index < self.width.bits());
        let mask = 1u64 << (index % 64);
        if value {
            self.words[index / 64] |= mask;
        } else {
            self.words[index / 64] &= !mask;
        }
    }

    /// Get a 4-bit nibble; nibble 0 covers bits 0..4
    #[inline]
    pub(crate) fn nibble(&self, index: usize) -> u8 {
        let bit = index * 4;
        ((self.words[bit / 64] >> (bit % 64)) & 0xF) as u8
    }

    /// Set a 4-bit nibble (the nibble must be zero before)
    #[inline]
    pub(crate) fn or_nibble(&mut self, index: usize, value: u8) {
        let bit = index * 4;
        self.words[bit / 64] |= ((value & 0xF) as u64) << (bit % 64);
    }

    // =========================================================================
    // POPULATION COUNT
    // =========================================================================

    /// Count total set bits
    #[inline]
    pub fn popcount(&self) -> u32 {
        weight(&self.words)
    }

    /// Fraction of bits set
    #[inline]
    pub fn density(&self) -> f32 {
        self.popcount() as f32 / self.width.bits() as f32
    }

    // =========================================================================
    // BITWISE OPERATIONS
    // =========================================================================

    /// AND with another vector of the same width
    #[inline]
    pub fn and(&self, other: &Self) -> Self {
        debug_assert_eq!(self.width, other.width);
        let words = self
            .words
            .iter()
            .zip(other.words.iter())
            .map(|(a, b)| a & b)
            .collect();
        Self::masked(self.width, words)
    }

    /// Keep bits above `W` clear
    #[inline]
    fn mask_tail(&mut self) {
        let mask = self.width.last_word_mask();
        if let Some(last) = self.words.last_mut() {
            *last &= mask;
        }
    }
}

impl BitAnd for &BitVector {
    type Output = BitVector;

    fn bitand(self, rhs: Self) -> Self::Output {
        self.and(rhs)
    }
}

impl fmt::Debug for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BitVector({}, {} set, density={:.3})",
            self.width,
            self.popcount(),
            self.density()
        )
    }
}

// ============================================================================
// FINGERPRINT
// ============================================================================

/// An identified bit vector with its cached binary weight.
///
/// The weight is recomputed on every construction and mutation, so
/// `weight() == data().popcount()` always holds.
#[derive(Clone, PartialEq, Eq)]
pub struct Fingerprint {
    id: u32,
    weight: u32,
    data: BitVector,
}

impl Fingerprint {
    pub fn new(id: u32, data: BitVector) -> Self {
        let weight = data.popcount();
        Self { id, weight, data }
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn weight(&self) -> u32 {
        self.weight
    }

    #[inline]
    pub fn data(&self) -> &BitVector {
        &self.data
    }

    #[inline]
    pub fn width(&self) -> VectorWidth {
        self.data.width
    }

    /// Mutate the bits, then refresh the cached weight
    pub fn update<F: FnOnce(&mut BitVector)>(&mut self, f: F) {
        f(&mut self.data);
        self.data.mask_tail();
        self.weight = self.data.popcount();
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint(id={}, weight={})", self.id, self.weight)
    }
}

// ============================================================================
// VECTOR SET
// ============================================================================

/// Ordered, index-addressable set of fingerprints with unique IDs
#[derive(Debug, Clone)]
pub struct VectorSet {
    width: VectorWidth,
    fingerprints: Vec<Fingerprint>,
    ids: HashSet<u32>,
}

impl VectorSet {
    pub fn new(width: VectorWidth) -> Self {
        Self::with_capacity(width, 0)
    }

    pub fn with_capacity(width: VectorWidth, capacity: usize) -> Self {
        Self {
            width,
            fingerprints: Vec::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
        }
    }

    /// Build from fingerprints, validating each one
    pub fn from_fingerprints(
        width: VectorWidth,
        fingerprints: impl IntoIterator<Item = Fingerprint>,
    ) -> Result<Self> {
        let mut set = Self::new(width);
        for fp in fingerprints {
            set.push(fp)?;
        }
        Ok(set)
    }

    /// Build from raw vectors, assigning IDs `first_id, first_id + 1, ...`
    pub fn from_vectors(
        width: VectorWidth,
        first_id: u32,
        vectors: impl IntoIterator<Item = BitVector>,
    ) -> Result<Self> {
        let mut set = Self::new(width);
        for (offset, data) in vectors.into_iter().enumerate() {
            let id = u32::try_from(offset)
                .ok()
                .and_then(|o| first_id.checked_add(o))
                .ok_or_else(|| TanimotoError::InvalidConfig("vector ID overflow".into()))?;
            set.push(Fingerprint::new(id, data))?;
        }
        Ok(set)
    }

    /// Append a fingerprint
    pub fn push(&mut self, fp: Fingerprint) -> Result<()> {
        if fp.width() != self.width {
            return Err(TanimotoError::DimensionMismatch {
                expected: self.width.bits(),
                got: fp.width().bits(),
            });
        }
        if fp.id() == 0 {
            return Err(TanimotoError::ReservedId);
        }
        if !self.ids.insert(fp.id()) {
            return Err(TanimotoError::DuplicateId(fp.id()));
        }
        self.fingerprints.push(fp);
        Ok(())
    }

    #[inline]
    pub fn width(&self) -> VectorWidth {
        self.width
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Fingerprint> {
        self.fingerprints.get(index)
    }

    #[inline]
    pub fn as_slice(&self) -> &[Fingerprint] {
        &self.fingerprints
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fingerprint> + '_ {
        self.fingerprints.iter()
    }

    /// Raw bytes of every vector in index order (file layout)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len() * self.width.bytes());
        for fp in &self.fingerprints {
            out.extend_from_slice(&fp.data().to_be_bytes());
        }
        out
    }
}

impl std::ops::Index<usize> for VectorSet {
    type Output = Fingerprint;

    fn index(&self, index: usize) -> &Fingerprint {
        &self.fingerprints[index]
    }
}

// =========================================================================
// TESTS
// =========================================================================
