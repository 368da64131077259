//! Host ↔ Accelerator Transfer Model
//!
//! Two framings cross the boundary, independent of the physical bus:
//!
//! # Vector Bursts (host → accelerator)
//!
//! ```text
//! seq:    0        1        2          3        4
//!       ┌────────┬────────┬────────┐ ┌────────┬────────┐
//!       │ REF ×L │ REF ×L │ REF ≤L │ │ CMP ×L │ CMP ≤L │ EOS
//!       └────────┴────────┴────────┘ └────────┴────────┘
//!        reference phase, index order   comparison phase
//! ```
//!
//! Each burst carries up to `L` whole vectors of a single phase as raw
//! MSB-first bytes. Phases never interleave and the last burst of the last
//! phase carries the end-of-stream flag. Concatenated payloads are exactly
//! the vector file layout.
//!
//! # ID-Pair Stream (accelerator → host)
//!
//! ```text
//! ┌──────┬──────┬──────┬──────┬─────┬──────┬──────┬──────┬──────┐
//! │ ref  │ cmp  │ ref  │ cmp  │ ... │  0   │  0   │  0   │  0   │
//! └──────┴──────┴──────┴──────┴─────┴──────┴──────┴──────┴──────┘
//!                                     └── two all-zero pairs ──┘
//! ```
//!
//! The result count is unknown up front, so the stream is terminated by two
//! consecutive all-zero pairs rather than length-prefixed. ID 0 is reserved.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bitpack::{BitVector, VectorSet, VectorWidth};
use crate::verify::IdPair;
use crate::{Result, TanimotoError};

/// Default vectors per burst
pub const DEFAULT_BURST_LEN: usize = 8;

/// Number of all-zero pairs terminating a result stream
pub const SENTINEL_PAIRS: usize = 2;

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Vectors per burst
    pub burst_len: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            burst_len: DEFAULT_BURST_LEN,
        }
    }
}

// ============================================================================
// BURSTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Reference,
    Comparison,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference => f.write_str("reference"),
            Self::Comparison => f.write_str("comparison"),
        }
    }
}

/// One transfer unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Burst {
    pub seq: u32,
    pub phase: Phase,
    /// Number of whole vectors in `payload`
    pub count: usize,
    pub payload: Vec<u8>,
    pub end_of_stream: bool,
}

/// Emits the reference set, then the comparison set, in bursts
pub struct BurstProducer<'a> {
    refs: &'a VectorSet,
    cmps: &'a VectorSet,
    burst_len: usize,
    phase: Phase,
    index: usize,
    seq: u32,
}

impl<'a> BurstProducer<'a> {
    pub fn new(refs: &'a VectorSet, cmps: &'a VectorSet, config: TransferConfig) -> Result<Self> {
        if config.burst_len == 0 {
            return Err(TanimotoError::InvalidConfig("burst_len must be > 0".into()));
        }
        if refs.width() != cmps.width() {
            return Err(TanimotoError::DimensionMismatch {
                expected: refs.width().bits(),
                got: cmps.width().bits(),
            });
        }
        Ok(Self {
            refs,
            cmps,
            burst_len: config.burst_len,
            phase: Phase::Reference,
            index: 0,
            seq: 0,
        })
    }

    fn current(&self) -> &'a VectorSet {
        match self.phase {
            Phase::Reference => self.refs,
            Phase::Comparison => self.cmps,
        }
    }
}

impl Iterator for BurstProducer<'_> {
    type Item = Burst;

    fn next(&mut self) -> Option<Burst> {
        if self.phase == Phase::Reference && self.index >= self.refs.len() {
            self.phase = Phase::Comparison;
            self.index = 0;
        }
        let set = self.current();
        if self.index >= set.len() {
            return None;
        }

        let end = (self.index + self.burst_len).min(set.len());
        let width = set.width();
        let mut payload = Vec::with_capacity((end - self.index) * width.bytes());
        for fp in &set.as_slice()[self.index..end] {
            payload.extend_from_slice(&fp.data().to_be_bytes());
        }

        let end_of_stream = end == set.len()
            && (self.phase == Phase::Comparison || self.cmps.is_empty());

        let burst = Burst {
            seq: self.seq,
            phase: self.phase,
            count: end - self.index,
            payload,
            end_of_stream,
        };
        self.index = end;
        self.seq += 1;
        Some(burst)
    }
}

/// Reassembles bursts, enforcing order and phase rules.
///
/// The accelerator sees no IDs on the wire; vectors get positional IDs in
/// arrival order starting at 1 (reference `1..=N`, comparison
/// `N+1..=N+M`).
#[derive(Debug)]
pub struct BurstConsumer {
    width: VectorWidth,
    next_seq: u32,
    phase: Option<Phase>,
    ended: bool,
    refs: Vec<BitVector>,
    cmps: Vec<BitVector>,
}

impl BurstConsumer {
    pub fn new(width: VectorWidth) -> Self {
        Self {
            width,
            next_seq: 0,
            phase: None,
            ended: false,
            refs: Vec::new(),
            cmps: Vec::new(),
        }
    }

    /// Accept the next burst
    pub fn accept(&mut self, burst: Burst) -> Result<()> {
        if self.ended {
            return Err(TanimotoError::Framing(format!(
                "burst {} arrived after end of stream",
                burst.seq
            )));
        }
        if burst.seq != self.next_seq {
            return Err(TanimotoError::Framing(format!(
                "burst {} out of order, expected {}",
                burst.seq, self.next_seq
            )));
        }
        if self.phase == Some(Phase::Comparison) && burst.phase == Phase::Reference {
            return Err(TanimotoError::Framing(format!(
                "reference burst {} after comparison phase started",
                burst.seq
            )));
        }
        if burst.count == 0 || burst.payload.len() != burst.count * self.width.bytes() {
            return Err(TanimotoError::SizeMismatch {
                len: burst.payload.len(),
                record: self.width.bytes(),
            });
        }

        let target = match burst.phase {
            Phase::Reference => &mut self.refs,
            Phase::Comparison => &mut self.cmps,
        };
        for chunk in burst.payload.chunks_exact(self.width.bytes()) {
            target.push(BitVector::from_be_bytes(self.width, chunk)?);
        }

        tracing::trace!(seq = burst.seq, phase = %burst.phase, count = burst.count, "burst accepted");
        self.phase = Some(burst.phase);
        self.next_seq += 1;
        self.ended = burst.end_of_stream;
        Ok(())
    }

    /// Bursts accepted so far
    pub fn bursts(&self) -> u32 {
        self.next_seq
    }

    /// Finish the stream and return (reference, comparison) sets
    pub fn finish(self) -> Result<(VectorSet, VectorSet)> {
        if self.next_seq > 0 && !self.ended {
            return Err(TanimotoError::Framing(format!(
                "stream stopped after {} bursts without end-of-stream flag",
                self.next_seq
            )));
        }
        let n = self.refs.len();
        let first_cmp = u32::try_from(n + 1)
            .map_err(|_| TanimotoError::InvalidConfig("vector ID overflow".into()))?;
        let refs = VectorSet::from_vectors(self.width, 1, self.refs)?;
        let cmps = VectorSet::from_vectors(self.width, first_cmp, self.cmps)?;
        Ok((refs, cmps))
    }
}

// ============================================================================
// ID-PAIR STREAM
// ============================================================================

/// Which ID of a pair comes first in a result buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairOrder {
    RefFirst,
    CmpFirst,
}

/// Packing of IDs in a result buffer (big-endian per ID)
///
/// Only constructible through [`IdLayout::new`], so `id_bytes` is always
/// in `1..=4`. Deserialization goes through the same check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawIdLayout")]
pub struct IdLayout {
    id_bytes: u8,
    order: PairOrder,
}

#[derive(Deserialize)]
struct RawIdLayout {
    id_bytes: u8,
    order: PairOrder,
}

impl TryFrom<RawIdLayout> for IdLayout {
    type Error = TanimotoError;

    fn try_from(raw: RawIdLayout) -> Result<Self> {
        Self::new(raw.id_bytes, raw.order)
    }
}

impl Default for IdLayout {
    fn default() -> Self {
        Self {
            id_bytes: 4,
            order: PairOrder::RefFirst,
        }
    }
}

impl IdLayout {
    pub fn new(id_bytes: u8, order: PairOrder) -> Result<Self> {
        if !(1..=4).contains(&id_bytes) {
            return Err(TanimotoError::InvalidConfig(format!(
                "ID width must be 1-4 bytes, got {}",
                id_bytes
            )));
        }
        Ok(Self { id_bytes, order })
    }

    /// FPGA result layout: 8-bit IDs, comparison ID first
    pub fn accelerator() -> Self {
        Self {
            id_bytes: 1,
            order: PairOrder::CmpFirst,
        }
    }

    #[inline]
    pub fn id_bytes(&self) -> u8 {
        self.id_bytes
    }

    #[inline]
    pub fn order(&self) -> PairOrder {
        self.order
    }

    #[inline]
    pub fn pair_bytes(&self) -> usize {
        2 * self.id_bytes as usize
    }

    #[inline]
    pub fn max_id(&self) -> u32 {
        match self.id_bytes {
            4 => u32::MAX,
            n => (1u32 << (8 * n as u32)) - 1,
        }
    }

    fn write_id(&self, out: &mut Vec<u8>, id: u32) {
        let n = self.id_bytes as usize;
        out.extend_from_slice(&id.to_be_bytes()[4 - n..]);
    }

    fn read_id(bytes: &[u8]) -> u32 {
        bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32)
    }

    fn read_pair(&self, chunk: &[u8]) -> IdPair {
        let n = self.id_bytes as usize;
        let first = Self::read_id(&chunk[..n]);
        let second = Self::read_id(&chunk[n..2 * n]);
        match self.order {
            PairOrder::RefFirst => IdPair::new(first, second),
            PairOrder::CmpFirst => IdPair::new(second, first),
        }
    }
}

/// Pack pairs and append the two-pair terminator
pub fn encode_sentinel_stream(pairs: &[IdPair], layout: IdLayout) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity((pairs.len() + SENTINEL_PAIRS) * layout.pair_bytes());
    let max = layout.max_id();

    for pair in pairs {
        if pair.ref_id == 0 || pair.cmp_id == 0 {
            return Err(TanimotoError::ReservedId);
        }
        if pair.ref_id > max || pair.cmp_id > max {
            return Err(TanimotoError::Framing(format!(
                "pair {} does not fit {}-byte IDs",
                pair, layout.id_bytes
            )));
        }
        let (first, second) = match layout.order {
            PairOrder::RefFirst => (pair.ref_id, pair.cmp_id),
            PairOrder::CmpFirst => (pair.cmp_id, pair.ref_id),
        };
        layout.write_id(&mut out, first);
        layout.write_id(&mut out, second);
    }

    out.resize(out.len() + SENTINEL_PAIRS * layout.pair_bytes(), 0);
    Ok(out)
}

/// Read pairs until two consecutive all-zero pairs
///
/// A buffer that fills up before the terminator is returned as-is: the
/// accelerator had no room left to write it.
pub fn decode_sentinel_stream(buf: &[u8], layout: IdLayout) -> Result<Vec<IdPair>> {
    let mut pairs = Vec::new();
    let mut chunks = buf.chunks_exact(layout.pair_bytes());
    let mut pending_zero = false;

    for chunk in &mut chunks {
        let pair = layout.read_pair(chunk);
        if pair.is_zero() {
            if pending_zero {
                tracing::debug!(pairs = pairs.len(), "result stream terminated");
                return Ok(pairs);
            }
            pending_zero = true;
            continue;
        }
        if pending_zero {
            return Err(TanimotoError::Framing(format!(
                "single all-zero pair before {} at position {}",
                pair,
                pairs.len()
            )));
        }
        if pair.ref_id == 0 || pair.cmp_id == 0 {
            return Err(TanimotoError::Framing(format!(
                "pair {} uses reserved ID 0",
                pair
            )));
        }
        pairs.push(pair);
    }

    if !chunks.remainder().is_empty() {
        return Err(TanimotoError::SizeMismatch {
            len: buf.len(),
            record: layout.pair_bytes(),
        });
    }
    tracing::warn!(
        pairs = pairs.len(),
        "result buffer exhausted before terminator"
    );
    Ok(pairs)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sets(n: usize, m: usize) -> (VectorSet, VectorSet) {
        let width = VectorWidth::new(16).unwrap();
        let refs = VectorSet::from_vectors(
            width,
            1,
            (0..n).map(|i| BitVector::from_byte_pattern(width, i as u8 + 1)),
        )
        .unwrap();
        let cmps = VectorSet::from_vectors(
            width,
            n as u32 + 1,
            (0..m).map(|j| BitVector::from_byte_pattern(width, 0x80 | j as u8)),
        )
        .unwrap();
        (refs, cmps)
    }

    fn bursts(refs: &VectorSet, cmps: &VectorSet, len: usize) -> Vec<Burst> {
        BurstProducer::new(refs, cmps, TransferConfig { burst_len: len })
            .unwrap()
            .collect()
    }

    #[test]
    fn test_burst_phases_and_eos() {
        let (refs, cmps) = sets(5, 3);
        let bursts = bursts(&refs, &cmps, 2);

        let shape: Vec<(u32, Phase, usize, bool)> = bursts
            .iter()
            .map(|b| (b.seq, b.phase, b.count, b.end_of_stream))
            .collect();
        assert_eq!(
            shape,
            vec![
                (0, Phase::Reference, 2, false),
                (1, Phase::Reference, 2, false),
                (2, Phase::Reference, 1, false),
                (3, Phase::Comparison, 2, false),
                (4, Phase::Comparison, 1, true),
            ]
        );
    }

    #[test]
    fn test_payload_matches_file_layout() {
        let (refs, cmps) = sets(3, 4);
        let wire: Vec<u8> = bursts(&refs, &cmps, 3)
            .into_iter()
            .flat_map(|b| b.payload)
            .collect();
        let mut file = refs.to_bytes();
        file.extend(cmps.to_bytes());
        assert_eq!(wire, file);
    }

    #[test]
    fn test_eos_on_reference_when_no_comparisons() {
        let (refs, cmps) = sets(3, 0);
        let bursts = bursts(&refs, &cmps, 2);
        assert_eq!(bursts.len(), 2);
        assert!(bursts[1].end_of_stream);
        assert_eq!(bursts[1].phase, Phase::Reference);
    }

    #[test]
    fn test_empty_sets_emit_nothing() {
        let (refs, cmps) = sets(0, 0);
        assert!(bursts(&refs, &cmps, 4).is_empty());
        let (r, c) = BurstConsumer::new(refs.width()).finish().unwrap();
        assert!(r.is_empty() && c.is_empty());
    }

    #[test]
    fn test_consumer_reassembles_positionally() {
        let (refs, cmps) = sets(4, 3);
        let mut consumer = BurstConsumer::new(refs.width());
        for burst in bursts(&refs, &cmps, 3) {
            consumer.accept(burst).unwrap();
        }
        let (r, c) = consumer.finish().unwrap();
        assert_eq!(r.len(), 4);
        assert_eq!(c.len(), 3);
        assert_eq!(r[0].id(), 1);
        assert_eq!(c[0].id(), 5);
        assert_eq!(r.to_bytes(), refs.to_bytes());
        assert_eq!(c.to_bytes(), cmps.to_bytes());
    }

    #[test]
    fn test_consumer_rejects_reordering() {
        let (refs, cmps) = sets(4, 2);
        let mut b = bursts(&refs, &cmps, 2);
        let mut consumer = BurstConsumer::new(refs.width());
        b.swap(0, 1);
        assert!(matches!(consumer.accept(b.remove(0)), Err(TanimotoError::Framing(_))));
    }

    #[test]
    fn test_consumer_rejects_interleaved_phases() {
        let (refs, cmps) = sets(2, 2);
        let b = bursts(&refs, &cmps, 1);
        let mut consumer = BurstConsumer::new(refs.width());
        consumer.accept(b[0].clone()).unwrap();
        let mut cmp = b[2].clone();
        cmp.seq = 1;
        consumer.accept(cmp).unwrap();
        let mut late_ref = b[1].clone();
        late_ref.seq = 2;
        assert!(matches!(consumer.accept(late_ref), Err(TanimotoError::Framing(_))));
    }

    #[test]
    fn test_consumer_rejects_after_eos_and_missing_eos() {
        let (refs, cmps) = sets(1, 1);
        let b = bursts(&refs, &cmps, 1);

        let mut consumer = BurstConsumer::new(refs.width());
        consumer.accept(b[0].clone()).unwrap();
        assert!(consumer.finish().is_err());

        let mut consumer = BurstConsumer::new(refs.width());
        consumer.accept(b[0].clone()).unwrap();
        consumer.accept(b[1].clone()).unwrap();
        let mut extra = b[1].clone();
        extra.seq = 2;
        assert!(consumer.accept(extra).is_err());
    }

    #[test]
    fn test_consumer_rejects_torn_payload() {
        let (refs, cmps) = sets(1, 1);
        let mut b = bursts(&refs, &cmps, 1);
        b[0].payload.pop();
        let mut consumer = BurstConsumer::new(refs.width());
        assert!(matches!(
            consumer.accept(b.remove(0)),
            Err(TanimotoError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_sentinel_stream() {
        let pairs = vec![IdPair::new(1, 9), IdPair::new(300, 2)];
        let buf = encode_sentinel_stream(&pairs, IdLayout::default()).unwrap();
        assert_eq!(buf.len(), 4 * 8);
        assert_eq!(&buf[..8], &[0, 0, 0, 1, 0, 0, 0, 9]);
        assert_eq!(decode_sentinel_stream(&buf, IdLayout::default()).unwrap(), pairs);
    }

    #[test]
    fn test_sentinel_ignores_trailing_garbage() {
        let layout = IdLayout::accelerator();
        let mut buf = encode_sentinel_stream(&[IdPair::new(3, 7)], layout).unwrap();
        assert_eq!(&buf[..2], &[7, 3]);
        buf.extend_from_slice(&[0xAA, 0xBB, 0xCC]);
        assert_eq!(decode_sentinel_stream(&buf, layout).unwrap(), vec![IdPair::new(3, 7)]);
    }

    #[test]
    fn test_sentinel_single_zero_pair_is_error() {
        let layout = IdLayout::accelerator();
        let buf = [1, 2, 0, 0, 3, 4, 0, 0, 0, 0];
        assert!(matches!(
            decode_sentinel_stream(&buf, layout),
            Err(TanimotoError::Framing(_))
        ));
    }

    #[test]
    fn test_sentinel_full_buffer_without_terminator() {
        let layout = IdLayout::accelerator();
        let buf = [1, 2, 3, 4];
        assert_eq!(
            decode_sentinel_stream(&buf, layout).unwrap(),
            vec![IdPair::new(2, 1), IdPair::new(4, 3)]
        );
        assert!(matches!(
            decode_sentinel_stream(&[1, 2, 3], layout),
            Err(TanimotoError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_encode_rejects_reserved_and_wide_ids() {
        assert!(matches!(
            encode_sentinel_stream(&[IdPair::new(0, 1)], IdLayout::default()),
            Err(TanimotoError::ReservedId)
        ));
        assert!(encode_sentinel_stream(&[IdPair::new(256, 1)], IdLayout::accelerator()).is_err());
        assert!(IdLayout::new(5, PairOrder::RefFirst).is_err());
        assert_eq!(IdLayout::new(2, PairOrder::RefFirst).unwrap().max_id(), 0xFFFF);
    }

    #[test]
    fn test_layout_deserialize_checks_id_width() {
        for bad in [0, 5] {
            let json = format!(r#"{{"id_bytes":{},"order":"ref_first"}}"#, bad);
            assert!(serde_json::from_str::<IdLayout>(&json).is_err());
        }

        let layout: IdLayout =
            serde_json::from_str(r#"{"id_bytes":1,"order":"cmp_first"}"#).unwrap();
        assert_eq!(layout, IdLayout::accelerator());
        assert_eq!(layout.id_bytes(), 1);
        assert_eq!(layout.order(), PairOrder::CmpFirst);
        assert_eq!(
            decode_sentinel_stream(&[1, 2, 3, 4], layout).unwrap(),
            vec![IdPair::new(2, 1), IdPair::new(4, 3)]
        );
    }
}
