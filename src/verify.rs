//! Result Verification
//!
//! Three-way diff between an expected ID-pair list and an actual one
//! (software or accelerator output):
//!
//! ```text
//! expected ──► membership set ──┐
//!                               ├──► missing     (expected, count 0)
//! actual ────► count map ───────┼──► unexpected  (not in expected)
//!                               └──► duplicate   (count > 1)
//! ```
//!
//! `unexpected` and `duplicate` are independent: a pair can be both.
//! Output order is deterministic: `missing` follows `expected`, the other
//! two follow the first occurrence in `actual`.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::{self, Write};

/// Reference/comparison ID pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct IdPair {
    pub ref_id: u32,
    pub cmp_id: u32,
}

impl IdPair {
    #[inline]
    pub const fn new(ref_id: u32, cmp_id: u32) -> Self {
        Self { ref_id, cmp_id }
    }

    /// The all-zero pair used as stream terminator
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.ref_id == 0 && self.cmp_id == 0
    }
}

impl From<(u32, u32)> for IdPair {
    fn from((ref_id, cmp_id): (u32, u32)) -> Self {
        Self::new(ref_id, cmp_id)
    }
}

impl fmt::Display for IdPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.ref_id, self.cmp_id)
    }
}

/// Expected and actual pair counts differ (non-fatal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountMismatch {
    pub expected: usize,
    pub actual: usize,
}

/// Classified discrepancies between expected and actual pairs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComparisonResult {
    pub missing: Vec<IdPair>,
    pub unexpected: Vec<IdPair>,
    pub duplicate: Vec<IdPair>,
    expected_count: usize,
    actual_count: usize,
}

impl ComparisonResult {
    /// No discrepancies of any kind
    pub fn is_match(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty() && self.duplicate.is_empty()
    }

    pub fn expected_count(&self) -> usize {
        self.expected_count
    }

    pub fn actual_count(&self) -> usize {
        self.actual_count
    }

    pub fn count_mismatch(&self) -> Option<CountMismatch> {
        (self.expected_count != self.actual_count).then_some(CountMismatch {
            expected: self.expected_count,
            actual: self.actual_count,
        })
    }

    /// Human-readable report
    pub fn write_report<W: Write>(&self, w: &mut W) -> io::Result<()> {
        if let Some(mismatch) = self.count_mismatch() {
            writeln!(
                w,
                "Count mismatch: expected {} ID pairs, got {}",
                mismatch.expected, mismatch.actual
            )?;
        }
        write_section(w, "Missing expected ID pairs", &self.missing)?;
        write_section(w, "Unexpected ID pairs in results", &self.unexpected)?;
        write_section(w, "Duplicate ID pairs in results", &self.duplicate)?;
        if self.is_match() {
            writeln!(w, "All {} expected ID pairs found, no extras.", self.expected_count)?;
        }
        Ok(())
    }
}

fn write_section<W: Write>(w: &mut W, title: &str, pairs: &[IdPair]) -> io::Result<()> {
    if pairs.is_empty() {
        return Ok(());
    }
    writeln!(w, "{} ({}):", title, pairs.len())?;
    for p in pairs {
        writeln!(w, "  Ref ID: 0x{:08x}, Cmp ID: 0x{:08x}", p.ref_id, p.cmp_id)?;
    }
    Ok(())
}

/// Compares expected and actual ID-pair lists
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultVerifier;

impl ResultVerifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify every discrepancy; expected pairs are assumed unique
    pub fn verify(&self, expected: &[IdPair], actual: &[IdPair]) -> ComparisonResult {
        if expected.len() != actual.len() {
            tracing::warn!(
                expected = expected.len(),
                actual = actual.len(),
                "ID pair count mismatch, verifying anyway"
            );
        }

        let expected_set: HashSet<IdPair> = expected.iter().copied().collect();

        // Counts plus first-occurrence order
        let mut counts: HashMap<IdPair, usize> = HashMap::with_capacity(actual.len());
        let mut order: Vec<IdPair> = Vec::new();
        for &pair in actual {
            let count = counts.entry(pair).or_insert(0);
            if *count == 0 {
                order.push(pair);
            }
            *count += 1;
        }

        let missing = expected
            .iter()
            .filter(|p| !counts.contains_key(*p))
            .copied()
            .collect();
        let unexpected = order
            .iter()
            .filter(|p| !expected_set.contains(*p))
            .copied()
            .collect();
        let duplicate = order
            .iter()
            .filter(|p| counts.get(*p).copied().unwrap_or(0) > 1)
            .copied()
            .collect();

        let result = ComparisonResult {
            missing,
            unexpected,
            duplicate,
            expected_count: expected.len(),
            actual_count: actual.len(),
        };

        tracing::info!(
            missing = result.missing.len(),
            unexpected = result.unexpected.len(),
            duplicate = result.duplicate.len(),
            "verification done"
        );
        result
    }
}
