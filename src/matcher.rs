//! Threshold Matcher
//!
//! Reads a completed [`SimilarityMatrix`] in row-major order and keeps the
//! pairs that pass the bound. Ties at exactly the threshold are kept.
//!
//! ```text
//! AtLeast(T):         coefficient >= T        (similarity)
//! AtMost(T):          coefficient <= T        (dissimilarity)
//! AndWeightTable(t):  coefficient <= t[and_w] (weight sum, hardware)
//! ```

use serde::{Deserialize, Serialize};

use crate::bitpack::VectorWidth;
use crate::similarity::{PairScore, ScoringPolicy, SimilarityMatrix, ThresholdTable};
use crate::verify::IdPair;
use crate::Result;

/// Comparison direction for a scalar threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Keep `coefficient >= threshold`
    AtLeast,
    /// Keep `coefficient <= threshold`
    AtMost,
}

impl Direction {
    #[inline]
    pub fn accepts(self, coefficient: f64, threshold: f64) -> bool {
        match self {
            Self::AtLeast => coefficient >= threshold,
            Self::AtMost => coefficient <= threshold,
        }
    }
}

/// Acceptance rule applied to each cell
#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    Scalar { threshold: f64, direction: Direction },
    AndWeightTable(ThresholdTable),
}

impl Bound {
    #[inline]
    fn accepts(&self, cell: &PairScore) -> bool {
        match self {
            Self::Scalar { threshold, direction } => direction.accepts(cell.coefficient, *threshold),
            Self::AndWeightTable(table) => table.accepts(cell.coefficient, cell.and_weight),
        }
    }
}

/// One retained pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    pub ref_id: u32,
    pub cmp_id: u32,
    pub coefficient: f64,
    pub ref_weight: u32,
    pub cmp_weight: u32,
    pub and_weight: u32,
}

impl MatchResult {
    #[inline]
    pub fn id_pair(&self) -> IdPair {
        IdPair::new(self.ref_id, self.cmp_id)
    }
}

/// Filters a similarity matrix into ordered matches
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdMatcher {
    bound: Bound,
}

impl ThresholdMatcher {
    pub fn new(threshold: f64, direction: Direction) -> Self {
        Self {
            bound: Bound::Scalar { threshold, direction },
        }
    }

    pub fn with_table(table: ThresholdTable) -> Self {
        Self {
            bound: Bound::AndWeightTable(table),
        }
    }

    /// The bound a policy implies for a threshold
    ///
    /// For `WeightSum` the threshold is a dissimilarity in `[0, 1)`.
    pub fn for_policy(policy: ScoringPolicy, threshold: f64, width: VectorWidth) -> Result<Self> {
        match policy {
            ScoringPolicy::WeightSum => Ok(Self::with_table(ThresholdTable::from_dissimilarity(
                threshold, width,
            )?)),
            _ => Ok(Self::new(threshold, policy.direction())),
        }
    }

    #[inline]
    pub fn bound(&self) -> &Bound {
        &self.bound
    }

    /// Matches in ascending (i, j) order
    pub fn filter(&self, matrix: &SimilarityMatrix) -> Vec<MatchResult> {
        let matches: Vec<MatchResult> = matrix
            .iter()
            .filter(|(_, _, cell)| self.bound.accepts(cell))
            .map(|(i, j, cell)| {
                let r = matrix.reference(i);
                let c = matrix.comparison(j);
                MatchResult {
                    ref_id: r.id,
                    cmp_id: c.id,
                    coefficient: cell.coefficient,
                    ref_weight: r.weight,
                    cmp_weight: c.weight,
                    and_weight: cell.and_weight,
                }
            })
            .collect();

        tracing::debug!(
            evaluated = matrix.rows() * matrix.cols(),
            retained = matches.len(),
            "threshold filter"
        );
        matches
    }

    /// Matches reduced to their ID pairs
    pub fn filter_ids(&self, matrix: &SimilarityMatrix) -> Vec<IdPair> {
        self.filter(matrix).iter().map(MatchResult::id_pair).collect()
    }
}
