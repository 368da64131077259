//! Vector set generators for runs without input files.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::bitpack::{BitVector, VectorSet, VectorWidth};
use crate::Result;

/// Byte patterns of the fixed reference set (IDs 1..=8)
pub const FIXED_REF_PATTERNS: [u8; 8] = [0x00, 0x11, 0x33, 0x55, 0x77, 0x99, 0xDD, 0xFF];

/// Byte patterns of the fixed comparison set (IDs 9..=32)
pub const FIXED_CMP_PATTERNS: [u8; 24] = [
    0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF,
    0x2A, 0x2B, 0x3C, 0x4D, 0x5E, 0x6F, 0x70, 0x81,
];

/// Seeded uniform random sets; reference IDs `1..=n`, comparison `n+1..=n+m`
pub fn random_sets(width: VectorWidth, n: usize, m: usize, seed: u64) -> Result<(VectorSet, VectorSet)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut bytes = vec![0u8; width.bytes()];

    let mut next = |rng: &mut StdRng| -> Result<BitVector> {
        rng.fill_bytes(&mut bytes);
        BitVector::from_be_bytes(width, &bytes)
    };

    let refs = (0..n).map(|_| next(&mut rng)).collect::<Result<Vec<_>>>()?;
    let cmps = (0..m).map(|_| next(&mut rng)).collect::<Result<Vec<_>>>()?;

    tracing::debug!(refs = n, cmps = m, seed, "generated random vector sets");
    split_ids(width, refs, cmps)
}

/// Deterministic pattern sets (8 × 24), every byte of a vector set to its pattern
pub fn fixed_test_sets(width: VectorWidth) -> Result<(VectorSet, VectorSet)> {
    let refs = FIXED_REF_PATTERNS.map(|p| BitVector::from_byte_pattern(width, p));
    let cmps = FIXED_CMP_PATTERNS.map(|p| BitVector::from_byte_pattern(width, p));
    split_ids(width, refs.into(), cmps.into())
}

fn split_ids(width: VectorWidth, refs: Vec<BitVector>, cmps: Vec<BitVector>) -> Result<(VectorSet, VectorSet)> {
    let first_cmp = u32::try_from(refs.len() + 1)
        .map_err(|_| crate::TanimotoError::InvalidConfig("vector ID overflow".into()))?;
    Ok((
        VectorSet::from_vectors(width, 1, refs)?,
        VectorSet::from_vectors(width, first_cmp, cmps)?,
    ))
}
