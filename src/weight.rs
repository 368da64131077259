//! Binary Weight (Population Count)
//!
//! The weight of a fingerprint is its number of set bits. Two word-wise
//! counters are provided and must always agree:
//!
//! ```text
//! weight:            Σ count_ones(word)        (native popcnt)
//! weight_kernighan:  Σ loop { w &= w - 1 }     (clear lowest set bit)
//! ```
//!
//! Weights are computed once per fingerprint or AND vector and cached.

/// Number of set bits over all words (native popcount)
#[inline]
pub fn weight(words: &[u64]) -> u32 {
    words.iter().map(|w| w.count_ones()).sum()
}

/// Number of set bits over all words using Kernighan's trick
#[inline]
pub fn weight_kernighan(words: &[u64]) -> u32 {
    words.iter().map(|&w| cnt1(w)).sum()
}

#[inline]
fn cnt1(mut n: u64) -> u32 {
    let mut cnt = 0;
    while n != 0 {
        n &= n - 1;
        cnt += 1;
    }
    cnt
}

/// Weight of `a & b` without materializing the AND vector
#[inline]
pub fn and_weight(a: &[u64], b: &[u64]) -> u32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| (x & y).count_ones()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_zero_and_full() {
        assert_eq!(weight(&[0u64; 15]), 0);
        assert_eq!(weight(&[!0u64; 2]), 128);
        assert_eq!(weight(&[]), 0);
    }

    #[test]
    fn test_kernighan_matches_native() {
        let words = [
            0u64,
            1,
            0x8000_0000_0000_0000,
            0xDEAD_BEEF_CAFE_F00D,
            !0,
            0x5555_5555_5555_5555,
        ];
        assert_eq!(weight(&words), weight_kernighan(&words));
        for w in words {
            assert_eq!(w.count_ones(), cnt1(w));
        }
    }

    #[test]
    fn test_and_weight() {
        let a = [0xFF00u64, 0xF0];
        let b = [0x0FF0u64, 0xFF];
        assert_eq!(and_weight(&a, &b), 4 + 4);
    }
}
