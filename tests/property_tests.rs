//! Algebraic laws of weights, coefficients, codec and verifier.

use std::collections::HashSet;

use proptest::prelude::*;
use tanimoto::{
    weight, weight_kernighan, BitVector, Fingerprint, FingerprintCodec, IdPair, PaddingPolicy,
    ResultVerifier, ScoringPolicy, SimilarityEngine, VectorSet, VectorWidth,
};

fn width_strategy() -> impl Strategy<Value = VectorWidth> {
    (1usize..=128).prop_map(|bytes| VectorWidth::new(bytes * 8).unwrap())
}

fn vector_strategy(width: VectorWidth) -> impl Strategy<Value = BitVector> {
    prop::collection::vec(any::<u8>(), width.bytes())
        .prop_map(move |bytes| BitVector::from_be_bytes(width, &bytes).unwrap())
}

fn pair_strategy() -> impl Strategy<Value = (BitVector, BitVector)> {
    width_strategy().prop_flat_map(|w| (vector_strategy(w), vector_strategy(w)))
}

proptest! {
    #[test]
    fn test_weight_extremes(width in width_strategy()) {
        prop_assert_eq!(BitVector::zero(width).popcount(), 0);
        prop_assert_eq!(BitVector::ones(width).popcount() as usize, width.bits());
    }

    #[test]
    fn test_weight_methods_agree(words in prop::collection::vec(any::<u64>(), 0..32)) {
        prop_assert_eq!(weight(&words), weight_kernighan(&words));
    }

    #[test]
    fn test_self_similarity(v in width_strategy().prop_flat_map(vector_strategy)) {
        prop_assume!(v.popcount() > 0);
        let fp = Fingerprint::new(1, v);
        let score = SimilarityEngine::new(ScoringPolicy::Tanimoto).score_pair(&fp, &fp);
        prop_assert_eq!(score.coefficient, 1.0);
    }

    #[test]
    fn test_symmetry((a, b) in pair_strategy()) {
        let engine = SimilarityEngine::new(ScoringPolicy::Tanimoto);
        let fa = Fingerprint::new(1, a);
        let fb = Fingerprint::new(2, b);
        prop_assert_eq!(engine.score_pair(&fa, &fb), engine.score_pair(&fb, &fa));
    }

    #[test]
    fn test_and_weight_bounded((a, b) in pair_strategy()) {
        let and = (&a & &b).popcount();
        prop_assert!(and <= a.popcount().min(b.popcount()));
        prop_assert_eq!(and, tanimoto::weight::and_weight(a.words(), b.words()));
    }

    #[test]
    fn test_hex_roundtrip(v in width_strategy().prop_flat_map(vector_strategy)) {
        let codec = FingerprintCodec::new(v.width(), PaddingPolicy::Reject);
        let text = codec.decode(&v);
        prop_assert_eq!(text.len(), v.width().nibbles());
        prop_assert_eq!(codec.encode(&text).unwrap(), v);
    }

    #[test]
    fn test_zero_padding_normalizes(digits in "[0-9A-F]{0,32}") {
        let codec = FingerprintCodec::new(VectorWidth::new(128).unwrap(), PaddingPolicy::ZeroPad);
        let decoded = codec.decode(&codec.encode(&digits).unwrap());
        prop_assert_eq!(decoded, format!("{:0>32}", digits));
    }

    #[test]
    fn test_verify_self_is_clean(raw in prop::collection::hash_set((1u32..1000, 1u32..1000), 0..64)) {
        let expected: Vec<IdPair> = raw.into_iter().map(IdPair::from).collect();
        let result = ResultVerifier::new().verify(&expected, &expected);
        prop_assert!(result.is_match());
        prop_assert!(result.count_mismatch().is_none());
    }

    #[test]
    fn test_verify_accounts_for_every_pair(
        expected in prop::collection::hash_set((1u32..50, 1u32..50), 0..32),
        actual in prop::collection::vec((1u32..50, 1u32..50), 0..48),
    ) {
        let expected: Vec<IdPair> = expected.into_iter().map(IdPair::from).collect();
        let actual: Vec<IdPair> = actual.into_iter().map(IdPair::from).collect();
        let result = ResultVerifier::new().verify(&expected, &actual);

        let seen: HashSet<IdPair> = actual.iter().copied().collect();
        let wanted: HashSet<IdPair> = expected.iter().copied().collect();
        prop_assert_eq!(result.missing.len(), wanted.difference(&seen).count());
        prop_assert_eq!(result.unexpected.len(), seen.difference(&wanted).count());
        prop_assert_eq!(result.is_match(), actual.len() == expected.len() && seen == wanted);
    }

    #[test]
    fn test_parallel_pass_matches_sequential(
        seed in any::<u64>(),
        n in 0usize..24,
        m in 0usize..24,
        threads in 2usize..6,
    ) {
        let width = VectorWidth::new(128).unwrap();
        let (refs, cmps): (VectorSet, VectorSet) =
            tanimoto::fixtures::random_sets(width, n, m, seed).unwrap();
        let sequential = SimilarityEngine::new(ScoringPolicy::Tanimoto)
            .compare_all(&refs, &cmps)
            .unwrap();
        let parallel = SimilarityEngine::new(ScoringPolicy::Tanimoto)
            .with_threads(threads)
            .with_batch_size(1)
            .compare_all(&refs, &cmps)
            .unwrap();

        let a: Vec<_> = sequential.iter().map(|(i, j, c)| (i, j, *c)).collect();
        let b: Vec<_> = parallel.iter().map(|(i, j, c)| (i, j, *c)).collect();
        prop_assert_eq!(a, b);
    }
}
