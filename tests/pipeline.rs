//! End-to-end runs through files and both backends.

use tanimoto::backend::FaultInjection;
use tanimoto::{
    decode_sentinel_stream, fixtures, storage, IdLayout, IdPair, LoopbackAccelerator, PairOrder,
    ResultVerifier, ScoringPolicy, SearchConfig, SimilarityBackend, SimilarityEngine,
    SoftwareBackend, TransferConfig, VectorWidth,
};
use tempfile::tempdir;

#[test]
fn test_search_through_files() {
    let dir = tempdir().unwrap();
    let vectors = dir.path().join("vectors.bin");
    let results = dir.path().join("results.bin");

    let config = SearchConfig {
        num_threads: 3,
        threshold: 0.3,
        ..Default::default()
    };
    let width = config.width().unwrap();
    let (refs, cmps) = fixtures::random_sets(width, 16, 40, 2024).unwrap();
    storage::write_vector_file(&vectors, &refs, &cmps).unwrap();

    let (refs, cmps) = storage::read_vector_file(&vectors, width, 16).unwrap();
    let matrix = config.engine().compare_all(&refs, &cmps).unwrap();
    let pairs: Vec<IdPair> = config.matcher().unwrap().filter_ids(&matrix);
    assert!(!pairs.is_empty());
    storage::write_id_file(&results, &pairs).unwrap();

    // Single-threaded rerun is the reference
    let single = SimilarityEngine::new(ScoringPolicy::Tanimoto)
        .compare_all(&refs, &cmps)
        .unwrap();
    let expected = config.matcher().unwrap().filter_ids(&single);

    let actual = storage::read_id_file(&results).unwrap();
    let result = ResultVerifier::new().verify(&expected, &actual);
    assert!(result.is_match());
    assert_eq!(actual, expected);
}

#[test]
fn test_fixed_sets_weight_sum_includes_all_zero_pair() {
    let width = VectorWidth::new(128).unwrap();
    let (refs, cmps) = fixtures::fixed_test_sets(width).unwrap();
    let mut accelerator =
        LoopbackAccelerator::new(TransferConfig::default(), IdLayout::accelerator());
    let pairs = accelerator.search(&refs, &cmps, 0.33).unwrap();

    // 0x00 against 0x00: both weights zero, accepted by the table
    assert!(pairs.contains(&IdPair::new(1, 9)));
    // 0xFF against 0xFF: identical
    assert!(pairs.contains(&IdPair::new(8, 24)));
    // 0xFF against 0x00 never matches
    assert!(!pairs.contains(&IdPair::new(8, 9)));

    let mut software = SoftwareBackend::new(SimilarityEngine::new(ScoringPolicy::Dissimilarity));
    let expected = software.search(&refs, &cmps, 0.33).unwrap();
    let result = ResultVerifier::new().verify(&expected, &pairs);
    assert_eq!(result.unexpected, vec![IdPair::new(1, 9)]);
    assert!(result.missing.is_empty());
}

#[test]
fn test_sentinel_file_verification() {
    let dir = tempdir().unwrap();
    let expected_path = dir.path().join("expected.bin");
    let buffer_path = dir.path().join("device.bin");

    let width = VectorWidth::new(256).unwrap();
    let (refs, cmps) = fixtures::random_sets(width, 6, 30, 5).unwrap();
    let layout = IdLayout::new(2, PairOrder::CmpFirst).unwrap();

    let mut software = SoftwareBackend::new(SimilarityEngine::new(ScoringPolicy::WeightSum));
    let expected = software.search(&refs, &cmps, 0.7).unwrap();
    storage::write_id_file(&expected_path, &expected).unwrap();

    let accelerator = LoopbackAccelerator::new(TransferConfig { burst_len: 4 }, layout)
        .with_faults(FaultInjection {
            duplicate_every: Some(7),
            drop_every: None,
        });
    let buffer = accelerator.result_buffer(&refs, &cmps, 0.7).unwrap();
    storage::write_sentinel_file(&buffer_path, &buffer).unwrap();

    // Sets use positional IDs, so the device buffer verifies directly
    let expected = storage::read_id_file(&expected_path).unwrap();
    let actual =
        decode_sentinel_stream(&storage::read_sentinel_file(&buffer_path).unwrap(), layout).unwrap();
    let result = ResultVerifier::new().verify(&expected, &actual);

    assert!(result.missing.is_empty());
    assert!(result.unexpected.is_empty());
    assert_eq!(result.duplicate.len(), expected.len() / 7);
    assert_eq!(result.actual_count(), expected.len() + expected.len() / 7);
}

#[test]
fn test_config_file_drives_search() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{ "vector_bits": 128, "policy": "weight_sum", "threshold": 0.5, "num_threads": 2 }"#,
    )
    .unwrap();

    let config = SearchConfig::from_json_file(&path).unwrap();
    assert_eq!(config.policy, ScoringPolicy::WeightSum);
    let (refs, cmps) = fixtures::fixed_test_sets(config.width().unwrap()).unwrap();
    let matrix = config.engine().compare_all(&refs, &cmps).unwrap();
    let ids = config.matcher().unwrap().filter_ids(&matrix);

    let mut accelerator = LoopbackAccelerator::new(TransferConfig::default(), IdLayout::default());
    assert_eq!(accelerator.search(&refs, &cmps, 0.5).unwrap(), ids);
}

#[test]
fn test_bad_config_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{ "vector_bits": 12 }"#).unwrap();
    assert!(SearchConfig::from_json_file(&path).is_err());

    std::fs::write(&path, "not json").unwrap();
    assert!(matches!(
        SearchConfig::from_json_file(&path),
        Err(tanimoto::TanimotoError::Json(_))
    ));
}

#[test]
fn test_hex_input_follows_config_padding() {
    let dir = tempdir().unwrap();
    let refs_path = dir.path().join("refs.hex");
    let cmps_path = dir.path().join("cmps.hex");
    std::fs::write(&refs_path, "00FF\nF\n").unwrap();
    std::fs::write(&cmps_path, "0F0F\n").unwrap();

    let config_path = dir.path().join("config.json");
    std::fs::write(
        &config_path,
        r#"{ "vector_bits": 16, "threshold": 0.5, "padding": "zero_pad" }"#,
    )
    .unwrap();
    let config = SearchConfig::from_json_file(&config_path).unwrap();
    let (refs, cmps) =
        storage::read_hex_sets(&refs_path, &cmps_path, &config.codec().unwrap()).unwrap();
    assert_eq!(refs[1].data().to_be_bytes(), vec![0x00, 0x0F]);
    assert_eq!(cmps[0].id(), 3);

    let matrix = config.engine().compare_all(&refs, &cmps).unwrap();
    assert_eq!(config.matcher().unwrap().filter_ids(&matrix), vec![IdPair::new(2, 3)]);

    std::fs::write(
        &config_path,
        r#"{ "vector_bits": 16, "threshold": 0.5, "padding": "reject" }"#,
    )
    .unwrap();
    let config = SearchConfig::from_json_file(&config_path).unwrap();
    let err = storage::read_hex_sets(&refs_path, &cmps_path, &config.codec().unwrap()).unwrap_err();
    assert!(matches!(err, tanimoto::TanimotoError::MalformedInput(_)));
    assert!(err.to_string().contains("refs.hex:2:"));
}
