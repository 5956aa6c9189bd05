//! Edge case tests for vecquant.
//!
//! Tests unusual inputs and boundary conditions that could cause failures.

use vecquant::ann::Index;
use vecquant::{
    index_factory, index_factory_with_metric, ClusteringParams, DistanceMetric, FlatIndex,
    IvfEncoding, IvfIndex, IvfParams, KMeans, PcaMatrix, PqIndex, ProductQuantizer, VecError,
    VectorTransform,
};

// =============================================================================
// Dimension edge cases
// =============================================================================

#[test]
fn zero_dimension_is_rejected_everywhere() {
    assert!(matches!(
        FlatIndex::new_l2(0),
        Err(VecError::InvalidDimension(_))
    ));
    assert!(KMeans::new(0, 4).is_err());
    assert!(ProductQuantizer::new(0, 1, 8).is_err());
    assert!(PcaMatrix::new(0, 0).is_err());
    assert!(index_factory(0, "Flat").is_err());
}

#[test]
fn one_dimensional_vectors() {
    let x: Vec<f32> = (0..50).map(|i| i as f32).collect();
    let mut index = index_factory(1, "IVF5,Flat").expect("Failed to build");
    index.train(&x).expect("Failed to train");
    index.add(&x).expect("Failed to add");

    let res = index.search(&[10.0], 1).expect("Search failed");
    assert_eq!(res.labels(), &[10]);
}

#[test]
fn pq_requires_divisible_dimension() {
    assert!(matches!(
        ProductQuantizer::new(10, 3, 8),
        Err(VecError::InvalidDimension(_))
    ));
    assert!(matches!(
        ProductQuantizer::new(8, 2, 0),
        Err(VecError::InvalidParameter(_))
    ));
    assert!(ProductQuantizer::new(8, 2, 17).is_err());
    assert!(ProductQuantizer::new(8, 0, 8).is_err());
}

#[test]
fn pca_output_cannot_exceed_input() {
    assert!(PcaMatrix::new(4, 5).is_err());
    assert!(PcaMatrix::new(4, 4).is_ok());
}

#[test]
fn ragged_batches_are_rejected_without_side_effects() {
    let mut index = FlatIndex::new_l2(3).expect("Failed to create");
    index.add(&[1.0, 2.0, 3.0]).expect("Failed to add");
    let err = index.add(&[0.0; 7]).expect_err("ragged batch accepted");
    assert!(matches!(err, VecError::DimensionMismatch { expected: 3, .. }));
    assert_eq!(index.ntotal(), 1);
}

// =============================================================================
// Training edge cases
// =============================================================================

#[test]
fn kmeans_with_fewer_points_than_centroids() {
    let x = [0.0f32, 0.0, 1.0, 1.0, 2.0, 0.5];
    let mut km = KMeans::new(2, 8).expect("Failed to create");
    km.train(&x).expect("Failed to train");
    assert_eq!(km.centroids().len(), 16);
    assert!(km.centroids().iter().all(|c| c.is_finite()));

    let assignments = km.assign(&x).expect("Failed to assign");
    assert_eq!(assignments.len(), 3);
    for (_, dist) in assignments {
        assert_eq!(dist, 0.0);
    }
}

#[test]
fn kmeans_on_identical_points() {
    let x = vec![3.5f32; 40 * 4];
    let mut km = KMeans::new(4, 5).expect("Failed to create");
    km.train(&x).expect("Failed to train");
    assert!(km.centroids().iter().all(|c| c.is_finite()));
    assert_eq!(km.final_objective(), Some(0.0));
}

#[test]
fn kmeans_rejects_empty_training_set_and_keeps_model() {
    let mut km = KMeans::new(2, 2).expect("Failed to create");
    assert!(km.train(&[]).is_err());
    assert!(!km.is_trained());

    km.train(&[0.0, 0.0, 1.0, 1.0]).expect("Failed to train");
    let before = km.centroids().to_vec();
    assert!(km.train(&[]).is_err());
    assert_eq!(km.centroids(), &before[..]);
}

#[test]
fn zero_iterations_is_a_parameter_error() {
    let mut km = KMeans::new(2, 2)
        .expect("Failed to create")
        .with_params(ClusteringParams::default().with_niter(0));
    assert!(matches!(
        km.train(&[0.0, 0.0]),
        Err(VecError::InvalidParameter(_))
    ));
}

#[test]
fn pca_on_constant_data() {
    let x = vec![1.0f32; 20 * 3];
    let mut pca = PcaMatrix::new(3, 2).expect("Failed to create");
    pca.train(&x).expect("Failed to train");
    let y = pca.apply(&x).expect("Failed to apply");
    assert!(y.iter().all(|v| v.abs() < 1e-6));
}

// =============================================================================
// Search edge cases
// =============================================================================

#[test]
fn k_larger_than_ntotal_is_padded() {
    let mut index = FlatIndex::new_ip(2).expect("Failed to create");
    index.add(&[1.0, 0.0, 0.0, 1.0]).expect("Failed to add");
    let res = index.search(&[1.0, 1.0], 4).expect("Search failed");
    assert_eq!(&res.labels()[2..], &[-1, -1]);
    assert_eq!(res.distances()[3], f32::NEG_INFINITY);
    assert_eq!(res.neighbors(0).len(), 2);
}

#[test]
fn k_zero_returns_empty_rows() {
    let mut index = FlatIndex::new_l2(2).expect("Failed to create");
    index.add(&[1.0, 0.0]).expect("Failed to add");
    let res = index.search(&[0.0, 0.0], 0).expect("Search failed");
    assert!(res.labels().is_empty());
}

#[test]
fn k_too_large_for_the_output_is_rejected() {
    let mut index = FlatIndex::new_l2(2).expect("Failed to create");
    index.add(&[1.0, 0.0, 0.0, 1.0]).expect("Failed to add");
    assert!(matches!(
        index.search(&[0.0; 4], usize::MAX),
        Err(VecError::InvalidParameter(_))
    ));
    assert!(matches!(
        index.search(&[0.0; 2], usize::MAX / 4),
        Err(VecError::InvalidParameter(_))
    ));

    let mut refined = index_factory(2, "Flat,RFlat").expect("Failed to build");
    refined.add(&[1.0, 0.0]).expect("Failed to add");
    assert!(refined.search(&[0.0; 4], usize::MAX).is_err());
    let res = refined.search(&[0.0; 2], 3).expect("Search failed");
    assert_eq!(res.labels(), &[0, -1, -1]);
}

#[test]
fn empty_query_batch() {
    let index = FlatIndex::new_l2(2).expect("Failed to create");
    let res = index.search(&[], 3).expect("Search failed");
    assert_eq!(res.nq(), 0);
}

#[test]
fn search_before_training_fails() {
    let index = PqIndex::new(4, 2, 4, DistanceMetric::L2).expect("Failed to create");
    assert!(matches!(
        index.search(&[0.0; 4], 1),
        Err(VecError::NotTrained(_))
    ));
}

#[test]
fn ivf_nprobe_is_clamped() {
    let x: Vec<f32> = (0..60).map(|i| (i % 13) as f32).collect();
    let mut ivf = IvfIndex::new(
        3,
        DistanceMetric::L2,
        IvfParams::default().with_nlist(4),
        IvfEncoding::Flat,
    )
    .expect("Failed to create");
    ivf.train(&x).expect("Failed to train");
    ivf.set_nprobe(0);
    assert_eq!(ivf.nprobe(), 1);
    ivf.set_nprobe(100);
    assert_eq!(ivf.nprobe(), 4);
}

// =============================================================================
// Capabilities
// =============================================================================

#[test]
fn unsupported_operations_fail_explicitly() {
    let d = 8;
    let x: Vec<f32> = (0..100 * d).map(|i| ((i * 7919) % 97) as f32).collect();

    for desc in ["Flat", "PQ2", "PCA4,Flat", "Flat,RFlat"] {
        let mut index = index_factory(d, desc).expect("Failed to build");
        index.train(&x).expect("Failed to train");
        let err = index
            .add_with_ids(&x[..d], &[42])
            .expect_err("add_with_ids should fail");
        assert!(
            matches!(err, VecError::UnsupportedOperation(_)),
            "{desc}: {err}"
        );
    }

    let mut ivf = index_factory(d, "IVF2,PQ4").expect("Failed to build");
    ivf.train(&x).expect("Failed to train");
    ivf.add_with_ids(&x[..d], &[42]).expect("IVF accepts ids");
    assert!(matches!(
        ivf.reconstruct(0),
        Err(VecError::UnsupportedOperation(_))
    ));
}

#[test]
fn stats_describe_the_index() {
    let mut index = index_factory_with_metric(4, "Flat", DistanceMetric::InnerProduct)
        .expect("Failed to build");
    index.add(&[0.5; 12]).expect("Failed to add");
    let stats = index.stats();
    assert_eq!(stats.ntotal, 3);
    assert_eq!(stats.dimension, 4);
    assert_eq!(stats.size_bytes, 48);
    assert_eq!(stats.algorithm, "IndexFlat");
}
