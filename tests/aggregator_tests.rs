//! Integration tests for gar-fl aggregation rules and operators

use ndarray::{array, Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;

use gar_fl::aggregators::{
    coordinate_median, geometric_median, krum, mean, norm_clip, trimmed_mean, GarRule,
    GradientAggregator,
};
use gar_fl::attack::{AttackInjector, AttackModel};
use gar_fl::compression::{qsgd, top_k, Compressor};
use gar_fl::config::{
    AggregationConfig, CompressionConfig, CompressionKind, KrumMode, SelectionAxis,
    SparseApproxConfig, SparseRule,
};
use gar_fl::error::GarError;
use gar_fl::math::l2_norm;
use gar_fl::{get_gar, get_sparse_approx_operator};

fn all_rules() -> Vec<GarRule> {
    vec![
        GarRule::Mean,
        GarRule::CoordinateMedian,
        GarRule::GeometricMedian {
            eps: 1e-5,
            max_iter: 1000,
        },
        GarRule::TrimmedMean { proportion: 0.2 },
        GarRule::Krum {
            krum_frac: 0.2,
            mode: KrumMode::Select,
        },
        GarRule::NormClip { alpha: 1e6 },
    ]
}

fn distance(a: &Array1<f32>, b: &Array1<f32>) -> f32 {
    l2_norm((a - b).view())
}

#[test]
fn test_all_rules_agree_on_identical_rows() {
    let row = Array1::from_shape_fn(50, |j| 0.1 + 0.37 * j as f32);

    for n in [3, 5, 6, 7, 10] {
        let g = Array2::from_shape_fn((n, 50), |(_, j)| row[j]);
        for rule in all_rules() {
            let name = rule.name();
            let mut gar = GradientAggregator::new(rule).unwrap();
            let result = gar.aggregate(g.view(), None).unwrap();
            assert_eq!(result, row, "{} on {} rows should return the common row", name, n);
        }
    }
}

#[test]
fn test_mean_is_column_mean() {
    let g = array![[1.0, 2.0, 3.0], [3.0, 4.0, 5.0], [5.0, 0.0, 1.0]];
    assert_eq!(mean(g.view()).unwrap(), array![3.0, 2.0, 3.0]);
}

#[test]
fn test_median_ignores_outlier() {
    let g = array![[1.0], [2.0], [100.0]];
    assert_eq!(coordinate_median(g.view()).unwrap(), array![2.0]);
}

#[test]
fn test_geometric_median_small_inputs() {
    let single = array![[3.0, -4.0]];
    let out = geometric_median(single.view(), 1e-5, 100).unwrap();
    assert_eq!(out.median, array![3.0, -4.0]);
    assert!(out.converged);

    // Any point on the segment is optimal; the mean start is already one.
    let pair = array![[0.0, 0.0], [2.0, 2.0]];
    let out = geometric_median(pair.view(), 1e-5, 100).unwrap();
    assert!(distance(&out.median, &array![1.0, 1.0]) < 1e-4);
}

#[test]
fn test_trimmed_mean_edge_proportions() {
    let g = array![[1.0, 10.0], [2.0, 20.0], [6.0, 60.0]];
    assert_eq!(trimmed_mean(g.view(), 0.0).unwrap(), mean(g.view()).unwrap());

    // floor(0.4 * 3) = 1 from each end leaves the middle value.
    assert_eq!(trimmed_mean(g.view(), 0.4).unwrap(), array![2.0, 20.0]);

    assert!(matches!(
        trimmed_mean(g.view(), 0.5),
        Err(GarError::InvalidHyperparameter { .. })
    ));
}

#[test]
fn test_krum_returns_an_input_row() {
    let g = array![
        [1.0, 1.0],
        [1.1, 0.9],
        [0.9, 1.1],
        [1.05, 0.95],
        [100.0, 100.0],
    ];
    let result = krum(g.view(), 0.2, KrumMode::Select).unwrap();
    assert!(g.outer_iter().any(|row| row == result));
    assert!(result[0] < 2.0, "Krum should select an honest row");
}

#[test]
fn test_norm_clip_bounds_outlier() {
    let g = array![[3.0, 4.0], [30.0, 40.0]];
    let result = norm_clip(g.view(), 5.0).unwrap();
    assert!(distance(&result, &array![3.0, 4.0]) < 1e-5);
}

#[test]
fn test_top_k_keeps_rounded_count() {
    let v = Array1::from_shape_fn(100, |i| (i as f32 + 1.0) * if i % 2 == 0 { 1.0 } else { -1.0 });
    let out = top_k(v.view(), 0.1);
    assert_eq!(out.iter().filter(|&&x| x != 0.0).count(), 10);
    // The kept entries are the ten largest magnitudes.
    for i in 90..100 {
        assert_eq!(out[i], v[i]);
    }
}

#[test]
fn test_error_feedback_drains_residual() {
    let config = CompressionConfig {
        compression_operator: CompressionKind::TopK,
        frac_coordinates_to_keep: 0.25,
        ef_client: true,
        ..CompressionConfig::default()
    };
    let mut compressor = Compressor::new(&config).unwrap();
    let g = array![8.0f32, -7.0, 6.0, -5.0, 4.0, -3.0, 2.0, -1.0];
    let zeros = Array1::<f32>::zeros(g.len());

    let mut delivered = compressor.compress(g.view(), 1.0).unwrap();
    for _ in 0..3 {
        delivered += &compressor.compress(zeros.view(), 1.0).unwrap();
    }
    assert_eq!(compressor.residual_norm(), 0.0);
    assert_eq!(delivered, g);
}

#[test]
fn test_error_feedback_average_converges() {
    let config = CompressionConfig {
        compression_operator: CompressionKind::TopK,
        frac_coordinates_to_keep: 0.25,
        ef_client: true,
        ..CompressionConfig::default()
    };
    let mut compressor = Compressor::new(&config).unwrap();
    let g = array![0.3f32, -1.2, 0.8, 0.05, -0.4, 2.0, -0.7, 0.1];
    let lr = 0.1;
    let rounds = 200;

    let mut sum = Array1::<f32>::zeros(g.len());
    for _ in 0..rounds {
        sum += &compressor.compress(g.view(), lr).unwrap();
    }
    let avg = sum / rounds as f32;
    assert!(
        distance(&avg, &g) < 0.05 * l2_norm(g.view()),
        "running average {:?} should approach {:?}",
        avg,
        g
    );
}

#[test]
fn test_qsgd_zero_vector() {
    let mut rng = StdRng::seed_from_u64(0);
    let zeros = Array1::<f32>::zeros(16);
    assert_eq!(qsgd(&mut rng, zeros.view(), 4), zeros);
}

#[test]
fn test_active_norm_tie_prefers_lower_index() {
    let config = SparseApproxConfig {
        rule: Some(SparseRule::ActiveNorm),
        axis: SelectionAxis::Column,
        frac_coordinates: 0.5,
        ef_server: false,
        seed: Some(0),
    };
    let mut sparse = get_sparse_approx_operator(&config).unwrap().unwrap();
    let g = Array2::<f32>::ones((3, 4));
    let selection = sparse.sparse_approx(g.view(), 1.0).unwrap();
    assert_eq!(selection.indices, vec![0, 1]);
    assert_eq!(selection.column_subset(), Some(&[0, 1][..]));
}

#[test]
fn test_sparse_then_aggregate_zero_fills() {
    let config = SparseApproxConfig {
        rule: Some(SparseRule::Random),
        axis: SelectionAxis::Column,
        frac_coordinates: 0.3,
        ef_server: false,
        seed: Some(5),
    };
    let mut sparse = get_sparse_approx_operator(&config).unwrap().unwrap();
    let mut gar = GradientAggregator::new(GarRule::CoordinateMedian).unwrap();

    let g = Array2::from_shape_fn((4, 10), |(i, j)| 1.0 + i as f32 + j as f32);
    let selection = sparse.sparse_approx(g.view(), 1.0).unwrap();
    let result = gar
        .aggregate(selection.matrix.view(), selection.column_subset())
        .unwrap();

    assert_eq!(selection.indices.len(), 3);
    let expected = coordinate_median(g.view()).unwrap();
    for j in 0..10 {
        if selection.indices.contains(&j) {
            assert_eq!(result[j], expected[j]);
        } else {
            assert_eq!(result[j], 0.0);
        }
    }
}

#[test]
fn test_sign_flip_attack_end_to_end() {
    // 5 workers, 100 coordinates, 2 of them flipped and scaled by 100.
    let honest = Array2::from_shape_fn((5, 100), |(i, j)| 1.0 + 0.01 * i as f32 + 0.001 * j as f32);
    let mut attack = AttackInjector::new(AttackModel::SignFlip { scale: 100.0 }, 0.4, 7).unwrap();
    let g = attack.launch_attack(honest.clone());
    let corrupted = attack.corrupted_rows().to_vec();
    assert_eq!(corrupted.len(), 2);

    let honest_rows: Vec<usize> = (0..5).filter(|i| !corrupted.contains(i)).collect();
    let honest_mean = honest
        .select(Axis(0), &honest_rows)
        .mean_axis(Axis(0))
        .unwrap();

    let naive = mean(g.view()).unwrap();
    assert!(
        distance(&naive, &honest_mean) > 100.0,
        "mean should be dragged away by the attack"
    );

    let gm = geometric_median(g.view(), 1e-5, 1000).unwrap();
    assert!(
        distance(&gm.median, &honest_mean) < 1.0,
        "geometric median drifted: {}",
        distance(&gm.median, &honest_mean)
    );

    // krum_frac 0.4 on 5 rows: f = 2, one neighbour per score.
    let selected = krum(g.view(), 0.4, KrumMode::Select).unwrap();
    assert!(distance(&selected, &honest_mean) < 1.0);

    let averaged = krum(g.view(), 0.4, KrumMode::Average).unwrap();
    assert!(distance(&averaged, &honest_mean) < 1e-3);
}

#[test]
fn test_aggregator_counters_reset() {
    let mut gar = GradientAggregator::new(GarRule::GeometricMedian {
        eps: 1e-6,
        max_iter: 500,
    })
    .unwrap();
    let g = array![[0.0, 0.0], [4.0, 0.0], [0.0, 3.0], [5.0, 5.0]];
    gar.aggregate(g.view(), None).unwrap();
    assert!(gar.num_iter() > 0);

    let cost = gar.take_cost();
    assert!(cost.num_iter > 0);
    assert_eq!(gar.num_iter(), 0);
}

#[test]
fn test_config_from_json() {
    let config = AggregationConfig::from_json(
        r#"{
            "gar": "trimmed_mean",
            "trimmed_mean_config": {"proportion": 0.2},
            "sparse_approximation_config": {"rule": "active_norm", "frac_coordinates": 0.5}
        }"#,
    )
    .unwrap();

    let mut gar = get_gar(&config).unwrap();
    assert_eq!(gar.rule(), &GarRule::TrimmedMean { proportion: 0.2 });
    let g = array![[1.0], [2.0], [3.0], [4.0], [100.0]];
    assert_eq!(gar.aggregate(g.view(), None).unwrap(), array![3.0]);

    let sparse = get_sparse_approx_operator(&config.sparse_approximation_config)
        .unwrap()
        .unwrap();
    assert_eq!(sparse.rule(), SparseRule::ActiveNorm);
}

#[test]
fn test_unknown_names_fail() {
    for json in [
        r#"{"gar": "bulyan"}"#,
        r#"{"compression_config": {"compression_operator": "sign_sgd"}}"#,
        r#"{"sparse_approximation_config": {"rule": "largest"}}"#,
    ] {
        assert!(
            matches!(AggregationConfig::from_json(json), Err(GarError::Config(_))),
            "{} should be rejected",
            json
        );
    }
}

#[test]
fn test_error_display_impls() {
    let e = GarError::EmptyUpdates;
    assert_eq!(format!("{}", e), "Empty gradient matrix provided");

    let e = GarError::IndexOutOfBounds { index: 7, len: 4 };
    let msg = format!("{}", e);
    assert!(msg.contains('7') && msg.contains('4'));

    let e = GarError::InvalidHyperparameter {
        name: "alpha",
        value: -1.0,
    };
    assert!(format!("{}", e).contains("alpha"));

    let e = GarError::ResidualShapeMismatch {
        expected: vec![3, 4],
        actual: vec![3, 5],
    };
    assert!(format!("{}", e).contains("[3, 5]"));

    let e = GarError::Config("bad".to_string());
    assert!(format!("{}", e).contains("bad"));
}
