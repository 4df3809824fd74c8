//! End-to-end scenarios: frames in, local maps out, closures detected,
//! verified and fused back into the map graph.

use approx::assert_relative_eq;
use nalgebra::{Isometry3, Vector3};

use relocslam::config::{PurificationConfig, RelocalizerConfig, SegmentationConfig};
use relocslam::map::{BinaryDescriptor, FramePoint, LandmarkId, LocalMapId, WorldMap};
use relocslam::metrics::AccumulatingMetrics;
use relocslam::relocalization::index::descriptor_for_seed;
use relocslam::relocalization::{LinearIndex, Relocalizer};

fn scene() -> Vec<Vector3<f64>> {
    vec![
        Vector3::new(1.0, 0.0, 2.0),
        Vector3::new(-1.0, 0.5, 3.0),
        Vector3::new(0.3, -0.8, 1.5),
        Vector3::new(2.0, 1.0, 4.0),
        Vector3::new(-0.5, -1.2, 2.5),
        Vector3::new(0.8, 0.9, 3.5),
        Vector3::new(-2.0, 0.1, 1.8),
        Vector3::new(1.5, -0.4, 2.2),
        Vector3::new(0.0, 1.5, 3.0),
        Vector3::new(-1.2, -0.6, 4.2),
    ]
}

fn world_map() -> WorldMap {
    WorldMap::new(
        SegmentationConfig {
            minimum_distance_traveled: 0.1,
            minimum_rotation_accumulated: 0.5,
            minimum_number_of_frames: 2,
        },
        PurificationConfig::default(),
    )
}

fn relocalizer_config() -> RelocalizerConfig {
    RelocalizerConfig {
        minimum_interspace: 1,
        minimum_matched_landmarks: 5,
        ..RelocalizerConfig::default()
    }
}

fn tracked_point(landmark: LandmarkId, descriptor: BinaryDescriptor) -> FramePoint {
    FramePoint {
        image_coordinates: Vector3::zeros(),
        camera_coordinates: Vector3::zeros(),
        world_coordinates: Vector3::zeros(),
        descriptor: Some(descriptor),
        previous: None,
        landmark: Some(landmark),
    }
}

/// Create validated landmarks for the given world points.
fn create_landmarks(map: &mut WorldMap, points: &[Vector3<f64>]) -> Vec<LandmarkId> {
    points
        .iter()
        .map(|p| {
            let id = map.create_landmark(*p);
            map.landmark_mut(id).unwrap().update_coordinates(*p);
            id
        })
        .collect()
}

/// Drive the robot through two frames ending at `anchor`, observing the
/// given landmarks, and consolidate the window into a local map.
fn observe_pass(
    map: &mut WorldMap,
    landmarks: &[LandmarkId],
    descriptor_seeds: &[u64],
    anchor: Isometry3<f64>,
    start_sequence: u64,
) -> LocalMapId {
    let approach = anchor * Isometry3::translation(-0.2, 0.0, 0.0);
    map.create_frame(approach, start_sequence);
    let frame = map.create_frame(anchor, start_sequence + 1);
    for (landmark, seed) in landmarks.iter().zip(descriptor_seeds) {
        map.add_frame_point(frame, tracked_point(*landmark, descriptor_for_seed(*seed)));
    }
    map.create_local_map().expect("segmentation should fire")
}

#[test]
fn test_revisit_yields_one_verified_closure() {
    let mut map = world_map();
    let points = scene();
    let landmarks = create_landmarks(&mut map, &points);
    let seeds: Vec<u64> = (0..points.len() as u64).collect();

    let reference_anchor = Isometry3::translation(0.2, 0.0, 0.0);
    let reference = observe_pass(&mut map, &landmarks, &seeds, reference_anchor, 0);

    // Second pass over the same landmarks, one unit further along x.
    let query_anchor = reference_anchor * Isometry3::translation(1.0, 0.0, 0.0);
    let query = observe_pass(&mut map, &landmarks, &seeds, query_anchor, 2);

    let mut relocalizer = Relocalizer::new(relocalizer_config(), LinearIndex::new());
    relocalizer.detect_closures(&mut map, reference);
    assert!(relocalizer.closures().is_empty());

    relocalizer.detect_closures(&mut map, query);
    assert_eq!(relocalizer.closures().len(), 1);

    let closure = &relocalizer.closures()[0];
    assert_eq!(closure.query, query);
    assert_eq!(closure.reference, reference);
    assert_relative_eq!(closure.match_ratio, 1.0, epsilon = 1e-12);
    assert_eq!(closure.matched_landmarks, 10);
    assert_eq!(closure.correspondences.len(), 10);

    // Exclusivity: every reference landmark claimed at most once.
    let mut references: Vec<LandmarkId> = closure
        .correspondences
        .iter()
        .map(|c| c.reference)
        .collect();
    references.sort();
    references.dedup();
    assert_eq!(references.len(), 10);

    relocalizer.register_closures(&map);
    let alignment = relocalizer.closures()[0]
        .alignment
        .as_ref()
        .expect("verification should have run");
    assert!(alignment.converged);
    assert_relative_eq!(alignment.inlier_ratio, 1.0, epsilon = 1e-12);
    assert_relative_eq!(
        (alignment.query_to_reference.translation.vector - Vector3::new(1.0, 0.0, 0.0)).norm(),
        0.0,
        epsilon = 1e-3
    );
}

#[test]
fn test_disjoint_appearances_yield_no_closures() {
    let mut map = world_map();
    let points = scene();

    let first = create_landmarks(&mut map, &points);
    let first_seeds: Vec<u64> = (0..10).collect();
    let reference = observe_pass(
        &mut map,
        &first,
        &first_seeds,
        Isometry3::translation(0.2, 0.0, 0.0),
        0,
    );

    let second = create_landmarks(&mut map, &points);
    let second_seeds: Vec<u64> = (100..110).collect();
    let query = observe_pass(
        &mut map,
        &second,
        &second_seeds,
        Isometry3::translation(1.2, 0.0, 0.0),
        2,
    );

    let mut relocalizer = Relocalizer::new(relocalizer_config(), LinearIndex::new());
    relocalizer.detect_closures(&mut map, reference);
    relocalizer.detect_closures(&mut map, query);
    assert!(relocalizer.closures().is_empty());

    // Both local maps were still indexed.
    assert_eq!(relocalizer.number_of_indexed_local_maps(), 2);
}

#[test]
fn test_interspace_warm_up_suppresses_matching() {
    let mut map = world_map();
    let points = scene();
    let landmarks = create_landmarks(&mut map, &points);
    let seeds: Vec<u64> = (0..10).collect();

    let first = observe_pass(
        &mut map,
        &landmarks,
        &seeds,
        Isometry3::translation(0.2, 0.0, 0.0),
        0,
    );
    let second = observe_pass(
        &mut map,
        &landmarks,
        &seeds,
        Isometry3::translation(1.2, 0.0, 0.0),
        2,
    );

    let config = RelocalizerConfig {
        minimum_interspace: 2,
        ..relocalizer_config()
    };
    let mut relocalizer = Relocalizer::new(config, LinearIndex::new());
    relocalizer.detect_closures(&mut map, first);
    relocalizer.detect_closures(&mut map, second);

    // Identical appearance sets, but the history is still within the
    // interspace.
    assert!(relocalizer.closures().is_empty());
}

#[test]
fn test_matching_ratio_gate_suppresses_partial_overlap() {
    let points = scene();
    let reference_seeds: Vec<u64> = (0..10).collect();

    // Half of the query signatures are unknown to the index, so only 5 of
    // its 10 descriptors can match.
    let query_seeds: Vec<u64> = (0..5).chain(100..105).collect();

    let expected_ratio = 0.5;
    for (gate, expected_closures) in [
        (expected_ratio + 0.1, 0),
        (expected_ratio - 0.1, 1),
    ] {
        let mut map = world_map();
        let landmarks = create_landmarks(&mut map, &points);
        let reference = observe_pass(
            &mut map,
            &landmarks,
            &reference_seeds,
            Isometry3::translation(0.2, 0.0, 0.0),
            0,
        );
        let query = observe_pass(
            &mut map,
            &landmarks,
            &query_seeds,
            Isometry3::translation(1.2, 0.0, 0.0),
            2,
        );

        let config = RelocalizerConfig {
            minimum_matching_ratio: gate,
            ..relocalizer_config()
        };
        let mut relocalizer = Relocalizer::new(config, LinearIndex::new());
        relocalizer.detect_closures(&mut map, reference);
        relocalizer.detect_closures(&mut map, query);
        assert_eq!(relocalizer.closures().len(), expected_closures);
        if expected_closures == 1 {
            assert_relative_eq!(
                relocalizer.closures()[0].match_ratio,
                expected_ratio,
                epsilon = 1e-12
            );
        }
    }
}

#[test]
fn test_matched_landmark_gate_suppresses_weak_candidates() {
    let mut map = world_map();
    let points = scene();
    let landmarks = create_landmarks(&mut map, &points);
    let seeds: Vec<u64> = (0..10).collect();

    let reference = observe_pass(
        &mut map,
        &landmarks,
        &seeds,
        Isometry3::translation(0.2, 0.0, 0.0),
        0,
    );
    let query = observe_pass(
        &mut map,
        &landmarks,
        &seeds,
        Isometry3::translation(1.2, 0.0, 0.0),
        2,
    );

    let config = RelocalizerConfig {
        minimum_matched_landmarks: 11,
        ..relocalizer_config()
    };
    let mut relocalizer = Relocalizer::new(config, LinearIndex::new());
    relocalizer.detect_closures(&mut map, reference);
    relocalizer.detect_closures(&mut map, query);
    assert!(relocalizer.closures().is_empty());
}

#[test]
fn test_vote_threshold_rejects_single_vote_correspondences() {
    let mut map = world_map();
    let points = scene();
    let landmarks = create_landmarks(&mut map, &points);
    let seeds: Vec<u64> = (0..10).collect();

    let reference = observe_pass(
        &mut map,
        &landmarks,
        &seeds,
        Isometry3::translation(0.2, 0.0, 0.0),
        0,
    );
    let query = observe_pass(
        &mut map,
        &landmarks,
        &seeds,
        Isometry3::translation(1.2, 0.0, 0.0),
        2,
    );

    let config = RelocalizerConfig {
        minimum_matches_per_correspondence: 1,
        ..relocalizer_config()
    };
    let mut relocalizer = Relocalizer::new(config, LinearIndex::new());
    relocalizer.detect_closures(&mut map, reference);
    relocalizer.detect_closures(&mut map, query);

    // The candidate itself survives; each correspondence has one vote, which
    // is not strictly above the threshold.
    assert_eq!(relocalizer.closures().len(), 1);
    assert!(relocalizer.closures()[0].correspondences.is_empty());
}

#[test]
fn test_duplicate_query_descriptors_claim_one_reference() {
    let mut map = world_map();
    let points = vec![
        Vector3::new(1.0, 0.0, 2.0),
        Vector3::new(-1.0, 0.5, 3.0),
        Vector3::new(0.3, -0.8, 1.5),
        Vector3::new(2.0, 1.0, 4.0),
        Vector3::new(-0.5, -1.2, 2.5),
    ];
    let reference_landmarks = create_landmarks(&mut map, &points);
    let reference = observe_pass(
        &mut map,
        &reference_landmarks,
        &[1, 2, 3, 4, 5],
        Isometry3::translation(0.2, 0.0, 0.0),
        0,
    );

    // Two query landmarks carry the same signature; only one may claim the
    // matching reference landmark.
    let query_landmarks = create_landmarks(&mut map, &points);
    let query = observe_pass(
        &mut map,
        &query_landmarks,
        &[1, 1, 2, 3, 4],
        Isometry3::translation(1.2, 0.0, 0.0),
        2,
    );

    let config = RelocalizerConfig {
        minimum_matched_landmarks: 2,
        ..relocalizer_config()
    };
    let mut relocalizer = Relocalizer::new(config, LinearIndex::new());
    relocalizer.detect_closures(&mut map, reference);
    relocalizer.detect_closures(&mut map, query);

    assert_eq!(relocalizer.closures().len(), 1);
    let closure = &relocalizer.closures()[0];

    let mut claimed: Vec<LandmarkId> = closure
        .correspondences
        .iter()
        .map(|c| c.reference)
        .collect();
    let before = claimed.len();
    claimed.sort();
    claimed.dedup();
    assert_eq!(claimed.len(), before);
    // Of the two duplicate-signature query landmarks, exactly one was paired.
    assert_eq!(before, 4);
}

#[test]
fn test_closure_correction_rejoins_the_reference_branch() {
    let mut map = world_map();
    let points = scene();
    let seeds: Vec<u64> = (0..10).collect();

    // First visit.
    let reference_landmarks = create_landmarks(&mut map, &points);
    let reference_anchor = Isometry3::translation(0.2, 0.0, 0.0);
    let reference = observe_pass(&mut map, &reference_landmarks, &seeds, reference_anchor, 0);

    // Revisit of the same place under accumulated drift: the believed pose
    // and the re-triangulated landmarks are both offset by the drift.
    let drift = Isometry3::translation(1.0, 0.0, 0.0);
    let true_anchor = Isometry3::translation(0.3, 0.0, 0.0);
    let drifted_points: Vec<Vector3<f64>> = points
        .iter()
        .map(|p| p + Vector3::new(1.0, 0.0, 0.0))
        .collect();
    let query_landmarks = create_landmarks(&mut map, &drifted_points);
    let query = observe_pass(
        &mut map,
        &query_landmarks,
        &seeds,
        drift * true_anchor,
        2,
    );

    let mut metrics = AccumulatingMetrics::new();
    let mut relocalizer =
        Relocalizer::with_metrics(relocalizer_config(), LinearIndex::new(), &mut metrics);
    relocalizer.detect_closures(&mut map, reference);
    relocalizer.detect_closures(&mut map, query);
    relocalizer.register_closures(&map);

    let closures = relocalizer.take_closures();
    assert_eq!(closures.len(), 1);
    let alignment = closures[0].alignment.as_ref().unwrap();
    assert!(alignment.converged);

    assert!(map.close_local_maps(
        closures[0].query,
        closures[0].reference,
        &alignment.query_to_reference,
    ));
    map.reset_window();

    assert!(map.relocalized());
    let corrected = map.local_map(query).unwrap().robot_to_world;
    assert_relative_eq!(
        (corrected.translation.vector - true_anchor.translation.vector).norm(),
        0.0,
        epsilon = 1e-3
    );

    // The reference branch is untouched.
    let reference_pose = map.local_map(reference).unwrap().robot_to_world;
    assert_relative_eq!(
        (reference_pose.translation.vector - reference_anchor.translation.vector).norm(),
        0.0,
        epsilon = 1e-12
    );

    drop(relocalizer);
    assert_eq!(metrics.count("detect_closures"), 2);
    assert_eq!(metrics.count("register_closures"), 1);
}

#[test]
fn test_clear_drops_closures_but_keeps_history() {
    let mut map = world_map();
    let points = scene();
    let landmarks = create_landmarks(&mut map, &points);
    let seeds: Vec<u64> = (0..10).collect();

    let reference = observe_pass(
        &mut map,
        &landmarks,
        &seeds,
        Isometry3::translation(0.2, 0.0, 0.0),
        0,
    );
    let query = observe_pass(
        &mut map,
        &landmarks,
        &seeds,
        Isometry3::translation(1.2, 0.0, 0.0),
        2,
    );

    let mut relocalizer = Relocalizer::new(relocalizer_config(), LinearIndex::new());
    relocalizer.detect_closures(&mut map, reference);
    relocalizer.detect_closures(&mut map, query);
    assert_eq!(relocalizer.closures().len(), 1);

    relocalizer.clear();
    assert!(relocalizer.closures().is_empty());
    assert_eq!(relocalizer.number_of_indexed_local_maps(), 2);
}
