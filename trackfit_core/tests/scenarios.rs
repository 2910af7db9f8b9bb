use nalgebra::Vector3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::collections::HashSet;
use trackfit_core::{
    ConsensusConfig, EstimatorKind, Event, PatternKind, SampleConsensus, SampleMethod,
    TrackPattern,
};

/// Largest per-axis jitter, keeps every hit within one unit of its track.
const MAX_JITTER: f64 = 0.55;

fn jitter(rng: &mut ChaCha8Rng, normal: &Normal<f64>) -> Vector3<f64> {
    Vector3::from_fn(|_, _| normal.sample(&mut *rng).clamp(-MAX_JITTER, MAX_JITTER))
}

/// Two separated lines of 50 hits each plus 20 uniform noise hits.
fn two_track_event(seed: u64) -> Event {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 0.25).unwrap();
    let mut event = Event::new(seed);

    let lines = [
        (Vector3::new(-120.0, -80.0, 150.0), Vector3::new(0.8, 0.6, 2.5)),
        (Vector3::new(90.0, 110.0, 400.0), Vector3::new(-0.4, 1.0, 3.0)),
    ];
    for (start, step) in lines {
        for i in 0..50 {
            let position = start + step * i as f64 + jitter(&mut rng, &normal);
            event.add_hit(position, rng.gen_range(80.0..200.0));
        }
    }
    for _ in 0..20 {
        let position = Vector3::new(
            rng.gen_range(-250.0..250.0),
            rng.gen_range(-250.0..250.0),
            rng.gen_range(0.0..1000.0),
        );
        event.add_hit(position, rng.gen_range(1.0..20.0));
    }
    event
}

fn scenario_config() -> ConsensusConfig {
    ConsensusConfig::default()
        .with_estimator(EstimatorKind::Ransac)
        .with_sample_method(SampleMethod::Uniform)
        .with_iterations(500)
        .with_min_inliers(20)
        .with_distance_threshold(2.0)
}

#[test]
fn two_lines_with_noise_yield_two_tracks() {
    for seed in [1, 2, 3] {
        let event = two_track_event(seed);
        let mut engine = SampleConsensus::new(scenario_config().with_seed(seed)).unwrap();

        let result = engine.solve_event(&event);

        assert_eq!(result.tracks.len(), 2, "seed {}", seed);
        for track in &result.tracks {
            assert!(
                track.len() >= 45,
                "seed {}: track {} has {} hits",
                seed,
                track.id,
                track.len()
            );
        }
    }
}

#[test]
fn tracks_recover_their_source_line() {
    let event = two_track_event(4);
    let result = SampleConsensus::new(scenario_config()).unwrap().solve_event(&event);

    for track in &result.tracks {
        // Hit ids 0..50 belong to the first line, 50..100 to the second
        let first_line = track.hit_ids().iter().filter(|&&id| id < 50).count();
        let second_line = track.hit_ids().iter().filter(|&&id| (50..100).contains(&id)).count();
        assert!(first_line.max(second_line) >= 45);
        assert!(first_line.min(second_line) == 0);
    }
}

#[test]
fn impossible_minimum_yields_no_tracks() {
    let event = two_track_event(5);
    let mut engine = SampleConsensus::new(scenario_config().with_min_inliers(1000)).unwrap();
    assert!(engine.solve_event(&event).tracks.is_empty());
}

#[test]
fn empty_event_yields_no_tracks() {
    let mut engine = SampleConsensus::new(scenario_config()).unwrap();
    let result = engine.solve_event(&Event::new(0));
    assert!(result.tracks.is_empty());
    assert!(result.vertices.is_empty());
}

#[test]
fn every_estimator_finds_both_lines() {
    let event = two_track_event(6);
    for estimator in [EstimatorKind::Lmeds, EstimatorKind::Mlesac] {
        let config = scenario_config().with_estimator(estimator);
        let result = SampleConsensus::new(config).unwrap().solve_event(&event);
        assert_eq!(result.tracks.len(), 2, "{}", estimator);
    }
}

#[test]
fn every_sampler_finds_both_lines() {
    let event = two_track_event(7);
    for method in SampleMethod::all() {
        let config = scenario_config().with_sample_method(method);
        let result = SampleConsensus::new(config).unwrap().solve_event(&event);

        assert_eq!(result.tracks.len(), 2, "{}", method);
        assert!(result.tracks.iter().all(|t| t.len() >= 40), "{}", method);
    }
}

#[test]
fn fixed_seed_is_reproducible_across_engines() {
    let event = two_track_event(8);
    let config = scenario_config()
        .with_sample_method(SampleMethod::WeightedGaussian)
        .with_seed(1234);

    let runs: Vec<Vec<Vec<usize>>> = (0..3)
        .map(|_| {
            SampleConsensus::new(config.clone())
                .unwrap()
                .solve_event(&event)
                .tracks
                .iter()
                .map(|t| t.hit_ids())
                .collect()
        })
        .collect();

    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[1], runs[2]);
}

#[test]
fn tracks_never_share_hits() {
    let event = two_track_event(9);
    // A loose threshold makes candidates compete for the same hits
    let config = scenario_config().with_distance_threshold(10.0).with_min_inliers(5);
    let result = SampleConsensus::new(config).unwrap().solve_event(&event);

    let mut seen = HashSet::new();
    for track in &result.tracks {
        for id in track.hit_ids() {
            assert!(seen.insert(id), "hit {} assigned twice", id);
        }
    }
}

#[test]
fn circle_is_found_in_the_pad_plane() {
    let mut rng = ChaCha8Rng::seed_from_u64(10);
    let normal = Normal::new(0.0, 0.2).unwrap();
    let mut event = Event::new(10);

    for i in 0..60 {
        let phi = i as f64 * std::f64::consts::TAU / 60.0;
        let offset = jitter(&mut rng, &normal);
        let position = Vector3::new(
            10.0 + 50.0 * phi.cos() + offset.x,
            -20.0 + 50.0 * phi.sin() + offset.y,
            rng.gen_range(0.0..1000.0),
        );
        event.add_hit(position, 100.0);
    }
    for _ in 0..20 {
        let position = Vector3::new(
            rng.gen_range(-150.0..150.0),
            rng.gen_range(-150.0..150.0),
            rng.gen_range(0.0..1000.0),
        );
        event.add_hit(position, 100.0);
    }

    let config = scenario_config().with_pattern(PatternKind::Circle2D);
    let result = SampleConsensus::new(config).unwrap().solve_event(&event);

    assert_eq!(result.tracks.len(), 1);
    let track = &result.tracks[0];
    assert!(track.len() >= 55);
    let params = track.pattern.parameters();
    assert!((params[0] - 10.0).abs() < 0.5);
    assert!((params[1] + 20.0).abs() < 0.5);
    assert!((params[2] - 50.0).abs() < 0.5);
}
