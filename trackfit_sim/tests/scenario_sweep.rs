use proptest::prelude::*;
use std::collections::HashSet;
use trackfit_core::{EstimatorKind, SampleMethod};
use trackfit_sim::{ScenarioId, ScenarioRunner, SimExport};

#[test]
fn all_scenarios_pass_on_default_seed() {
    let runner = ScenarioRunner::new(42);
    for scenario in ScenarioId::all() {
        let result = runner.run(scenario);
        assert!(result.passed, "{}: {:?}", scenario, result.failure_reason);
    }
}

#[test]
fn two_tracks_pass_under_every_estimator() {
    for estimator in EstimatorKind::all() {
        let result = ScenarioRunner::new(5)
            .with_estimator(estimator)
            .run(ScenarioId::TwoTracks);
        assert!(result.passed, "{}: {:?}", estimator, result.failure_reason);
    }
}

#[test]
fn two_tracks_pass_under_every_sampler() {
    for method in SampleMethod::all() {
        let result = ScenarioRunner::new(6)
            .with_sample_method(method)
            .run(ScenarioId::TwoTracks);
        assert!(result.passed, "{}: {:?}", method, result.failure_reason);
    }
}

#[test]
fn export_collects_every_run() {
    let runner = ScenarioRunner::new(9);
    let mut export = SimExport::new(9, runner.config());
    for scenario in ScenarioId::all() {
        export.add_result(&runner.run(scenario));
    }

    assert_eq!(export.runs.len(), ScenarioId::all().len());
    assert!(export.to_json().unwrap().contains("\"vertex_pair\""));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn tracks_stay_disjoint_for_any_seed(seed in 1u64..10_000) {
        let result = ScenarioRunner::new(seed).run(ScenarioId::FourTracks);

        let mut seen = HashSet::new();
        for track in &result.output.tracks {
            for id in track.hit_ids() {
                prop_assert!(seen.insert(id));
            }
        }
    }

    #[test]
    fn noise_never_forms_tracks(seed in 1u64..10_000) {
        let result = ScenarioRunner::new(seed).run(ScenarioId::NoiseOnly);
        prop_assert!(result.output.tracks.is_empty());
    }
}
