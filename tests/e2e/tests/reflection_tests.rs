//! Reflection, goal and metacognition end-to-end tests

use std::sync::Arc;

use strata_core::cognition::{
    AffectiveState, EpisodeMetrics, MetacogObserver, Metacognition, NarrativePredictionSpec, Reflection,
    ReflectionView,
};
use strata_core::config::{MetacognitionConfig, ReflectionConfig};
use strata_e2e_tests::harness::TestStore;
use strata_e2e_tests::mocks::{fast_narrative_config, option};

fn view() -> ReflectionView {
    ReflectionView {
        affect: AffectiveState::new(),
        identity_confidence: None,
        coherence: 0.5,
        episode_id: None,
    }
}

fn metrics(episode_index: i64, contradiction_rate: f64, avg_reward: f64) -> EpisodeMetrics {
    EpisodeMetrics {
        episode_index,
        contradiction_rate,
        avg_reward,
    }
}

#[test]
fn test_reflection_gate_sequence() {
    let ts = TestStore::new_temp();
    let run_id = ts.begin_run();
    let mut reflection = Reflection::new(Arc::clone(&ts.storage), run_id, ReflectionConfig::default());
    assert_eq!(reflection.last_reflected(), -1);

    let first = reflection.maybe_reflect(&metrics(0, 0.8, 0.0), &view(), ts.now()).unwrap();
    assert!(first.is_some());

    // gap below two episodes
    let second = reflection.maybe_reflect(&metrics(1, 0.8, 0.0), &view(), ts.now()).unwrap();
    assert!(second.is_none());

    // trigger 0.04 is below 0.3
    let third = reflection.maybe_reflect(&metrics(2, 0.0, 0.1), &view(), ts.now()).unwrap();
    assert!(third.is_none());

    let fourth = reflection.maybe_reflect(&metrics(2, 0.5, 0.2), &view(), ts.now()).unwrap();
    assert!(fourth.is_some());

    let rows = ts.storage.list_reflections(run_id).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(reflection.last_reflected(), 2);
}

#[test]
fn test_prediction_resolves_only_after_horizon() {
    let ts = TestStore::new_temp();
    let run_id = ts.begin_run();
    let reflection_id = ts
        .storage
        .insert_reflection(run_id, 0, "narrative summary", "{}", 0.5, None)
        .unwrap();
    let mut metacog = Metacognition::new(Arc::clone(&ts.storage), run_id, MetacognitionConfig::default());

    let spec = NarrativePredictionSpec {
        reflection_id,
        predicted_coherence_delta: 0.2,
        confidence: 0.6,
        horizon_ms: 1_000,
        targets_json: r#"{"goal_shift":0.01}"#.to_string(),
    };
    metacog.register_narrative_prediction(&spec, 0).unwrap();

    let mut observers: [&mut dyn MetacogObserver; 0] = [];
    let early = metacog.resolve_actuals(0.6, 0.01, "early", 1, 500, &mut observers).unwrap();
    assert!(early.is_none());
    assert!(ts.storage.get_recent_metacognition(run_id, 10).unwrap().is_empty());

    let res = metacog
        .resolve_actuals(0.6, 0.01, "due", 2, 1_001, &mut observers)
        .unwrap()
        .unwrap();
    assert_eq!(res.event.resolved, 1);
    assert!(res.failures.is_empty());

    let rows = ts.storage.get_recent_metacognition(run_id, 10).unwrap();
    assert_eq!(rows.len(), 1);
    // target is 1 - |0.6 - (0.5 + 0.2)| = 0.9
    let trust = rows[0].self_trust;
    assert!(trust > 0.5 && trust < 0.9);
    assert!((res.event.narrative_rmse - 0.1).abs() < 1e-9);
    assert_eq!(metacog.get_self_trust(), trust);

    let preds = ts.storage.list_narrative_predictions(run_id).unwrap();
    assert!(preds[0].resolved);
    assert_eq!(preds[0].metacognition_id, Some(rows[0].id));

    // nothing left to resolve
    let again = metacog.resolve_actuals(0.6, 0.01, "again", 3, 5_000, &mut observers).unwrap();
    assert!(again.is_none());
}

#[test]
fn test_episode_to_metacognition_pipeline() {
    let ts = TestStore::new_temp();
    let mut engine = ts.start_engine(fast_narrative_config());
    let run_id = engine.run_id();

    engine.on_step_begin(0, ts.now()).unwrap();
    let ids = engine.submit_options(&[option("go", 0.6, 0.0)], Some(0)).unwrap();
    engine.apply_option_result(ids[0], "go", 0.5, ts.now()).unwrap();
    let end = engine.on_episode_end(0, 0.0, 0.5).unwrap();

    let outcome = end.reflection.expect("reflection expected with a zero trigger threshold");
    let narrative = outcome.narrative.expect("narrative expected on every reflection");
    assert!(narrative.prediction.horizon_ms >= 30_000);
    assert!(narrative.prediction.horizon_ms <= 120_000);

    assert!(engine.goals().root_id().is_some());
    assert_eq!(engine.goals().goal_count(), 2);
    assert_eq!(engine.metacognition().pending_len(), 1);
    let due = engine.next_prediction_due_ms().unwrap();

    // not due yet
    engine.on_step_begin(1, ts.now()).unwrap();
    let early = engine.update_motivation(0.6, 0.5, "early").unwrap();
    assert!(early.resolution.is_none());

    ts.clock.set(due + 1);
    engine.on_step_begin(2, ts.now()).unwrap();
    let out = engine.update_motivation(0.6, 0.55, "due").unwrap();
    let res = out.resolution.expect("prediction due");
    assert!(res.failures.is_empty(), "observer failures: {:?}", res.failures);

    // every collaborator observed the row
    assert_eq!(ts.storage.list_self_explanations(run_id).unwrap().len(), 1);
    assert_eq!(ts.storage.get_recent_consistency(run_id, 10).unwrap().len(), 1);
    assert_eq!(ts.storage.get_recent_autonomy_envelope(run_id, 10).unwrap().len(), 1);
    assert_eq!(ts.storage.get_recent_meta_reasoner(run_id, 10).unwrap().len(), 1);
    assert!(engine.envelope().is_valid());

    // resolved predictions point at exactly one row past their horizon
    let rows = ts.storage.get_recent_metacognition(run_id, 10).unwrap();
    for p in ts.storage.list_narrative_predictions(run_id).unwrap() {
        if !p.resolved {
            continue;
        }
        let matching: Vec<_> = rows.iter().filter(|r| Some(r.id) == p.metacognition_id).collect();
        assert_eq!(matching.len(), 1);
        assert!(matching[0].ts_ms >= p.ts_ms + p.horizon_ms);
    }

    // persisted values stay in the unit interval
    for g in ts.storage.list_goal_nodes(run_id).unwrap() {
        assert!((0.0..=1.0).contains(&g.stability));
        assert!((0.0..=1.0).contains(&g.priority));
    }
    for m in ts.storage.get_recent_motivation(run_id, 100).unwrap() {
        assert!((0.0..=1.0).contains(&m.coherence));
    }
    for r in &rows {
        assert!((0.0..=1.0).contains(&r.self_trust));
    }
    for e in ts.storage.get_recent_autonomy_envelope(run_id, 100).unwrap() {
        assert!((0.0..=1.0).contains(&e.autonomy_score));
    }
}

#[test]
fn test_goal_coherence_zero_without_goals() {
    let ts = TestStore::new_temp();
    let engine = ts.start_engine(fast_narrative_config());
    assert_eq!(engine.goals().goal_count(), 0);
    assert_eq!(engine.goal_coherence(), 0.0);
}

#[test]
fn test_repeated_title_reinforces_existing_goal() {
    let ts = TestStore::new_temp();
    let mut engine = ts.start_engine(fast_narrative_config());
    let run_id = engine.run_id();

    for ep in 0..2 {
        engine.on_step_begin(ep, ts.now()).unwrap();
        let ids = engine.submit_options(&[option("go", 0.6, 0.0)], Some(0)).unwrap();
        engine.apply_option_result(ids[0], "go", 0.4, ts.now()).unwrap();
        ts.advance(100);
        engine.on_episode_end(ep, 0.0, 0.4).unwrap();
    }

    let goals = ts.storage.list_goal_nodes(run_id).unwrap();
    let sustain = goals.iter().filter(|g| g.description == "sustain reward").count();
    assert_eq!(sustain, 1);
    assert_eq!(ts.storage.list_reflections(run_id).unwrap().iter().filter(|r| r.title == "sustain reward").count(), 2);
}
