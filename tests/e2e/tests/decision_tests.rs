//! Decision layer end-to-end tests
//!
//! Posterior convergence, contradiction intents, selection modes and the
//! running-mean invariant, all driven through the engine API.

use std::collections::HashMap;

use strata_core::cognition::reasoner::argmax;
use strata_core::{CandidateOption, ReasonScore, ReasonerMode};
use strata_e2e_tests::harness::TestStore;
use strata_e2e_tests::mocks::{config_with_mode, option, two_options};

#[test]
fn test_posterior_converges_on_rewarded_option() {
    let ts = TestStore::new_temp();
    let mut engine = ts.start_engine(config_with_mode(ReasonerMode::On));
    engine.on_step_begin(0, ts.now()).unwrap();

    let options = two_options();
    let ids = engine.submit_options(&options, None).unwrap();
    assert_eq!(ids.len(), 2);

    for _ in 0..4 {
        ts.advance(10);
        engine.apply_option_result(ids[0], "a", 1.0, ts.now()).unwrap();
    }

    assert_eq!(engine.reasoner().posterior_mean("a"), 1.0);
    assert_eq!(engine.reasoner().posterior_mean("b"), 0.0);
    assert_eq!(engine.reasoner().posterior("a").unwrap().n, 4);

    let score = engine.score_options(&options);
    assert_eq!(score.best_index, Some(0));
    assert!((score.best_score - 1.0).abs() < 1e-12);

    let stats = ts.storage.get_option_stats(ids[0]).unwrap().unwrap();
    assert_eq!(stats.n, 4);
    assert_eq!(stats.mean, 1.0);
}

#[test]
fn test_contradiction_then_resolution_intents() {
    let ts = TestStore::new_temp();
    let mut engine = ts.start_engine(config_with_mode(ReasonerMode::On));
    let run_id = engine.run_id();
    engine.on_step_begin(0, ts.now()).unwrap();
    let ids = engine.submit_options(&[option("k", 0.5, 0.0)], Some(0)).unwrap();

    for r in [0.8, 0.9] {
        ts.advance(5);
        engine.apply_option_result(ids[0], "k", r, ts.now()).unwrap();
    }
    assert!((engine.reasoner().posterior_mean("k") - 0.85).abs() < 1e-9);

    ts.advance(5);
    let out = engine
        .apply_option_result(ids[0], "k", -0.5, ts.now())
        .unwrap()
        .unwrap();
    assert_eq!(out.contradiction, Some(true));
    let nodes = ts.storage.list_intent_nodes(run_id).unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].kind, "correction");
    assert!(nodes.iter().all(|n| n.kind != "resolution"));

    ts.advance(5);
    engine.apply_option_result(ids[0], "k", 0.6, ts.now()).unwrap();
    let nodes = ts.storage.list_intent_nodes(run_id).unwrap();
    assert_eq!(nodes.iter().filter(|n| n.kind == "correction").count(), 1);
    assert_eq!(nodes.iter().filter(|n| n.kind == "resolution").count(), 1);

    let edges = ts.storage.list_intent_edges(run_id).unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].kind, "contradiction_resolved");
    assert_eq!(edges[0].src_node, nodes[0].id);
    assert_eq!(edges[0].dst_node, nodes[1].id);

    let verifications = ts.storage.list_verifications(run_id).unwrap();
    assert_eq!(verifications.len(), 4);
    assert_eq!(verifications.iter().filter(|v| v.contradiction).count(), 1);
}

#[test]
fn test_contradiction_rate_does_not_leak_across_episode_boundary() {
    let ts = TestStore::new_temp();
    let mut engine = ts.start_engine(config_with_mode(ReasonerMode::On));
    let run_id = engine.run_id();
    engine.on_step_begin(0, ts.now()).unwrap();
    let ids = engine.submit_options(&[option("k", 0.5, 0.0)], Some(0)).unwrap();

    // the terminal outcome and the episode close share one timestamp
    for r in [0.8, 0.9, -0.5] {
        engine.apply_option_result(ids[0], "k", r, ts.now()).unwrap();
    }
    let first = engine.current_episode();
    let rate0 = ts.storage.get_episode_contradiction_rate(run_id, first.id).unwrap();
    assert!((rate0 - 1.0 / 3.0).abs() < 1e-12);
    engine.on_episode_end(first.index, rate0, first.avg_reward()).unwrap();

    let second = engine.current_episode();
    assert_ne!(second.id, first.id);
    engine.on_step_begin(1, ts.now()).unwrap();
    let out = engine.apply_option_result(ids[0], "k", 0.6, ts.now()).unwrap().unwrap();
    assert_eq!(out.contradiction, Some(false));

    assert_eq!(ts.storage.get_episode_contradiction_rate(run_id, second.id).unwrap(), 0.0);
    let rate0_again = ts.storage.get_episode_contradiction_rate(run_id, first.id).unwrap();
    assert!((rate0_again - 1.0 / 3.0).abs() < 1e-12);

    let verifications = ts.storage.list_verifications(run_id).unwrap();
    assert_eq!(verifications.iter().filter(|v| v.episode_id == Some(first.id)).count(), 3);
    assert_eq!(verifications.iter().filter(|v| v.episode_id == Some(second.id)).count(), 1);
}

#[test]
fn test_mean_matches_reward_average() {
    let ts = TestStore::new_temp();
    let mut engine = ts.start_engine(config_with_mode(ReasonerMode::On));
    engine.on_step_begin(0, ts.now()).unwrap();
    let options = vec![option("x", 0.3, 0.2), option("y", 0.7, 0.5), option("z", 0.5, 0.0)];
    let ids = engine.submit_options(&options, None).unwrap();

    let rewards = [0.31, -0.7, 0.05, 1.0, -0.2, 0.44, 0.9, -1.0, 0.12, 0.6, 0.0, -0.33];
    let mut sums: HashMap<&str, (f64, i64)> = HashMap::new();
    for (i, &r) in rewards.iter().enumerate() {
        let idx = i % options.len();
        let key = options[idx].key.as_str();
        ts.advance(3);
        engine.apply_option_result(ids[idx], key, r, ts.now()).unwrap();
        let e = sums.entry(key).or_insert((0.0, 0));
        e.0 += r;
        e.1 += 1;
    }

    for (key, (sum, n)) in sums {
        let post = engine.reasoner().posterior(key).unwrap();
        assert_eq!(post.n, n);
        assert!((post.mean - sum / n as f64).abs() < 1e-9, "running mean drifted for {}", key);
    }
}

#[test]
fn test_register_then_apply_gives_single_sample_posterior() {
    let ts = TestStore::new_temp();
    let mut engine = ts.start_engine(config_with_mode(ReasonerMode::On));
    engine.on_step_begin(0, ts.now()).unwrap();
    let ids = engine.submit_options(&[option("fresh", 0.5, 0.1)], Some(0)).unwrap();
    engine.apply_option_result(ids[0], "fresh", -0.42, ts.now()).unwrap();

    let post = engine.reasoner().posterior("fresh").unwrap();
    assert_eq!(post.n, 1);
    assert_eq!(post.mean, -0.42);
}

#[test]
fn test_best_index_is_lowest_among_ties() {
    let ts = TestStore::new_temp();
    let mut engine = ts.start_engine(config_with_mode(ReasonerMode::On));
    engine.on_step_begin(0, ts.now()).unwrap();
    let options = vec![option("p", 0.5, 0.3), option("q", 0.5, 0.0), option("r", 0.5, 0.0)];
    engine.submit_options(&options, None).unwrap();

    let score = engine.score_options(&options);
    assert_eq!(score.best_index, Some(1));
    assert_eq!(argmax(&score.scores), score.best_index);
    let best = score.scores[1];
    assert!(score.scores.iter().all(|&s| s <= best));

    assert_eq!(argmax(&[0.2, 0.5, 0.5]), Some(1));
    assert_eq!(argmax(&[]), None);
}

#[test]
fn test_scoring_logs_modulation_without_autonomy() {
    let ts = TestStore::new_temp();
    let mut engine = ts.start_engine(config_with_mode(ReasonerMode::On));
    let run_id = engine.run_id();
    engine.on_step_begin(0, ts.now()).unwrap();
    engine.score_options(&two_options());

    let rows = ts.storage.list_autonomy_modulation(run_id).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].veto_reason, "no_autonomy_influence");
    assert_eq!(rows[0].exploration_bias, 0.0);
    assert_eq!(rows[0].autonomy_score, 0.0);
}

#[test]
fn test_modes_control_logging_and_override() {
    let score = ReasonScore {
        best_index: Some(1),
        best_score: 0.9,
        ..Default::default()
    };

    for (mode, expect_override, expect_logs) in [
        (ReasonerMode::Off, false, false),
        (ReasonerMode::Audit, false, true),
        (ReasonerMode::On, true, true),
    ] {
        let ts = TestStore::new_temp();
        let mut engine = ts.start_engine(config_with_mode(mode));
        let run_id = engine.run_id();

        let picked = engine.resolve_selection(&score, Some(0));
        assert_eq!(picked == Some(1), expect_override, "mode {}", mode.as_str());

        engine.on_step_begin(0, ts.now()).unwrap();
        let ids = engine.submit_options(&[CandidateOption::new("m", 0.5, 0.0)], Some(0)).unwrap();
        engine.apply_option_result(ids[0], "m", 0.4, ts.now()).unwrap();
        let logged = !ts.storage.list_verifications(run_id).unwrap().is_empty();
        assert_eq!(logged, expect_logs, "mode {}", mode.as_str());
        // the posterior is updated in every mode
        assert_eq!(engine.reasoner().posterior("m").unwrap().n, 1);
    }
}

#[test]
fn test_non_finite_reward_is_ignored() {
    let ts = TestStore::new_temp();
    let mut engine = ts.start_engine(config_with_mode(ReasonerMode::On));
    engine.on_step_begin(0, ts.now()).unwrap();
    let ids = engine.submit_options(&two_options(), None).unwrap();
    let out = engine.apply_option_result(ids[0], "a", f64::NAN, ts.now()).unwrap();
    assert!(out.is_none());
    assert_eq!(engine.reasoner().posterior("a").unwrap().n, 0);
    assert_eq!(engine.current_episode().rewards, 0);
}
