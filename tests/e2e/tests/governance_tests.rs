//! Governance end-to-end tests
//!
//! Autonomy envelope hysteresis, the action gate, the personality
//! revision and approval flow, and coupled context streams.

use std::sync::Arc;

use strata_core::cognition::MetacogEvent;
use strata_core::config::{
    CouplingSpec, EnvelopeConfig, EthicsConfig, PeerSpec, SelfRevisionConfig,
};
use strata_core::governance::{
    check, AutonomyEnvelope, EthicsRegulator, SelfRevision,
};
use strata_core::storage::NewMetacognition;
use strata_core::{
    ActionKind, AutonomyTier, ContextService, EnvelopeDecision, EthicsDecision, FixedSource,
    ManualClock, ReasonerMode,
};
use strata_e2e_tests::harness::TestStore;
use strata_e2e_tests::mocks::config_with_mode;

fn low_trust_event(ts: &TestStore, run_id: i64, ts_ms: i64, self_trust: f64) -> MetacogEvent {
    let metacognition_id = ts
        .storage
        .insert_metacognition(
            run_id,
            &NewMetacognition {
                ts_ms,
                self_trust,
                ..Default::default()
            },
        )
        .unwrap();
    MetacogEvent {
        metacognition_id,
        ts_ms,
        step: 7,
        self_trust,
        prev_trust: 0.5,
        narrative_rmse: 0.6,
        goal_mae: 0.1,
        ece: None,
        actual_coherence: 0.3,
        resolved: 1,
        notes: "e2e".to_string(),
    }
}

// ============================================================================
// AUTONOMY ENVELOPE
// ============================================================================

#[test]
fn test_envelope_contraction_respects_hysteresis() {
    let ts = TestStore::new_temp();
    let run_id = ts.begin_run();
    let mut envelope = AutonomyEnvelope::new(Arc::clone(&ts.storage), run_id, EnvelopeConfig::default());
    assert!(!envelope.is_valid());
    assert_eq!(envelope.autonomy_score(), 0.0);

    let first = envelope.evaluate(0.3, 0.4, 0).unwrap();
    assert_eq!(first.decision, EnvelopeDecision::Tighten);
    assert_eq!(first.tier, AutonomyTier::Shadow);
    assert!(envelope.is_valid());

    // inside the 60s contraction window
    let second = envelope.evaluate(0.3, 0.4, 10_000).unwrap();
    assert_eq!(second.decision, EnvelopeDecision::Hold);
    assert_eq!(second.tier, AutonomyTier::Shadow);

    let third = envelope.evaluate(0.3, 0.4, 60_001).unwrap();
    assert_eq!(third.decision, EnvelopeDecision::Tighten);
    assert_eq!(third.tier, AutonomyTier::None);
    assert_eq!(envelope.gate_decision(), EnvelopeDecision::Freeze);

    // already at the bottom
    let fourth = envelope.evaluate(0.3, 0.4, 200_000).unwrap();
    assert_eq!(fourth.decision, EnvelopeDecision::Freeze);
    assert_eq!(fourth.tier, AutonomyTier::None);

    let rows = ts.storage.get_recent_autonomy_envelope(run_id, 10).unwrap();
    assert_eq!(rows.len(), 4);
    for row in &rows {
        assert!((0.0..=1.0).contains(&row.autonomy_score));
    }
}

#[test]
fn test_envelope_expands_one_tier_at_a_time() {
    let ts = TestStore::new_temp();
    let run_id = ts.begin_run();
    let mut envelope = AutonomyEnvelope::new(Arc::clone(&ts.storage), run_id, EnvelopeConfig::default());

    let up = envelope.evaluate(0.9, 0.95, 0).unwrap();
    assert_eq!(up.decision, EnvelopeDecision::Expand);
    assert_eq!(up.tier, AutonomyTier::Full);
    assert!((up.autonomy_score - 1.0).abs() < 1e-12);

    // capped at the top of the ladder
    let capped = envelope.evaluate(0.9, 0.95, 500_000).unwrap();
    assert_eq!(capped.decision, EnvelopeDecision::Hold);
    assert_eq!(capped.tier, AutonomyTier::Full);

    // a single low reading drops exactly one tier
    let down = envelope.evaluate(0.1, 0.95, 500_500).unwrap();
    assert_eq!(down.decision, EnvelopeDecision::Tighten);
    assert_eq!(down.tier, AutonomyTier::Conditional);
    // logged at most once per second
    assert!(down.logged.is_none());
}

// ============================================================================
// ACTION GATE
// ============================================================================

#[test]
fn test_high_context_denies_web_action() {
    let ts = TestStore::new_temp();
    let mut config = config_with_mode(ReasonerMode::On);
    config.actions.web_actions_enabled = true;
    let mut engine = ts.start_engine_with_context(config, 0.70);
    let run_id = engine.run_id();
    engine.on_step_begin(0, ts.now()).unwrap();

    let verdict = engine.check_action(ActionKind::Click).unwrap();
    assert!(!verdict.allow);
    assert_eq!(verdict.reason, "phase15_deny");
    assert!(engine.ethics().hard_block());

    let actions = ts.storage.list_actions(run_id).unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].kind, "click");
    assert!(!actions[0].success);
    assert!(!actions[0].reason.is_empty());

    let ethics = ts.storage.get_recent_ethics_regulator(run_id, 5).unwrap();
    assert_eq!(ethics[0].decision, "deny");
}

#[test]
fn test_web_actions_disabled_by_default() {
    let ts = TestStore::new_temp();
    let mut engine = ts.start_engine(config_with_mode(ReasonerMode::On));
    engine.on_step_begin(0, ts.now()).unwrap();

    let web = engine.check_action(ActionKind::TypeText).unwrap();
    assert!(!web.allow);
    assert_eq!(web.reason, "no_web_actions");

    let local = engine.check_action(ActionKind::ScrollDown).unwrap();
    assert!(local.allow);
}

#[test]
fn test_every_denied_action_is_recorded() {
    let ts = TestStore::new_temp();
    let mut config = config_with_mode(ReasonerMode::On);
    config.actions.simulate_blocked = 1;
    let mut engine = ts.start_engine(config);
    let run_id = engine.run_id();
    engine.on_step_begin(0, ts.now()).unwrap();

    for kind in ActionKind::ALL {
        let verdict = engine.check_action(kind).unwrap();
        assert!(!verdict.allow);
        assert_eq!(verdict.reason, "simulated_block");
    }

    let actions = ts.storage.list_actions(run_id).unwrap();
    assert_eq!(actions.len(), ActionKind::ALL.len());
    for a in actions {
        assert!(!a.success);
        assert!(!a.reason.is_empty());
    }
}

#[test]
fn test_gate_precedence() {
    use EnvelopeDecision::*;

    // ethics outranks the envelope
    let v = check(ActionKind::Click, true, Some(EthicsDecision::Deny), Freeze, 0);
    assert_eq!(v.reason, "phase15_deny");

    // review blocks writes, only cautions reads
    let write = check(ActionKind::TypeText, true, Some(EthicsDecision::Review), Hold, 0);
    assert!(!write.allow);
    assert_eq!(write.reason, "phase15_review_write");
    let read = check(ActionKind::ScrollUp, true, Some(EthicsDecision::Review), Tighten, 0);
    assert!(read.allow);
    assert_eq!(read.reason, "phase15_review");

    let frozen = check(ActionKind::CursorMove, true, Some(EthicsDecision::Allow), Freeze, 0);
    assert_eq!(frozen.reason, "phase13_freeze");
    let tight = check(ActionKind::CursorMove, true, None, Tighten, 0);
    assert!(tight.allow);
    assert_eq!(tight.reason, "phase13_tighten");

    let plain = check(ActionKind::CursorMove, false, None, Expand, 0);
    assert!(plain.allow);
    assert!(plain.reason.is_empty());
}

// ============================================================================
// PERSONALITY REVISION
// ============================================================================

#[test]
fn test_revision_proposal_then_ethics_approval() {
    let ts = TestStore::new_temp();
    let run_id = ts.begin_run();
    let context = Arc::new(ContextService::with_source(
        Arc::new(ManualClock::new(0)),
        Box::new(FixedSource(0.1)),
    ));
    let mut revision = SelfRevision::new(Arc::clone(&ts.storage), run_id, SelfRevisionConfig::default(), 0.0);
    let mut ethics = EthicsRegulator::new(Arc::clone(&ts.storage), run_id, EthicsConfig::default(), context);

    let event = low_trust_event(&ts, run_id, 100, 0.2);
    let out = revision.revise(&event).unwrap();
    let (revision_id, personality_id) = out.proposed.expect("low trust proposes a revision");

    let pending = ts
        .storage
        .get_latest_pending_personality_proposal(run_id)
        .unwrap()
        .unwrap();
    assert_eq!(pending.id, personality_id);
    assert_eq!(pending.source, "phase11");

    let review = ethics
        .review_personality_proposal(personality_id, "personality_review", "e2e", 150)
        .unwrap();
    assert!(review.approved);
    assert!(ts.storage.get_latest_pending_personality_proposal(run_id).unwrap().is_none());
    let approved = ts.storage.get_latest_approved_personality(run_id).unwrap().unwrap();
    assert_eq!(approved.id, personality_id);

    // the next low reading evaluates the first revision and builds on the approved traits
    let later = low_trust_event(&ts, run_id, 200, 0.25);
    let out = revision.revise(&later).unwrap();
    let (evaluated, delta) = out.evaluated.unwrap();
    assert_eq!(evaluated, revision_id);
    assert!((delta - 0.05).abs() < 1e-9);
    let (_, second) = out.proposed.unwrap();
    assert_ne!(second, personality_id);

    let revisions = ts.storage.list_self_revisions(run_id).unwrap();
    assert_eq!(revisions.len(), 2);
}

// ============================================================================
// CONTEXT STREAMS
// ============================================================================

#[test]
fn test_coupled_peer_samples_stay_bounded() {
    let context = ContextService::with_source(Arc::new(ManualClock::new(0)), Box::new(FixedSource(0.9)));
    context.register_context_peer("a", 1.0, 100, 8);
    context.register_context_peer("b", 1.0, 100, 4);
    context.set_context_coupling("a", "b", 5.0);

    let couplings = context.get_context_couplings();
    assert_eq!(couplings.len(), 1);
    assert_eq!(couplings[0].weight, 1.0);

    for _ in 0..10 {
        let a = context.sample_context_peer("a", "e2e");
        let b = context.sample_context_peer_detailed("b", "e2e");
        assert!((0.0..=1.0).contains(&a));
        assert!((0.0..=1.0).contains(&b.value));
        assert!(b.lambda > 0.0);
    }
    assert_eq!(context.get_recent_peer_samples("b").len(), 4);

    context.set_context_coupling("a", "b", 0.0);
    assert!(context.get_context_couplings().is_empty());
    let solo = context.sample_context_peer_detailed("b", "e2e");
    assert_eq!(solo.lambda, 0.0);
    assert!((solo.value - 0.9).abs() < 1e-12);
}

#[test]
fn test_engine_logs_configured_peers() {
    let ts = TestStore::new_temp();
    let mut config = config_with_mode(ReasonerMode::On);
    config.context.peers = vec![
        PeerSpec {
            name: "vision".to_string(),
            gain: 0.5,
            update_ms: 100,
            window: 4,
        },
        PeerSpec {
            name: "audio".to_string(),
            gain: 1.0,
            update_ms: 100,
            window: 4,
        },
    ];
    config.context.couplings = vec![CouplingSpec {
        src: "vision".to_string(),
        dst: "audio".to_string(),
        weight: 0.5,
    }];
    let mut engine = ts.start_engine_with_context(config, 0.8);
    let run_id = engine.run_id();
    engine.on_step_begin(0, ts.now()).unwrap();

    let samples = engine.sample_peers("step");
    assert_eq!(samples.len(), 2);
    for s in &samples {
        assert!((0.0..=1.0).contains(&s.value));
    }

    let logs = ts.storage.list_context_peer_logs(run_id).unwrap();
    assert_eq!(logs.len(), 2);
    assert!(logs.iter().all(|l| l.label == "step"));
    let audio = logs.iter().find(|l| l.peer == "audio").unwrap();
    assert_eq!(audio.mode, "coupled");
    assert_eq!(audio.lambda, 0.5);
}
