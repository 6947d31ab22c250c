//! Step loop end-to-end tests
//!
//! Full runs over scripted environments: episode accounting, shutdown with
//! a prediction drain, fault isolation, feeds, heartbeats and budgets.

use std::sync::Arc;

use strata_core::{
    AbortFlag, ActionKind, CandidateOption, Environment, FeedQueue, FeedSample, ManualClock,
    ReasonerMode, RunEventKind, RuntimeConfig, StepLoop, StepOutcome,
};
use strata_e2e_tests::harness::TestStore;
use strata_e2e_tests::mocks::{
    config_with_mode, fast_narrative_config, two_options, ScriptedEnvironment, ScriptedStep,
};

fn with_max_steps(mut config: RuntimeConfig, max: u64) -> RuntimeConfig {
    config.max_steps = Some(max);
    config
}

/// Requests an abort once `after` has been played
struct AbortAfter {
    inner: ScriptedEnvironment,
    abort: AbortFlag,
    after: i64,
}

impl Environment for AbortAfter {
    fn options(&mut self, step: i64) -> Vec<CandidateOption> {
        self.inner.options(step)
    }

    fn outcome(&mut self, step: i64, chosen: &CandidateOption) -> StepOutcome {
        let out = self.inner.outcome(step, chosen);
        if step == self.after {
            self.abort.request("SIGINT");
        }
        out
    }
}

/// Panics while listing options on one step
struct Faulty {
    fail_at: i64,
}

impl Environment for Faulty {
    fn options(&mut self, step: i64) -> Vec<CandidateOption> {
        if step == self.fail_at {
            panic!("camera offline");
        }
        two_options()
    }

    fn outcome(&mut self, _step: i64, _chosen: &CandidateOption) -> StepOutcome {
        StepOutcome {
            reward: 0.1,
            ..Default::default()
        }
    }
}

/// Burns simulated time inside the first step
struct Slow {
    clock: Arc<ManualClock>,
    cost_ms: i64,
}

impl Environment for Slow {
    fn options(&mut self, _step: i64) -> Vec<CandidateOption> {
        two_options()
    }

    fn outcome(&mut self, step: i64, _chosen: &CandidateOption) -> StepOutcome {
        if step == 0 {
            self.clock.advance(self.cost_ms);
        }
        StepOutcome::default()
    }
}

#[test]
fn test_scripted_run_closes_episodes() {
    let ts = TestStore::new_temp();
    let engine = ts.start_engine(with_max_steps(config_with_mode(ReasonerMode::On), 6));
    let run_id = engine.run_id();
    let env = ScriptedEnvironment::episodes(two_options(), &[0.5, 0.5, -0.2, -0.3, 0.4, 0.1], 2);

    let mut lp = StepLoop::new(engine, env, AbortFlag::new());
    let report = lp.run().unwrap();
    assert_eq!(report.steps, 6);
    assert!(!report.aborted);
    assert_eq!(report.stage_failures, 0);
    assert_eq!(lp.environment().chosen.len(), 6);

    // three scripted episodes and the empty one closed at exit
    assert_eq!(report.summary.finished_episodes, 4);
    assert_eq!(report.summary.successes, 2);
    assert_eq!(report.summary.failures, 2);
    assert_eq!(report.summary.total_steps, 6);

    let episodes = ts.storage.list_episodes(run_id).unwrap();
    assert_eq!(episodes.len(), 4);
    assert!(episodes.iter().all(|e| e.end_ms.is_some()));
    assert_eq!(episodes[3].success, None);

    let experiences = ts.storage.list_experiences(run_id).unwrap();
    assert_eq!(experiences.iter().filter(|e| e.tag == "step").count(), 6);
    assert_eq!(experiences.iter().filter(|e| e.significant).count(), 3);
    assert_eq!(ts.storage.list_rewards(run_id).unwrap().len(), 6);
}

#[test]
fn test_driver_choice_stands_when_reasoner_off() {
    let ts = TestStore::new_temp();
    let engine = ts.start_engine(with_max_steps(config_with_mode(ReasonerMode::Off), 4));
    let run_id = engine.run_id();
    let env = ScriptedEnvironment::episodes(two_options(), &[1.0], 10).prefer(1);

    let mut lp = StepLoop::new(engine, env, AbortFlag::new());
    lp.run().unwrap();
    assert!(lp.environment().chosen.iter().all(|k| k == "b"));
    assert!(ts.storage.list_verifications(run_id).unwrap().is_empty());
}

#[test]
fn test_abort_drains_due_predictions() {
    let ts = TestStore::new_temp();
    let mut config = fast_narrative_config();
    config.outcome_eval_window_ms = 60_000;
    let engine = ts.start_engine(config);
    let run_id = engine.run_id();
    let abort = AbortFlag::new();
    let env = AbortAfter {
        inner: ScriptedEnvironment::episodes(two_options(), &[0.3, 0.6], 2),
        abort: abort.clone(),
        after: 1,
    };

    let mut lp = StepLoop::new(engine, env, abort);
    let report = lp.run().unwrap();
    assert!(report.aborted);
    assert_eq!(report.steps, 2);
    assert_eq!(report.reason.as_deref(), Some("SIGINT"));
    assert_eq!(report.drained_resolutions, 1);
    assert_eq!(lp.engine().metacognition().pending_len(), 0);

    let preds = ts.storage.list_narrative_predictions(run_id).unwrap();
    assert_eq!(preds.len(), 1);
    assert!(preds[0].resolved);
    assert!(ts.now() >= preds[0].ts_ms + preds[0].horizon_ms);

    let events = ts.storage.list_run_events(run_id).unwrap();
    let last = events.last().unwrap();
    assert_eq!(last.kind, RunEventKind::Signal.as_str());
    assert!(last.message.contains("SIGINT"));
    assert_eq!(last.exit_code, None);
    assert!(events.iter().all(|e| e.kind != "exit"));
    assert!(ts.storage.get_run(run_id).unwrap().unwrap().ended_ms.is_some());
}

#[test]
fn test_panicking_environment_does_not_stop_run() {
    let ts = TestStore::new_temp();
    let engine = ts.start_engine(with_max_steps(config_with_mode(ReasonerMode::On), 5));
    let run_id = engine.run_id();

    let mut lp = StepLoop::new(engine, Faulty { fail_at: 2 }, AbortFlag::new());
    let report = lp.run().unwrap();
    assert_eq!(report.steps, 5);
    assert_eq!(report.stage_failures, 1);

    let events = ts.storage.list_run_events(run_id).unwrap();
    let warnings: Vec<_> = events.iter().filter(|e| e.kind == "warning").collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("panic: camera offline"));
    assert_eq!(warnings[0].step, 2);
    assert_eq!(events.last().unwrap().kind, "exit");
    // the four healthy steps still recorded rewards
    assert_eq!(ts.storage.list_rewards(run_id).unwrap().len(), 4);
}

#[test]
fn test_feeds_are_drained_at_step_boundaries() {
    let ts = TestStore::new_temp();
    let engine = ts.start_engine(with_max_steps(config_with_mode(ReasonerMode::On), 2));
    let run_id = engine.run_id();

    let (tx, rx) = FeedQueue::bounded(4);
    let accepted = (0..6)
        .filter(|i| {
            tx.try_send(FeedSample {
                stream: "spikes".to_string(),
                value: *i as f64 / 10.0,
            })
        })
        .count();
    assert_eq!(accepted, 4);
    assert_eq!(rx.dropped(), 2);

    let env = ScriptedEnvironment::new(two_options(), vec![ScriptedStep::reward(0.2)]);
    let mut lp = StepLoop::new(engine, env, AbortFlag::new()).with_feeds(rx);
    lp.run().unwrap();

    let feeds: Vec<_> = ts
        .storage
        .list_experiences(run_id)
        .unwrap()
        .into_iter()
        .filter(|e| e.tag == "feed")
        .collect();
    // everything queued lands in the first step, the second sees an empty queue
    assert_eq!(feeds.len(), 1);
    assert_eq!(feeds[0].step, 0);
    let input: serde_json::Value = serde_json::from_str(&feeds[0].input_json).unwrap();
    assert_eq!(input["samples"].as_array().unwrap().len(), 4);
}

#[test]
fn test_heartbeats_and_actions_are_recorded() {
    let ts = TestStore::new_temp();
    let mut config = with_max_steps(config_with_mode(ReasonerMode::On), 7);
    config.heartbeat_every = 3;
    let engine = ts.start_engine(config);
    let run_id = engine.run_id();
    let env = ScriptedEnvironment::new(
        two_options(),
        vec![
            ScriptedStep::reward(0.2).with_action(ActionKind::Click),
            ScriptedStep::reward(0.2).with_action(ActionKind::ScrollDown),
            ScriptedStep::reward(0.2),
        ],
    );

    let mut lp = StepLoop::new(engine, env, AbortFlag::new());
    lp.run().unwrap();

    let events = ts.storage.list_run_events(run_id).unwrap();
    let beats: Vec<_> = events.iter().filter(|e| e.kind == "heartbeat").collect();
    assert_eq!(beats.len(), 2);
    assert_eq!(beats[0].message, "step 2");

    let actions = ts.storage.list_actions(run_id).unwrap();
    assert_eq!(actions.len(), 2);
    assert_eq!(actions[0].kind, "click");
    assert!(!actions[0].success);
    assert_eq!(actions[0].reason, "no_web_actions");
    assert_eq!(actions[1].kind, "scroll_down");
    assert!(actions[1].success);
}

#[test]
fn test_slow_step_counts_as_budget_overrun() {
    let ts = TestStore::new_temp();
    let engine = ts.start_engine(with_max_steps(config_with_mode(ReasonerMode::On), 3));
    let run_id = engine.run_id();
    let env = Slow {
        clock: Arc::clone(&ts.clock),
        cost_ms: 300,
    };

    let mut lp = StepLoop::new(engine, env, AbortFlag::new());
    let report = lp.run().unwrap();
    assert_eq!(report.steps, 3);
    assert_eq!(report.budget_overruns, 1);
    assert_eq!(report.stage_failures, 0);

    let events = ts.storage.list_run_events(run_id).unwrap();
    assert!(
        events
            .iter()
            .any(|e| e.kind == "warning" && e.message.contains("budget exceeded"))
    );
}
