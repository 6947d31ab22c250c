//! Telemetry store end-to-end tests
//!
//! Persistence across handles, summary accounting, constraint handling and
//! read-only access.

use serde_json::json;
use strata_core::storage::LATEST_VERSION;
use strata_core::{ErrorKind, ReasonerMode, RunEventKind, Storage, StorageError};
use strata_e2e_tests::harness::TestStore;
use strata_e2e_tests::mocks::{config_with_mode, option};

#[test]
fn test_rows_survive_reopen_in_order() {
    let ts = TestStore::new_temp();
    let run_id = ts.begin_run();
    let episode_id = ts.storage.start_episode(run_id, "episode-0", 10).unwrap();
    for step in 0..3 {
        ts.storage
            .insert_experience(
                run_id,
                Some(episode_id),
                20 + step,
                step,
                "step",
                &json!({ "step": step }).to_string(),
                "null",
                step == 2,
            )
            .unwrap();
        ts.storage
            .insert_reward(run_id, 20 + step, step, 0.25 * step as f64, "action", "{}")
            .unwrap();
    }
    ts.storage.finish_episode(episode_id, 40, 3, Some(true), 0.75).unwrap();
    ts.storage.end_run(run_id, 50).unwrap();

    let reopened = ts.reopen();
    let run = reopened.get_run(run_id).unwrap().unwrap();
    assert_eq!(run.ended_ms, Some(50));
    assert_eq!(run.metadata_json, r#"{"driver":"e2e"}"#);

    let experiences = reopened.list_experiences(run_id).unwrap();
    assert_eq!(experiences.len(), 3);
    assert_eq!(experiences.iter().map(|e| e.step).collect::<Vec<_>>(), vec![0, 1, 2]);
    assert!(experiences[2].significant);
    assert!(experiences.iter().all(|e| e.episode_id == Some(episode_id)));

    let rewards = reopened.list_rewards(run_id).unwrap();
    assert_eq!(rewards.iter().map(|r| r.reward).collect::<Vec<_>>(), vec![0.0, 0.25, 0.5]);

    let episode = reopened.get_episode(episode_id).unwrap().unwrap();
    assert_eq!(episode.end_ms, Some(40));
    assert_eq!(episode.steps, 3);
    assert_eq!(episode.success, Some(true));
}

#[test]
fn test_summary_counts_finished_episodes() {
    let ts = TestStore::new_temp();
    let run_id = ts.begin_run();

    let won = ts.storage.start_episode(run_id, "episode-0", 0).unwrap();
    ts.storage.finish_episode(won, 10, 5, Some(true), 2.0).unwrap();
    let lost = ts.storage.start_episode(run_id, "episode-1", 10).unwrap();
    ts.storage.finish_episode(lost, 20, 4, Some(false), -1.5).unwrap();
    let empty = ts.storage.start_episode(run_id, "episode-2", 20).unwrap();
    ts.storage.finish_episode(empty, 30, 0, None, 0.0).unwrap();
    // still open, not counted
    ts.storage.start_episode(run_id, "episode-3", 30).unwrap();

    let summary = ts.storage.get_run_summary(run_id).unwrap();
    assert_eq!(summary.finished_episodes, 3);
    assert_eq!(summary.successes, 1);
    assert_eq!(summary.failures, 2);
    assert_eq!(summary.successes + summary.failures, summary.finished_episodes);
    assert!((summary.total_return - 0.5).abs() < 1e-12);
    assert_eq!(summary.total_steps, 9);
}

#[test]
fn test_closing_episode_twice_keeps_first_end() {
    let ts = TestStore::new_temp();
    let run_id = ts.begin_run();
    let episode_id = ts.storage.start_episode(run_id, "episode-0", 0).unwrap();
    ts.storage.end_episode(episode_id, 10).unwrap();
    ts.storage.end_episode(episode_id, 99).unwrap();
    assert_eq!(ts.storage.get_episode(episode_id).unwrap().unwrap().end_ms, Some(10));

    let missing = ts.storage.end_episode(episode_id + 100, 5).unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);
}

#[test]
fn test_unknown_run_is_a_constraint_violation() {
    let ts = TestStore::new_temp();
    let err = ts.storage.insert_reward(4242, 0, 0, 1.0, "action", "{}").unwrap_err();
    assert!(matches!(err, StorageError::ConstraintViolation(_)), "got {:?}", err);
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
}

#[test]
fn test_schema_is_current_on_fresh_and_reopened_store() {
    let ts = TestStore::new_temp();
    assert_eq!(ts.storage.schema_version().unwrap(), LATEST_VERSION);
    assert_eq!(ts.reopen().schema_version().unwrap(), LATEST_VERSION);
}

#[test]
fn test_read_only_handle_lists_but_refuses_writes() {
    let ts = TestStore::new_temp();
    let run_id = ts.begin_run();

    let ro = Storage::open_read_only(ts.path()).unwrap();
    assert!(ro.is_read_only());
    let runs = ro.list_runs(10).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].id, run_id);

    let err = ro.begin_run(0, "{}").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
}

#[test]
fn test_engine_run_lifecycle_is_persisted() {
    let ts = TestStore::new_temp();
    let mut engine = ts.start_engine(config_with_mode(ReasonerMode::On));
    let run_id = engine.run_id();

    engine.on_step_begin(0, ts.now()).unwrap();
    let ids = engine.submit_options(&[option("go", 0.5, 0.0)], Some(0)).unwrap();
    engine.apply_option_result(ids[0], "go", 1.0, ts.now()).unwrap();
    ts.advance(10);
    engine.on_episode_end(0, 0.0, 1.0).unwrap();

    // the next episode is left empty and counts as a failure
    ts.advance(10);
    let summary = engine.end_run().unwrap();
    assert!(engine.is_ended());
    assert_eq!(summary.finished_episodes, 2);
    assert_eq!(summary.successes, 1);
    assert_eq!(summary.failures, 1);

    // idempotent
    let again = engine.end_run().unwrap();
    assert_eq!(again, summary);
    assert!(engine.on_step_begin(1, ts.now()).is_err());

    let reopened = ts.reopen();
    assert!(reopened.get_run(run_id).unwrap().unwrap().ended_ms.is_some());
    let events = reopened.list_run_events(run_id).unwrap();
    assert_eq!(events.first().unwrap().kind, RunEventKind::Start.as_str());
    let last = events.last().unwrap();
    assert_eq!(last.kind, RunEventKind::Exit.as_str());
    assert_eq!(last.exit_code, Some(0));
    assert_eq!(events.iter().filter(|e| e.kind == "exit").count(), 1);

    let metadata: serde_json::Value =
        serde_json::from_str(&reopened.get_run(run_id).unwrap().unwrap().metadata_json).unwrap();
    assert_eq!(metadata["driver"], "e2e");
    assert!(metadata.get("instance_id").is_some());
}

#[test]
fn test_each_start_gets_a_fresh_run() {
    let ts = TestStore::new_temp();
    let first = ts.start_engine(config_with_mode(ReasonerMode::Off)).run_id();
    ts.advance(1);
    let second = ts.start_engine(config_with_mode(ReasonerMode::Off)).run_id();
    assert_ne!(first, second);

    let runs = ts.storage.list_runs(10).unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].id, second);
}
