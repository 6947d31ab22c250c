//! Step loop
//!
//! Drives an [`Environment`] through the [`Engine`] one step at a time. Each
//! step runs to completion under `catch_unwind`; stage errors and panics turn
//! into `warning` run events and the loop carries on with the next step.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use serde_json::{json, Value};

use crate::cognition::CandidateOption;
use crate::engine::Engine;
use crate::error::{CoreError, CoreResult};
use crate::feeds::FeedQueue;
use crate::governance::ActionKind;
use crate::shutdown::AbortFlag;
use crate::storage::{RunEventKind, RunSummary};

/// Feed samples taken per step
const FEED_BATCH: usize = 64;

/// What the environment reports for the chosen option
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutcome {
    pub reward: f64,
    /// Ends the current episode
    pub terminal: bool,
    /// External actions the environment wants to take this step
    pub actions: Vec<ActionKind>,
    pub observation: Value,
}

/// External collaborator driven by the step loop
pub trait Environment {
    /// Candidate options for this step; empty skips the decision stages
    fn options(&mut self, step: i64) -> Vec<CandidateOption>;

    /// Option the driver would pick on its own
    fn preferred(&mut self, _step: i64, _options: &[CandidateOption]) -> Option<usize> {
        None
    }

    /// Result of acting on `chosen`
    fn outcome(&mut self, step: i64, chosen: &CandidateOption) -> StepOutcome;
}

/// Final report of [`StepLoop::run`]
#[derive(Debug, Clone, PartialEq)]
pub struct LoopReport {
    pub steps: u64,
    pub aborted: bool,
    /// Abort reason, if any
    pub reason: Option<String>,
    pub summary: RunSummary,
    /// Steps that ended in an error or panic
    pub stage_failures: u64,
    pub budget_overruns: u64,
    /// Predictions resolved while draining after an abort
    pub drained_resolutions: u64,
}

/// Single-threaded cooperative loop over one run
pub struct StepLoop<E: Environment> {
    engine: Engine,
    env: E,
    abort: AbortFlag,
    feeds: Option<FeedQueue>,
}

impl<E: Environment> StepLoop<E> {
    pub fn new(engine: Engine, env: E, abort: AbortFlag) -> Self {
        Self {
            engine,
            env,
            abort,
            feeds: None,
        }
    }

    /// Attach a feed queue drained at every step boundary
    pub fn with_feeds(mut self, feeds: FeedQueue) -> Self {
        self.feeds = Some(feeds);
        self
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn environment(&self) -> &E {
        &self.env
    }

    /// Run until `max_steps` or an abort request, then close the run
    pub fn run(&mut self) -> CoreResult<LoopReport> {
        let max_steps = self.engine.config().max_steps;
        let step_ms = self.engine.config().step_ms;
        let budget_ms = self.engine.config().step_budget_ms;
        let heartbeat_every = self.engine.config().heartbeat_every;

        let mut steps: u64 = 0;
        let mut stage_failures: u64 = 0;
        let mut budget_overruns: u64 = 0;

        tracing::info!(run_id = self.engine.run_id(), ?max_steps, step_ms, "step loop started");

        loop {
            if self.abort.is_set() {
                break;
            }
            if max_steps.is_some_and(|max| steps >= max) {
                break;
            }

            let step = steps as i64;
            let started = self.engine.clock().now_ms();
            let result = panic::catch_unwind(AssertUnwindSafe(|| self.run_step(step)));
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    stage_failures += 1;
                    let stage = self.engine.current_stage();
                    tracing::warn!(step, stage, "step failed: {}", e);
                    self.engine
                        .record_run_event(RunEventKind::Warning, &format!("{}: {}", stage, e));
                }
                Err(payload) => {
                    stage_failures += 1;
                    let stage = self.engine.current_stage();
                    let message = panic_message(payload.as_ref());
                    tracing::error!(step, stage, "stage panicked: {}", message);
                    self.engine
                        .record_run_event(RunEventKind::Warning, &format!("{}: panic: {}", stage, message));
                }
            }
            if self.engine.is_ended() {
                break;
            }

            let elapsed_ms = self.engine.clock().now_ms() - started;
            if elapsed_ms > budget_ms {
                budget_overruns += 1;
                let err = CoreError::BudgetExceeded { elapsed_ms, budget_ms };
                self.engine.record_run_event(RunEventKind::Warning, &err.to_string());
            }

            steps += 1;
            if heartbeat_every > 0 && steps % heartbeat_every == 0 {
                self.engine
                    .record_run_event_with(RunEventKind::Heartbeat, &format!("step {}", step), None, rss_mb());
            }

            self.engine.clock().sleep_ms(step_ms);
        }

        let aborted = self.abort.is_set();
        let reason = self.abort.reason().map(str::to_string);
        let mut drained_resolutions = 0;
        let ended = if aborted {
            let reason = reason.as_deref().unwrap_or("abort");
            drained_resolutions = self.drain_predictions();
            self.engine.end_run_with(RunEventKind::Signal, reason)
        } else {
            self.engine.end_run()
        };
        let summary = match ended {
            Ok(summary) => summary,
            Err(e) => {
                let stage = self.engine.current_stage();
                self.engine.fail_run(&format!("{}: {}", stage, e));
                return Err(e);
            }
        };

        tracing::info!(
            run_id = self.engine.run_id(),
            steps,
            aborted,
            stage_failures,
            budget_overruns,
            "step loop finished"
        );
        Ok(LoopReport {
            steps,
            aborted,
            reason,
            summary,
            stage_failures,
            budget_overruns,
            drained_resolutions,
        })
    }

    fn run_step(&mut self, step: i64) -> CoreResult<()> {
        let engine = &mut self.engine;
        let now = engine.clock().now_ms();
        engine.on_step_begin(step, now)?;

        if let Some(feeds) = self.feeds.as_mut() {
            let samples = feeds.drain(FEED_BATCH);
            engine.ingest_feed(&samples)?;
        }

        let label = engine.config().context.step_label.clone();
        engine.sample_peers(&label);

        let mut actions = Vec::new();
        let options = self.env.options(step);
        if !options.is_empty() {
            let preferred = self.env.preferred(step, &options);
            let score = engine.score_options(&options);
            let selected = engine
                .resolve_selection(&score, preferred)
                .filter(|&i| i < options.len());
            let ids = engine.submit_options(&options, selected)?;

            if let Some(i) = selected {
                let chosen = &options[i];
                let outcome = self.env.outcome(step, chosen);
                let ts = engine.now_ms();
                engine.apply_option_result(ids[i], &chosen.key, outcome.reward, ts)?;
                engine.record_experience(
                    "step",
                    &json!({
                        "option": chosen.key,
                        "confidence": chosen.confidence,
                        "score": score.scores.get(i),
                    }),
                    &json!({ "reward": outcome.reward, "observation": outcome.observation }),
                    outcome.terminal,
                )?;

                if outcome.terminal {
                    let episode = engine.current_episode();
                    let contradiction_rate = engine
                        .store()
                        .get_episode_contradiction_rate(engine.run_id(), episode.id)?;
                    engine.on_episode_end(episode.index, contradiction_rate, episode.avg_reward())?;
                }
                actions = outcome.actions;
            }
        }

        let valence = engine.reasoner().affect().valence;
        let motivation = (0.5 + 0.5 * valence).clamp(0.0, 1.0);
        let coherence = engine.goal_coherence();
        engine.update_motivation(motivation, coherence, "step")?;

        for kind in actions {
            engine.check_action(kind)?;
        }
        Ok(())
    }

    /// Resolve predictions falling due inside the drain window
    fn drain_predictions(&mut self) -> u64 {
        let clock = std::sync::Arc::clone(self.engine.clock());
        let deadline = clock.now_ms().saturating_add(self.engine.config().drain_window_ms());
        let mut resolved = 0;

        while let Some(due) = self.engine.next_prediction_due_ms() {
            if due > deadline {
                break;
            }
            let now = clock.now_ms();
            if due > now {
                clock.sleep_ms((due - now) as u64);
            }
            match self.engine.resolve_pending("drain") {
                Ok(Some(_)) => resolved += 1,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(run_id = self.engine.run_id(), "drain stopped: {}", e);
                    self.engine
                        .record_run_event(RunEventKind::Warning, &format!("drain: {}", e));
                    break;
                }
            }
        }
        if self.engine.metacognition().pending_len() > 0 {
            tracing::info!(
                pending = self.engine.metacognition().pending_len(),
                "predictions left unresolved at shutdown"
            );
        }
        resolved
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Resident set size from `/proc/self/statm`
fn rss_mb() -> Option<f64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let resident: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some((resident * 4096) as f64 / (1024.0 * 1024.0))
}
