//! Engine
//!
//! Owns one run: the store handle, the clock, the context service, the self
//! model and every stage. The methods are the step-loop driver API and must be
//! called in stage order within a step; reads of later stages (coherence,
//! self-trust, envelope state) therefore see the previous step's values.

use std::sync::Arc;

use serde_json::{json, Value};
use uuid::Uuid;

use crate::clock::Clock;
use crate::cognition::{
    CandidateOption, EpisodeMetrics, GoalSystem, MetacogObserver, MetacogResolution, Metacognition,
    MotivationUpdate, OptionOutcome, ReasonScore, Reasoner, ReasonerInputs, ReflectionOutcome,
};
use crate::config::RuntimeConfig;
use crate::context::{ContextService, PeerSample, RawSource};
use crate::error::{CoreError, CoreResult, ErrorKind};
use crate::feeds::FeedSample;
use crate::governance::{
    ActionFilter, ActionKind, ActionVerdict, AutonomyEnvelope, Consistency, EthicsRegulator, MetaReasoner,
    SelfExplanation, SelfRevision,
};
use crate::self_model::SelfModel;
use crate::storage::{NewContextPeerLog, RunEventKind, RunSummary, Storage};
use crate::telemetry::TelemetrySink;

/// Where the current step is, handed back by [`Engine::on_step_begin`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepContext {
    pub step: i64,
    pub ts_ms: i64,
    pub episode_index: i64,
    pub episode_id: i64,
}

/// Counters of the open episode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeInfo {
    pub id: i64,
    pub index: i64,
    pub steps: i64,
    pub episode_return: f64,
    /// Applied option rewards
    pub rewards: i64,
}

impl EpisodeInfo {
    fn open(id: i64, index: i64) -> Self {
        Self {
            id,
            index,
            steps: 0,
            episode_return: 0.0,
            rewards: 0,
        }
    }

    /// Mean applied reward, zero when nothing was applied
    pub fn avg_reward(&self) -> f64 {
        if self.rewards == 0 {
            0.0
        } else {
            self.episode_return / self.rewards as f64
        }
    }
}

/// What closing an episode produced
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeEnd {
    pub closed: EpisodeInfo,
    pub reflection: Option<ReflectionOutcome>,
    pub next_episode_id: i64,
}

/// What one motivation update produced
#[derive(Debug)]
pub struct MotivationOutcome {
    pub update: MotivationUpdate,
    pub resolution: Option<MetacogResolution>,
}

/// One run of the staged cognition engine
pub struct Engine {
    store: Arc<Storage>,
    clock: Arc<dyn Clock>,
    config: RuntimeConfig,
    run_id: i64,
    context: Arc<ContextService>,
    self_model: SelfModel,
    reasoner: Reasoner,
    goals: GoalSystem,
    metacog: Metacognition,
    explanation: SelfExplanation,
    revision: SelfRevision,
    consistency: Consistency,
    envelope: AutonomyEnvelope,
    meta_reasoner: MetaReasoner,
    ethics: EthicsRegulator,
    actions: ActionFilter,
    telemetry: TelemetrySink,
    episode: EpisodeInfo,
    step: Option<i64>,
    last_ts: i64,
    last_motivation: f64,
    stage: &'static str,
    ended: bool,
}

impl Engine {
    /// Begin a run and bring every stage up
    ///
    /// Fails only when the configuration is invalid or the store cannot begin
    /// the run; everything later degrades to warnings.
    pub fn start_run(
        store: Arc<Storage>,
        clock: Arc<dyn Clock>,
        config: RuntimeConfig,
        meta: &Value,
        telemetry: TelemetrySink,
        raw_source: Box<dyn RawSource>,
    ) -> CoreResult<Engine> {
        config.validate()?;

        let now = clock.now_ms();
        let mut metadata = match meta {
            Value::Object(_) => meta.clone(),
            Value::Null => json!({}),
            other => json!({ "meta": other }),
        };
        metadata["instance_id"] = json!(Uuid::new_v4().to_string());
        metadata["engine_version"] = json!(env!("CARGO_PKG_VERSION"));
        metadata["reasoner_mode"] = json!(config.reasoner.mode.as_str());

        let run_id = store.begin_run(now, &metadata.to_string())?;
        let opened = store
            .insert_run_event(run_id, now, 0, RunEventKind::Start, "run started", None, None, None)
            .and_then(|_| store.start_episode(run_id, "episode-0", now));
        let episode_id = match opened {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(run_id, "run could not start: {}", e);
                if let Err(fatal) = store.record_fatal(run_id, now, 0, &format!("start: {}", e)) {
                    tracing::error!(run_id, "fatal event not recorded: {}", fatal);
                }
                return Err(e.into());
            }
        };
        tracing::info!(run_id, db = %store.path().display(), "run started");

        let context = Arc::new(ContextService::from_config(Arc::clone(&clock), raw_source, &config.context));

        let mut self_model = SelfModel::new(Arc::clone(&store));
        if let Err(e) = self_model.load_for_run(run_id) {
            tracing::warn!(run_id, "self model not loaded: {}", e);
            let _ = store.insert_run_event(
                run_id,
                now,
                0,
                RunEventKind::Warning,
                &format!("self_model: {}", e),
                None,
                None,
                None,
            );
        }

        let mut reasoner = Reasoner::new(
            Arc::clone(&store),
            run_id,
            config.reasoner.clone(),
            config.reflection.clone(),
        );
        reasoner.set_episode(episode_id);
        let goals = GoalSystem::new(Arc::clone(&store), run_id, config.goals.clone());
        let metacog = Metacognition::new(Arc::clone(&store), run_id, config.metacognition.clone());
        let explanation = SelfExplanation::new(Arc::clone(&store), run_id);
        let revision = SelfRevision::new(
            Arc::clone(&store),
            run_id,
            config.self_revision.clone(),
            self_model.risk_tolerance(),
        );
        let consistency = Consistency::new(Arc::clone(&store), run_id, config.consistency.clone());
        let envelope = AutonomyEnvelope::new(Arc::clone(&store), run_id, config.envelope.clone());
        let meta_reasoner = MetaReasoner::new(Arc::clone(&store), run_id, config.meta_reasoner.clone());
        let ethics = EthicsRegulator::new(
            Arc::clone(&store),
            run_id,
            config.ethics.clone(),
            Arc::clone(&context),
        );
        let actions = ActionFilter::new(
            Arc::clone(&store),
            run_id,
            config.actions.web_actions_enabled,
            config.actions.simulate_blocked,
        );

        telemetry.emit("run", "start", Some(0), None, &metadata);

        Ok(Engine {
            store,
            clock,
            config,
            run_id,
            context,
            self_model,
            reasoner,
            goals,
            metacog,
            explanation,
            revision,
            consistency,
            envelope,
            meta_reasoner,
            ethics,
            actions,
            telemetry,
            episode: EpisodeInfo::open(episode_id, 0),
            step: None,
            last_ts: now,
            last_motivation: 0.5,
            stage: "engine",
            ended: false,
        })
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    pub fn store(&self) -> &Arc<Storage> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn context(&self) -> &Arc<ContextService> {
        &self.context
    }

    pub fn self_model(&self) -> &SelfModel {
        &self.self_model
    }

    pub fn reasoner(&self) -> &Reasoner {
        &self.reasoner
    }

    pub fn goals(&self) -> &GoalSystem {
        &self.goals
    }

    pub fn metacognition(&self) -> &Metacognition {
        &self.metacog
    }

    pub fn envelope(&self) -> &AutonomyEnvelope {
        &self.envelope
    }

    pub fn ethics(&self) -> &EthicsRegulator {
        &self.ethics
    }

    pub fn telemetry(&self) -> &TelemetrySink {
        &self.telemetry
    }

    /// Component that was running when the last call started
    pub fn current_stage(&self) -> &'static str {
        self.stage
    }

    /// Last step passed to [`on_step_begin`](Self::on_step_begin)
    pub fn current_step(&self) -> Option<i64> {
        self.step
    }

    pub fn current_episode(&self) -> EpisodeInfo {
        self.episode
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Clock time, never earlier than the last step timestamp
    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms().max(self.last_ts)
    }

    fn step_or_zero(&self) -> i64 {
        self.step.unwrap_or(0)
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.ended {
            return Err(CoreError::stage("engine", ErrorKind::Preempted, "run already ended"));
        }
        Ok(())
    }

    // ========================================================================
    // STEP API
    // ========================================================================

    /// Start a step. Step indices must strictly increase.
    pub fn on_step_begin(&mut self, step: i64, ts_ms: i64) -> CoreResult<StepContext> {
        self.ensure_open()?;
        self.stage = "engine";
        if let Some(prev) = self.step {
            if step <= prev {
                return Err(CoreError::stage(
                    "engine",
                    ErrorKind::ConstraintViolation,
                    format!("step {} does not follow {}", step, prev),
                ));
            }
        }
        let ts_ms = if ts_ms < self.last_ts {
            tracing::warn!(step, ts_ms, last = self.last_ts, "timestamp went backwards, clamped");
            self.last_ts
        } else {
            ts_ms
        };
        self.step = Some(step);
        self.last_ts = ts_ms;
        self.episode.steps += 1;

        Ok(StepContext {
            step,
            ts_ms,
            episode_index: self.episode.index,
            episode_id: self.episode.id,
        })
    }

    /// Sample every registered peer and log each sample
    pub fn sample_peers(&mut self, label: &str) -> Vec<PeerSample> {
        self.stage = "context";
        let now = self.now_ms();
        let mut out = Vec::new();
        for peer in self.context.list_context_peers() {
            let sample = self.context.sample_context_peer_detailed(&peer, label);
            let row = NewContextPeerLog {
                ts_ms: now,
                peer: sample.peer.clone(),
                sample: sample.value,
                gain: sample.params.gain,
                update_ms: sample.params.update_ms,
                window: sample.params.window as i64,
                label: label.to_string(),
                mode: sample.mode.as_str().to_string(),
                lambda: sample.lambda,
                kappa: sample.kappa,
            };
            if let Err(e) = self.store.insert_context_peer_log(self.run_id, &row) {
                tracing::warn!(run_id = self.run_id, peer = %peer, "peer sample not recorded: {}", e);
            }
            out.push(sample);
        }
        out
    }

    /// Persist candidate options
    pub fn submit_options(&mut self, options: &[CandidateOption], selected: Option<usize>) -> CoreResult<Vec<i64>> {
        self.ensure_open()?;
        self.stage = "phase6";
        let now = self.now_ms();
        let step = self.step_or_zero();
        self.reasoner.register_options(options, step, now, selected)
    }

    /// Inputs the reasoner reads from other stages
    pub fn reasoner_inputs(&self) -> ReasonerInputs {
        ReasonerInputs {
            coherence: self.goals.last_coherence(),
            self_trust: self.metacog.get_self_trust(),
            personality_risk: self.self_model.risk_tolerance(),
            identity_confidence: self.self_model.identity_confidence(),
            ethics_hard_block: self.ethics.hard_block(),
            autonomy_score: self.envelope.autonomy_score(),
            context_modulation: self.context.peer_last(&self.config.reasoner.context_peer),
        }
    }

    /// Score options against the current posterior and governance state
    pub fn score_options(&mut self, options: &[CandidateOption]) -> ReasonScore {
        self.stage = "phase6";
        let now = self.now_ms();
        let inputs = self.reasoner_inputs();
        let score = self.reasoner.score_options(options, &inputs, now);
        self.telemetry.emit(
            "phase6",
            "score",
            Some(self.episode.index),
            self.step,
            &json!({
                "best_index": score.best_index,
                "best_score": score.best_score,
                "alpha": score.alpha,
                "exploration_bias": score.exploration_bias,
            }),
        );
        score
    }

    /// Choose between the driver's preference and the reasoner's pick
    pub fn resolve_selection(&self, score: &ReasonScore, driver_choice: Option<usize>) -> Option<usize> {
        if self.reasoner.mode().overrides() {
            score.best_index.or(driver_choice)
        } else {
            driver_choice.or(score.best_index)
        }
    }

    /// Apply an observed reward to an option and to the open episode
    pub fn apply_option_result(
        &mut self,
        option_id: i64,
        key: &str,
        reward: f64,
        ts_ms: i64,
    ) -> CoreResult<Option<OptionOutcome>> {
        self.ensure_open()?;
        self.stage = "phase6";
        let emit = self.reasoner.mode().logs();
        let Some(outcome) = self.reasoner.apply_option_result(option_id, key, reward, ts_ms, emit)? else {
            return Ok(None);
        };

        self.episode.episode_return += reward;
        self.episode.rewards += 1;
        let context = json!({ "option_id": option_id, "key": key }).to_string();
        if let Err(e) = self
            .store
            .insert_reward(self.run_id, ts_ms, self.step_or_zero(), reward, "action", &context)
        {
            tracing::warn!(run_id = self.run_id, option_id, "reward not recorded: {}", e);
        }
        self.telemetry.emit(
            "phase6",
            "outcome",
            Some(self.episode.index),
            self.step,
            &json!({
                "key": outcome.key,
                "reward": reward,
                "mean": outcome.mean,
                "n": outcome.n,
                "contradiction": outcome.contradiction,
            }),
        );
        Ok(Some(outcome))
    }

    /// Close the open episode, reflect on it and open the next one
    pub fn on_episode_end(
        &mut self,
        episode_index: i64,
        contradiction_rate: f64,
        avg_reward: f64,
    ) -> CoreResult<EpisodeEnd> {
        self.ensure_open()?;
        self.stage = "phase7";
        let now = self.now_ms();
        let closed = self.episode;

        if let Err(e) = self.store.finish_episode(
            closed.id,
            now,
            closed.steps,
            Some(closed.episode_return > 0.0),
            closed.episode_return,
        ) {
            tracing::warn!(run_id = self.run_id, episode_id = closed.id, "episode stats not recorded: {}", e);
        }

        let reflected = self.reflect_and_ingest(episode_index, contradiction_rate, avg_reward, closed.id, now);

        let next_index = closed.index + 1;
        let next_id = self
            .store
            .start_episode(self.run_id, &format!("episode-{}", next_index), now)?;
        self.episode = EpisodeInfo::open(next_id, next_index);
        self.reasoner.set_episode(next_id);
        tracing::debug!(run_id = self.run_id, episode_index = next_index, episode_id = next_id, "episode opened");

        Ok(EpisodeEnd {
            closed,
            reflection: reflected?,
            next_episode_id: next_id,
        })
    }

    fn reflect_and_ingest(
        &mut self,
        episode_index: i64,
        contradiction_rate: f64,
        avg_reward: f64,
        episode_id: i64,
        now: i64,
    ) -> CoreResult<Option<ReflectionOutcome>> {
        let metrics = EpisodeMetrics {
            episode_index,
            contradiction_rate,
            avg_reward,
        };
        let outcome = self.reasoner.on_episode_end(
            &metrics,
            self.self_model.identity().confidence,
            self.goals.last_coherence(),
            Some(episode_id),
            now,
        )?;
        let Some(outcome) = outcome else {
            return Ok(None);
        };

        self.stage = "phase8";
        let identity = self.self_model.identity_confidence();
        let reputation = self.self_model.reputation();
        self.goals.ingest_reflection(&outcome.reflection, identity, reputation)?;
        self.telemetry.emit(
            "phase7",
            "reflection",
            Some(episode_index),
            self.step,
            &json!({
                "id": outcome.reflection.id,
                "title": outcome.reflection.title,
                "impact": outcome.reflection.impact,
            }),
        );

        if let Some(narrative) = &outcome.narrative {
            self.goals.ingest_reflection(&narrative.summary, identity, reputation)?;
            self.stage = "phase9";
            self.metacog.register_narrative_prediction(&narrative.prediction, now)?;
        }
        Ok(Some(outcome))
    }

    /// Persist motivation, decay goals and resolve due predictions
    pub fn update_motivation(&mut self, motivation: f64, coherence: f64, notes: &str) -> CoreResult<MotivationOutcome> {
        self.ensure_open()?;
        self.stage = "phase8";
        let now = self.now_ms();
        let trust = self.metacog.get_self_trust();
        let update = self.goals.update_motivation_state(motivation, coherence, notes, trust, now);
        self.last_motivation = motivation;

        self.stage = "phase9";
        let resolution = self.resolve_with_observers(coherence, update.goal_shift, notes, now)?;
        Ok(MotivationOutcome { update, resolution })
    }

    fn resolve_with_observers(
        &mut self,
        coherence: f64,
        goal_shift: f64,
        notes: &str,
        now: i64,
    ) -> CoreResult<Option<MetacogResolution>> {
        let step = self.step_or_zero();
        let Self {
            metacog,
            explanation,
            revision,
            consistency,
            envelope,
            meta_reasoner,
            ethics,
            ..
        } = &mut *self;
        let mut observers: [&mut dyn MetacogObserver; 6] =
            [explanation, revision, consistency, envelope, meta_reasoner, ethics];
        let resolution = metacog.resolve_actuals(coherence, goal_shift, notes, step, now, &mut observers)?;

        if let Some(res) = &resolution {
            for (stage, err) in &res.failures {
                self.record_run_event(RunEventKind::Warning, &format!("{}: {}", stage, err));
            }
            self.telemetry.emit(
                "phase9",
                "resolve",
                Some(self.episode.index),
                self.step,
                &json!({
                    "metacognition_id": res.event.metacognition_id,
                    "self_trust": res.event.self_trust,
                    "narrative_rmse": res.event.narrative_rmse,
                    "resolved": res.event.resolved,
                    "tier": self.envelope.tier().as_str(),
                }),
            );
        }
        Ok(resolution)
    }

    /// Earliest due time among pending predictions
    pub fn next_prediction_due_ms(&self) -> Option<i64> {
        self.metacog.next_due_ms()
    }

    /// Resolve whatever is due using the latest motivation and coherence
    pub fn resolve_pending(&mut self, notes: &str) -> CoreResult<Option<MetacogResolution>> {
        let coherence = self.goals.last_coherence();
        let outcome = self.update_motivation(self.last_motivation, coherence, notes)?;
        Ok(outcome.resolution)
    }

    /// Current goal coherence including the envelope bonus
    pub fn goal_coherence(&self) -> f64 {
        self.goals.calculate_goal_coherence(self.envelope.valid_tier_index())
    }

    /// Gate an external action; every attempt is recorded
    pub fn check_action(&mut self, kind: ActionKind) -> CoreResult<ActionVerdict> {
        self.ensure_open()?;
        self.stage = "phase15";
        let now = self.now_ms();
        let ethics = match self.ethics.run_for_latest(kind.as_str(), now) {
            Ok(v) => Some(v.decision),
            Err(e) => {
                tracing::warn!(run_id = self.run_id, kind = kind.as_str(), "ethics unavailable: {}", e);
                self.ethics.last_decision()
            }
        };
        self.stage = "action_filter";
        let verdict = self.actions.check_and_record(
            kind,
            ethics,
            self.envelope.gate_decision(),
            self.step_or_zero(),
            now,
        )?;
        self.telemetry.emit(
            "action",
            "check",
            Some(self.episode.index),
            self.step,
            &json!({ "kind": kind.as_str(), "allow": verdict.allow, "reason": verdict.reason }),
        );
        Ok(verdict)
    }

    // ========================================================================
    // RECORDS
    // ========================================================================

    /// Append an experience to the open episode
    pub fn record_experience(&mut self, tag: &str, input: &Value, output: &Value, significant: bool) -> CoreResult<i64> {
        self.ensure_open()?;
        let now = self.now_ms();
        Ok(self.store.insert_experience(
            self.run_id,
            Some(self.episode.id),
            now,
            self.step_or_zero(),
            tag,
            &input.to_string(),
            &output.to_string(),
            significant,
        )?)
    }

    /// Append a reward that did not come from an option outcome
    pub fn record_reward(&mut self, reward: f64, source: &str, context: &Value) -> CoreResult<i64> {
        self.ensure_open()?;
        let now = self.now_ms();
        Ok(self
            .store
            .insert_reward(self.run_id, now, self.step_or_zero(), reward, source, &context.to_string())?)
    }

    /// Record drained feed samples as one experience
    pub fn ingest_feed(&mut self, samples: &[FeedSample]) -> CoreResult<Option<i64>> {
        if samples.is_empty() {
            return Ok(None);
        }
        let values: Vec<Value> = samples
            .iter()
            .map(|s| json!({ "stream": s.stream, "value": s.value }))
            .collect();
        let id = self.record_experience("feed", &json!({ "samples": values }), &Value::Null, false)?;
        Ok(Some(id))
    }

    /// Write a run event; failures are logged and swallowed
    pub fn record_run_event(&self, kind: RunEventKind, message: &str) -> Option<i64> {
        self.record_run_event_with(kind, message, None, None)
    }

    pub fn record_run_event_with(
        &self,
        kind: RunEventKind,
        message: &str,
        exit_code: Option<i64>,
        rss_mb: Option<f64>,
    ) -> Option<i64> {
        match self.store.insert_run_event(
            self.run_id,
            self.now_ms(),
            self.step_or_zero(),
            kind,
            message,
            exit_code,
            rss_mb,
            None,
        ) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(run_id = self.run_id, kind = kind.as_str(), "run event not recorded: {}", e);
                None
            }
        }
    }

    pub fn summary(&self) -> CoreResult<RunSummary> {
        Ok(self.store.get_run_summary(self.run_id)?)
    }

    // ========================================================================
    // SHUTDOWN
    // ========================================================================

    /// Close the open episode, write an exit event and stamp the run's end
    pub fn end_run(&mut self) -> CoreResult<RunSummary> {
        self.end_run_with(RunEventKind::Exit, "run complete")
    }

    /// Like [`end_run`](Self::end_run) with a chosen final event
    ///
    /// Calling it again after the run ended only returns the summary.
    pub fn end_run_with(&mut self, kind: RunEventKind, message: &str) -> CoreResult<RunSummary> {
        if self.ended {
            return self.summary();
        }
        self.stage = "engine";
        let now = self.now_ms();
        let ep = self.episode;
        let success = (ep.steps > 0).then_some(ep.episode_return > 0.0);
        if let Err(e) = self
            .store
            .finish_episode(ep.id, now, ep.steps, success, ep.episode_return)
        {
            tracing::warn!(run_id = self.run_id, episode_id = ep.id, "final episode not closed: {}", e);
        }

        let summary = self.summary()?;
        let detail = json!({
            "message": message,
            "summary": summary,
            "self_trust": self.metacog.get_self_trust(),
            "tier": self.envelope.tier().as_str(),
        });
        let exit_code = match kind {
            RunEventKind::Exit => Some(0),
            RunEventKind::Fatal => Some(1),
            _ => None,
        };
        self.record_run_event_with(kind, &detail.to_string(), exit_code, None);
        self.store.end_run(self.run_id, now)?;
        self.ended = true;

        self.telemetry.emit("run", "end", Some(ep.index), self.step, &detail);
        tracing::info!(
            run_id = self.run_id,
            kind = kind.as_str(),
            episodes = summary.finished_episodes,
            successes = summary.successes,
            "run ended"
        );
        Ok(summary)
    }

    /// Close the run after an unrecoverable error
    ///
    /// Every write is best effort. A run that already ended is left alone.
    pub fn fail_run(&mut self, message: &str) {
        if self.ended {
            return;
        }
        let now = self.now_ms();
        let ep = self.episode;
        let success = (ep.steps > 0).then_some(ep.episode_return > 0.0);
        if let Err(e) = self
            .store
            .finish_episode(ep.id, now, ep.steps, success, ep.episode_return)
        {
            tracing::warn!(run_id = self.run_id, episode_id = ep.id, "final episode not closed: {}", e);
        }
        if let Err(e) = self.store.record_fatal(self.run_id, now, self.step_or_zero(), message) {
            tracing::error!(run_id = self.run_id, "fatal event not recorded: {}", e);
        }
        self.ended = true;

        self.telemetry
            .emit("run", "fatal", Some(ep.index), self.step, &json!({ "message": message }));
        tracing::error!(run_id = self.run_id, stage = self.stage, "run failed: {}", message);
    }
}
