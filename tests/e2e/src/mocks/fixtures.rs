//! Test Data Factory
//!
//! Ready-made options and configurations, plus a scripted environment that
//! replays a fixed list of outcomes through the step loop.

use std::collections::VecDeque;

use serde_json::json;
use strata_core::{ActionKind, CandidateOption, Environment, ReasonerMode, RuntimeConfig, StepOutcome};

/// Option with the default "driver" source
pub fn option(key: &str, confidence: f64, complexity: f64) -> CandidateOption {
    CandidateOption::new(key, confidence, complexity)
}

/// `a` and `b`, equal confidence, no complexity
pub fn two_options() -> Vec<CandidateOption> {
    vec![option("a", 0.5, 0.0), option("b", 0.5, 0.0)]
}

/// Default config with a chosen reasoner mode and no step sleep
pub fn config_with_mode(mode: ReasonerMode) -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.reasoner.mode = mode;
    config.step_ms = 0;
    config
}

/// Reflect after every episode and write a narrative each time
pub fn fast_narrative_config() -> RuntimeConfig {
    let mut config = config_with_mode(ReasonerMode::On);
    config.reflection.min_gap = 1;
    config.reflection.trigger_threshold = 0.0;
    config.reflection.narrative_every = 1;
    config
}

/// One scripted outcome
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedStep {
    pub reward: f64,
    pub terminal: bool,
    pub actions: Vec<ActionKind>,
}

impl ScriptedStep {
    pub fn reward(reward: f64) -> Self {
        Self {
            reward,
            terminal: false,
            actions: Vec::new(),
        }
    }

    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    pub fn with_action(mut self, kind: ActionKind) -> Self {
        self.actions.push(kind);
        self
    }
}

/// Environment replaying scripted outcomes, then repeating the last one
///
/// Always offers the same options and prefers `preferred` when set.
pub struct ScriptedEnvironment {
    options: Vec<CandidateOption>,
    preferred: Option<usize>,
    script: VecDeque<ScriptedStep>,
    last: ScriptedStep,
    /// Option keys chosen so far, in step order
    pub chosen: Vec<String>,
}

impl ScriptedEnvironment {
    pub fn new(options: Vec<CandidateOption>, script: Vec<ScriptedStep>) -> Self {
        Self {
            options,
            preferred: None,
            script: script.into(),
            last: ScriptedStep::reward(0.0),
            chosen: Vec::new(),
        }
    }

    /// Rewards only; every `episode_len`-th outcome ends an episode
    pub fn episodes(options: Vec<CandidateOption>, rewards: &[f64], episode_len: usize) -> Self {
        let len = episode_len.max(1);
        let script = rewards
            .iter()
            .enumerate()
            .map(|(i, &r)| {
                let step = ScriptedStep::reward(r);
                if (i + 1) % len == 0 { step.terminal() } else { step }
            })
            .collect();
        Self::new(options, script)
    }

    pub fn prefer(mut self, index: usize) -> Self {
        self.preferred = Some(index);
        self
    }
}

impl Environment for ScriptedEnvironment {
    fn options(&mut self, _step: i64) -> Vec<CandidateOption> {
        self.options.clone()
    }

    fn preferred(&mut self, _step: i64, _options: &[CandidateOption]) -> Option<usize> {
        self.preferred
    }

    fn outcome(&mut self, step: i64, chosen: &CandidateOption) -> StepOutcome {
        let next = self.script.pop_front().unwrap_or_else(|| self.last.clone());
        self.last = next.clone();
        self.chosen.push(chosen.key.clone());
        StepOutcome {
            reward: next.reward,
            terminal: next.terminal,
            actions: next.actions,
            observation: json!({ "step": step, "key": chosen.key }),
        }
    }
}
