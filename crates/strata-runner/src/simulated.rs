//! Seeded multi-armed bandit used as the default environment

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::json;

use strata_core::{ActionKind, CandidateOption, Environment, StepOutcome};

/// Stationary bandit with noisy rewards and fixed-length episodes
pub struct SimulatedEnvironment {
    rng: SmallRng,
    arm_means: Vec<f64>,
    noise: f64,
    episode_len: i64,
    epsilon: f64,
    action_rate: f64,
    in_episode: i64,
    estimates: Vec<(u64, f64)>,
}

impl SimulatedEnvironment {
    pub fn new(seed: u64, arms: usize, episode_len: i64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let arm_means = (0..arms.max(1)).map(|_| rng.gen_range(-0.5..0.8)).collect::<Vec<f64>>();
        let estimates = vec![(0, 0.0); arm_means.len()];
        Self {
            rng,
            arm_means,
            noise: 0.2,
            episode_len: episode_len.max(1),
            epsilon: 0.1,
            action_rate: 0.1,
            in_episode: 0,
            estimates,
        }
    }

    pub fn arm_means(&self) -> &[f64] {
        &self.arm_means
    }

    /// Index of the arm with the highest true mean
    pub fn best_arm(&self) -> usize {
        self.arm_means
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, &m)| if m > best.1 { (i, m) } else { best })
            .0
    }

    fn arm_index(key: &str) -> Option<usize> {
        key.strip_prefix("arm-")?.parse().ok()
    }
}

impl Environment for SimulatedEnvironment {
    fn options(&mut self, _step: i64) -> Vec<CandidateOption> {
        self.estimates
            .iter()
            .enumerate()
            .map(|(i, &(n, mean))| {
                let confidence = if n == 0 { 0.5 } else { (0.5 + 0.5 * mean).clamp(0.0, 1.0) };
                CandidateOption::new(format!("arm-{}", i), confidence, 0.1 * i as f64)
            })
            .collect()
    }

    /// Epsilon-greedy over the driver's own running means
    fn preferred(&mut self, _step: i64, options: &[CandidateOption]) -> Option<usize> {
        if options.is_empty() {
            return None;
        }
        if self.rng.gen_bool(self.epsilon) {
            return Some(self.rng.gen_range(0..options.len()));
        }
        options
            .iter()
            .enumerate()
            .filter_map(|(i, o)| Self::arm_index(&o.key).map(|arm| (i, self.estimates[arm].1)))
            .fold(None, |best: Option<(usize, f64)>, (i, m)| match best {
                Some((_, bm)) if bm >= m => best,
                _ => Some((i, m)),
            })
            .map(|(i, _)| i)
    }

    fn outcome(&mut self, _step: i64, chosen: &CandidateOption) -> StepOutcome {
        let arm = Self::arm_index(&chosen.key).unwrap_or(0).min(self.arm_means.len() - 1);
        let noise = self.rng.gen_range(-self.noise..=self.noise);
        let reward = (self.arm_means[arm] + noise).clamp(-1.0, 1.0);

        let (n, mean) = self.estimates[arm];
        let n = n + 1;
        self.estimates[arm] = (n, mean + (reward - mean) / n as f64);

        self.in_episode += 1;
        let terminal = self.in_episode >= self.episode_len;
        if terminal {
            self.in_episode = 0;
        }

        let mut actions = Vec::new();
        if self.rng.gen_bool(self.action_rate) {
            if let Some(kind) = ActionKind::ALL.choose(&mut self.rng) {
                actions.push(*kind);
            }
        }

        StepOutcome {
            reward,
            terminal,
            actions,
            observation: json!({ "arm": arm, "reward": reward }),
        }
    }
}
