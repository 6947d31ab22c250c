//! Affective state (Phase 7a)
//!
//! Valence follows the sign of observed rewards with a saturating step;
//! arousal follows the magnitude of reward drift.

use serde::{Deserialize, Serialize};

/// Mixing coefficient for both channels
const AFFECT_RATE: f64 = 0.2;

/// Valence/arousal pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffectiveState {
    /// -1.0 (negative) to 1.0 (positive)
    pub valence: f64,
    /// 0.0 (calm) to 1.0 (agitated)
    pub arousal: f64,
}

impl Default for AffectiveState {
    fn default() -> Self {
        Self {
            valence: 0.0,
            arousal: 0.0,
        }
    }
}

impl AffectiveState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move valence toward the sign of `reward` and arousal toward `|drift|`
    ///
    /// `valence += k * r * (1 - valence * sign(r))` with `r = clamp(reward, -1, 1)`,
    /// so the step shrinks as valence approaches the bound on the reward's side.
    /// A zero drift leaves arousal untouched.
    pub fn update_from_reward(&mut self, reward: f64, drift: f64) {
        if reward.is_finite() && reward != 0.0 {
            let r = reward.clamp(-1.0, 1.0);
            self.valence += AFFECT_RATE * r * (1.0 - self.valence * r.signum());
            self.valence = self.valence.clamp(-1.0, 1.0);
        }

        if drift.is_finite() && drift != 0.0 {
            let target = drift.abs().min(1.0);
            self.arousal += AFFECT_RATE * (target - self.arousal);
            self.arousal = self.arousal.clamp(0.0, 1.0);
        }
    }
}
