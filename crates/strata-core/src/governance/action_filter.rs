//! Action filter
//!
//! Final gate for external actions. [`check`] is pure; [`ActionFilter`]
//! records every attempt, allowed or not.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::CoreResult;
use crate::storage::Storage;

use super::envelope::EnvelopeDecision;
use super::ethics::EthicsDecision;

/// Closed set of external actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Click,
    ScrollUp,
    ScrollDown,
    TypeText,
    KeyPress,
    CursorMove,
}

impl ActionKind {
    pub const ALL: [ActionKind; 6] = [
        Self::Click,
        Self::ScrollUp,
        Self::ScrollDown,
        Self::TypeText,
        Self::KeyPress,
        Self::CursorMove,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::ScrollUp => "scroll_up",
            Self::ScrollDown => "scroll_down",
            Self::TypeText => "type_text",
            Self::KeyPress => "key_press",
            Self::CursorMove => "cursor_move",
        }
    }

    /// Actions that interact with page content
    pub fn is_web(&self) -> bool {
        matches!(self, Self::Click | Self::TypeText | Self::KeyPress)
    }

    /// Actions that write input
    pub fn is_write(&self) -> bool {
        matches!(self, Self::TypeText | Self::KeyPress)
    }
}

impl std::str::FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown action kind: {}", s))
    }
}

/// Gate verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionVerdict {
    pub allow: bool,
    /// Empty only for a plain allow
    pub reason: String,
}

impl ActionVerdict {
    fn allow(reason: &str) -> Self {
        Self {
            allow: true,
            reason: reason.to_string(),
        }
    }

    fn deny(reason: &str) -> Self {
        Self {
            allow: false,
            reason: reason.to_string(),
        }
    }
}

/// Decide whether an action may run
pub fn check(
    kind: ActionKind,
    web_actions_enabled: bool,
    ethics: Option<EthicsDecision>,
    envelope: EnvelopeDecision,
    simulate_blocked: u32,
) -> ActionVerdict {
    if simulate_blocked > 0 {
        return ActionVerdict::deny("simulated_block");
    }
    if kind.is_web() && !web_actions_enabled {
        return ActionVerdict::deny("no_web_actions");
    }
    let mut caution = None;
    match ethics {
        Some(EthicsDecision::Deny) => return ActionVerdict::deny("phase15_deny"),
        Some(EthicsDecision::Review) if kind.is_write() => {
            return ActionVerdict::deny("phase15_review_write");
        }
        Some(EthicsDecision::Review) => caution = Some("phase15_review"),
        Some(EthicsDecision::Allow) | None => {}
    }
    match envelope {
        EnvelopeDecision::Freeze => return ActionVerdict::deny("phase13_freeze"),
        EnvelopeDecision::Tighten => caution = caution.or(Some("phase13_tighten")),
        EnvelopeDecision::Hold | EnvelopeDecision::Expand => {}
    }
    ActionVerdict::allow(caution.unwrap_or(""))
}

/// Stateful wrapper that persists every attempt
pub struct ActionFilter {
    store: Arc<Storage>,
    run_id: i64,
    web_actions_enabled: bool,
    simulate_blocked: u32,
}

impl ActionFilter {
    pub fn new(store: Arc<Storage>, run_id: i64, web_actions_enabled: bool, simulate_blocked: u32) -> Self {
        Self {
            store,
            run_id,
            web_actions_enabled,
            simulate_blocked,
        }
    }

    /// Check and record one attempted action
    pub fn check_and_record(
        &self,
        kind: ActionKind,
        ethics: Option<EthicsDecision>,
        envelope: EnvelopeDecision,
        step: i64,
        ts_ms: i64,
    ) -> CoreResult<ActionVerdict> {
        let verdict = check(kind, self.web_actions_enabled, ethics, envelope, self.simulate_blocked);
        let payload = json!({
            "kind": kind.as_str(),
            "reason": verdict.reason,
            "ethics": ethics.map(|e| e.as_str()),
            "envelope": envelope.as_str(),
            "web_actions_enabled": self.web_actions_enabled,
        })
        .to_string();
        self.store.insert_action(
            self.run_id,
            ts_ms,
            step,
            kind.as_str(),
            verdict.allow,
            &verdict.reason,
            &payload,
        )?;
        if !verdict.allow {
            tracing::debug!(run_id = self.run_id, step, kind = kind.as_str(), reason = %verdict.reason, "action denied");
        }
        Ok(verdict)
    }
}
