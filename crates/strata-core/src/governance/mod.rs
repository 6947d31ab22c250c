//! Governance layers (Phases 10 to 15 and the action gate)
//!
//! Phases 10 to 15 observe each metacognition row through
//! [`MetacogObserver`](crate::cognition::MetacogObserver); the engine passes
//! them in the order explanation, revision, consistency, envelope,
//! meta-reasoner, ethics.

pub mod action_filter;
pub mod consistency;
pub mod envelope;
pub mod ethics;
pub mod explanation;
pub mod meta_reasoner;
pub mod revision;

pub use action_filter::{check, ActionFilter, ActionKind, ActionVerdict};
pub use consistency::Consistency;
pub use envelope::{AutonomyEnvelope, AutonomyTier, EnvelopeDecision, EnvelopeState};
pub use ethics::{EthicsDecision, EthicsRegulator, EthicsVerdict, ProposalReview};
pub use explanation::{ExplanationDriver, SelfExplanation};
pub use meta_reasoner::{CalibrationStatus, MetaReasoner, MetaVerdict};
pub use revision::{RevisionOutcome, SelfRevision};
