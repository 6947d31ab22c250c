//! Decision and reflection layers (Phases 6 to 9)
//!
//! - [`reasoner`]: option scoring, posterior updates, contradiction intents
//! - [`affect`]: valence/arousal driven by episode rewards
//! - [`reflection`]: gated episode reflections and narrative summaries
//! - [`goals`]: goal graph, stability decay, coherence
//! - [`metacognition`]: narrative prediction resolution and self-trust

pub mod affect;
pub mod goals;
pub mod metacognition;
pub mod reasoner;
pub mod reflection;

pub use affect::AffectiveState;
pub use goals::{GoalIngest, GoalSystem, MotivationUpdate};
pub use metacognition::{
    MetacogEvent, MetacogObserver, MetacogResolution, Metacognition, PendingPrediction,
};
pub use reasoner::{
    CandidateOption, OptionOutcome, PosteriorEntry, ReasonScore, Reasoner, ReasonerInputs,
    ReasonerMode,
};
pub use reflection::{
    EpisodeMetrics, NarrativeOut, NarrativePredictionSpec, Reflection, ReflectionOutcome,
    ReflectionRecordOut, ReflectionView,
};
