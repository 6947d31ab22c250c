//! Fixtures and scripted collaborators

mod fixtures;

pub use fixtures::{
    config_with_mode, fast_narrative_config, option, two_options, ScriptedEnvironment, ScriptedStep,
};
