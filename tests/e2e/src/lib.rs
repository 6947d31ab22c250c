//! End-to-end test support for the strata engine
//!
//! - [`harness`]: temporary stores with a manual clock
//! - [`mocks`]: scripted environments and ready-made options/configs

pub mod harness;
pub mod mocks;
