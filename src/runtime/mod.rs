//! Runtime Module - recipe execution
//!
//! - `baker`: the sequential bake loop and its single-run guard
//! - `kitchen`: recipe + environment + log behind one shareable handle
//!
//! This module represents the "how". For the recipe model, see `ast`.

mod baker;
mod kitchen;

pub use baker::{BakeOutcome, BakeReport, Baker, RunGuard};
pub use kitchen::Kitchen;
