//! AST Module - recipes and recipe documents
//!
//! - `recipe`: Recipe, RecipeStep, Placement (the editable, ordered step list)
//! - `file`: RecipeFile, the YAML document form with seed variables
//!
//! These types are the "what". Execution lives in the `runtime` module.

mod file;
mod recipe;

pub use file::{Issue, RecipeFile, SeedValue, StepDef};
pub use recipe::{is_identifier, Placement, Recipe, RecipeStep};
