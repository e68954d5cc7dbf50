//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the validated response matrix (`ResponseMatrix`)
//! - analysis configuration (`AnalysisConfig` and its sections)
//! - stage outputs (`FactorSolution`, `IrtModel`, `FitDiagnostics`, `TestInformation`)

pub mod config;
pub mod matrix;
pub mod types;

pub use config::*;
pub use matrix::*;
pub use types::*;
