//! `irt-screen` library crate.
//!
//! The binary (`irt`) is a thin wrapper around this library so that:
//!
//! - the psychometric core is testable without spawning processes
//! - the analysis stages are reusable on their own
//!
//! Stages: [`dimensionality`] screening, [`fit`] calibration (Rasch/2PL by
//! MML-EM), item fit [`diagnostics`] and test [`information`].

pub mod app;
pub mod cli;
pub mod data;
pub mod diagnostics;
pub mod dimensionality;
pub mod domain;
pub mod error;
pub mod fit;
pub mod information;
pub mod io;
pub mod math;
pub mod plot;
pub mod report;
