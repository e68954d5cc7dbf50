//! Command-line parsing for the `irt` screening and calibration tool.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the estimation code. Every flag that overrides a threshold is
//! optional; unset flags keep the value from `--config` (or the default).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{AnalysisConfig, ConstantItemPolicy, MethodKind, ModelKind};
use crate::error::{AnalysisError, AnalysisResult};
use crate::io::load_config;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "irt",
    version,
    about = "Unidimensionality screening and IRT calibration for item responses"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check whether the items measure a single latent trait.
    Dimensionality(DimensionalityArgs),
    /// Fit a Rasch or 2PL model, report item fit and optionally test information.
    Fit(FitArgs),
    /// Write synthetic responses for known item parameters to CSV.
    Simulate(SimulateArgs),
}

/// Options shared by the analysis subcommands.
#[derive(Debug, Args, Clone)]
pub struct InputArgs {
    /// Response file: CSV (`student_id,<items…>`) or JSON records (`.json`).
    #[arg(value_name = "RESPONSES")]
    pub responses: PathBuf,

    /// JSON configuration file; missing fields keep their defaults.
    #[arg(long, value_name = "JSON")]
    pub config: Option<PathBuf>,

    /// What to do with items nobody (or everybody) answers correctly.
    #[arg(long, value_enum)]
    pub constant_items: Option<ConstantItemPolicy>,

    /// Print the result as JSON instead of the text report.
    #[arg(long)]
    pub json: bool,

    /// Write the full result as JSON.
    #[arg(long, value_name = "PATH")]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct DimensionalityArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Extraction method (`eigen`/`efa` or `residual`/`noharm`).
    #[arg(short, long, value_enum, default_value_t = MethodKind::Eigen)]
    pub method: MethodKind,

    /// Minimum proportion of variance explained by the first factor.
    #[arg(long)]
    pub min_variance: Option<f64>,

    /// Minimum ratio of the first to the second eigenvalue.
    #[arg(long)]
    pub min_ratio: Option<f64>,

    /// Maximum RMSR for the residual method.
    #[arg(long)]
    pub max_rmsr: Option<f64>,

    /// Items with |loading| below this are reported as problematic.
    #[arg(long)]
    pub loading_threshold: Option<f64>,
}

#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// IRT model.
    #[arg(short, long, value_enum, default_value_t = ModelKind::TwoPl)]
    pub model: ModelKind,

    /// Run a dimensionality check with this method before calibrating.
    #[arg(long, value_enum)]
    pub check: Option<MethodKind>,

    /// EM convergence tolerance on |ΔlogL|.
    #[arg(long)]
    pub tolerance: Option<f64>,

    /// EM iteration cap.
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Number of quadrature points.
    #[arg(long)]
    pub quadrature_points: Option<usize>,

    /// Requested number of ability strata for item fit.
    #[arg(long)]
    pub strata: Option<usize>,

    /// Fail instead of reporting a fit that hit the iteration cap.
    #[arg(long)]
    pub require_converged: bool,

    /// Compute test information, SEM and marginal reliability.
    #[arg(long)]
    pub information: bool,

    /// Include EAP ability estimates in the JSON output.
    #[arg(long)]
    pub abilities: bool,

    /// Render an ASCII plot of the test information (implies --information).
    #[arg(long)]
    pub plot: bool,

    /// Overlay item information curves on the plot.
    #[arg(long)]
    pub show_items: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 81)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,

    /// Show the N worst-fitting items.
    #[arg(long, default_value_t = 5)]
    pub top: usize,

    /// Export per-item estimates and fit to CSV.
    #[arg(long, value_name = "CSV")]
    pub items_csv: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    /// Item parameters as `a:b` pairs (discrimination:difficulty), comma separated.
    #[arg(long, value_delimiter = ',', required = true, allow_hyphen_values = true)]
    pub items: Vec<String>,

    /// Generating model.
    #[arg(short, long, value_enum, default_value_t = ModelKind::TwoPl)]
    pub model: ModelKind,

    /// Number of respondents.
    #[arg(short = 'n', long, default_value_t = 1000)]
    pub respondents: usize,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Output CSV path.
    #[arg(short, long, value_name = "CSV")]
    pub out: PathBuf,
}

impl InputArgs {
    /// Defaults, then the config file, then CLI overrides.
    pub fn base_config(&self) -> AnalysisResult<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => AnalysisConfig::default(),
        };
        if let Some(policy) = self.constant_items {
            config.constant_items = policy;
        }
        Ok(config)
    }
}

impl DimensionalityArgs {
    pub fn config(&self) -> AnalysisResult<AnalysisConfig> {
        let mut config = self.input.base_config()?;
        let d = &mut config.dimensionality;
        override_with(&mut d.min_variance_explained, self.min_variance);
        override_with(&mut d.min_eigenvalue_ratio, self.min_ratio);
        override_with(&mut d.max_rmsr, self.max_rmsr);
        override_with(&mut d.loading_threshold, self.loading_threshold);
        config.validate()?;
        Ok(config)
    }
}

impl FitArgs {
    pub fn config(&self) -> AnalysisResult<AnalysisConfig> {
        let mut config = self.input.base_config()?;
        let e = &mut config.estimation;
        override_with(&mut e.tolerance, self.tolerance);
        override_with(&mut e.max_iterations, self.max_iterations);
        override_with(&mut e.quadrature_points, self.quadrature_points);
        override_with(&mut config.diagnostics.strata, self.strata);
        config.validate()?;
        Ok(config)
    }

    pub fn wants_information(&self) -> bool {
        self.information || self.plot
    }
}

impl SimulateArgs {
    /// Parse `a:b` pairs into `(discrimination, difficulty)`.
    pub fn item_parameters(&self) -> AnalysisResult<Vec<(f64, f64)>> {
        self.items
            .iter()
            .map(|raw| {
                let parse = |s: &str| s.trim().parse::<f64>().ok();
                let parsed = match raw.split_once(':') {
                    Some((a, b)) => parse(a).zip(parse(b)),
                    None => parse(raw).map(|b| (1.0, b)),
                };
                parsed.ok_or_else(|| {
                    AnalysisError::invalid_config(
                        "items",
                        format!("'{raw}' is not an `a:b` pair or a difficulty"),
                    )
                })
            })
            .collect()
    }
}

fn override_with<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_flags_override_defaults() {
        let cli = Cli::parse_from([
            "irt",
            "fit",
            "responses.csv",
            "--model",
            "rasch",
            "--max-iterations",
            "250",
            "--strata",
            "8",
            "--plot",
        ]);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.model, ModelKind::Rasch);
        assert!(args.wants_information());

        let config = args.config().unwrap();
        assert_eq!(config.estimation.max_iterations, 250);
        assert_eq!(config.diagnostics.strata, 8);
        assert_eq!(config.estimation.tolerance, 1e-4);
    }

    #[test]
    fn method_aliases_parse() {
        let cli = Cli::parse_from(["irt", "dimensionality", "r.json", "-m", "noharm"]);
        let Command::Dimensionality(args) = cli.command else {
            panic!("expected dimensionality");
        };
        assert_eq!(args.method, MethodKind::Residual);
    }

    #[test]
    fn invalid_override_is_rejected() {
        let cli = Cli::parse_from(["irt", "dimensionality", "r.csv", "--min-variance", "1.5"]);
        let Command::Dimensionality(args) = cli.command else {
            panic!("expected dimensionality");
        };
        assert_eq!(args.config().unwrap_err().code(), "invalid_configuration");
    }

    #[test]
    fn simulate_items_accept_pairs_and_bare_difficulties() {
        let cli = Cli::parse_from([
            "irt", "simulate", "--items", "1.5:-1,0.5", "-n", "10", "--out", "x.csv",
        ]);
        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.item_parameters().unwrap(), vec![(1.5, -1.0), (1.0, 0.5)]);
    }
}
