//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - sets up logging (`RUST_LOG`, default `warn`)
//! - parses CLI arguments
//! - loads the response matrix
//! - runs the dimensionality check or the calibration pipeline
//! - prints reports/plots
//! - writes optional exports

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Command, DimensionalityArgs, FitArgs, SimulateArgs};
use crate::data::{ItemSpec, simulate_responses};
use crate::error::{AnalysisError, AppError};
use crate::io::{load_responses, write_items_csv, write_report_json, write_responses_csv};

pub mod pipeline;

/// Entry point for the `irt` binary.
pub fn run() -> Result<(), AppError> {
    init_tracing();
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Dimensionality(args) => handle_dimensionality(args),
        Command::Fit(args) => handle_fit(args),
        Command::Simulate(args) => handle_simulate(args),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // A second init (tests, embedding) is harmless; keep the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_dimensionality(args: DimensionalityArgs) -> Result<(), AppError> {
    let config = args.config()?;
    let matrix = load_responses(&args.input.responses)?;
    let result = pipeline::run_dimensionality(&matrix, args.method, &config)?;

    if args.input.json {
        println!("{}", to_json(&result)?);
    } else {
        println!("{}", crate::report::format_dimensionality(&result, &config));
    }

    if let Some(path) = &args.input.export {
        write_report_json(path, &result)?;
    }
    Ok(())
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = args.config()?;
    let matrix = load_responses(&args.input.responses)?;

    let request = pipeline::FitRequest {
        model: args.model,
        check: args.check,
        information: args.wants_information(),
        abilities: args.abilities,
        require_converged: args.require_converged,
    };
    let run = pipeline::run_fit(&matrix, &request, &config)?;

    if args.input.json {
        println!("{}", to_json(&run)?);
    } else {
        if let Some(dim) = &run.dimensionality {
            println!("{}", crate::report::format_dimensionality(dim, &config));
        }
        println!("{}", crate::report::format_model_summary(&run.model));
        println!("{}", crate::report::format_item_table(&run.model));

        let ranked = crate::report::rank_item_fit(&run.diagnostics, args.top);
        println!("{}", crate::report::format_misfit(&run.diagnostics, &ranked));

        if let Some(info) = &run.information {
            println!("{}", crate::report::format_information_summary(info));
            if args.plot {
                let plot = crate::plot::render_information_plot(
                    info,
                    args.width,
                    args.height,
                    args.show_items,
                );
                println!("{plot}");
            }
        }
    }

    // Optional exports.
    if let Some(path) = &args.input.export {
        write_report_json(path, &run)?;
    }
    if let Some(path) = &args.items_csv {
        write_items_csv(path, &run.model)?;
    }
    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let items: Vec<ItemSpec> = args
        .item_parameters()?
        .into_iter()
        .map(|(a, b)| ItemSpec::new(a, b))
        .collect();
    let matrix = simulate_responses(args.model, &items, args.respondents, args.seed)?;
    write_responses_csv(&args.out, &matrix)?;
    eprintln!(
        "wrote {} respondents x {} items to {}",
        matrix.n_respondents(),
        matrix.n_items(),
        args.out.display()
    );
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, AppError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| AnalysisError::invalid_input(format!("failed to encode JSON: {e}")).into())
}
