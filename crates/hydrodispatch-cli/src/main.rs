use clap::{Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};

use hydrodispatch_core::{
    DispatchPipeline, DispatchResult, Granularity, HydrothermalCase, PricingRecord, PricingResolver, SolveConfig,
    ViolationReport, build_model, check_violations,
};
use tracing::warn;

#[derive(Parser)]
#[command(name = "hydrodispatch")]
#[command(about = "Two-stage hydrothermal dispatch with marginal pricing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a case and print dispatch, prices and diagnostics
    Solve {
        /// The case file (JSON)
        case: PathBuf,
        /// Solver settings (JSON); defaults when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Price granularity (auto, nodal, zonal)
        #[arg(short, long, default_value = "auto")]
        granularity: String,
        /// Only report these periods
        #[arg(short, long = "period")]
        periods: Vec<usize>,
        /// Check the stage-1 solution for constraint violations
        #[arg(long)]
        violations: bool,
        /// Violation tolerance; the config value when omitted
        #[arg(long)]
        tolerance: Option<f64>,
        /// Output format (json, pretty)
        #[arg(short, long, default_value = "pretty")]
        format: String,
    },
    /// Check a case file for errors
    Check {
        /// The case file to check
        case: PathBuf,
    },
}

fn read_file(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

fn load_case(path: &Path) -> HydrothermalCase {
    match serde_json::from_str(&read_file(path)) {
        Ok(case) => case,
        Err(e) => {
            eprintln!("Case error: {}", e);
            std::process::exit(1);
        }
    }
}

fn load_config(path: Option<&Path>) -> SolveConfig {
    let Some(path) = path else {
        return SolveConfig::default();
    };
    match serde_json::from_str(&read_file(path)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Config error: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_pretty(result: &DispatchResult, pricing: &[PricingRecord], report: Option<&ViolationReport>) {
    println!("Status: {}", result.status.to_string().to_uppercase());
    match result.objective_value {
        Some(objective) => println!("Total cost: {:.2}", objective),
        None => println!("Total cost: -"),
    }
    if let Some(gap) = result.gap {
        let flag = if result.gap_exceeded { " (above warning threshold)" } else { "" };
        println!("Gap: {:.4}%{}", gap * 100.0, flag);
    }
    match result.has_duals {
        Some(true) => println!("Duals: available"),
        Some(false) => println!("Duals: unavailable (linear re-solve failed)"),
        None => println!("Duals: not computed"),
    }
    println!(
        "Time: stage 1 {:.3}s, stage 2 {:.3}s",
        result.timing.stage1_seconds, result.timing.stage2_seconds
    );
    for warning in &result.warnings {
        println!("Warning: {}", warning);
    }

    if !pricing.is_empty() {
        println!();
        println!("Prices:");
        let [location, period, granularity, price, zone] = PricingRecord::HEADER;
        println!("  {:12} {:>6} {:>12} {:>12}  {}", location, period, granularity, price, zone);
        for (location, period, granularity, price, zone) in pricing.iter().map(PricingRecord::to_row) {
            println!(
                "  {:12} {:>6} {:>12} {:>12.4}  {}",
                location,
                period,
                granularity,
                price,
                zone.as_deref().unwrap_or("-")
            );
        }
    }

    if let Some(report) = report {
        println!();
        print!("{}", report);
    }
}

fn main() {
    // Respects RUST_LOG
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Solve {
            case,
            config,
            granularity,
            periods,
            violations,
            tolerance,
            format,
        } => {
            let granularity: Granularity = match granularity.parse() {
                Ok(g) => g,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            };
            let data = load_case(&case);
            let config = load_config(config.as_deref());
            let tolerance = tolerance.unwrap_or(config.violation_tolerance);

            let built = match build_model(&data) {
                Ok(b) => b,
                Err(e) => {
                    eprintln!("Case error: {}", e);
                    std::process::exit(1);
                }
            };

            let resolver = PricingResolver::new(&built.topology);
            let mut pipeline = DispatchPipeline::new(config);
            if let Some(network) = built.network {
                pipeline = pipeline.with_network(network);
            }
            let (result, outcome) = pipeline.run(built.model, &built.request);

            let periods = (!periods.is_empty()).then_some(periods);
            let pricing = match resolver.resolve(&result, granularity, periods.as_deref()) {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(error = %e, "No prices for this result");
                    Vec::new()
                }
            };

            let report = if violations {
                match check_violations(outcome.model(), tolerance) {
                    Ok(report) => Some(report),
                    Err(e) => {
                        warn!(error = %e, "Violation check skipped");
                        None
                    }
                }
            } else {
                None
            };

            if format == "json" {
                let output = serde_json::json!({
                    "result": result,
                    "pricing": pricing,
                    "violations": report,
                });
                println!("{}", serde_json::to_string_pretty(&output).unwrap_or_else(|e| format!("Error: {}", e)));
            } else {
                print_pretty(&result, &pricing, report.as_ref());
            }

            if !result.status.has_solution() {
                std::process::exit(1);
            }
        }
        Commands::Check { case } => {
            let data = load_case(&case);

            match build_model(&data) {
                Ok(built) => {
                    println!("✓ {} is valid", case.display());
                    println!("  {} periods", data.periods);
                    println!("  {} submarkets", data.submarkets.len());
                    println!("  {} thermal plants", data.thermal.len());
                    println!("  {} hydro plants", data.hydro.len());
                    if let Some(network) = &data.network {
                        println!("  {} buses, {} lines", network.buses.len(), network.lines.len());
                    }
                    println!(
                        "  {} variables, {} constraints",
                        built.model.num_variables(),
                        built.model.num_constraints()
                    );
                    println!("Variable groups:");
                    for group in built.model.variable_groups() {
                        println!("  {:24} {}", group.name(), group.len());
                    }
                    println!("Constraint groups:");
                    for group in built.model.constraint_groups() {
                        println!("  {:24} {}", group.name(), group.len());
                    }
                }
                Err(e) => {
                    eprintln!("✗ {} has errors:", case.display());
                    eprintln!("  {}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}
