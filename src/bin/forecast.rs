//! Forecast runner
//!
//! Runs the full pipeline for a scenario and writes the aggregate report
//! as JSON, with a human-readable summary on stdout.

use clap::Parser;
use pollcast::pipeline::{run_forecast, Scenario};
use pollcast::testing::ScenarioGenerator;
use pollcast::CancelToken;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "forecast")]
#[command(about = "Multi-seat election forecast from polls, odds, and live counts")]
struct Cli {
    /// Scenario JSON file; omit to run the built-in demo scenario
    #[arg(short, long)]
    scenario: Option<PathBuf>,

    /// Run a deterministic synthetic demo scenario
    #[arg(long)]
    demo: bool,

    /// Override the simulation iteration count
    #[arg(short, long)]
    iterations: Option<u64>,

    /// Override the base seed
    #[arg(long)]
    seed: Option<u64>,

    /// Write the full report as JSON to this path
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let cli = Cli::parse();

    let mut scenario = match (&cli.scenario, cli.demo) {
        (Some(path), _) => {
            let raw = fs::read_to_string(path)?;
            serde_json::from_str::<Scenario>(&raw)?
        }
        (None, true) => ScenarioGenerator::default().build(),
        (None, false) => {
            anyhow::bail!("pass --scenario <file> or --demo");
        }
    };
    if let Some(iterations) = cli.iterations {
        scenario.config.simulation.iterations = iterations;
    }
    if let Some(seed) = cli.seed {
        scenario.config.seed = seed;
    }

    let report = run_forecast(&scenario, &CancelToken::new())?;

    println!("Scenario: {}", scenario.name);
    println!("Iterations: {}", report.iterations);
    println!();
    for (p, code) in report.party_codes.iter().enumerate() {
        println!(
            "{code}: {:.1} expected seats, majority {:.1}%, lead {:.1}%",
            report.seat_expectation.get(p).copied().unwrap_or(0.0),
            report.majority_pct.get(p).copied().unwrap_or(0.0),
            report.lead_pct.get(p).copied().unwrap_or(0.0),
        );
    }
    println!("Hung with exact tie: {:.1}%", report.tie_pct);
    println!();
    for (s, name) in report.seat_names.iter().enumerate() {
        let leader = report
            .seat_win_pct
            .get(s)
            .and_then(|row| {
                row.iter()
                    .enumerate()
                    .max_by(|a, b| a.1.total_cmp(b.1))
            })
            .map(|(p, &pct)| (report.party_codes[p].clone(), pct));
        if let Some((code, pct)) = leader {
            println!("{name}: {code} {pct:.1}%");
        }
    }

    if let Some(path) = &cli.output {
        fs::write(path, serde_json::to_string_pretty(&report)?)?;
        println!("\nReport written to {}", path.display());
    }
    Ok(())
}
