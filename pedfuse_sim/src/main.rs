// pedfuse_sim/src/main.rs

//! Runs a scenario end to end:
//! 1. Load the scenario TOML and apply command-line overrides.
//! 2. Generate the ground-truth walk and the sensor event stream.
//! 3. Run the selected filter(s) over it and print the error report.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pedfuse_sim::prelude::*;
use pedfuse_sim::DEFAULT_LOG_FILTER;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    // --- 1. Load Simulation Configuration ---
    let cli = Cli::parse();
    let mut config = load_scenario(&cli.scenario)?;
    cli.apply(&mut config);

    // --- 2. Generate the Scenario ---
    let scenario = generate(&config)?;

    // --- 3. Run and Report ---
    let kinds = cli.kinds(&config);
    let reports = compare(
        &scenario,
        &config.filter,
        &kinds,
        config.simulation.smoothing_window,
    )?;
    for report in &reports {
        println!("{report}");
    }
    Ok(())
}
