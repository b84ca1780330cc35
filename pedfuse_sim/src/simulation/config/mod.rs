// pedfuse_sim/src/simulation/config/mod.rs

//! This module handles loading and validating the scenario configuration
//! from disk.

pub mod structs;

use std::path::Path;

use anyhow::{ensure, Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use tracing::info;

pub use structs::{FixSensorConfig, PdrSensorConfig, ScenarioConfig, Sensors, Simulation, Walk};

/// Environment variables with this prefix override scenario values, using
/// `__` as the section separator (`PEDFUSE_SIMULATION__SEED=3`).
pub const ENV_PREFIX: &str = "PEDFUSE_";

/// Loads a scenario file, layering environment overrides on top.
pub fn load_scenario(path: &Path) -> Result<ScenarioConfig> {
    ensure!(
        path.is_file(),
        "scenario file '{}' does not exist",
        path.display()
    );
    info!("Loading scenario from: {}", path.display());
    let figment = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));
    extract(figment).with_context(|| format!("failed to load scenario '{}'", path.display()))
}

/// Parses a scenario from an in-memory TOML document.
pub fn parse_scenario(toml: &str) -> Result<ScenarioConfig> {
    extract(Figment::new().merge(Toml::string(toml)))
}

fn extract(figment: Figment) -> Result<ScenarioConfig> {
    let scenario: ScenarioConfig = figment.extract()?;
    validate(&scenario)?;
    Ok(scenario)
}

pub fn validate(scenario: &ScenarioConfig) -> Result<()> {
    let sim = &scenario.simulation;
    ensure!(
        sim.duration_seconds.is_finite() && sim.duration_seconds > 0.0,
        "simulation.duration_seconds must be positive"
    );
    ensure!(
        sim.smoothing_window >= 1,
        "simulation.smoothing_window must be at least 1"
    );

    let walk = &scenario.walk;
    ensure!(walk.anchor.is_valid(), "walk.anchor is not a valid fix");
    ensure!(walk.step_length_m > 0.0, "walk.step_length_m must be positive");
    ensure!(walk.cadence_hz > 0.0, "walk.cadence_hz must be positive");
    ensure!(
        walk.heading_wander_deg >= 0.0,
        "walk.heading_wander_deg must not be negative"
    );

    let pdr = &scenario.sensors.pdr;
    ensure!(
        pdr.step_length_scale_error > -1.0,
        "sensors.pdr.step_length_scale_error must be above -1"
    );
    ensure!(
        pdr.heading_bias_drift_deg >= 0.0,
        "sensors.pdr.heading_bias_drift_deg must not be negative"
    );

    for (name, fix) in [("gnss", &scenario.sensors.gnss), ("wifi", &scenario.sensors.wifi)] {
        ensure!(fix.rate_hz > 0.0, "sensors.{name}.rate_hz must be positive");
        ensure!(fix.noise_m > 0.0, "sensors.{name}.noise_m must be positive");
        ensure!(
            (0.0..=1.0).contains(&fix.dropout_probability),
            "sensors.{name}.dropout_probability must be within [0, 1]"
        );
    }

    scenario.filter.validate()?;
    Ok(())
}
