// pedfuse_sim/src/cli.rs

use clap::{Parser, ValueEnum};
use pedfuse_core::config::FilterKind;
use std::path::PathBuf;

use crate::simulation::config::ScenarioConfig;

/// pedfuse: a headless pedestrian position fusion simulator.
///
/// Generates a synthetic walk with PDR, GNSS and WiFi streams, runs the
/// selected filter over it and reports the error against ground truth.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The path to the scenario TOML file to run.
    #[arg(short, long, default_value = "assets/scenarios/campus_walk.toml")]
    pub scenario: PathBuf,

    /// Which filter to run. Defaults to the one named in the scenario.
    #[arg(short, long, value_enum)]
    pub filter: Option<FilterChoice>,

    /// Seed for the scenario generator, overriding the scenario file.
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterChoice {
    Kalman,
    Extended,
    Particle,
    /// Run every variant on the same event stream.
    All,
}

impl Cli {
    /// Applies command-line overrides on top of the loaded scenario.
    pub fn apply(&self, scenario: &mut ScenarioConfig) {
        if let Some(seed) = self.seed {
            scenario.simulation.seed = Some(seed);
        }
        if let Some(kind) = self.filter.and_then(FilterChoice::single) {
            scenario.filter.kind = kind;
        }
    }

    /// The variants to run for this invocation.
    pub fn kinds(&self, scenario: &ScenarioConfig) -> Vec<FilterKind> {
        match self.filter {
            Some(FilterChoice::All) => {
                vec![FilterKind::Kalman, FilterKind::Extended, FilterKind::Particle]
            }
            _ => vec![scenario.filter.kind],
        }
    }
}

impl FilterChoice {
    fn single(self) -> Option<FilterKind> {
        match self {
            FilterChoice::Kalman => Some(FilterKind::Kalman),
            FilterChoice::Extended => Some(FilterKind::Extended),
            FilterChoice::Particle => Some(FilterKind::Particle),
            FilterChoice::All => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_apply_to_the_scenario() {
        let cli = Cli::parse_from(["pedfuse_sim", "--filter", "particle", "--seed", "12"]);
        let mut scenario = ScenarioConfig::default();
        cli.apply(&mut scenario);
        assert_eq!(scenario.simulation.seed, Some(12));
        assert_eq!(scenario.filter.kind, FilterKind::Particle);
        assert_eq!(cli.kinds(&scenario), vec![FilterKind::Particle]);
    }

    #[test]
    fn all_runs_every_variant() {
        let cli = Cli::parse_from(["pedfuse_sim", "-f", "all"]);
        let mut scenario = ScenarioConfig::default();
        cli.apply(&mut scenario);
        assert_eq!(scenario.filter.kind, FilterKind::default());
        assert_eq!(cli.kinds(&scenario).len(), 3);
    }

    #[test]
    fn scenario_path_has_a_default() {
        let cli = Cli::parse_from(["pedfuse_sim"]);
        assert!(cli.scenario.ends_with("campus_walk.toml"));
        assert_eq!(cli.filter, None);
    }
}
