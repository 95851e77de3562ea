//! Configuration types deserialized from `tock.toml`.

use serde::Deserialize;

/// The top-level configuration parsed from `tock.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Simulation run settings.
    #[serde(default)]
    pub sim: SimSection,
}

/// The `[sim]` table: how long a simulation runs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimSection {
    /// Number of clock cycles to run. With `until_idle` this is the upper bound.
    #[serde(default = "default_cycles")]
    pub cycles: u64,
    /// Stop as soon as every attached process has finished.
    #[serde(default)]
    pub until_idle: bool,
}

impl Default for SimSection {
    fn default() -> Self {
        Self {
            cycles: default_cycles(),
            until_idle: false,
        }
    }
}

fn default_cycles() -> u64 {
    1
}
