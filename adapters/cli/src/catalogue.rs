//! TOML catalogue loading.

use std::{fs, path::Path};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use star_siege_core::ScenarioConfig;
use star_siege_system_scenarios::PacingConfig;

const BUILTIN: &str = include_str!("../catalogue/default.toml");

/// Scenario catalogue together with the pacing it was authored for.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct Catalogue {
    #[serde(default)]
    pub(crate) pacing: PacingConfig,
    #[serde(rename = "scenario", default)]
    pub(crate) scenarios: Vec<ScenarioConfig>,
}

impl Catalogue {
    /// Catalogue shipped with the binary.
    pub(crate) fn builtin() -> Result<Self> {
        Self::parse(BUILTIN).context("failed to parse builtin catalogue")
    }

    /// Reads and parses the catalogue stored at `path`.
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read catalogue at {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("failed to parse catalogue at {}", path.display()))
    }

    fn parse(contents: &str) -> Result<Self> {
        let catalogue: Self =
            toml::from_str(contents).context("catalogue is not valid toml")?;
        if catalogue.scenarios.is_empty() {
            bail!("catalogue declares no scenarios");
        }
        Ok(catalogue)
    }
}
