use anyhow::Context;
use rficore::{StrategyFlags, StrategyOptions, TelescopeId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::generator::profile::GeneratorConfig;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub generator: GeneratorConfig,
    pub telescope: TelescopeId,
    pub flags: StrategyFlags,
    /// Strategy document to run instead of the default strategy.
    pub strategy_path: Option<PathBuf>,
    /// Where to save the strategy that was run.
    pub save_strategy_path: Option<PathBuf>,
    pub workers: usize,
    pub report_path: Option<PathBuf>,
    pub statistics_path: Option<PathBuf>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            generator: GeneratorConfig::default(),
            telescope: TelescopeId::Generic,
            flags: StrategyFlags::NONE,
            strategy_path: None,
            save_strategy_path: None,
            workers: 4,
            report_path: None,
            statistics_path: None,
        }
    }
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(generator: GeneratorConfig, telescope: TelescopeId, flags: StrategyFlags) -> Self {
        Self {
            generator,
            telescope,
            flags,
            ..Default::default()
        }
    }

    pub fn strategy_options(&self) -> StrategyOptions {
        StrategyOptions {
            telescope: self.telescope,
            flags: self.flags,
            frequency: self.generator.centre_frequency(),
            time_resolution: self.generator.time_resolution,
            frequency_resolution: self.generator.channel_width,
        }
    }
}
