use anyhow::Context;
use clap::{Parser, ValueEnum};
use generator::profile::{build_baselines, GeneratorConfig};
use report::model::RunReport;
use report::writer::write_report;
use rficore::{Flagger, StrategyFlags, TelescopeId};
use std::path::PathBuf;
use workflow::config::WorkflowConfig;
use workflow::runner::Runner;

mod generator;
mod report;
mod workflow;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Telescope {
    Generic,
    Lofar,
    Mwa,
    Wsrt,
}

impl From<Telescope> for TelescopeId {
    fn from(telescope: Telescope) -> Self {
        match telescope {
            Telescope::Generic => TelescopeId::Generic,
            Telescope::Lofar => TelescopeId::Lofar,
            Telescope::Mwa => TelescopeId::Mwa,
            Telescope::Wsrt => TelescopeId::Wsrt,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Hint {
    LowFrequency,
    HighFrequency,
    Transients,
    Robust,
    Fast,
    OffAxisSources,
    Unsensitive,
    Sensitive,
    GuiFriendly,
    ClearFlags,
    LargeBandwidth,
    SmallBandwidth,
    AutoCorrelation,
}

impl From<Hint> for StrategyFlags {
    fn from(hint: Hint) -> Self {
        match hint {
            Hint::LowFrequency => StrategyFlags::LOW_FREQUENCY,
            Hint::HighFrequency => StrategyFlags::HIGH_FREQUENCY,
            Hint::Transients => StrategyFlags::TRANSIENTS,
            Hint::Robust => StrategyFlags::ROBUST,
            Hint::Fast => StrategyFlags::FAST,
            Hint::OffAxisSources => StrategyFlags::OFF_AXIS_SOURCES,
            Hint::Unsensitive => StrategyFlags::UNSENSITIVE,
            Hint::Sensitive => StrategyFlags::SENSITIVE,
            Hint::GuiFriendly => StrategyFlags::GUI_FRIENDLY,
            Hint::ClearFlags => StrategyFlags::CLEAR_FLAGS,
            Hint::LargeBandwidth => StrategyFlags::LARGE_BANDWIDTH,
            Hint::SmallBandwidth => StrategyFlags::SMALL_BANDWIDTH,
            Hint::AutoCorrelation => StrategyFlags::AUTO_CORRELATION,
        }
    }
}

#[derive(Parser)]
#[command(author, version, about = "Flag synthetic baselines with the rficore strategy engine")]
struct Args {
    /// Load a workflow config from YAML; the data and strategy options below
    /// are then ignored
    #[arg(long)]
    workflow: Option<PathBuf>,
    #[arg(long, default_value_t = 4)]
    antennas: usize,
    #[arg(long, default_value_t = 64)]
    timesteps: usize,
    #[arg(long, default_value_t = 32)]
    channels: usize,
    /// 1, 2, 4 or 8
    #[arg(long, default_value_t = 2)]
    images: usize,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    #[arg(long, value_enum, default_value_t = Telescope::Generic)]
    telescope: Telescope,
    /// Strategy hint; may be repeated
    #[arg(long = "hint", value_enum)]
    hints: Vec<Hint>,
    /// Run this strategy document instead of the default strategy
    #[arg(long)]
    strategy: Option<PathBuf>,
    #[arg(long)]
    save_strategy: Option<PathBuf>,
    #[arg(long)]
    workers: Option<usize>,
    /// Write a JSON run report
    #[arg(long)]
    report: Option<PathBuf>,
    /// Write the quality statistics tables
    #[arg(long)]
    statistics: Option<PathBuf>,
}

impl Args {
    fn workflow_config(&self) -> anyhow::Result<WorkflowConfig> {
        let mut config = if let Some(path) = &self.workflow {
            WorkflowConfig::load(path)?
        } else {
            let generator = GeneratorConfig {
                antennas: self.antennas,
                timesteps: self.timesteps,
                channels: self.channels,
                image_count: self.images,
                seed: self.seed,
                ..Default::default()
            };
            let flags = self
                .hints
                .iter()
                .fold(StrategyFlags::NONE, |flags, &hint| flags | StrategyFlags::from(hint));
            WorkflowConfig::from_args(generator, self.telescope.into(), flags)
        };
        if self.strategy.is_some() {
            config.strategy_path = self.strategy.clone();
        }
        if self.save_strategy.is_some() {
            config.save_strategy_path = self.save_strategy.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if self.report.is_some() {
            config.report_path = self.report.clone();
        }
        if self.statistics.is_some() {
            config.statistics_path = self.statistics.clone();
        }
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = args.workflow_config()?;

    let flagger = Flagger::new();
    let baselines =
        build_baselines(&flagger, &config.generator).context("generating synthetic baselines")?;
    let runner = Runner::new(config.clone());
    let result = runner.execute(baselines)?;

    let report = RunReport::new(
        config.telescope,
        config.flags,
        config.generator.description.clone(),
        &result,
    );
    println!(
        "Flagged {} baselines -> {:.2}% of {} samples, recall {}",
        report.baselines.len(),
        100.0 * report.flagged_fraction(),
        report.total_samples,
        report
            .recall()
            .map(|r| format!("{:.1}%", 100.0 * r))
            .unwrap_or_else(|| "n/a".into())
    );
    for baseline in &report.bad_baselines {
        println!("Bad baseline {}-{}", baseline.antenna1, baseline.antenna2);
    }

    if let Some(path) = &config.report_path {
        write_report(&report, path)?;
    }
    if let Some(path) = &config.statistics_path {
        flagger
            .write_statistics(&result.statistics, path)
            .with_context(|| format!("writing statistics {}", path.display()))?;
    }
    Ok(())
}
