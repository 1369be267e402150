use crate::generator::profile::SyntheticBaseline;
use crate::workflow::config::WorkflowConfig;
use anyhow::Context;
use rficore::data::{Baseline, BaselineRecord};
use rficore::math::ValueRange;
use rficore::strategy::BaselineSelectionAction;
use rficore::telemetry::{LoggingProgressListener, Metrics, MetricsRecorder};
use rficore::{Flagger, ProgressListener, QualityStatistics, Strategy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::runtime::Builder as TokioBuilder;

/// Flagging result of one baseline, compared against the injected truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineOutcome {
    pub antenna1: usize,
    pub antenna2: usize,
    pub samples: usize,
    pub flagged: usize,
    pub injected: usize,
    /// Injected samples that were flagged.
    pub detected: usize,
    /// Range of the real part of the first polarization after flagging.
    pub clean_range: Option<ValueRange>,
}

pub struct WorkflowResult {
    pub outcomes: Vec<BaselineOutcome>,
    /// Baselines whose flag occupancy stands out from the rest.
    pub bad_baselines: Vec<Baseline>,
    pub statistics: QualityStatistics,
    pub metrics: Metrics,
}

#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
    flagger: Flagger,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self {
            config,
            flagger: Flagger::new(),
        }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// The strategy document from the config, or the default strategy.
    pub fn strategy(&self) -> anyhow::Result<Strategy> {
        let strategy = match &self.config.strategy_path {
            Some(path) => self
                .flagger
                .load_strategy(path)
                .with_context(|| format!("loading strategy {}", path.display()))?,
            None => {
                let options = self.config.strategy_options();
                self.flagger.make_strategy(
                    options.telescope,
                    options.flags,
                    options.frequency,
                    options.time_resolution,
                    options.frequency_resolution,
                )
            }
        };
        if let Some(path) = &self.config.save_strategy_path {
            self.flagger
                .save_strategy(&strategy, path)
                .with_context(|| format!("saving strategy {}", path.display()))?;
        }
        Ok(strategy)
    }

    /// Flags every baseline on a pool of blocking workers sharing one
    /// strategy. Each worker collects into its own statistics, merged once
    /// all baselines are done.
    pub fn execute(&self, baselines: Vec<SyntheticBaseline>) -> anyhow::Result<WorkflowResult> {
        let strategy = Arc::new(self.strategy()?);
        let workers = self.config.workers.max(1);
        let runtime = TokioBuilder::new_multi_thread()
            .worker_threads(workers)
            .max_blocking_threads(workers)
            .enable_all()
            .build()
            .context("creating flagging runtime")?;
        runtime.block_on(self.flag_all(strategy, baselines))
    }

    async fn flag_all(
        &self,
        strategy: Arc<Strategy>,
        baselines: Vec<SyntheticBaseline>,
    ) -> anyhow::Result<WorkflowResult> {
        let generator = &self.config.generator;
        let scan_times = Arc::new(generator.scan_times());
        let frequencies = Arc::new(generator.channel_frequencies());
        let polarizations = generator.polarization_count();
        let metrics = Arc::new(MetricsRecorder::new());

        let handles: Vec<_> = baselines
            .into_iter()
            .map(|baseline| {
                let flagger = self.flagger.clone();
                let strategy = Arc::clone(&strategy);
                let scan_times = Arc::clone(&scan_times);
                let frequencies = Arc::clone(&frequencies);
                let metrics = Arc::clone(&metrics);
                tokio::task::spawn_blocking(move || {
                    let mut statistics =
                        flagger.make_quality_statistics(&scan_times, &frequencies, polarizations);
                    let (outcome, record) =
                        flag_baseline(&flagger, &strategy, &baseline, &mut statistics, &metrics)?;
                    Ok::<_, anyhow::Error>((outcome, record, statistics))
                })
            })
            .collect();

        let mut statistics =
            self.flagger
                .make_quality_statistics(&scan_times, &frequencies, polarizations);
        let mut outcomes = Vec::with_capacity(handles.len());
        let mut records = Vec::with_capacity(handles.len());
        for handle in handles {
            let (outcome, record, partial) = handle.await.context("baseline worker panicked")??;
            log::debug!(
                "baseline {}-{}: {} of {} samples flagged",
                outcome.antenna1,
                outcome.antenna2,
                outcome.flagged,
                outcome.samples
            );
            statistics += partial;
            outcomes.push(outcome);
            records.push(record);
        }

        let bad_baselines: Vec<Baseline> = BaselineSelectionAction::selection()
            .select(&records)
            .into_iter()
            .map(|record| record.baseline)
            .collect();
        if !bad_baselines.is_empty() {
            log::warn!("{} of {} baselines look bad", bad_baselines.len(), records.len());
        }

        Ok(WorkflowResult {
            outcomes,
            bad_baselines,
            statistics,
            metrics: metrics.snapshot(),
        })
    }
}

/// Counts into the shared recorder and logs every transition.
struct WorkerProgress<'a> {
    metrics: &'a MetricsRecorder,
    log: LoggingProgressListener,
}

impl ProgressListener for WorkerProgress<'_> {
    fn on_start_task(&self, task_no: usize, task_count: usize, description: &str) {
        self.metrics.on_start_task(task_no, task_count, description);
        self.log.on_start_task(task_no, task_count, description);
    }

    fn on_progress(&self, progress: usize, max_progress: usize) {
        self.metrics.on_progress(progress, max_progress);
        self.log.on_progress(progress, max_progress);
    }

    fn on_end_task(&self) {
        self.metrics.on_end_task();
        self.log.on_end_task();
    }
}

fn flag_baseline(
    flagger: &Flagger,
    strategy: &Strategy,
    baseline: &SyntheticBaseline,
    statistics: &mut QualityStatistics,
    metrics: &MetricsRecorder,
) -> anyhow::Result<(BaselineOutcome, BaselineRecord)> {
    let images = &baseline.images;
    let progress = WorkerProgress {
        metrics,
        log: LoggingProgressListener::new(),
    };
    let flags = flagger
        .run_with(strategy, images, None, &progress)
        .with_context(|| format!("flagging baseline {}-{}", baseline.antenna1, baseline.antenna2))?;

    let correlator = flagger.make_flag_mask(images.width(), images.height());
    flagger
        .collect_statistics(
            statistics,
            images,
            &flags,
            &correlator,
            baseline.antenna1,
            baseline.antenna2,
        )
        .context("collecting statistics")?;

    let record = BaselineRecord::measure(
        Baseline::new(baseline.antenna1, baseline.antenna2),
        images.image(0)?,
        flags.mask(),
    )?;
    let mut detected = baseline.truth.mask().clone();
    detected.intersect(flags.mask())?;
    let outcome = BaselineOutcome {
        antenna1: baseline.antenna1,
        antenna2: baseline.antenna2,
        samples: images.width() * images.height(),
        flagged: flags.mask().count_flagged(),
        injected: baseline.truth.mask().count_flagged(),
        detected: detected.count_flagged(),
        clean_range: ValueRange::of_unflagged(images.image(0)?, flags.mask()),
    };
    Ok((outcome, record))
}
