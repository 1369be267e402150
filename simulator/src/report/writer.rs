use anyhow::Context;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use super::model::RunReport;

pub fn write_report(report: &RunReport, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating report directory {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("creating report {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report)
        .with_context(|| format!("writing report {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("flushing report {}", path.display()))?;
    log::info!("report written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::runner::BaselineOutcome;
    use rficore::data::Baseline;
    use rficore::telemetry::Metrics;
    use rficore::{StrategyFlags, TelescopeId};

    fn report() -> RunReport {
        RunReport {
            telescope: TelescopeId::Wsrt,
            flags: StrategyFlags::ROBUST,
            description: Some("unit".into()),
            total_samples: 100,
            total_flagged: 5,
            total_injected: 4,
            total_detected: 3,
            metrics: Metrics::default(),
            baselines: vec![BaselineOutcome {
                antenna1: 0,
                antenna2: 1,
                samples: 100,
                flagged: 5,
                injected: 4,
                detected: 3,
                clean_range: None,
            }],
            bad_baselines: vec![Baseline::new(0, 1)],
        }
    }

    #[test]
    fn report_is_written_under_new_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/run.json");
        write_report(&report(), &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let parsed: RunReport = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, report());
        assert_eq!(parsed.recall(), Some(0.75));
        assert_eq!(parsed.flagged_fraction(), 0.05);
    }
}
