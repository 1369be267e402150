//! Strategy documents on disk.
use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::prelude::{FlagError, FlagResult};
use crate::strategy::Strategy;

pub const STRATEGY_FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct StrategyDocument {
    format_version: u32,
    strategy: Strategy,
}

/// Read and validate a strategy written by [`save_strategy`].
pub fn load_strategy(path: impl AsRef<Path>) -> FlagResult<Strategy> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| FlagError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let document: StrategyDocument = serde_json::from_str(&text).map_err(|source| FlagError::Format {
        path: path.to_path_buf(),
        source,
    })?;
    if document.format_version != STRATEGY_FORMAT_VERSION {
        return Err(FlagError::invalid(format!(
            "{}: strategy format version {} is not supported (expected {})",
            path.display(),
            document.format_version,
            STRATEGY_FORMAT_VERSION
        )));
    }
    document.strategy.validate()?;
    info!("loaded strategy from {}", path.display());
    Ok(document.strategy)
}

pub fn save_strategy(strategy: &Strategy, path: impl AsRef<Path>) -> FlagResult<()> {
    let path = path.as_ref();
    let document = StrategyDocument {
        format_version: STRATEGY_FORMAT_VERSION,
        strategy: strategy.clone(),
    };
    let text = serde_json::to_string_pretty(&document).map_err(|source| FlagError::Format {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, text).map_err(|source| FlagError::Io {
        path: path.to_path_buf(),
        source,
    })
}
