// In: src/config.rs

//! The single source of truth for all iteration engine configuration.
//!
//! `IteratorConfig` is created once at the application boundary (e.g. from a JSON
//! document) and then passed down to the cursor as a shared, read-only
//! `Arc<IteratorConfig>`. Every field carries a serde default so partial
//! documents are accepted.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VisIterError};
use crate::types::Column;

//==================================================================================
// I. Core Configuration Enums & Structs
//==================================================================================

/// How a chunk is split into RowGroups.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RowGrouping {
    /// **Default:** each RowGroup holds every consecutive row sharing one timestamp.
    #[default]
    ByTimestamp,

    /// Each RowGroup holds the next `rows` rows of the chunk, regardless of time.
    Blocked { rows: usize },
}

/// Resampling scheme used when a velocity selection maps the native channel
/// grid onto a new frequency grid.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VelocityInterpolation {
    Nearest,
    #[default]
    Linear,
}

/// Settings for the `TileCacheAdvisor`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct TileCacheConfig {
    /// If false, the advisor never touches the store's read-ahead state.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// **Ceiling:** the advisor never requests a read-ahead budget above this
    /// many rows for any column.
    #[serde(default = "default_max_read_ahead_rows")]
    pub max_read_ahead_rows: usize,

    /// The columns exercised by channel-sliced access that the advisor tunes.
    #[serde(default = "default_hot_columns")]
    pub hot_columns: Vec<Column>,
}

impl Default for TileCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_read_ahead_rows: default_max_read_ahead_rows(),
            hot_columns: default_hot_columns(),
        }
    }
}

//==================================================================================
// II. The Unified IteratorConfig
//==================================================================================

/// The unified configuration for one cursor.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct IteratorConfig {
    /// The RowGroup policy applied inside every chunk.
    #[serde(default)]
    pub row_grouping: RowGrouping,

    /// If set, a partition run is additionally split into chunks whenever the
    /// time since the chunk's first row reaches this many seconds.
    #[serde(default)]
    pub chunk_interval_seconds: Option<f64>,

    /// If true, chunks whose spectral window has no explicit channel selection
    /// are skipped. Only honoured for stores that have at least one explicit
    /// selection, so an unconfigured store is still iterated in full.
    #[serde(default)]
    pub skip_unselected_windows: bool,

    #[serde(default)]
    pub tile_cache: TileCacheConfig,

    #[serde(default)]
    pub velocity_interpolation: VelocityInterpolation,
}

impl Default for IteratorConfig {
    fn default() -> Self {
        Self {
            row_grouping: RowGrouping::default(),
            chunk_interval_seconds: None,
            skip_unselected_windows: false,
            tile_cache: TileCacheConfig::default(),
            velocity_interpolation: VelocityInterpolation::default(),
        }
    }
}

impl IteratorConfig {
    /// Parses and validates a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: IteratorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Rejects settings that would make iteration ill-defined.
    pub fn validate(&self) -> Result<()> {
        if let RowGrouping::Blocked { rows: 0 } = self.row_grouping {
            return Err(VisIterError::InvalidConfig(
                "row blocking requires at least one row per group".to_string(),
            ));
        }
        if let Some(interval) = self.chunk_interval_seconds {
            if !(interval > 0.0) {
                return Err(VisIterError::InvalidConfig(format!(
                    "chunk interval must be positive, got {interval}"
                )));
            }
        }
        if self.tile_cache.max_read_ahead_rows == 0 {
            return Err(VisIterError::InvalidConfig(
                "tile cache ceiling must be at least one row".to_string(),
            ));
        }
        Ok(())
    }
}

/// Helper for `serde` to default a boolean field to true.
fn default_true() -> bool {
    true
}

/// Helper for `serde` to provide a default for `max_read_ahead_rows`.
fn default_max_read_ahead_rows() -> usize {
    65_536
}

/// Helper for `serde` to provide the default hot column list.
fn default_hot_columns() -> Vec<Column> {
    vec![
        Column::Data,
        Column::CorrectedData,
        Column::ModelData,
        Column::FloatData,
        Column::Flag,
        Column::WeightSpectrum,
        Column::Weight,
        Column::Sigma,
        Column::Uvw,
    ]
}
