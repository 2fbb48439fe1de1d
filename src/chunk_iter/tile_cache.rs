// In: src/chunk_iter/tile_cache.rs

//! The `TileCacheAdvisor`: bounds a store's read-ahead memory under sliced access.
//!
//! On a partition change the advisor clears the read-ahead state of every hot,
//! tiled column and requests a budget covering the single tile that holds the
//! first row of the new partition, capped by the configured ceiling. Tuning is a
//! hint: a failure for one column is logged and leaves that column as it was.

use crate::config::TileCacheConfig;
use crate::store::{ColumnStore, ReadAheadBudget};
use crate::types::{Column, PartitionKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotPresent,
    Unpopulated,
    NotTiled,
    DegenerateTile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TuningOutcome {
    Tuned(ReadAheadBudget),
    Skipped(SkipReason),
    Failed(String),
}

/// What the advisor did on its last run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TuningReport {
    pub store: usize,
    pub data_desc_id: usize,
    pub anchor_row: usize,
    pub outcomes: Vec<(Column, TuningOutcome)>,
}

impl TuningReport {
    pub fn outcome(&self, column: Column) -> Option<&TuningOutcome> {
        self.outcomes
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, outcome)| outcome)
    }
}

#[derive(Debug, Clone)]
pub struct TileCacheAdvisor {
    config: TileCacheConfig,
    last_seen: Option<(usize, usize)>,
    last_report: Option<TuningReport>,
    runs: usize,
}

impl TileCacheAdvisor {
    pub fn new(config: TileCacheConfig) -> Self {
        Self {
            config,
            last_seen: None,
            last_report: None,
            runs: 0,
        }
    }

    pub fn last_report(&self) -> Option<&TuningReport> {
        self.last_report.as_ref()
    }

    /// How many times the advisor has actually tuned a store.
    pub fn runs(&self) -> usize {
        self.runs
    }

    /// Forgets the last seen partition so the next `observe` always tunes.
    pub fn reset(&mut self) {
        self.last_seen = None;
    }

    /// Called on every chunk transition. Tunes only when the store or the data
    /// description differs from the previous call, or when `force` is set.
    pub fn observe(
        &mut self,
        store_index: usize,
        store: &mut dyn ColumnStore,
        key: &PartitionKey,
        anchor_row: usize,
        force: bool,
    ) {
        if !self.config.enabled {
            return;
        }
        let current = (store_index, key.data_desc_id);
        if !force && self.last_seen == Some(current) {
            return;
        }
        self.last_seen = Some(current);

        let mut outcomes = Vec::with_capacity(self.config.hot_columns.len());
        for &column in &self.config.hot_columns {
            let outcome = self.tune_column(store, column, anchor_row);
            if let TuningOutcome::Failed(reason) = &outcome {
                log::warn!(
                    "tile tuning of {column} in store '{}' failed, leaving as is: {reason}",
                    store.store_id()
                );
            }
            outcomes.push((column, outcome));
        }

        let tuned = outcomes
            .iter()
            .filter(|(_, o)| matches!(o, TuningOutcome::Tuned(_)))
            .count();
        log_metric!(
            "event" = "tile_tuning",
            "store" = store_index,
            "ddid" = key.data_desc_id,
            "anchor_row" = anchor_row,
            "tuned" = tuned
        );
        self.runs += 1;
        self.last_report = Some(TuningReport {
            store: store_index,
            data_desc_id: key.data_desc_id,
            anchor_row,
            outcomes,
        });
    }

    fn tune_column(&self, store: &mut dyn ColumnStore, column: Column, anchor_row: usize) -> TuningOutcome {
        // 1. Only defined, populated, tiled columns are candidates.
        if !store.has_column(column) {
            return TuningOutcome::Skipped(SkipReason::NotPresent);
        }
        if !store.is_populated(column) {
            return TuningOutcome::Skipped(SkipReason::Unpopulated);
        }
        let tile_rows = match store.block_size_for(column) {
            None => return TuningOutcome::Skipped(SkipReason::NotTiled),
            Some(0) => return TuningOutcome::Skipped(SkipReason::DegenerateTile),
            Some(rows) => rows,
        };

        // 2. One tile from the anchor, never above the ceiling.
        let budget = ReadAheadBudget {
            anchor_row,
            rows: tile_rows.min(self.config.max_read_ahead_rows),
        };
        let result = store
            .clear_read_ahead(column)
            .and_then(|()| store.set_read_ahead_budget(column, budget));
        match result {
            Ok(()) => TuningOutcome::Tuned(budget),
            Err(err) => TuningOutcome::Failed(err.to_string()),
        }
    }
}
