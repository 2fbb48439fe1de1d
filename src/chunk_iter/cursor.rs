// In: src/chunk_iter/cursor.rs

//! `ChunkCursor`: presents one or more column stores as a sequence of chunks,
//! each a sequence of RowGroups.
//!
//! The consumer loop is two-level:
//!
//! ```text
//! origin_chunks()
//! while more_chunks() {
//!     origin()
//!     while more() { ... ; advance() }
//!     next_chunk()
//! }
//! ```
//!
//! Every positional step bumps the cursor's invalidation **epoch**. Attached
//! caches compare the epoch they last saw against the current one before any
//! read, which is how an advance invalidates every cache attached at that
//! moment without the cursor holding references to them.

use std::cell::RefCell;
use std::ops::Range;
use std::rc::Rc;
use std::sync::Arc;

use crate::chunk_iter::partition_index::{ChunkSpan, PartitionIndex};
use crate::chunk_iter::selection::{ChannelSelection, SelectionEntry, SelectionState};
use crate::chunk_iter::tile_cache::{TileCacheAdvisor, TuningReport};
use crate::config::{IteratorConfig, RowGrouping, VelocityInterpolation};
use crate::error::{Result, VisIterError};
use crate::frequency::{
    ConversionContext, FrequencyConverter, FrequencyFrame, FrequencyGrids, Measures,
    StaticMeasures, VelocitySelection,
};
use crate::kernels::interpolate::ResamplePlan;
use crate::store::{ColumnData, ColumnStore};
use crate::types::{ChannelSlice, Column, CorrType, PartitionKey, SubChunkId};

/// A cursor shared between the iteration loop and the caches attached to it.
pub type SharedCursor = Rc<RefCell<ChunkCursor>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Unstarted,
    AtChunkOrigin,
    WithinChunk { step: usize },
    /// Every RowGroup of every channel group has been visited.
    ChunkDone,
    Exhausted,
}

/// The channel mapping of an active velocity selection.
#[derive(Debug, Clone)]
struct VelocityPlan {
    selection: VelocitySelection,
    grids: FrequencyGrids,
    resample: ResamplePlan,
    slice: ChannelSlice,
}

/// Everything the cursor knows about the current chunk.
#[derive(Debug, Clone)]
struct ChunkContext {
    ordinal: usize,
    key: PartitionKey,
    rows: Range<usize>,
    times: Vec<f64>,
    intervals: Vec<f64>,
    spw: usize,
    polarization_id: usize,
    corr_types: Vec<CorrType>,
    chan_freq: Vec<f64>,
    conversion: ConversionContext,
    selection: ChannelSelection,
    blocking: Option<usize>,
    velocity: Option<VelocityPlan>,
    group: usize,
    step: usize,
    row_group: Range<usize>,
}

impl ChunkContext {
    fn groups(&self) -> usize {
        if self.velocity.is_some() {
            1
        } else {
            self.selection.groups
        }
    }

    fn slice(&self) -> ChannelSlice {
        match &self.velocity {
            Some(plan) => plan.slice,
            None => self.selection.slice_for_group(self.group),
        }
    }

    fn row_group_end(&self, start: usize) -> usize {
        match self.blocking {
            Some(n) if n > 0 => (start + n).min(self.rows.end),
            _ => {
                let time = self.times[start - self.rows.start];
                let mut end = start + 1;
                while end < self.rows.end && self.times[end - self.rows.start] == time {
                    end += 1;
                }
                end
            }
        }
    }

    fn time_runs(&self) -> usize {
        if self.times.is_empty() {
            return 0;
        }
        1 + self.times.windows(2).filter(|w| w[1] != w[0]).count()
    }
}

fn blocking_of(grouping: RowGrouping) -> Option<usize> {
    match grouping {
        RowGrouping::ByTimestamp => None,
        RowGrouping::Blocked { rows } => Some(rows),
    }
}

fn build_velocity_plan(
    converter: &FrequencyConverter,
    selection: &VelocitySelection,
    context: &ConversionContext,
    chan_freq: &[f64],
    method: VelocityInterpolation,
) -> Result<VelocityPlan> {
    let grids = converter.convert(selection, context)?;
    let full = ResamplePlan::new(chan_freq, &grids.selected, method);
    let (lo, hi) = full.native_span().ok_or_else(|| {
        VisIterError::VelocitySelection(
            "the selected velocities fall outside the spectral window".to_string(),
        )
    })?;
    Ok(VelocityPlan {
        selection: *selection,
        grids,
        resample: full.rebased(lo),
        slice: ChannelSlice::new(lo, hi - lo + 1, 1),
    })
}

pub struct ChunkCursor {
    stores: Vec<Box<dyn ColumnStore>>,
    indices: Vec<PartitionIndex>,
    config: Arc<IteratorConfig>,
    converter: FrequencyConverter,
    selection: SelectionState,
    velocity: Option<VelocitySelection>,
    row_blocking: Option<usize>,
    advisor: TileCacheAdvisor,
    state: CursorState,
    position: Option<(usize, usize)>,
    chunk: Option<ChunkContext>,
    chunk_ordinal: usize,
    epoch: u64,
}

impl ChunkCursor {
    //==============================================================================
    // 1. Construction
    //==============================================================================

    /// Builds a cursor over `stores`, scanning each store's partition keys once.
    pub fn new(
        stores: Vec<Box<dyn ColumnStore>>,
        config: Arc<IteratorConfig>,
        measures: Box<dyn Measures>,
    ) -> Result<Self> {
        config.validate()?;
        let indices = stores
            .iter()
            .map(|store| PartitionIndex::build(store.as_ref(), config.chunk_interval_seconds))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            stores,
            indices,
            row_blocking: blocking_of(config.row_grouping),
            advisor: TileCacheAdvisor::new(config.tile_cache.clone()),
            config,
            converter: FrequencyConverter::new(measures),
            selection: SelectionState::new(),
            velocity: None,
            state: CursorState::Unstarted,
            position: None,
            chunk: None,
            chunk_ordinal: 0,
            epoch: 0,
        })
    }

    /// A single-store cursor using `StaticMeasures`.
    pub fn with_store(store: impl ColumnStore + 'static, config: Arc<IteratorConfig>) -> Result<Self> {
        Self::new(
            vec![Box::new(store) as Box<dyn ColumnStore>],
            config,
            Box::new(StaticMeasures::new()),
        )
    }

    pub fn into_shared(self) -> SharedCursor {
        Rc::new(RefCell::new(self))
    }

    //==============================================================================
    // 2. Chunk-Level Navigation
    //==============================================================================

    /// Resets to the first chunk of the first store. A cursor over empty stores
    /// is left exhausted, which is not an error.
    pub fn origin_chunks(&mut self) -> Result<()> {
        self.chunk_ordinal = 0;
        self.advisor.reset();
        self.publish_invalidation();
        self.position = None;
        match self.find_from(0, 0) {
            None => {
                log::debug!("origin_chunks: no rows to iterate");
                self.chunk = None;
                self.state = CursorState::Exhausted;
                Ok(())
            }
            Some(pos) => {
                self.enter_chunk(pos, true)?;
                self.origin()
            }
        }
    }

    /// Like `origin_chunks`, but first re-scans every store's partition keys,
    /// picking up key columns rewritten through the write path.
    pub fn origin_chunks_forced(&mut self) -> Result<()> {
        self.indices = self
            .stores
            .iter()
            .map(|store| PartitionIndex::build(store.as_ref(), self.config.chunk_interval_seconds))
            .collect::<Result<Vec<_>>>()?;
        self.origin_chunks()
    }

    pub fn more_chunks(&self) -> bool {
        self.chunk.is_some()
    }

    /// Moves to the next chunk, crossing into the next store when the current one
    /// is used up, and positions it at its origin.
    pub fn next_chunk(&mut self) -> Result<()> {
        let Some((store_index, span_index)) = self.position else {
            return Ok(());
        };
        self.publish_invalidation();
        match self.find_from(store_index, span_index + 1) {
            None => {
                log::debug!("next_chunk: iteration exhausted after {} chunks", self.chunk_ordinal + 1);
                self.position = None;
                self.chunk = None;
                self.state = CursorState::Exhausted;
                Ok(())
            }
            Some(pos) => {
                if pos.0 != store_index {
                    log::debug!(
                        "next_chunk: entering store '{}'",
                        self.stores[pos.0].store_id()
                    );
                }
                self.chunk_ordinal += 1;
                self.enter_chunk(pos, false)?;
                self.origin()
            }
        }
    }

    fn span_is_selected(&self, store_index: usize, span: &ChunkSpan) -> bool {
        if !self.config.skip_unselected_windows || !self.selection.has_explicit(store_index) {
            return true;
        }
        match self.stores[store_index].data_description(span.key.data_desc_id) {
            Ok(dd) => self.selection.is_explicit(store_index, dd.spectral_window_id),
            // Let `enter_chunk` report the broken description.
            Err(_) => true,
        }
    }

    fn find_from(&self, mut store_index: usize, mut span_index: usize) -> Option<(usize, usize)> {
        while store_index < self.stores.len() {
            let spans = self.indices[store_index].spans();
            while span_index < spans.len() {
                if self.span_is_selected(store_index, &spans[span_index]) {
                    return Some((store_index, span_index));
                }
                span_index += 1;
            }
            store_index += 1;
            span_index = 0;
        }
        None
    }

    /// Loads the per-chunk state: metadata, the time and interval columns for
    /// every row, the conversion context and the default selection. Retunes the
    /// store's read-ahead when the store or data description changed.
    fn enter_chunk(&mut self, (store_index, span_index): (usize, usize), force_tune: bool) -> Result<()> {
        self.chunk = None;
        self.state = CursorState::Unstarted;
        let span = self.indices[store_index].spans()[span_index].clone();
        let store = self.stores[store_index].as_ref();

        // 1. Resolve the chunk's metadata.
        let dd = store.data_description(span.key.data_desc_id)?;
        let window = store.spectral_window(dd.spectral_window_id)?;
        let chan_freq = window.chan_freq.clone();
        let rest_frequency = window.rest_frequency;
        let corr_types = store.corr_types(dd.polarization_id)?.to_vec();

        // 2. Per-row time and interval for the whole chunk.
        let times = store
            .read_range(Column::Time, span.rows.clone(), None)?
            .into_float64(Column::Time)?
            .to_vec();
        let intervals = if store.is_populated(Column::Interval) {
            store
                .read_range(Column::Interval, span.rows.clone(), None)?
                .into_float64(Column::Interval)?
                .to_vec()
        } else {
            vec![0.0; span.rows.len()]
        };

        // 3. Reference context, constant for the chunk.
        let conversion = ConversionContext {
            time: times.first().copied().unwrap_or(0.0),
            position: store.observatory_position(),
            direction: store.field_direction(span.key.field_id)?,
            rest_frequency,
        };

        // 4. Default the selection the first time this window is seen.
        let entry = self
            .selection
            .get_or_default(store_index, dd.spectral_window_id, chan_freq.len());

        // 5. Tile tuning on partition change.
        self.advisor.observe(
            store_index,
            self.stores[store_index].as_mut(),
            &span.key,
            span.rows.start,
            force_tune,
        );

        log::debug!(
            "chunk {}: store {store_index} key {:?} rows {:?} spw {}",
            self.chunk_ordinal,
            span.key,
            span.rows,
            dd.spectral_window_id
        );
        self.position = Some((store_index, span_index));
        self.chunk = Some(ChunkContext {
            ordinal: self.chunk_ordinal,
            key: span.key,
            row_group: span.rows.start..span.rows.start,
            rows: span.rows,
            times,
            intervals,
            spw: dd.spectral_window_id,
            polarization_id: dd.polarization_id,
            corr_types,
            chan_freq,
            conversion,
            selection: entry.selection,
            blocking: self.row_blocking,
            velocity: None,
            group: 0,
            step: 0,
        });
        Ok(())
    }

    //==============================================================================
    // 3. RowGroup-Level Navigation
    //==============================================================================

    /// Restarts the current chunk at its first RowGroup of channel group 0.
    ///
    /// Selection, row blocking and velocity settings made since the chunk was
    /// entered take effect here.
    pub fn origin(&mut self) -> Result<()> {
        let (store_index, _) = self.position.ok_or(VisIterError::NotPositioned)?;
        let (spw, n_chan, stale_velocity) = {
            let chunk = self.chunk.as_ref().ok_or(VisIterError::NotPositioned)?;
            let current = chunk.velocity.as_ref().map(|plan| plan.selection);
            (chunk.spw, chunk.chan_freq.len(), current != self.velocity)
        };

        // 1. Snapshot the selection table.
        let entry = self.selection.get_or_default(store_index, spw, n_chan);

        // 2. Velocity grids, recomputed only when the selection changed.
        let velocity = match (&self.velocity, stale_velocity) {
            (Some(selection), true) => {
                let chunk = self.chunk.as_ref().ok_or(VisIterError::NotPositioned)?;
                Some(Some(build_velocity_plan(
                    &self.converter,
                    selection,
                    &chunk.conversion,
                    &chunk.chan_freq,
                    self.config.velocity_interpolation,
                )?))
            }
            (None, true) => Some(None),
            (_, false) => None,
        };

        // 3. First RowGroup.
        let blocking = self.row_blocking;
        let chunk = self.chunk.as_mut().ok_or(VisIterError::NotPositioned)?;
        if let Some(plan) = velocity {
            chunk.velocity = plan;
        }
        chunk.selection = entry.selection;
        chunk.blocking = blocking;
        chunk.group = 0;
        chunk.step = 0;
        let start = chunk.rows.start;
        chunk.row_group = start..chunk.row_group_end(start);
        log_metric!("event" = "row_group", "chunk" = chunk.ordinal, "step" = 0, "rows" = chunk.row_group.len());

        self.state = CursorState::AtChunkOrigin;
        self.publish_invalidation();
        Ok(())
    }

    /// Steps to the next RowGroup; past the last row of the chunk, to the first
    /// RowGroup of the next channel group, or to `ChunkDone`.
    pub fn advance(&mut self) -> Result<()> {
        if !self.more() {
            return Ok(());
        }
        let chunk = self.chunk.as_mut().ok_or(VisIterError::NotPositioned)?;
        let mut start = chunk.row_group.end;
        if start >= chunk.rows.end {
            chunk.group += 1;
            if chunk.group >= chunk.groups() {
                self.state = CursorState::ChunkDone;
                self.publish_invalidation();
                return Ok(());
            }
            start = chunk.rows.start;
        }
        chunk.step += 1;
        chunk.row_group = start..chunk.row_group_end(start);
        log_metric!(
            "event" = "row_group",
            "chunk" = chunk.ordinal,
            "step" = chunk.step,
            "rows" = chunk.row_group.len()
        );
        self.state = CursorState::WithinChunk { step: chunk.step };
        self.publish_invalidation();
        Ok(())
    }

    pub fn more(&self) -> bool {
        matches!(
            self.state,
            CursorState::AtChunkOrigin | CursorState::WithinChunk { .. }
        )
    }

    fn publish_invalidation(&mut self) {
        self.epoch += 1;
    }

    //==============================================================================
    // 4. Selection
    //==============================================================================

    /// Sets the channel selection for `spw` in every store that has that window.
    ///
    /// The selection is validated against each window's channel count before any
    /// store is updated. It applies from the next `origin`, `next_chunk` or
    /// `origin_chunks` that enters the window; the active chunk is not resliced.
    pub fn select_channel(&mut self, spw: usize, selection: ChannelSelection) -> Result<()> {
        let mut targets = Vec::new();
        for (store_index, store) in self.stores.iter().enumerate() {
            match store.spectral_window(spw) {
                Ok(window) => {
                    selection.validate(spw, window.num_chan())?;
                    targets.push(store_index);
                }
                Err(VisIterError::UnknownSpectralWindow(_)) => continue,
                Err(err) => return Err(err),
            }
        }
        if targets.is_empty() {
            return Err(VisIterError::UnknownSpectralWindow(spw));
        }
        for store_index in targets {
            self.selection.set(store_index, spw, selection);
        }
        Ok(())
    }

    /// Sets the channel selection for `spw` in one store only.
    pub fn select_channel_for_store(
        &mut self,
        store_index: usize,
        spw: usize,
        selection: ChannelSelection,
    ) -> Result<()> {
        let store = self
            .stores
            .get(store_index)
            .ok_or(VisIterError::UnknownStore(store_index))?;
        selection.validate(spw, store.spectral_window(spw)?.num_chan())?;
        self.selection.set(store_index, spw, selection);
        Ok(())
    }

    /// Every selection entry of `store_index`, explicit and defaulted.
    pub fn channel_selection(&self, store_index: usize) -> Vec<(usize, SelectionEntry)> {
        self.selection.entries(store_index)
    }

    pub fn is_selection_defaulted(&self, store_index: usize, spw: usize) -> Option<bool> {
        self.selection.is_defaulted(store_index, spw)
    }

    /// Replaces channel selections with a velocity grid from the next `origin`.
    pub fn select_velocity(&mut self, selection: VelocitySelection) -> Result<()> {
        selection.validate()?;
        self.velocity = Some(selection);
        Ok(())
    }

    pub fn clear_velocity_selection(&mut self) {
        self.velocity = None;
    }

    /// `Some(n)` groups RowGroups by `n` rows, `None` by timestamp. Applies from
    /// the next `origin`.
    pub fn set_row_blocking(&mut self, rows: Option<usize>) {
        self.row_blocking = rows.filter(|&n| n > 0);
    }

    //==============================================================================
    // 5. Accessors Used by the Attached Cache
    //==============================================================================

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Bumped on every positional step.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn config(&self) -> &IteratorConfig {
        &self.config
    }

    pub fn store_count(&self) -> usize {
        self.stores.len()
    }

    pub fn store(&self, store_index: usize) -> Option<&dyn ColumnStore> {
        self.stores.get(store_index).map(|store| store.as_ref())
    }

    pub fn store_index(&self) -> Option<usize> {
        self.position.map(|(store_index, _)| store_index)
    }

    pub fn current_key(&self) -> Option<PartitionKey> {
        self.chunk.as_ref().map(|chunk| chunk.key)
    }

    pub fn tuning_report(&self) -> Option<&TuningReport> {
        self.advisor.last_report()
    }

    fn chunk(&self) -> Result<&ChunkContext> {
        self.chunk.as_ref().ok_or(VisIterError::NotPositioned)
    }

    fn current_store(&self) -> Result<&dyn ColumnStore> {
        let (store_index, _) = self.position.ok_or(VisIterError::NotPositioned)?;
        Ok(self.stores[store_index].as_ref())
    }

    /// The rows of the current RowGroup.
    pub fn row_group(&self) -> Result<Range<usize>> {
        if !self.more() {
            return Err(VisIterError::NotPositioned);
        }
        Ok(self.chunk()?.row_group.clone())
    }

    pub fn chunk_rows(&self) -> Result<Range<usize>> {
        Ok(self.chunk()?.rows.clone())
    }

    pub fn chunk_times(&self) -> Result<&[f64]> {
        Ok(&self.chunk()?.times)
    }

    pub fn chunk_intervals(&self) -> Result<&[f64]> {
        Ok(&self.chunk()?.intervals)
    }

    pub fn spectral_window(&self) -> Result<usize> {
        Ok(self.chunk()?.spw)
    }

    pub fn polarization_id(&self) -> Result<usize> {
        Ok(self.chunk()?.polarization_id)
    }

    pub fn corr_types(&self) -> Result<&[CorrType]> {
        Ok(&self.chunk()?.corr_types)
    }

    pub fn channel_group(&self) -> Result<usize> {
        Ok(self.chunk()?.group)
    }

    /// The physical channels read for the current RowGroup.
    pub fn channel_slice(&self) -> Result<ChannelSlice> {
        Ok(self.chunk()?.slice())
    }

    /// Output channels per RowGroup.
    pub fn n_channels(&self) -> Result<usize> {
        let chunk = self.chunk()?;
        Ok(match &chunk.velocity {
            Some(plan) => plan.resample.len(),
            None => chunk.slice().width,
        })
    }

    /// Channel numbers of the output channels: the physical channel ids, or the
    /// output positions under a velocity selection.
    pub fn channel_numbers(&self) -> Result<Vec<i32>> {
        let chunk = self.chunk()?;
        Ok(match &chunk.velocity {
            Some(plan) => (0..plan.resample.len() as i32).collect(),
            None => chunk.slice().channel_indices().map(|c| c as i32).collect(),
        })
    }

    /// Native frequencies of the output channels.
    pub fn frequencies(&self) -> Result<Vec<f64>> {
        let chunk = self.chunk()?;
        Ok(match &chunk.velocity {
            Some(plan) => plan.grids.selected.clone(),
            None => chunk.slice().channel_indices().map(|c| chunk.chan_freq[c]).collect(),
        })
    }

    /// Output channel frequencies in the LSRK frame, or the selection's reference
    /// grid under a velocity selection.
    pub fn lsr_frequencies(&self) -> Result<Vec<f64>> {
        let chunk = self.chunk()?;
        match &chunk.velocity {
            Some(plan) => Ok(plan.grids.reference.clone()),
            None => self
                .converter
                .to_frame(&self.frequencies()?, &chunk.conversion, FrequencyFrame::Lsrk),
        }
    }

    pub fn velocity_grids(&self) -> Option<&FrequencyGrids> {
        self.chunk.as_ref()?.velocity.as_ref().map(|plan| &plan.grids)
    }

    /// The resampling applied to channelized reads, if a velocity selection is active.
    pub fn resample_plan(&self) -> Result<Option<&ResamplePlan>> {
        Ok(self.chunk()?.velocity.as_ref().map(|plan| &plan.resample))
    }

    pub fn has_column(&self, column: Column) -> Result<bool> {
        Ok(self.current_store()?.has_column(column))
    }

    pub fn is_populated(&self, column: Column) -> Result<bool> {
        Ok(self.current_store()?.is_populated(column))
    }

    /// Reads `column` for the current RowGroup, sliced on the channel axis.
    pub fn read_column(&self, column: Column) -> Result<ColumnData> {
        let rows = self.row_group()?;
        let slice = self.channel_slice()?;
        let channels = column.is_channelized().then_some(&slice);
        log::trace!("read {column} rows {rows:?}");
        self.current_store()?.read_range(column, rows, channels)
    }

    pub fn sub_chunk_id(&self) -> Option<SubChunkId> {
        if !self.more() {
            return None;
        }
        self.chunk.as_ref().map(|chunk| SubChunkId {
            chunk: chunk.ordinal,
            sub_chunk: chunk.step,
        })
    }

    /// RowGroups in the current chunk across all channel groups.
    pub fn sub_chunk_count(&self) -> Result<usize> {
        let chunk = self.chunk()?;
        let per_group = match chunk.blocking {
            Some(n) if n > 0 => chunk.rows.len().div_ceil(n),
            _ => chunk.time_runs(),
        };
        Ok(per_group * chunk.groups())
    }

    //==============================================================================
    // 6. Write Path
    //==============================================================================

    /// Writes `data` to the current RowGroup and channel slice. This does not
    /// invalidate any cache: an attached cache keeps the values it already holds.
    pub fn put_column(&mut self, column: Column, data: ColumnData) -> Result<()> {
        let rows = self.row_group()?;
        let chunk = self.chunk()?;
        if column.is_channelized() && chunk.velocity.is_some() {
            return Err(VisIterError::UnsupportedTransform(
                "cannot write channelized columns through a velocity selection".to_string(),
            ));
        }
        let slice = chunk.slice();
        let (store_index, _) = self.position.ok_or(VisIterError::NotPositioned)?;
        let channels = column.is_channelized().then_some(&slice);
        self.stores[store_index].write_range(column, rows, channels, data)
    }
}
