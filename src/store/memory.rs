// In: src/store/memory.rs

//! `MemoryStore`: the reference in-memory `ColumnStore`.
//!
//! Scalar columns are held as Arrow arrays and grow by concatenation on every
//! `append_rows`. Array columns are `ndarray` arrays with rows on the last axis,
//! kept as row segments: consecutive rows whose non-row shape agrees share one
//! segment, so spectral windows of different widths can live in one store.
//! A `StoreProbe` handle exposes read counts and read-ahead bookkeeping so the
//! store can be inspected after it has been boxed behind the trait.

use arrow::array::{Array, ArrayRef, BooleanArray, Float64Array, Int32Array};
use arrow::compute::concat;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use hashbrown::{HashMap, HashSet};
use ndarray::{concatenate, s, Array1, Array2, Array3, Axis};
use std::cell::RefCell;
use std::ops::Range;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::{Result, VisIterError};
use crate::frequency::{Position, SkyDirection};
use crate::store::{
    ColumnData, ColumnStore, DataDescriptionInfo, ReadAheadBudget, SpectralWindowInfo,
};
use crate::types::{ChannelSlice, Column, CorrType};

//==================================================================================
// I. Producer-Side Batch
//==================================================================================

/// One bulk append from an upstream format reader.
///
/// `scalars` carries the per-row scalar columns under their canonical names;
/// `arrays` carries the matrix and cube columns, rows last. The producer is
/// responsible for presenting rows in partition and time order.
#[derive(Debug, Clone)]
pub struct RowBatch {
    pub scalars: RecordBatch,
    pub arrays: Vec<(Column, ColumnData)>,
}

/// The storage layout each column must arrive in.
fn expected_kind(column: Column) -> &'static str {
    match column {
        Column::Antenna1
        | Column::Antenna2
        | Column::ArrayId
        | Column::FieldId
        | Column::DataDescId
        | Column::ScanNumber => "Int",
        Column::Time | Column::Interval | Column::Exposure => "Float64",
        Column::FlagRow => "Bool",
        Column::Uvw => "Float64Matrix",
        Column::Sigma | Column::Weight => "Float32Matrix",
        Column::Flag => "BoolCube",
        Column::WeightSpectrum | Column::FloatData => "Float32Cube",
        Column::Data | Column::ModelData | Column::CorrectedData => "ComplexCube",
    }
}

fn arrow_type_for(column: Column) -> Option<DataType> {
    match expected_kind(column) {
        "Int" => Some(DataType::Int32),
        "Float64" => Some(DataType::Float64),
        "Bool" => Some(DataType::Boolean),
        _ => None,
    }
}

/// Consecutive rows of one array column sharing a non-row shape.
#[derive(Debug, Clone)]
struct Segment {
    first_row: usize,
    data: ColumnData,
}

impl Segment {
    fn rows(&self) -> Range<usize> {
        self.first_row..self.first_row + self.data.rows()
    }
}

/// Every axis but the row axis.
fn inner_shape(data: &ColumnData) -> Vec<usize> {
    let mut shape = data.shape();
    shape.pop();
    shape
}

/// The segment holding all of `rows`, and `rows` relative to it.
fn locate(segments: &[Segment], column: Column, rows: &Range<usize>) -> Result<(usize, Range<usize>)> {
    segments
        .iter()
        .position(|seg| {
            let held = seg.rows();
            held.start <= rows.start && rows.end <= held.end
        })
        .map(|index| {
            let first = segments[index].first_row;
            (index, rows.start - first..rows.end - first)
        })
        .ok_or_else(|| VisIterError::ColumnRead {
            column: column.as_str(),
            reason: format!("rows {rows:?} span rows of different shape"),
        })
}

//==================================================================================
// II. Probe
//==================================================================================

#[derive(Debug, Default)]
struct ProbeState {
    reads: HashMap<Column, usize>,
    writes: HashMap<Column, usize>,
    budgets: HashMap<Column, ReadAheadBudget>,
    clears: HashMap<Column, usize>,
    read_faults: HashMap<Column, usize>,
}

/// A shared window onto a `MemoryStore`'s I/O bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct StoreProbe(Rc<RefCell<ProbeState>>);

impl StoreProbe {
    pub fn reads_of(&self, column: Column) -> usize {
        self.0.borrow().reads.get(&column).copied().unwrap_or(0)
    }

    pub fn writes_of(&self, column: Column) -> usize {
        self.0.borrow().writes.get(&column).copied().unwrap_or(0)
    }

    pub fn budget_for(&self, column: Column) -> Option<ReadAheadBudget> {
        self.0.borrow().budgets.get(&column).copied()
    }

    pub fn clears_of(&self, column: Column) -> usize {
        self.0.borrow().clears.get(&column).copied().unwrap_or(0)
    }

    /// Makes the next `count` reads of `column` fail with a transient error.
    #[cfg(test)]
    pub fn inject_read_faults(&self, column: Column, count: usize) {
        self.0.borrow_mut().read_faults.insert(column, count);
    }

    fn take_fault(&self, column: Column) -> bool {
        let mut state = self.0.borrow_mut();
        match state.read_faults.get_mut(&column) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    fn record_read(&self, column: Column) {
        *self.0.borrow_mut().reads.entry(column).or_insert(0) += 1;
    }
}

//==================================================================================
// III. The Store
//==================================================================================

#[derive(Debug, Default)]
pub struct MemoryStore {
    id: String,
    n_rows: usize,
    scalars: HashMap<Column, ArrayRef>,
    arrays: HashMap<Column, Vec<Segment>>,
    defined: HashSet<Column>,
    spectral_windows: Vec<SpectralWindowInfo>,
    data_descriptions: Vec<DataDescriptionInfo>,
    polarizations: Vec<Vec<CorrType>>,
    fields: Vec<SkyDirection>,
    position: Position,
    tile_rows: HashMap<Column, usize>,
    failing_tuning: HashSet<Column>,
    probe: StoreProbe,
}

impl MemoryStore {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_spectral_window(mut self, info: SpectralWindowInfo) -> Self {
        self.spectral_windows.push(info);
        self
    }

    pub fn with_polarization(mut self, corrs: Vec<CorrType>) -> Self {
        self.polarizations.push(corrs);
        self
    }

    pub fn with_data_description(mut self, spectral_window_id: usize, polarization_id: usize) -> Self {
        self.data_descriptions.push(DataDescriptionInfo {
            spectral_window_id,
            polarization_id,
        });
        self
    }

    pub fn with_field(mut self, direction: SkyDirection) -> Self {
        self.fields.push(direction);
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// Declares `column` as stored in tiles of `rows` rows. Zero is accepted and
    /// reported as a degenerate tile size.
    pub fn with_tile_rows(mut self, column: Column, rows: usize) -> Self {
        self.tile_rows.insert(column, rows);
        self
    }

    /// Defines a column without populating it.
    pub fn define_column(&mut self, column: Column) {
        self.defined.insert(column);
    }

    /// Makes every read-ahead request for `column` fail.
    #[cfg(test)]
    pub fn fail_tuning_for(&mut self, column: Column) {
        self.failing_tuning.insert(column);
    }

    pub fn probe(&self) -> StoreProbe {
        self.probe.clone()
    }

    /// Appends a batch of rows. Every batch after the first must carry exactly
    /// the set of columns already populated.
    pub fn append_rows(&mut self, batch: RowBatch) -> Result<()> {
        let n = batch.scalars.num_rows();

        // 1. Validate scalar columns against their expected Arrow types.
        let schema = batch.scalars.schema();
        let mut incoming: Vec<(Column, ArrayRef)> = Vec::with_capacity(schema.fields().len());
        for (i, field) in schema.fields().iter().enumerate() {
            let column = Column::from_name(field.name()).ok_or_else(|| {
                VisIterError::InvalidBatch(format!("unknown column '{}'", field.name()))
            })?;
            match arrow_type_for(column) {
                Some(expected) if &expected == field.data_type() => {}
                _ => {
                    return Err(VisIterError::InvalidBatch(format!(
                        "column {column} cannot be stored as {}",
                        field.data_type()
                    )))
                }
            }
            incoming.push((column, batch.scalars.column(i).clone()));
        }

        // 2. Validate array columns: layout and row count.
        for (column, data) in &batch.arrays {
            if data.kind_name() != expected_kind(*column) {
                return Err(VisIterError::TypeMismatch {
                    column: column.as_str(),
                    expected: expected_kind(*column),
                    found: data.kind_name(),
                });
            }
            if data.rows() != n {
                return Err(VisIterError::InvalidBatch(format!(
                    "column {column} has {} rows, batch has {n}",
                    data.rows()
                )));
            }
        }

        // 3. Later batches must match the populated column set.
        let mut columns: Vec<Column> = incoming
            .iter()
            .map(|(c, _)| *c)
            .chain(batch.arrays.iter().map(|(c, _)| *c))
            .collect();
        columns.sort();
        let before = columns.len();
        columns.dedup();
        if columns.len() != before {
            return Err(VisIterError::InvalidBatch("duplicate column".to_string()));
        }
        if self.n_rows > 0 {
            let mut populated: Vec<Column> = self
                .scalars
                .keys()
                .chain(self.arrays.keys())
                .copied()
                .collect();
            populated.sort();
            if populated != columns {
                return Err(VisIterError::InvalidBatch(format!(
                    "batch columns {columns:?} differ from stored columns {populated:?}"
                )));
            }
        }

        // 4. Merge.
        for (column, array) in incoming {
            let merged = match self.scalars.get(&column) {
                Some(existing) => concat(&[existing.as_ref(), array.as_ref()])?,
                None => array,
            };
            self.scalars.insert(column, merged);
            self.defined.insert(column);
        }
        for (column, data) in batch.arrays {
            let segments = self.arrays.entry(column).or_default();
            match segments.last_mut() {
                Some(last) if inner_shape(&last.data) == inner_shape(&data) => {
                    append_array(&mut last.data, data, column)?
                }
                _ => segments.push(Segment {
                    first_row: self.n_rows,
                    data,
                }),
            }
            self.defined.insert(column);
        }
        self.n_rows += n;
        log::trace!("store '{}' appended {n} rows ({} total)", self.id, self.n_rows);
        Ok(())
    }

    fn check_rows(&self, column: Column, rows: &Range<usize>) -> Result<()> {
        if rows.start > rows.end || rows.end > self.n_rows {
            return Err(VisIterError::ColumnRead {
                column: column.as_str(),
                reason: format!("rows {rows:?} out of range for {} rows", self.n_rows),
            });
        }
        Ok(())
    }

    fn absent(&self, column: Column) -> VisIterError {
        if self.defined.contains(&column) {
            VisIterError::ColumnRead {
                column: column.as_str(),
                reason: "column holds no data".to_string(),
            }
        } else {
            VisIterError::MissingColumn(column.as_str())
        }
    }
}

//==================================================================================
// IV. Slicing Helpers
//==================================================================================

fn append_array(existing: &mut ColumnData, incoming: ColumnData, column: Column) -> Result<()> {
    let merged = match (&*existing, incoming) {
        (ColumnData::Float32Matrix(a), ColumnData::Float32Matrix(b)) => {
            ColumnData::Float32Matrix(concatenate(Axis(1), &[a.view(), b.view()])?)
        }
        (ColumnData::Float64Matrix(a), ColumnData::Float64Matrix(b)) => {
            ColumnData::Float64Matrix(concatenate(Axis(1), &[a.view(), b.view()])?)
        }
        (ColumnData::BoolCube(a), ColumnData::BoolCube(b)) => {
            ColumnData::BoolCube(concatenate(Axis(2), &[a.view(), b.view()])?)
        }
        (ColumnData::Float32Cube(a), ColumnData::Float32Cube(b)) => {
            ColumnData::Float32Cube(concatenate(Axis(2), &[a.view(), b.view()])?)
        }
        (ColumnData::ComplexCube(a), ColumnData::ComplexCube(b)) => {
            ColumnData::ComplexCube(concatenate(Axis(2), &[a.view(), b.view()])?)
        }
        (a, b) => {
            return Err(VisIterError::TypeMismatch {
                column: column.as_str(),
                expected: a.kind_name(),
                found: b.kind_name(),
            })
        }
    };
    *existing = merged;
    Ok(())
}

fn check_channels(column: Column, channels: &ChannelSlice, n_chan: usize) -> Result<()> {
    if channels.width == 0 || channels.checked_end().map_or(true, |end| end > n_chan) {
        return Err(VisIterError::ColumnRead {
            column: column.as_str(),
            reason: format!("channel slice {channels:?} exceeds {n_chan} channels"),
        });
    }
    Ok(())
}

fn slice_cube<T: Clone>(
    cube: &Array3<T>,
    rows: Range<usize>,
    channels: Option<&ChannelSlice>,
    column: Column,
) -> Result<Array3<T>> {
    match channels {
        None => Ok(cube.slice(s![.., .., rows]).to_owned()),
        Some(ch) => {
            check_channels(column, ch, cube.shape()[1])?;
            Ok(cube
                .slice(s![.., ch.start..ch.end();ch.stride as isize, rows])
                .to_owned())
        }
    }
}

fn assign_cube<T: Clone>(
    cube: &mut Array3<T>,
    rows: Range<usize>,
    channels: Option<&ChannelSlice>,
    values: &Array3<T>,
    column: Column,
) -> Result<()> {
    if let Some(ch) = channels {
        check_channels(column, ch, cube.shape()[1])?;
    }
    let mut view = match channels {
        None => cube.slice_mut(s![.., .., rows]),
        Some(ch) => cube.slice_mut(s![.., ch.start..ch.end();ch.stride as isize, rows]),
    };
    if view.shape() != values.shape() {
        return Err(VisIterError::ShapeMismatch {
            what: column.as_str(),
            expected: view.shape().to_vec(),
            actual: values.shape().to_vec(),
        });
    }
    view.assign(values);
    Ok(())
}

fn assign_matrix<T: Clone>(
    matrix: &mut Array2<T>,
    rows: Range<usize>,
    values: &Array2<T>,
    column: Column,
) -> Result<()> {
    let mut view = matrix.slice_mut(s![.., rows]);
    if view.shape() != values.shape() {
        return Err(VisIterError::ShapeMismatch {
            what: column.as_str(),
            expected: view.shape().to_vec(),
            actual: values.shape().to_vec(),
        });
    }
    view.assign(values);
    Ok(())
}

fn scalar_slice(column: Column, array: &ArrayRef, rows: Range<usize>) -> Result<ColumnData> {
    let sliced = array.slice(rows.start, rows.len());
    let mismatch = || VisIterError::TypeMismatch {
        column: column.as_str(),
        expected: expected_kind(column),
        found: "arrow array",
    };
    match sliced.data_type() {
        DataType::Int32 => {
            let values = sliced.as_any().downcast_ref::<Int32Array>().ok_or_else(mismatch)?;
            Ok(ColumnData::Int(Array1::from_iter(values.values().iter().copied())))
        }
        DataType::Float64 => {
            let values = sliced.as_any().downcast_ref::<Float64Array>().ok_or_else(mismatch)?;
            Ok(ColumnData::Float64(Array1::from_iter(values.values().iter().copied())))
        }
        DataType::Boolean => {
            let values = sliced.as_any().downcast_ref::<BooleanArray>().ok_or_else(mismatch)?;
            Ok(ColumnData::Bool(Array1::from_iter(
                values.iter().map(|v| v.unwrap_or(false)),
            )))
        }
        _ => Err(mismatch()),
    }
}

fn scalar_array(column: Column, data: ColumnData) -> Result<ArrayRef> {
    Ok(match data {
        ColumnData::Int(values) => Arc::new(Int32Array::from(values.to_vec())) as ArrayRef,
        ColumnData::Float64(values) => Arc::new(Float64Array::from(values.to_vec())) as ArrayRef,
        ColumnData::Bool(values) => Arc::new(BooleanArray::from(values.to_vec())) as ArrayRef,
        other => {
            return Err(VisIterError::TypeMismatch {
                column: column.as_str(),
                expected: expected_kind(column),
                found: other.kind_name(),
            })
        }
    })
}

//==================================================================================
// V. ColumnStore Implementation
//==================================================================================

impl ColumnStore for MemoryStore {
    fn store_id(&self) -> &str {
        &self.id
    }

    fn row_count(&self) -> usize {
        self.n_rows
    }

    fn has_column(&self, column: Column) -> bool {
        self.defined.contains(&column)
    }

    fn is_populated(&self, column: Column) -> bool {
        self.scalars.contains_key(&column) || self.arrays.contains_key(&column)
    }

    fn shape(&self, column: Column, rows: Range<usize>) -> Result<Vec<usize>> {
        self.check_rows(column, &rows)?;
        if self.scalars.contains_key(&column) {
            return Ok(vec![rows.len()]);
        }
        let segments = self.arrays.get(&column).ok_or_else(|| self.absent(column))?;
        let (index, _) = locate(segments, column, &rows)?;
        let mut shape = inner_shape(&segments[index].data);
        shape.push(rows.len());
        Ok(shape)
    }

    fn read_range(
        &self,
        column: Column,
        rows: Range<usize>,
        channels: Option<&ChannelSlice>,
    ) -> Result<ColumnData> {
        self.check_rows(column, &rows)?;
        if self.probe.take_fault(column) {
            return Err(VisIterError::ColumnRead {
                column: column.as_str(),
                reason: "injected read fault".to_string(),
            });
        }
        self.probe.record_read(column);

        if let Some(array) = self.scalars.get(&column) {
            return scalar_slice(column, array, rows);
        }
        let channels = channels.filter(|_| column.is_channelized());
        let segments = self.arrays.get(&column).ok_or_else(|| self.absent(column))?;
        let (index, rows) = locate(segments, column, &rows)?;
        match &segments[index].data {
            ColumnData::Float32Matrix(m) => {
                Ok(ColumnData::Float32Matrix(m.slice(s![.., rows]).to_owned()))
            }
            ColumnData::Float64Matrix(m) => {
                Ok(ColumnData::Float64Matrix(m.slice(s![.., rows]).to_owned()))
            }
            ColumnData::BoolCube(c) => Ok(ColumnData::BoolCube(slice_cube(c, rows, channels, column)?)),
            ColumnData::Float32Cube(c) => {
                Ok(ColumnData::Float32Cube(slice_cube(c, rows, channels, column)?))
            }
            ColumnData::ComplexCube(c) => {
                Ok(ColumnData::ComplexCube(slice_cube(c, rows, channels, column)?))
            }
            other => Err(VisIterError::InternalError(format!(
                "array column {column} stored as {}",
                other.kind_name()
            ))),
        }
    }

    fn write_range(
        &mut self,
        column: Column,
        rows: Range<usize>,
        channels: Option<&ChannelSlice>,
        data: ColumnData,
    ) -> Result<()> {
        self.check_rows(column, &rows)?;
        if data.rows() != rows.len() {
            return Err(VisIterError::ShapeMismatch {
                what: column.as_str(),
                expected: vec![rows.len()],
                actual: vec![data.rows()],
            });
        }

        if let Some(existing) = self.scalars.get(&column) {
            let replacement = scalar_array(column, data)?;
            let prefix = existing.slice(0, rows.start);
            let suffix = existing.slice(rows.end, self.n_rows - rows.end);
            let merged = concat(&[prefix.as_ref(), replacement.as_ref(), suffix.as_ref()])?;
            self.scalars.insert(column, merged);
        } else {
            let channels = channels.filter(|_| column.is_channelized());
            let segments = self.arrays.get_mut(&column).ok_or_else(|| VisIterError::ColumnWrite {
                column: column.as_str(),
                reason: "column holds no data".to_string(),
            })?;
            let (index, rows) = locate(segments, column, &rows).map_err(|_| VisIterError::ColumnWrite {
                column: column.as_str(),
                reason: format!("rows {rows:?} span rows of different shape"),
            })?;
            match (&mut segments[index].data, data) {
                (ColumnData::Float32Matrix(m), ColumnData::Float32Matrix(v)) => {
                    assign_matrix(m, rows, &v, column)?
                }
                (ColumnData::Float64Matrix(m), ColumnData::Float64Matrix(v)) => {
                    assign_matrix(m, rows, &v, column)?
                }
                (ColumnData::BoolCube(c), ColumnData::BoolCube(v)) => {
                    assign_cube(c, rows, channels, &v, column)?
                }
                (ColumnData::Float32Cube(c), ColumnData::Float32Cube(v)) => {
                    assign_cube(c, rows, channels, &v, column)?
                }
                (ColumnData::ComplexCube(c), ColumnData::ComplexCube(v)) => {
                    assign_cube(c, rows, channels, &v, column)?
                }
                (existing, other) => {
                    return Err(VisIterError::TypeMismatch {
                        column: column.as_str(),
                        expected: existing.kind_name(),
                        found: other.kind_name(),
                    })
                }
            }
        }
        *self.probe.0.borrow_mut().writes.entry(column).or_insert(0) += 1;
        Ok(())
    }

    fn block_size_for(&self, column: Column) -> Option<usize> {
        if !self.defined.contains(&column) {
            return None;
        }
        self.tile_rows.get(&column).copied()
    }

    fn clear_read_ahead(&mut self, column: Column) -> Result<()> {
        let mut state = self.probe.0.borrow_mut();
        state.budgets.remove(&column);
        *state.clears.entry(column).or_insert(0) += 1;
        Ok(())
    }

    fn set_read_ahead_budget(&mut self, column: Column, budget: ReadAheadBudget) -> Result<()> {
        if self.failing_tuning.contains(&column) {
            return Err(VisIterError::ColumnWrite {
                column: column.as_str(),
                reason: "read-ahead request rejected".to_string(),
            });
        }
        self.probe.0.borrow_mut().budgets.insert(column, budget);
        Ok(())
    }

    fn spectral_window(&self, spw: usize) -> Result<&SpectralWindowInfo> {
        self.spectral_windows
            .get(spw)
            .ok_or(VisIterError::UnknownSpectralWindow(spw))
    }

    fn data_description(&self, ddid: usize) -> Result<DataDescriptionInfo> {
        self.data_descriptions
            .get(ddid)
            .copied()
            .ok_or(VisIterError::UnknownDataDescription(ddid))
    }

    fn corr_types(&self, polarization_id: usize) -> Result<&[CorrType]> {
        self.polarizations
            .get(polarization_id)
            .map(Vec::as_slice)
            .ok_or(VisIterError::UnknownPolarization(polarization_id))
    }

    fn observatory_position(&self) -> Position {
        self.position
    }

    fn field_direction(&self, field_id: usize) -> Result<SkyDirection> {
        self.fields
            .get(field_id)
            .copied()
            .ok_or(VisIterError::UnknownField(field_id))
    }
}
