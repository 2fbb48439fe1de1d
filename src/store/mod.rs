// In: src/store/mod.rs

//! The `ColumnStore` contract consumed by the cursor and the attached cache,
//! plus `MemoryStore`, the reference in-memory implementation.
//!
//! Array columns keep rows on their **last** axis: matrices are
//! `(correlation, row)` and cubes are `(correlation, channel, row)`.

use ndarray::{Array1, Array2, Array3};
use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::error::{Result, VisIterError};
use crate::frequency::{FrequencyFrame, Position, SkyDirection};
use crate::types::{ChannelSlice, Column, Complex32, CorrType};

pub mod memory;

pub use memory::{MemoryStore, RowBatch};

//==================================================================================
// I. Column Payloads
//==================================================================================

/// A typed block of values read from, or written to, one column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Int(Array1<i32>),
    Float64(Array1<f64>),
    Bool(Array1<bool>),
    Float32Matrix(Array2<f32>),
    Float64Matrix(Array2<f64>),
    BoolCube(Array3<bool>),
    Float32Cube(Array3<f32>),
    ComplexCube(Array3<Complex32>),
}

macro_rules! impl_column_data_into {
    ($($method:ident => $variant:ident($ty:ty)),+ $(,)?) => {
        impl ColumnData {
            $(
                /// Unwraps the payload, raising `TypeMismatch` for any other variant.
                pub fn $method(self, column: Column) -> Result<$ty> {
                    match self {
                        ColumnData::$variant(inner) => Ok(inner),
                        other => Err(VisIterError::TypeMismatch {
                            column: column.as_str(),
                            expected: stringify!($variant),
                            found: other.kind_name(),
                        }),
                    }
                }
            )+
        }
    };
}

impl_column_data_into!(
    into_int => Int(Array1<i32>),
    into_float64 => Float64(Array1<f64>),
    into_bool => Bool(Array1<bool>),
    into_float32_matrix => Float32Matrix(Array2<f32>),
    into_float64_matrix => Float64Matrix(Array2<f64>),
    into_bool_cube => BoolCube(Array3<bool>),
    into_float32_cube => Float32Cube(Array3<f32>),
    into_complex_cube => ComplexCube(Array3<Complex32>),
);

impl ColumnData {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ColumnData::Int(_) => "Int",
            ColumnData::Float64(_) => "Float64",
            ColumnData::Bool(_) => "Bool",
            ColumnData::Float32Matrix(_) => "Float32Matrix",
            ColumnData::Float64Matrix(_) => "Float64Matrix",
            ColumnData::BoolCube(_) => "BoolCube",
            ColumnData::Float32Cube(_) => "Float32Cube",
            ColumnData::ComplexCube(_) => "ComplexCube",
        }
    }

    /// The full shape, rows last.
    pub fn shape(&self) -> Vec<usize> {
        match self {
            ColumnData::Int(a) => a.shape().to_vec(),
            ColumnData::Float64(a) => a.shape().to_vec(),
            ColumnData::Bool(a) => a.shape().to_vec(),
            ColumnData::Float32Matrix(a) => a.shape().to_vec(),
            ColumnData::Float64Matrix(a) => a.shape().to_vec(),
            ColumnData::BoolCube(a) => a.shape().to_vec(),
            ColumnData::Float32Cube(a) => a.shape().to_vec(),
            ColumnData::ComplexCube(a) => a.shape().to_vec(),
        }
    }

    pub fn rows(&self) -> usize {
        self.shape().last().copied().unwrap_or(0)
    }
}

//==================================================================================
// II. Metadata Records
//==================================================================================

/// Per spectral window metadata.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SpectralWindowInfo {
    /// Native channel centre frequencies, Hz.
    pub chan_freq: Vec<f64>,
    pub rest_frequency: f64,
    pub frame: FrequencyFrame,
}

impl SpectralWindowInfo {
    pub fn num_chan(&self) -> usize {
        self.chan_freq.len()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDescriptionInfo {
    pub spectral_window_id: usize,
    pub polarization_id: usize,
}

/// A read-ahead request: keep enough blocks to cover `rows` rows from `anchor_row`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadAheadBudget {
    pub anchor_row: usize,
    pub rows: usize,
}

//==================================================================================
// III. The Store Contract
//==================================================================================

/// Named columns over an ordered row sequence.
///
/// Reads take `&self`; only the explicit write path and read-ahead tuning need
/// exclusive access.
pub trait ColumnStore {
    /// A label used in log records.
    fn store_id(&self) -> &str;

    fn row_count(&self) -> usize;

    /// True if the column is defined, even when it holds no data.
    fn has_column(&self, column: Column) -> bool;

    /// True if the column is defined and holds data for every row.
    fn is_populated(&self, column: Column) -> bool;

    /// The shape of the column over `rows`, rows last.
    fn shape(&self, column: Column, rows: Range<usize>) -> Result<Vec<usize>>;

    /// Reads `rows` of `column`. For channelized columns `channels` restricts the
    /// channel axis; it is ignored for all others.
    fn read_range(
        &self,
        column: Column,
        rows: Range<usize>,
        channels: Option<&ChannelSlice>,
    ) -> Result<ColumnData>;

    /// Writes `rows` of `column`. This path bypasses every cache.
    fn write_range(
        &mut self,
        column: Column,
        rows: Range<usize>,
        channels: Option<&ChannelSlice>,
        data: ColumnData,
    ) -> Result<()>;

    /// Rows per storage tile for `column`, or `None` if the column is not tiled.
    fn block_size_for(&self, column: Column) -> Option<usize>;

    /// Drops any read-ahead state held for `column`.
    fn clear_read_ahead(&mut self, column: Column) -> Result<()>;

    fn set_read_ahead_budget(&mut self, column: Column, budget: ReadAheadBudget) -> Result<()>;

    fn spectral_window(&self, spw: usize) -> Result<&SpectralWindowInfo>;

    fn data_description(&self, ddid: usize) -> Result<DataDescriptionInfo>;

    fn corr_types(&self, polarization_id: usize) -> Result<&[CorrType]>;

    fn observatory_position(&self) -> Position;

    fn field_direction(&self, field_id: usize) -> Result<SkyDirection>;
}
