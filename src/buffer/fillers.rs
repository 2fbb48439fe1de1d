// In: src/buffer/fillers.rs

//! One filler per cache field: a pure function of the cursor's current RowGroup.
//!
//! Optional columns fill as empty arrays when the store does not populate them.
//! Channelized fillers apply the velocity resampling plan when one is active.

use ndarray::{Array1, Array2, Array3, Axis};

use crate::chunk_iter::cursor::ChunkCursor;
use crate::error::{Result, VisIterError};
use crate::store::ColumnData;
use crate::types::{Column, Complex32, CorrType, PartitionKey, PolFrame};

//==================================================================================
// 1. Helpers
//==================================================================================

fn key(cursor: &ChunkCursor) -> Result<PartitionKey> {
    cursor.current_key().ok_or(VisIterError::NotPositioned)
}

/// Reads `column` if populated, otherwise returns `empty`.
fn read_optional<T>(
    cursor: &ChunkCursor,
    column: Column,
    empty: T,
    unwrap: fn(ColumnData, Column) -> Result<T>,
) -> Result<T> {
    if !cursor.is_populated(column)? {
        return Ok(empty);
    }
    unwrap(cursor.read_column(column)?, column)
}

fn resampled_complex(cursor: &ChunkCursor, cube: Array3<Complex32>) -> Result<Array3<Complex32>> {
    Ok(match cursor.resample_plan()? {
        Some(plan) if !cube.is_empty() => plan.resample(cube.view()),
        _ => cube,
    })
}

fn resampled_float(cursor: &ChunkCursor, cube: Array3<f32>) -> Result<Array3<f32>> {
    Ok(match cursor.resample_plan()? {
        Some(plan) if !cube.is_empty() => plan.resample(cube.view()),
        _ => cube,
    })
}

fn complex_cube(cursor: &ChunkCursor, column: Column) -> Result<Array3<Complex32>> {
    let cube = read_optional(
        cursor,
        column,
        Array3::default((0, 0, 0)),
        ColumnData::into_complex_cube,
    )?;
    resampled_complex(cursor, cube)
}

//==================================================================================
// 2. Partition and Shape Fields
//==================================================================================

pub fn array_id(cursor: &ChunkCursor) -> Result<usize> {
    Ok(key(cursor)?.array_id)
}

pub fn field_id(cursor: &ChunkCursor) -> Result<usize> {
    Ok(key(cursor)?.field_id)
}

pub fn data_description_id(cursor: &ChunkCursor) -> Result<usize> {
    Ok(key(cursor)?.data_desc_id)
}

pub fn spectral_window(cursor: &ChunkCursor) -> Result<usize> {
    cursor.spectral_window()
}

pub fn n_row(cursor: &ChunkCursor) -> Result<usize> {
    Ok(cursor.row_group()?.len())
}

pub fn n_channel(cursor: &ChunkCursor) -> Result<usize> {
    cursor.n_channels()
}

pub fn n_corr(cursor: &ChunkCursor) -> Result<usize> {
    Ok(cursor.corr_types()?.len())
}

pub fn pol_frame(cursor: &ChunkCursor) -> Result<PolFrame> {
    Ok(PolFrame::from_corr_types(cursor.corr_types()?))
}

pub fn corr_type(cursor: &ChunkCursor) -> Result<Vec<CorrType>> {
    Ok(cursor.corr_types()?.to_vec())
}

pub fn row_ids(cursor: &ChunkCursor) -> Result<Vec<usize>> {
    Ok(cursor.row_group()?.collect())
}

//==================================================================================
// 3. Row Fields
//==================================================================================

pub fn antenna1(cursor: &ChunkCursor) -> Result<Array1<i32>> {
    cursor.read_column(Column::Antenna1)?.into_int(Column::Antenna1)
}

pub fn antenna2(cursor: &ChunkCursor) -> Result<Array1<i32>> {
    cursor.read_column(Column::Antenna2)?.into_int(Column::Antenna2)
}

pub fn time(cursor: &ChunkCursor) -> Result<Array1<f64>> {
    cursor.read_column(Column::Time)?.into_float64(Column::Time)
}

pub fn time_interval(cursor: &ChunkCursor) -> Result<Array1<f64>> {
    read_optional(cursor, Column::Interval, Array1::default(0), |d, c| d.into_float64(c))
}

pub fn exposure(cursor: &ChunkCursor) -> Result<Array1<f64>> {
    read_optional(cursor, Column::Exposure, Array1::default(0), |d, c| d.into_float64(c))
}

pub fn scan(cursor: &ChunkCursor) -> Result<Array1<i32>> {
    read_optional(cursor, Column::ScanNumber, Array1::default(0), |d, c| d.into_int(c))
}

pub fn flag_row(cursor: &ChunkCursor) -> Result<Array1<bool>> {
    cursor.read_column(Column::FlagRow)?.into_bool(Column::FlagRow)
}

pub fn uvw(cursor: &ChunkCursor) -> Result<Array2<f64>> {
    cursor.read_column(Column::Uvw)?.into_float64_matrix(Column::Uvw)
}

pub fn sigma_mat(cursor: &ChunkCursor) -> Result<Array2<f32>> {
    cursor.read_column(Column::Sigma)?.into_float32_matrix(Column::Sigma)
}

pub fn weight_mat(cursor: &ChunkCursor) -> Result<Array2<f32>> {
    cursor.read_column(Column::Weight)?.into_float32_matrix(Column::Weight)
}

//==================================================================================
// 4. Channel Axis Fields
//==================================================================================

pub fn channel(cursor: &ChunkCursor) -> Result<Vec<i32>> {
    cursor.channel_numbers()
}

pub fn frequency(cursor: &ChunkCursor) -> Result<Vec<f64>> {
    cursor.frequencies()
}

pub fn lsr_frequency(cursor: &ChunkCursor) -> Result<Vec<f64>> {
    cursor.lsr_frequencies()
}

pub fn weight_spectrum(cursor: &ChunkCursor) -> Result<Array3<f32>> {
    let cube = read_optional(cursor, Column::WeightSpectrum, Array3::default((0, 0, 0)), |d, c| {
        d.into_float32_cube(c)
    })?;
    resampled_float(cursor, cube)
}

/// Points outside the native grid of a velocity selection come back flagged.
pub fn flag_cube(cursor: &ChunkCursor) -> Result<Array3<bool>> {
    let cube = cursor.read_column(Column::Flag)?.into_bool_cube(Column::Flag)?;
    Ok(match cursor.resample_plan()? {
        Some(plan) => plan.resample_flags(cube.view()),
        None => cube,
    })
}

/// `(channel, row)`: set where any correlation is flagged.
pub fn flag(cursor: &ChunkCursor) -> Result<Array2<bool>> {
    Ok(any_correlation(&flag_cube(cursor)?))
}

pub(crate) fn any_correlation(cube: &Array3<bool>) -> Array2<bool> {
    cube.map_axis(Axis(0), |lane| lane.iter().any(|&f| f))
}

//==================================================================================
// 5. Data Cubes
//==================================================================================

pub fn vis_cube(cursor: &ChunkCursor) -> Result<Array3<Complex32>> {
    complex_cube(cursor, Column::Data)
}

pub fn model_vis_cube(cursor: &ChunkCursor) -> Result<Array3<Complex32>> {
    complex_cube(cursor, Column::ModelData)
}

pub fn corrected_vis_cube(cursor: &ChunkCursor) -> Result<Array3<Complex32>> {
    complex_cube(cursor, Column::CorrectedData)
}

pub fn float_data_cube(cursor: &ChunkCursor) -> Result<Array3<f32>> {
    let cube = read_optional(cursor, Column::FloatData, Array3::default((0, 0, 0)), |d, c| {
        d.into_float32_cube(c)
    })?;
    resampled_float(cursor, cube)
}
