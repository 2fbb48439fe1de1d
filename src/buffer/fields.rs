// In: src/buffer/fields.rs

//! The static field descriptor table of the attached cache.
//!
//! Each row of `cache_fields!` declares one field: its `CacheField` tag, the
//! typed slot in `CacheValues` (also the accessor name on `VisCache`), and the
//! filler that derives it. The macro generates the enum, the slot struct, the
//! `FIELD_TABLE` of fill/copy functions and the lazy accessors.

use ndarray::{Array1, Array2, Array3};

use crate::buffer::cache::VisCache;
use crate::buffer::fillers;
use crate::chunk_iter::cursor::ChunkCursor;
use crate::error::Result;
use crate::types::{Complex32, CorrType, PolFrame};

/// Derives a field from the cursor into its slot.
pub(crate) type FillFn = fn(&ChunkCursor, &mut CacheValues) -> Result<()>;
/// Copies a field's slot from one cache into another.
pub(crate) type CopyFn = fn(&CacheValues, &mut CacheValues);

pub(crate) struct FieldDescriptor {
    pub field: CacheField,
    pub fill: FillFn,
    pub copy: CopyFn,
}

macro_rules! cache_fields {
    ($($variant:ident, $slot:ident: $ty:ty => $filler:path;)+) => {
        /// A named per-RowGroup quantity held by the cache.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum CacheField {
            $($variant),+
        }

        impl CacheField {
            pub const ALL: &'static [CacheField] = &[$(CacheField::$variant),+];

            pub const fn index(self) -> usize {
                self as usize
            }

            pub const fn name(self) -> &'static str {
                match self {
                    $(CacheField::$variant => stringify!($slot)),+
                }
            }
        }

        /// Typed storage for every field. A slot is meaningful only while its
        /// validity bit is set; clearing the bit keeps the allocation.
        #[derive(Debug, Clone, Default)]
        pub struct CacheValues {
            $(pub(crate) $slot: $ty),+
        }

        pub(crate) static FIELD_TABLE: &[FieldDescriptor] = &[
            $(FieldDescriptor {
                field: CacheField::$variant,
                fill: |cursor, values| {
                    values.$slot = $filler(cursor)?;
                    Ok(())
                },
                copy: |src, dst| dst.$slot.clone_from(&src.$slot),
            }),+
        ];

        impl VisCache {
            $(
                #[doc = concat!("The `", stringify!($slot), "` field, derived on first access.")]
                pub fn $slot(&mut self) -> Result<&$ty> {
                    self.ensure(CacheField::$variant)?;
                    Ok(&self.values.$slot)
                }
            )+
        }
    };
}

cache_fields! {
    ArrayId, array_id: usize => fillers::array_id;
    FieldId, field_id: usize => fillers::field_id;
    DataDescriptionId, data_description_id: usize => fillers::data_description_id;
    SpectralWindow, spectral_window: usize => fillers::spectral_window;
    NRow, n_row: usize => fillers::n_row;
    NChannel, n_channel: usize => fillers::n_channel;
    NCorr, n_corr: usize => fillers::n_corr;
    PolFrame, pol_frame: PolFrame => fillers::pol_frame;
    CorrType, corr_type: Vec<CorrType> => fillers::corr_type;
    RowIds, row_ids: Vec<usize> => fillers::row_ids;
    Antenna1, antenna1: Array1<i32> => fillers::antenna1;
    Antenna2, antenna2: Array1<i32> => fillers::antenna2;
    Time, time: Array1<f64> => fillers::time;
    TimeInterval, time_interval: Array1<f64> => fillers::time_interval;
    Exposure, exposure: Array1<f64> => fillers::exposure;
    Scan, scan: Array1<i32> => fillers::scan;
    FlagRow, flag_row: Array1<bool> => fillers::flag_row;
    Uvw, uvw: Array2<f64> => fillers::uvw;
    Channel, channel: Vec<i32> => fillers::channel;
    Frequency, frequency: Vec<f64> => fillers::frequency;
    LsrFrequency, lsr_frequency: Vec<f64> => fillers::lsr_frequency;
    SigmaMat, sigma_mat: Array2<f32> => fillers::sigma_mat;
    WeightMat, weight_mat: Array2<f32> => fillers::weight_mat;
    WeightSpectrum, weight_spectrum: Array3<f32> => fillers::weight_spectrum;
    FlagCube, flag_cube: Array3<bool> => fillers::flag_cube;
    Flag, flag: Array2<bool> => fillers::flag;
    VisCube, vis_cube: Array3<Complex32> => fillers::vis_cube;
    ModelVisCube, model_vis_cube: Array3<Complex32> => fillers::model_vis_cube;
    CorrectedVisCube, corrected_vis_cube: Array3<Complex32> => fillers::corrected_vis_cube;
    FloatDataCube, float_data_cube: Array3<f32> => fillers::float_data_cube;
}

impl CacheField {
    pub const COUNT: usize = Self::ALL.len();

    pub(crate) fn descriptor(self) -> &'static FieldDescriptor {
        &FIELD_TABLE[self.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_rows_follow_enum_order() {
        assert_eq!(FIELD_TABLE.len(), CacheField::COUNT);
        for (i, descriptor) in FIELD_TABLE.iter().enumerate() {
            assert_eq!(descriptor.field.index(), i);
        }
    }

    #[test]
    fn test_copy_moves_one_slot_only() {
        // Arrange
        let src = CacheValues {
            n_row: 7,
            time: Array1::from(vec![1.0, 2.0]),
            ..CacheValues::default()
        };
        let mut dst = CacheValues::default();

        // Act
        (CacheField::Time.descriptor().copy)(&src, &mut dst);

        // Assert
        assert_eq!(dst.time, src.time);
        assert_eq!(dst.n_row, 0);
    }

    #[test]
    fn test_names_are_accessor_names() {
        assert_eq!(CacheField::VisCube.name(), "vis_cube");
        assert_eq!(CacheField::NChannel.name(), "n_channel");
    }
}
