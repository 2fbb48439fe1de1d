// In: src/buffer/cache.rs

//! `VisCache`: per-RowGroup fields derived lazily from an attached cursor.
//!
//! The cache holds a weak link to its cursor and the cursor epoch it last saw.
//! Before every read, validity query and detach the cache compares that epoch
//! with the cursor's; on a mismatch every validity bit is cleared. A detached
//! cache performs no such check, so its filled values stay frozen.

use bitvec::prelude::*;
use ndarray::{Array1, Array2, Array3};
use std::rc::{Rc, Weak};
use std::cell::RefCell;

use crate::buffer::fields::{CacheField, CacheValues};
use crate::buffer::fillers::any_correlation;
use crate::chunk_iter::cursor::{ChunkCursor, SharedCursor};
use crate::error::{Result, VisIterError};
use crate::types::Complex32;

pub struct VisCache {
    pub(super) cursor: Weak<RefCell<ChunkCursor>>,
    pub(super) values: CacheValues,
    pub(super) valid: BitVec,
    pub(super) seen_epoch: u64,
    pub(super) corr_sorted: bool,
}

impl Default for VisCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let valid: Vec<&str> = CacheField::ALL
            .iter()
            .filter(|field| self.valid[field.index()])
            .map(|field| field.name())
            .collect();
        f.debug_struct("VisCache")
            .field("attached", &self.is_attached())
            .field("seen_epoch", &self.seen_epoch)
            .field("valid", &valid)
            .field("corr_sorted", &self.corr_sorted)
            .finish()
    }
}

impl VisCache {
    //==============================================================================
    // 1. Attachment
    //==============================================================================

    /// A detached cache with every field invalid.
    pub fn new() -> Self {
        Self {
            cursor: Weak::new(),
            values: CacheValues::default(),
            valid: bitvec![0; CacheField::COUNT],
            seen_epoch: 0,
            corr_sorted: false,
        }
    }

    pub fn attached_to(cursor: &SharedCursor) -> Self {
        let mut cache = Self::new();
        cache.attach(cursor);
        cache
    }

    /// Links the cache to `cursor`, replacing any previous link, and
    /// invalidates every field.
    pub fn attach(&mut self, cursor: &SharedCursor) {
        self.seen_epoch = cursor.borrow().epoch();
        self.cursor = Rc::downgrade(cursor);
        self.invalidate_all();
    }

    /// Drops the cursor link. Values filled for the current RowGroup are kept;
    /// anything invalidated by an advance since the last access is dropped first.
    pub fn detach(&mut self) {
        self.sync();
        self.cursor = Weak::new();
    }

    pub fn is_attached(&self) -> bool {
        self.cursor.strong_count() > 0
    }

    //==============================================================================
    // 2. Validity
    //==============================================================================

    /// Clears every validity bit. Storage is kept for reuse.
    pub fn invalidate_all(&mut self) {
        self.valid.fill(false);
        self.corr_sorted = false;
    }

    pub fn is_valid(&mut self, field: CacheField) -> bool {
        self.sync();
        self.valid[field.index()]
    }

    /// Observes any advance of the attached cursor since the last access.
    fn sync(&mut self) {
        if let Some(cursor) = self.cursor.upgrade() {
            let epoch = cursor.borrow().epoch();
            if epoch != self.seen_epoch {
                log::trace!("cache invalidated: epoch {} -> {epoch}", self.seen_epoch);
                self.seen_epoch = epoch;
                self.invalidate_all();
            }
        }
    }

    /// Fills `field` if it is not valid. A failed fill leaves it invalid.
    pub(crate) fn ensure(&mut self, field: CacheField) -> Result<()> {
        self.sync();
        if self.valid[field.index()] {
            return Ok(());
        }
        let cursor = self
            .cursor
            .upgrade()
            .ok_or(VisIterError::NoCursor(field.name()))?;
        let cursor = cursor.borrow();
        (field.descriptor().fill)(&cursor, &mut self.values)?;
        self.valid.set(field.index(), true);
        log_metric!("event" = "cache_fill", "field" = field.name());
        Ok(())
    }

    pub(crate) fn ensure_all(&mut self, fields: &[CacheField]) -> Result<()> {
        fields.iter().try_for_each(|&field| self.ensure(field))
    }

    pub(crate) fn mark_valid(&mut self, field: CacheField) {
        self.valid.set(field.index(), true);
    }

    //==============================================================================
    // 3. Copy / Assignment
    //==============================================================================

    /// Copies `other` into `self` and adopts its cursor link.
    ///
    /// Without `force_copy` only the fields valid in `other` are copied and the
    /// rest are left invalid. With `force_copy` every field of `other` is first
    /// derived, so none is invalid afterwards.
    pub fn assign(&mut self, other: &mut VisCache, force_copy: bool) -> Result<()> {
        other.sync();
        if other.corr_sorted {
            return Err(VisIterError::CorrelationsSorted);
        }
        if force_copy {
            other.ensure_all(CacheField::ALL)?;
        }

        self.cursor = other.cursor.clone();
        self.seen_epoch = other.seen_epoch;
        self.corr_sorted = false;
        for &field in CacheField::ALL {
            let bit = other.valid[field.index()];
            if bit {
                (field.descriptor().copy)(&other.values, &mut self.values);
            }
            self.valid.set(field.index(), bit);
        }
        Ok(())
    }

    //==============================================================================
    // 4. Setters
    //==============================================================================

    fn expect_shape(what: &'static str, expected: &[usize], actual: &[usize]) -> Result<()> {
        if expected != actual {
            return Err(VisIterError::ShapeMismatch {
                what,
                expected: expected.to_vec(),
                actual: actual.to_vec(),
            });
        }
        Ok(())
    }

    fn cube_shape(&mut self) -> Result<[usize; 3]> {
        Ok([*self.n_corr()?, *self.n_channel()?, *self.n_row()?])
    }

    /// Replaces the `(channel, row)` flags and applies them to every
    /// correlation of the flag cube when that is filled.
    pub fn set_flag(&mut self, flag: Array2<bool>) -> Result<()> {
        let [n_corr, n_chan, n_row] = self.cube_shape()?;
        Self::expect_shape("flag", &[n_chan, n_row], flag.shape())?;
        if self.is_valid(CacheField::FlagCube) {
            let cube = Array3::from_shape_fn((n_corr, n_chan, n_row), |(_, c, r)| flag[[c, r]]);
            self.values.flag_cube = cube;
        }
        self.values.flag = flag;
        self.mark_valid(CacheField::Flag);
        Ok(())
    }

    pub fn set_flag_cube(&mut self, flags: Array3<bool>) -> Result<()> {
        let shape = self.cube_shape()?;
        Self::expect_shape("flag_cube", &shape, flags.shape())?;
        self.values.flag = any_correlation(&flags);
        self.values.flag_cube = flags;
        self.mark_valid(CacheField::Flag);
        self.mark_valid(CacheField::FlagCube);
        Ok(())
    }

    pub fn set_flag_row(&mut self, flag_row: Array1<bool>) -> Result<()> {
        let n_row = *self.n_row()?;
        Self::expect_shape("flag_row", &[n_row], flag_row.shape())?;
        self.values.flag_row = flag_row;
        self.mark_valid(CacheField::FlagRow);
        Ok(())
    }

    pub fn set_vis_cube(&mut self, cube: Array3<Complex32>) -> Result<()> {
        let shape = self.cube_shape()?;
        Self::expect_shape("vis_cube", &shape, cube.shape())?;
        self.values.vis_cube = cube;
        self.mark_valid(CacheField::VisCube);
        Ok(())
    }

    pub fn set_model_vis_cube(&mut self, cube: Array3<Complex32>) -> Result<()> {
        let shape = self.cube_shape()?;
        Self::expect_shape("model_vis_cube", &shape, cube.shape())?;
        self.values.model_vis_cube = cube;
        self.mark_valid(CacheField::ModelVisCube);
        Ok(())
    }

    pub fn set_corrected_vis_cube(&mut self, cube: Array3<Complex32>) -> Result<()> {
        let shape = self.cube_shape()?;
        Self::expect_shape("corrected_vis_cube", &shape, cube.shape())?;
        self.values.corrected_vis_cube = cube;
        self.mark_valid(CacheField::CorrectedVisCube);
        Ok(())
    }

    pub fn set_weight_mat(&mut self, weights: Array2<f32>) -> Result<()> {
        let n_corr = *self.n_corr()?;
        let n_row = *self.n_row()?;
        Self::expect_shape("weight_mat", &[n_corr, n_row], weights.shape())?;
        self.values.weight_mat = weights;
        self.mark_valid(CacheField::WeightMat);
        Ok(())
    }
}
