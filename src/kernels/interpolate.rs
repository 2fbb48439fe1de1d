// In: src/kernels/interpolate.rs

//! Resampling of channel-axis data from a native frequency grid onto the grid of
//! a velocity selection.

use ndarray::{Array3, ArrayView3};
use num_traits::Zero;
use std::ops::{Add, Mul};

use crate::config::VelocityInterpolation;

/// How one target point is built from the native grid: `value[lo] * (1 - frac)
/// + value[hi] * frac`. `None` marks a point outside the native grid.
pub type Tap = Option<(usize, usize, f32)>;

/// A precomputed mapping from a native grid onto a target grid.
#[derive(Debug, Clone, PartialEq)]
pub struct ResamplePlan {
    taps: Vec<Tap>,
}

impl ResamplePlan {
    /// Builds the plan. `native` must be monotonic, ascending or descending.
    pub fn new(native: &[f64], target: &[f64], method: VelocityInterpolation) -> Self {
        let taps = target
            .iter()
            .map(|&t| locate(native, t).map(|(lo, hi, frac)| apply_method(lo, hi, frac, method)))
            .collect();
        Self { taps }
    }

    pub fn taps(&self) -> &[Tap] {
        &self.taps
    }

    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }

    /// Resamples the channel axis of `cube`. Out-of-range points are zero.
    pub fn resample<T>(&self, cube: ArrayView3<T>) -> Array3<T>
    where
        T: Copy + Zero + Add<Output = T> + Mul<f32, Output = T>,
    {
        let (n_corr, _, n_row) = cube.dim();
        let mut out = Array3::zeros((n_corr, self.taps.len(), n_row));
        for (k, tap) in self.taps.iter().enumerate() {
            if let Some((lo, hi, frac)) = *tap {
                for corr in 0..n_corr {
                    for row in 0..n_row {
                        out[[corr, k, row]] =
                            cube[[corr, lo, row]] * (1.0 - frac) + cube[[corr, hi, row]] * frac;
                    }
                }
            }
        }
        out
    }

    /// Resamples flags: a target point is flagged if any tap it uses is
    /// flagged, and always when it falls outside the native grid.
    pub fn resample_flags(&self, flags: ArrayView3<bool>) -> Array3<bool> {
        let (n_corr, _, n_row) = flags.dim();
        let mut out = Array3::from_elem((n_corr, self.taps.len(), n_row), true);
        for (k, tap) in self.taps.iter().enumerate() {
            if let Some((lo, hi, _)) = *tap {
                for corr in 0..n_corr {
                    for row in 0..n_row {
                        out[[corr, k, row]] = flags[[corr, lo, row]] || flags[[corr, hi, row]];
                    }
                }
            }
        }
        out
    }

    /// The inclusive native channel range touched by any tap.
    pub fn native_span(&self) -> Option<(usize, usize)> {
        self.taps.iter().flatten().fold(None, |span, &(lo, hi, _)| match span {
            None => Some((lo, hi)),
            Some((a, b)) => Some((a.min(lo), b.max(hi))),
        })
    }

    /// Re-bases every tap so that native channel `offset` becomes index 0.
    pub fn rebased(&self, offset: usize) -> Self {
        Self {
            taps: self
                .taps
                .iter()
                .map(|tap| tap.map(|(lo, hi, frac)| (lo - offset, hi - offset, frac)))
                .collect(),
        }
    }
}

fn apply_method(lo: usize, hi: usize, frac: f32, method: VelocityInterpolation) -> (usize, usize, f32) {
    match method {
        VelocityInterpolation::Linear => (lo, hi, frac),
        VelocityInterpolation::Nearest => {
            let nearest = if frac < 0.5 { lo } else { hi };
            (nearest, nearest, 0.0)
        }
    }
}

/// Finds the native interval containing `t`.
fn locate(native: &[f64], t: f64) -> Option<(usize, usize, f32)> {
    match native.len() {
        0 => None,
        1 => (native[0] == t).then_some((0, 0, 0.0)),
        n => {
            let ascending = native[n - 1] >= native[0];
            let (first, last) = if ascending {
                (native[0], native[n - 1])
            } else {
                (native[n - 1], native[0])
            };
            if !(t >= first && t <= last) {
                return None;
            }
            // Index of the first point strictly beyond `t` in walking order.
            let beyond = if ascending {
                native.partition_point(|&f| f <= t)
            } else {
                native.partition_point(|&f| f >= t)
            };
            let hi = beyond.clamp(1, n - 1);
            let lo = hi - 1;
            let span = native[hi] - native[lo];
            let frac = if span == 0.0 { 0.0 } else { ((t - native[lo]) / span) as f32 };
            Some((lo, hi, frac.clamp(0.0, 1.0)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_taps_on_ascending_and_descending_grids() {
        let up = ResamplePlan::new(&[1.0, 2.0, 3.0], &[1.5, 3.0, 0.5], VelocityInterpolation::Linear);
        assert_eq!(up.taps()[0], Some((0, 1, 0.5)));
        assert_eq!(up.taps()[1], Some((1, 2, 1.0)));
        assert_eq!(up.taps()[2], None);

        let down = ResamplePlan::new(&[3.0, 2.0, 1.0], &[2.25], VelocityInterpolation::Linear);
        assert_eq!(down.taps()[0], Some((0, 1, 0.75)));
    }

    #[test]
    fn test_nearest_picks_closest_channel() {
        let plan = ResamplePlan::new(&[1.0, 2.0, 3.0], &[1.4, 2.6], VelocityInterpolation::Nearest);
        assert_eq!(plan.taps(), &[Some((0, 0, 0.0)), Some((2, 2, 0.0))]);
        assert_eq!(plan.native_span(), Some((0, 2)));
    }

    #[test]
    fn test_resample_values_and_flags() {
        // Arrange: 1 corr, 3 chans, 1 row.
        let cube = Array3::from_shape_vec((1, 3, 1), vec![10.0f32, 20.0, 40.0]).unwrap();
        let flags = Array3::from_shape_vec((1, 3, 1), vec![false, false, true]).unwrap();
        let plan = ResamplePlan::new(&[1.0, 2.0, 3.0], &[1.5, 2.5, 9.0], VelocityInterpolation::Linear);

        // Act
        let values = plan.resample(cube.view());
        let out_flags = plan.resample_flags(flags.view());

        // Assert
        assert_eq!(values[[0, 0, 0]], 15.0);
        assert_eq!(values[[0, 1, 0]], 30.0);
        assert_eq!(values[[0, 2, 0]], 0.0);
        assert_eq!(out_flags.iter().copied().collect::<Vec<_>>(), vec![false, true, true]);
    }

    #[test]
    fn test_rebased_plan_reads_from_a_sub_range() {
        let plan = ResamplePlan::new(&[1.0, 2.0, 3.0, 4.0], &[3.5], VelocityInterpolation::Linear);
        let (lo, _) = plan.native_span().unwrap();
        assert_eq!(plan.rebased(lo).taps(), &[Some((0, 1, 0.5))]);
    }
}
