// In: src/kernels/chan_average.rs

//! Channel-axis averaging kernels.
//!
//! An averaging plan is a list of inclusive `(first, last)` channel bounds, one
//! per output channel.

use ndarray::{Array1, Array3, ArrayView1, ArrayView3, Axis};
use num_traits::Zero;
use std::ops::{Add, Mul};

use crate::error::{Result, VisIterError};

/// Orders each pair and checks every bound lies inside `n_chan` channels.
pub fn normalize_bounds(bounds: &[(usize, usize)], n_chan: usize) -> Result<Vec<(usize, usize)>> {
    if bounds.is_empty() {
        return Err(VisIterError::AveragingBounds(
            "at least one output channel is required".to_string(),
        ));
    }
    bounds
        .iter()
        .map(|&(a, b)| {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            if hi >= n_chan {
                Err(VisIterError::AveragingBounds(format!(
                    "bound ({a}, {b}) exceeds {n_chan} channels"
                )))
            } else {
                Ok((lo, hi))
            }
        })
        .collect()
}

/// Splits `n_chan` channels into consecutive groups of `width`. A short
/// trailing group is kept.
pub fn bounds_for_width(n_chan: usize, width: usize) -> Vec<(usize, usize)> {
    let width = width.max(1);
    (0..n_chan)
        .step_by(width)
        .map(|first| (first, (first + width - 1).min(n_chan - 1)))
        .collect()
}

/// Output flags: a channel is flagged only when **all** contributing input
/// channels are flagged. Rows already flagged as a whole stay flagged.
pub fn average_flags(
    flags: ArrayView3<bool>,
    flag_row: ArrayView1<bool>,
    bounds: &[(usize, usize)],
) -> Array3<bool> {
    let (n_corr, _, n_row) = flags.dim();
    let mut out = Array3::from_elem((n_corr, bounds.len(), n_row), true);
    for row in 0..n_row {
        if flag_row.get(row).copied().unwrap_or(false) {
            continue;
        }
        for (k, &(lo, hi)) in bounds.iter().enumerate() {
            for corr in 0..n_corr {
                out[[corr, k, row]] = (lo..=hi).all(|chan| flags[[corr, chan, row]]);
            }
        }
    }
    out
}

/// Summed weight spectrum over each group, counting only unflagged channels.
pub fn sum_weights(
    weights: ArrayView3<f32>,
    flags: ArrayView3<bool>,
    bounds: &[(usize, usize)],
) -> Array3<f32> {
    let (n_corr, _, n_row) = weights.dim();
    let mut out = Array3::zeros((n_corr, bounds.len(), n_row));
    for row in 0..n_row {
        for (k, &(lo, hi)) in bounds.iter().enumerate() {
            for corr in 0..n_corr {
                out[[corr, k, row]] = (lo..=hi)
                    .filter(|&chan| !flags[[corr, chan, row]])
                    .map(|chan| weights[[corr, chan, row]])
                    .sum();
            }
        }
    }
    out
}

/// Averages a data cube over each group.
///
/// Unflagged contributors are combined as a weight-spectrum-weighted mean when
/// weights are supplied and sum positive, else as a plain mean. When every
/// contributor is flagged the output is the plain mean of all contributors.
pub fn average_cube<T>(
    data: ArrayView3<T>,
    flags: ArrayView3<bool>,
    weights: Option<ArrayView3<f32>>,
    bounds: &[(usize, usize)],
) -> Array3<T>
where
    T: Copy + Zero + Add<Output = T> + Mul<f32, Output = T>,
{
    let (n_corr, _, n_row) = data.dim();
    let mut out = Array3::zeros((n_corr, bounds.len(), n_row));
    for row in 0..n_row {
        for (k, &(lo, hi)) in bounds.iter().enumerate() {
            for corr in 0..n_corr {
                out[[corr, k, row]] = average_group(&data, &flags, weights.as_ref(), corr, row, lo, hi);
            }
        }
    }
    out
}

fn average_group<T>(
    data: &ArrayView3<T>,
    flags: &ArrayView3<bool>,
    weights: Option<&ArrayView3<f32>>,
    corr: usize,
    row: usize,
    lo: usize,
    hi: usize,
) -> T
where
    T: Copy + Zero + Add<Output = T> + Mul<f32, Output = T>,
{
    let unflagged = move || (lo..=hi).filter(move |&chan| !flags[[corr, chan, row]]);

    if let Some(w) = weights {
        let total: f32 = unflagged().map(|chan| w[[corr, chan, row]]).sum();
        if total > 0.0 {
            let sum = unflagged().fold(T::zero(), |acc, chan| {
                acc + data[[corr, chan, row]] * w[[corr, chan, row]]
            });
            return sum * (1.0 / total);
        }
    }

    let count = unflagged().count();
    if count > 0 {
        let sum = unflagged().fold(T::zero(), |acc, chan| acc + data[[corr, chan, row]]);
        return sum * (1.0 / count as f32);
    }

    let sum = (lo..=hi).fold(T::zero(), |acc, chan| acc + data[[corr, chan, row]]);
    sum * (1.0 / (hi - lo + 1) as f32)
}

/// Mean of an axis value (frequency) over each group.
pub fn average_axis_values(values: &[f64], bounds: &[(usize, usize)]) -> Vec<f64> {
    bounds
        .iter()
        .map(|&(lo, hi)| values[lo..=hi].iter().sum::<f64>() / (hi - lo + 1) as f64)
        .collect()
}

/// Mean channel number over each group, truncated towards zero.
pub fn average_channel_numbers(channels: &[i32], bounds: &[(usize, usize)]) -> Vec<i32> {
    bounds
        .iter()
        .map(|&(lo, hi)| {
            let sum: i64 = channels[lo..=hi].iter().map(|&c| i64::from(c)).sum();
            (sum / (hi - lo + 1) as i64) as i32
        })
        .collect()
}

/// Rows in which every correlation of every channel is flagged.
pub fn fully_flagged_rows(flags: ArrayView3<bool>) -> Array1<bool> {
    Array1::from_iter(
        flags
            .axis_iter(Axis(2))
            .map(|plane| !plane.is_empty() && plane.iter().all(|&f| f)),
    )
}
