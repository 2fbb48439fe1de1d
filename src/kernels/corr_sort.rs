// In: src/kernels/corr_sort.rs

//! The reversible correlation-axis permutation behind `sort_corr`/`un_sort_corr`.
//!
//! Some stores hold four correlations as `(pp, qq, pq, qp)`. Sorting rotates
//! slots 1..=3 into the canonical `(pp, pq, qp, qq)` order; unsorting is the
//! exact inverse.

use ndarray::{Array, Axis, Dimension, RemoveAxis};

use crate::types::CorrType;

/// new[i] = old[SORT_ORDER[i]]
const SORT_ORDER: [usize; 4] = [0, 2, 3, 1];
/// new[i] = old[UNSORT_ORDER[i]]
const UNSORT_ORDER: [usize; 4] = [0, 3, 1, 2];

/// True for four correlations stored with both parallel hands first.
pub fn needs_sort(corrs: &[CorrType]) -> bool {
    corrs.len() == 4 && corrs[1].is_second_parallel()
}

fn permute<A, D>(array: &mut Array<A, D>, order: &[usize; 4])
where
    A: Clone,
    D: Dimension + RemoveAxis,
{
    if array.ndim() == 0 || array.len_of(Axis(0)) != 4 {
        return;
    }
    *array = array.select(Axis(0), order);
}

/// Reorders axis 0 from `(pp, qq, pq, qp)` to `(pp, pq, qp, qq)`. Arrays whose
/// first axis is not four long are left untouched.
pub fn sort_axis0<A: Clone, D: Dimension + RemoveAxis>(array: &mut Array<A, D>) {
    permute(array, &SORT_ORDER);
}

/// The inverse of `sort_axis0`.
pub fn unsort_axis0<A: Clone, D: Dimension + RemoveAxis>(array: &mut Array<A, D>) {
    permute(array, &UNSORT_ORDER);
}

pub fn sort_corr_types(corrs: &mut [CorrType]) {
    if corrs.len() == 4 {
        let old = [corrs[0], corrs[1], corrs[2], corrs[3]];
        for (slot, &src) in SORT_ORDER.iter().enumerate() {
            corrs[slot] = old[src];
        }
    }
}

pub fn unsort_corr_types(corrs: &mut [CorrType]) {
    if corrs.len() == 4 {
        let old = [corrs[0], corrs[1], corrs[2], corrs[3]];
        for (slot, &src) in UNSORT_ORDER.iter().enumerate() {
            corrs[slot] = old[src];
        }
    }
}
