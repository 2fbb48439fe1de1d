// In: src/kernels/stokes.rs

//! Conversion of feed correlation products into Stokes parameters.
//!
//! A `StokesPlan` is derived once from the correlation list and then applied to
//! every correlation-indexed array of a cache. Correlations are located by type,
//! so the plan is independent of the stored correlation order.

use ndarray::{Array, Array3, ArrayView, ArrayView3, Axis, Dimension, RemoveAxis, Zip};

use crate::error::{Result, VisIterError};
use crate::types::{Complex32, CorrType, PolFrame};

/// One output correlation: the two inputs and how they combine.
type Combine<A> = (usize, usize, fn(A, A) -> A);

fn combo<A>(a: usize, b: usize, op: fn(A, A) -> A) -> Combine<A> {
    (a, b, op)
}

fn add(x: f32, y: f32) -> f32 {
    x + y
}

fn either(x: bool, y: bool) -> bool {
    x || y
}

fn first<A>(x: A, _: A) -> A {
    x
}

fn half_sum(x: Complex32, y: Complex32) -> Complex32 {
    (x + y) * 0.5
}

fn half_diff(x: Complex32, y: Complex32) -> Complex32 {
    (x - y) * 0.5
}

/// `(x - y) / 2i`
fn half_diff_over_i(x: Complex32, y: Complex32) -> Complex32 {
    let d = x - y;
    Complex32::new(d.im * 0.5, -d.re * 0.5)
}

fn half_sum_real(x: f32, y: f32) -> f32 {
    (x + y) * 0.5
}

fn half_diff_real(x: f32, y: f32) -> f32 {
    (x - y) * 0.5
}

/// Applies `combos` along axis 0, producing one output slice per entry.
fn combine_axis0<A, D>(input: ArrayView<A, D>, combos: &[Combine<A>]) -> Array<A, D>
where
    A: Copy + Default,
    D: Dimension + RemoveAxis,
{
    let mut dim = input.raw_dim();
    dim.slice_mut()[0] = combos.len();
    let mut out = Array::from_elem(dim, A::default());
    for (k, &(a, b, op)) in combos.iter().enumerate() {
        Zip::from(out.index_axis_mut(Axis(0), k))
            .and(input.index_axis(Axis(0), a))
            .and(input.index_axis(Axis(0), b))
            .for_each(|o, &x, &y| *o = op(x, y));
    }
    out
}

/// The correlation case split of the Stokes transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StokesPlan {
    /// All four feed products, indices of `(pp, pq, qp, qq)`.
    Full { frame: PolFrame, pp: usize, pq: usize, qp: usize, qq: usize },
    /// The two parallel hands.
    Parallel { frame: PolFrame, p: usize, q: usize },
    /// A single correlation, relabelled as I.
    Single,
}

impl StokesPlan {
    pub fn for_corr_types(corrs: &[CorrType]) -> Result<StokesPlan> {
        let find = |pred: fn(CorrType) -> bool| corrs.iter().position(|&c| pred(c));
        match corrs.len() {
            4 => match (
                find(CorrType::is_first_parallel),
                find(CorrType::is_first_cross),
                find(CorrType::is_second_cross),
                find(CorrType::is_second_parallel),
            ) {
                (Some(pp), Some(pq), Some(qp), Some(qq)) => Ok(StokesPlan::Full {
                    frame: PolFrame::from_corr_types(&corrs[pp..=pp]),
                    pp,
                    pq,
                    qp,
                    qq,
                }),
                _ => Err(VisIterError::InsufficientCorrelations(format!(
                    "four correlations must be the full set of feed products, got {corrs:?}"
                ))),
            },
            2 => match (
                find(CorrType::is_first_parallel),
                find(CorrType::is_second_parallel),
            ) {
                (Some(p), Some(q)) => Ok(StokesPlan::Parallel {
                    frame: PolFrame::from_corr_types(&corrs[p..=p]),
                    p,
                    q,
                }),
                _ => Err(VisIterError::InsufficientCorrelations(format!(
                    "two correlations must be the parallel hands, got {corrs:?}"
                ))),
            },
            1 => Ok(StokesPlan::Single),
            n => Err(VisIterError::InsufficientCorrelations(format!(
                "cannot form Stokes parameters from {n} correlations"
            ))),
        }
    }

    pub fn output_corr_types(&self) -> Vec<CorrType> {
        match self {
            StokesPlan::Full { .. } => vec![CorrType::I, CorrType::Q, CorrType::U, CorrType::V],
            StokesPlan::Parallel { frame: PolFrame::Circular, .. } => vec![CorrType::I, CorrType::V],
            StokesPlan::Parallel { frame: PolFrame::Linear, .. } => vec![CorrType::I, CorrType::Q],
            StokesPlan::Single => vec![CorrType::I],
        }
    }

    /// Output slot pairing for sums of weights or ORs of flags.
    fn pairing<A>(&self, op: fn(A, A) -> A) -> Vec<Combine<A>> {
        match *self {
            StokesPlan::Full { frame: PolFrame::Circular, pp, pq, qp, qq } => {
                vec![(pp, qq, op), (pq, qp, op), (pq, qp, op), (pp, qq, op)]
            }
            StokesPlan::Full { frame: PolFrame::Linear, pp, pq, qp, qq } => {
                vec![(pp, qq, op), (pp, qq, op), (pq, qp, op), (pq, qp, op)]
            }
            StokesPlan::Parallel { p, q, .. } => vec![(p, q, op), (p, q, op)],
            StokesPlan::Single => vec![combo(0, 0, first)],
        }
    }

    /// Weights of the new basis: sums of the contributing weights.
    pub fn weights<D>(&self, weights: ArrayView<f32, D>) -> Array<f32, D>
    where
        D: Dimension + RemoveAxis,
    {
        combine_axis0(weights, &self.pairing(add))
    }

    /// Flags of the new basis: OR of the contributing flags.
    pub fn flags<D>(&self, flags: ArrayView<bool, D>) -> Array<bool, D>
    where
        D: Dimension + RemoveAxis,
    {
        combine_axis0(flags, &self.pairing(either))
    }

    pub fn complex_cube(&self, cube: ArrayView3<Complex32>) -> Array3<Complex32> {
        let combos: Vec<Combine<Complex32>> = match *self {
            StokesPlan::Full { frame: PolFrame::Circular, pp, pq, qp, qq } => vec![
                combo(pp, qq, half_sum),
                combo(pq, qp, half_sum),
                combo(pq, qp, half_diff_over_i),
                combo(pp, qq, half_diff),
            ],
            StokesPlan::Full { frame: PolFrame::Linear, pp, pq, qp, qq } => vec![
                combo(pp, qq, half_sum),
                combo(pp, qq, half_diff),
                combo(pq, qp, half_sum),
                combo(pq, qp, half_diff_over_i),
            ],
            StokesPlan::Parallel { p, q, .. } => vec![combo(p, q, half_sum), combo(p, q, half_diff)],
            StokesPlan::Single => vec![combo(0, 0, first)],
        };
        combine_axis0(cube, &combos)
    }

    /// Real-valued data only supports the parallel-hand and single cases.
    pub fn float_cube(&self, cube: ArrayView3<f32>) -> Result<Array3<f32>> {
        let combos: Vec<Combine<f32>> = match *self {
            StokesPlan::Full { .. } => {
                return Err(VisIterError::UnsupportedTransform(
                    "cannot form full Stokes from real-valued data".to_string(),
                ))
            }
            StokesPlan::Parallel { p, q, .. } => vec![combo(p, q, half_sum_real), combo(p, q, half_diff_real)],
            StokesPlan::Single => vec![combo(0, 0, first)],
        };
        Ok(combine_axis0(cube, &combos))
    }
}
