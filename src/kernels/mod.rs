//! This module contains the pure, stateless numeric kernels used by the
//! attached cache's derived-column transforms.
//!
//! Kernels operate on `ndarray` views laid out `(correlation, channel, row)` and
//! return freshly allocated outputs, so a caller can compute every output of a
//! transform before committing any of them.

pub mod chan_average;
pub mod corr_sort;
pub mod interpolate;
pub mod stokes;
