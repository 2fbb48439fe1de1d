// In: src/buffer/transforms.rs

//! Derived-column transforms over the cache's own fields.
//!
//! Every transform fills its prerequisites, computes all of its outputs, and
//! only then commits them, so a failed transform leaves the cache unchanged.

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::buffer::cache::VisCache;
use crate::buffer::fields::CacheField;
use crate::buffer::fillers::any_correlation;
use crate::error::{Result, VisIterError};
use crate::kernels::chan_average::{
    average_axis_values, average_channel_numbers, average_cube, average_flags, bounds_for_width,
    fully_flagged_rows, normalize_bounds, sum_weights,
};
use crate::kernels::corr_sort::{needs_sort, sort_axis0, sort_corr_types, unsort_axis0, unsort_corr_types};
use crate::kernels::stokes::StokesPlan;
use crate::types::Complex32;

/// How row weights and sigmas follow a channel average.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AverageMode {
    /// Sigma scales with the observed data, weight with calibrated data.
    #[default]
    Data,
    /// Only the weight is scaled.
    Calibration,
}

const DATA_CUBES: [CacheField; 4] = [
    CacheField::VisCube,
    CacheField::ModelVisCube,
    CacheField::CorrectedVisCube,
    CacheField::FloatDataCube,
];

/// Every field a correlation permutation touches.
const CORR_FIELDS: [CacheField; 9] = [
    CacheField::CorrType,
    CacheField::FlagCube,
    CacheField::SigmaMat,
    CacheField::WeightMat,
    CacheField::WeightSpectrum,
    CacheField::VisCube,
    CacheField::ModelVisCube,
    CacheField::CorrectedVisCube,
    CacheField::FloatDataCube,
];

fn inverse_sqrt(x: f32) -> f32 {
    if x > 0.0 {
        1.0 / x.sqrt()
    } else {
        0.0
    }
}

fn inverse_square(x: f32) -> f32 {
    if x > 0.0 {
        1.0 / (x * x)
    } else {
        0.0
    }
}

impl VisCache {
    //==============================================================================
    // 1. Channel Averaging
    //==============================================================================

    /// Averages the channel axis onto one output channel per inclusive
    /// `(first, last)` bound.
    ///
    /// All four data cubes are derived first, so their channel axes stay in
    /// lock-step. Row weights and sigmas are rescaled by the mean number of
    /// channels folded into each output channel.
    pub fn channel_average(&mut self, bounds: &[(usize, usize)], mode: AverageMode) -> Result<()> {
        // 1. Prerequisites.
        self.ensure_all(&[
            CacheField::NChannel,
            CacheField::FlagCube,
            CacheField::FlagRow,
            CacheField::WeightSpectrum,
            CacheField::SigmaMat,
            CacheField::WeightMat,
            CacheField::Channel,
            CacheField::Frequency,
            CacheField::LsrFrequency,
        ])?;
        self.ensure_all(&DATA_CUBES)?;
        let bounds = normalize_bounds(bounds, self.values.n_channel)?;

        // 2. Flags and weight spectrum.
        let v = &self.values;
        let flag_cube = average_flags(v.flag_cube.view(), v.flag_row.view(), &bounds);
        let weight_spectrum = if v.weight_spectrum.is_empty() {
            v.weight_spectrum.clone()
        } else {
            sum_weights(v.weight_spectrum.view(), v.flag_cube.view(), &bounds)
        };
        let weights = (!v.weight_spectrum.is_empty()).then(|| v.weight_spectrum.view());

        // 3. Data cubes.
        let average_complex = |cube: &Array3<Complex32>| {
            if cube.is_empty() {
                cube.clone()
            } else {
                average_cube(cube.view(), v.flag_cube.view(), weights.clone(), &bounds)
            }
        };
        let vis = average_complex(&v.vis_cube);
        let model = average_complex(&v.model_vis_cube);
        let corrected = average_complex(&v.corrected_vis_cube);
        let float_data = if v.float_data_cube.is_empty() {
            v.float_data_cube.clone()
        } else {
            average_cube(v.float_data_cube.view(), v.flag_cube.view(), weights.clone(), &bounds)
        };

        // 4. Row weight and sigma.
        let folded = bounds.iter().map(|&(lo, hi)| hi - lo + 1).sum::<usize>() as f32 / bounds.len() as f32;
        let (sigma, weight) = rescale_row_weights(
            v.sigma_mat.clone(),
            v.weight_mat.clone(),
            folded,
            mode,
            !v.vis_cube.is_empty() || !v.float_data_cube.is_empty(),
            !v.corrected_vis_cube.is_empty() || !v.model_vis_cube.is_empty(),
            !v.corrected_vis_cube.is_empty(),
        );

        // 5. Channel axis values.
        let frequency = average_axis_values(&v.frequency, &bounds);
        let lsr_frequency = average_axis_values(&v.lsr_frequency, &bounds);
        let channel = average_channel_numbers(&v.channel, &bounds);
        let flag_row = &v.flag_row | &fully_flagged_rows(flag_cube.view());

        // 6. Commit.
        log::debug!(
            "channel average: {} -> {} channels ({mode:?})",
            self.values.n_channel,
            bounds.len()
        );
        let v = &mut self.values;
        v.n_channel = bounds.len();
        v.flag = any_correlation(&flag_cube);
        v.flag_cube = flag_cube;
        v.flag_row = flag_row;
        v.weight_spectrum = weight_spectrum;
        v.vis_cube = vis;
        v.model_vis_cube = model;
        v.corrected_vis_cube = corrected;
        v.float_data_cube = float_data;
        v.sigma_mat = sigma;
        v.weight_mat = weight;
        v.frequency = frequency;
        v.lsr_frequency = lsr_frequency;
        v.channel = channel;
        self.mark_valid(CacheField::Flag);
        Ok(())
    }

    /// Averages consecutive groups of `width` channels; a short trailing group is kept.
    pub fn channel_average_by(&mut self, width: usize, mode: AverageMode) -> Result<()> {
        if width == 0 {
            return Err(VisIterError::AveragingBounds(
                "width must be at least one channel".to_string(),
            ));
        }
        let n_chan = *self.n_channel()?;
        self.channel_average(&bounds_for_width(n_chan, width), mode)
    }

    /// Collapses every channel into one.
    pub fn frequency_average(&mut self) -> Result<()> {
        let n_chan = *self.n_channel()?;
        if n_chan == 0 {
            return Err(VisIterError::AveragingBounds("no channels to average".to_string()));
        }
        self.channel_average(&[(0, n_chan - 1)], AverageMode::Data)
    }

    //==============================================================================
    // 2. Stokes Parameters
    //==============================================================================

    /// Converts the correlation axis of every data cube into Stokes parameters.
    ///
    /// Four correlations give I, Q, U, V; the two parallel hands give I and V
    /// (circular) or I and Q (linear); a single correlation is relabelled I.
    /// Output weights are sums of the contributing weights, output flags the OR
    /// of the contributing flags, and sigmas follow as `1/sqrt(weight)`.
    pub fn form_stokes(&mut self) -> Result<()> {
        // 1. Prerequisites and plan.
        self.ensure_all(&[
            CacheField::CorrType,
            CacheField::NCorr,
            CacheField::FlagCube,
            CacheField::WeightMat,
            CacheField::SigmaMat,
            CacheField::WeightSpectrum,
        ])?;
        self.ensure_all(&DATA_CUBES)?;
        let v = &self.values;
        let plan = StokesPlan::for_corr_types(&v.corr_type)?;

        // 2. Compute; real-valued data may reject the plan.
        let float_data = if v.float_data_cube.is_empty() {
            v.float_data_cube.clone()
        } else {
            plan.float_cube(v.float_data_cube.view())?
        };
        let convert = |cube: &Array3<Complex32>| {
            if cube.is_empty() {
                cube.clone()
            } else {
                plan.complex_cube(cube.view())
            }
        };
        let vis = convert(&v.vis_cube);
        let model = convert(&v.model_vis_cube);
        let corrected = convert(&v.corrected_vis_cube);
        let flag_cube = plan.flags(v.flag_cube.view());
        let weight: Array2<f32> = plan.weights(v.weight_mat.view());
        let sigma = weight.mapv(inverse_sqrt);
        let weight_spectrum = if v.weight_spectrum.is_empty() {
            v.weight_spectrum.clone()
        } else {
            plan.weights(v.weight_spectrum.view())
        };
        let corr_type = plan.output_corr_types();

        // 3. Commit.
        log::debug!("form_stokes: {:?} -> {:?}", v.corr_type, corr_type);
        let v = &mut self.values;
        v.n_corr = corr_type.len();
        v.corr_type = corr_type;
        v.flag = any_correlation(&flag_cube);
        v.flag_cube = flag_cube;
        v.weight_mat = weight;
        v.sigma_mat = sigma;
        v.weight_spectrum = weight_spectrum;
        v.vis_cube = vis;
        v.model_vis_cube = model;
        v.corrected_vis_cube = corrected;
        v.float_data_cube = float_data;
        self.mark_valid(CacheField::Flag);
        self.corr_sorted = false;
        Ok(())
    }

    //==============================================================================
    // 3. Correlation Order
    //==============================================================================

    /// Permutes four correlations stored as `(pp, qq, pq, qp)` into
    /// `(pp, pq, qp, qq)`. A no-op when already sorted or when the stored order
    /// is canonical.
    pub fn sort_corr(&mut self) -> Result<()> {
        if self.is_corr_sorted() {
            return Ok(());
        }
        if !needs_sort(self.corr_type()?) {
            return Ok(());
        }
        self.ensure_all(&CORR_FIELDS)?;
        let v = &mut self.values;
        sort_corr_types(&mut v.corr_type);
        sort_axis0(&mut v.flag_cube);
        sort_axis0(&mut v.sigma_mat);
        sort_axis0(&mut v.weight_mat);
        sort_axis0(&mut v.weight_spectrum);
        sort_axis0(&mut v.vis_cube);
        sort_axis0(&mut v.model_vis_cube);
        sort_axis0(&mut v.corrected_vis_cube);
        sort_axis0(&mut v.float_data_cube);
        self.corr_sorted = true;
        Ok(())
    }

    /// The exact inverse of `sort_corr`; a no-op unless currently sorted.
    pub fn un_sort_corr(&mut self) -> Result<()> {
        if !self.is_corr_sorted() {
            return Ok(());
        }
        let v = &mut self.values;
        unsort_corr_types(&mut v.corr_type);
        unsort_axis0(&mut v.flag_cube);
        unsort_axis0(&mut v.sigma_mat);
        unsort_axis0(&mut v.weight_mat);
        unsort_axis0(&mut v.weight_spectrum);
        unsort_axis0(&mut v.vis_cube);
        unsort_axis0(&mut v.model_vis_cube);
        unsort_axis0(&mut v.corrected_vis_cube);
        unsort_axis0(&mut v.float_data_cube);
        self.corr_sorted = false;
        Ok(())
    }

    pub fn is_corr_sorted(&mut self) -> bool {
        self.is_valid(CacheField::CorrType) && self.corr_sorted
    }

    //==============================================================================
    // 4. Weights
    //==============================================================================

    /// Recomputes the row weights from the row sigmas as `1/sigma²`.
    pub fn reset_weight_mat(&mut self) -> Result<()> {
        let weight = self.sigma_mat()?.mapv(inverse_square);
        self.values.weight_mat = weight;
        self.mark_valid(CacheField::WeightMat);
        Ok(())
    }
}

/// Row sigma/weight after folding `n` channels together.
fn rescale_row_weights(
    mut sigma: Array2<f32>,
    mut weight: Array2<f32>,
    n: f32,
    mode: AverageMode,
    has_observed: bool,
    has_calibrated: bool,
    has_corrected: bool,
) -> (Array2<f32>, Array2<f32>) {
    match mode {
        AverageMode::Calibration => weight.mapv_inplace(|w| w * n),
        AverageMode::Data => {
            if has_observed {
                let scale = 1.0 / n.sqrt();
                sigma.mapv_inplace(|s| s * scale);
                if !has_corrected {
                    weight = sigma.mapv(inverse_square);
                }
            }
            if has_calibrated {
                weight.mapv_inplace(|w| w * n);
                if !has_observed {
                    sigma = weight.mapv(inverse_sqrt);
                }
            }
        }
    }
    (sigma, weight)
}
