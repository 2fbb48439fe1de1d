// In: src/frequency/converter.rs

//! Velocity-to-frequency conversion for one chunk.
//!
//! The converter is stateless apart from its measures collaborator. The cursor
//! calls `convert` once when it enters a chunk and caches the resulting grids
//! until the chunk changes.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VisIterError};
use crate::frequency::measures::{
    DopplerConvention, FrequencyFrame, Measures, Position, SkyDirection, StaticMeasures,
};

/// A channel selection expressed as a regular velocity grid.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct VelocitySelection {
    /// Velocity of the first output channel, m/s.
    pub start: f64,
    /// Velocity step between output channels, m/s.
    pub increment: f64,
    pub channel_count: usize,
    pub convention: DopplerConvention,
    /// The frame the velocities are defined in.
    pub frame: FrequencyFrame,
    /// Overrides the spectral window's rest frequency when set.
    #[serde(default)]
    pub rest_frequency: Option<f64>,
}

impl VelocitySelection {
    pub fn validate(&self) -> Result<()> {
        if self.channel_count == 0 {
            return Err(VisIterError::VelocitySelection(
                "at least one output channel is required".to_string(),
            ));
        }
        if !self.start.is_finite() || !self.increment.is_finite() {
            return Err(VisIterError::VelocitySelection(
                "start and increment must be finite".to_string(),
            ));
        }
        if let Some(rest) = self.rest_frequency {
            if !(rest > 0.0) {
                return Err(VisIterError::VelocitySelection(format!(
                    "rest frequency must be positive, got {rest}"
                )));
            }
        }
        Ok(())
    }
}

/// The reference context of a chunk, assumed constant for its duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConversionContext {
    pub time: f64,
    pub position: Position,
    pub direction: SkyDirection,
    pub rest_frequency: f64,
}

/// The two parallel grids produced for a velocity selection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrequencyGrids {
    /// Native (topocentric) frequencies of the selected velocities. These pick
    /// the physical channels.
    pub selected: Vec<f64>,
    /// The same points expressed in the analysis frame of the selection.
    pub reference: Vec<f64>,
}

pub struct FrequencyConverter {
    measures: Box<dyn Measures>,
}

impl Default for FrequencyConverter {
    fn default() -> Self {
        Self::new(Box::new(StaticMeasures::new()))
    }
}

impl FrequencyConverter {
    pub fn new(measures: Box<dyn Measures>) -> Self {
        Self { measures }
    }

    /// Computes the selected and reference grids for `selection` in `context`.
    ///
    /// The requested velocities define the reference grid in the selection's
    /// frame. The selected grid is that grid mapped back to the telescope with
    /// the exact frame ratio, so `to_frame(selected)` reproduces `reference`.
    pub fn convert(
        &self,
        selection: &VelocitySelection,
        context: &ConversionContext,
    ) -> Result<FrequencyGrids> {
        selection.validate()?;
        let rest = selection.rest_frequency.unwrap_or(context.rest_frequency);
        if !(rest > 0.0) {
            return Err(VisIterError::VelocitySelection(format!(
                "rest frequency must be positive, got {rest}"
            )));
        }

        // 1. Topocentric-to-frame ratio from the observatory motion.
        let ratio = self.frame_ratio(context, selection.frame)?;

        // 2. Walk the velocity grid.
        let mut grids = FrequencyGrids {
            selected: Vec::with_capacity(selection.channel_count),
            reference: Vec::with_capacity(selection.channel_count),
        };
        for i in 0..selection.channel_count {
            let velocity = selection.start + i as f64 * selection.increment;
            let reference = self
                .measures
                .doppler_to_frequency(velocity, selection.convention, rest);
            grids.selected.push(reference * ratio);
            grids.reference.push(reference);
        }

        log_metric!(
            "event" = "velocity_grid",
            "channels" = selection.channel_count,
            "frame_ratio" = ratio
        );
        Ok(grids)
    }

    /// Re-expresses native topocentric frequencies in `frame`.
    pub fn to_frame(
        &self,
        frequencies: &[f64],
        context: &ConversionContext,
        frame: FrequencyFrame,
    ) -> Result<Vec<f64>> {
        if frame == FrequencyFrame::Topocentric {
            return Ok(frequencies.to_vec());
        }
        let ratio = self.frame_ratio(context, frame)?;
        Ok(frequencies.iter().map(|f| f / ratio).collect())
    }

    /// `f_topo / f_frame` for the observatory's true radial velocity in `frame`.
    fn frame_ratio(&self, context: &ConversionContext, frame: FrequencyFrame) -> Result<f64> {
        if frame == FrequencyFrame::Topocentric {
            return Ok(1.0);
        }
        let velocity = self.measures.observatory_velocity(
            context.time,
            &context.position,
            &context.direction,
            frame,
            DopplerConvention::Relativistic,
        )?;
        Ok(DopplerConvention::Relativistic.frequency_ratio(velocity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frequency::measures::SPEED_OF_LIGHT;

    fn context(rest: f64) -> ConversionContext {
        ConversionContext {
            time: 4.0e9,
            position: Position::default(),
            direction: SkyDirection::default(),
            rest_frequency: rest,
        }
    }

    fn selection(frame: FrequencyFrame) -> VelocitySelection {
        VelocitySelection {
            start: -1.0e4,
            increment: 5.0e3,
            channel_count: 5,
            convention: DopplerConvention::Radio,
            frame,
            rest_frequency: None,
        }
    }

    #[test]
    fn test_topocentric_grids_coincide() {
        let converter = FrequencyConverter::default();
        let grids = converter
            .convert(&selection(FrequencyFrame::Topocentric), &context(1.0e9))
            .unwrap();
        assert_eq!(grids.selected.len(), 5);
        assert_eq!(grids.selected, grids.reference);
        // Radio convention: f = f0 (1 - v/c), exactly.
        let expected = 1.0e9 * (1.0 - (-1.0e4) / SPEED_OF_LIGHT);
        assert!((grids.selected[0] - expected).abs() < 1e-6);
        // Increasing velocity means decreasing frequency.
        assert!(grids.selected.windows(2).all(|w| w[1] < w[0]));
    }

    #[test]
    fn test_observatory_motion_shifts_selected_grid_only() {
        // Arrange
        let measures = StaticMeasures::new().with_velocity(FrequencyFrame::Lsrk, 2.0e4);
        let converter = FrequencyConverter::new(Box::new(measures));
        let ctx = context(1.0e9);

        // Act
        let grids = converter
            .convert(&selection(FrequencyFrame::Lsrk), &ctx)
            .unwrap();

        // Assert
        let ratio = DopplerConvention::Relativistic.frequency_ratio(2.0e4);
        let expected_reference = 1.0e9 * DopplerConvention::Radio.frequency_ratio(-1.0e4);
        assert!((grids.reference[0] - expected_reference).abs() < 1e-6);
        assert!((grids.selected[0] - expected_reference * ratio).abs() < 1e-6);
        // Receding observatory: the telescope sees lower frequencies.
        assert!(grids.selected[0] < grids.reference[0]);
    }

    #[test]
    fn test_reference_is_selected_grid_in_analysis_frame() {
        // Arrange
        let measures = StaticMeasures::new()
            .with_velocity(FrequencyFrame::Lsrk, 3.0e6)
            .with_velocity(FrequencyFrame::Barycentric, -1.5e6);
        let converter = FrequencyConverter::new(Box::new(measures));
        let ctx = context(1.0e9);

        for frame in [FrequencyFrame::Lsrk, FrequencyFrame::Barycentric] {
            for convention in [
                DopplerConvention::Radio,
                DopplerConvention::Optical,
                DopplerConvention::Relativistic,
            ] {
                let sel = VelocitySelection {
                    start: 0.0,
                    convention,
                    ..selection(frame)
                };

                // Act
                let grids = converter.convert(&sel, &ctx).unwrap();
                let mapped = converter.to_frame(&grids.selected, &ctx, frame).unwrap();

                // Assert
                assert!((grids.reference[0] - 1.0e9).abs() < 1e-6);
                for (m, r) in mapped.iter().zip(&grids.reference) {
                    assert!((m - r).abs() < 1e-3, "{frame:?} {convention:?}: {m} vs {r}");
                }
            }
        }
    }

    #[test]
    fn test_rest_frequency_override_and_validation() {
        let converter = FrequencyConverter::default();
        let mut sel = selection(FrequencyFrame::Topocentric);
        sel.rest_frequency = Some(2.0e9);
        let grids = converter.convert(&sel, &context(1.0e9)).unwrap();
        assert!(grids.selected[0] > 1.9e9);

        sel.channel_count = 0;
        assert!(matches!(
            converter.convert(&sel, &context(1.0e9)),
            Err(VisIterError::VelocitySelection(_))
        ));

        let sel = selection(FrequencyFrame::Topocentric);
        assert!(converter.convert(&sel, &context(0.0)).is_err());
    }

    #[test]
    fn test_to_frame_is_identity_for_topocentric() {
        let converter = FrequencyConverter::default();
        let freqs = vec![1.0e9, 1.1e9];
        let out = converter
            .to_frame(&freqs, &context(1.0e9), FrequencyFrame::Topocentric)
            .unwrap();
        assert_eq!(out, freqs);
    }
}
