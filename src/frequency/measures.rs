// In: src/frequency/measures.rs

//! The measures collaborator contract and the exact doppler relations.
//!
//! All velocities are in metres per second and all frequencies in hertz.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Speed of light in vacuum, m/s.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// The definition used to express a velocity as a doppler shift.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DopplerConvention {
    /// `v = c (1 - f/f0)`
    #[default]
    Radio,
    /// `v = c (f0/f - 1)`, also known as `Z` when divided by `c`.
    Optical,
    /// True velocity, `f/f0 = sqrt((1 - b) / (1 + b))` with `b = v/c`.
    Relativistic,
}

impl DopplerConvention {
    /// The ratio `f / f0` for a doppler velocity `v` in this convention.
    pub fn frequency_ratio(self, velocity: f64) -> f64 {
        let beta = velocity / SPEED_OF_LIGHT;
        match self {
            DopplerConvention::Radio => 1.0 - beta,
            DopplerConvention::Optical => 1.0 / (1.0 + beta),
            DopplerConvention::Relativistic => ((1.0 - beta) / (1.0 + beta)).sqrt(),
        }
    }

    /// The doppler velocity in this convention for a frequency ratio `f / f0`.
    pub fn velocity_from_ratio(self, ratio: f64) -> f64 {
        let beta = match self {
            DopplerConvention::Radio => 1.0 - ratio,
            DopplerConvention::Optical => 1.0 / ratio - 1.0,
            DopplerConvention::Relativistic => {
                let r2 = ratio * ratio;
                (1.0 - r2) / (1.0 + r2)
            }
        };
        beta * SPEED_OF_LIGHT
    }

    /// Re-expresses a doppler velocity given in `self` in the `target` convention.
    pub fn convert(self, velocity: f64, target: DopplerConvention) -> f64 {
        if self == target {
            return velocity;
        }
        target.velocity_from_ratio(self.frequency_ratio(velocity))
    }
}

/// Spectral reference frames the converter can be asked for.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyFrame {
    #[default]
    Topocentric,
    Geocentric,
    Barycentric,
    Lsrk,
}

/// Observatory position, geocentric cartesian metres.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// A sky direction, radians.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct SkyDirection {
    pub ra: f64,
    pub dec: f64,
}

/// The narrow interface to the external coordinate/measures library.
pub trait Measures {
    /// Radial velocity of the observatory with respect to `frame`, towards
    /// `direction` at `time` (seconds), expressed in `convention`.
    fn observatory_velocity(
        &self,
        time: f64,
        position: &Position,
        direction: &SkyDirection,
        frame: FrequencyFrame,
        convention: DopplerConvention,
    ) -> Result<f64>;

    /// Exact (non-linearized) doppler to frequency.
    fn doppler_to_frequency(
        &self,
        doppler: f64,
        convention: DopplerConvention,
        rest_frequency: f64,
    ) -> f64 {
        rest_frequency * convention.frequency_ratio(doppler)
    }

    /// Exact frequency to doppler, the inverse of `doppler_to_frequency`.
    fn frequency_to_doppler(
        &self,
        frequency: f64,
        convention: DopplerConvention,
        rest_frequency: f64,
    ) -> f64 {
        convention.velocity_from_ratio(frequency / rest_frequency)
    }
}

/// A measures implementation with a fixed observatory velocity per frame.
///
/// Velocities are true (relativistic) radial velocities. The topocentric frame
/// is always at rest. Useful when no full measures engine is available and for
/// deterministic tests.
#[derive(Debug, Clone, Default)]
pub struct StaticMeasures {
    velocities: HashMap<FrequencyFrame, f64>,
}

impl StaticMeasures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_velocity(mut self, frame: FrequencyFrame, velocity: f64) -> Self {
        self.velocities.insert(frame, velocity);
        self
    }
}

impl Measures for StaticMeasures {
    fn observatory_velocity(
        &self,
        _time: f64,
        _position: &Position,
        _direction: &SkyDirection,
        frame: FrequencyFrame,
        convention: DopplerConvention,
    ) -> Result<f64> {
        let velocity = match frame {
            FrequencyFrame::Topocentric => 0.0,
            other => self.velocities.get(&other).copied().unwrap_or(0.0),
        };
        Ok(DopplerConvention::Relativistic.convert(velocity, convention))
    }
}
