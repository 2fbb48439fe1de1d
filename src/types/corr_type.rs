// In: src/types/corr_type.rs

use serde::{Deserialize, Serialize};

/// A polarization correlation product, carrying the conventional Stokes integer code.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum CorrType {
    I = 1,
    Q = 2,
    U = 3,
    V = 4,
    RR = 5,
    RL = 6,
    LR = 7,
    LL = 8,
    XX = 9,
    XY = 10,
    YX = 11,
    YY = 12,
}

impl CorrType {
    pub fn from_code(code: i32) -> Option<CorrType> {
        use CorrType::*;
        Some(match code {
            1 => I,
            2 => Q,
            3 => U,
            4 => V,
            5 => RR,
            6 => RL,
            7 => LR,
            8 => LL,
            9 => XX,
            10 => XY,
            11 => YX,
            12 => YY,
            _ => return None,
        })
    }

    pub const fn code(self) -> i32 {
        self as i32
    }

    /// The basis this product was measured in, if it is a raw feed product.
    pub const fn frame(self) -> Option<PolFrame> {
        match self {
            CorrType::RR | CorrType::RL | CorrType::LR | CorrType::LL => Some(PolFrame::Circular),
            CorrType::XX | CorrType::XY | CorrType::YX | CorrType::YY => Some(PolFrame::Linear),
            _ => None,
        }
    }

    /// `RR`/`XX`.
    pub const fn is_first_parallel(self) -> bool {
        matches!(self, CorrType::RR | CorrType::XX)
    }

    /// `LL`/`YY`.
    pub const fn is_second_parallel(self) -> bool {
        matches!(self, CorrType::LL | CorrType::YY)
    }

    /// `RL`/`XY`.
    pub const fn is_first_cross(self) -> bool {
        matches!(self, CorrType::RL | CorrType::XY)
    }

    /// `LR`/`YX`.
    pub const fn is_second_cross(self) -> bool {
        matches!(self, CorrType::LR | CorrType::YX)
    }
}

/// Feed basis of a set of correlations.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PolFrame {
    #[default]
    Circular,
    Linear,
}

impl PolFrame {
    /// Derives the frame from the first correlation. Stokes-only or empty
    /// lists fall back to circular.
    pub fn from_corr_types(corrs: &[CorrType]) -> PolFrame {
        corrs
            .first()
            .and_then(|c| c.frame())
            .unwrap_or(PolFrame::Circular)
    }
}
