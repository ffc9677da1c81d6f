//! Strategy tables for infill, outfill and catalog acceptance.
//!
//! Each strategy has a stable integer code so it can be chosen from a
//! configuration file; unknown codes are rejected with
//! [`ConfigError::InvalidMode`].

use std::fmt;

use crate::error::ConfigError;

// ── InfillMode ─────────────────────────────────────────────────────

/// How magnitudes below a generation's simulated floor are filled in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum InfillMode {
    /// Count only simulated ruptures.
    #[default]
    None,
    /// Scale each generation's per-time-bin count by the GR ratio between
    /// the unsimulated and simulated magnitude ranges.
    Scale,
    /// Accumulate expected Omori trigger rates and draw (or stack) a
    /// Poisson count for the unsimulated range.
    Poisson,
    /// Have the scanner synthesize sterile ruptures down to the lowest
    /// grid magnitude and count them directly.
    Sterile,
}

impl InfillMode {
    /// Every mode, in code order.
    pub const ALL: [Self; 4] = [Self::None, Self::Scale, Self::Poisson, Self::Sterile];

    /// Stable integer code.
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for InfillMode {
    type Error = ConfigError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(code as usize)
            .copied()
            .ok_or(ConfigError::InvalidMode {
                kind: "infill mode",
                code,
            })
    }
}

impl fmt::Display for InfillMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "NONE",
            Self::Scale => "SCALE",
            Self::Poisson => "POISSON",
            Self::Sterile => "STERILE",
        })
    }
}

// ── OutfillMode ────────────────────────────────────────────────────

/// What a truncated catalog contributes to time bins past its stop time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OutfillMode {
    /// Carry the last observed cumulative counts forward.
    #[default]
    None,
    /// Contribute nothing to unobserved cells.
    Omit,
    /// Add the expected direct aftershocks of every rupture as a Poisson
    /// distribution on top of the observed counts.
    PdfDirect,
}

impl OutfillMode {
    /// Every mode, in code order.
    pub const ALL: [Self; 3] = [Self::None, Self::Omit, Self::PdfDirect];

    /// Stable integer code.
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for OutfillMode {
    type Error = ConfigError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(code as usize)
            .copied()
            .ok_or(ConfigError::InvalidMode {
                kind: "outfill mode",
                code,
            })
    }
}

impl fmt::Display for OutfillMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "NONE",
            Self::Omit => "OMIT",
            Self::PdfDirect => "PDF_DIRECT",
        })
    }
}

// ── ClipPolicy ─────────────────────────────────────────────────────

/// Whether a truncated catalog is accepted, and whether the time bin
/// holding its stop time counts as observed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ClipPolicy {
    /// Accept every catalog; keep the partial bin.
    #[default]
    Any,
    /// Accept every catalog; discard the partial bin.
    AnyClip,
    /// Accept if at least one cell is observed; keep the partial bin.
    Range,
    /// Accept only catalogs that cover the whole grid.
    Entire,
    /// Accept catalogs that reach into the last bin; discard that bin if
    /// it is partial.
    EntireClip,
}

impl ClipPolicy {
    /// Every policy, in code order.
    pub const ALL: [Self; 5] = [
        Self::Any,
        Self::AnyClip,
        Self::Range,
        Self::Entire,
        Self::EntireClip,
    ];

    /// Stable integer code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Whether the partial bin holding the stop time is discarded.
    pub fn discards_partial_bin(self) -> bool {
        matches!(self, Self::AnyClip | Self::EntireClip)
    }
}

impl TryFrom<u8> for ClipPolicy {
    type Error = ConfigError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(code as usize)
            .copied()
            .ok_or(ConfigError::InvalidMode {
                kind: "clip policy",
                code,
            })
    }
}

impl fmt::Display for ClipPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Any => "ANY",
            Self::AnyClip => "ANY_CLIP",
            Self::Range => "RANGE",
            Self::Entire => "ENTIRE",
            Self::EntireClip => "ENTIRE_CLIP",
        })
    }
}

// ── AccumulationModes ──────────────────────────────────────────────

/// The full strategy table of a stacked accumulator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AccumulationModes {
    /// Magnitude infill.
    pub infill: InfillMode,
    /// Time outfill.
    pub outfill: OutfillMode,
    /// Catalog acceptance and partial-bin handling.
    pub clip: ClipPolicy,
}

impl AccumulationModes {
    /// Build a strategy table from integer codes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidMode`] for the first unknown code.
    pub fn from_codes(infill: u8, outfill: u8, clip: u8) -> Result<Self, ConfigError> {
        Ok(Self {
            infill: InfillMode::try_from(infill)?,
            outfill: OutfillMode::try_from(outfill)?,
            clip: ClipPolicy::try_from(clip)?,
        })
    }
}
