//! Plain value records: ruptures, generation windows, catalog result codes.

use std::fmt;

/// Parent index carried by seed ruptures, which have no parent generation.
pub const SEED_PARENT: i32 = -1;

/// Stop time of a catalog that was never truncated.
pub const UNBOUNDED_STOP_TIME: f64 = f64::INFINITY;

/// A single simulated (or seed) earthquake rupture.
///
/// Times are in days relative to the forecast origin and kept at full
/// precision. Catalog storage reduces the remaining fields to `f32` and
/// `rup_parent` to `i32`; values read back from storage are exact to that
/// precision.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rupture {
    /// Rupture time, in days.
    pub t_day: f64,
    /// Rupture magnitude.
    pub rup_mag: f64,
    /// Productivity: expected direct children per unit Omori integral per
    /// unit GR rate, already corrected for the generation's magnitude window.
    pub k_prod: f64,
    /// Index of the parent within the previous generation, or
    /// [`SEED_PARENT`] for seed ruptures.
    pub rup_parent: i32,
    /// East coordinate, in km. Carried but never used for triggering.
    pub x_km: f64,
    /// North coordinate, in km. Carried but never used for triggering.
    pub y_km: f64,
}

impl Rupture {
    /// Construct a seed rupture at the origin of the coordinate system.
    pub fn seed(t_day: f64, rup_mag: f64, k_prod: f64) -> Self {
        Self {
            t_day,
            rup_mag,
            k_prod,
            rup_parent: SEED_PARENT,
            x_km: 0.0,
            y_km: 0.0,
        }
    }

    /// Whether this rupture belongs to the seed generation.
    pub fn is_seed(&self) -> bool {
        self.rup_parent == SEED_PARENT
    }
}

/// The simulation magnitude window `[gen_mag_min, gen_mag_max)` shared by
/// every rupture of one generation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GenerationInfo {
    /// Minimum simulated magnitude of the generation.
    pub gen_mag_min: f64,
    /// Maximum simulated magnitude of the generation.
    pub gen_mag_max: f64,
}

impl GenerationInfo {
    /// Create a generation window.
    pub fn new(gen_mag_min: f64, gen_mag_max: f64) -> Self {
        Self {
            gen_mag_min,
            gen_mag_max,
        }
    }
}

/// Outcome of simulating one catalog.
///
/// Anything other than [`CatalogResult::Ok`] means the catalog was truncated
/// and its stop time was tightened to the last fully realized instant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CatalogResult {
    /// The branching process died out on its own.
    #[default]
    Ok,
    /// A generation's expected size exceeded the configured maximum.
    GenTooLarge,
    /// The catalog's total size exceeded the configured maximum.
    CatTooLarge,
    /// The generation count reached the configured maximum.
    TooManyGen,
    /// An event above the maximum simulated magnitude was detected.
    EarlyStop,
}

impl CatalogResult {
    /// Number of distinct result codes.
    pub const COUNT: usize = 5;

    /// All result codes, in code order.
    pub const ALL: [CatalogResult; Self::COUNT] = [
        Self::Ok,
        Self::GenTooLarge,
        Self::CatTooLarge,
        Self::TooManyGen,
        Self::EarlyStop,
    ];

    /// Stable numeric code, used for persistence and per-code tallies.
    pub fn code(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::GenTooLarge => 1,
            Self::CatTooLarge => 2,
            Self::TooManyGen => 3,
            Self::EarlyStop => 4,
        }
    }

    /// Whether the catalog completed without truncation.
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

impl TryFrom<u8> for CatalogResult {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::ALL.get(code as usize).copied().ok_or(code)
    }
}

impl fmt::Display for CatalogResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "OK",
            Self::GenTooLarge => "GEN_TOO_LARGE",
            Self::CatTooLarge => "CAT_TOO_LARGE",
            Self::TooManyGen => "TOO_MANY_GEN",
            Self::EarlyStop => "EARLY_STOP",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_codes_roundtrip() {
        for r in CatalogResult::ALL {
            assert_eq!(CatalogResult::try_from(r.code()), Ok(r));
        }
        assert_eq!(CatalogResult::try_from(5), Err(5));
    }

    #[test]
    fn seed_has_sentinel_parent() {
        let rup = Rupture::seed(0.0, 6.0, 1.0);
        assert!(rup.is_seed());
        assert_eq!(rup.rup_parent, SEED_PARENT);
    }

    #[test]
    fn display_uses_screaming_names() {
        assert_eq!(CatalogResult::TooManyGen.to_string(), "TOO_MANY_GEN");
    }
}
