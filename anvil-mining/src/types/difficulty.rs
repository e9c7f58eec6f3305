//! Difficulty derived from a block target.

use bitcoin::pow::{CompactTarget, Target};
use std::fmt;

/// Suffixes for displaying large difficulties, largest first.
const SI_SUFFIXES: [(f64, &str); 5] = [
    (1e15, "P"),
    (1e12, "T"),
    (1e9, "G"),
    (1e6, "M"),
    (1e3, "K"),
];

/// Mining difficulty relative to the easiest mainnet target.
///
/// Only used for reporting, so it is kept as a float.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Difficulty(f64);

impl Difficulty {
    /// Difficulty of the compact `bits` carried in a header.
    pub fn from_bits(bits: CompactTarget) -> Self {
        Self(Target::from_compact(bits).difficulty_float())
    }

    pub fn as_f64(self) -> f64 {
        self.0
    }
}

/// Three significant digits with an SI suffix, e.g. `16.3K`.
///
/// Difficulties below one (regtest) are shown in exponent form.
impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.0;
        if value < 1.0 {
            return write!(f, "{value:.3e}");
        }

        let (scaled, suffix) = SI_SUFFIXES
            .iter()
            .find(|(scale, _)| value >= *scale)
            .map_or((value, ""), |(scale, suffix)| (value / scale, *suffix));
        let decimals = match scaled {
            s if s >= 100.0 => 0,
            s if s >= 10.0 => 1,
            _ => 2,
        };
        let digits = format!("{scaled:.decimals$}");
        let digits = if digits.contains('.') {
            digits.trim_end_matches('0').trim_end_matches('.')
        } else {
            digits.as_str()
        };
        write!(f, "{digits}{suffix}")
    }
}
