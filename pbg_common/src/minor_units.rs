use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const DEFAULT_CURRENCY_CODE: &str = "EUR";

//--------------------------------------     MinorUnits       ---------------------------------------------------------
/// An amount of money expressed in the smallest unit of its currency (cents, pence, kopiyky).
///
/// The processor works in minor units, while partners and the local record display major units with two decimals.
/// All currencies handled by the gateway are assumed to have two decimal places.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct MinorUnits(i64);

op!(binary MinorUnits, Add, add);
op!(binary MinorUnits, Sub, sub);
op!(inplace MinorUnits, SubAssign, sub_assign);
op!(unary MinorUnits, Neg, neg);

impl Mul<i64> for MinorUnits {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for MinorUnits {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in minor units: {0}")]
pub struct MinorUnitsConversionError(String);

impl From<i64> for MinorUnits {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for MinorUnits {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for MinorUnits {}

impl TryFrom<u64> for MinorUnits {
    type Error = MinorUnitsConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(MinorUnitsConversionError(format!("Value {} is too large to convert to MinorUnits", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl FromStr for MinorUnits {
    type Err = MinorUnitsConversionError;

    /// Parses an amount given in major units, e.g. "12.50" -> 1250.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let major = s.trim().parse::<f64>().map_err(|e| MinorUnitsConversionError(format!("{s}: {e}")))?;
        Self::try_from_major(major)
    }
}

/// Formats the value in major units with exactly two decimals, e.g. 1250 -> "12.50"
impl Display for MinorUnits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl MinorUnits {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_major_units(major: i64) -> Self {
        Self(major * 100)
    }

    /// Converts a major-unit amount to minor units, rounding to the nearest minor unit.
    pub fn try_from_major(major: f64) -> Result<Self, MinorUnitsConversionError> {
        let minor = (major * 100.0).round();
        if !minor.is_finite() || minor.abs() > i64::MAX as f64 {
            return Err(MinorUnitsConversionError(format!("{major} is out of range")));
        }
        #[allow(clippy::cast_possible_truncation)]
        Ok(Self(minor as i64))
    }

    pub fn to_major(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}
