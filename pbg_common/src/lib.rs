mod helpers;
mod minor_units;

pub mod op;
mod secret;

pub use helpers::{is_blank, parse_boolean_flag};
pub use minor_units::{MinorUnits, MinorUnitsConversionError, DEFAULT_CURRENCY_CODE};
pub use secret::Secret;
