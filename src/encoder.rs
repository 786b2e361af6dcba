//! Encodes scalar set-points into the fixed-width command strings understood by
//! the EDC 522-class precision voltage/current source.
//!
//! A command is the 8-character concatenation `polarity + range_code + digits`:
//! one sign character, one range-select character, and a six-character digit
//! field holding `round(|value| / nominal_max * 1e6)` zero-padded, or the
//! sentinel `J00000` when the value sits exactly at the range's nominal
//! maximum. Range selection scans the table bottom-up and keeps a value that
//! lands on a boundary in the narrower range, matching the hardware convention
//! that a full-scale value uses its own range's maximum-magnitude encoding
//! rather than rolling over into the next range.

use std::fmt;

use crate::error::EncodeError;

/// Relative tolerance for the boundary and at-nominal comparisons.
pub const RANGE_EPSILON: f64 = 1e-9;

/// Sentinel digit field for "exactly at the nominal maximum of the range".
pub const AT_MAX_DIGITS: &str = "J00000";

/// Output mode of the precision source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceMode {
    Voltage,
    Current,
    /// Short-circuit protection mode; bypasses range logic entirely.
    Crowbar,
}
impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                SourceMode::Voltage => "voltage",
                SourceMode::Current => "current",
                SourceMode::Crowbar => "crowbar",
            }
        )
    }
}

/// One hardware range: nominal full-scale magnitude and its select character.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RangeEntry {
    pub nominal_max: f64,
    pub code: char,
    /// Requires the high-magnitude hardware option (`allow_extended_range`).
    pub extended: bool,
}

/// Ascending list of ranges for one output family.
#[derive(Clone, Debug, PartialEq)]
pub struct RangeTable {
    entries: Vec<RangeEntry>,
}
impl RangeTable {
    /// Builds a table from entries sorted ascending by `nominal_max`.
    ///
    /// # Panics
    ///
    /// Panics if the entries are not strictly ascending; range tables are
    /// fixed hardware data, so a misordered table is a programming error.
    pub fn new(entries: Vec<RangeEntry>) -> Self {
        assert!(
            entries.windows(2).all(|w| w[0].nominal_max < w[1].nominal_max),
            "range table entries must be strictly ascending by nominal_max"
        );
        RangeTable { entries }
    }

    /// EDC 522 voltage ranges: 0.1 V through 100 V, plus the 1000 V range
    /// available only with the high-voltage option installed.
    pub fn edc522_voltage() -> Self {
        Self::new(vec![
            RangeEntry { nominal_max: 0.1, code: '0', extended: false },
            RangeEntry { nominal_max: 10.0, code: '1', extended: false },
            RangeEntry { nominal_max: 100.0, code: '2', extended: false },
            RangeEntry { nominal_max: 1000.0, code: '3', extended: true },
        ])
    }

    /// EDC 522 current ranges: 10 mA and 100 mA.
    pub fn edc522_current() -> Self {
        Self::new(vec![
            RangeEntry { nominal_max: 0.01, code: '4', extended: false },
            RangeEntry { nominal_max: 0.1, code: '5', extended: false },
        ])
    }

    pub fn entries(&self) -> &[RangeEntry] {
        &self.entries
    }

    fn permitted<'a>(
        &'a self,
        allow_extended: bool,
    ) -> impl Iterator<Item = &'a RangeEntry> + 'a {
        self.entries
            .iter()
            .filter(move |e| allow_extended || !e.extended)
    }

    /// Bottom-up scan: the first permitted range whose nominal maximum covers
    /// `abs_value` (boundary values stay in the narrower range).
    fn select(&self, abs_value: f64, allow_extended: bool) -> Option<&RangeEntry> {
        self.permitted(allow_extended)
            .find(|e| within_range(abs_value, e.nominal_max))
    }

    fn top(&self, allow_extended: bool) -> Option<&RangeEntry> {
        self.permitted(allow_extended).last()
    }
}

/// Range tables for both output families of one source.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceRanges {
    pub voltage: RangeTable,
    pub current: RangeTable,
}
impl Default for SourceRanges {
    fn default() -> Self {
        SourceRanges {
            voltage: RangeTable::edc522_voltage(),
            current: RangeTable::edc522_current(),
        }
    }
}

/// A fully encoded source command; `Display` yields the literal 8-character
/// string written to the instrument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputCommand {
    pub polarity: char,
    pub range_code: char,
    pub digits: String,
}
impl OutputCommand {
    /// The fixed crowbar (short-circuit protection) command.
    pub fn crowbar() -> Self {
        OutputCommand {
            polarity: '0',
            range_code: '0',
            digits: "000000".to_string(),
        }
    }
}
impl fmt::Display for OutputCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}{}", self.polarity, self.range_code, self.digits)
    }
}

// Explicit comparators instead of floating-point equality (hardware tie-break
// rule: a value at a range boundary belongs to the narrower range).
fn within_range(abs_value: f64, nominal_max: f64) -> bool {
    abs_value <= nominal_max * (1.0 + RANGE_EPSILON)
}
fn at_nominal(abs_value: f64, nominal_max: f64) -> bool {
    (abs_value - nominal_max).abs() <= nominal_max * RANGE_EPSILON
}

/// Encodes `value` into an [`OutputCommand`] for the given mode.
///
/// `allow_extended_range` unlocks ranges marked [`RangeEntry::extended`]
/// (the high-voltage hardware option). Values whose digit field rounds to
/// zero encode as the all-zero command in the narrowest range; `-0.0` keeps
/// its negative sign.
///
/// # Examples
///
/// ```
/// use ferropulse::encoder::{encode, SourceMode, SourceRanges};
///
/// let ranges = SourceRanges::default();
/// let cmd = encode(5.0, SourceMode::Voltage, &ranges, false).unwrap();
/// assert_eq!(cmd.to_string(), "+1500000");
///
/// // Exactly at the 100 V nominal maximum: sentinel digits, no rollover.
/// let cmd = encode(-100.0, SourceMode::Voltage, &ranges, false).unwrap();
/// assert_eq!(cmd.to_string(), "-2J00000");
/// ```
pub fn encode(
    value: f64,
    mode: SourceMode,
    ranges: &SourceRanges,
    allow_extended_range: bool,
) -> Result<OutputCommand, EncodeError> {
    if mode == SourceMode::Crowbar {
        return Ok(OutputCommand::crowbar());
    }
    if !value.is_finite() {
        return Err(EncodeError::TypeMismatch(value));
    }
    let table = match mode {
        SourceMode::Voltage => &ranges.voltage,
        SourceMode::Current => &ranges.current,
        SourceMode::Crowbar => unreachable!(),
    };
    if table.permitted(allow_extended_range).next().is_none() {
        return Err(EncodeError::InvalidMode(mode.to_string()));
    }

    let polarity = if value.is_sign_negative() { '-' } else { '+' };
    let abs_value = value.abs();
    let entry = match table.select(abs_value, allow_extended_range) {
        Some(entry) => entry,
        None => {
            let limit = table
                .top(allow_extended_range)
                .map(|e| e.nominal_max)
                .unwrap_or(0.0);
            return Err(EncodeError::OutOfRange { value, limit });
        }
    };

    let digits = if at_nominal(abs_value, entry.nominal_max) {
        AT_MAX_DIGITS.to_string()
    } else {
        let scaled = (abs_value / entry.nominal_max * 1e6).round() as u64;
        format!("{:06}", scaled.min(999_999))
    };

    Ok(OutputCommand {
        polarity,
        range_code: entry.code,
        digits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges() -> SourceRanges {
        SourceRanges::default()
    }

    #[test]
    fn commands_are_eight_characters() {
        for value in [0.0, 0.05, 1.0, 9.9, 55.0, -72.5, 100.0] {
            let cmd = encode(value, SourceMode::Voltage, &ranges(), false).unwrap();
            assert_eq!(cmd.to_string().len(), 8, "value {}", value);
        }
    }

    #[test]
    fn boundary_value_stays_in_its_own_range() {
        // 10 V is the nominal maximum of range '1'; it must not roll into '2'.
        let cmd = encode(10.0, SourceMode::Voltage, &ranges(), false).unwrap();
        assert_eq!(cmd.range_code, '1');
        assert_eq!(cmd.digits, AT_MAX_DIGITS);
        // Just past the boundary rolls over and encodes numerically.
        let cmd = encode(10.1, SourceMode::Voltage, &ranges(), false).unwrap();
        assert_eq!(cmd.range_code, '2');
        assert_eq!(cmd.digits, "101000");
    }

    #[test]
    fn sign_only_differs_for_opposite_values() {
        let pos = encode(50.0, SourceMode::Voltage, &ranges(), false).unwrap();
        let neg = encode(-50.0, SourceMode::Voltage, &ranges(), false).unwrap();
        assert_eq!(pos.polarity, '+');
        assert_eq!(neg.polarity, '-');
        assert_eq!(pos.range_code, neg.range_code);
        assert_eq!(pos.digits, neg.digits);
    }

    #[test]
    fn extended_range_is_gated() {
        let err = encode(500.0, SourceMode::Voltage, &ranges(), false).unwrap_err();
        assert!(matches!(err, EncodeError::OutOfRange { .. }));
        let cmd = encode(500.0, SourceMode::Voltage, &ranges(), true).unwrap();
        assert_eq!(cmd.range_code, '3');
        assert_eq!(cmd.digits, "500000");
    }

    #[test]
    fn current_mode_uses_its_own_table() {
        let cmd = encode(0.05, SourceMode::Current, &ranges(), false).unwrap();
        assert_eq!(cmd.range_code, '5');
        assert_eq!(cmd.digits, "500000");
        let cmd = encode(0.01, SourceMode::Current, &ranges(), false).unwrap();
        assert_eq!(cmd.range_code, '4');
        assert_eq!(cmd.digits, AT_MAX_DIGITS);
    }

    #[test]
    fn zero_and_below_resolution_encode_as_all_zeros() {
        let cmd = encode(0.0, SourceMode::Voltage, &ranges(), false).unwrap();
        assert_eq!(cmd.to_string(), "+0000000");
        // Below the 0.1 V range's resolvable step.
        let cmd = encode(4e-8, SourceMode::Voltage, &ranges(), false).unwrap();
        assert_eq!(cmd.to_string(), "+0000000");
        // Negative zero keeps its sign.
        let cmd = encode(-0.0, SourceMode::Voltage, &ranges(), false).unwrap();
        assert_eq!(cmd.to_string(), "-0000000");
    }

    #[test]
    fn crowbar_bypasses_range_logic() {
        let cmd = encode(123.4, SourceMode::Crowbar, &ranges(), false).unwrap();
        assert_eq!(cmd.to_string(), "00000000");
    }

    #[test]
    fn non_finite_values_are_type_mismatch() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = encode(bad, SourceMode::Voltage, &ranges(), false).unwrap_err();
            assert!(matches!(err, EncodeError::TypeMismatch(_)));
        }
    }

    #[test]
    fn custom_boundary_table_selects_named_code() {
        let table = RangeTable::new(vec![
            RangeEntry { nominal_max: 1.0, code: 'A', extended: false },
            RangeEntry { nominal_max: 100.0, code: 'X', extended: false },
            RangeEntry { nominal_max: 300.0, code: 'Y', extended: false },
        ]);
        let ranges = SourceRanges { voltage: table, current: RangeTable::edc522_current() };
        let cmd = encode(100.0, SourceMode::Voltage, &ranges, false).unwrap();
        assert_eq!(cmd.range_code, 'X');
        assert_eq!(cmd.digits, AT_MAX_DIGITS);
    }
}
