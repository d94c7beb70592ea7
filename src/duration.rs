/*
 * This file is part of fand.
 *
 * Copyright (C) 2025 fand contributors
 *
 * fand is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * fand is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with fand. If not, see <https://www.gnu.org/licenses/>.
 */

//! Relative duration parsing for `fanctl shelfpwm-expire-in`
//!
//! Two spellings are accepted:
//! - unit suffixes: `21d4h1m5s`, `4h10s`, `90s`
//! - colon fields, least significant last: `10` (s), `4:22` (m:s),
//!   `1:04:22` (h:m:s), `7:22:59:00` (d:h:m:s); the seconds field may carry
//!   a fraction, as in `7:22:59:00.250`

use std::time::Duration;

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use fand_error::{FandError, Result};

lazy_static! {
    static ref UNIT_FORMAT: Regex =
        Regex::new(r"^(?:(?P<day>[0-9]+)d)?(?:(?P<h>[0-9]+)h)?(?:(?P<min>[0-9]+)m)?(?:(?P<sec>[0-9]+)s)?$")
            .expect("unit duration pattern");
    static ref COLON_FORMAT: Regex = Regex::new(
        r"^(?:(?:(?:(?P<day>[0-9]+):)?(?P<h>[0-9]+):)?(?P<min>[0-9]+):)?(?P<sec>[0-9]+)(?:\.(?P<frac>[0-9]+))?$"
    )
    .expect("colon duration pattern");
}

const NANOS_PER_SEC: u32 = 1_000_000_000;

fn invalid(input: &str) -> FandError {
    FandError::invalid_value(format!("Cannot convert {input} to a duration"))
}

fn field(caps: &Captures<'_>, name: &str, input: &str) -> Result<u64> {
    match caps.name(name) {
        Some(m) => m.as_str().parse().map_err(|_| invalid(input)),
        None => Ok(0),
    }
}

/// Decimal digits after the point as nanoseconds, extra precision dropped
fn fraction_nanos(digits: &str) -> u32 {
    let mut nanos = 0u32;
    let mut scale = NANOS_PER_SEC / 10;
    for digit in digits.bytes().take(9) {
        nanos += u32::from(digit - b'0') * scale;
        scale /= 10;
    }
    nanos
}

pub fn parse_duration(input: &str) -> Result<Duration> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(invalid(input));
    }
    let caps = UNIT_FORMAT
        .captures(trimmed)
        .or_else(|| COLON_FORMAT.captures(trimmed))
        .ok_or_else(|| invalid(input))?;

    let secs = [("day", 86_400u64), ("h", 3_600), ("min", 60), ("sec", 1)]
        .iter()
        .try_fold(0u64, |total, &(name, unit)| {
            let value = field(&caps, name, input)?;
            value
                .checked_mul(unit)
                .and_then(|v| total.checked_add(v))
                .ok_or_else(|| invalid(input))
        })?;
    let nanos = caps.name("frac").map_or(0, |m| fraction_nanos(m.as_str()));
    Ok(Duration::new(secs, nanos))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(input: &str) -> f64 {
        parse_duration(input).unwrap().as_secs_f64()
    }

    #[test]
    fn test_unit_suffixes() {
        assert_eq!(secs("21d4h1m5s"), (21 * 86_400 + 4 * 3_600 + 60 + 5) as f64);
        assert_eq!(secs("4h10s"), (4 * 3_600 + 10) as f64);
        assert_eq!(secs("3m"), 180.0);
        assert_eq!(secs("2d"), 172_800.0);
    }

    #[test]
    fn test_colon_fields() {
        assert_eq!(secs("10"), 10.0);
        assert_eq!(secs("4:22"), 262.0);
        assert_eq!(secs("1:04:22"), 3_862.0);
        assert_eq!(secs("7:22:59:00"), (7 * 86_400 + 22 * 3_600 + 59 * 60) as f64);
        assert_eq!(
            parse_duration("7:22:59:00.250").unwrap(),
            Duration::new(7 * 86_400 + 22 * 3_600 + 59 * 60, 250_000_000)
        );
        assert_eq!(parse_duration("4:22.5").unwrap(), Duration::new(262, 500_000_000));
    }

    #[test]
    fn test_surrounding_whitespace() {
        assert_eq!(secs("  90s "), 90.0);
    }

    #[test]
    fn test_rejected() {
        for input in ["", "   ", "abc", "4h-10s", "1:2:3:4:5", "10.", "s", "5x", "1.5h"] {
            let err = parse_duration(input).unwrap_err();
            assert!(matches!(err, FandError::InvalidValue(_)), "{input}");
        }
    }

    #[test]
    fn test_non_ascii_digits_rejected() {
        for input in ["10.\u{0663}", "\u{0663}s", "1:\u{0664}2", "\u{0661}\u{0662}"] {
            let err = parse_duration(input).unwrap_err();
            assert!(matches!(err, FandError::InvalidValue(_)), "{input}");
        }
    }

    #[test]
    fn test_overflow() {
        assert!(parse_duration("99999999999999999999d").is_err());
        assert!(parse_duration("999999999999999999d").is_err());
    }
}
