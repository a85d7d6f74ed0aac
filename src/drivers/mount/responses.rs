//! Parsers for the mount's fixed response shapes, and the sexagesimal
//! conversions shared with the command side.
//!
//! Each shape is matched by a strict anchored regex; anything else is an
//! `INVALID_VALUE` carrying the offending reply.

use crate::{ASCOMError, ASCOMResult};
use regex::Regex;
use std::sync::LazyLock;

fn parse_error(resp: &str) -> ASCOMError {
    ASCOMError::invalid_value(format_args!("problem parsing response {resp:?}"))
}

/// `1#`, `0#`, bare `1`/`0`, or `e{code}#`.
pub(super) fn parse_standard(resp: &str) -> ASCOMResult<u32> {
    static SHAPE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^e?([0-9])#?$").expect("valid regex"));
    let captures = SHAPE.captures(resp.trim_end_matches('\0')).ok_or_else(|| parse_error(resp))?;
    captures[1].parse().map_err(|_| parse_error(resp))
}

/// `HH:MM:SS#`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Hms {
    pub(super) hours: u32,
    pub(super) minutes: u32,
    pub(super) seconds: u32,
}

impl Hms {
    /// Split a decimal hour value, rounding seconds with carry: `59.99999h`
    /// becomes `60:00:00`, never `59:59:60`.
    pub(super) fn from_decimal(value: f64) -> Self {
        let (hours, minutes, seconds) = split_sexagesimal(value.abs());
        Self {
            hours,
            minutes,
            seconds,
        }
    }

    pub(super) fn to_decimal(self) -> f64 {
        f64::from(self.hours) + f64::from(self.minutes) / 60.0 + f64::from(self.seconds) / 3600.0
    }

    pub(super) fn parse(resp: &str) -> ASCOMResult<Self> {
        static SHAPE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"^([0-9]{2}):([0-9]{2}):([0-9]{2})#$").expect("valid regex"));
        let captures = SHAPE.captures(resp).ok_or_else(|| parse_error(resp))?;
        Ok(Self {
            hours: captures[1].parse().map_err(|_| parse_error(resp))?,
            minutes: captures[2].parse().map_err(|_| parse_error(resp))?,
            seconds: captures[3].parse().map_err(|_| parse_error(resp))?,
        })
    }
}

/// `sDD*MM:SS#` (declination, latitude, altitude) or `sDDD*MM:SS#`
/// (longitude); also `DDD*MM:SS#` for the unsigned azimuth form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct SignedDms {
    pub(super) negative: bool,
    pub(super) degrees: u32,
    pub(super) minutes: u32,
    pub(super) seconds: u32,
}

impl SignedDms {
    /// Split a decimal degree value, rounding seconds with carry into
    /// minutes and degrees.
    pub(super) fn from_decimal(value: f64) -> Self {
        let (degrees, minutes, seconds) = split_sexagesimal(value.abs());
        Self {
            negative: value < 0.0,
            degrees,
            minutes,
            seconds,
        }
    }

    pub(super) fn to_decimal(self) -> f64 {
        let magnitude = f64::from(self.degrees)
            + f64::from(self.minutes) / 60.0
            + f64::from(self.seconds) / 3600.0;
        if self.negative {
            -magnitude
        } else {
            magnitude
        }
    }

    pub(super) fn parse(resp: &str) -> ASCOMResult<Self> {
        static SHAPE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"^([+-]?)([0-9]{2,3})\*([0-9]{2}):([0-9]{2})#$").expect("valid regex")
        });
        let captures = SHAPE.captures(resp).ok_or_else(|| parse_error(resp))?;
        Ok(Self {
            negative: &captures[1] == "-",
            degrees: captures[2].parse().map_err(|_| parse_error(resp))?,
            minutes: captures[3].parse().map_err(|_| parse_error(resp))?,
            seconds: captures[4].parse().map_err(|_| parse_error(resp))?,
        })
    }
}

/// `sHH:MM#` (timezone offset).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct SignedHm {
    pub(super) negative: bool,
    pub(super) hours: u32,
    pub(super) minutes: u32,
}

impl SignedHm {
    pub(super) fn parse(resp: &str) -> ASCOMResult<Self> {
        static SHAPE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"^([+-])([0-9]{2}):([0-9]{2})#$").expect("valid regex"));
        let captures = SHAPE.captures(resp).ok_or_else(|| parse_error(resp))?;
        Ok(Self {
            negative: &captures[1] == "-",
            hours: captures[2].parse().map_err(|_| parse_error(resp))?,
            minutes: captures[3].parse().map_err(|_| parse_error(resp))?,
        })
    }
}

/// `MM/DD/YY#`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct DateMdy {
    pub(super) month: u32,
    pub(super) day: u32,
    pub(super) year: u32,
}

impl DateMdy {
    pub(super) fn parse(resp: &str) -> ASCOMResult<Self> {
        static SHAPE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"^([0-9]{2})/([0-9]{2})/([0-9]{2})#$").expect("valid regex")
        });
        let captures = SHAPE.captures(resp).ok_or_else(|| parse_error(resp))?;
        Ok(Self {
            month: captures[1].parse().map_err(|_| parse_error(resp))?,
            day: captures[2].parse().map_err(|_| parse_error(resp))?,
            year: captures[3].parse().map_err(|_| parse_error(resp))?,
        })
    }
}

/// Split `|value|` into (whole, minutes, seconds) with carry on rounding.
fn split_sexagesimal(value: f64) -> (u32, u32, u32) {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let mut whole = value as u32;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let mut minutes = ((value - f64::from(whole)) * 60.0) as u32;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let mut seconds = ((value - f64::from(whole) - f64::from(minutes) / 60.0) * 3600.0).round()
        as u32;

    if seconds == 60 {
        minutes += 1;
        seconds = 0;
    }
    if minutes == 60 {
        whole += 1;
        minutes = 0;
    }
    (whole, minutes, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_responses() {
        assert_eq!(parse_standard("1").unwrap(), 1);
        assert_eq!(parse_standard("1#").unwrap(), 1);
        assert_eq!(parse_standard("0#").unwrap(), 0);
        assert_eq!(parse_standard("e2#").unwrap(), 2);
        assert!(parse_standard("x#").is_err());
        assert!(parse_standard("12#").is_err());
    }

    #[test]
    fn hms_parse_and_convert() {
        let value = Hms::parse("05:45:43#").unwrap();
        assert_eq!(
            value,
            Hms {
                hours: 5,
                minutes: 45,
                seconds: 43
            }
        );
        assert!((value.to_decimal() - 5.761_944).abs() < 1.0 / 3600.0);
        assert!(Hms::parse("5:45:43#").is_err());
        assert!(Hms::parse("05:45:43").is_err());
    }

    #[test]
    fn signed_dms_parse_and_convert() {
        let dec = SignedDms::parse("-09*01:02#").unwrap();
        assert!(dec.negative);
        assert_eq!((dec.degrees, dec.minutes, dec.seconds), (9, 1, 2));
        assert!((dec.to_decimal() + 9.017_222).abs() < 1.0 / 3600.0);

        let lon = SignedDms::parse("-098*00:00#").unwrap();
        assert_eq!(lon.degrees, 98);

        // The azimuth form has no sign.
        let az = SignedDms::parse("270*15:30#").unwrap();
        assert!(!az.negative);
        assert_eq!(az.degrees, 270);

        assert!(SignedDms::parse("-9*01:02#").is_err());
        assert!(SignedDms::parse("-09:01:02#").is_err());
    }

    #[test]
    fn signed_hm_and_date() {
        let tz = SignedHm::parse("-05:30#").unwrap();
        assert!(tz.negative);
        assert_eq!((tz.hours, tz.minutes), (5, 30));

        let date = DateMdy::parse("05/06/24#").unwrap();
        assert_eq!((date.month, date.day, date.year), (5, 6, 24));
        assert!(DateMdy::parse("5/6/24#").is_err());
    }

    #[test]
    fn seconds_round_up_with_carry() {
        // 59.99999 degrees must carry all the way up, never emit :59:60.
        let value = SignedDms::from_decimal(59.999_99);
        assert_eq!((value.degrees, value.minutes, value.seconds), (60, 0, 0));

        let value = Hms::from_decimal(12.999_999);
        assert_eq!((value.hours, value.minutes, value.seconds), (13, 0, 0));

        // And a plain carry from seconds into minutes only.
        let value = SignedDms::from_decimal(30.016_666);
        assert_eq!((value.degrees, value.minutes, value.seconds), (30, 1, 0));
    }

    #[test]
    fn round_trip_within_one_arcsecond() {
        for &value in &[0.0, 30.561_111, -45.123_456, 89.999_9, -0.000_3] {
            let encoded = SignedDms::from_decimal(value);
            assert!(
                (encoded.to_decimal() - value).abs() <= 1.0 / 3600.0,
                "{value} -> {encoded:?}"
            );
        }
    }
}
