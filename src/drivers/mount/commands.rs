//! Wire codec for the mount's LX200-dialect command set.
//!
//! Commands are fixed ASCII strings terminated by `#` with zero-padded
//! field widths. Every parameterized builder validates its field ranges
//! before producing a string, so nothing out of range ever reaches the
//! port.

use crate::{ASCOMError, ASCOMResult};

pub(super) const GET_VERSION: &str = ":GVP#";
pub(super) const GET_DATE: &str = ":GC#";
pub(super) const GET_TIME: &str = ":GL#";
pub(super) const GET_SIDEREAL_TIME: &str = ":GS#";
pub(super) const GET_TIMEZONE: &str = ":GG#";
pub(super) const GET_LATITUDE: &str = ":Gt#";
pub(super) const GET_LONGITUDE: &str = ":Gg#";
pub(super) const GET_CARDINAL_DIRECTION: &str = ":Gm#";
pub(super) const GET_CURRENT_RA: &str = ":GR#";
pub(super) const GET_CURRENT_DEC: &str = ":GD#";
pub(super) const GET_AZIMUTH: &str = ":GZ#";
pub(super) const GET_ALTITUDE: &str = ":GA#";
pub(super) const GET_GUIDE_RATE: &str = ":Ggr#";
pub(super) const GET_TRACKING_STATUS: &str = ":GAT#";
pub(super) const GET_STATUS: &str = ":GU#";

pub(super) const GOTO_TARGET: &str = ":MS#";
pub(super) const STOP_ALL: &str = ":Q#";
pub(super) const MOVE_EAST: &str = ":Me#";
pub(super) const MOVE_WEST: &str = ":Mw#";
pub(super) const MOVE_NORTH: &str = ":Mn#";
pub(super) const MOVE_SOUTH: &str = ":Ms#";
pub(super) const STOP_EAST: &str = ":Qe#";
pub(super) const STOP_WEST: &str = ":Qw#";
pub(super) const STOP_NORTH: &str = ":Qn#";
pub(super) const STOP_SOUTH: &str = ":Qs#";

pub(super) const TRACK_RATE_SIDEREAL: &str = ":TQ#";
pub(super) const TRACK_RATE_LUNAR: &str = ":TL#";
pub(super) const TRACK_RATE_SOLAR: &str = ":TS#";
pub(super) const TRACK_RATE_KING: &str = ":TK#";
pub(super) const START_TRACKING: &str = ":Te#";
pub(super) const STOP_TRACKING: &str = ":Td#";

pub(super) const SYNC_TO_TARGET: &str = ":CM#";
pub(super) const GO_HOME: &str = ":hC#";
pub(super) const PARK: &str = ":hP#";
pub(super) const UNPARK: &str = ":hR#";

fn check_range(name: &str, value: i64, min: i64, max: i64) -> ASCOMResult {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ASCOMError::invalid_value(format_args!(
            "{name} must be {min} through {max}"
        )))
    }
}

const fn sign_char(negative: bool) -> char {
    if negative {
        '-'
    } else {
        '+'
    }
}

/// `:SC{MM}/{DD}/{YY}#`; the mount acks with `1`.
pub(super) fn set_date(month: u32, day: u32, year: u32) -> ASCOMResult<String> {
    check_range("month", month.into(), 1, 12)?;
    check_range("day", day.into(), 1, 31)?;
    check_range("year", year.into(), 0, 99)?;
    Ok(format!(":SC{month:02}/{day:02}/{year:02}#"))
}

/// `:SL{HH}:{MM}:{SS}#`; the mount acks with `1`.
pub(super) fn set_time(hours: u32, minutes: u32, seconds: u32) -> ASCOMResult<String> {
    check_range("hour", hours.into(), 0, 23)?;
    check_range("minutes", minutes.into(), 0, 59)?;
    check_range("seconds", seconds.into(), 0, 59)?;
    Ok(format!(":SL{hours:02}:{minutes:02}:{seconds:02}#"))
}

/// `:SH{0|1}#`.
pub(super) fn set_daylight_savings(on: bool) -> String {
    format!(":SH{}#", u8::from(on))
}

/// `:SG{±}{HH}:{MM}#`; minutes may only be 0 or 30.
pub(super) fn set_timezone(negative: bool, hours: u32, minutes: u32) -> ASCOMResult<String> {
    check_range("hour offset", hours.into(), 0, 23)?;
    if minutes != 0 && minutes != 30 {
        return Err(ASCOMError::invalid_value("minutes offset must be 0 or 30"));
    }
    Ok(format!(
        ":SG{}{hours:02}:{minutes:02}#",
        sign_char(negative)
    ))
}

/// `:St{±}{DD}*{MM}:{SS}#`.
pub(super) fn set_latitude(
    negative: bool,
    degrees: u32,
    minutes: u32,
    seconds: u32,
) -> ASCOMResult<String> {
    check_range("latitude degrees", degrees.into(), 0, 90)?;
    check_range("minutes", minutes.into(), 0, 59)?;
    check_range("seconds", seconds.into(), 0, 59)?;
    Ok(format!(
        ":St{}{degrees:02}*{minutes:02}:{seconds:02}#",
        sign_char(negative)
    ))
}

/// `:Sg{±}{DDD}*{MM}:{SS}#`.
pub(super) fn set_longitude(
    negative: bool,
    degrees: u32,
    minutes: u32,
    seconds: u32,
) -> ASCOMResult<String> {
    check_range("longitude degrees", degrees.into(), 0, 180)?;
    check_range("minutes", minutes.into(), 0, 59)?;
    check_range("seconds", seconds.into(), 0, 59)?;
    Ok(format!(
        ":Sg{}{degrees:03}*{minutes:02}:{seconds:02}#",
        sign_char(negative)
    ))
}

/// `:Sr{HH}:{MM}:{SS}#`.
pub(super) fn set_target_ra(hours: u32, minutes: u32, seconds: u32) -> ASCOMResult<String> {
    check_range("hours", hours.into(), 0, 23)?;
    check_range("minutes", minutes.into(), 0, 59)?;
    check_range("seconds", seconds.into(), 0, 59)?;
    Ok(format!(":Sr{hours:02}:{minutes:02}:{seconds:02}#"))
}

/// `:Sd{±}{DD}:{MM}:{SS}#`.
pub(super) fn set_target_dec(
    negative: bool,
    degrees: u32,
    minutes: u32,
    seconds: u32,
) -> ASCOMResult<String> {
    check_range("degrees", degrees.into(), 0, 90)?;
    check_range("minutes", minutes.into(), 0, 59)?;
    check_range("seconds", seconds.into(), 0, 59)?;
    Ok(format!(
        ":Sd{}{degrees:02}:{minutes:02}:{seconds:02}#",
        sign_char(negative)
    ))
}

/// `:Rv{rate}#` with rate in multiples of sidereal, `0.00` to `1440.00`.
pub(super) fn set_move_rate(rate: f64) -> ASCOMResult<String> {
    if !(0.0..=1440.0).contains(&rate) {
        return Err(ASCOMError::invalid_value(
            "move speed must be between 0 and 1440.00",
        ));
    }
    Ok(format!(":Rv{rate:.2}#"))
}

/// `:Mg{e|w|n|s}{DDDD}#` with the duration in milliseconds, 3000 max.
pub(super) fn guide(direction: char, duration_ms: u32) -> ASCOMResult<String> {
    if !matches!(direction, 'e' | 'w' | 'n' | 's') {
        return Err(ASCOMError::invalid_value("direction must be e, w, n, or s"));
    }
    check_range("rate", duration_ms.into(), 0, 3000)?;
    Ok(format!(":Mg{direction}{duration_ms:04}#"))
}

/// `:Rg0.{NN}#`; valid guide rates are 0.10 to 0.90 of sidereal.
pub(super) fn set_guide_rate(rate: f64) -> ASCOMResult<String> {
    if !(0.1..=0.9).contains(&rate) {
        return Err(ASCOMError::invalid_value(
            "guide rate must be between .1 and .9",
        ));
    }
    Ok(format!(":Rg{rate:.2}#"))
}

/// Composite set-target-and-goto: `:SMeq{HH}:{MM}:{SS}&{±}{DD}*{MM}:{SS}#`.
pub(super) fn set_target_and_goto(
    ra_hours: u32,
    ra_minutes: u32,
    ra_seconds: u32,
    dec_negative: bool,
    dec_degrees: u32,
    dec_minutes: u32,
    dec_seconds: u32,
) -> ASCOMResult<String> {
    check_range("hours", ra_hours.into(), 0, 23)?;
    check_range("minutes", ra_minutes.into(), 0, 59)?;
    check_range("seconds", ra_seconds.into(), 0, 59)?;
    check_range("degrees", dec_degrees.into(), 0, 90)?;
    check_range("minutes", dec_minutes.into(), 0, 59)?;
    check_range("seconds", dec_seconds.into(), 0, 59)?;
    Ok(format!(
        ":SMeq{ra_hours:02}:{ra_minutes:02}:{ra_seconds:02}&{}{dec_degrees:02}*{dec_minutes:02}:{dec_seconds:02}#",
        sign_char(dec_negative)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ASCOMErrorCode;

    #[test]
    fn fixed_commands() {
        assert_eq!(GET_VERSION, ":GVP#");
        assert_eq!(GET_DATE, ":GC#");
        assert_eq!(GET_SIDEREAL_TIME, ":GS#");
        assert_eq!(GET_TRACKING_STATUS, ":GAT#");
        assert_eq!(GET_STATUS, ":GU#");
        assert_eq!(GOTO_TARGET, ":MS#");
        assert_eq!(SYNC_TO_TARGET, ":CM#");
        assert_eq!(GO_HOME, ":hC#");
        assert_eq!(PARK, ":hP#");
        assert_eq!(UNPARK, ":hR#");
    }

    #[test]
    fn date_and_time_formatting() {
        assert_eq!(set_date(5, 6, 24).unwrap(), ":SC05/06/24#");
        assert_eq!(set_time(9, 2, 43).unwrap(), ":SL09:02:43#");
        assert_eq!(set_daylight_savings(false), ":SH0#");
        assert_eq!(set_daylight_savings(true), ":SH1#");
        assert_eq!(set_timezone(true, 5, 0).unwrap(), ":SG-05:00#");
        assert_eq!(set_timezone(true, 5, 30).unwrap(), ":SG-05:30#");
    }

    #[test]
    fn site_formatting() {
        assert_eq!(set_latitude(false, 30, 33, 40).unwrap(), ":St+30*33:40#");
        assert_eq!(set_longitude(true, 98, 0, 0).unwrap(), ":Sg-098*00:00#");
    }

    #[test]
    fn target_formatting() {
        assert_eq!(set_target_ra(5, 45, 43).unwrap(), ":Sr05:45:43#");
        assert_eq!(set_target_dec(false, 9, 1, 2).unwrap(), ":Sd+09:01:02#");
        assert_eq!(
            set_target_and_goto(1, 2, 1, false, 9, 1, 2).unwrap(),
            ":SMeq01:02:01&+09*01:02#"
        );
    }

    #[test]
    fn motion_formatting() {
        assert_eq!(set_move_rate(1440.0).unwrap(), ":Rv1440.00#");
        assert_eq!(set_move_rate(0.25).unwrap(), ":Rv0.25#");
        assert_eq!(guide('e', 5).unwrap(), ":Mge0005#");
        assert_eq!(guide('n', 3000).unwrap(), ":Mgn3000#");
        assert_eq!(set_guide_rate(0.1).unwrap(), ":Rg0.10#");
        assert_eq!(set_guide_rate(0.9).unwrap(), ":Rg0.90#");
    }

    #[test]
    fn out_of_range_fields_never_reach_the_port() {
        let cases = [
            set_date(13, 1, 24),
            set_date(0, 1, 24),
            set_time(24, 0, 0),
            set_timezone(false, 25, 0),
            set_timezone(false, 5, 29),
            set_latitude(false, 91, 0, 0),
            set_longitude(false, 181, 0, 0),
            set_target_ra(24, 0, 0),
            set_target_dec(false, 91, 0, 0),
            set_move_rate(1440.01),
            set_move_rate(-0.1),
            guide('z', 2000),
            guide('e', 3001),
            set_guide_rate(0.05),
            set_guide_rate(0.91),
            set_target_and_goto(24, 2, 1, false, 9, 1, 2),
        ];
        for case in cases {
            assert_eq!(case.unwrap_err().code, ASCOMErrorCode::INVALID_VALUE);
        }
    }
}
