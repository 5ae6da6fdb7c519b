//! `xs:duration` and `xs:dateTime` helpers
//!
//! Durations are limited to the day/time subset (`PnDTnHnMnS`). Year and
//! month components have no fixed length and are rejected.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{Result, SoapError};

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Format a duration as `xs:duration`, e.g. `PT60S`, `PT0.5S`, `P1DT2H`.
/// Sub-second parts are written to the nanosecond.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let days = total / 86_400;
    let hours = total % 86_400 / 3_600;
    let minutes = total % 3_600 / 60;
    let secs = total % 60;
    let nanos = duration.subsec_nanos();

    let mut out = String::from("P");
    if days > 0 {
        out.push_str(&format!("{}D", days));
    }
    if hours == 0 && minutes == 0 && secs == 0 && nanos == 0 {
        if days == 0 {
            out.push_str("T0S");
        }
        return out;
    }
    out.push('T');
    if hours > 0 {
        out.push_str(&format!("{}H", hours));
    }
    if minutes > 0 {
        out.push_str(&format!("{}M", minutes));
    }
    if nanos > 0 {
        let frac = format!("{:09}", nanos);
        out.push_str(&format!("{}.{}S", secs, frac.trim_end_matches('0')));
    } else if secs > 0 {
        out.push_str(&format!("{}S", secs));
    }
    out
}

/// Parse an `xs:duration` of the form `PnDTnHnMnS`. Fractions finer than a
/// nanosecond are truncated; values beyond `Duration::MAX` are rejected.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let invalid = || SoapError::Parse(format!("invalid xs:duration '{}'", raw));
    let s = raw.trim();
    let s = s.strip_prefix('P').ok_or_else(invalid)?;
    if s.is_empty() {
        return Err(invalid());
    }

    let (date_part, time_part) = match s.split_once('T') {
        Some((d, t)) if !t.is_empty() => (d, Some(t)),
        Some(_) => return Err(invalid()),
        None => (s, None),
    };

    let mut total: u128 = 0;
    let mut add = |nanos: u128, unit_secs: u128| -> Option<()> {
        total = total.checked_add(nanos.checked_mul(unit_secs)?)?;
        Some(())
    };
    for (nanos, unit) in components(date_part).ok_or_else(invalid)? {
        let unit_secs = match unit {
            'D' => 86_400,
            'W' => 7 * 86_400,
            _ => return Err(invalid()),
        };
        add(nanos, unit_secs).ok_or_else(invalid)?;
    }
    if let Some(time_part) = time_part {
        for (nanos, unit) in components(time_part).ok_or_else(invalid)? {
            let unit_secs = match unit {
                'H' => 3_600,
                'M' => 60,
                'S' => 1,
                _ => return Err(invalid()),
            };
            add(nanos, unit_secs).ok_or_else(invalid)?;
        }
    }

    let secs = u64::try_from(total / NANOS_PER_SEC).map_err(|_| invalid())?;
    Ok(Duration::new(secs, (total % NANOS_PER_SEC) as u32))
}

/// `(value in nanoseconds, unit)` pairs of one duration part
fn components(part: &str) -> Option<Vec<(u128, char)>> {
    let mut out = Vec::new();
    let mut number = String::new();
    for c in part.chars() {
        if c.is_ascii_digit() || c == '.' {
            number.push(c);
        } else {
            out.push((decimal_nanos(&number)?, c));
            number.clear();
        }
    }
    if number.is_empty() {
        Some(out)
    } else {
        None
    }
}

fn decimal_nanos(number: &str) -> Option<u128> {
    let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let digits = &frac[..frac.len().min(9)];
    let frac_nanos: u128 = if digits.is_empty() {
        0
    } else {
        digits.parse::<u128>().ok()? * 10u128.pow(9 - digits.len() as u32)
    };
    whole.checked_mul(NANOS_PER_SEC)?.checked_add(frac_nanos)
}

/// Format an `xs:dateTime` in UTC with a `Z` suffix.
pub fn format_datetime(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn parse_datetime(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SoapError::Parse(format!("invalid xs:dateTime '{}': {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case("PT60S", 60_000)]
    #[case("PT1M30S", 90_000)]
    #[case("P1DT2H", 93_600_000)]
    #[case("PT0.5S", 500)]
    #[case("PT1.25S", 1_250)]
    #[case("P1W", 604_800_000)]
    #[case("PT0S", 0)]
    fn test_parse_duration(#[case] raw: &str, #[case] millis: u64) {
        assert_eq!(parse_duration(raw).unwrap(), Duration::from_millis(millis));
    }

    #[rstest]
    #[case("")]
    #[case("P")]
    #[case("PT")]
    #[case("60S")]
    #[case("PT5X")]
    #[case("P1Y")]
    #[case("-PT5S")]
    #[case("PTS")]
    #[case("PT1.S.5")]
    #[case("P999999999999999999999D")]
    #[case("PT99999999999999999999999999999999999999999S")]
    fn test_parse_duration_rejects(#[case] raw: &str) {
        assert!(parse_duration(raw).is_err());
    }

    #[rstest]
    #[case(Duration::from_secs(60), "PT1M")]
    #[case(Duration::from_secs(10), "PT10S")]
    #[case(Duration::from_millis(1500), "PT1.5S")]
    #[case(Duration::from_secs(93_600), "P1DT2H")]
    #[case(Duration::from_secs(86_400), "P1D")]
    #[case(Duration::ZERO, "PT0S")]
    #[case(Duration::from_micros(1_500_250), "PT1.50025S")]
    #[case(Duration::new(0, 1), "PT0.000000001S")]
    fn test_format_duration(#[case] duration: Duration, #[case] expected: &str) {
        assert_eq!(format_duration(duration), expected);
        assert_eq!(parse_duration(expected).unwrap(), duration);
    }

    #[test]
    fn test_parse_duration_keeps_nanoseconds() {
        assert_eq!(parse_duration("PT0.0000000019S").unwrap(), Duration::new(0, 1));
        assert_eq!(parse_duration("PT.5S").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("P1DT0.5S").unwrap(), Duration::new(86_400, 500_000_000));
    }

    proptest! {
        #[test]
        fn prop_duration_round_trip(secs in 0u64..=u64::MAX, nanos in 0u32..1_000_000_000) {
            let duration = Duration::new(secs, nanos);
            prop_assert_eq!(parse_duration(&format_duration(duration)).unwrap(), duration);
        }
    }

    #[test]
    fn test_datetime() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        assert_eq!(format_datetime(at), "2024-03-01T12:30:05Z");
        assert_eq!(parse_datetime("2024-03-01T12:30:05Z").unwrap(), at);
        assert_eq!(parse_datetime("2024-03-01T14:30:05+02:00").unwrap(), at);
        assert!(parse_datetime("yesterday").is_err());
    }
}
