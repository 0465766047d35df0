//! Duration strings in the `10h`, `5m30s`, `1.5h`, `300ms` style.

use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Parse a compound duration string.
///
/// A duration is a sequence of decimal numbers, each with an optional
/// fraction and a mandatory unit suffix (`ns`, `us`/`µs`, `ms`, `s`, `m`,
/// `h`). The bare string `0` is accepted as zero. Negative values are
/// rejected.
pub fn parse_duration(input: &str) -> ConfigResult<Duration> {
    let invalid = |reason: String| ConfigError::InvalidDuration {
        input: input.to_string(),
        reason,
    };

    let s = input.trim();
    let s = s.strip_prefix('+').unwrap_or(s);
    if s.is_empty() {
        return Err(invalid("empty duration".to_string()));
    }
    if s.starts_with('-') {
        return Err(invalid("negative durations are not supported".to_string()));
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut rest = s;
    let mut total: u128 = 0;

    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let number = &rest[..number_end];
        rest = &rest[number_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_end];
        rest = &rest[unit_end..];

        let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
        if (whole.is_empty() && frac.is_empty()) || frac.contains('.') {
            return Err(invalid(format!("malformed number {number:?}")));
        }

        let scale = unit_nanos(unit).ok_or_else(|| {
            if unit.is_empty() {
                invalid(format!("missing unit after {number:?}"))
            } else {
                invalid(format!("unknown unit {unit:?}"))
            }
        })?;

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| invalid("number out of range".to_string()))?
        };
        let mut nanos = whole
            .checked_mul(scale)
            .ok_or_else(|| invalid("duration out of range".to_string()))?;

        if !frac.is_empty() {
            // Digits past nanosecond precision of the largest unit carry nothing.
            let digits = &frac[..frac.len().min(18)];
            let numerator: u128 = digits
                .parse()
                .map_err(|_| invalid("number out of range".to_string()))?;
            nanos += numerator * scale / 10u128.pow(digits.len() as u32);
        }

        total = total
            .checked_add(nanos)
            .ok_or_else(|| invalid("duration out of range".to_string()))?;
    }

    let secs = u64::try_from(total / NANOS_PER_SEC)
        .map_err(|_| invalid("duration out of range".to_string()))?;
    Ok(Duration::new(secs, (total % NANOS_PER_SEC) as u32))
}

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(1_000),
        "ms" => Some(1_000_000),
        "s" => Some(NANOS_PER_SEC),
        "m" => Some(60 * NANOS_PER_SEC),
        "h" => Some(3_600 * NANOS_PER_SEC),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_units() {
        assert_eq!(parse_duration("10h").unwrap(), Duration::from_secs(36_000));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("300ms").unwrap(), Duration::from_millis(300));
        assert_eq!(parse_duration("15us").unwrap(), Duration::from_micros(15));
        assert_eq!(parse_duration("15µs").unwrap(), Duration::from_micros(15));
        assert_eq!(parse_duration("7ns").unwrap(), Duration::from_nanos(7));
    }

    #[test]
    fn compound_durations() {
        assert_eq!(parse_duration("5m30s").unwrap(), Duration::from_secs(330));
        assert_eq!(
            parse_duration("2h45m10s").unwrap(),
            Duration::from_secs(2 * 3600 + 45 * 60 + 10)
        );
        assert_eq!(
            parse_duration("1s500ms").unwrap(),
            Duration::from_millis(1500)
        );
    }

    #[test]
    fn fractional_values() {
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration(".5s").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2.25m").unwrap(), Duration::from_secs(135));
    }

    #[test]
    fn zero_and_sign() {
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("+1s").unwrap(), Duration::from_secs(1));
        assert!(parse_duration("-1s").is_err());
    }

    #[test]
    fn malformed_inputs() {
        for bad in ["", "10", "h", "1x", "1.2.3s", ".s", "5m30", "abc"] {
            assert!(
                matches!(parse_duration(bad), Err(ConfigError::InvalidDuration { .. })),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[test]
    fn overflow_rejected() {
        assert!(parse_duration("99999999999999999999999999999999999999999h").is_err());
    }
}
