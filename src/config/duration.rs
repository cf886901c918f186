//! # Duration Parsing
//!
//! Kubernetes-style durations used by configuration and sync options.
//! Accepts a single component (`30s`, `5m`, `2h`, `1d`, `500ms`) or several
//! concatenated ones (`1m30s`, `1h5m`).

use super::ConfigError;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

static DURATION_COMPONENT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?P<number>\d+)(?P<unit>ms|[smhd])").ok());

/// Parse a duration such as `5m`, `1m30s` or `500ms`
///
/// Case-insensitive, surrounding whitespace ignored. The total must be greater than zero.
pub fn parse_duration(duration_str: &str) -> Result<Duration, ConfigError> {
    let trimmed = duration_str.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidDuration {
            value: duration_str.to_string(),
            reason: "duration string cannot be empty".to_string(),
        });
    }

    let Some(regex) = DURATION_COMPONENT.as_ref() else {
        return Err(ConfigError::InvalidDuration {
            value: trimmed.to_string(),
            reason: "failed to compile duration pattern".to_string(),
        });
    };

    let lower = trimmed.to_lowercase();
    let invalid_format = || ConfigError::InvalidDuration {
        value: trimmed.to_string(),
        reason: "expected <number><unit>[...] with unit ms, s, m, h or d (e.g. '30s', '5m', '1m30s')"
            .to_string(),
    };

    let mut total = Duration::ZERO;
    let mut consumed = 0;
    for captures in regex.captures_iter(&lower) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        // components must be contiguous and cover the whole string
        if whole.start() != consumed {
            return Err(invalid_format());
        }
        consumed = whole.end();

        let number: u64 = captures["number"].parse().map_err(|e| ConfigError::InvalidDuration {
            value: trimmed.to_string(),
            reason: format!("invalid number '{}': {e}", &captures["number"]),
        })?;
        let component = match &captures["unit"] {
            "ms" => Duration::from_millis(number),
            "s" => Duration::from_secs(number),
            "m" => Duration::from_secs(number.saturating_mul(60)),
            "h" => Duration::from_secs(number.saturating_mul(3600)),
            "d" => Duration::from_secs(number.saturating_mul(86400)),
            _ => return Err(invalid_format()),
        };
        total = total.saturating_add(component);
    }

    if consumed == 0 || consumed != lower.len() {
        return Err(invalid_format());
    }
    if total.is_zero() {
        return Err(ConfigError::InvalidDuration {
            value: trimmed.to_string(),
            reason: "duration must be greater than 0".to_string(),
        });
    }

    Ok(total)
}

/// Render a duration as `1h2m3s`, `5m0s` or `30s`
///
/// Sub-second durations render as milliseconds.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        return format!("{}ms", duration.as_millis());
    }
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_component() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86400));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn test_parse_combined_and_case_insensitive() {
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration(" 1H5M ").unwrap(), Duration::from_secs(3900));
    }

    #[test]
    fn test_parse_rejects_invalid() {
        for value in ["", "soon", "5", "m5", "5x", "1m 30s", "0s", "-5m"] {
            assert!(parse_duration(value).is_err(), "'{value}' should be rejected");
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(300)), "5m0s");
        assert_eq!(format_duration(Duration::from_secs(10)), "10s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h1m1s");
        assert_eq!(format_duration(Duration::from_millis(20)), "20ms");
    }
}
