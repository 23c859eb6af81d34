//! Duration text as understood by the headscale CLI (`100ms`, `30s`, `5m`, `24h`)

use std::time::Duration;

/// Parse a non-negative integer with an optional unit; a bare number is seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    if digits.is_empty() {
        return Err(format!("duration {:?} does not start with a number", s));
    }

    let value: u64 = digits
        .parse()
        .map_err(|e| format!("duration {:?}: {}", s, e))?;
    let unit_millis = match unit {
        "ms" => 1,
        "" | "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        other => return Err(format!("duration {:?} has unknown unit {:?}", s, other)),
    };

    value
        .checked_mul(unit_millis)
        .map(Duration::from_millis)
        .ok_or_else(|| format!("duration {:?} overflows", s))
}

/// Format duration using the largest unit that divides it evenly.
///
/// Hours are the largest unit since the CLI does not accept days.
pub fn format_duration(duration: &Duration) -> String {
    let millis = duration.as_millis() as u64;

    if millis == 0 {
        return "0s".to_string();
    }

    if millis.is_multiple_of(60 * 60 * 1000) {
        format!("{}h", millis / (60 * 60 * 1000))
    } else if millis.is_multiple_of(60 * 1000) {
        format!("{}m", millis / (60 * 1000))
    } else if millis.is_multiple_of(1000) {
        format!("{}s", millis / 1000)
    } else {
        format!("{}ms", millis)
    }
}

/// Seconds with millisecond precision, as accepted by `sleep(1)`.
pub fn format_sleep_seconds(duration: &Duration) -> String {
    if duration.subsec_millis() == 0 {
        duration.as_secs().to_string()
    } else {
        format!("{}.{:03}", duration.as_secs(), duration.subsec_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_duration("100ms").unwrap(), Duration::from_millis(100));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("24h").unwrap(), Duration::from_secs(86_400));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("  ").is_err());
        assert!(parse_duration("-5s").is_err());
        assert!(parse_duration("5 s").is_err());
        assert!(parse_duration("h").is_err());
        assert!(parse_duration("1d").is_err());
        assert!(parse_duration("99999999999999999h").is_err());
    }

    #[test]
    fn test_format_prefers_largest_unit() {
        assert_eq!(format_duration(&Duration::from_secs(86_400)), "24h");
        assert_eq!(format_duration(&Duration::from_secs(90)), "90s");
        assert_eq!(format_duration(&Duration::from_secs(120)), "2m");
        assert_eq!(format_duration(&Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_duration(&Duration::ZERO), "0s");
    }

    #[test]
    fn test_sleep_seconds() {
        assert_eq!(format_sleep_seconds(&Duration::from_secs(3)), "3");
        assert_eq!(format_sleep_seconds(&Duration::from_millis(2500)), "2.500");
        assert_eq!(format_sleep_seconds(&Duration::from_millis(50)), "0.050");
    }
}
