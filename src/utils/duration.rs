// src/utils/duration.rs
//! Durations written as `<integer><unit>` with unit one of `s`, `m`, `h`,
//! `d` or `y` (365 days), e.g. `87600h` or `15d`.

use chrono::Duration;
use serde::{Deserialize, Deserializer, Serializer};

pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{}' has no unit", input))?;
    let (digits, unit) = input.split_at(split);

    let amount: i64 = digits
        .parse()
        .map_err(|_| format!("duration '{}' has no amount", input))?;

    let seconds_per_unit = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        "y" => 365 * 86_400,
        other => return Err(format!("unknown duration unit '{}' in '{}'", other, input)),
    };

    amount
        .checked_mul(seconds_per_unit)
        .and_then(Duration::try_seconds)
        .ok_or_else(|| format!("duration '{}' is out of range", input))
}

/// Largest exact unit, so `87600h` round-trips as `3650d`.
pub fn format_duration(duration: &Duration) -> String {
    let seconds = duration.num_seconds();
    for (unit, size) in [("d", 86_400), ("h", 3_600), ("m", 60)] {
        if seconds != 0 && seconds % size == 0 {
            return format!("{}{}", seconds / size, unit);
        }
    }
    format!("{}s", seconds)
}

pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_duration(duration))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_units() {
        assert_eq!(parse_duration("4380h").unwrap(), Duration::hours(4380));
        assert_eq!(parse_duration("15d").unwrap(), Duration::days(15));
        assert_eq!(parse_duration("1m").unwrap(), Duration::minutes(1));
        assert_eq!(parse_duration("10y").unwrap(), Duration::days(3650));
        assert_eq!(parse_duration(" 30s ").unwrap(), Duration::seconds(30));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_duration("15").is_err());
        assert!(parse_duration("h").is_err());
        assert!(parse_duration("3w").is_err());
        assert!(parse_duration("-3h").is_err());
    }

    #[test]
    fn formats_largest_exact_unit() {
        assert_eq!(format_duration(&Duration::hours(87600)), "3650d");
        assert_eq!(format_duration(&Duration::hours(5)), "5h");
        assert_eq!(format_duration(&Duration::seconds(90)), "90s");
        assert_eq!(format_duration(&Duration::zero()), "0s");
    }
}
