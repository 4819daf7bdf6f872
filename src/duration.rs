//! Serde helpers for durations written as `"90s"`, `"1min 30s"` or a plain
//! number of seconds.

use chrono::Duration;
use serde::Deserialize;

use crate::error::ConfigError;

pub fn duration_pretty(d: Duration) -> String {
    let hours = d.num_hours();
    let minutes = d.num_minutes() - hours * 60;
    let seconds = d.num_seconds() - d.num_minutes() * 60;
    let parts: Vec<String> = [(hours, "h"), (minutes, "min"), (seconds, "s")]
        .into_iter()
        .filter(|(n, _)| *n != 0)
        .map(|(n, unit)| format!("{n}{unit}"))
        .collect();
    if parts.is_empty() {
        "0s".to_string()
    } else {
        parts.join(" ")
    }
}

/// Parses durations like `"90s"`, `"1min 30s"` or `"1h"`. A bare number is
/// taken as seconds. Only positive durations are accepted.
pub fn duration_parse(s: &str) -> Result<Duration, ConfigError> {
    let parsed = parse_duration::parse(s.trim())
        .map_err(|err| ConfigError::DurationParseError(format!("{s:?}: {err}")))?;
    let d = Duration::from_std(parsed)
        .map_err(|_| ConfigError::DurationParseError(format!("{s:?} is too long")))?;
    ensure_positive(d, s)
}

fn ensure_positive(d: Duration, input: impl std::fmt::Debug) -> Result<Duration, ConfigError> {
    if d <= Duration::zero() {
        return Err(ConfigError::DurationParseError(format!(
            "{input:?} is not a positive duration"
        )));
    }
    Ok(d)
}

pub fn serialize<S>(arg: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&duration_pretty(*arg))
}

pub fn deserialize<'de, D>(d: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(i64),
        Text(String),
    }

    match Raw::deserialize(d)? {
        Raw::Seconds(secs) => Duration::try_seconds(secs)
            .ok_or_else(|| {
                ConfigError::DurationParseError(format!("{secs} seconds is too long"))
            })
            .and_then(|d| ensure_positive(d, secs)),
        Raw::Text(text) => duration_parse(&text),
    }
    .map_err(|err| serde::de::Error::custom(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_print() {
        assert_eq!(duration_parse("90s").unwrap(), Duration::seconds(90));
        assert_eq!(duration_parse("1min 30s").unwrap(), Duration::seconds(90));
        assert_eq!(duration_parse("2mins").unwrap(), Duration::minutes(2));
        assert_eq!(duration_parse("45").unwrap(), Duration::seconds(45));
        assert!(duration_parse("").is_err());
        assert!(duration_parse("5 parsecs").is_err());
        assert_eq!(duration_parse("1h").unwrap(), Duration::hours(1));

        assert_eq!(duration_pretty(Duration::seconds(90)), "1min 30s");
        assert_eq!(duration_pretty(Duration::seconds(60)), "1min");
        assert_eq!(duration_pretty(Duration::seconds(5)), "5s");
        assert_eq!(duration_pretty(Duration::seconds(86_400)), "24h");
        assert_eq!(duration_pretty(Duration::seconds(3_725)), "1h 2min 5s");
        assert_eq!(duration_parse("1h 2min 5s").unwrap(), Duration::seconds(3_725));
    }

    #[test]
    fn out_of_range_is_an_error() {
        assert!(matches!(
            duration_parse("9999999999999999s"),
            Err(ConfigError::DurationParseError(_))
        ));
        assert!(matches!(
            duration_parse("0s"),
            Err(ConfigError::DurationParseError(_))
        ));
    }
}
