use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// Deserialize a duration string like "500ms", "30s" or "1h30m" into Duration
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;

    parse(&s).map_err(serde::de::Error::custom)
}

/// Parses a sequence of `<number><unit>` terms, with units `ms`, `s`, `m`,
/// `h` and `d`. Numbers may be fractional.
pub fn parse(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }

    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let is_number = |c: char| c.is_ascii_digit() || c == '.';

    let mut total = Duration::ZERO;
    let mut rest = s;

    while !rest.is_empty() {
        let unit_start = rest
            .find(|c: char| !is_number(c))
            .ok_or_else(|| format!("missing unit in {s:?}"))?;
        let (number, tail) = rest.split_at(unit_start);

        let value: f64 = number
            .parse()
            .map_err(|_| format!("invalid number in {s:?}"))?;

        let unit_end = tail.find(is_number).unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_end);

        let scale = match unit {
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            "d" => 86400.0,
            _ => return Err(format!("unknown unit {unit:?} in {s:?}")),
        };

        let term = Duration::try_from_secs_f64(value * scale).map_err(|e| e.to_string())?;
        total = total
            .checked_add(term)
            .ok_or_else(|| format!("duration {s:?} overflows"))?;
        rest = next;
    }

    Ok(total)
}
