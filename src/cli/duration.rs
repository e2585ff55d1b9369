//! Parsing of duration flags such as `24h`, `90m` or `1h30m`.

use anyhow::{Result, anyhow, bail};
use chrono::Duration;

const UNITS: [(&str, f64); 7] = [
    ("ns", 1.0),
    ("us", 1e3),
    ("µs", 1e3),
    ("ms", 1e6),
    ("s", 1e9),
    ("m", 60e9),
    ("h", 3600e9),
];

/// Parses a sequence of decimal numbers, each with a unit suffix, with an
/// optional leading sign. A bare `0` is accepted.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let invalid = || anyhow!("Invalid duration: {input:?}");

    let (negative, mut rest) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input.strip_prefix('+').unwrap_or(input)),
    };
    if rest == "0" {
        return Ok(Duration::zero());
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut nanos = 0.0;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| anyhow!("Missing unit in duration: {input:?}"))?;
        let (number, tail) = rest.split_at(number_end);
        if number.is_empty() || number == "." {
            return Err(invalid());
        }
        let value: f64 = number.parse().map_err(|_| invalid())?;

        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_end);
        let (_, scale) = UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .ok_or_else(|| anyhow!("Unknown unit {unit:?} in duration: {input:?}"))?;

        nanos += value * scale;
        rest = tail;
    }

    if nanos > i64::MAX as f64 {
        bail!("Duration out of range: {input:?}");
    }
    let duration = Duration::nanoseconds(nanos.round() as i64);
    Ok(if negative { -duration } else { duration })
}
