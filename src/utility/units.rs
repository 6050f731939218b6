//! Minimal unit parsing for configuration values: simulated time and bandwidth.
//!
//! Condensed from a much larger general-purpose unit framework down to the
//! two kinds this crate actually consumes from configuration files.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{de::Error as _, Deserialize, Deserializer};
use std::fmt;

use crate::core::simulation_time::SimulationTime;

static UNIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([0-9]+(?:\.[0-9]+)?)\s*([a-zA-Z]*)\s*$").unwrap());

fn split_value_unit(s: &str) -> anyhow::Result<(f64, String)> {
    let caps = UNIT_RE
        .captures(s)
        .ok_or_else(|| anyhow::anyhow!("'{s}' is not a valid quantity"))?;
    let value: f64 = caps[1].parse()?;
    Ok((value, caps[2].to_ascii_lowercase()))
}

/// Parse a time string like `"10 ms"`, `"1s"`, `"500ns"` into a [`SimulationTime`].
pub fn parse_time(s: &str) -> anyhow::Result<SimulationTime> {
    let (value, unit) = split_value_unit(s)?;
    let nanos = match unit.as_str() {
        "ns" => value,
        "us" | "\u{b5}s" => value * 1_000.0,
        "ms" => value * 1_000_000.0,
        "s" | "" => value * 1_000_000_000.0,
        other => anyhow::bail!("unrecognized time unit '{other}' in '{s}'"),
    };
    if nanos < 0.0 {
        anyhow::bail!("time value '{s}' must not be negative");
    }
    Ok(SimulationTime::from_nanos(nanos as u64))
}

/// Bits per second, as parsed from config (e.g. `"10 Mbit"`, `"1 Gbit"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BitsPerSec(pub u64);

impl BitsPerSec {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BitsPerSec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bit/s", self.0)
    }
}

pub fn parse_bits_per_sec(s: &str) -> anyhow::Result<BitsPerSec> {
    let (value, unit) = split_value_unit(s)?;
    let bits = match unit.as_str() {
        "bit" | "" => value,
        "kbit" => value * 1_000.0,
        "mbit" => value * 1_000_000.0,
        "gbit" => value * 1_000_000_000.0,
        other => anyhow::bail!("unrecognized bandwidth unit '{other}' in '{s}'"),
    };
    if bits < 0.0 {
        anyhow::bail!("bandwidth value '{s}' must not be negative");
    }
    Ok(BitsPerSec(bits as u64))
}

impl<'de> Deserialize<'de> for BitsPerSec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_bits_per_sec(&s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_milliseconds() {
        assert_eq!(parse_time("10 ms").unwrap(), SimulationTime::from_millis(10));
    }

    #[test]
    fn parses_bare_seconds() {
        assert_eq!(parse_time("2s").unwrap(), SimulationTime::from_secs(2));
    }

    #[test]
    fn parses_gigabit() {
        assert_eq!(parse_bits_per_sec("1 Gbit").unwrap(), BitsPerSec(1_000_000_000));
    }

    #[test]
    fn rejects_unknown_unit() {
        assert!(parse_time("10 parsecs").is_err());
    }
}
