//! Output formatting of amounts and dates.

use anyhow::{Result, anyhow};
use chrono::{NaiveDate, NaiveTime};
use std::fmt::{self, Display, Write};
use std::str::FromStr;

/// A printf-style numeric format: `%.2f`, `%0.2f`, `%10.4f`, `%08.2f`, `%f`,
/// or `%g` / `%v` for the shortest exact representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NumberFormat {
    Fixed {
        precision: usize,
        width: usize,
        zero_pad: bool,
    },
    Shortest,
}

impl NumberFormat {
    pub fn format(&self, value: f64) -> String {
        match *self {
            NumberFormat::Fixed {
                precision,
                width,
                zero_pad: true,
            } => format!("{value:0width$.precision$}"),
            NumberFormat::Fixed {
                precision, width, ..
            } => format!("{value:>width$.precision$}"),
            NumberFormat::Shortest => format!("{value}"),
        }
    }
}

impl Default for NumberFormat {
    fn default() -> Self {
        NumberFormat::Fixed {
            precision: 2,
            width: 0,
            zero_pad: false,
        }
    }
}

impl FromStr for NumberFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || anyhow!("Invalid number format: {s:?}");
        let spec = s.strip_prefix('%').ok_or_else(invalid)?;
        let verb = spec.chars().last().ok_or_else(invalid)?;
        let body = &spec[..spec.len() - verb.len_utf8()];

        match verb {
            'g' | 'v' if body.is_empty() => return Ok(NumberFormat::Shortest),
            'f' => {}
            _ => return Err(invalid()),
        }

        let (zero_pad, body) = match body.strip_prefix('0') {
            Some(rest) => (true, rest),
            None => (false, body),
        };
        let (width, precision) = match body.split_once('.') {
            Some((width, precision)) => (width, Some(precision)),
            None => (body, None),
        };

        let parse = |digits: &str, default: usize| -> Result<usize> {
            if digits.is_empty() {
                return Ok(default);
            }
            digits.parse().map_err(|_| invalid())
        };
        Ok(NumberFormat::Fixed {
            precision: match precision {
                Some(p) => parse(p, 0)?,
                None => 6,
            },
            width: parse(width, 0)?,
            zero_pad,
        })
    }
}

impl Display for NumberFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NumberFormat::Fixed {
                precision,
                width,
                zero_pad,
            } => {
                let pad = if *zero_pad { "0" } else { "" };
                let width = if *width > 0 {
                    width.to_string()
                } else {
                    String::new()
                };
                write!(f, "%{pad}{width}.{precision}f")
            }
            NumberFormat::Shortest => write!(f, "%g"),
        }
    }
}

/// Renders `date` at midnight, so time specifiers print as zero.
pub fn format_date(date: NaiveDate, format: &str) -> Result<String, fmt::Error> {
    let mut rendered = String::new();
    write!(rendered, "{}", date.and_time(NaiveTime::MIN).format(format))?;
    Ok(rendered)
}

/// Rejects strftime strings chrono cannot render for a date, such as unknown
/// specifiers or time zone fields.
pub fn validate_date_format(format: &str) -> Result<()> {
    let sample = NaiveDate::from_ymd_opt(2024, 3, 5)
        .ok_or_else(|| anyhow!("Invalid sample date"))?;
    format_date(sample, format).map_err(|_| anyhow!("Invalid date format: {format:?}"))?;
    Ok(())
}

pub fn join_category(path: &[String], delimiter: &str) -> String {
    path.join(delimiter)
}
