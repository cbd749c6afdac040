//! Parsing for duration values used in config and on the command line
//! (e.g. "250ms", "30s", "5m").

use std::time::Duration;

use crate::{MatrixError, MatrixResult};

pub fn parse_duration(input: &str) -> MatrixResult<Duration> {
    let s = input.trim();
    if s.is_empty() {
        return Err(MatrixError::InvalidArgument("empty duration".to_string()));
    }

    let (num_part, unit_part) = split_num_unit(s)?;
    let value: u64 = num_part.parse().map_err(|_| {
        MatrixError::InvalidArgument(format!(
            "invalid duration number: {num_part} (from {input:?})"
        ))
    })?;

    let dur = match unit_part {
        "ms" => Duration::from_millis(value),
        "s" => Duration::from_secs(value),
        "m" => Duration::from_secs(value.saturating_mul(60)),
        _ => {
            return Err(MatrixError::InvalidArgument(format!(
                "invalid duration unit {unit_part:?} (expected ms|s|m)"
            )));
        }
    };

    if dur.is_zero() {
        return Err(MatrixError::InvalidArgument(format!(
            "duration {input:?} must be greater than zero"
        )));
    }

    Ok(dur)
}

fn split_num_unit(s: &str) -> MatrixResult<(&str, &str)> {
    let idx = s
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(s.len());

    if idx == 0 {
        return Err(MatrixError::InvalidArgument(format!(
            "invalid duration {s:?} (missing number)"
        )));
    }

    if idx >= s.len() {
        return Err(MatrixError::InvalidArgument(format!(
            "invalid duration {s:?} (missing unit; expected ms|s|m)"
        )));
    }

    Ok((&s[..idx], &s[idx..]))
}
