//! Carbon plaintext line codec
//!
//! The carbon protocol is one metric per line:
//!
//! ```text
//! <path> <value> <timestamp>\n
//! ```
//!
//! `path` is non-empty, `value` parses as a float, `timestamp` is integer
//! seconds since epoch. Carbon has no event representation.

use crate::{Metric, ProtocolError};

/// Parse a single carbon line into a metric.
///
/// The trailing newline (LF or CRLF) may be present or already stripped.
/// Value parsing is lenient float parsing; anything `f64::from_str` rejects
/// is a malformed line.
pub fn parse_line(line: &str) -> Result<Metric, ProtocolError> {
    let line = line.trim_end_matches(['\r', '\n']);

    let mut parts = line.split_whitespace();
    let key = parts
        .next()
        .ok_or_else(|| ProtocolError::malformed("empty line"))?;

    let value = parts
        .next()
        .ok_or_else(|| ProtocolError::malformed(format!("missing value: {line:?}")))?;
    let value: f64 = value
        .parse()
        .map_err(|_| ProtocolError::malformed(format!("bad value {value:?}")))?;

    let time = parts
        .next()
        .ok_or_else(|| ProtocolError::malformed(format!("missing timestamp: {line:?}")))?;
    let time: i64 = time
        .parse()
        .map_err(|_| ProtocolError::malformed(format!("bad timestamp {time:?}")))?;

    if parts.next().is_some() {
        return Err(ProtocolError::malformed(format!(
            "trailing fields: {line:?}"
        )));
    }

    Ok(Metric::new(key, value).with_time(time))
}

/// Render a metric as a carbon line, including the trailing newline.
///
/// A missing timestamp is stamped with the current time.
pub fn format_line(metric: &Metric) -> String {
    let time = metric.time.unwrap_or_else(crate::epoch_seconds);
    format!("{} {} {}\n", metric.key, metric.value, time)
}

#[cfg(test)]
#[path = "carbon_test.rs"]
mod carbon_test;
