//! Utility functions and types.

use std::fmt::Debug;

/// Redacts secret material for `Debug` output.
///
/// - `None` is rendered as `NONE` and an empty string as `EMPTY`.
/// - Values shorter than 12 characters are fully masked as `***`.
/// - Longer values keep their first and last three characters, so different
///   access keys remain distinguishable in logs without leaking them.
pub struct Redact<'a>(Option<&'a str>);

impl<'a> From<&'a str> for Redact<'a> {
    fn from(value: &'a str) -> Self {
        Redact(Some(value))
    }
}

impl<'a> From<&'a String> for Redact<'a> {
    fn from(value: &'a String) -> Self {
        Redact(Some(value.as_str()))
    }
}

impl<'a> From<&'a Option<String>> for Redact<'a> {
    fn from(value: &'a Option<String>) -> Self {
        Redact(value.as_deref())
    }
}

impl Debug for Redact<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Some(v) = self.0 else {
            return f.write_str("NONE");
        };

        match v.len() {
            0 => f.write_str("EMPTY"),
            n if n < 12 => f.write_str("***"),
            n => match (v.get(..3), v.get(n - 3..)) {
                (Some(head), Some(tail)) => write!(f, "{head}***{tail}"),
                // Not on a char boundary, mask everything.
                _ => f.write_str("***"),
            },
        }
    }
}
