//! Time related utils.

use crate::Error;
use chrono::format::Item;
use chrono::format::Numeric;
use chrono::format::Pad;
use chrono::NaiveDateTime;
use chrono::Utc;

/// DateTime is the alias for chrono::DateTime<Utc>.
pub type DateTime = chrono::DateTime<Utc>;

/// Create datetime of now.
pub fn now() -> DateTime {
    Utc::now()
}

/// ISO8601 is a time format like `20220313T072004Z`.
const ISO8601: &[Item<'static>] = &[
    Item::Numeric(Numeric::Year, Pad::Zero),
    Item::Numeric(Numeric::Month, Pad::Zero),
    Item::Numeric(Numeric::Day, Pad::Zero),
    Item::Literal("T"),
    Item::Numeric(Numeric::Hour, Pad::Zero),
    Item::Numeric(Numeric::Minute, Pad::Zero),
    Item::Numeric(Numeric::Second, Pad::Zero),
    Item::Literal("Z"),
];

/// Format time into ISO8601: `20220313T072004Z`
pub fn format_iso8601(t: DateTime) -> String {
    t.format_with_items(ISO8601.iter()).to_string()
}

/// Parse time from ISO8601 basic format: `20220313T072004Z`
pub fn parse_iso8601(s: &str) -> crate::Result<DateTime> {
    NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%SZ")
        .map(|t| t.and_utc())
        .map_err(|e| {
            Error::request_invalid(format!("invalid ISO8601 basic time: {s}")).with_source(e)
        })
}
