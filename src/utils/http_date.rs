//! Parsing and formatting of HTTP date headers.
//!
//! Origin servers are expected to emit RFC 1123 dates, but `Expires` headers
//! in the wild also show up in RFC 850 and ANSI C asctime form, so parsing
//! tries all of them in the order the validator requires. Dates without an
//! explicit offset are interpreted as UTC.

use chrono::{DateTime, NaiveDateTime, Utc};

/// The format used when *emitting* dates (`Last-Modified`, `Expires`,
/// `Warning`), per RFC 7231 section 7.1.1.1.
const RFC1123: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// e.g. "Monday, 02-Jan-06 15:04:05 GMT"
const RFC850: &str = "%A, %d-%b-%y %H:%M:%S GMT";

/// e.g. "Mon Jan  2 15:04:05 2006"
const ANSIC: &str = "%a %b %e %H:%M:%S %Y";

/// e.g. "Mon, 02 Jan 2006 15:04:05 -0700"
const RFC1123Z: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Formats a timestamp as an RFC 1123 date, the only format the proxy emits.
pub fn format_rfc1123(date: DateTime<Utc>) -> String {
    date.format(RFC1123).to_string()
}

/// Parses an RFC 1123 date ("Sun, 06 Nov 1994 08:49:37 GMT").
pub fn parse_rfc1123(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), RFC1123)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Parses an `Expires`-style date, trying RFC 1123, RFC 850, ANSI C asctime
/// and RFC 1123 with a numeric zone, in that order.
pub fn parse_expires(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Some(date) = parse_rfc1123(value) {
        return Some(date);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, RFC850) {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, ANSIC) {
        return Some(naive.and_utc());
    }
    if let Ok(date) = DateTime::parse_from_str(value, RFC1123Z) {
        return Some(date.with_timezone(&Utc));
    }
    None
}
