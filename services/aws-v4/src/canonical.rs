//! Canonical request building blocks.
//!
//! - [Create a canonical request](https://docs.aws.amazon.com/IAM/latest/UserGuide/create-signed-request.html#create-canonical-request)

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use awssig_core::{Error, Result};
use http::{HeaderMap, Method, Uri};
use percent_encoding::utf8_percent_encode;

use crate::constants::AWS_URI_ENCODE_SET;

/// Escape a string with the AWS UriEncode rules.
///
/// Every byte except `A-Z a-z 0-9 - . _ ~` is percent-encoded, space
/// becomes `%20`.
pub fn uri_escape(s: &str) -> String {
    utf8_percent_encode(s, &AWS_URI_ENCODE_SET).to_string()
}

/// Escape every `/`-delimited segment of a path on its own, keeping slashes.
pub fn uri_escape_path(path: &str) -> String {
    path.split('/').map(uri_escape).collect::<Vec<_>>().join("/")
}

/// Remove `.` and `..` segments following RFC 3986 section 5.2.4.
///
/// A trailing slash is kept, and `..` never climbs above the root.
pub fn normalize_path(path: &str) -> Cow<'_, str> {
    let Some(rest) = path.strip_prefix('/') else {
        return Cow::Borrowed(path);
    };
    if !rest.split('/').any(|s| s == "." || s == "..") {
        return Cow::Borrowed(path);
    }

    let segments: Vec<&str> = rest.split('/').collect();
    let mut out: Vec<&str> = Vec::with_capacity(segments.len());
    for (idx, seg) in segments.iter().enumerate() {
        let last = idx + 1 == segments.len();
        match *seg {
            "." => {}
            ".." => {
                out.pop();
            }
            s => out.push(s),
        }
        if last && (*seg == "." || *seg == "..") {
            out.push("");
        }
    }

    Cow::Owned(format!("/{}", out.join("/")))
}

/// Canonical path of `uri`, `/` if empty.
pub fn canonical_path(uri: &Uri, normalize: bool, escape: bool) -> String {
    let path = match uri.path() {
        "" => "/",
        p => p,
    };
    let path = if normalize {
        normalize_path(path)
    } else {
        Cow::Borrowed(path)
    };

    if escape {
        uri_escape_path(&path)
    } else {
        path.into_owned()
    }
}

/// Canonical query string.
///
/// Parameters are taken as they appear in the url: split on `&`, `=` is
/// appended to those without one. They are sorted by name, then value, then
/// original position, so duplicated pairs keep a deterministic order.
pub fn canonical_query_string(query: &str) -> String {
    let mut params: Vec<&str> = query.split('&').collect();
    // A trailing `&` doesn't introduce an empty parameter.
    while params.last().is_some_and(|p| p.is_empty()) {
        params.pop();
    }

    let mut params: Vec<(usize, Cow<'_, str>)> = params
        .into_iter()
        .map(|p| {
            if p.contains('=') {
                Cow::Borrowed(p)
            } else {
                Cow::Owned(format!("{p}="))
            }
        })
        .enumerate()
        .collect();

    params.sort_by(|(a_idx, a), (b_idx, b)| {
        let (a_name, a_value) = split_param(a);
        let (b_name, b_value) = split_param(b);
        match a_name.cmp(b_name) {
            Ordering::Equal => a_value.cmp(&b_value).then(a_idx.cmp(b_idx)),
            ord => ord,
        }
    });

    params
        .iter()
        .map(|(_, p)| p.as_ref())
        .collect::<Vec<_>>()
        .join("&")
}

/// Split a parameter into name and value.
///
/// The value stops at the next `=` and is `None` when empty.
fn split_param(p: &str) -> (&str, Option<&str>) {
    let mut parts = p.split('=');
    let name = parts.next().unwrap_or_default();
    let value = parts.next().filter(|v| !v.is_empty());
    (name, value)
}

/// Collapse whitespace runs into one space and trim both ends.
pub fn canonical_header_value(value: &str) -> String {
    value
        .split(|c: char| c.is_ascii_whitespace() || c == '\x0b')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collect request headers into a map keyed by lowercase name.
///
/// Repeated headers are joined with `,`. Values must be valid utf-8.
pub fn collect_headers(headers: Option<&HeaderMap>) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    let Some(headers) = headers else {
        return Ok(out);
    };

    for name in headers.keys() {
        let mut values = Vec::new();
        for value in headers.get_all(name) {
            let value = std::str::from_utf8(value.as_bytes()).map_err(|e| {
                Error::request_invalid(format!("header {name} is not valid utf-8"))
                    .with_source(e)
            })?;
            values.push(value);
        }
        out.insert(name.as_str().to_string(), values.join(","));
    }

    Ok(out)
}

/// Canonical headers: `name:value` per line for every signed header,
/// sorted by name, without trailing newline.
pub fn canonical_headers(
    headers: &BTreeMap<String, String>,
    unsigned_headers: &BTreeSet<String>,
) -> String {
    headers
        .iter()
        .filter(|(k, _)| !unsigned_headers.contains(k.as_str()))
        .map(|(k, v)| format!("{k}:{}", canonical_header_value(v)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Sorted, `;`-joined names of every signed header.
pub fn signed_headers(
    headers: &BTreeMap<String, String>,
    unsigned_headers: &BTreeSet<String>,
) -> String {
    headers
        .keys()
        .filter(|k| !unsigned_headers.contains(k.as_str()))
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(";")
}

/// Upper-cased method name.
pub fn canonical_method(method: &Method) -> String {
    method.as_str().to_ascii_uppercase()
}

/// Host header value for `uri`, with the port only if it isn't the scheme's default.
pub fn host(uri: &Uri) -> String {
    let host = uri.host().unwrap_or_default();
    let default_port = match uri.scheme_str() {
        Some("http") => Some(80),
        Some("https") => Some(443),
        _ => None,
    };

    match uri.port_u16() {
        Some(port) if Some(port) != default_port => format!("{host}:{port}"),
        _ => host.to_string(),
    }
}
