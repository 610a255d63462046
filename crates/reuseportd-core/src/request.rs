//! Request grammar: `uid host_port [family [sock_type [proto [flags [limit]]]]]`.

use rand::seq::SliceRandom;
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("request is missing the host_port field")]
    MissingHostPort,
    #[error("field {field} is not a valid integer: {value:?}")]
    BadInteger { field: &'static str, value: String },
}

/// A request after field splitting, host/port extraction, and defaulting —
/// everything `getaddrinfo` needs, plus the output-shaping `limit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub uid: String,
    /// `None` means the resolver's wildcard (unspecified address).
    pub host: Option<String>,
    /// `None` means the resolver's wildcard (unspecified service/port).
    pub port: Option<String>,
    pub family: i32,
    pub sock_type: i32,
    pub proto: i32,
    pub flags: i32,
    pub limit: Option<i64>,
}

impl fmt::Display for ParsedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "uid={:?} host={:?} port={:?} family={} type={} proto={} flags={:#x} limit={:?}",
            self.uid, self.host, self.port, self.family, self.sock_type, self.proto, self.flags, self.limit
        )
    }
}

/// Parse a single request line. Fields are split on a literal single space
/// so that two consecutive spaces produce an empty field rather than being
/// collapsed, matching the wire grammar.
pub fn parse_request(line: &str, always_set_flags: i32) -> Result<ParsedRequest, RequestError> {
    let fields: Vec<&str> = line.split(' ').collect();

    let uid = fields.first().copied().unwrap_or("").to_string();
    let host_port = fields.get(1).copied().ok_or(RequestError::MissingHostPort)?;
    let (host, port) = extract_host_port(host_port);

    let family = parse_int_field("family", fields.get(2).copied())?;
    let sock_type = parse_int_field("sock_type", fields.get(3).copied())?;
    let proto = parse_int_field("proto", fields.get(4).copied())?;
    let flags = parse_int_field("flags", fields.get(5).copied())?;
    let limit = match fields.get(6).copied() {
        None | Some("") => None,
        Some(v) => Some(v.parse::<i64>().map_err(|_| RequestError::BadInteger {
            field: "limit",
            value: v.to_string(),
        })?),
    };

    Ok(ParsedRequest {
        uid,
        host: normalize_wildcard(host),
        port: normalize_wildcard(port),
        family,
        sock_type,
        proto,
        flags: flags | always_set_flags,
        limit,
    })
}

fn parse_int_field(name: &'static str, raw: Option<&str>) -> Result<i32, RequestError> {
    match raw {
        None | Some("") => Ok(0),
        Some(v) => v.parse::<i32>().map_err(|_| RequestError::BadInteger {
            field: name,
            value: v.to_string(),
        }),
    }
}

fn normalize_wildcard(value: Option<String>) -> Option<String> {
    match value {
        None => None,
        Some(v) if v.is_empty() || v == "*" => None,
        Some(v) => Some(v),
    }
}

/// Split a `host_port` token into `(host, port)` per the bracket/colon rules:
///
/// - `[H]`    -> host H, no port
/// - `[H]:P`  -> host H, port P
/// - `H:P`    -> host H (split on the *last* colon), port P
/// - `H`      -> host H, no port
fn extract_host_port(token: &str) -> (Option<String>, Option<String>) {
    if let Some(rest) = token.strip_prefix('[') {
        if let Some(close) = rest.find(']') {
            let host = rest[..close].to_string();
            let after = &rest[close + 1..];
            return match after.strip_prefix(':') {
                Some(p) if !p.is_empty() => (Some(host), Some(p.to_string())),
                _ => (Some(host), None),
            };
        }
    }
    match token.rfind(':') {
        Some(idx) => {
            let host = &token[..idx];
            let port = &token[idx + 1..];
            (Some(host.to_string()), Some(port.to_string()))
        }
        None => (Some(token.to_string()), None),
    }
}

/// Apply the `limit` semantics: `None` keeps everything, `0` keeps nothing,
/// positive keeps the first `n` in resolver order, negative shuffles and
/// truncates to `-n`.
pub fn apply_limit<T>(mut items: Vec<T>, limit: Option<i64>) -> Vec<T> {
    match limit {
        None => items,
        Some(0) => Vec::new(),
        Some(n) if n > 0 => {
            items.truncate(n as usize);
            items
        }
        Some(n) => {
            items.shuffle(&mut rand::rng());
            items.truncate((-n) as usize);
            items
        }
    }
}
