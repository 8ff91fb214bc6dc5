//! `text/parameters` and `Transport` header parsers.

use std::collections::HashMap;

/// Parse a CR/LF separated `key: value` body.
pub fn parse_text_parameters(body: &str) -> Vec<(String, String)> {
    body.split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Parse a `Transport` header's semicolon-delimited `key=value` parameters.
/// Bare flags like `unicast` that carry no `=value` are dropped, not erred
/// on — SETUP only looks at the ports.
pub fn parse_transport(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|part| {
            let part = part.trim();
            part.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}
