//! Namespace handling shared by the raw and structured capture paths.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Extract the namespace from a request target.
///
/// The namespace is everything after `prefix` up to the start of the query
/// string. Targets outside the prefix, or with an empty namespace, are not
/// captures.
pub fn extract<'a>(target: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = target.strip_prefix(prefix)?;
    let namespace = match rest.find('?') {
        Some(idx) => &rest[..idx],
        None => rest,
    };
    if namespace.is_empty() {
        None
    } else {
        Some(namespace)
    }
}

/// Pull the request target out of the first chunk of a connection.
///
/// Only the first line is looked at. It is split on spaces and the second
/// token is returned; anything with fewer than two tokens is not a request
/// line we care about.
pub fn request_target(chunk: &[u8]) -> Option<&str> {
    let line_end = chunk.iter().position(|&b| b == b'\n').unwrap_or(chunk.len());
    let line = &chunk[..line_end];
    let line = line.strip_suffix(b"\r").unwrap_or(line);

    let mut tokens = line.split(|&b| b == b' ');
    let _method = tokens.next()?;
    let target = tokens.next()?;
    std::str::from_utf8(target).ok()
}

/// Mint a fresh random namespace token.
pub fn generate(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
