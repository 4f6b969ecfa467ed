//! Structured Acknowledgement Path.
//!
//! Runs once hyper has parsed a request's head. For capture endpoints it
//! claims the pending capture the raw tap filed for the same connection,
//! reads the body through (so every byte has been relayed), publishes End
//! and answers `204 No Content`.

use std::collections::BTreeMap;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, StatusCode, Version},
    response::{IntoResponse, Response},
};
use futures_util::StreamExt;

use crate::capture::event::EndEvent;
use crate::http::server::AppState;
use crate::net::connection::ConnectionMeta;
use crate::observability::metrics;

/// Fallback handler: acknowledges captures, 404 for everything else.
pub async fn acknowledge(
    State(state): State<AppState>,
    ConnectInfo(meta): ConnectInfo<ConnectionMeta>,
    request: Request,
) -> Response {
    let path = request.uri().path().to_string();

    let Some(namespace) = state.engine.namespace_of(&path).map(str::to_owned) else {
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    };

    let Some(handle) = state.engine.claim(meta.key()).await else {
        tracing::warn!(
            connection_id = %meta.id,
            peer_addr = %meta.remote,
            namespace = %namespace,
            attempts = state.engine.retry_policy().max_attempts(),
            "No pending capture for connection"
        );
        metrics::record_capture_unmatched();
        return (StatusCode::INTERNAL_SERVER_ERROR, "Capture could not be matched").into_response();
    };

    if handle.namespace() != namespace {
        tracing::warn!(
            capture_id = %handle.id(),
            raw = handle.namespace(),
            parsed = %namespace,
            "Raw and parsed namespaces disagree, using parsed"
        );
    }

    let (parts, body) = request.into_parts();
    if let Err(e) = drain(body).await {
        tracing::warn!(capture_id = %handle.id(), error = %e, "Request body ended early");
        state.engine.abandon(&handle);
        return (StatusCode::INTERNAL_SERVER_ERROR, "Request body could not be read").into_response();
    }

    let end = EndEvent {
        capture_id: handle.id(),
        headers: collect_headers(&parts.headers),
        http_version: version_label(parts.version).to_string(),
        method: parts.method.to_string(),
        path,
        scheme: meta.scheme.as_str().to_string(),
    };
    state.engine.complete(&handle, &namespace, end);

    tracing::debug!(
        connection_id = %meta.id,
        capture_id = %handle.id(),
        namespace = %namespace,
        "Capture acknowledged"
    );

    (StatusCode::NO_CONTENT, [(header::CONNECTION, "close")]).into_response()
}

/// Read the body to the end without keeping it; the tap has already relayed it.
async fn drain(body: Body) -> Result<(), axum::Error> {
    let mut stream = body.into_data_stream();
    while let Some(chunk) = stream.next().await {
        chunk?;
    }
    Ok(())
}

/// Flatten headers into a map; repeated names are joined with ", ".
fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut collected: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        collected
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    collected
}

fn version_label(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_11 => "1.1",
        Version::HTTP_2 => "2.0",
        Version::HTTP_3 => "3.0",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn repeated_headers_are_joined() {
        let mut headers = HeaderMap::new();
        headers.append("x-tag", HeaderValue::from_static("a"));
        headers.append("x-tag", HeaderValue::from_static("b"));
        headers.insert("host", HeaderValue::from_static("t"));

        let collected = collect_headers(&headers);
        assert_eq!(collected["x-tag"], "a, b");
        assert_eq!(collected["host"], "t");
    }

    #[test]
    fn versions_use_short_labels() {
        assert_eq!(version_label(Version::HTTP_11), "1.1");
        assert_eq!(version_label(Version::HTTP_2), "2.0");
    }
}
