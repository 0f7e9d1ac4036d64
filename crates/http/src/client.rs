// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client request composition.

use serde_json::Value;

/// Request payload.
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// Sent as `application/json; charset=utf-8`.
    Json(Value),
    /// Sent as `application/x-www-form-urlencoded` (`k1=v1&k2=v2`); for
    /// GET the pairs travel as a query string and no body is sent.
    Form(Vec<(String, String)>),
}

fn form_encode(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Compose an HTTP/1.1 request.
///
/// The Host header omits the port for 80 and 443; user headers are merged
/// after the standard ones; Content-Length closes the header block when a
/// body travels.
pub fn compose_request(
    method: &str,
    host: &str,
    port: u16,
    resource: &str,
    query: Option<&str>,
    user_headers: &[(String, String)],
    body: Option<&RequestBody>,
) -> String {
    let method = method.to_ascii_uppercase();
    let is_get = method == "GET";

    let mut query_string = query.unwrap_or("").to_string();
    let mut payload: Option<(String, &str)> = None; // (bytes, content-type)
    match body {
        Some(RequestBody::Json(v)) => {
            payload = Some((v.to_string(), "application/json; charset=utf-8"));
        }
        Some(RequestBody::Form(pairs)) => {
            let encoded = form_encode(pairs);
            if is_get {
                if query_string.is_empty() {
                    query_string = encoded;
                } else {
                    query_string = format!("{query_string}&{encoded}");
                }
            } else {
                payload = Some((encoded, "application/x-www-form-urlencoded"));
            }
        }
        None => {}
    }

    let mut request = String::new();
    if query_string.is_empty() {
        request.push_str(&format!("{method} {resource} HTTP/1.1\r\n"));
    } else {
        request.push_str(&format!("{method} {resource}?{query_string} HTTP/1.1\r\n"));
    }
    request.push_str(&format!("User-Agent: yuneta-{}\r\n", yn_core::YUNETA_VERSION));
    if let Some((_, content_type)) = &payload {
        request.push_str(&format!("Content-Type: {content_type}\r\n"));
    }
    request.push_str("Connection: keep-alive\r\n");
    request.push_str("Accept: */*\r\n");
    if port == 80 || port == 443 || port == 0 {
        request.push_str(&format!("Host: {host}\r\n"));
    } else {
        request.push_str(&format!("Host: {host}:{port}\r\n"));
    }
    for (name, value) in user_headers {
        request.push_str(&format!("{name}: {value}\r\n"));
    }
    if let Some((bytes, _)) = &payload {
        request.push_str(&format!("Content-Length: {}\r\n", bytes.len()));
    }
    request.push_str("\r\n");
    if let Some((bytes, _)) = payload {
        request.push_str(&bytes);
    }
    request
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
