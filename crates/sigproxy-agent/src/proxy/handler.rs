//! The proxy request handler
//!
//! Per inbound request: resolve the signing key from the client-id, rewrite
//! the URL onto the registered upstream base, copy and filter headers, sign,
//! forward, and relay the response. `/auth/token` bodies are additionally
//! teed to the tunnel manager after the upstream has answered.

use std::sync::Arc;

use axum::body::{to_bytes, Body, Bytes};
use axum::extract::{Request, State};
use axum::response::Response;
use http::header::{HeaderMap, HeaderValue, ACCEPT};
use http::request::Parts;
use http::StatusCode;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use sigproxy_common::{headers, Material, SigningError};

use crate::console::Console;
use crate::tunnel::UserCredentials;

use super::ProxyState;

pub(crate) const TOKEN_ENDPOINT: &str = "/auth/token";

/// Inbound headers that never reach the upstream
const EXCLUDED_REQUEST_HEADERS: [&str; 4] =
    ["host", "accept-encoding", "connection", "user-agent"];

/// Upstream response headers that are not relayed back
const EXCLUDED_RESPONSE_HEADERS: [&str; 3] = ["signature", "signature-input", "host"];

#[derive(Error, Debug)]
enum ProxyError {
    #[error("invalid clientID, please, check your signing proxy configuration")]
    InvalidClientId,

    #[error("unknown clientID, please, check your signing proxy configuration")]
    UnknownClientId,

    #[error("signing proxy: unable to sign request")]
    Signing(#[source] SigningError),

    #[error("upstream request timed out")]
    Timeout,

    #[error("signing proxy: unable to perform request: {0}")]
    Upstream(reqwest::Error),

    #[error("{0}")]
    Internal(String),
}

impl ProxyError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Signing(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Catch-all axum handler: every method and path goes through here.
pub async fn proxy_request(State(state): State<Arc<ProxyState>>, request: Request) -> Response {
    let console = if no_logging(request.headers()) {
        state.console.silenced()
    } else {
        state.console
    };

    match forward(&state, request, &console).await {
        Ok(response) => response,
        Err(err) => {
            if let ProxyError::Signing(source) = &err {
                error!(error = %source, "unable to sign request");
            }
            error_response(&err)
        }
    }
}

async fn forward(
    state: &ProxyState,
    request: Request,
    console: &Console,
) -> Result<Response, ProxyError> {
    console.verbose("\nSend request:");

    let (parts, body) = request.into_parts();
    let body = to_bytes(body, usize::MAX)
        .await
        .map_err(|e| ProxyError::Internal(e.to_string()))?;
    let path = parts.uri.path().to_string();
    let raw_query = parts.uri.query().map(str::to_string);

    let client_id = resolve_client_id(&parts, &body)?;
    console.verbose(format!(" - For Client ID: {client_id}"));

    let (entry, used_default) = state
        .registry
        .get_or_default(&client_id)
        .ok_or(ProxyError::UnknownClientId)?;
    if used_default {
        console.verbose(" - Used default signer");
    } else {
        console.verbose(format!(" - Used signer for clientID {client_id}"));
    }

    let mut url = entry.base_url.clone();
    url.set_path(&path);
    url.set_query(raw_query.as_deref());
    console.verbose(format!(" - To url '{url}'"));

    let mut out_headers = outbound_headers(&parts.headers);
    if !out_headers.contains_key(ACCEPT) {
        out_headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        console.verbose(" - Header 'Accept' added with value '*/*'");
    }

    let material = Material::from_request(
        &parts.method,
        &path,
        raw_query.as_deref(),
        &mut out_headers,
        &body,
    )
    .map_err(ProxyError::Signing)?;
    entry
        .signer
        .sign_request(&material, &mut out_headers)
        .map_err(ProxyError::Signing)?;

    let outbound = state
        .client
        .request(parts.method.clone(), url)
        .headers(out_headers)
        .body(body.to_vec())
        .build()
        .map_err(|e| ProxyError::Internal(e.to_string()))?;

    let upstream =
        match tokio::time::timeout(state.default_timeout, state.client.execute(outbound)).await {
            Err(_) => return Err(ProxyError::Timeout),
            Ok(Err(err)) if err.is_timeout() => return Err(ProxyError::Timeout),
            Ok(Err(err)) => return Err(ProxyError::Upstream(err)),
            Ok(Ok(response)) => response,
        };

    let status = upstream.status();
    let response_headers = upstream.headers().clone();
    let response_body = upstream.bytes().await.map_err(ProxyError::Upstream)?;

    console.verbose("Response:");
    console.verbose(format!(" - Status '{}'", status.as_u16()));
    if console.is_verbose() {
        console.verbose(" - Headers:");
        for (name, value) in &response_headers {
            console.verbose(format!(
                "    {}: {}",
                name,
                String::from_utf8_lossy(value.as_bytes())
            ));
        }
    }

    if path == TOKEN_ENDPOINT {
        publish_credentials(state, &body);
    }

    Ok(relay_response(status, &response_headers, response_body))
}

/// Which key signs this request: the form body on the token endpoint, the
/// `upvest-client-id` header everywhere else. The value must be a UUID.
fn resolve_client_id(parts: &Parts, body: &[u8]) -> Result<String, ProxyError> {
    let client_id = if parts.uri.path() == TOKEN_ENDPOINT {
        form_value(body, "client_id").unwrap_or_default()
    } else {
        parts
            .headers
            .get(headers::CLIENT_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    if Uuid::parse_str(&client_id).is_err() {
        return Err(ProxyError::InvalidClientId);
    }
    Ok(client_id)
}

fn form_value(body: &[u8], key: &str) -> Option<String> {
    url::form_urlencoded::parse(body)
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

fn outbound_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in inbound {
        if EXCLUDED_REQUEST_HEADERS.contains(&name.as_str()) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

fn relay_response(status: StatusCode, upstream: &HeaderMap, body: Bytes) -> Response {
    let mut builder = Response::builder().status(status);
    if let Some(target) = builder.headers_mut() {
        for (name, value) in upstream {
            if EXCLUDED_RESPONSE_HEADERS.contains(&name.as_str()) {
                continue;
            }
            target.append(name.clone(), value.clone());
        }
    }
    builder.body(Body::from(body)).unwrap_or_default()
}

fn error_response(err: &ProxyError) -> Response {
    let payload = serde_json::json!({ "error": err.to_string() });
    let body = serde_json::to_vec(&payload).unwrap_or_default();
    Response::builder()
        .status(err.status())
        .header("content-type", "application/json;charset=UTF-8")
        .header("cache-control", "no-store")
        .header("pragma", "no-cache")
        .body(Body::from(body))
        .unwrap_or_default()
}

fn no_logging(inbound: &HeaderMap) -> bool {
    inbound
        .get(headers::NO_LOGGING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn publish_credentials(state: &ProxyState, body: &[u8]) {
    let Some(tx) = &state.credentials_tx else {
        return;
    };
    let credentials = UserCredentials::from_form(body);
    if credentials.is_empty() {
        return;
    }
    // a stopped manager means the channel is closed; drop silently
    let _ = tx.send(credentials);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_value() {
        let body = b"client_id=abc&client_secret=s3cr3t&grant_type=client_credentials";
        assert_eq!(form_value(body, "client_id").unwrap(), "abc");
        assert_eq!(form_value(body, "client_secret").unwrap(), "s3cr3t");
        assert!(form_value(body, "missing").is_none());
    }

    #[test]
    fn test_outbound_headers_filter() {
        let mut inbound = HeaderMap::new();
        inbound.insert("host", HeaderValue::from_static("localhost:3000"));
        inbound.insert("accept-encoding", HeaderValue::from_static("gzip"));
        inbound.insert("connection", HeaderValue::from_static("keep-alive"));
        inbound.insert("user-agent", HeaderValue::from_static("curl/8.0"));
        inbound.insert("content-type", HeaderValue::from_static("text/plain"));
        inbound.insert("transfer-encoding", HeaderValue::from_static("chunked"));

        // the drop set is exactly host/accept-encoding/connection/user-agent;
        // everything else goes through
        let out = outbound_headers(&inbound);
        assert_eq!(out.len(), 2);
        assert!(out.contains_key("content-type"));
        assert!(out.contains_key("transfer-encoding"));
    }

    #[test]
    fn test_relay_drops_exactly_signature_headers_and_host() {
        let mut upstream = HeaderMap::new();
        upstream.insert("signature", HeaderValue::from_static("sig1=:AAAA:"));
        upstream.insert("signature-input", HeaderValue::from_static("sig1=()"));
        upstream.insert("host", HeaderValue::from_static("upstream.test"));
        upstream.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        upstream.insert("x-upstream-custom", HeaderValue::from_static("kept"));

        let response = relay_response(StatusCode::OK, &upstream, Bytes::from_static(b"body"));
        let relayed = response.headers();
        assert!(relayed.get("signature").is_none());
        assert!(relayed.get("signature-input").is_none());
        assert!(relayed.get("host").is_none());
        assert_eq!(relayed.get("transfer-encoding").unwrap(), "chunked");
        assert_eq!(relayed.get("x-upstream-custom").unwrap(), "kept");
    }

    #[test]
    fn test_no_logging_is_case_insensitive() {
        let mut inbound = HeaderMap::new();
        assert!(!no_logging(&inbound));
        inbound.insert(
            headers::NO_LOGGING,
            HeaderValue::from_static("TRUE"),
        );
        assert!(no_logging(&inbound));
        inbound.insert(headers::NO_LOGGING, HeaderValue::from_static("no"));
        assert!(!no_logging(&inbound));
    }
}
