//! DNS over HTTPS, [RFC8484](https://www.rfc-editor.org/rfc/rfc8484).
//! GET carries the packet base64url-encoded in `?dns=`; POST carries it as
//! the request body with `Content-Type: application/dns-message`.

use std::net::SocketAddr;

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use tracing::debug;

use crate::enums::Transport;
use crate::query::QueryResponse;

use super::WebState;

const DNS_MESSAGE: &str = "application/dns-message";

#[derive(Debug, Default, Deserialize)]
pub struct GetQueryString {
    /// base64url raw question bytes, padding optional
    dns: Option<String>,
}

fn response_with_status(status: StatusCode) -> Response {
    Response::builder()
        .status(status)
        .header("Cache-Control", "max-age=1")
        .body(Body::empty())
        .unwrap_or_default()
}

fn wire_response(bytes: Vec<u8>) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-type", DNS_MESSAGE)
        .body(Body::from(bytes))
        .unwrap_or_default()
}

fn accepts_dns_message(headers: &HeaderMap) -> bool {
    match headers.get("accept") {
        Some(value) => value
            .to_str()
            .map(|v| v.contains(DNS_MESSAGE) || v.contains("*/*"))
            .unwrap_or(false),
        // no accept header means take what you get
        None => true,
    }
}

async fn run_packet(state: &WebState, packet: &[u8], client: SocketAddr) -> Response {
    match state
        .engine
        .handle_packet(packet, client, Transport::DoH)
        .await
    {
        Some(QueryResponse::Single(bytes)) => wire_response(bytes),
        // transfer streams have no DoH shape
        Some(QueryResponse::Stream(_)) => response_with_status(StatusCode::NOT_IMPLEMENTED),
        None => response_with_status(StatusCode::BAD_REQUEST),
    }
}

pub async fn handle_get(
    State(state): State<WebState>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<GetQueryString>,
) -> Response {
    if !accepts_dns_message(&headers) {
        return response_with_status(StatusCode::NOT_ACCEPTABLE);
    }
    let Some(dns) = query.dns else {
        return response_with_status(StatusCode::BAD_REQUEST);
    };
    // no-padding is preferred but padded payloads show up in the wild
    let packet = match URL_SAFE_NO_PAD.decode(dns.trim_end_matches('=')) {
        Ok(value) => value,
        Err(error) => {
            debug!("bad ?dns= payload: {error:?}");
            return response_with_status(StatusCode::BAD_REQUEST);
        }
    };
    run_packet(&state, &packet, client).await
}

pub async fn handle_post(
    State(state): State<WebState>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if content_type != DNS_MESSAGE {
        return response_with_status(StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }
    run_packet(&state, &body, client).await
}

pub fn new() -> Router<WebState> {
    Router::new().route("/", get(handle_get).post(handle_post))
}
