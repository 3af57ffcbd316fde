/// Request forwarding
///
/// Relays a classified request to its downstream service and the downstream
/// response back to the client. Identity headers are injected here, after
/// any client-supplied values of the same names have been stripped - the
/// gateway is the only writer of those headers.

use actix_web::{web, HttpRequest, HttpResponse};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::auth::Claims;
use crate::error::{AppError, GatewayError};

/// Identity headers the gateway guarantees it is the sole writer of.
/// Downstream services trust these and only these for row-level isolation.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// Headers that must not be relayed in either direction (RFC 7230 hop-by-hop,
/// plus those the HTTP stack regenerates itself).
const SKIP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

fn is_skipped(name: &str) -> bool {
    SKIP_HEADERS.iter().any(|s| name.eq_ignore_ascii_case(s))
}

fn is_identity_header(name: &str) -> bool {
    name.eq_ignore_ascii_case(USER_ID_HEADER) || name.eq_ignore_ascii_case(USER_EMAIL_HEADER)
}

/// Build the outbound header map: client headers minus hop-by-hop headers,
/// minus any client-supplied identity headers, plus the gateway's own
/// identity headers when the request carried verified claims.
fn build_outbound_headers(
    req: &HttpRequest,
    identity: Option<&Claims>,
) -> Result<HeaderMap, AppError> {
    let mut headers = HeaderMap::new();

    for (name, value) in req.headers() {
        let name_str = name.as_str();
        // Client-supplied identity headers are dropped unconditionally,
        // even on public routes: only the gateway may write them.
        if is_skipped(name_str) || is_identity_header(name_str) {
            continue;
        }
        let header_name = HeaderName::from_bytes(name_str.as_bytes())
            .map_err(|e| AppError::Internal(format!("Invalid header name: {}", e)))?;
        let header_value = HeaderValue::from_bytes(value.as_bytes())
            .map_err(|e| AppError::Internal(format!("Invalid header value: {}", e)))?;
        headers.append(header_name, header_value);
    }

    if let Some(claims) = identity {
        headers.insert(
            HeaderName::from_static(USER_ID_HEADER),
            HeaderValue::from_str(&claims.sub)
                .map_err(|e| AppError::Internal(format!("Invalid user id header: {}", e)))?,
        );
        headers.insert(
            HeaderName::from_static(USER_EMAIL_HEADER),
            HeaderValue::from_str(&claims.email)
                .map_err(|e| AppError::Internal(format!("Invalid email header: {}", e)))?,
        );
    }

    Ok(headers)
}

/// Forward a request to `target_base` and relay the downstream response.
///
/// Connectivity failures get exactly one retry; the retry only covers
/// connection establishment, never timeouts (the deadline already elapsed)
/// and never authentication failures (those are rejected before this point).
/// The downstream status and body are relayed verbatim - a downstream 401
/// passes through as a 401, not a gateway error.
pub async fn forward(
    client: &reqwest::Client,
    target_base: &str,
    req: &HttpRequest,
    body: web::Bytes,
    identity: Option<&Claims>,
) -> Result<HttpResponse, AppError> {
    let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes())
        .map_err(|e| AppError::Internal(format!("Invalid method: {}", e)))?;

    let mut url = format!("{}{}", target_base, req.path());
    if !req.query_string().is_empty() {
        url.push('?');
        url.push_str(req.query_string());
    }

    let headers = build_outbound_headers(req, identity)?;

    let send = || {
        client
            .request(method.clone(), url.as_str())
            .headers(headers.clone())
            .body(body.to_vec())
            .send()
    };

    let response = match send().await {
        Ok(response) => response,
        Err(e) if e.is_connect() => {
            tracing::warn!(url = %url, error = %e, "Downstream connect failed, retrying once");
            send().await.map_err(|e| {
                AppError::Gateway(GatewayError::DownstreamUnreachable(e.to_string()))
            })?
        }
        Err(e) => return Err(e.into()),
    };

    let status = actix_web::http::StatusCode::from_u16(response.status().as_u16())
        .map_err(|e| AppError::Internal(format!("Invalid downstream status: {}", e)))?;

    let mut builder = HttpResponse::build(status);
    for (name, value) in response.headers() {
        if is_skipped(name.as_str()) {
            continue;
        }
        builder.insert_header((name.as_str(), value.as_bytes()));
    }

    let bytes = response.bytes().await?;
    Ok(builder.body(bytes.to_vec()))
}
