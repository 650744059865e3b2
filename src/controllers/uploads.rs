use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Duration;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use presign::PostPolicySigner;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const DEFAULT_MAX_SIZE: u64 = 100 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub(crate) struct GrantRequest {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    expires_in: Option<String>,
    #[serde(default)]
    max_size: Option<u64>,
}

pub(crate) async fn create(
    State(signer): State<PostPolicySigner>,
    Json(request): Json<GrantRequest>,
) -> Response {
    let Some(key) = request.key.filter(|k| !k.trim().is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "error": "file key is required" })),
        )
            .into_response();
    };
    let content_type = request
        .content_type
        .as_deref()
        .unwrap_or(DEFAULT_CONTENT_TYPE);
    let expires_in = parse_expires_in(request.expires_in.as_deref());
    let max_size = request.max_size.unwrap_or(DEFAULT_MAX_SIZE);

    match signer.sign(&key, content_type, expires_in, max_size) {
        Ok(grant) => Json(json!({
            "success": true,
            "upload_url": grant.upload_url,
            "method": grant.method,
            "fields": grant.fields,
            "expires_at": grant.expires_at,
        }))
        .into_response(),
        Err(err) => {
            error!("failed to issue an upload grant: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": err.to_string() })),
            )
                .into_response()
        }
    }
}

/// `\d+h`, `\d+m`, `\d+s`, or bare seconds. Anything else falls back to
/// one hour instead of erroring.
pub(crate) fn parse_expires_in(raw: Option<&str>) -> Duration {
    let fallback = Duration::hours(1);
    let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return fallback;
    };
    let (digits, unit) = match raw.char_indices().last() {
        Some((idx, unit @ ('h' | 'm' | 's'))) => (&raw[..idx], unit),
        _ => (raw, 's'),
    };
    let Some(value) = parse_seconds(digits) else {
        return fallback;
    };
    match unit {
        'h' => Duration::hours(value),
        'm' => Duration::minutes(value),
        _ => Duration::seconds(value),
    }
}

fn parse_seconds(digits: &str) -> Option<i64> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
