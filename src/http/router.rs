//! HTTP routes and handlers
//!
//! The boundary in front of the job runner. Submission passes three gates
//! in order: rate limiter, idempotency, authentication. Rejections are
//! surfaced synchronously with the fixed per-code message; internal error
//! text never crosses this boundary.

use crate::core::export::checksum::checksum_bytes;
use crate::core::runner::JobRunner;
use crate::domain::{user_message, CaravanError, ExportFilter, ExportFormat, IdempotencyKey, JobId};
use crate::gateway::{Admission, IdempotencyGateway, RateLimiter, StoredResponse};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Route key used for the submission rate-limit bucket
pub const SUBMIT_ROUTE: &str = "POST /exports";

/// Header carrying the client's idempotency key
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Header marking a response as an idempotent replay
pub const IDEMPOTENCY_REPLAYED_HEADER: &str = "idempotency-replayed";

/// Header carrying the correlation id, inbound and outbound
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<JobRunner>,
    pub limiter: Arc<RateLimiter>,
    pub idempotency: Arc<IdempotencyGateway>,
}

/// Builds the service router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/exports", post(submit_export))
        .route("/exports/:id", get(get_export))
        .with_state(state)
}

async fn health() -> Response {
    Json(json!({"status": "ok"})).into_response()
}

#[derive(Debug, Deserialize)]
struct SubmitQuery {
    format: String,
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    job_id: String,
    status: &'static str,
}

async fn submit_export(
    State(state): State<AppState>,
    Query(query): Query<SubmitQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let correlation_id = correlation_id(&headers);

    // Validate the request shape before anything touches shared state
    let format = match query.format.parse::<ExportFormat>() {
        Ok(format) => format,
        Err(err) => return error_response(&err, &correlation_id),
    };
    let filter: ExportFilter = match serde_json::from_slice(&body) {
        Ok(filter) => filter,
        Err(e) => {
            return error_response(
                &CaravanError::Validation(format!("invalid request body: {e}")),
                &correlation_id,
            )
        }
    };
    if let Err(err) = filter.validate() {
        return error_response(&err, &correlation_id);
    }

    // The consumer key is extracted before authentication because the
    // rate-limit gate runs first; the principal is only trusted after the
    // auth gate below
    let principal = bearer_token(&headers);
    let consumer_key = principal.clone().unwrap_or_else(|| "anonymous".to_string());

    // Gate 1: rate limiter
    let decision = match state.limiter.allow(SUBMIT_ROUTE, &consumer_key).await {
        Ok(decision) => decision,
        Err(err) => return error_response(&err, &correlation_id),
    };
    if !decision.allowed {
        let retry_after_ms = decision
            .retry_after
            .map(|d| d.as_millis() as u64)
            .unwrap_or(1_000);
        return error_response(
            &CaravanError::RateLimited { retry_after_ms },
            &correlation_id,
        );
    }

    // Gate 2: idempotency
    let key = match headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        Some(raw) => match IdempotencyKey::new(raw) {
            Ok(key) => key,
            Err(e) => return error_response(&CaravanError::Validation(e), &correlation_id),
        },
        None => {
            return error_response(
                &CaravanError::Validation(format!(
                    "missing required header: {IDEMPOTENCY_KEY_HEADER}"
                )),
                &correlation_id,
            )
        }
    };
    let fingerprint = request_fingerprint(format, &body);

    match state.idempotency.begin(&key, &fingerprint).await {
        Ok(Admission::Fresh) => {}
        Ok(Admission::Replay(cached)) => {
            // A replay produces no new work, so its token goes back
            if let Err(e) = state.limiter.refund(SUBMIT_ROUTE, &consumer_key).await {
                tracing::warn!(error = %e, "Failed to refund rate-limit token on replay");
            }
            return replayed_response(cached, &correlation_id);
        }
        Ok(Admission::Conflict) => {
            return error_response(
                &CaravanError::IdempotencyConflict(key.as_str().to_string()),
                &correlation_id,
            )
        }
        Ok(Admission::InFlight) => {
            return error_response(
                &CaravanError::IdempotencyInFlight(key.as_str().to_string()),
                &correlation_id,
            )
        }
        Err(err) => return error_response(&err, &correlation_id),
    }

    // Gate 3: authentication. Token validation itself is the identity
    // provider's concern; the boundary requires a present principal.
    let principal = match principal {
        Some(principal) => principal,
        None => {
            let _ = state.idempotency.abandon(&key).await;
            return json_error(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Authentication is required.",
                &correlation_id,
            );
        }
    };

    match Arc::clone(&state.runner)
        .submit(format, filter, correlation_id.clone())
        .await
    {
        Ok(job_id) => {
            tracing::info!(
                job_id = %job_id,
                principal = %principal,
                correlation_id = %correlation_id,
                "Export accepted"
            );
            let accepted = SubmitResponse {
                job_id: job_id.into_inner(),
                status: "PENDING",
            };
            let body_bytes =
                serde_json::to_vec(&accepted).expect("submit response serializes");
            let stored = StoredResponse {
                status: StatusCode::ACCEPTED.as_u16(),
                content_type: "application/json".to_string(),
                body: body_bytes.clone(),
            };
            if let Err(e) = state.idempotency.complete(&key, stored).await {
                tracing::warn!(error = %e, "Failed to cache idempotent response");
            }
            with_correlation(
                (
                    StatusCode::ACCEPTED,
                    [(header::CONTENT_TYPE, "application/json")],
                    body_bytes,
                )
                    .into_response(),
                &correlation_id,
            )
        }
        Err(err) => {
            let _ = state.idempotency.abandon(&key).await;
            error_response(&err, &correlation_id)
        }
    }
}

async fn get_export(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let correlation_id = uuid::Uuid::new_v4().to_string();
    let job_id = match JobId::new(id) {
        Ok(job_id) => job_id,
        Err(e) => return error_response(&CaravanError::Validation(e), &correlation_id),
    };
    match state.runner.get_status(&job_id).await {
        Ok(job) => Json(job).into_response(),
        Err(err) => error_response(&err, &correlation_id),
    }
}

/// Inbound correlation id, or a fresh one
fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(String::from)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Bearer token from the Authorization header, if present
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(String::from)
}

/// Fingerprint binding an idempotency key to one exact request
fn request_fingerprint(format: ExportFormat, body: &[u8]) -> String {
    let mut material = Vec::with_capacity(body.len() + 8);
    material.extend_from_slice(format.to_string().as_bytes());
    material.push(b'\n');
    material.extend_from_slice(body);
    checksum_bytes(&material)
}

/// Maps a domain error to its HTTP response
fn error_response(err: &CaravanError, correlation_id: &str) -> Response {
    let code = err.code();
    let status = match err {
        CaravanError::Validation(_) => StatusCode::BAD_REQUEST,
        CaravanError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        CaravanError::IdempotencyConflict(_) | CaravanError::IdempotencyInFlight(_) => {
            StatusCode::CONFLICT
        }
        CaravanError::JobNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let mut response = json_error(status, code, user_message(code), correlation_id);
    if let CaravanError::RateLimited { retry_after_ms } = err {
        let retry_after_secs = retry_after_ms.div_ceil(1000).max(1);
        if let Ok(value) = retry_after_secs.to_string().parse() {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }
    response
}

fn json_error(
    status: StatusCode,
    code: &str,
    message: &str,
    correlation_id: &str,
) -> Response {
    with_correlation(
        (
            status,
            Json(json!({
                "error": code,
                "message": message,
            })),
        )
            .into_response(),
        correlation_id,
    )
}

fn replayed_response(cached: StoredResponse, correlation_id: &str) -> Response {
    let status =
        StatusCode::from_u16(cached.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, cached.body).into_response();
    if let Ok(content_type) = cached.content_type.parse() {
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type);
    }
    response
        .headers_mut()
        .insert(IDEMPOTENCY_REPLAYED_HEADER, "true".parse().expect("valid header value"));
    with_correlation(response, correlation_id)
}

fn with_correlation(mut response: Response, correlation_id: &str) -> Response {
    if let Ok(value) = correlation_id.parse() {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
