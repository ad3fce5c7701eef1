use axum::Json;
use axum::body::Bytes;
use axum::extract::{FromRef, FromRequest, Request, State};
use axum::http::StatusCode;
use hmac::{Hmac, Mac};
use serde_json::{Value, json};
use sha2::Sha256;

use super::{ApiError, AppState};
use crate::application::usecases::ingest_event::{IngestEventUseCase, IngestOutcome};

const EVENT_HEADER: &str = "X-GitHub-Event";
const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

/// 서명을 검증한 웹훅 원문. 비밀값이 없으면 검증 없이 통과한다.
pub struct SignedWebhook {
    pub event_type: Option<String>,
    pub body: Bytes,
}

impl<S> FromRequest<S> for SignedWebhook
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let event_type = req
            .headers()
            .get(EVENT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let signature = req
            .headers()
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let secret = AppState::from_ref(state).webhook_secret;
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, "error reading body"))?;

        if let Some(secret) = secret {
            verify_signature(secret.as_bytes(), signature.as_deref(), &body)?;
        }

        Ok(Self { event_type, body })
    }
}

fn verify_signature(secret: &[u8], header: Option<&str>, body: &[u8]) -> Result<(), ApiError> {
    let unauthorized = |m: &str| ApiError::new(StatusCode::UNAUTHORIZED, m);

    let hex_signature = header
        .ok_or_else(|| unauthorized("X-Hub-Signature-256 missing"))?
        .strip_prefix("sha256=")
        .ok_or_else(|| unauthorized("X-Hub-Signature-256 sha256= prefix missing"))?;
    let signature =
        hex::decode(hex_signature).map_err(|_| unauthorized("X-Hub-Signature-256 malformed"))?;

    let mut mac = Hmac::<Sha256>::new_from_slice(secret)
        .map_err(|_| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "invalid webhook secret"))?;
    mac.update(body);
    mac.verify_slice(&signature)
        .map_err(|_| unauthorized("signature mismatch"))
}

/// 대상 이벤트면 작업을 넣고 바로 응답한다. 큐 장애는 503으로 돌려 재전송을 유도한다.
pub async fn receive(
    State(state): State<AppState>,
    webhook: SignedWebhook,
) -> Result<Json<Value>, ApiError> {
    let usecase = IngestEventUseCase {
        queue: state.queue.as_ref(),
    };

    match usecase
        .execute(webhook.event_type.as_deref(), &webhook.body)
        .await
    {
        Ok(IngestOutcome::Enqueued { handle, .. }) => Ok(Json(json!({
            "message": "Review processing started",
            "job": handle.to_string(),
        }))),
        Ok(IngestOutcome::Ignored(reason)) => Ok(Json(json!({
            "message": "Event ignored",
            "reason": reason.to_string(),
        }))),
        Err(err) => Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("{err:#}"),
        )),
    }
}
