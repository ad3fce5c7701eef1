use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::{Value, json};

use super::{ApiError, AppState};
use crate::application::usecases::submit_feedback::{FeedbackError, SubmitFeedbackUseCase};
use crate::domain::interaction::Feedback;

/// 평가 범위를 벗어나면 422, 기록 실패는 500이다.
pub async fn submit(
    State(state): State<AppState>,
    Json(feedback): Json<Feedback>,
) -> Result<Json<Value>, ApiError> {
    let usecase = SubmitFeedbackUseCase {
        recorder: state.recorder.as_ref(),
    };

    usecase.execute(&feedback).await.map_err(|err| match err {
        FeedbackError::Invalid(message) => ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, message),
        FeedbackError::Storage(err) => {
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    })?;

    Ok(Json(json!({ "message": "Feedback received" })))
}
