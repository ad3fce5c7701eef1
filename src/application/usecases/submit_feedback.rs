//! 리뷰 피드백을 상호작용 로그에 붙이는 유스케이스.

use thiserror::Error;
use tracing::info;

use crate::application::error::StorageError;
use crate::application::ports::InteractionRecorder;
use crate::domain::interaction::{Feedback, InteractionRecord};

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("invalid feedback: {0}")]
    Invalid(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub struct SubmitFeedbackUseCase<'a> {
    pub recorder: &'a dyn InteractionRecorder,
}

impl<'a> SubmitFeedbackUseCase<'a> {
    pub async fn execute(&self, feedback: &Feedback) -> Result<(), FeedbackError> {
        feedback.validate().map_err(FeedbackError::Invalid)?;
        self.recorder
            .append(&InteractionRecord::for_feedback(feedback))
            .await?;
        info!(review_id = %feedback.review_id, rating = feedback.rating, "feedback recorded");
        Ok(())
    }
}
