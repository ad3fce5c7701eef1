//! 재학습용 상호작용 기록(diff, review, feedback).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::domain::review::GeneratedReview;

/// JSONL 로그 한 줄에 해당하는 기록. 파이프라인은 추가만 하고 수정하지 않는다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub timestamp: DateTime<Utc>,
    pub diff: String,
    pub review: Value,
    pub feedback: Option<Value>,
}

impl InteractionRecord {
    /// 게시가 끝난 리뷰 한 건을 기록으로 만든다.
    pub fn for_review(diff: &str, review: &GeneratedReview) -> Self {
        Self {
            timestamp: Utc::now(),
            diff: diff.to_string(),
            review: json!({
                "id": review.review_id,
                "provider": review.provider,
                "summary": review.result.summary,
                "suggestions": review.result.suggestions,
                "degraded": review.quality.is_degraded(),
            }),
            feedback: None,
        }
    }

    /// 이전 리뷰에 대한 피드백 기록. 원본 기록과의 연결은 review id로만 한다.
    pub fn for_feedback(feedback: &Feedback) -> Self {
        Self {
            timestamp: Utc::now(),
            diff: String::new(),
            review: json!({ "id": feedback.review_id }),
            feedback: Some(json!({
                "rating": feedback.rating,
                "comment": feedback.comment,
            })),
        }
    }

    pub fn review_id(&self) -> Option<&str> {
        self.review.get("id").and_then(Value::as_str)
    }
}

/// 사용자가 남긴 리뷰 평가.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Feedback {
    pub review_id: String,
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
}

impl Feedback {
    pub const MIN_RATING: u8 = 1;
    pub const MAX_RATING: u8 = 5;

    pub fn validate(&self) -> Result<(), String> {
        if self.review_id.trim().is_empty() {
            return Err("review_id must not be empty".to_string());
        }
        if !(Self::MIN_RATING..=Self::MAX_RATING).contains(&self.rating) {
            return Err(format!(
                "rating must be between {} and {}",
                Self::MIN_RATING,
                Self::MAX_RATING
            ));
        }
        Ok(())
    }
}
