//! 리뷰 도메인 엔티티/값 객체.

use serde::{Deserialize, Serialize};

/// provider 호출에 넘기는 리뷰 요청.
#[derive(Debug, Clone)]
pub struct ReviewRequest {
    pub context: String,
    pub diff: String,
    pub system_prompt: String,
}

/// 특정 파일/라인에 대한 개선 제안.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub file: String,
    pub line: u64,
    pub comment: String,
}

/// provider가 만들어야 하는 구조화된 리뷰.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewResult {
    pub summary: String,
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
}

/// 리뷰 결과의 구조화 여부.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewQuality {
    Structured,
    /// 모델 응답을 구조화하지 못해 best-effort 요약만 남은 상태.
    Degraded { reason: String },
}

impl ReviewQuality {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

/// review provider 경계를 통과한 최종 결과. 실패 대신 degraded 값을 담는다.
#[derive(Debug, Clone)]
pub struct GeneratedReview {
    pub review_id: String,
    pub provider: &'static str,
    pub result: ReviewResult,
    pub quality: ReviewQuality,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

impl TokenUsage {
    /// 입력/출력 토큰만 알려진 응답에서 합계를 채운다.
    pub fn from_parts(prompt: Option<u64>, completion: Option<u64>, total: Option<u64>) -> Self {
        let total = total.or(match (prompt, completion) {
            (Some(p), Some(c)) => Some(p + c),
            (Some(p), None) => Some(p),
            (None, Some(c)) => Some(c),
            (None, None) => None,
        });
        Self {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: total,
        }
    }
}

/// provider가 돌려준 원문 텍스트와 사용량.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub content: String,
    pub usage: TokenUsage,
}
