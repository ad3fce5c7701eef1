//! 도메인 정책(모델 응답 해석, 리뷰 마커, 컨텍스트 구성).

use serde::Deserialize;
use serde_json::Value;

use crate::domain::job::ReviewJob;
use crate::domain::review::{ReviewQuality, ReviewResult, Suggestion};

pub const FALLBACK_SUMMARY: &str = "The review model did not return a usable response for this change.";

const MAX_DEGRADED_SUMMARY_CHARS: usize = 8_000;

#[derive(Debug, Deserialize)]
struct RawReview {
    summary: Option<String>,
    #[serde(default)]
    suggestions: Vec<Suggestion>,
    error: Option<Value>,
}

/// 게시된 코멘트에서 리뷰 id를 찾기 위한 숨김 마커.
pub fn review_marker(review_id: &str) -> String {
    format!("<!-- reviewpilot review-id={review_id} -->")
}

/// provider에 함께 넘기는 저장소 컨텍스트 문자열.
pub fn review_context(job: &ReviewJob) -> String {
    format!(
        "Repository: {}/{}, pull request #{}",
        job.owner, job.repo, job.pr_number
    )
}

/// 모델 응답을 구조화된 리뷰로 해석한다.
/// 해석할 수 없으면 원문을 요약으로 쓰는 degraded 결과를 돌려준다.
pub fn interpret_review_output(content: &str) -> (ReviewResult, ReviewQuality) {
    match parse_structured(content) {
        Ok(result) => (result, ReviewQuality::Structured),
        Err(reason) => (degraded_result(content), ReviewQuality::Degraded { reason }),
    }
}

/// 응답 자체가 없을 때(전송 실패 등) 쓰는 degraded 결과.
pub fn degraded_result(raw: &str) -> ReviewResult {
    let trimmed = raw.trim();
    let summary = if trimmed.is_empty() {
        FALLBACK_SUMMARY.to_string()
    } else {
        truncate_chars(trimmed, MAX_DEGRADED_SUMMARY_CHARS)
    };
    ReviewResult {
        summary,
        suggestions: Vec::new(),
    }
}

/// UTF-8 경계를 지키면서 프롬프트용 diff를 자른다.
pub fn truncate_diff(diff: &str, max_bytes: usize) -> String {
    if diff.len() <= max_bytes {
        return diff.to_string();
    }

    let mut cutoff = max_bytes;
    while cutoff > 0 && !diff.is_char_boundary(cutoff) {
        cutoff -= 1;
    }

    let mut out = diff[..cutoff].to_string();
    out.push_str("\n... (diff truncated)\n");
    out
}

fn parse_structured(content: &str) -> Result<ReviewResult, String> {
    let candidate = json_candidate(content).ok_or_else(|| "response is not JSON".to_string())?;
    let raw: RawReview = serde_json::from_str(candidate)
        .map_err(|err| format!("response does not match review shape: {err}"))?;

    if let Some(error) = raw.error {
        return Err(format!("provider reported an error: {error}"));
    }

    let summary = raw
        .summary
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "response has no summary".to_string())?;

    Ok(ReviewResult {
        summary,
        suggestions: raw.suggestions,
    })
}

fn json_candidate(content: &str) -> Option<&str> {
    let trimmed = content.trim();
    if trimmed.starts_with('{') {
        return Some(trimmed);
    }

    // ```json 펜스 또는 앞뒤 설명문이 붙은 경우 첫 `{`부터 마지막 `}`까지 취한다.
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_json_is_structured() {
        let (result, quality) = interpret_review_output(
            r#"{"summary":"LGTM","suggestions":[{"file":"src/lib.rs","line":3,"comment":"rename"}]}"#,
        );
        assert_eq!(quality, ReviewQuality::Structured);
        assert_eq!(result.summary, "LGTM");
        assert_eq!(result.suggestions.len(), 1);
        assert_eq!(result.suggestions[0].line, 3);
    }

    #[test]
    fn fenced_json_is_structured() {
        let content = "Here you go:\n```json\n{\"summary\": \"Looks fine\", \"suggestions\": []}\n```";
        let (result, quality) = interpret_review_output(content);
        assert_eq!(quality, ReviewQuality::Structured);
        assert_eq!(result.summary, "Looks fine");
        assert!(result.suggestions.is_empty());
    }

    #[test]
    fn prose_is_degraded_but_kept() {
        let (result, quality) = interpret_review_output("The change looks risky around locking.");
        assert!(quality.is_degraded());
        assert_eq!(result.summary, "The change looks risky around locking.");
    }

    #[test]
    fn error_shape_is_degraded() {
        let (result, quality) = interpret_review_output(r#"{"error": "Local model not loaded"}"#);
        assert!(quality.is_degraded());
        assert!(!result.summary.is_empty());
    }

    #[test]
    fn empty_output_uses_fallback_summary() {
        let (result, quality) = interpret_review_output("   ");
        assert!(quality.is_degraded());
        assert_eq!(result.summary, FALLBACK_SUMMARY);
    }

    #[test]
    fn truncate_respects_char_boundary() {
        let diff = "+한글 변경";
        let cut = truncate_diff(diff, 3);
        assert!(cut.starts_with('+'));
        assert!(cut.ends_with("(diff truncated)\n"));
        assert_eq!(truncate_diff(diff, 1024), diff);
    }

    #[test]
    fn long_degraded_output_is_truncated() {
        let long = "x".repeat(MAX_DEGRADED_SUMMARY_CHARS + 10);
        let result = degraded_result(&long);
        assert_eq!(result.summary.chars().count(), MAX_DEGRADED_SUMMARY_CHARS + 1);
    }
}
