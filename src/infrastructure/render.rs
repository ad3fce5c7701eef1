//! PR 코멘트용 Markdown 렌더링 모듈.
//! 같은 입력이면 항상 같은 바이트열을 만든다.

use crate::domain::policy::review_marker;
use crate::domain::review::{GeneratedReview, ReviewQuality, Suggestion, TokenUsage};

const DEGRADED_NOTE: &str = "> **Note:** the model reply could not be read as a structured review, so it is shown as-is.";

/// GitHub 코멘트 본문 최대 길이(문자 수).
pub const MAX_COMMENT_CHARS: usize = 65_536;

const TRUNCATED_NOTE: &str = "\n\n> **Note:** this review was truncated to fit GitHub's comment size limit.\n\n";

/// 요약 + 제안 목록을 하나의 PR 코멘트로 렌더링한다.
pub fn render_review_markdown(review: &GeneratedReview) -> String {
    let mut out = String::new();
    out.push_str(&review_marker(&review.review_id));
    out.push_str("\n\n## AI Code Review\n\n");
    out.push_str(review.result.summary.trim());
    out.push_str("\n\n");

    if !review.result.suggestions.is_empty() {
        out.push_str("### Suggestions\n\n");
        for suggestion in &review.result.suggestions {
            out.push_str(&suggestion_line(suggestion));
            out.push('\n');
        }
        out.push('\n');
    }

    if let ReviewQuality::Degraded { .. } = review.quality {
        out.push_str(DEGRADED_NOTE);
        out.push_str("\n\n");
    }

    let footer = format!(
        "<sub>review id `{}` | provider `{}` | tokens {}</sub>\n",
        review.review_id,
        review.provider,
        format_usage(&review.usage)
    );
    fit_with_footer(out, &footer)
}

/// 인라인 코멘트 본문. 파일/라인은 API 필드로 전달되므로 본문에는 넣지 않는다.
pub fn render_inline_markdown(suggestion: &Suggestion) -> String {
    let body = format!("**AI suggestion:** {}", suggestion.comment.trim());
    fit_with_footer(body, "\n")
}

/// `footer`는 항상 남기고, 합이 한도를 넘으면 본문을 문자 경계에서 자른 뒤 표시를 붙인다.
fn fit_with_footer(mut body: String, footer: &str) -> String {
    let footer_chars = footer.chars().count();
    if body.chars().count() + footer_chars > MAX_COMMENT_CHARS {
        let keep = MAX_COMMENT_CHARS.saturating_sub(footer_chars + TRUNCATED_NOTE.chars().count());
        if let Some((cut, _)) = body.char_indices().nth(keep) {
            body.truncate(cut);
        }
        body.push_str(TRUNCATED_NOTE);
    }
    body.push_str(footer);
    body
}

fn suggestion_line(suggestion: &Suggestion) -> String {
    format!(
        "- **`{}`** line {}: {}",
        suggestion.file,
        suggestion.line,
        suggestion.comment.trim()
    )
}

fn format_usage(usage: &TokenUsage) -> String {
    usage
        .total_tokens
        .map(|v| v.to_string())
        .unwrap_or_else(|| "n/a".to_string())
}
