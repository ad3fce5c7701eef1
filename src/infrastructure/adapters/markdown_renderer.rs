//! 마크다운 렌더링 포트 구현 어댑터.

use crate::application::ports::MarkdownRenderer;
use crate::domain::review::{GeneratedReview, Suggestion};
use crate::infrastructure::render;

pub struct MarkdownRendererAdapter;

impl MarkdownRenderer for MarkdownRendererAdapter {
    fn render_review(&self, review: &GeneratedReview) -> String {
        render::render_review_markdown(review)
    }

    fn render_inline(&self, suggestion: &Suggestion) -> String {
        render::render_inline_markdown(suggestion)
    }
}
