//! 리뷰 생성 단계.

use tracing::{info, warn};

use crate::application::error::{PipelineError, Stage};
use crate::application::usecases::review_pr::{ReviewPrUseCase, context::ExecutionContext};
use crate::domain::review::{GeneratedReview, ReviewQuality};

/// `GeneratingReview`. 구조화에 실패한 결과도 그대로 다음 단계로 넘긴다.
pub(super) async fn generate_review(
    use_case: &ReviewPrUseCase<'_>,
    ctx: &ExecutionContext<'_>,
) -> Result<GeneratedReview, PipelineError> {
    info!(stage = %Stage::GeneratingReview, provider = use_case.provider.id(), "generating review");

    let after = use_case.settings.timeouts.generate;
    let review = tokio::time::timeout(
        after,
        use_case
            .provider
            .generate_review(&ctx.prompt_diff, &ctx.context),
    )
    .await
    .map_err(|_| PipelineError::Timeout {
        stage: Stage::GeneratingReview,
        after,
    })?;

    if let ReviewQuality::Degraded { reason } = &review.quality {
        warn!(provider = review.provider, %reason, "provider output degraded; posting best-effort review");
    }
    info!(
        suggestions = review.result.suggestions.len(),
        prompt_tokens = review.usage.prompt_tokens,
        completion_tokens = review.usage.completion_tokens,
        "review generated"
    );

    Ok(review)
}
