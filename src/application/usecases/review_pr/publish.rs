//! 리뷰 코멘트 렌더링 및 게시 단계.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::application::error::{PipelineError, Stage};
use crate::application::ports::InlineComment;
use crate::application::usecases::review_pr::{ReviewPrUseCase, bounded, context::ExecutionContext};
use crate::domain::review::GeneratedReview;

/// `PostingResult`. 요약+제안 목록을 코멘트 하나로 한 번만 게시한다.
pub(super) async fn publish_review(
    use_case: &ReviewPrUseCase<'_>,
    ctx: &ExecutionContext<'_>,
    review: &GeneratedReview,
) -> Result<String, PipelineError> {
    let body = use_case.renderer.render_review(review);
    info!(stage = %Stage::PostingResult, body_bytes = body.len(), "posting review comment");

    let posted = bounded(
        Stage::PostingResult,
        use_case.settings.timeouts.post,
        ctx.client
            .post_comment(&ctx.job.owner, &ctx.job.repo, ctx.job.pr_number, &body),
        PipelineError::Delivery,
    )
    .await?;

    Ok(posted.id)
}

/// lease 만료 전에 기록과 ack를 위해 남겨 두는 시간.
const LEASE_RESERVE: Duration = Duration::from_secs(5);

/// 요청 하나(`post` timeout)를 더 보내도 lease 안에 끝나는지.
fn fits_in_lease(ctx: &ExecutionContext<'_>, after: Duration) -> bool {
    let remaining = ctx.lease_deadline.saturating_duration_since(Instant::now());
    remaining > after + LEASE_RESERVE
}

/// 제안별 인라인 코멘트. 요약 코멘트가 이미 게시됐으므로 실패는 로그만 남긴다.
/// lease가 부족해지면 남은 제안은 건너뛴다.
pub(super) async fn publish_inline_suggestions(
    use_case: &ReviewPrUseCase<'_>,
    ctx: &ExecutionContext<'_>,
    review: &GeneratedReview,
) -> usize {
    if !use_case.settings.inline_suggestions || review.result.suggestions.is_empty() {
        return 0;
    }

    let job = ctx.job;
    let after = use_case.settings.timeouts.post;
    if !fits_in_lease(ctx, after) {
        warn!(
            skipped = review.result.suggestions.len(),
            "skipping inline suggestions: lease is running out"
        );
        return 0;
    }
    let commit_id = match tokio::time::timeout(
        after,
        ctx.client.fetch_head_sha(&job.owner, &job.repo, job.pr_number),
    )
    .await
    {
        Ok(Ok(sha)) => sha,
        Ok(Err(err)) => {
            warn!(error = %err, "skipping inline suggestions: head sha unavailable");
            return 0;
        }
        Err(_) => {
            warn!("skipping inline suggestions: head sha lookup timed out");
            return 0;
        }
    };

    let mut posted = 0;
    for (index, suggestion) in review.result.suggestions.iter().enumerate() {
        if !fits_in_lease(ctx, after) {
            warn!(
                posted,
                skipped = review.result.suggestions.len() - index,
                "stopping inline suggestions: lease is running out"
            );
            break;
        }
        let comment = InlineComment {
            body: use_case.renderer.render_inline(suggestion),
            commit_id: commit_id.clone(),
            path: suggestion.file.clone(),
            line: suggestion.line,
        };
        let result = tokio::time::timeout(
            after,
            ctx.client
                .post_inline_comment(&job.owner, &job.repo, job.pr_number, &comment),
        )
        .await;
        match result {
            Ok(Ok(_)) => posted += 1,
            Ok(Err(err)) => {
                warn!(file = %suggestion.file, line = suggestion.line, error = %err, "inline comment rejected")
            }
            Err(_) => warn!(file = %suggestion.file, line = suggestion.line, "inline comment timed out"),
        }
    }

    debug!(posted, total = review.result.suggestions.len(), "inline suggestions posted");
    posted
}
