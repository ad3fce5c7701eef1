//! 상호작용 기록 단계.

use tracing::{debug, error};

use crate::application::error::Stage;
use crate::application::usecases::review_pr::{ReviewPrUseCase, context::ExecutionContext};
use crate::domain::interaction::InteractionRecord;
use crate::domain::review::GeneratedReview;

/// `Recording`. 리뷰가 이미 게시됐으므로 실패해도 작업은 완료로 본다.
pub(super) async fn record_interaction(
    use_case: &ReviewPrUseCase<'_>,
    ctx: &ExecutionContext<'_>,
    review: &GeneratedReview,
) -> bool {
    debug!(stage = %Stage::Recording, "recording interaction");
    let record = InteractionRecord::for_review(&ctx.diff, review);
    match use_case.recorder.append(&record).await {
        Ok(()) => true,
        Err(err) => {
            error!(error = %err, review_id = %review.review_id, "failed to record interaction");
            false
        }
    }
}
