//! PR 리뷰 작업 한 건의 전체 오케스트레이션 유스케이스.
//!
//! 상태 전이: `Dequeued → Authenticating → FetchingDiff → GeneratingReview →
//! PostingResult → Recording → Completed`. 어느 단계에서든 `Failed`로 끝날 수 있다.

mod context;
mod generate;
mod publish;
mod record;

use std::time::Duration;

use tracing::{info, instrument};

use crate::application::config::{Config, StageTimeouts};
use crate::application::error::{PipelineError, Stage};
use crate::application::ports::{
    CredentialResolver, InteractionRecorder, MarkdownRenderer, ProviderAgent, RepositoryFactory,
};
use crate::domain::job::Delivery;

use context::load_execution_context;
use generate::generate_review;
use publish::{publish_inline_suggestions, publish_review};
use record::record_interaction;

/// 작업 실행에 필요한 해석된 설정값. 프로세스 기동 시 한 번 만든다.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub timeouts: StageTimeouts,
    pub max_diff_bytes: usize,
    pub inline_suggestions: bool,
    /// 한 시도에 허용되는 전체 시간(큐 lease 길이)
    pub lease: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeouts: config.stage_timeouts(),
            max_diff_bytes: config.max_diff_bytes(),
            inline_suggestions: config.inline_suggestions(),
            lease: config.queue_policy().visibility_timeout,
        }
    }
}

/// `Completed`에 도달한 작업의 요약.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub review_id: String,
    pub comment_id: String,
    pub degraded: bool,
    pub recorded: bool,
    pub inline_posted: usize,
}

/// 자격증명 해석부터 기록까지 단계를 순서대로 구동한다.
/// 재시도는 큐의 몫이므로 여기서는 한 번의 시도만 수행한다.
pub struct ReviewPrUseCase<'a> {
    pub credentials: &'a dyn CredentialResolver,
    pub repository_factory: &'a dyn RepositoryFactory,
    pub provider: &'a dyn ProviderAgent,
    pub recorder: &'a dyn InteractionRecorder,
    pub renderer: &'a dyn MarkdownRenderer,
    pub settings: PipelineSettings,
}

impl<'a> ReviewPrUseCase<'a> {
    #[instrument(
        name = "review_pr",
        skip_all,
        fields(job = %delivery.handle, attempt = delivery.attempt, pr = %delivery.job.slug())
    )]
    pub async fn execute(&self, delivery: &Delivery) -> Result<PipelineReport, PipelineError> {
        info!(stage = %Stage::Dequeued, "starting review attempt");

        let ctx = load_execution_context(self, &delivery.job).await?;
        let review = generate_review(self, &ctx).await?;
        let comment_id = publish_review(self, &ctx, &review).await?;
        let inline_posted = publish_inline_suggestions(self, &ctx, &review).await;
        let recorded = record_interaction(self, &ctx, &review).await;

        info!(
            stage = %Stage::Completed,
            review_id = %review.review_id,
            comment_id = %comment_id,
            degraded = review.quality.is_degraded(),
            recorded,
            "review attempt completed"
        );

        Ok(PipelineReport {
            review_id: review.review_id,
            comment_id,
            degraded: review.quality.is_degraded(),
            recorded,
            inline_posted,
        })
    }
}

/// 단계 하나를 제한 시간 안에 실행한다.
async fn bounded<T, E>(
    stage: Stage,
    after: Duration,
    fut: impl Future<Output = Result<T, E>>,
    map_err: impl FnOnce(E) -> PipelineError,
) -> Result<T, PipelineError> {
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result.map_err(map_err),
        Err(_) => Err(PipelineError::Timeout { stage, after }),
    }
}
