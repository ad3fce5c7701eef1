//! 자격증명 해석과 diff 조회 단계.

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::application::error::{PipelineError, Stage};
use crate::application::ports::RepositoryClient;
use crate::application::usecases::review_pr::{ReviewPrUseCase, bounded};
use crate::domain::job::ReviewJob;
use crate::domain::policy::{review_context, truncate_diff};

/// 이후 단계에서 공유되는 작업 실행 상태. 워커 메모리에만 존재한다.
pub(super) struct ExecutionContext<'j> {
    pub job: &'j ReviewJob,
    pub client: Box<dyn RepositoryClient>,
    pub diff: String,
    pub prompt_diff: String,
    pub context: String,
    /// 이 시각이 지나면 lease가 만료되어 다른 워커가 작업을 받을 수 있다.
    pub lease_deadline: Instant,
}

/// `Authenticating → FetchingDiff`.
pub(super) async fn load_execution_context<'j>(
    use_case: &ReviewPrUseCase<'_>,
    job: &'j ReviewJob,
) -> Result<ExecutionContext<'j>, PipelineError> {
    let lease_deadline = Instant::now() + use_case.settings.lease;

    debug!(stage = %Stage::Authenticating, installation = job.installation_id, "resolving credential");
    let after = use_case.settings.timeouts.credential;
    let token = tokio::time::timeout(after, use_case.credentials.resolve(job.installation_id))
        .await
        .map_err(|_| PipelineError::Timeout {
            stage: Stage::Authenticating,
            after,
        })?;
    let Some(token) = token else {
        warn!(installation = job.installation_id, "no repository credential available");
        return Err(PipelineError::CredentialMissing {
            installation_id: job.installation_id,
        });
    };
    let client = use_case.repository_factory.build(token);

    info!(stage = %Stage::FetchingDiff, "fetching diff");
    let diff = bounded(
        Stage::FetchingDiff,
        use_case.settings.timeouts.fetch,
        client.fetch_diff(&job.owner, &job.repo, job.pr_number),
        PipelineError::SourceFetch,
    )
    .await?;

    let max = use_case.settings.max_diff_bytes;
    if diff.len() > max {
        warn!(diff_bytes = diff.len(), max_diff_bytes = max, "diff exceeds limit; truncating prompt");
    } else {
        debug!(diff_bytes = diff.len(), "diff fetched");
    }

    Ok(ExecutionContext {
        job,
        client,
        prompt_diff: truncate_diff(&diff, max),
        diff,
        context: review_context(job),
        lease_deadline,
    })
}
