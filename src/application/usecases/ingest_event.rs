//! 웹훅 이벤트를 검증해 리뷰 작업으로 큐에 넣는 유스케이스.

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::application::ports::TaskQueue;
use crate::domain::event::{IgnoreReason, review_job_from_event};
use crate::domain::job::{JobHandle, ReviewJob};

#[derive(Debug)]
pub enum IngestOutcome {
    Enqueued { handle: JobHandle, job: ReviewJob },
    Ignored(IgnoreReason),
}

/// 대상 이벤트 하나당 작업 하나를 넣고, 파이프라인 실행은 기다리지 않는다.
pub struct IngestEventUseCase<'a> {
    pub queue: &'a dyn TaskQueue,
}

impl<'a> IngestEventUseCase<'a> {
    pub async fn execute(&self, event_type: Option<&str>, body: &[u8]) -> Result<IngestOutcome> {
        let job = match review_job_from_event(event_type, body) {
            Ok(job) => job,
            Err(reason) => {
                debug!(?reason, "webhook event ignored");
                return Ok(IngestOutcome::Ignored(reason));
            }
        };

        let handle = self
            .queue
            .enqueue(job.clone())
            .await
            .with_context(|| format!("failed to enqueue review for {}", job.slug()))?;
        info!(%handle, pr = %job.slug(), "review job enqueued");

        Ok(IngestOutcome::Enqueued { handle, job })
    }
}
