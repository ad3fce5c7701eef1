//! 큐에서 작업을 꺼내 파이프라인을 돌리는 워커 루프.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::application::error::FailureKind;
use crate::application::ports::TaskQueue;
use crate::application::usecases::review_pr::{PipelineReport, ReviewPrUseCase};
use crate::domain::job::{Delivery, FailureDisposition};

/// 작업 한 건의 최종 결과.
#[derive(Debug)]
pub enum JobOutcome {
    Completed(PipelineReport),
    Failed {
        kind: FailureKind,
        disposition: Option<FailureDisposition>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub completed: usize,
    pub failed: usize,
}

/// 워커는 `Completed`에 도달한 뒤에만 ack하고, 재시도 일정은 큐에 맡긴다.
pub struct RunWorkerUseCase<'a> {
    pub queue: &'a dyn TaskQueue,
    pub pipeline: ReviewPrUseCase<'a>,
    /// 보이는 작업이 없거나 dequeue가 실패했을 때 다음 polling까지 대기 시간
    pub idle_backoff: Duration,
}

impl<'a> RunWorkerUseCase<'a> {
    /// 종료 신호가 올 때까지 작업을 처리한다. 진행 중인 작업은 끝까지 수행한다.
    ///
    /// 종료 신호는 polling 사이의 대기만 끊는다. 이미 시작한 claim은 취소하지 않는다.
    pub async fn run(&self, worker_id: usize, mut shutdown: watch::Receiver<bool>) -> WorkerStats {
        info!(worker_id, "worker started");
        let mut stats = WorkerStats::default();

        while !*shutdown.borrow() {
            let delivery = match self.queue.try_dequeue().await {
                Ok(Some(delivery)) => delivery,
                Ok(None) => {
                    tokio::select! {
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                        _ = tokio::time::sleep(self.idle_backoff) => {}
                    }
                    continue;
                }
                Err(err) => {
                    error!(worker_id, error = %format!("{err:#}"), "failed to dequeue");
                    tokio::time::sleep(self.idle_backoff).await;
                    continue;
                }
            };

            match self.process(&delivery).await {
                JobOutcome::Completed(_) => stats.completed += 1,
                JobOutcome::Failed { .. } => stats.failed += 1,
            }
        }

        info!(worker_id, completed = stats.completed, failed = stats.failed, "worker stopped");
        stats
    }

    /// 전달받은 작업 한 건을 실행하고 큐에 결과를 보고한다.
    pub async fn process(&self, delivery: &Delivery) -> JobOutcome {
        match self.pipeline.execute(delivery).await {
            Ok(report) => {
                if let Err(err) = self.queue.ack(delivery).await {
                    // 게시는 끝났으므로 lease 만료 후 재전달될 수 있다.
                    error!(job = %delivery.handle, error = %format!("{err:#}"), "failed to acknowledge job");
                }
                JobOutcome::Completed(report)
            }
            Err(err) => {
                let kind = err.kind();
                warn!(
                    job = %delivery.handle,
                    attempt = delivery.attempt,
                    stage = %err.stage(),
                    ?kind,
                    transient = kind.is_transient(),
                    error = %err,
                    "review attempt failed"
                );

                let disposition = match self.queue.fail(delivery, &err.to_string()).await {
                    Ok(disposition) => {
                        match &disposition {
                            FailureDisposition::Retrying { next_attempt, delay_ms } => {
                                info!(job = %delivery.handle, next_attempt, delay_ms, "job scheduled for redelivery")
                            }
                            FailureDisposition::DeadLettered => {
                                error!(job = %delivery.handle, attempts = delivery.attempt, "job moved to dead-letter")
                            }
                        }
                        Some(disposition)
                    }
                    Err(err) => {
                        error!(job = %delivery.handle, error = %format!("{err:#}"), "failed to report job failure");
                        None
                    }
                };

                JobOutcome::Failed { kind, disposition }
            }
        }
    }
}
