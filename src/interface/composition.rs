//! 애플리케이션 조립(composition root) 모듈.

use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use tokio::sync::watch;

use crate::application::config::Config;
use crate::application::ports::{ProviderAgent, ProviderFactory, TaskQueue};
use crate::application::usecases::list_dead_letters::ListDeadLettersUseCase;
use crate::application::usecases::review_pr::{PipelineSettings, ReviewPrUseCase};
use crate::application::usecases::run_worker::{RunWorkerUseCase, WorkerStats};
use crate::infrastructure::adapters::{
    CredentialResolverAdapter, GitHubRepositoryFactory, MarkdownRendererAdapter,
    ProviderFactoryAdapter,
};
use crate::infrastructure::config::resolve_webhook_secret;
use crate::infrastructure::queue::open_queue;
use crate::infrastructure::recorder::JsonlRecorder;
use crate::interface::http::AppState;

/// 실행 시점 의존성을 한 곳에서 조립하는 컨테이너.
pub struct AppComposition {
    config: Config,
    queue: Arc<dyn TaskQueue>,
    recorder: Arc<JsonlRecorder>,
    credentials: CredentialResolverAdapter,
    repository_factory: GitHubRepositoryFactory,
    provider_factory: ProviderFactoryAdapter,
    renderer: MarkdownRendererAdapter,
}

impl AppComposition {
    /// 큐와 기록 저장소를 연다. 큐를 열 수 없거나 단계 timeout 합이 lease보다 길면 기동 오류다.
    pub async fn open(config: Config) -> Result<Self> {
        config.check_lease_budget()?;
        let queue = open_queue(&config.queue_url(), config.queue_policy()).await?;
        Ok(Self {
            recorder: Arc::new(JsonlRecorder::new(config.recorder_path())),
            credentials: CredentialResolverAdapter::from_config(&config),
            repository_factory: GitHubRepositoryFactory::from_config(&config),
            provider_factory: ProviderFactoryAdapter,
            renderer: MarkdownRendererAdapter,
            queue,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 설정 우선순위에 따라 provider 하나를 고른다(프로세스당 한 번).
    pub fn build_provider(&self) -> Result<Box<dyn ProviderAgent>> {
        self.provider_factory.build(&self.config)
    }

    /// HTTP 핸들러 상태.
    pub fn http_state(&self) -> AppState {
        AppState {
            queue: self.queue.clone(),
            recorder: self.recorder.clone(),
            webhook_secret: resolve_webhook_secret(&self.config.server)
                .value
                .map(Arc::from),
        }
    }

    pub fn review_usecase<'a>(&'a self, provider: &'a dyn ProviderAgent) -> ReviewPrUseCase<'a> {
        ReviewPrUseCase {
            credentials: &self.credentials,
            repository_factory: &self.repository_factory,
            provider,
            recorder: self.recorder.as_ref(),
            renderer: &self.renderer,
            settings: PipelineSettings::from_config(&self.config),
        }
    }

    pub fn worker_usecase<'a>(&'a self, provider: &'a dyn ProviderAgent) -> RunWorkerUseCase<'a> {
        RunWorkerUseCase {
            queue: self.queue.as_ref(),
            pipeline: self.review_usecase(provider),
            idle_backoff: self.config.queue_policy().poll_interval,
        }
    }

    pub fn dead_letters_usecase(&self) -> ListDeadLettersUseCase<'_> {
        ListDeadLettersUseCase {
            queue: self.queue.as_ref(),
        }
    }

    /// 워커 `count`개를 같은 프로세스에서 동시에 돌리고, 모두 멈출 때까지 기다린다.
    pub async fn run_workers(
        &self,
        provider: &dyn ProviderAgent,
        count: usize,
        shutdown: watch::Receiver<bool>,
    ) -> WorkerStats {
        let workers = (0..count.max(1)).map(|worker_id| {
            let worker = self.worker_usecase(provider);
            let shutdown = shutdown.clone();
            async move { worker.run(worker_id, shutdown).await }
        });

        join_all(workers)
            .await
            .into_iter()
            .fold(WorkerStats::default(), |acc, stats| WorkerStats {
                completed: acc.completed + stats.completed,
                failed: acc.failed + stats.failed,
            })
    }
}
