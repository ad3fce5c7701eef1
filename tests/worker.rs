//! Worker integration tests: in-memory queue, JSONL recorder on disk and
//! a mocked GitHub API.
//!
//! Retry backoff is zero so redeliveries are immediately visible and the
//! tests run on the real clock alongside the mock server.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio::sync::watch;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use reviewpilot::application::config::{QueuePolicy, StageTimeouts};
use reviewpilot::application::error::FailureKind;
use reviewpilot::application::ports::{CredentialResolver, ProviderAgent, TaskQueue};
use reviewpilot::application::usecases::review_pr::{PipelineSettings, ReviewPrUseCase};
use reviewpilot::application::usecases::run_worker::{JobOutcome, RunWorkerUseCase};
use reviewpilot::domain::job::{DeadLetter, Delivery, FailureDisposition, JobHandle, ReviewJob};
use reviewpilot::domain::review::{GeneratedReview, ReviewQuality, ReviewResult, TokenUsage};
use reviewpilot::infrastructure::adapters::{GitHubRepositoryFactory, MarkdownRendererAdapter};
use reviewpilot::infrastructure::queue::MemoryQueue;
use reviewpilot::infrastructure::recorder::JsonlRecorder;

/// Claims immediately but answers slowly, like a database round trip that
/// has already committed the lease when shutdown arrives.
struct SlowClaimQueue {
    inner: MemoryQueue,
    answer_after: Duration,
}

#[async_trait]
impl TaskQueue for SlowClaimQueue {
    async fn enqueue(&self, job: ReviewJob) -> anyhow::Result<JobHandle> {
        self.inner.enqueue(job).await
    }

    async fn dequeue(&self) -> anyhow::Result<Delivery> {
        let delivery = self.inner.dequeue().await?;
        tokio::time::sleep(self.answer_after).await;
        Ok(delivery)
    }

    async fn try_dequeue(&self) -> anyhow::Result<Option<Delivery>> {
        let claimed = self.inner.try_dequeue().await?;
        if claimed.is_some() {
            tokio::time::sleep(self.answer_after).await;
        }
        Ok(claimed)
    }

    async fn ack(&self, delivery: &Delivery) -> anyhow::Result<()> {
        self.inner.ack(delivery).await
    }

    async fn fail(&self, delivery: &Delivery, reason: &str) -> anyhow::Result<FailureDisposition> {
        self.inner.fail(delivery, reason).await
    }

    async fn dead_letters(&self) -> anyhow::Result<Vec<DeadLetter>> {
        self.inner.dead_letters().await
    }
}

const DIFF: &str = "diff --git a/README.md b/README.md\n+hello\n";

struct AnyInstallation;

#[async_trait]
impl CredentialResolver for AnyInstallation {
    async fn resolve(&self, _installation_id: u64) -> Option<String> {
        Some("ghs_test".to_string())
    }
}

struct EchoProvider;

#[async_trait]
impl ProviderAgent for EchoProvider {
    fn id(&self) -> &'static str {
        "echo"
    }

    fn name(&self) -> &'static str {
        "Echo"
    }

    async fn generate_review(&self, diff: &str, context: &str) -> GeneratedReview {
        GeneratedReview {
            review_id: uuid::Uuid::new_v4().to_string(),
            provider: "echo",
            result: ReviewResult {
                summary: format!("{context}: {} diff bytes", diff.len()),
                suggestions: Vec::new(),
            },
            quality: ReviewQuality::Structured,
            usage: TokenUsage::default(),
        }
    }
}

fn policy(max_attempts: u32) -> QueuePolicy {
    QueuePolicy {
        max_attempts,
        visibility_timeout: Duration::from_secs(60),
        retry_backoff: Duration::ZERO,
        poll_interval: Duration::from_millis(10),
    }
}

fn settings() -> PipelineSettings {
    PipelineSettings {
        timeouts: StageTimeouts {
            credential: Duration::from_secs(5),
            fetch: Duration::from_secs(5),
            generate: Duration::from_secs(5),
            post: Duration::from_secs(5),
        },
        max_diff_bytes: 64 * 1024,
        inline_suggestions: false,
        lease: Duration::from_secs(60),
    }
}

fn diff_path(number: u64) -> String {
    format!("/repos/acme/widgets/pulls/{number}")
}

fn comments_path(number: u64) -> String {
    format!("/repos/acme/widgets/issues/{number}/comments")
}

async fn mount_healthy_pr(server: &MockServer, number: u64) {
    Mock::given(method("GET"))
        .and(path(diff_path(number)))
        .respond_with(ResponseTemplate::new(200).set_body_string(DIFF))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(comments_path(number)))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({ "id": number * 100 })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn persistent_fetch_failure_ends_in_dead_letter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(diff_path(42)))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let queue = MemoryQueue::new(policy(3));
    let recorder = JsonlRecorder::new(dir.path().join("interactions.jsonl"));
    let factory = GitHubRepositoryFactory::new(server.uri());
    let worker = RunWorkerUseCase {
        queue: &queue,
        pipeline: ReviewPrUseCase {
            credentials: &AnyInstallation,
            repository_factory: &factory,
            provider: &EchoProvider,
            recorder: &recorder,
            renderer: &MarkdownRendererAdapter,
            settings: settings(),
        },
        idle_backoff: Duration::from_millis(10),
    };

    queue.enqueue(ReviewJob::new("acme", "widgets", 42, 1)).await.unwrap();

    let mut dispositions = Vec::new();
    for expected_attempt in 1..=3 {
        let delivery = queue.dequeue().await.unwrap();
        assert_eq!(delivery.attempt, expected_attempt);
        match worker.process(&delivery).await {
            JobOutcome::Failed { kind, disposition } => {
                assert_eq!(kind, FailureKind::SourceFetchError);
                dispositions.push(disposition.expect("queue accepted the failure report"));
            }
            JobOutcome::Completed(_) => panic!("fetch never succeeds"),
        }
    }

    assert_eq!(
        dispositions,
        vec![
            FailureDisposition::Retrying { next_attempt: 2, delay_ms: 0 },
            FailureDisposition::Retrying { next_attempt: 3, delay_ms: 0 },
            FailureDisposition::DeadLettered,
        ]
    );

    let dead = queue.dead_letters().await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].attempts, 3);
    assert!(dead[0].last_error.as_deref().unwrap().contains("HTTP 502"));
    assert_eq!(queue.pending().await, 0);
    assert!(recorder.read_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn transient_failures_recover_with_a_single_comment() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(diff_path(42)))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(diff_path(42)))
        .and(header("authorization", "Bearer ghs_test"))
        .respond_with(ResponseTemplate::new(200).set_body_string(DIFF))
        .with_priority(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(comments_path(42)))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({ "id": 9001 })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let queue = MemoryQueue::new(policy(3));
    let recorder = JsonlRecorder::new(dir.path().join("interactions.jsonl"));
    let factory = GitHubRepositoryFactory::new(server.uri());
    let worker = RunWorkerUseCase {
        queue: &queue,
        pipeline: ReviewPrUseCase {
            credentials: &AnyInstallation,
            repository_factory: &factory,
            provider: &EchoProvider,
            recorder: &recorder,
            renderer: &MarkdownRendererAdapter,
            settings: settings(),
        },
        idle_backoff: Duration::from_millis(10),
    };

    queue.enqueue(ReviewJob::new("acme", "widgets", 42, 1)).await.unwrap();

    let mut outcome = None;
    for _ in 0..3 {
        let delivery = queue.dequeue().await.unwrap();
        if let JobOutcome::Completed(report) = worker.process(&delivery).await {
            assert_eq!(delivery.attempt, 3);
            outcome = Some(report);
            break;
        }
    }

    let report = outcome.expect("third attempt completes");
    assert_eq!(report.comment_id, "9001");
    assert!(report.recorded);
    assert_eq!(queue.pending().await, 0);
    assert!(queue.dead_letters().await.unwrap().is_empty());

    let records = recorder.read_all().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].diff, DIFF);
}

#[tokio::test]
async fn worker_loop_drains_queue_and_stops_on_shutdown() {
    let server = MockServer::start().await;
    for number in 1..=3 {
        mount_healthy_pr(&server, number).await;
    }

    let dir = tempfile::tempdir().unwrap();
    let queue = Arc::new(MemoryQueue::new(policy(3)));
    let recorder = JsonlRecorder::new(dir.path().join("logs").join("interactions.jsonl"));
    let factory = GitHubRepositoryFactory::new(server.uri());
    let worker = RunWorkerUseCase {
        queue: queue.as_ref(),
        pipeline: ReviewPrUseCase {
            credentials: &AnyInstallation,
            repository_factory: &factory,
            provider: &EchoProvider,
            recorder: &recorder,
            renderer: &MarkdownRendererAdapter,
            settings: settings(),
        },
        idle_backoff: Duration::from_millis(10),
    };

    for number in 1..=3 {
        queue
            .enqueue(ReviewJob::new("acme", "widgets", number, 1))
            .await
            .unwrap();
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    let watcher = async {
        tokio::time::timeout(Duration::from_secs(10), async {
            while queue.pending().await > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("queue drains");
        stop_tx.send(true).unwrap();
    };

    let (stats, ()) = tokio::join!(worker.run(0, stop_rx), watcher);
    assert_eq!(stats.completed, 3);
    assert_eq!(stats.failed, 0);

    let records = recorder.read_all().await.unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    for (record, number) in records.iter().zip(1..=3) {
        assert!(
            record.review["summary"]
                .as_str()
                .unwrap()
                .contains(&format!("pull request #{number}"))
        );
    }
}

#[tokio::test]
async fn shutdown_during_a_claim_still_processes_the_claimed_job() {
    let server = MockServer::start().await;
    mount_healthy_pr(&server, 42).await;

    let dir = tempfile::tempdir().unwrap();
    let queue = SlowClaimQueue {
        inner: MemoryQueue::new(policy(3)),
        answer_after: Duration::from_millis(200),
    };
    let recorder = JsonlRecorder::new(dir.path().join("interactions.jsonl"));
    let factory = GitHubRepositoryFactory::new(server.uri());
    let worker = RunWorkerUseCase {
        queue: &queue,
        pipeline: ReviewPrUseCase {
            credentials: &AnyInstallation,
            repository_factory: &factory,
            provider: &EchoProvider,
            recorder: &recorder,
            renderer: &MarkdownRendererAdapter,
            settings: settings(),
        },
        idle_backoff: Duration::from_millis(10),
    };

    queue.enqueue(ReviewJob::new("acme", "widgets", 42, 1)).await.unwrap();

    let (stop_tx, stop_rx) = watch::channel(false);
    let stopper = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop_tx.send(true).unwrap();
    };

    let (stats, ()) = tokio::join!(worker.run(0, stop_rx), stopper);

    assert_eq!(stats.completed, 1);
    assert_eq!(queue.inner.pending().await, 0);
    assert_eq!(recorder.read_all().await.unwrap().len(), 1);
}
