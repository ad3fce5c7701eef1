//! 애플리케이션 계층이 의존하는 포트(추상 인터페이스) 모음.

use anyhow::Result;
use async_trait::async_trait;

use crate::application::config::Config;
use crate::application::error::{RepositoryError, StorageError};
use crate::domain::interaction::InteractionRecord;
use crate::domain::job::{DeadLetter, Delivery, FailureDisposition, JobHandle, ReviewJob};
use crate::domain::review::{GeneratedReview, Suggestion};

/// 설정 로딩/점검을 담당하는 저장소 포트.
pub trait ConfigRepository: Send + Sync {
    fn load(&self) -> Result<Config>;
    fn inspect_pretty_json(&self) -> Result<String>;
}

/// at-least-once 작업 큐(competing consumers).
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// 작업을 넣고 즉시 반환한다.
    async fn enqueue(&self, job: ReviewJob) -> Result<JobHandle>;
    /// 보이는 작업이 생길 때까지 기다렸다가 lease를 잡아 돌려준다.
    async fn dequeue(&self) -> Result<Delivery>;
    /// 지금 보이는 작업이 있으면 lease를 잡아 돌려주고, 없으면 기다리지 않는다.
    async fn try_dequeue(&self) -> Result<Option<Delivery>>;
    /// 최종 성공. 작업을 제거한다.
    async fn ack(&self, delivery: &Delivery) -> Result<()>;
    /// 시도 실패. 재시도 예약 또는 dead-letter 처분을 돌려준다.
    async fn fail(&self, delivery: &Delivery, reason: &str) -> Result<FailureDisposition>;
    /// 재시도 예산을 소진한 작업 목록.
    async fn dead_letters(&self) -> Result<Vec<DeadLetter>>;
}

/// installation id로 저장소 토큰을 찾는 포트. 외부 명령을 기다릴 수 있다.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, installation_id: u64) -> Option<String>;
}

/// 게시된 코멘트 식별자.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedComment {
    pub id: String,
}

/// 특정 커밋의 파일/라인에 다는 인라인 코멘트.
#[derive(Debug, Clone)]
pub struct InlineComment {
    pub body: String,
    pub commit_id: String,
    pub path: String,
    pub line: u64,
}

/// 저장소 호스트(GitHub) 연동 포트.
#[async_trait]
pub trait RepositoryClient: Send + Sync {
    async fn fetch_diff(&self, owner: &str, repo: &str, number: u64) -> Result<String, RepositoryError>;
    async fn fetch_head_sha(&self, owner: &str, repo: &str, number: u64) -> Result<String, RepositoryError>;
    async fn post_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<PostedComment, RepositoryError>;
    async fn post_inline_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        comment: &InlineComment,
    ) -> Result<PostedComment, RepositoryError>;
}

/// 토큰에 맞는 저장소 클라이언트를 생성하는 팩토리 포트.
pub trait RepositoryFactory: Send + Sync {
    fn build(&self, token: String) -> Box<dyn RepositoryClient>;
}

/// diff를 리뷰로 바꾸는 provider 포트. 모델 응답 문제로는 실패하지 않는다.
#[async_trait]
pub trait ProviderAgent: Send + Sync {
    fn id(&self) -> &'static str;
    fn name(&self) -> &'static str;
    async fn generate_review(&self, diff: &str, context: &str) -> GeneratedReview;
}

/// 설정에서 provider 하나를 고르는 팩토리 포트. 고를 수 없으면 기동 실패다.
pub trait ProviderFactory: Send + Sync {
    fn build(&self, config: &Config) -> Result<Box<dyn ProviderAgent>>;
}

/// 재학습용 상호작용 기록 포트(append-only).
#[async_trait]
pub trait InteractionRecorder: Send + Sync {
    async fn append(&self, record: &InteractionRecord) -> Result<(), StorageError>;
}

/// 리뷰 마크다운 렌더링 포트.
pub trait MarkdownRenderer: Send + Sync {
    fn render_review(&self, review: &GeneratedReview) -> String;
    fn render_inline(&self, suggestion: &Suggestion) -> String;
}
