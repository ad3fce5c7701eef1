//! 포트 경계에서 호출자가 종류별로 분기해야 하는 오류 타입.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// 저장소 호스트 API 호출 오류.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{action} failed with HTTP {status}: {body}")]
    Http {
        action: &'static str,
        status: u16,
        body: String,
    },
    #[error("{action} failed: {message}")]
    Transport {
        action: &'static str,
        message: String,
    },
    #[error("{action} returned an unexpected body: {message}")]
    Decode {
        action: &'static str,
        message: String,
    },
}

impl RepositoryError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// 상호작용 로그 추가 실패. 파이프라인은 기록만 남기고 넘어간다.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("interaction log {path} is not writable: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode interaction record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// 파이프라인 단계(상태).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Dequeued,
    Authenticating,
    FetchingDiff,
    GeneratingReview,
    PostingResult,
    Recording,
    Completed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Dequeued => "dequeued",
            Self::Authenticating => "authenticating",
            Self::FetchingDiff => "fetching_diff",
            Self::GeneratingReview => "generating_review",
            Self::PostingResult => "posting_result",
            Self::Recording => "recording",
            Self::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// 실패 분류.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    CredentialMissing,
    SourceFetchError,
    DeliveryError,
    Timeout,
}

impl FailureKind {
    /// 재전달로 회복될 가능성이 있는지. 자격증명 누락은 운영자 조치가 필요하다.
    pub fn is_transient(self) -> bool {
        !matches!(self, Self::CredentialMissing)
    }
}

/// 한 번의 작업 시도를 `Failed` 상태로 끝낸 원인.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no repository credential for installation {installation_id}")]
    CredentialMissing { installation_id: u64 },
    #[error("failed to fetch diff: {0}")]
    SourceFetch(#[source] RepositoryError),
    #[error("failed to post review: {0}")]
    Delivery(#[source] RepositoryError),
    #[error("{stage} timed out after {}s", .after.as_secs())]
    Timeout { stage: Stage, after: Duration },
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::CredentialMissing { .. } => FailureKind::CredentialMissing,
            Self::SourceFetch(_) => FailureKind::SourceFetchError,
            Self::Delivery(_) => FailureKind::DeliveryError,
            Self::Timeout { stage, .. } => match stage {
                Stage::FetchingDiff => FailureKind::SourceFetchError,
                Stage::PostingResult => FailureKind::DeliveryError,
                _ => FailureKind::Timeout,
            },
        }
    }

    /// 실패가 발생한 단계.
    pub fn stage(&self) -> Stage {
        match self {
            Self::CredentialMissing { .. } => Stage::Authenticating,
            Self::SourceFetch(_) => Stage::FetchingDiff,
            Self::Delivery(_) => Stage::PostingResult,
            Self::Timeout { stage, .. } => *stage,
        }
    }
}
