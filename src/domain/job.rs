//! 리뷰 작업(job) 엔티티와 큐 전달 단위.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 웹훅 이벤트 하나로부터 만들어지는 PR 리뷰 작업. 큐에 들어간 뒤에는 변경하지 않는다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewJob {
    pub owner: String,
    pub repo: String,
    pub pr_number: u64,
    pub installation_id: u64,
    pub enqueued_at: DateTime<Utc>,
}

impl ReviewJob {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, pr_number: u64, installation_id: u64) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            pr_number,
            installation_id,
            enqueued_at: Utc::now(),
        }
    }

    /// 로그/컨텍스트 표기용 `owner/repo#N`.
    pub fn slug(&self) -> String {
        format!("{}/{}#{}", self.owner, self.repo, self.pr_number)
    }
}

/// 큐가 발급하는 작업 식별자.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobHandle(pub i64);

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// 워커 하나에 전달된 작업 한 건.
/// `attempt`는 1부터 시작하며 lease 토큰 역할도 한다.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub handle: JobHandle,
    pub job: ReviewJob,
    pub attempt: u32,
}

/// `fail` 이후 큐가 내린 처분.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureDisposition {
    Retrying { next_attempt: u32, delay_ms: u64 },
    DeadLettered,
}

/// 재시도 예산을 모두 소진해 수동 확인이 필요한 작업.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub handle: JobHandle,
    pub job: ReviewJob,
    pub attempts: u32,
    pub last_error: Option<String>,
}
