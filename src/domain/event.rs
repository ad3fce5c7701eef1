//! 인바운드 웹훅 이벤트 해석 규칙.
//!
//! `pull_request` 이벤트 중 `opened`/`synchronize` 액션만 리뷰 대상이다.

use serde::Deserialize;
use thiserror::Error;

use crate::domain::job::ReviewJob;

pub const PULL_REQUEST_EVENT: &str = "pull_request";
pub const QUALIFYING_ACTIONS: [&str; 2] = ["opened", "synchronize"];

#[derive(Debug, Deserialize)]
struct PullRequestEvent {
    action: Option<String>,
    pull_request: Option<PullRequestRef>,
    repository: Option<RepositoryRef>,
    installation: Option<InstallationRef>,
}

#[derive(Debug, Deserialize)]
struct PullRequestRef {
    number: u64,
}

#[derive(Debug, Deserialize)]
struct RepositoryRef {
    name: String,
    owner: OwnerRef,
}

#[derive(Debug, Deserialize)]
struct OwnerRef {
    login: String,
}

#[derive(Debug, Deserialize)]
struct InstallationRef {
    id: u64,
}

/// 이벤트를 작업으로 바꾸지 않은 이유.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IgnoreReason {
    #[error("event '{0}' is not reviewed")]
    UnsupportedEvent(String),
    #[error("pull_request action '{0}' is not reviewed")]
    UnsupportedAction(String),
    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// 이벤트 헤더와 본문을 보고 리뷰 작업을 만들지 결정한다.
pub fn review_job_from_event(event_type: Option<&str>, body: &[u8]) -> Result<ReviewJob, IgnoreReason> {
    let event_type = event_type.unwrap_or_default();
    if event_type != PULL_REQUEST_EVENT {
        return Err(IgnoreReason::UnsupportedEvent(event_type.to_string()));
    }

    let event: PullRequestEvent =
        serde_json::from_slice(body).map_err(|err| IgnoreReason::Malformed(err.to_string()))?;

    let action = event.action.unwrap_or_default();
    if !QUALIFYING_ACTIONS.contains(&action.as_str()) {
        return Err(IgnoreReason::UnsupportedAction(action));
    }

    let (Some(pr), Some(repo)) = (event.pull_request, event.repository) else {
        return Err(IgnoreReason::Malformed(
            "missing pull_request or repository".to_string(),
        ));
    };

    Ok(ReviewJob::new(
        repo.owner.login,
        repo.name,
        pr.number,
        event.installation.map(|i| i.id).unwrap_or(0),
    ))
}
