//! GitHub REST API 연동 구현.

use async_trait::async_trait;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;

use crate::application::error::RepositoryError;
use crate::application::ports::{InlineComment, PostedComment, RepositoryClient};

const USER_AGENT: &str = "reviewpilot";
const DIFF_MEDIA_TYPE: &str = "application/vnd.github.v3.diff";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";

/// owner/repo 경로 세그먼트에 허용하는 문자 외에는 모두 인코딩한다.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

pub struct GitHubClient {
    client: Client,
    api_base: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    head: PullHead,
}

#[derive(Debug, Deserialize)]
struct PullHead {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct CommentResponse {
    id: u64,
}

impl GitHubClient {
    pub fn new(client: Client, api_base: String, token: String) -> Self {
        Self {
            client,
            api_base,
            token,
        }
    }

    fn repo_url(&self, owner: &str, repo: &str, rest: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_base,
            utf8_percent_encode(owner, PATH_SEGMENT),
            utf8_percent_encode(repo, PATH_SEGMENT),
            rest
        )
    }

    fn request(&self, method: Method, url: String, accept: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", accept)
            .bearer_auth(&self.token)
    }

    async fn send(
        &self,
        action: &'static str,
        req: RequestBuilder,
    ) -> Result<String, RepositoryError> {
        let resp: Response = req.send().await.map_err(|err| RepositoryError::Transport {
            action,
            message: err.to_string(),
        })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|err| RepositoryError::Transport {
            action,
            message: format!("failed to read body: {err}"),
        })?;

        if !status.is_success() {
            return Err(RepositoryError::Http {
                action,
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    async fn create_comment(
        &self,
        action: &'static str,
        url: String,
        payload: serde_json::Value,
    ) -> Result<PostedComment, RepositoryError> {
        let req = self.request(Method::POST, url, JSON_MEDIA_TYPE).json(&payload);
        let body = self.send(action, req).await?;
        let comment: CommentResponse =
            serde_json::from_str(&body).map_err(|err| RepositoryError::Decode {
                action,
                message: err.to_string(),
            })?;
        Ok(PostedComment {
            id: comment.id.to_string(),
        })
    }
}

#[async_trait]
impl RepositoryClient for GitHubClient {
    async fn fetch_diff(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<String, RepositoryError> {
        // PR endpoint에 diff Accept 헤더를 주면 unified diff 본문을 돌려준다.
        let url = self.repo_url(owner, repo, &format!("pulls/{number}"));
        self.send(
            "github: fetch PR diff",
            self.request(Method::GET, url, DIFF_MEDIA_TYPE),
        )
        .await
    }

    async fn fetch_head_sha(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<String, RepositoryError> {
        let action = "github: fetch PR metadata";
        let url = self.repo_url(owner, repo, &format!("pulls/{number}"));
        let body = self
            .send(action, self.request(Method::GET, url, JSON_MEDIA_TYPE))
            .await?;
        let pr: PullResponse =
            serde_json::from_str(&body).map_err(|err| RepositoryError::Decode {
                action,
                message: err.to_string(),
            })?;
        Ok(pr.head.sha)
    }

    async fn post_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<PostedComment, RepositoryError> {
        let url = self.repo_url(owner, repo, &format!("issues/{number}/comments"));
        self.create_comment("github: create comment", url, json!({ "body": body }))
            .await
    }

    async fn post_inline_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        comment: &InlineComment,
    ) -> Result<PostedComment, RepositoryError> {
        let url = self.repo_url(owner, repo, &format!("pulls/{number}/comments"));
        self.create_comment(
            "github: create review comment",
            url,
            json!({
                "body": comment.body,
                "commit_id": comment.commit_id,
                "path": comment.path,
                "line": comment.line,
                "side": "RIGHT",
            }),
        )
        .await
    }
}
