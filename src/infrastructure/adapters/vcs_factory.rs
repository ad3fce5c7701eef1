//! 저장소 클라이언트 팩토리 포트 구현 어댑터.

use reqwest::Client;

use crate::application::config::{Config, GITHUB_HOST};
use crate::application::ports::{RepositoryClient, RepositoryFactory};
use crate::infrastructure::vcs::{self, GitHubClient};

/// 토큰별 GitHub 클라이언트를 만든다. HTTP 연결 풀은 공유한다.
pub struct GitHubRepositoryFactory {
    client: Client,
    api_base: String,
}

impl GitHubRepositoryFactory {
    pub fn from_config(config: &Config) -> Self {
        let api_base = config
            .host_config(GITHUB_HOST)
            .and_then(|h| h.api_base.as_deref());
        Self::new(vcs::github_api_base(GITHUB_HOST, api_base))
    }

    pub fn new(api_base: String) -> Self {
        Self {
            client: Client::new(),
            api_base,
        }
    }
}

impl RepositoryFactory for GitHubRepositoryFactory {
    fn build(&self, token: String) -> Box<dyn RepositoryClient> {
        Box::new(GitHubClient::new(
            self.client.clone(),
            self.api_base.clone(),
            token,
        ))
    }
}
