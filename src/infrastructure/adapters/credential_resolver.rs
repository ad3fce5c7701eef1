//! installation id → 저장소 토큰 해석 포트 구현.

use std::time::Duration;

use async_trait::async_trait;

use crate::application::config::{Config, GITHUB_HOST, HostConfig};
use crate::application::ports::CredentialResolver;
use crate::infrastructure::config::resolve_installation_token;

/// 설정(token/env/cmd)에 기반해 작업마다 토큰을 해석한다.
pub struct CredentialResolverAdapter {
    host: Option<HostConfig>,
    command_timeout: Duration,
}

impl CredentialResolverAdapter {
    pub fn from_config(config: &Config) -> Self {
        Self {
            host: config.host_config(GITHUB_HOST).cloned(),
            command_timeout: config.stage_timeouts().credential,
        }
    }
}

#[async_trait]
impl CredentialResolver for CredentialResolverAdapter {
    async fn resolve(&self, installation_id: u64) -> Option<String> {
        let host = self.host.as_ref()?;
        resolve_installation_token(host, installation_id, self.command_timeout)
            .await
            .value
    }
}
