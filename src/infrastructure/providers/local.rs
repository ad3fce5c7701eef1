//! 로컬 fine-tuned 모델 provider.
//! OpenAI 호환 추론 서버(vLLM/Ollama 등)나 로컬 추론 명령을 사용한다.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;

use crate::application::config::{Config, ProviderCommandSpec};
use crate::domain::review::{ProviderResponse, ReviewRequest};
use crate::infrastructure::config::{command_exists, resolve_provider_api_key};

use super::api_runner::build_api_client;
use super::command_runner::run_provider_command;
use super::openai::ChatEndpoint;
use super::{ReviewProvider, build_combined_prompt};

const DEFAULT_MODEL: &str = "local-finetuned";

enum LocalBackend {
    Http(ChatEndpoint),
    Command(ProviderCommandSpec),
}

pub struct LocalProvider {
    backend: LocalBackend,
}

impl LocalProvider {
    /// 명시적으로 켠 경우에만 호출된다. 실행 수단이 없으면 기동 오류다.
    pub fn from_config(config: &Config) -> Result<Self> {
        let provider = config
            .providers
            .local
            .as_ref()
            .context("local provider is enabled but not configured")?;

        if let Some(spec) = provider.command_spec() {
            if !command_exists(&spec.command) {
                bail!("local model command not found: '{}'", spec.command);
            }
            return Ok(Self {
                backend: LocalBackend::Command(spec),
            });
        }

        let base_url = provider
            .api_base
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .context("local provider needs either `api_base` or `command`")?;

        Ok(Self {
            backend: LocalBackend::Http(ChatEndpoint {
                client: build_api_client(),
                base_url: base_url.to_string(),
                model: provider
                    .model
                    .clone()
                    .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                api_key: resolve_provider_api_key(provider).value,
                json_mode: false,
            }),
        })
    }
}

#[async_trait]
impl ReviewProvider for LocalProvider {
    fn id(&self) -> &'static str {
        "local"
    }

    fn name(&self) -> &'static str {
        "Local model"
    }

    async fn review(&self, request: &ReviewRequest) -> Result<ProviderResponse> {
        match &self.backend {
            LocalBackend::Http(endpoint) => endpoint.complete(self.name(), request).await,
            LocalBackend::Command(spec) => {
                run_provider_command(self.name(), spec, &build_combined_prompt(request)).await
            }
        }
    }
}
