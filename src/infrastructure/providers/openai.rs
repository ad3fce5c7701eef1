//! OpenAI provider (chat completions API).

use anyhow::{Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use crate::application::config::Config;
use crate::domain::review::{ProviderResponse, ReviewRequest, TokenUsage};
use crate::infrastructure::config::resolve_provider_api_key;

use super::api_runner::{build_api_client, collect_text, send_json};
use super::{ReviewProvider, build_user_prompt};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI 호환 chat completions 엔드포인트 하나.
pub(super) struct ChatEndpoint {
    pub client: Client,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    /// `response_format: json_object` 지원 여부
    pub json_mode: bool,
}

impl ChatEndpoint {
    pub async fn complete(
        &self,
        provider_name: &str,
        request: &ReviewRequest,
    ) -> Result<ProviderResponse> {
        let endpoint = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let mut payload = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": build_user_prompt(request) }
            ]
        });
        if self.json_mode {
            payload["response_format"] = json!({ "type": "json_object" });
        }

        let mut http = self.client.post(endpoint).json(&payload);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = send_json(provider_name, "request chat completion", http).await?;
        let content = response
            .pointer("/choices/0/message/content")
            .map(collect_text)
            .unwrap_or_default()
            .trim()
            .to_string();
        if content.is_empty() {
            bail!("{provider_name}: empty response content");
        }

        Ok(ProviderResponse {
            content,
            usage: TokenUsage::from_parts(
                response.pointer("/usage/prompt_tokens").and_then(Value::as_u64),
                response
                    .pointer("/usage/completion_tokens")
                    .and_then(Value::as_u64),
                response.pointer("/usage/total_tokens").and_then(Value::as_u64),
            ),
        })
    }
}

pub struct OpenAiProvider {
    endpoint: ChatEndpoint,
}

impl OpenAiProvider {
    /// API key가 해석될 때만 provider를 활성화한다.
    pub fn from_config(config: &Config) -> Option<Self> {
        let provider = config.providers.openai.as_ref()?;
        if !provider.is_enabled() {
            return None;
        }
        let api_key = resolve_provider_api_key(provider).value?;

        Some(Self {
            endpoint: ChatEndpoint {
                client: build_api_client(),
                base_url: provider
                    .api_base
                    .clone()
                    .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
                model: provider
                    .model
                    .clone()
                    .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                api_key: Some(api_key),
                json_mode: true,
            },
        })
    }
}

#[async_trait]
impl ReviewProvider for OpenAiProvider {
    fn id(&self) -> &'static str {
        "openai"
    }

    fn name(&self) -> &'static str {
        "OpenAI"
    }

    async fn review(&self, request: &ReviewRequest) -> Result<ProviderResponse> {
        self.endpoint.complete(self.name(), request).await
    }
}
