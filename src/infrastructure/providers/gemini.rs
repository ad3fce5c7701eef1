//! Google Gemini provider (generateContent API).

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use url::Url;

use crate::application::config::Config;
use crate::domain::review::{ProviderResponse, ReviewRequest, TokenUsage};
use crate::infrastructure::config::resolve_provider_api_key;

use super::api_runner::{build_api_client, collect_text, send_json};
use super::{ReviewProvider, build_user_prompt};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";

pub struct GeminiProvider {
    client: Client,
    base_url: String,
    model: String,
    credential: String,
}

impl GeminiProvider {
    /// API key가 해석될 때만 provider를 활성화한다.
    pub fn from_config(config: &Config) -> Option<Self> {
        let provider = config.providers.gemini.as_ref()?;
        if !provider.is_enabled() {
            return None;
        }
        let credential = resolve_provider_api_key(provider).value?;

        Some(Self {
            client: build_api_client(),
            base_url: provider
                .api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: provider
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            credential,
        })
    }

    fn endpoint(&self) -> Result<Url> {
        let raw = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        Url::parse(&raw).with_context(|| format!("invalid Gemini endpoint: {raw}"))
    }
}

#[async_trait]
impl ReviewProvider for GeminiProvider {
    fn id(&self) -> &'static str {
        "gemini"
    }

    fn name(&self) -> &'static str {
        "Gemini"
    }

    async fn review(&self, request: &ReviewRequest) -> Result<ProviderResponse> {
        let payload = json!({
            "systemInstruction": { "parts": [{ "text": request.system_prompt }] },
            "contents": [{ "role": "user", "parts": [{ "text": build_user_prompt(request) }] }],
            "generationConfig": { "responseMimeType": "application/json" }
        });

        // API key(AIza...)는 query로, 그 외 토큰은 Bearer로 보낸다.
        let mut url = self.endpoint()?;
        let http = if self.credential.starts_with("AIza") {
            url.query_pairs_mut().append_pair("key", &self.credential);
            self.client.post(url)
        } else {
            self.client.post(url).bearer_auth(&self.credential)
        };

        let response = send_json(self.name(), "request Gemini API", http.json(&payload)).await?;
        let content = response
            .pointer("/candidates/0/content")
            .map(collect_text)
            .unwrap_or_default()
            .trim()
            .to_string();
        if content.is_empty() {
            bail!("Gemini: empty response content");
        }

        Ok(ProviderResponse {
            content,
            usage: TokenUsage::from_parts(
                response
                    .pointer("/usageMetadata/promptTokenCount")
                    .and_then(Value::as_u64),
                response
                    .pointer("/usageMetadata/candidatesTokenCount")
                    .and_then(Value::as_u64),
                response
                    .pointer("/usageMetadata/totalTokenCount")
                    .and_then(Value::as_u64),
            ),
        })
    }
}
