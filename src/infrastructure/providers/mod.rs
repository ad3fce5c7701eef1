//! review provider 구현 모음.
//! 원격 API(OpenAI/Gemini)와 로컬 fine-tuned 모델을 같은 인터페이스로 묶는다.

mod api_runner;
mod command_runner;
pub mod gemini;
pub mod local;
pub mod openai;
mod prompt;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tracing::info;

use crate::application::config::Config;
use crate::domain::review::{ProviderResponse, ReviewRequest};

pub use prompt::{build_combined_prompt, build_user_prompt};

#[async_trait]
pub trait ReviewProvider: Send + Sync {
    /// 내부 식별자(기록/로그 키)
    fn id(&self) -> &'static str;
    /// 사용자 표시 이름
    fn name(&self) -> &'static str;
    /// 리뷰 요청을 보내고 모델 원문을 돌려준다.
    async fn review(&self, request: &ReviewRequest) -> Result<ProviderResponse>;
}

/// 프로세스 기동 시 provider 하나를 고른다.
/// 우선순위: 명시적으로 켠 로컬 모델 → OpenAI → Gemini.
pub fn select_provider(config: &Config) -> Result<Box<dyn ReviewProvider>> {
    let provider: Box<dyn ReviewProvider> = if config.local_provider_enabled() {
        Box::new(local::LocalProvider::from_config(config)?)
    } else if let Some(provider) = openai::OpenAiProvider::from_config(config) {
        Box::new(provider)
    } else if let Some(provider) = gemini::GeminiProvider::from_config(config) {
        Box::new(provider)
    } else {
        bail!(
            "no review provider configured: enable the local model (USE_LOCAL_LLM) or set an OpenAI/Gemini API key"
        );
    };

    info!(provider = provider.id(), "review provider selected");
    Ok(provider)
}
