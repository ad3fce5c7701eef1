//! Provider 포트 구현 어댑터.
//! 모델 호출 오류는 여기서 degraded 리뷰로 바뀌어 파이프라인을 멈추지 않는다.

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use crate::application::config::Config;
use crate::application::ports::{ProviderAgent, ProviderFactory};
use crate::domain::policy::{degraded_result, interpret_review_output};
use crate::domain::review::{GeneratedReview, ReviewQuality, ReviewRequest, TokenUsage};
use crate::infrastructure::providers::{self, ReviewProvider};

/// 설정에서 provider 하나를 골라 포트로 감싼다.
pub struct ProviderFactoryAdapter;

impl ProviderFactory for ProviderFactoryAdapter {
    fn build(&self, config: &Config) -> Result<Box<dyn ProviderAgent>> {
        let inner = providers::select_provider(config)?;
        Ok(Box::new(ProviderAgentAdapter::new(
            inner,
            config.system_prompt(),
        )))
    }
}

/// 인프라 provider를 애플리케이션 포트로 감싸는 래퍼.
pub struct ProviderAgentAdapter {
    inner: Box<dyn ReviewProvider>,
    system_prompt: String,
}

impl ProviderAgentAdapter {
    pub fn new(inner: Box<dyn ReviewProvider>, system_prompt: String) -> Self {
        Self {
            inner,
            system_prompt,
        }
    }
}

#[async_trait]
impl ProviderAgent for ProviderAgentAdapter {
    fn id(&self) -> &'static str {
        self.inner.id()
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn generate_review(&self, diff: &str, context: &str) -> GeneratedReview {
        let request = ReviewRequest {
            context: context.to_string(),
            diff: diff.to_string(),
            system_prompt: self.system_prompt.clone(),
        };

        let (result, quality, usage) = match self.inner.review(&request).await {
            Ok(response) => {
                let (result, quality) = interpret_review_output(&response.content);
                (result, quality, response.usage)
            }
            Err(err) => {
                let reason = format!("{err:#}");
                warn!(provider = self.inner.id(), error = %reason, "provider call failed");
                (
                    degraded_result(""),
                    ReviewQuality::Degraded { reason },
                    TokenUsage::default(),
                )
            }
        };

        GeneratedReview {
            review_id: Uuid::new_v4().to_string(),
            provider: self.inner.id(),
            result,
            quality,
            usage,
        }
    }
}
