//! 적용될 설정과 그 설정으로 선택될 provider를 보여주는 유스케이스.

use anyhow::{Context, Result};
use serde_json::{Value, json};

use crate::application::ports::{ConfigRepository, ProviderFactory};

pub struct InspectConfigUseCase<'a> {
    pub config_repo: &'a dyn ConfigRepository,
    pub provider_factory: &'a dyn ProviderFactory,
}

impl<'a> InspectConfigUseCase<'a> {
    /// 자격증명은 출처만 보여준다. provider를 고를 수 없으면 그 이유를 함께 싣는다.
    pub fn execute(&self) -> Result<String> {
        let mut report: Value = serde_json::from_str(&self.config_repo.inspect_pretty_json()?)
            .context("config inspection is not valid JSON")?;

        let config = self.config_repo.load()?;
        let selected = match self.provider_factory.build(&config) {
            Ok(agent) => json!({ "id": agent.id(), "name": agent.name() }),
            Err(err) => json!({ "error": format!("{err:#}") }),
        };
        if let Value::Object(map) = &mut report {
            map.insert("selected_provider".to_string(), selected);
        }

        serde_json::to_string_pretty(&report).context("failed to encode config report")
    }
}

#[cfg(test)]
mod tests {
    use anyhow::bail;
    use async_trait::async_trait;

    use super::*;
    use crate::application::config::Config;
    use crate::application::ports::ProviderAgent;
    use crate::domain::review::GeneratedReview;

    struct FixedRepo;

    impl ConfigRepository for FixedRepo {
        fn load(&self) -> Result<Config> {
            Ok(Config::builtin())
        }

        fn inspect_pretty_json(&self) -> Result<String> {
            Ok(r#"{ "config_paths": [] }"#.to_string())
        }
    }

    struct NoProvider;

    impl ProviderFactory for NoProvider {
        fn build(&self, _config: &Config) -> Result<Box<dyn ProviderAgent>> {
            bail!("no review provider is configured")
        }
    }

    struct Named;

    #[async_trait]
    impl ProviderAgent for Named {
        fn id(&self) -> &'static str {
            "openai"
        }

        fn name(&self) -> &'static str {
            "OpenAI"
        }

        async fn generate_review(&self, _diff: &str, _context: &str) -> GeneratedReview {
            unreachable!("inspection never generates a review")
        }
    }

    struct AlwaysNamed;

    impl ProviderFactory for AlwaysNamed {
        fn build(&self, _config: &Config) -> Result<Box<dyn ProviderAgent>> {
            Ok(Box::new(Named))
        }
    }

    #[test]
    fn reports_selected_provider() {
        let out = InspectConfigUseCase {
            config_repo: &FixedRepo,
            provider_factory: &AlwaysNamed,
        }
        .execute()
        .unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["selected_provider"]["id"], "openai");
        assert!(value["config_paths"].is_array());
    }

    #[test]
    fn reports_why_no_provider_was_selected() {
        let out = InspectConfigUseCase {
            config_repo: &FixedRepo,
            provider_factory: &NoProvider,
        }
        .execute()
        .unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(
            value["selected_provider"]["error"],
            "no review provider is configured"
        );
    }
}
