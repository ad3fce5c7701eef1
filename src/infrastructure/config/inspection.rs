//! 적용 설정 진단(inspection) 뷰 모델. 비밀값은 출처만 노출한다.

use std::collections::BTreeMap;

use serde::Serialize;

use super::loader::LoadedConfig;
use super::resolve::{resolve_provider_api_key, resolve_static, resolve_webhook_secret};
use super::utils::command_exists;
use crate::application::config::{HostConfig, ProviderConfig};

#[derive(Debug, Clone, Serialize)]
pub struct ConfigInspection {
    pub searched_paths: Vec<String>,
    pub loaded_paths: Vec<String>,
    pub max_diff_bytes: usize,
    pub queue_url: String,
    pub max_attempts: u32,
    pub visibility_timeout_secs: u64,
    pub worker_concurrency: usize,
    pub bind: String,
    pub recorder_path: String,
    pub webhook_secret_source: Option<String>,
    pub hosts: BTreeMap<String, HostInspection>,
    pub providers: ProvidersInspection,
}

#[derive(Debug, Clone, Serialize)]
pub struct HostInspection {
    pub token_source: Option<String>,
    pub token_resolved: bool,
    pub api_base: Option<String>,
    pub installations: BTreeMap<String, Option<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvidersInspection {
    pub openai: Option<ProviderInspection>,
    pub gemini: Option<ProviderInspection>,
    pub local: Option<ProviderInspection>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderInspection {
    pub enabled: bool,
    pub model: Option<String>,
    pub api_base: Option<String>,
    pub command: Option<String>,
    pub command_available: bool,
    pub api_key_source: Option<String>,
    pub api_key_resolved: bool,
}

impl ConfigInspection {
    pub(crate) fn from_loaded(loaded: LoadedConfig) -> Self {
        let config = &loaded.config;
        let policy = config.queue_policy();
        let hosts = config
            .hosts
            .iter()
            .map(|(host, cfg)| (host.clone(), host_inspection(cfg)))
            .collect();

        Self {
            searched_paths: display_all(&loaded.searched_paths),
            loaded_paths: display_all(&loaded.loaded_paths),
            max_diff_bytes: config.max_diff_bytes(),
            queue_url: config.queue_url(),
            max_attempts: policy.max_attempts,
            visibility_timeout_secs: policy.visibility_timeout.as_secs(),
            worker_concurrency: config.worker_concurrency(),
            bind: config.bind_address(),
            recorder_path: config.recorder_path(),
            webhook_secret_source: resolve_webhook_secret(&config.server).source,
            hosts,
            providers: ProvidersInspection {
                openai: config.providers.openai.as_ref().map(ProviderInspection::from_config),
                gemini: config.providers.gemini.as_ref().map(ProviderInspection::from_config),
                local: config.providers.local.as_ref().map(|cfg| {
                    let mut inspection = ProviderInspection::from_config(cfg);
                    inspection.enabled = config.local_provider_enabled();
                    inspection
                }),
            },
        }
    }
}

impl ProviderInspection {
    fn from_config(cfg: &ProviderConfig) -> Self {
        let api = resolve_provider_api_key(cfg);
        let command = cfg.command_spec().map(|spec| spec.command);
        let command_available = command.as_deref().is_some_and(command_exists);

        Self {
            enabled: cfg.is_enabled(),
            model: cfg.model.clone(),
            api_base: cfg.api_base.clone(),
            command,
            command_available,
            api_key_resolved: api.value.is_some(),
            api_key_source: api.source,
        }
    }
}

fn host_inspection(cfg: &HostConfig) -> HostInspection {
    let default = resolve_static(&cfg.credential);
    HostInspection {
        token_resolved: default.value.is_some(),
        token_source: default.source,
        api_base: cfg.api_base.clone(),
        installations: cfg
            .installations
            .iter()
            .map(|(id, source)| (id.clone(), resolve_static(source).source))
            .collect(),
    }
}

fn display_all(paths: &[std::path::PathBuf]) -> Vec<String> {
    paths.iter().map(|p| p.display().to_string()).collect()
}
