//! 설정 파일 탐색/병합 로더.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::application::config::{Config, ProviderConfig};

const CONFIG_ENV: &str = "REVIEWPILOT_CONFIG";
const QUEUE_URL_ENV: &str = "REVIEWPILOT_QUEUE_URL";
const USE_LOCAL_LLM_ENV: &str = "USE_LOCAL_LLM";

#[derive(Debug, Clone)]
pub(crate) struct LoadedConfig {
    pub config: Config,
    pub searched_paths: Vec<PathBuf>,
    pub loaded_paths: Vec<PathBuf>,
}

/// 우선순위 경로를 순회해 JSON 설정을 병합하고 환경변수 override를 적용한다.
pub(crate) fn load_merged_config() -> Result<LoadedConfig> {
    let paths = config_paths();
    let (mut config, loaded_paths) = load_from_paths(&paths)?;
    apply_env_overrides(&mut config);

    Ok(LoadedConfig {
        config,
        searched_paths: paths,
        loaded_paths,
    })
}

/// 내장 기본값 위에 주어진 파일들을 순서대로 병합한다. 없는 파일은 건너뛴다.
pub fn load_from_paths(paths: &[PathBuf]) -> Result<(Config, Vec<PathBuf>)> {
    // 낮은 우선순위에서 높은 우선순위 순서로 병합한다.
    let mut merged = Config::builtin();
    let mut loaded = Vec::new();

    for path in paths {
        if !path.exists() {
            continue;
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let parsed: Config = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse JSON in {}", path.display()))?;
        merged.merge_from(parsed);
        loaded.push(path.clone());
    }

    Ok((merged, loaded))
}

/// 기본 + 사용자 + 프로젝트 + 명시 경로 순으로 병합 경로를 구성한다.
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/reviewpilot/config.json")];

    if let Some(base) = dirs::config_dir() {
        paths.push(base.join("reviewpilot").join("config.json"));
    }

    paths.push(PathBuf::from(".reviewpilot/config.json"));

    if let Ok(path) = env::var(CONFIG_ENV) {
        paths.push(Path::new(&path).to_path_buf());
    }

    dedup_paths(paths)
}

fn apply_env_overrides(config: &mut Config) {
    if let Some(url) = non_empty_env(QUEUE_URL_ENV) {
        config.queue.url = Some(url);
    }

    if non_empty_env(USE_LOCAL_LLM_ENV).is_some_and(|v| is_truthy(&v)) {
        config
            .providers
            .local
            .get_or_insert_with(ProviderConfig::default)
            .enabled = Some(true);
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn dedup_paths(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for p in paths {
        if !out.contains(&p) {
            out.push(p);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_files_fall_back_to_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let (config, loaded) = load_from_paths(&[dir.path().join("absent.json")]).unwrap();

        assert!(loaded.is_empty());
        assert_eq!(config.queue_url(), "memory://");
        assert!(config.providers.openai.is_some());
    }

    #[test]
    fn later_paths_win() {
        let dir = tempfile::tempdir().unwrap();
        let low = dir.path().join("low.json");
        let high = dir.path().join("high.json");
        fs::write(&low, r#"{"worker": {"concurrency": 4}, "queue": {"url": "sqlite://a.db"}}"#).unwrap();
        fs::write(&high, r#"{"queue": {"url": "sqlite://b.db"}}"#).unwrap();

        let (config, loaded) = load_from_paths(&[low.clone(), high.clone()]).unwrap();

        assert_eq!(loaded, vec![low, high]);
        assert_eq!(config.queue_url(), "sqlite://b.db");
        assert_eq!(config.worker_concurrency(), 4);
    }

    #[test]
    fn invalid_json_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();

        let err = load_from_paths(&[broken]).unwrap_err();
        assert!(format!("{err:#}").contains("broken.json"));
    }

    #[test]
    fn truthy_values() {
        assert!(is_truthy("1"));
        assert!(is_truthy("TRUE"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy("false"));
    }
}
