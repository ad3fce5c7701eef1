//! 애플리케이션이 사용하는 설정 스키마(순수 데이터).
//!
//! 주의: 파일/환경변수/프로세스 접근은 `infrastructure`에서만 수행한다.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

pub const GITHUB_HOST: &str = "github.com";
pub const DEFAULT_MAX_DIFF_BYTES: usize = 120_000;
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert code reviewer. Review the diff and reply with a single JSON object: {\"summary\": string, \"suggestions\": [{\"file\": string, \"line\": number, \"comment\": string}]}. Do not add any text outside the JSON object.";
pub const DEFAULT_QUEUE_URL: &str = "memory://";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RECORDER_PATH: &str = "data/fine_tuning/reviews.jsonl";
pub const DEFAULT_BIND: &str = "0.0.0.0:10000";

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// 프롬프트/diff 기본값
    #[serde(default)]
    pub defaults: DefaultsConfig,
    /// 저장소 호스트별 인증/엔드포인트 설정
    #[serde(default)]
    pub hosts: HashMap<String, HostConfig>,
    /// review provider 설정
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// 작업 큐(broker) 설정
    #[serde(default)]
    pub queue: QueueConfig,
    /// 워커 동시성/타임아웃
    #[serde(default)]
    pub worker: WorkerConfig,
    /// 웹훅 수신 서버
    #[serde(default)]
    pub server: ServerConfig,
    /// 상호작용 기록 위치
    #[serde(default)]
    pub recorder: RecorderConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct DefaultsConfig {
    /// diff 최대 바이트
    pub max_diff_bytes: Option<usize>,
    /// 리뷰 시스템 프롬프트
    pub system_prompt: Option<String>,
}

/// 토큰을 직접값/환경변수/명령 중 하나로 지정한다.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct CredentialSource {
    /// 고정 토큰(민감정보: 권장하지 않음)
    pub token: Option<String>,
    /// 토큰을 읽을 환경변수 이름
    pub token_env: Option<String>,
    /// 토큰을 stdout으로 출력하는 커맨드(예: ["gh","auth","token"])
    pub token_command: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct HostConfig {
    #[serde(flatten)]
    pub credential: CredentialSource,
    /// API base URL override(선택)
    pub api_base: Option<String>,
    /// installation id별 토큰. 없으면 호스트 기본 토큰을 쓴다.
    #[serde(default)]
    pub installations: HashMap<String, CredentialSource>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ProvidersConfig {
    /// 1순위 원격 provider
    pub openai: Option<ProviderConfig>,
    /// 2순위 원격 provider
    pub gemini: Option<ProviderConfig>,
    /// 로컬 fine-tuned 모델(명시적으로 켠 경우에만 사용)
    pub local: Option<ProviderConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ProviderConfig {
    /// provider 활성화 여부
    pub enabled: Option<bool>,
    /// 모델 식별자
    pub model: Option<String>,
    /// API 베이스 URL
    pub api_base: Option<String>,
    /// API 인증 키(직접값)
    pub api_key: Option<String>,
    /// API 인증 키를 읽을 환경변수 이름
    pub api_key_env: Option<String>,
    /// 로컬 추론 명령(local 전용, 지정 시 HTTP 대신 사용)
    pub command: Option<String>,
    /// 명령 인자
    pub args: Option<Vec<String>>,
    /// 프롬프트를 stdin으로 전달할지 여부(기본 true)
    pub use_stdin: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ProviderCommandSpec {
    pub command: String,
    pub args: Vec<String>,
    pub use_stdin: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct QueueConfig {
    /// broker 주소 (`memory://` 또는 `sqlite://path`)
    pub url: Option<String>,
    pub max_attempts: Option<u32>,
    pub visibility_timeout_secs: Option<u64>,
    pub retry_backoff_secs: Option<u64>,
    pub poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct WorkerConfig {
    pub concurrency: Option<usize>,
    pub credential_timeout_secs: Option<u64>,
    pub fetch_timeout_secs: Option<u64>,
    pub generate_timeout_secs: Option<u64>,
    pub post_timeout_secs: Option<u64>,
    /// 요약 코멘트 뒤에 제안별 인라인 코멘트도 남길지 여부
    pub inline_suggestions: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ServerConfig {
    pub bind: Option<String>,
    /// `X-Hub-Signature-256` 검증용 비밀값(직접값)
    pub webhook_secret: Option<String>,
    /// 비밀값을 읽을 환경변수 이름
    pub webhook_secret_env: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RecorderConfig {
    pub path: Option<String>,
}

/// 큐 재시도 정책(해석된 값).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePolicy {
    pub max_attempts: u32,
    pub visibility_timeout: Duration,
    pub retry_backoff: Duration,
    pub poll_interval: Duration,
}

impl QueuePolicy {
    const MAX_BACKOFF: Duration = Duration::from_secs(600);

    /// `attempt`번째 실패 후 다음 전달까지의 대기 시간.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.retry_backoff
            .saturating_mul(1u32 << exp)
            .min(Self::MAX_BACKOFF)
    }
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            visibility_timeout: Duration::from_secs(600),
            retry_backoff: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// 워커 단계별 제한 시간(해석된 값).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    pub credential: Duration,
    pub fetch: Duration,
    pub generate: Duration,
    pub post: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            credential: Duration::from_secs(10),
            fetch: Duration::from_secs(30),
            generate: Duration::from_secs(180),
            post: Duration::from_secs(30),
        }
    }
}

impl StageTimeouts {
    /// 요약 코멘트 게시까지 걸릴 수 있는 최대 시간.
    pub fn through_post(&self) -> Duration {
        self.credential + self.fetch + self.generate + self.post
    }
}

impl Config {
    /// 설정 파일이 하나도 없을 때 쓰는 내장 기본값.
    pub fn builtin() -> Self {
        let mut hosts = HashMap::new();
        hosts.insert(
            GITHUB_HOST.to_string(),
            HostConfig {
                credential: CredentialSource {
                    token_env: Some("GITHUB_TOKEN".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            },
        );

        Self {
            hosts,
            providers: ProvidersConfig {
                openai: Some(ProviderConfig {
                    api_key_env: Some("OPENAI_API_KEY".to_string()),
                    model: Some("gpt-4o-mini".to_string()),
                    ..Default::default()
                }),
                gemini: Some(ProviderConfig {
                    api_key_env: Some("GEMINI_API_KEY".to_string()),
                    model: Some("gemini-1.5-flash".to_string()),
                    ..Default::default()
                }),
                local: Some(ProviderConfig {
                    api_base: Some("http://127.0.0.1:8000/v1".to_string()),
                    model: Some("local-finetuned".to_string()),
                    ..Default::default()
                }),
            },
            server: ServerConfig {
                webhook_secret_env: Some("REVIEWPILOT_WEBHOOK_SECRET".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn max_diff_bytes(&self) -> usize {
        self.defaults
            .max_diff_bytes
            .unwrap_or(DEFAULT_MAX_DIFF_BYTES)
    }

    pub fn system_prompt(&self) -> String {
        self.defaults
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string())
    }

    pub fn host_config(&self, host: &str) -> Option<&HostConfig> {
        self.hosts.get(host)
    }

    pub fn queue_url(&self) -> String {
        self.queue
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_QUEUE_URL.to_string())
    }

    pub fn queue_policy(&self) -> QueuePolicy {
        let base = QueuePolicy::default();
        QueuePolicy {
            max_attempts: self.queue.max_attempts.unwrap_or(base.max_attempts).max(1),
            visibility_timeout: self
                .queue
                .visibility_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(base.visibility_timeout),
            retry_backoff: self
                .queue
                .retry_backoff_secs
                .map(Duration::from_secs)
                .unwrap_or(base.retry_backoff),
            poll_interval: self
                .queue
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(base.poll_interval),
        }
    }

    pub fn stage_timeouts(&self) -> StageTimeouts {
        let base = StageTimeouts::default();
        StageTimeouts {
            credential: self
                .worker
                .credential_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(base.credential),
            fetch: self
                .worker
                .fetch_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(base.fetch),
            generate: self
                .worker
                .generate_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(base.generate),
            post: self
                .worker
                .post_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(base.post),
        }
    }

    /// 게시 단계까지의 timeout 합은 lease보다 짧아야 한다.
    pub fn check_lease_budget(&self) -> Result<()> {
        let needed = self.stage_timeouts().through_post();
        let lease = self.queue_policy().visibility_timeout;
        ensure!(
            needed < lease,
            "stage timeouts add up to {}s but queue.visibility_timeout_secs is {}s; raise the visibility timeout or lower worker timeouts",
            needed.as_secs(),
            lease.as_secs()
        );
        Ok(())
    }

    pub fn worker_concurrency(&self) -> usize {
        self.worker.concurrency.unwrap_or(2).max(1)
    }

    pub fn inline_suggestions(&self) -> bool {
        self.worker.inline_suggestions.unwrap_or(false)
    }

    pub fn bind_address(&self) -> String {
        self.server
            .bind
            .clone()
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
    }

    pub fn recorder_path(&self) -> String {
        self.recorder
            .path
            .clone()
            .unwrap_or_else(|| DEFAULT_RECORDER_PATH.to_string())
    }

    /// 로컬 모델 provider를 명시적으로 켰는지 여부.
    pub fn local_provider_enabled(&self) -> bool {
        self.providers
            .local
            .as_ref()
            .and_then(|p| p.enabled)
            .unwrap_or(false)
    }

    /// 후순위(나중 파일) 값으로 덮어쓰는 병합 규칙.
    pub fn merge_from(&mut self, other: Config) {
        self.defaults.merge_from(other.defaults);

        for (host, incoming) in other.hosts {
            if let Some(existing) = self.hosts.get_mut(&host) {
                existing.merge_from(incoming);
            } else {
                self.hosts.insert(host, incoming);
            }
        }

        self.providers.merge_from(other.providers);
        self.queue.merge_from(other.queue);
        self.worker.merge_from(other.worker);
        self.server.merge_from(other.server);
        if other.recorder.path.is_some() {
            self.recorder.path = other.recorder.path;
        }
    }
}

fn overwrite<T>(target: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *target = incoming;
    }
}

impl DefaultsConfig {
    pub fn merge_from(&mut self, other: DefaultsConfig) {
        overwrite(&mut self.max_diff_bytes, other.max_diff_bytes);
        overwrite(&mut self.system_prompt, other.system_prompt);
    }
}

impl CredentialSource {
    pub fn merge_from(&mut self, other: CredentialSource) {
        overwrite(&mut self.token, other.token);
        overwrite(&mut self.token_env, other.token_env);
        overwrite(&mut self.token_command, other.token_command);
    }
}

impl HostConfig {
    pub fn merge_from(&mut self, other: HostConfig) {
        self.credential.merge_from(other.credential);
        overwrite(&mut self.api_base, other.api_base);
        for (id, incoming) in other.installations {
            self.installations
                .entry(id)
                .or_default()
                .merge_from(incoming);
        }
    }
}

impl ProviderConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// 로컬 추론 명령 사양. `command`가 없으면 HTTP 모드다.
    pub fn command_spec(&self) -> Option<ProviderCommandSpec> {
        let command = self
            .command
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())?;

        Some(ProviderCommandSpec {
            command: command.to_string(),
            args: self.args.clone().unwrap_or_default(),
            use_stdin: self.use_stdin.unwrap_or(true),
        })
    }

    pub fn merge_from(&mut self, other: ProviderConfig) {
        overwrite(&mut self.enabled, other.enabled);
        overwrite(&mut self.model, other.model);
        overwrite(&mut self.api_base, other.api_base);
        overwrite(&mut self.api_key, other.api_key);
        overwrite(&mut self.api_key_env, other.api_key_env);
        overwrite(&mut self.command, other.command);
        overwrite(&mut self.args, other.args);
        overwrite(&mut self.use_stdin, other.use_stdin);
    }
}

impl ProvidersConfig {
    pub fn merge_from(&mut self, other: ProvidersConfig) {
        merge_provider_config(&mut self.openai, other.openai);
        merge_provider_config(&mut self.gemini, other.gemini);
        merge_provider_config(&mut self.local, other.local);
    }
}

impl QueueConfig {
    pub fn merge_from(&mut self, other: QueueConfig) {
        overwrite(&mut self.url, other.url);
        overwrite(&mut self.max_attempts, other.max_attempts);
        overwrite(&mut self.visibility_timeout_secs, other.visibility_timeout_secs);
        overwrite(&mut self.retry_backoff_secs, other.retry_backoff_secs);
        overwrite(&mut self.poll_interval_ms, other.poll_interval_ms);
    }
}

impl WorkerConfig {
    pub fn merge_from(&mut self, other: WorkerConfig) {
        overwrite(&mut self.concurrency, other.concurrency);
        overwrite(&mut self.credential_timeout_secs, other.credential_timeout_secs);
        overwrite(&mut self.fetch_timeout_secs, other.fetch_timeout_secs);
        overwrite(&mut self.generate_timeout_secs, other.generate_timeout_secs);
        overwrite(&mut self.post_timeout_secs, other.post_timeout_secs);
        overwrite(&mut self.inline_suggestions, other.inline_suggestions);
    }
}

impl ServerConfig {
    pub fn merge_from(&mut self, other: ServerConfig) {
        overwrite(&mut self.bind, other.bind);
        overwrite(&mut self.webhook_secret, other.webhook_secret);
        overwrite(&mut self.webhook_secret_env, other.webhook_secret_env);
    }
}

fn merge_provider_config(target: &mut Option<ProviderConfig>, incoming: Option<ProviderConfig>) {
    match (target.as_mut(), incoming) {
        (Some(existing), Some(next)) => existing.merge_from(next),
        (None, Some(next)) => *target = Some(next),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_file_overrides_field_by_field() {
        let mut config = Config::builtin();
        let incoming: Config = serde_json::from_str(
            r#"{
                "queue": { "url": "sqlite://queue.db", "max_attempts": 5 },
                "providers": { "openai": { "model": "gpt-4.1" } },
                "hosts": { "github.com": { "installations": { "42": { "token_env": "ACME_TOKEN" } } } }
            }"#,
        )
        .unwrap();

        config.merge_from(incoming);

        assert_eq!(config.queue_url(), "sqlite://queue.db");
        assert_eq!(config.queue_policy().max_attempts, 5);
        let openai = config.providers.openai.as_ref().unwrap();
        assert_eq!(openai.model.as_deref(), Some("gpt-4.1"));
        assert_eq!(openai.api_key_env.as_deref(), Some("OPENAI_API_KEY"));

        let github = config.host_config(GITHUB_HOST).unwrap();
        assert_eq!(github.credential.token_env.as_deref(), Some("GITHUB_TOKEN"));
        assert_eq!(
            github.installations["42"].token_env.as_deref(),
            Some("ACME_TOKEN")
        );
    }

    #[test]
    fn local_provider_requires_explicit_enable() {
        let mut config = Config::builtin();
        assert!(!config.local_provider_enabled());

        config.providers.local.as_mut().unwrap().enabled = Some(true);
        assert!(config.local_provider_enabled());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = QueuePolicy {
            retry_backoff: Duration::from_secs(10),
            ..QueuePolicy::default()
        };
        assert_eq!(policy.backoff_for(1), Duration::from_secs(10));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(20));
        assert_eq!(policy.backoff_for(3), Duration::from_secs(40));
        assert_eq!(policy.backoff_for(30), Duration::from_secs(600));
    }

    #[test]
    fn default_timeouts_fit_inside_the_lease() {
        assert!(Config::builtin().check_lease_budget().is_ok());
    }

    #[test]
    fn timeouts_longer_than_the_lease_are_rejected() {
        let mut config = Config::builtin();
        config.queue.visibility_timeout_secs = Some(60);
        config.worker.generate_timeout_secs = Some(60);

        let err = config.check_lease_budget().unwrap_err();
        assert!(err.to_string().contains("visibility_timeout_secs is 60s"));
    }
}
