//! 설정 값(token/env/cmd 등)을 실제 런타임 값으로 해석하는 유틸리티.
//!
//! - 환경변수/프로세스 실행은 인프라 계층에서만 수행한다.
//! - 토큰 명령은 비동기로만 실행된다. 진단 경로는 명령을 실행하지 않는다.

use std::env;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::process::Command;
use tracing::warn;

use crate::application::config::{CredentialSource, HostConfig, ProviderConfig, ServerConfig};

/// 해석된 값과 그 출처 라벨(진단용).
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub value: Option<String>,
    pub source: Option<String>,
}

/// 직접값 → 환경변수 순으로 해석한다. 토큰 명령은 라벨만 남기고 실행하지 않는다.
pub fn resolve_static(source: &CredentialSource) -> Resolution {
    if let Some(token) = trimmed(source.token.as_deref()) {
        return Resolution {
            value: Some(token.to_string()),
            source: Some("inline".to_string()),
        };
    }

    let mut env_hint = None;
    if let Some(env_name) = trimmed(source.token_env.as_deref()) {
        match read_env(env_name) {
            Some(v) => {
                return Resolution {
                    value: Some(v),
                    source: Some(format!("env:{env_name}")),
                };
            }
            None => env_hint = Some(format!("env:{env_name} (missing)")),
        }
    }

    Resolution {
        value: None,
        source: command_label(source).or(env_hint),
    }
}

/// 직접값 → 환경변수 → 명령 순으로 토큰을 해석한다.
/// 명령은 `command_timeout` 안에 끝나야 하며, 중간에 취소되면 자식 프로세스도 종료된다.
pub async fn resolve_credential(source: &CredentialSource, command_timeout: Duration) -> Resolution {
    let resolved = resolve_static(source);
    if resolved.value.is_some() {
        return resolved;
    }
    let Some(label) = command_label(source) else {
        return resolved;
    };
    let Some(cmd) = source.token_command.as_deref() else {
        return resolved;
    };

    let hint = match run_token_command(cmd, command_timeout).await {
        Ok(token) if !token.trim().is_empty() => {
            return Resolution {
                value: Some(token.trim().to_string()),
                source: Some(label),
            };
        }
        Ok(_) => format!("{label} (empty)"),
        Err(err) => {
            warn!(command = %label, error = %format!("{err:#}"), "token command failed");
            format!("{label} (failed)")
        }
    };
    Resolution {
        value: None,
        source: Some(hint),
    }
}

/// installation 전용 토큰을 먼저 찾고, 없으면 호스트 기본 토큰을 쓴다.
pub async fn resolve_installation_token(
    host_cfg: &HostConfig,
    installation_id: u64,
    command_timeout: Duration,
) -> Resolution {
    if let Some(source) = host_cfg.installations.get(&installation_id.to_string()) {
        let resolved = resolve_credential(source, command_timeout).await;
        if resolved.value.is_some() {
            return resolved;
        }
    }
    resolve_credential(&host_cfg.credential, command_timeout).await
}

/// Provider API key를 해석한다.
pub fn resolve_provider_api_key(cfg: &ProviderConfig) -> Resolution {
    resolve_static(&CredentialSource {
        token: cfg.api_key.clone(),
        token_env: cfg.api_key_env.clone(),
        token_command: None,
    })
}

/// 웹훅 서명 검증용 비밀값. 설정되지 않았으면 검증을 건너뛴다.
pub fn resolve_webhook_secret(cfg: &ServerConfig) -> Resolution {
    resolve_static(&CredentialSource {
        token: cfg.webhook_secret.clone(),
        token_env: cfg.webhook_secret_env.clone(),
        token_command: None,
    })
}

fn trimmed(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn read_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn command_label(source: &CredentialSource) -> Option<String> {
    source
        .token_command
        .as_ref()
        .filter(|v| v.iter().any(|s| !s.trim().is_empty()))
        .map(|cmd| format!("cmd:{}", cmd.join(" ")))
}

async fn run_token_command(cmd: &[String], after: Duration) -> Result<String> {
    let program = cmd
        .first()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .context("token_command is empty")?;

    let child = Command::new(&program)
        .args(&cmd[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to run token command: {program}"))?;

    let output = tokio::time::timeout(after, child.wait_with_output())
        .await
        .with_context(|| format!("token command timed out after {}s: {program}", after.as_secs()))?
        .with_context(|| format!("failed to read token command output: {program}"))?;

    if !output.status.success() {
        bail!("token command failed: {program} ({})", output.status);
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
