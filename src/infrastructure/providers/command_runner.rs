//! 로컬 추론 명령 실행기.

use std::process::Stdio;

use anyhow::{Context, Result, bail};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::application::config::ProviderCommandSpec;
use crate::domain::review::{ProviderResponse, TokenUsage};

/// 명령을 한 번 실행하고 stdout을 모델 응답으로 쓴다.
/// 인자에 `{prompt}`가 있으면 치환하고, 아니면 stdin 또는 마지막 인자로 넘긴다.
pub async fn run_provider_command(
    provider_name: &str,
    spec: &ProviderCommandSpec,
    prompt: &str,
) -> Result<ProviderResponse> {
    let mut prompt_in_args = false;
    let mut args: Vec<String> = spec
        .args
        .iter()
        .map(|arg| {
            if arg.contains("{prompt}") {
                prompt_in_args = true;
                arg.replace("{prompt}", prompt)
            } else {
                arg.clone()
            }
        })
        .collect();
    if !spec.use_stdin && !prompt_in_args {
        args.push(prompt.to_string());
    }

    let mut cmd = Command::new(&spec.command);
    cmd.args(&args)
        .stdin(if spec.use_stdin {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn {provider_name} command '{}'", spec.command))?;

    if spec.use_stdin {
        let mut stdin = child
            .stdin
            .take()
            .context("failed to open provider command stdin")?;
        stdin
            .write_all(prompt.as_bytes())
            .await
            .context("failed to write prompt to provider command stdin")?;
        drop(stdin);
    }

    let output = child
        .wait_with_output()
        .await
        .context("provider command execution failed")?;

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if !output.status.success() {
        let detail = if stderr.is_empty() {
            "no stderr output"
        } else {
            stderr.as_str()
        };
        bail!("{provider_name} command failed ({}): {detail}", output.status);
    }
    if stdout.is_empty() {
        bail!("{provider_name} command returned empty output");
    }

    Ok(ProviderResponse {
        content: stdout,
        usage: TokenUsage::default(),
    })
}
