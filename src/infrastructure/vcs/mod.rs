//! 저장소 호스트 연동 구현.

pub mod github;

pub use github::GitHubClient;

/// 호스트 이름과 설정 override로 REST API base URL을 정한다.
/// github.com은 공개 API, 그 외는 Enterprise 기본 경로를 사용한다.
pub fn github_api_base(host: &str, api_base: Option<&str>) -> String {
    if let Some(base) = api_base.map(str::trim).filter(|b| !b.is_empty()) {
        return base.trim_end_matches('/').to_string();
    }
    if host == "github.com" {
        "https://api.github.com".to_string()
    } else {
        format!("https://{host}/api/v3")
    }
}
