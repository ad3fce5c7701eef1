//! Provider 공통 프롬프트 구성.

use crate::domain::review::ReviewRequest;

/// 사용자 메시지: 저장소 컨텍스트와 diff.
pub fn build_user_prompt(request: &ReviewRequest) -> String {
    format!(
        "Context: {}\n\nReview the following diff. Return a JSON object with a summary and a list of suggestions (file, line, comment).\n\n```diff\n{}\n```",
        request.context, request.diff
    )
}

/// system 역할을 따로 받지 않는 backend(명령 실행 등)용 단일 프롬프트.
pub fn build_combined_prompt(request: &ReviewRequest) -> String {
    format!(
        "System instructions:\n{}\n\n{}",
        request.system_prompt,
        build_user_prompt(request)
    )
}
