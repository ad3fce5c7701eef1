//! 설정 모듈 공용 유틸리티.

use std::env;
use std::path::Path;

/// 로컬 추론 명령이 실행 가능한지 확인한다.
/// 경로가 주어지면 파일 존재만, 이름만 주어지면 `PATH`를 순회한다.
pub fn command_exists(command: &str) -> bool {
    let command = command.trim();
    if command.is_empty() {
        return false;
    }

    let as_path = Path::new(command);
    if as_path.components().count() > 1 {
        return as_path.is_file();
    }

    env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).any(|dir| dir.join(command).is_file()))
        .unwrap_or(false)
}
