//! 재시도 예산을 소진한 작업을 확인하는 유스케이스.

use anyhow::Result;

use crate::application::ports::TaskQueue;

pub struct ListDeadLettersUseCase<'a> {
    pub queue: &'a dyn TaskQueue,
}

impl<'a> ListDeadLettersUseCase<'a> {
    /// dead-letter 목록을 사람이 읽기 쉬운 JSON으로 반환한다.
    pub async fn execute(&self) -> Result<String> {
        let dead = self.queue.dead_letters().await?;
        Ok(serde_json::to_string_pretty(&dead)?)
    }
}
