//! 작업 큐(broker) 구현.
//! `memory://`는 단일 프로세스용, `sqlite://path`는 여러 워커 프로세스가 공유하는 영속 큐다.

mod memory;
mod sqlite;

use std::sync::Arc;

use anyhow::{Result, bail};

use crate::application::config::QueuePolicy;
use crate::application::ports::TaskQueue;

pub use memory::MemoryQueue;
pub use sqlite::SqliteQueue;

const DEAD_LETTER_ON_EXPIRY: &str = "visibility timeout expired";

fn is_memory_url(url: &str) -> bool {
    url == "memory://" || url == "memory"
}

/// 독립 워커 프로세스는 다른 프로세스가 넣은 작업을 볼 수 있는 큐가 필요하다.
pub fn ensure_shared_queue(url: &str) -> Result<()> {
    if is_memory_url(url) {
        bail!(
            "queue url '{url}' is local to one process, so a standalone worker would never receive jobs; \
             use `reviewpilot serve` or set queue.url to sqlite://PATH"
        );
    }
    Ok(())
}

/// broker 주소에 맞는 큐를 연다. 알 수 없는 주소는 기동 오류다.
pub async fn open_queue(url: &str, policy: QueuePolicy) -> Result<Arc<dyn TaskQueue>> {
    if is_memory_url(url) {
        return Ok(Arc::new(MemoryQueue::new(policy)));
    }
    if url.starts_with("sqlite:") {
        return Ok(Arc::new(SqliteQueue::connect(url, policy).await?));
    }
    bail!("unsupported queue url '{url}' (expected memory:// or sqlite://PATH)")
}
