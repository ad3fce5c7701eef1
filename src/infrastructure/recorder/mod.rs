//! 재학습용 상호작용 로그(JSON Lines) 저장소.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::application::error::StorageError;
use crate::application::ports::InteractionRecorder;
use crate::domain::interaction::InteractionRecord;

/// 한 줄 = 한 기록. 쓰기는 파일 배타 잠금(OS advisory lock) 아래에서 이루어지므로
/// 같은 파일을 공유하는 서버/워커 프로세스가 동시에 기록해도 줄이 섞이지 않는다.
pub struct JsonlRecorder {
    path: Arc<PathBuf>,
    write_lock: Mutex<()>,
}

impl JsonlRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 저장된 기록을 순서대로 읽는다. 파일이 없으면 빈 목록이다.
    pub async fn read_all(&self) -> Result<Vec<InteractionRecord>, StorageError> {
        let path = self.path.clone();
        let raw = match blocking(move || read_shared(&path)).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(self.io_error(source)),
        };

        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(StorageError::from))
            .collect()
    }

    fn io_error(&self, source: io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl InteractionRecorder for JsonlRecorder {
    async fn append(&self, record: &InteractionRecord) -> Result<(), StorageError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let path = self.path.clone();
        blocking(move || append_locked(&path, line.as_bytes()))
            .await
            .map_err(|source| self.io_error(source))
    }
}

async fn blocking<T: Send + 'static>(
    f: impl FnOnce() -> io::Result<T> + Send + 'static,
) -> io::Result<T> {
    tokio::task::spawn_blocking(f).await.map_err(io::Error::other)?
}

/// 배타 잠금을 잡은 채 한 줄을 끝까지 쓴다. 잠금은 `file`이 닫힐 때 풀린다.
fn append_locked(path: &Path, line: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.lock()?;
    file.write_all(line)?;
    file.sync_data()
}

fn read_shared(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    file.lock_shared()?;
    let mut raw = String::new();
    file.read_to_string(&mut raw)?;
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::domain::interaction::Feedback;

    fn feedback(n: usize) -> InteractionRecord {
        InteractionRecord::for_feedback(&Feedback {
            review_id: format!("rev-{n}"),
            rating: 5,
            comment: "x".repeat(2048),
        })
    }

    #[tokio::test]
    async fn creates_parent_directories_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = JsonlRecorder::new(dir.path().join("data/fine_tuning/reviews.jsonl"));

        recorder.append(&feedback(1)).await.unwrap();
        recorder.append(&feedback(2)).await.unwrap();

        let records = recorder.read_all().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].review_id(), Some("rev-1"));
        assert_eq!(records[1].review_id(), Some("rev-2"));
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = JsonlRecorder::new(dir.path().join("none.jsonl"));
        assert!(recorder.read_all().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_keep_lines_whole() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Arc::new(JsonlRecorder::new(dir.path().join("reviews.jsonl")));

        let tasks: Vec<_> = (0..32)
            .map(|n| {
                let recorder = recorder.clone();
                tokio::spawn(async move { recorder.append(&feedback(n)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let raw = std::fs::read_to_string(recorder.path()).unwrap();
        assert_eq!(raw.lines().count(), 32);
        for line in raw.lines() {
            serde_json::from_str::<InteractionRecord>(line).unwrap();
        }
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn append_waits_for_a_lock_held_elsewhere() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reviews.jsonl");
        let recorder = Arc::new(JsonlRecorder::new(&path));

        // 별도 핸들의 잠금은 다른 프로세스가 잡은 잠금과 같은 효과를 낸다.
        let holder = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .unwrap();
        holder.lock().unwrap();

        let writer = {
            let recorder = recorder.clone();
            tokio::spawn(async move { recorder.append(&feedback(1)).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        assert!(!writer.is_finished(), "append must wait for the file lock");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");

        holder.unlock().unwrap();
        writer.await.unwrap().unwrap();

        let records = recorder.read_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].review_id(), Some("rev-1"));
    }

    #[tokio::test]
    async fn unwritable_path_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "").unwrap();
        let recorder = JsonlRecorder::new(blocker.join("reviews.jsonl"));

        let err = recorder.append(&feedback(1)).await.unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));
    }
}
