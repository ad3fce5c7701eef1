use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::info;

use super::DEAD_LETTER_ON_EXPIRY;
use crate::application::config::QueuePolicy;
use crate::application::ports::TaskQueue;
use crate::domain::job::{DeadLetter, Delivery, FailureDisposition, JobHandle, ReviewJob};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS review_jobs (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    owner           TEXT    NOT NULL,
    repo            TEXT    NOT NULL,
    pr_number       INTEGER NOT NULL,
    installation_id INTEGER NOT NULL,
    enqueued_at     TEXT    NOT NULL,
    state           TEXT    NOT NULL DEFAULT 'ready',
    attempts        INTEGER NOT NULL DEFAULT 0,
    available_at    INTEGER NOT NULL,
    last_error      TEXT
);
CREATE INDEX IF NOT EXISTS review_jobs_visible ON review_jobs (state, available_at, id);
"#;

/// SQLite 파일에 상태를 두는 영속 큐. 여러 프로세스가 같은 파일을 공유할 수 있다.
/// 시각은 모두 epoch 밀리초(벽시계)로 저장한다.
pub struct SqliteQueue {
    pool: SqlitePool,
    policy: QueuePolicy,
}

impl SqliteQueue {
    pub async fn connect(url: &str, policy: QueuePolicy) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("invalid sqlite url '{url}'"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open queue database {url}"))?;

        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .context("failed to prepare queue schema")?;
        info!(%url, "sqlite queue ready");

        Ok(Self { pool, policy })
    }

    async fn expire_leases(&self, now: i64) -> Result<()> {
        sqlx::query(
            "UPDATE review_jobs SET state = 'dead', last_error = ?1
             WHERE state = 'leased' AND available_at <= ?2 AND attempts >= ?3",
        )
        .bind(DEAD_LETTER_ON_EXPIRY)
        .bind(now)
        .bind(i64::from(self.policy.max_attempts))
        .execute(&self.pool)
        .await
        .context("failed to dead-letter expired leases")?;

        sqlx::query(
            "UPDATE review_jobs SET state = 'ready'
             WHERE state = 'leased' AND available_at <= ?1",
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .context("failed to release expired leases")?;
        Ok(())
    }

    async fn try_claim(&self) -> Result<Option<Delivery>> {
        let now = now_millis();
        self.expire_leases(now).await?;

        let lease_until = now + duration_millis(self.policy.visibility_timeout);
        // 한 문장으로 고르고 잠그므로 두 소비자가 같은 행을 가져갈 수 없다.
        let row = sqlx::query(
            "UPDATE review_jobs
             SET state = 'leased', attempts = attempts + 1, available_at = ?1
             WHERE id = (
                 SELECT id FROM review_jobs
                 WHERE state = 'ready' AND available_at <= ?2
                 ORDER BY available_at, id
                 LIMIT 1
             )
             RETURNING id, owner, repo, pr_number, installation_id, enqueued_at, attempts",
        )
        .bind(lease_until)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .context("failed to claim job")?;

        row.map(|row| -> Result<Delivery> {
            Ok(Delivery {
                handle: JobHandle(row.try_get("id")?),
                job: job_from_row(&row)?,
                attempt: attempts_from_row(&row)?,
            })
        })
        .transpose()
    }

    async fn current_attempts(&self, delivery: &Delivery) -> Result<u32> {
        let row = sqlx::query(
            "SELECT attempts FROM review_jobs WHERE id = ?1 AND state = 'leased' AND attempts = ?2",
        )
        .bind(delivery.handle.0)
        .bind(i64::from(delivery.attempt))
        .fetch_optional(&self.pool)
        .await
        .context("failed to look up lease")?;

        match row {
            Some(row) => attempts_from_row(&row),
            None => bail!(
                "{} attempt {} no longer holds a lease",
                delivery.handle,
                delivery.attempt
            ),
        }
    }
}

#[async_trait]
impl TaskQueue for SqliteQueue {
    async fn enqueue(&self, job: ReviewJob) -> Result<JobHandle> {
        let id: i64 = sqlx::query(
            "INSERT INTO review_jobs (owner, repo, pr_number, installation_id, enqueued_at, available_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             RETURNING id",
        )
        .bind(&job.owner)
        .bind(&job.repo)
        .bind(to_i64(job.pr_number)?)
        .bind(to_i64(job.installation_id)?)
        .bind(job.enqueued_at.to_rfc3339())
        .bind(now_millis())
        .fetch_one(&self.pool)
        .await
        .context("failed to insert job")?
        .try_get("id")?;

        Ok(JobHandle(id))
    }

    async fn dequeue(&self) -> Result<Delivery> {
        loop {
            if let Some(delivery) = self.try_claim().await? {
                return Ok(delivery);
            }
            tokio::time::sleep(self.policy.poll_interval).await;
        }
    }

    async fn try_dequeue(&self) -> Result<Option<Delivery>> {
        self.try_claim().await
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let result = sqlx::query(
            "DELETE FROM review_jobs WHERE id = ?1 AND state = 'leased' AND attempts = ?2",
        )
        .bind(delivery.handle.0)
        .bind(i64::from(delivery.attempt))
        .execute(&self.pool)
        .await
        .context("failed to ack job")?;

        if result.rows_affected() == 0 {
            bail!(
                "{} attempt {} no longer holds a lease",
                delivery.handle,
                delivery.attempt
            );
        }
        Ok(())
    }

    async fn fail(&self, delivery: &Delivery, reason: &str) -> Result<FailureDisposition> {
        let attempts = self.current_attempts(delivery).await?;

        let (state, available_at, disposition) = if attempts >= self.policy.max_attempts {
            ("dead", now_millis(), FailureDisposition::DeadLettered)
        } else {
            let delay = self.policy.backoff_for(attempts);
            (
                "ready",
                now_millis() + duration_millis(delay),
                FailureDisposition::Retrying {
                    next_attempt: attempts + 1,
                    delay_ms: delay.as_millis() as u64,
                },
            )
        };

        let result = sqlx::query(
            "UPDATE review_jobs SET state = ?1, available_at = ?2, last_error = ?3
             WHERE id = ?4 AND state = 'leased' AND attempts = ?5",
        )
        .bind(state)
        .bind(available_at)
        .bind(reason)
        .bind(delivery.handle.0)
        .bind(i64::from(delivery.attempt))
        .execute(&self.pool)
        .await
        .context("failed to record job failure")?;

        if result.rows_affected() == 0 {
            bail!("{} lease was lost while recording failure", delivery.handle);
        }
        Ok(disposition)
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        self.expire_leases(now_millis()).await?;

        let rows = sqlx::query(
            "SELECT id, owner, repo, pr_number, installation_id, enqueued_at, attempts, last_error
             FROM review_jobs WHERE state = 'dead' ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list dead letters")?;

        rows.iter()
            .map(|row| -> Result<DeadLetter> {
                Ok(DeadLetter {
                    handle: JobHandle(row.try_get("id")?),
                    job: job_from_row(row)?,
                    attempts: attempts_from_row(row)?,
                    last_error: row.try_get("last_error")?,
                })
            })
            .collect()
    }
}

fn job_from_row(row: &SqliteRow) -> Result<ReviewJob> {
    let enqueued_at: String = row.try_get("enqueued_at")?;
    Ok(ReviewJob {
        owner: row.try_get("owner")?,
        repo: row.try_get("repo")?,
        pr_number: u64::try_from(row.try_get::<i64, _>("pr_number")?)?,
        installation_id: u64::try_from(row.try_get::<i64, _>("installation_id")?)?,
        enqueued_at: DateTime::parse_from_rfc3339(&enqueued_at)
            .with_context(|| format!("invalid enqueued_at '{enqueued_at}'"))?
            .with_timezone(&Utc),
    })
}

fn attempts_from_row(row: &SqliteRow) -> Result<u32> {
    Ok(u32::try_from(row.try_get::<i64, _>("attempts")?)?)
}

fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).with_context(|| format!("{value} does not fit in a sqlite integer"))
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    fn policy(max_attempts: u32, visibility: Duration) -> QueuePolicy {
        QueuePolicy {
            max_attempts,
            visibility_timeout: visibility,
            retry_backoff: Duration::ZERO,
            poll_interval: Duration::from_millis(10),
        }
    }

    async fn open(dir: &TempDir, policy: QueuePolicy) -> SqliteQueue {
        let url = format!("sqlite://{}", dir.path().join("queue.db").display());
        SqliteQueue::connect(&url, policy).await.unwrap()
    }

    #[tokio::test]
    async fn round_trips_job_fields() {
        let dir = tempfile::tempdir().unwrap();
        let queue = open(&dir, policy(3, Duration::from_secs(60))).await;
        let job = ReviewJob::new("acme", "widgets", 42, 7);

        let handle = queue.enqueue(job.clone()).await.unwrap();
        let delivery = queue.dequeue().await.unwrap();

        assert_eq!(delivery.handle, handle);
        assert_eq!(delivery.attempt, 1);
        assert_eq!(delivery.job, job);
        queue.ack(&delivery).await.unwrap();
        assert!(queue.try_claim().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn retries_until_dead_letter() {
        let dir = tempfile::tempdir().unwrap();
        let queue = open(&dir, policy(3, Duration::from_secs(60))).await;
        queue
            .enqueue(ReviewJob::new("acme", "widgets", 42, 0))
            .await
            .unwrap();

        for attempt in 1..=3 {
            let delivery = queue.dequeue().await.unwrap();
            assert_eq!(delivery.attempt, attempt);
            let disposition = queue.fail(&delivery, "HTTP 502").await.unwrap();
            if attempt < 3 {
                assert_eq!(
                    disposition,
                    FailureDisposition::Retrying {
                        next_attempt: attempt + 1,
                        delay_ms: 0
                    }
                );
            } else {
                assert_eq!(disposition, FailureDisposition::DeadLettered);
            }
        }

        assert!(queue.try_claim().await.unwrap().is_none());
        let dead = queue.dead_letters().await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 3);
        assert_eq!(dead[0].last_error.as_deref(), Some("HTTP 502"));
    }

    #[tokio::test]
    async fn expired_lease_becomes_visible_again() {
        let dir = tempfile::tempdir().unwrap();
        let queue = open(&dir, policy(3, Duration::from_millis(50))).await;
        queue
            .enqueue(ReviewJob::new("acme", "widgets", 1, 0))
            .await
            .unwrap();

        let abandoned = queue.dequeue().await.unwrap();
        assert!(queue.try_claim().await.unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(80)).await;
        let redelivered = queue.dequeue().await.unwrap();
        assert_eq!(redelivered.handle, abandoned.handle);
        assert_eq!(redelivered.attempt, 2);
        assert!(queue.ack(&abandoned).await.is_err());
    }

    #[tokio::test]
    async fn expired_last_lease_is_dead_lettered() {
        let dir = tempfile::tempdir().unwrap();
        let queue = open(&dir, policy(1, Duration::from_millis(50))).await;
        let handle = queue
            .enqueue(ReviewJob::new("acme", "widgets", 3, 0))
            .await
            .unwrap();

        let abandoned = queue.dequeue().await.unwrap();
        assert_eq!(abandoned.attempt, 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(queue.try_dequeue().await.unwrap().is_none());

        let dead = queue.dead_letters().await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].handle, handle);
        assert_eq!(dead[0].attempts, 1);
        assert_eq!(dead[0].last_error.as_deref(), Some(DEAD_LETTER_ON_EXPIRY));
        assert!(queue.ack(&abandoned).await.is_err());
    }

    #[tokio::test]
    async fn competing_consumers_never_share_a_job() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(open(&dir, policy(3, Duration::from_secs(60))).await);
        for n in 0..20 {
            queue
                .enqueue(ReviewJob::new("acme", "widgets", n, 0))
                .await
                .unwrap();
        }

        let mut consumers = Vec::new();
        for _ in 0..4 {
            let queue = queue.clone();
            consumers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(delivery) = queue.try_claim().await.unwrap() {
                    seen.push(delivery.job.pr_number);
                    queue.ack(&delivery).await.unwrap();
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for consumer in consumers {
            all.extend(consumer.await.unwrap());
        }
        all.sort_unstable();
        assert_eq!(all, (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let queue = open(&dir, policy(3, Duration::from_secs(60))).await;
            queue
                .enqueue(ReviewJob::new("acme", "widgets", 9, 0))
                .await
                .unwrap();
            queue.pool.close().await;
        }

        let reopened = open(&dir, policy(3, Duration::from_secs(60))).await;
        let delivery = reopened.dequeue().await.unwrap();
        assert_eq!(delivery.job.pr_number, 9);
    }
}
