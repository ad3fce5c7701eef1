use std::collections::BTreeMap;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::DEAD_LETTER_ON_EXPIRY;
use crate::application::config::QueuePolicy;
use crate::application::ports::TaskQueue;
use crate::domain::job::{DeadLetter, Delivery, FailureDisposition, JobHandle, ReviewJob};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ready,
    Leased,
    Dead,
}

#[derive(Debug)]
struct Entry {
    job: ReviewJob,
    state: State,
    attempts: u32,
    /// Ready: 보이기 시작하는 시각, Leased: lease 만료 시각
    available_at: Instant,
    last_error: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    entries: BTreeMap<i64, Entry>,
}

impl Inner {
    fn expire_leases(&mut self, now: Instant, max_attempts: u32) {
        for entry in self.entries.values_mut() {
            if entry.state != State::Leased || entry.available_at > now {
                continue;
            }
            if entry.attempts >= max_attempts {
                entry.state = State::Dead;
                entry.last_error = Some(DEAD_LETTER_ON_EXPIRY.to_string());
            } else {
                entry.state = State::Ready;
            }
        }
    }

    fn claim(&mut self, now: Instant, lease: std::time::Duration) -> Option<Delivery> {
        let (&id, entry) = self
            .entries
            .iter_mut()
            .filter(|(_, e)| e.state == State::Ready && e.available_at <= now)
            .min_by_key(|(id, e)| (e.available_at, **id))?;

        entry.state = State::Leased;
        entry.attempts += 1;
        entry.available_at = now + lease;

        Some(Delivery {
            handle: JobHandle(id),
            job: entry.job.clone(),
            attempt: entry.attempts,
        })
    }

    /// 다음으로 상태가 바뀔 수 있는 시각(대기 중 job 또는 lease 만료).
    fn next_wakeup(&self) -> Option<Instant> {
        self.entries
            .values()
            .filter(|e| e.state != State::Dead)
            .map(|e| e.available_at)
            .min()
    }

    fn leased(&mut self, delivery: &Delivery) -> Result<&mut Entry> {
        match self.entries.get_mut(&delivery.handle.0) {
            Some(entry) if entry.state == State::Leased && entry.attempts == delivery.attempt => {
                Ok(entry)
            }
            _ => bail!(
                "{} attempt {} no longer holds a lease",
                delivery.handle,
                delivery.attempt
            ),
        }
    }
}

/// 프로세스 내부 큐. 재시작하면 내용이 사라진다.
pub struct MemoryQueue {
    policy: QueuePolicy,
    inner: Mutex<Inner>,
    changed: Notify,
}

impl MemoryQueue {
    pub fn new(policy: QueuePolicy) -> Self {
        Self {
            policy,
            inner: Mutex::new(Inner::default()),
            changed: Notify::new(),
        }
    }

    /// 아직 끝나지 않은(ready/leased) 작업 수.
    pub async fn pending(&self) -> usize {
        let inner = self.inner.lock().await;
        inner
            .entries
            .values()
            .filter(|e| e.state != State::Dead)
            .count()
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn enqueue(&self, job: ReviewJob) -> Result<JobHandle> {
        let handle = {
            let mut inner = self.inner.lock().await;
            inner.next_id += 1;
            let id = inner.next_id;
            inner.entries.insert(
                id,
                Entry {
                    job,
                    state: State::Ready,
                    attempts: 0,
                    available_at: Instant::now(),
                    last_error: None,
                },
            );
            JobHandle(id)
        };
        self.changed.notify_waiters();
        Ok(handle)
    }

    async fn dequeue(&self) -> Result<Delivery> {
        loop {
            // 상태 확인 전에 등록해 두어야 그 사이의 notify를 놓치지 않는다.
            let changed = self.changed.notified();

            let wakeup = {
                let mut inner = self.inner.lock().await;
                let now = Instant::now();
                inner.expire_leases(now, self.policy.max_attempts);
                if let Some(delivery) = inner.claim(now, self.policy.visibility_timeout) {
                    return Ok(delivery);
                }
                inner.next_wakeup()
            };

            match wakeup {
                Some(at) => {
                    tokio::select! {
                        _ = changed => {}
                        _ = tokio::time::sleep_until(at) => {}
                    }
                }
                None => changed.await,
            }
        }
    }

    async fn try_dequeue(&self) -> Result<Option<Delivery>> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        inner.expire_leases(now, self.policy.max_attempts);
        Ok(inner.claim(now, self.policy.visibility_timeout))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.leased(delivery)?;
        inner.entries.remove(&delivery.handle.0);
        Ok(())
    }

    async fn fail(&self, delivery: &Delivery, reason: &str) -> Result<FailureDisposition> {
        let disposition = {
            let mut inner = self.inner.lock().await;
            let entry = inner.leased(delivery)?;
            entry.last_error = Some(reason.to_string());

            if entry.attempts >= self.policy.max_attempts {
                entry.state = State::Dead;
                FailureDisposition::DeadLettered
            } else {
                let delay = self.policy.backoff_for(entry.attempts);
                entry.state = State::Ready;
                entry.available_at = Instant::now() + delay;
                FailureDisposition::Retrying {
                    next_attempt: entry.attempts + 1,
                    delay_ms: delay.as_millis() as u64,
                }
            }
        };
        self.changed.notify_waiters();
        Ok(disposition)
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .entries
            .iter()
            .filter(|(_, e)| e.state == State::Dead)
            .map(|(&id, e)| DeadLetter {
                handle: JobHandle(id),
                job: e.job.clone(),
                attempts: e.attempts,
                last_error: e.last_error.clone(),
            })
            .collect())
    }
}
