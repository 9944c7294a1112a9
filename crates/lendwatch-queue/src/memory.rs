//! In-memory queue backend.
//!
//! Jobs live in RAM and are lost when the process exits. Useful for tests and
//! short-lived runs; use the `postgres` backend for durability.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use crate::backend::{QueueBackend, QueueCounts};
use crate::error::QueueError;
use crate::job::{JobId, JobState, QueueJob};

#[derive(Default)]
struct State {
    /// Insertion sequence → job.
    jobs: BTreeMap<u64, QueueJob>,
    index: HashMap<JobId, u64>,
    next_seq: u64,
}

impl State {
    fn job_mut(&mut self, id: JobId) -> Result<&mut QueueJob, QueueError> {
        let seq = *self.index.get(&id).ok_or(QueueError::NotFound { id })?;
        self.jobs.get_mut(&seq).ok_or(QueueError::NotFound { id })
    }
}

/// In-memory [`QueueBackend`].
#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<State>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueBackend for MemoryQueue {
    async fn push(&self, job: QueueJob) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.index.insert(job.id, seq);
        state.jobs.insert(seq, job);
        Ok(())
    }

    async fn claim(
        &self,
        now: DateTime<Utc>,
        locked_until: DateTime<Utc>,
    ) -> Result<Option<QueueJob>, QueueError> {
        let mut state = self.state.lock().await;
        let next = state
            .jobs
            .iter()
            .filter(|(_, job)| job.is_claimable(now))
            .min_by_key(|(seq, job)| (job.available_at, **seq))
            .map(|(seq, _)| *seq);

        Ok(next.and_then(|seq| {
            let job = state.jobs.get_mut(&seq)?;
            job.state = JobState::Active;
            job.attempt += 1;
            job.locked_until = Some(locked_until);
            Some(job.clone())
        }))
    }

    async fn complete(&self, id: JobId) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let seq = state.index.remove(&id).ok_or(QueueError::NotFound { id })?;
        state.jobs.remove(&seq);
        Ok(())
    }

    async fn reschedule(
        &self,
        id: JobId,
        available_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let job = state.job_mut(id)?;
        job.state = JobState::Delayed;
        job.available_at = available_at;
        job.locked_until = None;
        job.last_error = Some(error.to_string());
        Ok(())
    }

    async fn fail(&self, id: JobId, error: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let job = state.job_mut(id)?;
        job.state = JobState::Failed;
        job.locked_until = None;
        job.last_error = Some(error.to_string());
        Ok(())
    }

    async fn requeue_failed(&self, id: JobId, now: DateTime<Utc>) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let job = state.job_mut(id)?;
        if job.state != JobState::Failed {
            return Err(QueueError::NotFailed { id });
        }
        job.state = JobState::Waiting;
        job.attempt = 0;
        job.available_at = now;
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<QueueJob>, QueueError> {
        let state = self.state.lock().await;
        Ok(state
            .index
            .get(&id)
            .and_then(|seq| state.jobs.get(seq))
            .cloned())
    }

    async fn list(&self, job_state: JobState) -> Result<Vec<QueueJob>, QueueError> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .values()
            .filter(|j| j.state == job_state)
            .cloned()
            .collect())
    }

    async fn counts(&self) -> Result<QueueCounts, QueueError> {
        let state = self.state.lock().await;
        let mut counts = QueueCounts::default();
        for job in state.jobs.values() {
            match job.state {
                JobState::Waiting => counts.waiting += 1,
                JobState::Delayed => counts.delayed += 1,
                JobState::Active => counts.active += 1,
                JobState::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::RetryPolicy;
    use chrono::Duration;
    use lendwatch_core::{DomainEvent, WithdrawEvent};

    fn lease(at: DateTime<Utc>) -> DateTime<Utc> {
        at + Duration::seconds(30)
    }

    fn job(now: DateTime<Utc>) -> QueueJob {
        let ev = DomainEvent::Withdraw(WithdrawEvent {
            reserve: "0xr".into(),
            user: "0xu".into(),
            to: "0xt".into(),
            amount: "1".into(),
            tx_hash: "0xh".into(),
        });
        QueueJob::new(ev.kind(), ev, RetryPolicy::default(), now)
    }

    #[tokio::test]
    async fn claim_is_fifo_and_exclusive() {
        let q = MemoryQueue::new();
        let now = Utc::now();
        let (a, b) = (job(now), job(now));
        q.push(a.clone()).await.unwrap();
        q.push(b.clone()).await.unwrap();

        let first = q.claim(now, lease(now)).await.unwrap().unwrap();
        assert_eq!(first.id, a.id);
        assert_eq!(first.attempt, 1);
        assert_eq!(first.state, JobState::Active);

        let second = q.claim(now, lease(now)).await.unwrap().unwrap();
        assert_eq!(second.id, b.id);
        assert!(q.claim(now, lease(now)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delayed_job_not_claimed_early() {
        let q = MemoryQueue::new();
        let now = Utc::now();
        let j = job(now);
        q.push(j.clone()).await.unwrap();
        q.claim(now, lease(now)).await.unwrap().unwrap();
        q.reschedule(j.id, now + Duration::seconds(2), "boom").await.unwrap();

        let (early, due) = (now + Duration::seconds(1), now + Duration::seconds(2));
        assert!(q.claim(early, lease(early)).await.unwrap().is_none());
        let again = q.claim(due, lease(due)).await.unwrap().unwrap();
        assert_eq!(again.attempt, 2);
        assert_eq!(again.last_error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn expired_lease_is_claimed_again() {
        let q = MemoryQueue::new();
        let now = Utc::now();
        let j = job(now);
        q.push(j.clone()).await.unwrap();
        let lease_end = lease(now);
        let first = q.claim(now, lease_end).await.unwrap().unwrap();
        assert_eq!(first.locked_until, Some(lease_end));
        assert_eq!(q.counts().await.unwrap().active, 1);

        // Still leased: nobody else gets it.
        assert!(q.claim(now + Duration::seconds(29), lease_end).await.unwrap().is_none());

        let later = now + Duration::seconds(30);
        let again = q.claim(later, lease(later)).await.unwrap().unwrap();
        assert_eq!(again.id, j.id);
        assert_eq!(again.attempt, 2);
        assert_eq!(q.counts().await.unwrap().active, 1);
    }

    #[tokio::test]
    async fn requeue_only_failed() {
        let q = MemoryQueue::new();
        let now = Utc::now();
        let j = job(now);
        q.push(j.clone()).await.unwrap();
        assert!(matches!(
            q.requeue_failed(j.id, now).await,
            Err(QueueError::NotFailed { .. })
        ));
        q.fail(j.id, "dead").await.unwrap();
        q.requeue_failed(j.id, now).await.unwrap();
        assert_eq!(q.get(j.id).await.unwrap().unwrap().state, JobState::Waiting);
    }
}
