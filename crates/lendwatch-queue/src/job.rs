//! Queue job model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use lendwatch_core::{DomainEvent, EventKind};

use crate::policy::RetryPolicy;

/// Queue-assigned job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Ready for its first delivery.
    Waiting,
    /// Failed at least once; ready again at `available_at`.
    Delayed,
    /// Claimed by a worker until `locked_until`. Acknowledged jobs are
    /// removed, so there is no completed state.
    Active,
    /// Attempt budget exhausted or non-retryable error (dead letter).
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Delayed => "delayed",
            Self::Active => "active",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "delayed" => Ok(Self::Delayed),
            "active" => Ok(Self::Active),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown job state '{other}'")),
        }
    }
}

/// A unit of work: one normalized event waiting to be stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueJob {
    pub id: JobId,
    pub kind: EventKind,
    pub payload: DomainEvent,
    /// Deliveries so far. Incremented each time the job is claimed.
    pub attempt: u32,
    pub policy: RetryPolicy,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    /// Earliest time the job may be claimed.
    pub available_at: DateTime<Utc>,
    /// Lease end of the current delivery. An active job past its lease is
    /// considered stalled and may be claimed again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_until: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueueJob {
    pub fn new(kind: EventKind, payload: DomainEvent, policy: RetryPolicy, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            kind,
            payload,
            attempt: 0,
            policy,
            state: JobState::Waiting,
            created_at: now,
            available_at: now,
            locked_until: None,
            last_error: None,
        }
    }

    /// Waiting or delayed, and due at `now`.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        matches!(self.state, JobState::Waiting | JobState::Delayed) && self.available_at <= now
    }

    /// Active, but its lease ran out before it was settled.
    pub fn is_stalled(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Active && self.locked_until.map_or(true, |t| t <= now)
    }

    /// Ready, or stalled and due for redelivery.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.is_ready(now) || self.is_stalled(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn states_parse_and_there_is_no_completed_state() {
        for state in [JobState::Waiting, JobState::Delayed, JobState::Active, JobState::Failed] {
            assert_eq!(state.as_str().parse::<JobState>(), Ok(state));
        }
        assert!("completed".parse::<JobState>().is_err());
    }

    #[test]
    fn active_job_is_claimable_only_after_its_lease() {
        let now = Utc::now();
        let ev = DomainEvent::Withdraw(lendwatch_core::WithdrawEvent {
            reserve: "0xr".into(),
            user: "0xu".into(),
            to: "0xt".into(),
            amount: "1".into(),
            tx_hash: "0xh".into(),
        });
        let mut job = QueueJob::new(ev.kind(), ev, RetryPolicy::default(), now);
        assert!(job.is_claimable(now));

        job.state = JobState::Active;
        job.locked_until = Some(now + Duration::seconds(30));
        assert!(!job.is_claimable(now + Duration::seconds(29)));
        assert!(job.is_stalled(now + Duration::seconds(30)));
    }
}
