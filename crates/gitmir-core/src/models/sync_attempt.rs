use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::mirror::MirrorId;

/// What caused a sync attempt to run (spec.md §3, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Scheduled,
    Manual,
    Retry,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerKind::Scheduled => write!(f, "scheduled"),
            TriggerKind::Manual => write!(f, "manual"),
            TriggerKind::Retry => write!(f, "retry"),
        }
    }
}

impl std::str::FromStr for TriggerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(TriggerKind::Scheduled),
            "manual" => Ok(TriggerKind::Manual),
            "retry" => Ok(TriggerKind::Retry),
            _ => Err(format!("unknown trigger: {s}")),
        }
    }
}

/// Terminal result of a sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    Failed,
    Cancelled,
    Timeout,
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeKind::Success => write!(f, "success"),
            OutcomeKind::Failed => write!(f, "failed"),
            OutcomeKind::Cancelled => write!(f, "cancelled"),
            OutcomeKind::Timeout => write!(f, "timeout"),
        }
    }
}

impl std::str::FromStr for OutcomeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(OutcomeKind::Success),
            "failed" => Ok(OutcomeKind::Failed),
            "cancelled" => Ok(OutcomeKind::Cancelled),
            "timeout" => Ok(OutcomeKind::Timeout),
            _ => Err(format!("unknown outcome: {s}")),
        }
    }
}

/// The furthest pipeline stage a sync attempt reached (spec.md §4.1 table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Init,
    EnsureRemote,
    Fetch,
    EnsureDownstream,
    Push,
    Done,
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageKind::Init => write!(f, "init"),
            StageKind::EnsureRemote => write!(f, "ensure_remote"),
            StageKind::Fetch => write!(f, "fetch"),
            StageKind::EnsureDownstream => write!(f, "ensure_downstream"),
            StageKind::Push => write!(f, "push"),
            StageKind::Done => write!(f, "done"),
        }
    }
}

impl std::str::FromStr for StageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(StageKind::Init),
            "ensure_remote" => Ok(StageKind::EnsureRemote),
            "fetch" => Ok(StageKind::Fetch),
            "ensure_downstream" => Ok(StageKind::EnsureDownstream),
            "push" => Ok(StageKind::Push),
            "done" => Ok(StageKind::Done),
            _ => Err(format!("unknown stage: {s}")),
        }
    }
}

/// Failure taxonomy driving retry policy (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    UpstreamAuth,
    UpstreamNotFound,
    DownstreamAuth,
    DownstreamForbidden,
    DownstreamNotFound,
    DownstreamConflict,
    NetworkTransient,
    Timeout,
    RateLimited,
    DiskFull,
    LocalIo,
    Corrupt,
    Unknown,
}

impl ErrorClass {
    /// Default retry disposition per spec.md §4.6's table.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            ErrorClass::NetworkTransient | ErrorClass::Timeout | ErrorClass::RateLimited
        )
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorClass::UpstreamAuth => "upstream_auth",
            ErrorClass::UpstreamNotFound => "upstream_not_found",
            ErrorClass::DownstreamAuth => "downstream_auth",
            ErrorClass::DownstreamForbidden => "downstream_forbidden",
            ErrorClass::DownstreamNotFound => "downstream_not_found",
            ErrorClass::DownstreamConflict => "downstream_conflict",
            ErrorClass::NetworkTransient => "network_transient",
            ErrorClass::Timeout => "timeout",
            ErrorClass::RateLimited => "rate_limited",
            ErrorClass::DiskFull => "disk_full",
            ErrorClass::LocalIo => "local_io",
            ErrorClass::Corrupt => "corrupt",
            ErrorClass::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ErrorClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upstream_auth" => Ok(ErrorClass::UpstreamAuth),
            "upstream_not_found" => Ok(ErrorClass::UpstreamNotFound),
            "downstream_auth" => Ok(ErrorClass::DownstreamAuth),
            "downstream_forbidden" => Ok(ErrorClass::DownstreamForbidden),
            "downstream_not_found" => Ok(ErrorClass::DownstreamNotFound),
            "downstream_conflict" => Ok(ErrorClass::DownstreamConflict),
            "network_transient" => Ok(ErrorClass::NetworkTransient),
            "timeout" => Ok(ErrorClass::Timeout),
            "rate_limited" => Ok(ErrorClass::RateLimited),
            "disk_full" => Ok(ErrorClass::DiskFull),
            "local_io" => Ok(ErrorClass::LocalIo),
            "corrupt" => Ok(ErrorClass::Corrupt),
            "unknown" => Ok(ErrorClass::Unknown),
            _ => Err(format!("unknown error class: {s}")),
        }
    }
}

/// One durable record of a sync execution (spec.md §3 `SyncAttempt`).
/// Append-only: never mutated after `FinalizeAttempt` is called.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncAttempt {
    pub id: Uuid,
    pub mirror_id: MirrorId,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub trigger: TriggerKind,
    pub outcome: Option<OutcomeKind>,
    pub stage_reached: StageKind,
    pub error_class: Option<ErrorClass>,
    pub error_detail: Option<String>,
    pub bytes_transferred: u64,
    pub refs_updated: u32,
}

impl SyncAttempt {
    pub fn begin(mirror_id: MirrorId, trigger: TriggerKind) -> Self {
        Self {
            id: Uuid::now_v7(),
            mirror_id,
            started_at: Utc::now(),
            finished_at: None,
            trigger,
            outcome: None,
            stage_reached: StageKind::Init,
            error_class: None,
            error_detail: None,
            bytes_transferred: 0,
            refs_updated: 0,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.finished_at.is_some()
    }
}
