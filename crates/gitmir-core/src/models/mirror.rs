use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a mirror.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MirrorId(pub Uuid);

impl MirrorId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for MirrorId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MirrorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Last observed sync status of a mirror, persisted alongside the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LastStatus {
    Never,
    Success,
    Failed,
    Running,
}

impl std::fmt::Display for LastStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LastStatus::Never => write!(f, "never"),
            LastStatus::Success => write!(f, "success"),
            LastStatus::Failed => write!(f, "failed"),
            LastStatus::Running => write!(f, "running"),
        }
    }
}

impl std::str::FromStr for LastStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never" => Ok(LastStatus::Never),
            "success" => Ok(LastStatus::Success),
            "failed" => Ok(LastStatus::Failed),
            "running" => Ok(LastStatus::Running),
            _ => Err(format!("unknown last_status: {s}")),
        }
    }
}

/// One configured upstream→downstream repository mapping (spec.md §3 `Mirror`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mirror {
    pub id: MirrorId,
    pub name: String,
    pub upstream_url: String,
    /// Non-empty ⇒ organization namespace on the downstream. Empty ⇒ the
    /// configured service user's namespace. This distinction is load-bearing
    /// (spec.md §9): it is never conflated with a plain "user override".
    pub downstream_owner: String,
    pub downstream_name: String,
    pub enabled: bool,
    pub sync_interval_seconds: Option<u64>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_status: LastStatus,
    pub last_error_summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Mirror {
    pub fn new(name: String, upstream_url: String, downstream_owner: String, downstream_name: String) -> Self {
        let now = Utc::now();
        Self {
            id: MirrorId::new(),
            name,
            upstream_url,
            downstream_owner,
            downstream_name,
            enabled: true,
            sync_interval_seconds: None,
            last_attempt_at: None,
            last_success_at: None,
            last_status: LastStatus::Never,
            last_error_summary: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when `downstream_owner` names an organization namespace rather
    /// than the service user's own namespace.
    pub fn pushes_to_org(&self) -> bool {
        !self.downstream_owner.is_empty()
    }

    /// The namespace a push/create call should target: the mirror's
    /// organization if set, otherwise the given service user.
    pub fn effective_owner<'a>(&'a self, service_user: &'a str) -> &'a str {
        if self.pushes_to_org() {
            &self.downstream_owner
        } else {
            service_user
        }
    }
}
