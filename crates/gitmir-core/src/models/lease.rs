use chrono::{DateTime, Utc};

use super::mirror::MirrorId;

/// A short-lived, atomically-acquired exclusivity token for one mirror
/// (spec.md §4.2, GLOSSARY "Lease"). Guarantees at-most-one concurrent sync
/// per mirror; an expired lease may be stolen by another worker.
#[derive(Debug, Clone)]
pub struct Lease {
    pub mirror_id: MirrorId,
    pub holder_id: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
