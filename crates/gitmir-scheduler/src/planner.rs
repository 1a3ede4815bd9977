use chrono::Utc;

use gitmir_core::models::mirror::Mirror;

/// A mirror is due when it is enabled and `now - last_attempt_at` (or, if it
/// has never run, all of time) is at least `interval_seconds`.
pub fn is_due(mirror: &Mirror, interval_seconds: u64) -> bool {
    if !mirror.enabled {
        return false;
    }
    match mirror.last_attempt_at {
        None => true,
        Some(last) => {
            let elapsed = Utc::now().signed_duration_since(last);
            elapsed.num_seconds() >= interval_seconds as i64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn mirror() -> Mirror {
        Mirror::new(
            "acme-widgets".to_string(),
            "https://github.com/acme/widgets.git".to_string(),
            String::new(),
            "widgets".to_string(),
        )
    }

    #[test]
    fn test_never_run_is_due() {
        assert!(is_due(&mirror(), 3600));
    }

    #[test]
    fn test_disabled_mirror_never_due() {
        let mut m = mirror();
        m.enabled = false;
        assert!(!is_due(&m, 0));
    }

    #[test]
    fn test_recent_attempt_not_due() {
        let mut m = mirror();
        m.last_attempt_at = Some(Utc::now());
        assert!(!is_due(&m, 3600));
    }

    #[test]
    fn test_stale_attempt_is_due() {
        let mut m = mirror();
        m.last_attempt_at = Some(Utc::now() - Duration::seconds(7200));
        assert!(is_due(&m, 3600));
    }
}
