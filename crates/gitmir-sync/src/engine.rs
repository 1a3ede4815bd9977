use std::path::PathBuf;
use std::time::Duration;

use gitmir_core::models::mirror::Mirror;
use gitmir_core::models::sync_attempt::{ErrorClass, OutcomeKind, StageKind};
use gitmir_git::GitDriver;
use gitmir_gitea::{GiteaClient, RepoOptions};

use gitmir_core::cancel::CancellationToken;

/// Everything one `Sync` call needs, snapshotted at `init` time. Loaded once
/// so a concurrent reconfiguration of the mirror mid-sync does not affect an
/// in-flight attempt — the next scheduled run picks up the new values.
pub struct SyncContext {
    pub mirror: Mirror,
    pub clone_root: PathBuf,
    pub service_user: String,
    pub downstream_base: String,
    pub downstream_token: String,
    pub fetch_timeout: Duration,
    pub push_timeout: Duration,
    pub retry_max: u32,
}

impl SyncContext {
    fn local_dir(&self) -> PathBuf {
        self.clone_root.join(self.mirror.id.0.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub stage_reached: StageKind,
    pub outcome: OutcomeKind,
    pub error_class: Option<ErrorClass>,
    pub error_detail: Option<String>,
    pub bytes_transferred: u64,
    pub refs_updated: u32,
}

struct StageFailure {
    class: ErrorClass,
    detail: String,
}

/// Executes one mirror sync end-to-end. Never panics or returns `Err` to the
/// caller — every failure mode is encoded into the returned [`SyncOutcome`].
pub struct SyncEngine {
    git: GitDriver,
}

impl SyncEngine {
    pub fn new() -> Self {
        Self { git: GitDriver::new() }
    }

    pub async fn run(&self, ctx: &SyncContext, cancel: &CancellationToken) -> SyncOutcome {
        let gitea = GiteaClient::new(ctx.downstream_base.clone(), &ctx.downstream_token);

        if let Some(outcome) = Self::cancelled_outcome(cancel, StageKind::EnsureRemote) {
            return outcome;
        }
        if let Err(failure) = retry(ctx, cancel, StageKind::EnsureRemote, || self.ensure_remote(ctx, cancel)).await {
            return failed_outcome(StageKind::EnsureRemote, failure);
        }

        if let Some(outcome) = Self::cancelled_outcome(cancel, StageKind::Fetch) {
            return outcome;
        }
        if let Err(failure) = retry(ctx, cancel, StageKind::Fetch, || self.fetch(ctx, cancel)).await {
            return failed_outcome(StageKind::Fetch, failure);
        }

        if let Some(outcome) = Self::cancelled_outcome(cancel, StageKind::EnsureDownstream) {
            return outcome;
        }
        if let Err(failure) = retry(ctx, cancel, StageKind::EnsureDownstream, || {
            Self::ensure_downstream(ctx, &gitea)
        })
        .await
        {
            return failed_outcome(StageKind::EnsureDownstream, failure);
        }

        if let Some(outcome) = Self::cancelled_outcome(cancel, StageKind::Push) {
            return outcome;
        }
        let push_result = match retry(ctx, cancel, StageKind::Push, || self.push(ctx, cancel)).await {
            Ok(value) => value,
            Err(failure) => return failed_outcome(StageKind::Push, failure),
        };

        SyncOutcome {
            stage_reached: StageKind::Done,
            outcome: OutcomeKind::Success,
            error_class: None,
            error_detail: None,
            bytes_transferred: push_result.0,
            refs_updated: push_result.1,
        }
    }

    fn cancelled_outcome(cancel: &CancellationToken, stage: StageKind) -> Option<SyncOutcome> {
        cancel.is_cancelled().then_some(SyncOutcome {
            stage_reached: stage,
            outcome: OutcomeKind::Cancelled,
            error_class: None,
            error_detail: None,
            bytes_transferred: 0,
            refs_updated: 0,
        })
    }

    async fn ensure_remote(&self, ctx: &SyncContext, cancel: &CancellationToken) -> Result<(), StageFailure> {
        let dir = ctx.local_dir();
        let needs_clone = if !dir.exists() {
            true
        } else {
            match self.git.remote_get_url(&dir, "origin").await {
                Ok(out) if out.success() => out.stderr.trim() != ctx.mirror.upstream_url,
                _ => true,
            }
        };

        if needs_clone {
            if dir.exists() {
                let _ = tokio::fs::remove_dir_all(&dir).await;
            }
            if let Some(parent) = dir.parent() {
                let _ = tokio::fs::create_dir_all(parent).await;
            }
            let out = self
                .git
                .clone_mirror(&ctx.mirror.upstream_url, &dir, ctx.fetch_timeout, cancel)
                .await
                .map_err(|e| StageFailure {
                    class: ErrorClass::Unknown,
                    detail: e.to_string(),
                })?;
            if !out.success() {
                return Err(StageFailure {
                    class: gitmir_classify::classify_git_output(&out),
                    detail: scrub_stage_stderr(ctx, &out.stderr),
                });
            }
        }

        let sanity = self.git.sanity_check(&dir).await.map_err(|e| StageFailure {
            class: ErrorClass::Corrupt,
            detail: e.to_string(),
        })?;
        if !sanity.success() {
            return Err(StageFailure {
                class: ErrorClass::Corrupt,
                detail: scrub_stage_stderr(ctx, &sanity.stderr),
            });
        }
        Ok(())
    }

    async fn fetch(&self, ctx: &SyncContext, cancel: &CancellationToken) -> Result<(), StageFailure> {
        let dir = ctx.local_dir();
        let out = self
            .git
            .fetch(&dir, ctx.fetch_timeout, cancel)
            .await
            .map_err(|e| StageFailure {
                class: ErrorClass::Unknown,
                detail: e.to_string(),
            })?;
        if !out.success() {
            return Err(StageFailure {
                class: gitmir_classify::classify_git_output(&out),
                detail: scrub_stage_stderr(ctx, &out.stderr),
            });
        }
        Ok(())
    }

    async fn ensure_downstream(ctx: &SyncContext, gitea: &GiteaClient) -> Result<(), StageFailure> {
        let owner = ctx.mirror.effective_owner(&ctx.service_user);
        let name = &ctx.mirror.downstream_name;

        let exists = gitea.repo_exists(owner, name).await.map_err(|e| StageFailure {
            class: gitmir_classify::classify_gitea_error(&e),
            detail: e.to_string(),
        })?;

        if exists {
            return Ok(());
        }

        let opts = RepoOptions { description: None, private: true };
        // Organization namespaces must go through the org endpoint — Gitea
        // rejects push-to-create there.
        let result = if ctx.mirror.pushes_to_org() {
            gitea.create_org_repo(owner, name, &opts).await
        } else {
            gitea.create_user_repo(name, &opts).await
        };

        result.map_err(|e| StageFailure {
            class: gitmir_classify::classify_gitea_error(&e),
            detail: e.to_string(),
        })
    }

    async fn push(&self, ctx: &SyncContext, cancel: &CancellationToken) -> Result<(u64, u32), StageFailure> {
        let dir = ctx.local_dir();
        let owner = ctx.mirror.effective_owner(&ctx.service_user);
        let push_url = build_push_url(&ctx.downstream_base, &ctx.downstream_token, owner, &ctx.mirror.downstream_name);

        let out = self
            .git
            .push_mirror(&dir, &push_url, ctx.push_timeout, cancel)
            .await
            .map_err(|e| StageFailure {
                class: ErrorClass::Unknown,
                detail: e.to_string(),
            })?;

        if !out.success() {
            return Err(StageFailure {
                class: gitmir_classify::classify_push_output(&out),
                detail: scrub_stage_stderr(ctx, &out.stderr),
            });
        }

        Ok(parse_push_stats(&out.stderr))
    }
}

impl Default for SyncEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn failed_outcome(stage: StageKind, failure: StageFailure) -> SyncOutcome {
    let outcome = if matches!(failure.class, ErrorClass::Timeout) {
        OutcomeKind::Timeout
    } else {
        OutcomeKind::Failed
    };
    SyncOutcome {
        stage_reached: stage,
        outcome,
        error_class: Some(failure.class),
        error_detail: Some(failure.detail),
        bytes_transferred: 0,
        refs_updated: 0,
    }
}

/// Per-stage retry loop: bounded by `ctx.retry_max`, exponential backoff.
/// Retries never create a new `SyncAttempt` row — they are purely an
/// internal detail of one `SyncEngine::run` call.
async fn retry<T, Fut>(
    ctx: &SyncContext,
    cancel: &CancellationToken,
    stage: StageKind,
    mut make_attempt: impl FnMut() -> Fut,
) -> Result<T, StageFailure>
where
    Fut: std::future::Future<Output = Result<T, StageFailure>>,
{
    let mut attempt_no = 0u32;
    loop {
        match make_attempt().await {
            Ok(value) => return Ok(value),
            Err(failure) => {
                attempt_no += 1;
                if !failure.class.retryable() || attempt_no > ctx.retry_max {
                    tracing::warn!(?stage, class = %failure.class, attempts = attempt_no, "stage failed");
                    return Err(failure);
                }
                let backoff = Duration::from_millis(200 * 2u64.pow(attempt_no.min(8)));
                tracing::info!(?stage, attempt = attempt_no, ?backoff, "retrying stage");
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = cancel.cancelled() => return Err(failure),
                }
            }
        }
    }
}

/// Strip the downstream token and any userinfo git echoes back out of a
/// stage's stderr before it becomes a persisted `StageFailure.detail` —
/// spec §4.1 makes this the engine's responsibility, not the store's.
fn scrub_stage_stderr(ctx: &SyncContext, stderr: &str) -> String {
    gitmir_git::scrub_stderr(stderr, &[ctx.downstream_token.as_str()])
}

/// Build a push URL with the token embedded as userinfo. Held only for the
/// duration of the `git push` call; never logged or persisted — callers
/// scrub via `scrub_stage_stderr` before persisting any stderr derived from
/// it.
fn build_push_url(base: &str, token: &str, owner: &str, name: &str) -> String {
    let trimmed = base.trim_end_matches('/');
    if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("https://{token}@{rest}/{owner}/{name}.git")
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("http://{token}@{rest}/{owner}/{name}.git")
    } else {
        format!("{trimmed}/{owner}/{name}.git")
    }
}

/// Best-effort parse of `git push --mirror` stderr for ref-update and byte
/// counters; git gives no machine-readable summary here.
fn parse_push_stats(stderr: &str) -> (u64, u32) {
    let refs_updated = stderr.lines().filter(|line| line.contains("->")).count() as u32;

    let bytes_transferred = stderr
        .lines()
        .find(|line| line.contains("Writing objects"))
        .and_then(|line| {
            let (unit, multiplier) = if line.contains("KiB") {
                ("KiB", 1024.0)
            } else if line.contains("MiB") {
                ("MiB", 1024.0 * 1024.0)
            } else {
                return None;
            };
            let unit_idx = line.find(unit)?;
            let before = line[..unit_idx].trim_end();
            let num_start = before
                .rfind(|c: char| !c.is_ascii_digit() && c != '.')
                .map(|i| i + 1)
                .unwrap_or(0);
            let num: f64 = before[num_start..].parse().ok()?;
            Some((num * multiplier) as u64)
        })
        .unwrap_or(0);

    (bytes_transferred, refs_updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_push_url_embeds_token() {
        let url = build_push_url("https://gitea.example.com", "sekret", "acme", "widgets");
        assert_eq!(url, "https://sekret@gitea.example.com/acme/widgets.git");
    }

    #[test]
    fn test_parse_push_stats_counts_ref_updates() {
        let stderr = "To https://gitea.example.com/acme/widgets.git\n * [new branch]      main -> main\n   abc123..def456  feature -> feature\n";
        let (_, refs) = parse_push_stats(stderr);
        assert_eq!(refs, 2);
    }

    #[test]
    fn test_parse_push_stats_bytes() {
        let stderr = "Writing objects: 100% (12/12), 3.45 KiB | 3.45 MiB/s, done.\n";
        let (bytes, _) = parse_push_stats(stderr);
        assert!(bytes > 0);
    }

    fn test_ctx() -> SyncContext {
        SyncContext {
            mirror: Mirror::new(
                "acme-widgets".to_string(),
                "https://github.com/acme/widgets.git".to_string(),
                String::new(),
                "widgets".to_string(),
            ),
            clone_root: std::env::temp_dir(),
            service_user: "mirror-bot".to_string(),
            downstream_base: "https://gitea.example.com".to_string(),
            downstream_token: "sekrettoken".to_string(),
            fetch_timeout: Duration::from_secs(20),
            push_timeout: Duration::from_secs(20),
            retry_max: 0,
        }
    }

    #[test]
    fn test_scrub_stage_stderr_strips_embedded_token() {
        let ctx = test_ctx();
        let stderr = "fatal: unable to access 'https://sekrettoken@gitea.example.com/acme/widgets.git/': The requested URL returned error: 401";
        let scrubbed = scrub_stage_stderr(&ctx, stderr);
        assert!(!scrubbed.contains("sekrettoken"));
        assert!(scrubbed.contains("gitea.example.com"));
    }

    #[test]
    fn test_scrub_stage_stderr_strips_bare_token_occurrence() {
        let ctx = test_ctx();
        let stderr = "remote: token sekrettoken rejected";
        let scrubbed = scrub_stage_stderr(&ctx, stderr);
        assert!(!scrubbed.contains("sekrettoken"));
    }
}
