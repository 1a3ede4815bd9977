//! Translates raw git/Gitea failures into the small, stable taxonomy that
//! drives retry policy and user-visible messages. Never inspects the engine's
//! internal state — only the raw command/response shape.

use gitmir_core::models::sync_attempt::ErrorClass;
use gitmir_git::GitOutput;
use gitmir_gitea::GiteaError;

/// Classify a failed (or timed-out) git invocation's stderr.
pub fn classify_git_output(output: &GitOutput) -> ErrorClass {
    if output.timed_out {
        return ErrorClass::Timeout;
    }

    let stderr = output.stderr.to_lowercase();

    if stderr.contains("authentication failed")
        || stderr.contains("could not read username")
        || stderr.contains("401")
        || stderr.contains("permission denied (publickey)")
    {
        return ErrorClass::UpstreamAuth;
    }
    if stderr.contains("repository not found") || stderr.contains("404") {
        return ErrorClass::UpstreamNotFound;
    }
    if stderr.contains("could not resolve host")
        || stderr.contains("connection refused")
        || stderr.contains("connection reset")
        || stderr.contains("network is unreachable")
        || stderr.contains("timed out")
    {
        return ErrorClass::NetworkTransient;
    }
    if stderr.contains("no space left on device") {
        return ErrorClass::DiskFull;
    }
    if stderr.contains("fatal: loose object")
        || stderr.contains("object file")
        || stderr.contains("bad object")
        || stderr.contains("corrupt")
    {
        return ErrorClass::Corrupt;
    }

    ErrorClass::Unknown
}

/// Classify a failed Gitea API call. Every call site is downstream (Gitea
/// is always the downstream in this system), so `NotFound` here means a
/// missing downstream resource (e.g. an org that doesn't exist yet), never
/// an upstream 404.
pub fn classify_gitea_error(err: &GiteaError) -> ErrorClass {
    match err {
        GiteaError::Unauthorized(_) => ErrorClass::DownstreamAuth,
        GiteaError::Forbidden(_) => ErrorClass::DownstreamForbidden,
        GiteaError::NotFound(_) => ErrorClass::DownstreamNotFound,
        GiteaError::Conflict(_) => ErrorClass::DownstreamConflict,
        GiteaError::RateLimited { .. } => ErrorClass::RateLimited,
        GiteaError::Transport(_) => ErrorClass::NetworkTransient,
    }
}

/// Classify a push-side git failure, where auth/not-found errors mean the
/// *downstream*, not the upstream.
pub fn classify_push_output(output: &GitOutput) -> ErrorClass {
    match classify_git_output(output) {
        ErrorClass::UpstreamAuth => ErrorClass::DownstreamAuth,
        ErrorClass::UpstreamNotFound => ErrorClass::DownstreamForbidden,
        other => other,
    }
}
