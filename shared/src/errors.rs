//! Error taxonomy for the data layer.

use thiserror::Error;

/// Errors surfaced by the snapshot store, the remote client and the
/// repository.
///
/// Absence of a record is never an error anywhere in this crate: reads
/// return `Option`, deletes return `bool`. The two remote-side variants are
/// recoverable: the repository falls back to the local snapshot when it
/// sees them.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The remote backend could not be reached (connect error or timeout).
    #[error("remote backend unreachable: {0}")]
    NetworkUnavailable(String),

    /// The remote backend answered with a non-success status.
    #[error("remote rejected request: {status} - {message}")]
    RemoteRejected {
        /// HTTP status code of the rejection.
        status: u16,
        /// Response body text, as returned by the backend.
        message: String,
    },

    /// The local snapshot store refused a write because the serialized
    /// snapshot exceeds the configured quota, even after cleanup.
    #[error(
        "本地存储空间不足: used {used_bytes} of {quota_bytes} bytes; \
         删除旧文章或改用图床存放图片后重试"
    )]
    QuotaExceeded {
        /// Serialized snapshot size that was rejected.
        used_bytes: usize,
        /// Configured quota in bytes.
        quota_bytes: usize,
    },

    /// A payload failed validation before any I/O was attempted.
    #[error("{kind} 数据验证失败: {reason}")]
    ValidationFailed {
        /// Resource kind the payload targeted.
        kind: String,
        /// Human-readable reason.
        reason: String,
    },

    /// Local persistence fault (SQLite layer).
    #[error("snapshot store error: {0}")]
    Snapshot(#[from] rusqlite::Error),

    /// JSON (de)serialization fault.
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether the repository may recover from this error by retrying the
    /// operation against the local snapshot.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StoreError::NetworkUnavailable(_) | StoreError::RemoteRejected { .. }
        )
    }
}

/// Crate-wide result alias.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_failures_are_recoverable() {
        assert!(StoreError::NetworkUnavailable("timeout".into()).is_recoverable());
        assert!(StoreError::RemoteRejected {
            status: 500,
            message: "boom".into()
        }
        .is_recoverable());
    }

    #[test]
    fn local_failures_are_not_recoverable() {
        let quota = StoreError::QuotaExceeded {
            used_bytes: 6_000_000,
            quota_bytes: 5_242_880,
        };
        assert!(!quota.is_recoverable());

        let validation = StoreError::ValidationFailed {
            kind: "articles".into(),
            reason: "文章标题不能为空".into(),
        };
        assert!(!validation.is_recoverable());
    }
}
