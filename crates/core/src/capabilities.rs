//! Injected capability interfaces with no default implementation: the
//! fallback-upload trigger and the self-update contract (spec §4.4, §9,
//! §OQ). Both are owned by the connection manager as
//! `Option<Arc<dyn ...>>` and no-op, or log, when absent.

use async_trait::async_trait;

/// Invoked by the FSM's periodic tick when the disconnect-duration clock
/// exceeds `sftp_timeout` (spec §4.4). Returns whether the fallback upload
/// succeeded; the FSM fires `sftp_complete` or `sftp_failed` accordingly.
#[async_trait]
pub trait SftpRequiredHandler: Send + Sync {
    async fn upload_pending(&self) -> bool;
}

/// The narrow self-update contract resolved in §OQ: fetch a signed
/// artifact, verify its checksum, atomically swap, signal restart. The
/// container-specific mechanics are deliberately outside this trait's
/// scope.
#[async_trait]
pub trait SelfUpdateHandler: Send + Sync {
    async fn apply(&self, download_url: &str, expected_checksum: &str) -> bool;
}
