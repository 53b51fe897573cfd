//! The SFTP fallback uploader (spec §4.6): invoked when the connection
//! state machine enters `sftp_fallback`. Drains every pending/sending
//! envelope into a single hybrid-encrypted, gzip-compressed dump and
//! uploads it over SFTP; envelopes are marked `sent` only after the
//! upload itself succeeds.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use fleetlink_common::crypto::{compress, hybrid, parse_public_key_pem};
use fleetlink_core::{QueuePort, SftpRequiredHandler};
use fleetlink_domain::{Envelope, SftpConfig};
use rsa::RsaPublicKey;
use serde::Serialize;
use ssh2::Session;
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub enum FallbackUploadError {
    #[error("queue error: {0}")]
    Queue(String),
    #[error("serialization error: {0}")]
    Serialize(String),
    #[error("compression error: {0}")]
    Compress(String),
    #[error("encryption error: {0}")]
    Encrypt(String),
    #[error("ssh/sftp error: {0}")]
    Sftp(String),
    #[error("local I/O error: {0}")]
    Io(String),
}

type Result<T> = std::result::Result<T, FallbackUploadError>;

/// A single uploaded dump: `{agent_id, timestamp, item_count, items}`
/// (spec §4.6 step 3), serialized as UTF-8 JSON before compression.
#[derive(Debug, Serialize)]
struct DumpDocument {
    agent_id: String,
    timestamp: chrono::DateTime<Utc>,
    item_count: usize,
    items: Vec<Envelope>,
}

/// Drains the durable queue's pending envelopes through the SFTP fallback
/// channel on each invocation. Holds no state between calls; every field
/// is immutable configuration plus the shared queue handle.
pub struct FallbackUploader {
    queue: Arc<dyn QueuePort>,
    config: SftpConfig,
    agent_id: String,
    server_public_key: Option<RsaPublicKey>,
}

impl FallbackUploader {
    /// `server_public_key_pem` is read from `config.server_public_key_path`
    /// at startup and cached; a missing key means the dump is uploaded
    /// unencrypted with a warning (spec §4.6 step 5).
    #[must_use]
    pub fn new(
        queue: Arc<dyn QueuePort>,
        config: SftpConfig,
        agent_id: String,
        server_public_key: Option<RsaPublicKey>,
    ) -> Self {
        Self { queue, config, agent_id, server_public_key }
    }

    /// Load the server's RSA public key from `path`, if configured.
    pub fn load_public_key(path: Option<&std::path::Path>) -> Result<Option<RsaPublicKey>> {
        let Some(path) = path else { return Ok(None) };
        let pem = std::fs::read_to_string(path).map_err(|e| FallbackUploadError::Io(e.to_string()))?;
        let key = parse_public_key_pem(&pem).map_err(|e| FallbackUploadError::Encrypt(e.to_string()))?;
        Ok(Some(key))
    }

    /// Run one fallback upload cycle (spec §4.6 steps 1-7). Returns `Ok(true)`
    /// if there was nothing to upload or the upload succeeded; `Ok(false)`
    /// callers never occur — failures are surfaced as `Err` and the caller
    /// (the FSM's fallback handler) maps any error to `sftp_failed`.
    #[instrument(skip(self))]
    pub async fn upload(&self) -> Result<bool> {
        let pending =
            self.queue.get_all_pending().await.map_err(|e| FallbackUploadError::Queue(e.to_string()))?;

        if pending.is_empty() {
            info!("no pending envelopes; fallback upload is a no-op");
            return Ok(true);
        }

        let dump = DumpDocument {
            agent_id: self.agent_id.clone(),
            timestamp: Utc::now(),
            item_count: pending.len(),
            items: pending.clone(),
        };
        let json = serde_json::to_vec(&dump).map_err(|e| FallbackUploadError::Serialize(e.to_string()))?;
        let compressed = compress(&json).map_err(|e| FallbackUploadError::Compress(e.to_string()))?;

        let payload = match &self.server_public_key {
            Some(key) => hybrid::encrypt(key, &compressed)
                .map_err(|e| FallbackUploadError::Encrypt(e.to_string()))?,
            None => {
                warn!("no server public key configured; uploading fallback dump unencrypted");
                compressed
            }
        };

        self.upload_via_sftp(&payload).await?;

        for envelope in &pending {
            if let Err(e) = self.queue.mark_sent(envelope.id).await {
                warn!(id = envelope.id, error = %e, "failed to mark envelope sent after fallback upload");
            }
        }

        info!(count = pending.len(), "fallback upload complete");
        Ok(true)
    }

    async fn upload_via_sftp(&self, payload: &[u8]) -> Result<()> {
        let config = self.config.clone();
        let agent_id = self.agent_id.clone();
        let payload = payload.to_vec();
        tokio::task::spawn_blocking(move || Self::upload_blocking(&config, &agent_id, &payload))
            .await
            .map_err(|e| FallbackUploadError::Sftp(e.to_string()))?
    }

    /// The actual SFTP session: connect, authenticate, ensure the per-agent
    /// directory exists, write via a local temp file, and clean the temp
    /// file up on every exit path (spec §4.6 step 6).
    fn upload_blocking(config: &SftpConfig, agent_id: &str, payload: &[u8]) -> Result<()> {
        let tcp = std::net::TcpStream::connect((config.host.as_str(), config.port))
            .map_err(|e| FallbackUploadError::Sftp(format!("tcp connect: {e}")))?;
        tcp.set_read_timeout(Some(config.timeout))
            .map_err(|e| FallbackUploadError::Sftp(e.to_string()))?;

        let mut session =
            Session::new().map_err(|e| FallbackUploadError::Sftp(format!("session init: {e}")))?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(|e| FallbackUploadError::Sftp(format!("handshake: {e}")))?;

        authenticate(&session, config)?;

        let sftp =
            session.sftp().map_err(|e| FallbackUploadError::Sftp(format!("sftp subsystem: {e}")))?;

        let remote_dir = PathBuf::from(&config.remote_path).join(agent_id);
        if sftp.stat(&remote_dir).is_err() {
            sftp.mkdir(&remote_dir, 0o750)
                .map_err(|e| FallbackUploadError::Sftp(format!("mkdir {}: {e}", remote_dir.display())))?;
        }

        let filename = format!("{agent_id}_{}.enc", Utc::now().format("%Y%m%d_%H%M%S"));
        let remote_path = remote_dir.join(&filename);

        let mut tmp = tempfile::NamedTempFile::new().map_err(|e| FallbackUploadError::Io(e.to_string()))?;
        tmp.write_all(payload).map_err(|e| FallbackUploadError::Io(e.to_string()))?;
        tmp.flush().map_err(|e| FallbackUploadError::Io(e.to_string()))?;

        let result = (|| -> Result<()> {
            let mut remote_file = sftp
                .create(&remote_path)
                .map_err(|e| FallbackUploadError::Sftp(format!("create {}: {e}", remote_path.display())))?;
            remote_file
                .write_all(payload)
                .map_err(|e| FallbackUploadError::Sftp(format!("write {}: {e}", remote_path.display())))?;
            Ok(())
        })();

        // tmp is dropped (and removed) regardless of upload outcome.
        drop(tmp);
        result
    }
}

fn authenticate(session: &Session, config: &SftpConfig) -> Result<()> {
    if let Some(key_path) = &config.private_key_path {
        session
            .userauth_pubkey_file(&config.username, None, key_path, None)
            .map_err(|e| FallbackUploadError::Sftp(format!("pubkey auth: {e}")))
    } else if let Some(password) = &config.password {
        session
            .userauth_password(&config.username, password)
            .map_err(|e| FallbackUploadError::Sftp(format!("password auth: {e}")))
    } else {
        Err(FallbackUploadError::Sftp("no SFTP credentials configured".into()))
    }
}

#[async_trait]
impl SftpRequiredHandler for FallbackUploader {
    async fn upload_pending(&self) -> bool {
        match self.upload().await {
            Ok(ok) => ok,
            Err(e) => {
                warn!(error = %e, "fallback upload failed");
                false
            }
        }
    }
}
