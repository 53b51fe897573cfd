//! Wire types for the primary control-link transport: a bidirectional
//! framed session where each frame is a UTF-8 JSON object with a `type`
//! discriminator (spec §6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status of a `result` frame, carried back to the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Success,
    Error,
    Timeout,
    Cancelled,
    Partial,
}

/// Host telemetry carried on `heartbeat` and `metrics` frames.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostMetrics {
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub memory_used_mb: u64,
    pub disk_percent: f32,
    pub disk_free_gb: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub reconnect_count: u64,
    pub pending_queue_size: u64,
}

/// One inbound or outbound frame on the primary transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// A→S: periodic liveness + telemetry signal.
    Heartbeat {
        agent_id: String,
        version: String,
        timestamp: DateTime<Utc>,
        metrics: HostMetrics,
    },
    /// A→S: reply to a dispatched command.
    Result {
        id: String,
        task_id: String,
        status: ResultStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// A→S: a forwarded log line.
    Log { level: String, message: String, timestamp: DateTime<Utc> },
    /// A→S: a forwarded metrics sample.
    Metrics { metrics: HostMetrics, timestamp: DateTime<Utc> },
    /// S→A: a command to execute.
    Command { id: String, action: String, params: Value },
    /// S→A: acknowledgement of a previously sent frame.
    Ack { id: String },
    /// S→A: a configuration update to apply.
    ConfigUpdate { params: Value },
}

impl Frame {
    /// The `type` discriminator as it appears on the wire.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Heartbeat { .. } => "heartbeat",
            Self::Result { .. } => "result",
            Self::Log { .. } => "log",
            Self::Metrics { .. } => "metrics",
            Self::Command { .. } => "command",
            Self::Ack { .. } => "ack",
            Self::ConfigUpdate { .. } => "config_update",
        }
    }
}

/// A command dispatched from the control plane to a local handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub id: String,
    pub action: String,
    pub params: Value,
}

/// The document a command handler returns; re-wrapped as a `result` frame
/// with the same `id` the command carried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub status: ResultStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandOutcome {
    #[must_use]
    pub fn success(data: Value) -> Self {
        Self { status: ResultStatus::Success, data: Some(data), error: None }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self { status: ResultStatus::Error, data: None, error: Some(message.into()) }
    }
}

/// Enrollment request body for `POST /api/v1/agents/enroll`.
#[derive(Debug, Clone, Serialize)]
pub struct EnrollRequest {
    pub agent_id: String,
    pub agent_name: String,
}

/// Successful enrollment response: issued credentials to persist under
/// `certs/`.
#[derive(Debug, Clone, Deserialize)]
pub struct EnrollResponse {
    pub certificate: String,
    pub private_key: String,
    pub ca_certificate: String,
}
