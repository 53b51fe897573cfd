//! One-shot HTTP enrollment exchange (spec §6): trades the operator's
//! bearer token for a client certificate, private key, and CA certificate,
//! then persists them under `certs/` with the private key locked to mode
//! `0600`. Modeled on the MDM client's plain-`reqwest` request/response
//! shape, minus its CA-override path (enrollment always talks to the
//! configured `server_url` over whatever certificate chain the OS trusts).

use std::time::Duration;

use fleetlink_domain::{AgentConfig, EnrollRequest, EnrollResponse};
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub enum EnrollmentError {
    #[error("enrollment request failed: {0}")]
    Request(String),
    #[error("not yet approved by an operator; retry later")]
    NotApproved,
    #[error("enrollment rejected: HTTP {0}")]
    Rejected(u16),
    #[error("failed to persist issued credentials: {0}")]
    Persist(String),
}

/// `POST {server_url}/api/v1/agents/enroll` with `{agent_id, agent_name}`
/// and the bearer token; persists the response under `config.certs_dir()`.
#[instrument(skip(config), fields(agent_id = %config.agent_id))]
pub async fn enroll(config: &AgentConfig) -> Result<(), EnrollmentError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| EnrollmentError::Request(e.to_string()))?;

    let url = format!(
        "{}{}",
        config.server_url.trim_end_matches('/'),
        fleetlink_domain::constants::ENROLL_PATH
    );
    let body = EnrollRequest {
        agent_id: config.agent_id.clone(),
        agent_name: config.agent_name.clone(),
    };

    let response = client
        .post(&url)
        .bearer_auth(&config.agent_token)
        .json(&body)
        .send()
        .await
        .map_err(|e| EnrollmentError::Request(e.to_string()))?;

    match response.status().as_u16() {
        200 => {
            let issued: EnrollResponse = response
                .json()
                .await
                .map_err(|e| EnrollmentError::Request(e.to_string()))?;
            persist(config, &issued)?;
            info!("agent enrolled; credentials issued");
            Ok(())
        }
        403 => {
            warn!("enrollment not yet approved by an operator");
            Err(EnrollmentError::NotApproved)
        }
        other => Err(EnrollmentError::Rejected(other)),
    }
}

fn persist(config: &AgentConfig, issued: &EnrollResponse) -> Result<(), EnrollmentError> {
    let dir = config.certs_dir();
    std::fs::create_dir_all(&dir).map_err(|e| EnrollmentError::Persist(e.to_string()))?;

    std::fs::write(config.client_cert_path(), &issued.certificate)
        .map_err(|e| EnrollmentError::Persist(e.to_string()))?;
    std::fs::write(config.ca_cert_path(), &issued.ca_certificate)
        .map_err(|e| EnrollmentError::Persist(e.to_string()))?;

    write_private_key(&config.client_key_path(), &issued.private_key)
}

#[cfg(unix)]
fn write_private_key(path: &std::path::Path, contents: &str) -> Result<(), EnrollmentError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::write(path, contents).map_err(|e| EnrollmentError::Persist(e.to_string()))?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| EnrollmentError::Persist(e.to_string()))
}

#[cfg(not(unix))]
fn write_private_key(path: &std::path::Path, contents: &str) -> Result<(), EnrollmentError> {
    std::fs::write(path, contents).map_err(|e| EnrollmentError::Persist(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{bearer_token, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server_url: String, data_dir: std::path::PathBuf) -> AgentConfig {
        AgentConfig {
            server_url,
            agent_id: "agent-1".into(),
            agent_name: "Test Agent".into(),
            agent_token: "token-xyz".into(),
            data_dir,
            ..AgentConfig::default()
        }
    }

    #[tokio::test]
    async fn successful_enrollment_persists_credentials_with_locked_down_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/agents/enroll"))
            .and(bearer_token("token-xyz"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "certificate": "CERT",
                "private_key": "KEY",
                "ca_certificate": "CA",
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(server.uri(), dir.path().to_path_buf());

        enroll(&config).await.expect("enrollment should succeed");

        assert_eq!(std::fs::read_to_string(config.client_cert_path()).unwrap(), "CERT");
        assert_eq!(std::fs::read_to_string(config.client_key_path()).unwrap(), "KEY");
        assert_eq!(std::fs::read_to_string(config.ca_cert_path()).unwrap(), "CA");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(config.client_key_path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn not_yet_approved_is_a_distinct_retryable_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/agents/enroll"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(server.uri(), dir.path().to_path_buf());

        let result = enroll(&config).await;
        assert!(matches!(result, Err(EnrollmentError::NotApproved)));
    }

    #[tokio::test]
    async fn other_status_codes_are_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/agents/enroll"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(server.uri(), dir.path().to_path_buf());

        let result = enroll(&config).await;
        assert!(matches!(result, Err(EnrollmentError::Rejected(500))));
    }
}
