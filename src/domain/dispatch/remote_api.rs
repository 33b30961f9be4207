use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::domain::dispatch::connection::{CommandOutput, HostConnection};
use crate::domain::ids::HostName;
use crate::error::{Error, Result};

#[derive(Debug)]
pub enum BridgeEndpoint {
    Execute,
    Health,
}

impl BridgeEndpoint {
    pub fn path(&self) -> &str {
        match self {
            Self::Execute => "/api/v1/execute",
            Self::Health => "/api/v1/health",
        }
    }
}

#[derive(Debug, Serialize)]
struct ExecuteRequest<'a> {
    host: &'a str,
    command: &'a [String],
}

#[derive(Debug, Deserialize)]
struct ExecuteResponse {
    exit_code: i32,
    stdout: String,
    stderr: String,
}

/// Runs engine commands through an HTTP bridge colocated with the
/// cluster, for deployments where the controller has no shell access
/// to the hosts.
#[derive(Debug)]
pub struct RemoteApiConnection {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteApiConnection {
    pub fn new(base_url: &str, user_name: &str, auth_token: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-CRM-USER-NAME",
            HeaderValue::from_str(user_name).map_err(|e| Error::ValidationError(format!("Invalid bridge user name: {}", e)))?,
        );
        headers.insert(
            "X-CRM-AUTH-TOKEN",
            HeaderValue::from_str(auth_token).map_err(|e| Error::ValidationError(format!("Invalid bridge auth token: {}", e)))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Error::ValidationError(format!("Could not build the bridge HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, endpoint: &BridgeEndpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path())
    }

    /// Checks that the bridge is reachable and accepts our credentials.
    pub async fn probe(&self) -> Result<()> {
        let endpoint = BridgeEndpoint::Health;
        let response = self.client.get(self.url(&endpoint)).send().await.map_err(|e| Error::ConnectionError {
            host: self.base_url.clone(),
            reason: format!("bridge is unreachable: {}", e),
        })?;
        let status = response.status();

        if status.is_success() {
            log::info!("Command bridge at '{}' is healthy.", self.base_url);
            Ok(())
        } else {
            let body_text = response.text().await.unwrap_or_default();
            log::error!(
                "Health probe of the command bridge failed.\nBridge-URL: <<{}>>\nRequested-Endpoint: <<{:?}>>\nResponse-Status-Code: <<{}>>\nResponse-Body: <<{}>>",
                self.base_url,
                endpoint,
                status,
                body_text
            );
            Err(Error::ConnectionError {
                host: self.base_url.clone(),
                reason: format!("health probe returned status {}", status),
            })
        }
    }
}

#[async_trait]
impl HostConnection for RemoteApiConnection {
    async fn execute(&self, argv: &[String], host: &HostName) -> Result<CommandOutput> {
        let endpoint = BridgeEndpoint::Execute;
        let request = ExecuteRequest {
            host: host.as_str(),
            command: argv,
        };

        let response = self
            .client
            .post(self.url(&endpoint))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::ConnectionError {
                host: host.to_string(),
                reason: format!("bridge request failed: {}", e),
            })?;
        let status = response.status();

        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            log::error!(
                "Command execution over the bridge failed.\nBridge-URL: <<{}>>\nRequested-Endpoint: <<{:?}>>\nTarget-Host: <<{}>>\nResponse-Status-Code: <<{}>>\nResponse-Body: <<{}>>",
                self.base_url,
                endpoint,
                host,
                status,
                body_text
            );
            return Err(Error::ConnectionError {
                host: host.to_string(),
                reason: format!("bridge returned status {}", status),
            });
        }

        let payload: ExecuteResponse = response.json().await.map_err(|e| Error::ConnectionError {
            host: host.to_string(),
            reason: format!("bridge returned a malformed response: {}", e),
        })?;

        Ok(CommandOutput {
            exit_code: payload.exit_code,
            stdout: payload.stdout,
            stderr: payload.stderr,
        })
    }
}
