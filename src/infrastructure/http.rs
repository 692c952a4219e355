//! HTTP attribute source.
//!
//! Speaks the JSON management-bridge protocol engines expose over HTTP:
//! a single endpoint accepting `search`, `read`, and `exec` requests and
//! answering with a `{status, value}` envelope. Local-attach endpoints
//! resolve the bridge URL a process advertises in its per-pid address
//! file, then speak the same protocol.

use crate::domain::errors::SourceError;
use crate::domain::ports::{AttributeSource, SourceConnector};
use crate::domain::types::{
    AttributeMap, Credentials, EngineEndpoint, EngineIdentity, ObjectIdentifier,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens HTTP attribute sources. Remote endpoints connect straight to
/// `host:port`; local endpoints are resolved through their address file.
pub struct HttpSourceConnector {
    client: reqwest::Client,
}

impl HttpSourceConnector {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("default reqwest client");
        Self { client }
    }
}

impl Default for HttpSourceConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceConnector for HttpSourceConnector {
    async fn connect(
        &self,
        endpoint: &EngineEndpoint,
    ) -> Result<Box<dyn AttributeSource>, SourceError> {
        let base_url = match &endpoint.identity {
            EngineIdentity::Remote { host, port } => {
                format!("http://{}:{}/management", host, port)
            }
            EngineIdentity::Local { pid } => local_management_url(*pid)?,
        };
        info!(
            "Connect to engine {} on management url {}",
            endpoint.name, base_url
        );

        let source = HttpAttributeSource {
            client: self.client.clone(),
            base_url,
            credentials: endpoint.credentials.clone(),
        };
        source.probe(&endpoint.name).await?;
        Ok(Box::new(source))
    }
}

/// Read the management URL a local process advertises in its address
/// file. Absent file means the process exposes no management interface.
fn local_management_url(pid: u32) -> Result<String, SourceError> {
    let path = std::env::temp_dir().join(format!("engine-mgmt.{}", pid));
    let url = std::fs::read_to_string(&path).map_err(|e| SourceError::Connection {
        reason: format!("no management address for pid {}: {}", pid, e),
    })?;
    Ok(url.trim().to_string())
}

struct HttpAttributeSource {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<Credentials>,
}

#[derive(Debug, Deserialize)]
struct BridgeResponse {
    status: u16,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    error: Option<String>,
}

impl HttpAttributeSource {
    /// Connect-time probe so unreachability and bad credentials surface
    /// as connectivity errors instead of failing the first query.
    async fn probe(&self, engine: &str) -> Result<(), SourceError> {
        let mut request = self.client.post(&self.base_url).json(&json!({
            "type": "version",
        }));
        if let Some(c) = &self.credentials {
            request = request.basic_auth(&c.username, Some(&c.password));
        }

        let response = request.send().await.map_err(|e| SourceError::Connection {
            reason: format!("{}: {}", engine, e),
        })?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SourceError::Authentication {
                username: self
                    .credentials
                    .as_ref()
                    .map(|c| c.username.clone())
                    .unwrap_or_default(),
            });
        }
        if !status.is_success() {
            return Err(SourceError::Connection {
                reason: format!("{}: HTTP {}", engine, status),
            });
        }
        Ok(())
    }

    async fn execute(&self, body: Value) -> Result<Value, String> {
        let mut request = self.client.post(&self.base_url).json(&body);
        if let Some(c) = &self.credentials {
            request = request.basic_auth(&c.username, Some(&c.password));
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }
        let parsed: BridgeResponse = response.json().await.map_err(|e| e.to_string())?;
        if parsed.status != 200 {
            return Err(parsed
                .error
                .unwrap_or_else(|| format!("bridge status {}", parsed.status)));
        }
        Ok(parsed.value)
    }
}

#[async_trait]
impl AttributeSource for HttpAttributeSource {
    async fn list_identifiers(
        &self,
        pattern: &str,
    ) -> Result<Vec<ObjectIdentifier>, SourceError> {
        let value = self
            .execute(json!({ "type": "search", "pattern": pattern }))
            .await
            .map_err(|reason| SourceError::Query {
                pattern: pattern.to_string(),
                reason,
            })?;

        let names = value.as_array().ok_or_else(|| SourceError::Query {
            pattern: pattern.to_string(),
            reason: format!("expected an array of object names, got {}", value),
        })?;
        Ok(names
            .iter()
            .filter_map(Value::as_str)
            .map(ObjectIdentifier::new)
            .collect())
    }

    async fn get_attributes(&self, id: &ObjectIdentifier) -> Result<AttributeMap, SourceError> {
        let value = self
            .execute(json!({ "type": "read", "name": id.as_str() }))
            .await
            .map_err(|reason| SourceError::AttributeFetch {
                object: id.to_string(),
                reason,
            })?;

        let map = value.as_object().ok_or_else(|| SourceError::AttributeFetch {
            object: id.to_string(),
            reason: format!("expected an attribute map, got {}", value),
        })?;
        Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    async fn invoke_reset(&self, id: &ObjectIdentifier) -> Result<(), SourceError> {
        self.execute(json!({
            "type": "exec",
            "name": id.as_str(),
            "operation": "resetStats",
        }))
        .await
        .map(|_| ())
        .map_err(|reason| SourceError::Invoke {
            object: id.to_string(),
            operation: "resetStats".to_string(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_local_management_url_reads_address_file() {
        let pid = 991_337;
        let path = std::env::temp_dir().join(format!("engine-mgmt.{}", pid));
        fs::write(&path, "http://127.0.0.1:5561/management\n").unwrap();

        let url = local_management_url(pid).unwrap();
        assert_eq!(url, "http://127.0.0.1:5561/management");

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_local_management_url_missing_file() {
        let err = local_management_url(991_338).unwrap_err();
        assert!(matches!(err, SourceError::Connection { .. }));
        assert!(err.to_string().contains("991338"));
    }
}
