//! Outbound call control
//!
//! The carrier-specific REST surface stays behind this trait: answering an
//! inbound call means returning an answer document that points the carrier's
//! media stream at our WebSocket, and dialing out means one provider REST
//! call whose payload is passed through untouched.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use voxflow_core::error::TransportError;
use voxflow_core::Result;

/// Render the answer document connecting a call to a media stream URL.
/// Custom parameters are exposed to the session as stream parameters.
pub fn answer_document(media_url: &str, parameters: &HashMap<String, String>) -> String {
    let mut params = String::new();
    let mut sorted: Vec<_> = parameters.iter().collect();
    sorted.sort_by_key(|(k, _)| k.as_str());
    for (name, value) in sorted {
        params.push_str(&format!(
            "      <Parameter name=\"{name}\" value=\"{value}\"/>\n"
        ));
    }
    format!(
        "<Response>\n  <Connect>\n    <Stream url=\"{media_url}\">\n{params}    </Stream>\n  </Connect>\n</Response>"
    )
}

/// Carrier call-control surface
#[async_trait]
pub trait CallControl: Send + Sync {
    /// Place an outbound call that will stream media to `media_url`.
    /// Returns the carrier's response payload as-is.
    async fn dial(
        &self,
        to_number: &str,
        from_number: &str,
        media_url: &str,
    ) -> Result<Value>;
}

/// REST-based call control against a carrier API endpoint
pub struct HttpCallControl {
    client: reqwest::Client,
    endpoint: String,
    account_id: String,
    auth_token: String,
}

impl HttpCallControl {
    pub fn new(
        endpoint: impl Into<String>,
        account_id: impl Into<String>,
        auth_token: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| voxflow_core::Error::config(format!("call control client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            account_id: account_id.into(),
            auth_token: auth_token.into(),
        })
    }
}

#[async_trait]
impl CallControl for HttpCallControl {
    async fn dial(&self, to_number: &str, from_number: &str, media_url: &str) -> Result<Value> {
        debug!(to_number, from_number, "placing outbound call");
        let body = serde_json::json!({
            "to": to_number,
            "from": from_number,
            "answer": answer_document(media_url, &HashMap::new()),
        });
        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.account_id, Some(&self.auth_token))
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Handshake(format!("dial request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Handshake(format!("dial response read failed: {e}")))?;
        if !status.is_success() {
            return Err(TransportError::Handshake(format!(
                "carrier returned status {}: {}",
                status.as_u16(),
                text
            ))
            .into());
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}
