//! Remote settings for a supervision cycle.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Config;
use crate::error::{Result, WardenError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on the response body kept in an `Http` error.
const MAX_ERROR_BODY_BYTES: usize = 2048;

/// Settings payload fetched from the remote API.
///
/// Kept as raw JSON so that fields this supervisor does not understand pass
/// through to the worker unmodified. The only field read here is
/// `worker.version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings {
    raw: Value,
}

impl Settings {
    pub fn from_value(raw: Value) -> Self {
        Self { raw }
    }

    /// The worker version required by the remote side, if present.
    pub fn worker_version(&self) -> Option<&str> {
        self.raw
            .get("worker")
            .and_then(|w| w.get("version"))
            .and_then(Value::as_str)
    }

    pub fn as_json(&self) -> &Value {
        &self.raw
    }
}

/// HTTP client for the settings API.
#[derive(Debug, Clone)]
pub struct SettingsClient {
    http: reqwest::Client,
}

impl SettingsClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http })
    }

    /// Fetch settings with a single GET, authenticated by `token`.
    ///
    /// Transport failures surface as `Network`, non-200 responses as
    /// `Http { status, body }`, and unparseable bodies as `Parse`.
    pub async fn fetch(&self, config: &Config, token: &str) -> Result<Settings> {
        let url = format!("{}{}", config.host, config.api_endpoint);
        tracing::debug!(url = %url, "Fetching settings");

        let response = self
            .http
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, token)
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(MAX_ERROR_BODY_BYTES);
            return Err(WardenError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let raw: Value = serde_json::from_str(&body)?;
        Ok(Settings::from_value(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn worker_version_reads_nested_field() {
        let settings = Settings::from_value(json!({
            "worker": { "version": "2.0.0", "threads": 4 },
            "upload": { "bucket": "imgs" }
        }));
        assert_eq!(settings.worker_version(), Some("2.0.0"));
    }

    #[test]
    fn worker_version_absent() {
        assert_eq!(Settings::from_value(json!({})).worker_version(), None);
        assert_eq!(
            Settings::from_value(json!({ "worker": {} })).worker_version(),
            None
        );
        // non-string versions are treated as absent
        assert_eq!(
            Settings::from_value(json!({ "worker": { "version": 2 } })).worker_version(),
            None
        );
    }

    #[test]
    fn unknown_fields_pass_through() {
        let raw = json!({ "worker": { "version": "1.0.0" }, "opaque": [1, 2, 3] });
        let settings = Settings::from_value(raw.clone());
        assert_eq!(settings.as_json(), &raw);
    }
}
