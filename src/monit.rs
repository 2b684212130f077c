//! Monit status client
//!
//! Fetches the XML status listing from a Monit instance and turns it into
//! [`ServiceHealth`] entries. Leaf values stay strings, as Monit emits them;
//! the whole service element is re-serialized to JSON to form the opaque
//! snapshot payload. A malformed individual entry is skipped with a warning
//! so one bad service cannot poison the rest of the listing.

use crate::config::MonitConfig;
use crate::error::PollError;
use crate::types::ServiceHealth;
use log::warn;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP client for the Monit status endpoint
pub struct MonitClient {
    client: reqwest::Client,
    url: String,
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct MonitStatus {
    #[serde(rename = "service", default)]
    services: Vec<MonitService>,
}

/// One `<service>` element from the status document
///
/// Every leaf is optional and kept as text: the set of fields Monit emits
/// varies by service type, and the payload is stored verbatim rather than
/// interpreted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitService {
    #[serde(rename = "@type", default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitormode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pendingaction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ppid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryUsage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percenttotal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kilobyte: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kilobytetotal: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CpuUsage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percenttotal: Option<String>,
}

impl MonitClient {
    /// Build a client from the `[monit]` configuration section
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(cfg: &MonitConfig) -> Result<Self, PollError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .no_proxy()
            .build()?;
        Ok(Self {
            client,
            url: cfg.url.clone(),
            username: cfg.username.clone(),
            password: cfg.password.clone(),
        })
    }

    /// Fetch and parse the full current status listing
    ///
    /// # Errors
    /// Returns an error if the endpoint is unreachable, answers with a
    /// non-success status, or the document as a whole cannot be parsed.
    pub async fn fetch_status(&self) -> Result<Vec<ServiceHealth>, PollError> {
        let response = self
            .client
            .get(&self.url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| PollError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PollError::BadStatus(response.status().as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| PollError::Unreachable(e.to_string()))?;
        parse_status_xml(&body)
    }
}

/// Parse a Monit status document into per-service health entries
///
/// A document-level parse failure is an error; a single service entry with
/// a missing name or non-numeric status is skipped with a warning.
pub fn parse_status_xml(xml: &str) -> Result<Vec<ServiceHealth>, PollError> {
    let status: MonitStatus =
        quick_xml::de::from_str(xml).map_err(|e| PollError::ParseError(e.to_string()))?;

    let mut services = Vec::with_capacity(status.services.len());
    for raw in status.services {
        if let Some(health) = normalize(raw) {
            services.push(health);
        }
    }
    Ok(services)
}

fn normalize(raw: MonitService) -> Option<ServiceHealth> {
    let name = match raw.name.as_deref() {
        Some(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => {
            warn!("skipping status entry without a service name");
            return None;
        }
    };

    let status = match raw.status.as_deref().map(|s| s.trim().parse::<i64>()) {
        Some(Ok(code)) => code,
        _ => {
            warn!("skipping service {name}: missing or non-numeric status");
            return None;
        }
    };

    let payload = match serde_json::to_string(&raw) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("skipping service {name}: payload serialization failed: {e}");
            return None;
        }
    };

    Some(ServiceHealth {
        name,
        status,
        payload,
    })
}
