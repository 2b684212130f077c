//! Analysis handoff
//!
//! The end of a cycle: the assembled [`WorkflowContext`] is handed to a
//! text-generation backend which returns free-text advisory output. The
//! advisory is logged and dropped; it is never fed back into persisted
//! state, and a failed handoff is not retried.

use crate::config::{AnalysisConfig, BackendKind};
use crate::error::AnalysisError;
use crate::logs::FetchOutcome;
use crate::pipeline::WorkflowContext;
use crate::types::status_description;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Trait for analysis backend implementations
pub trait AnalysisBackend: Send + Sync {
    fn analyze<'a>(
        &'a self,
        context: &'a WorkflowContext,
    ) -> Pin<Box<dyn Future<Output = Result<String, AnalysisError>> + Send + 'a>>;
}

/// Build the configured backend
///
/// # Errors
/// Returns an error if the backend's HTTP client cannot be constructed.
pub fn backend_from_config(cfg: &AnalysisConfig) -> Result<Arc<dyn AnalysisBackend>, AnalysisError> {
    match cfg.backend {
        BackendKind::Ollama => Ok(Arc::new(OllamaBackend::new(
            cfg.endpoint.clone(),
            cfg.model.clone(),
            cfg.temperature,
        )?)),
        BackendKind::Mock => Ok(Arc::new(MockBackend)),
    }
}

/// Ollama backend for local LLM inference
pub struct OllamaBackend {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
}

/// Request format for the Ollama generate API
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Response format from the Ollama generate API
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    #[allow(dead_code)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    ///
    /// # Arguments
    /// * `endpoint` - Ollama server URL (e.g., "http://localhost:11434")
    /// * `model` - Model name to use (e.g., "llama3.1:8b")
    /// * `temperature` - Sampling temperature for the advisory text
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(endpoint: String, model: String, temperature: f32) -> Result<Self, AnalysisError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .no_proxy()
            .build()
            .map_err(|e| AnalysisError::BackendError(format!("failed to build client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            model,
            temperature,
        })
    }

    /// Format the Ollama API endpoint URL
    fn api_url(&self) -> String {
        format!("{}/api/generate", self.endpoint.trim_end_matches('/'))
    }
}

impl AnalysisBackend for OllamaBackend {
    fn analyze<'a>(
        &'a self,
        context: &'a WorkflowContext,
    ) -> Pin<Box<dyn Future<Output = Result<String, AnalysisError>> + Send + 'a>> {
        Box::pin(async move {
            let request = OllamaRequest {
                model: self.model.clone(),
                prompt: build_prompt(context),
                stream: false,
                options: OllamaOptions {
                    temperature: self.temperature,
                    num_predict: 1024,
                },
            };

            let response = self
                .client
                .post(self.api_url())
                .json(&request)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        AnalysisError::Timeout
                    } else {
                        AnalysisError::BackendError(format!("request failed: {e}"))
                    }
                })?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(AnalysisError::BackendError(format!(
                    "Ollama API returned {status}: {body}"
                )));
            }

            let ollama: OllamaResponse = response.json().await.map_err(|e| {
                AnalysisError::InvalidResponse(format!("failed to parse Ollama response: {e}"))
            })?;

            if let Some(error) = ollama.error {
                return Err(AnalysisError::BackendError(format!("Ollama error: {error}")));
            }

            Ok(ollama.response.trim().to_string())
        })
    }
}

/// Canned backend for tests and dry runs
pub struct MockBackend;

impl AnalysisBackend for MockBackend {
    fn analyze<'a>(
        &'a self,
        context: &'a WorkflowContext,
    ) -> Pin<Box<dyn Future<Output = Result<String, AnalysisError>> + Send + 'a>> {
        Box::pin(async move {
            let names: Vec<&str> = context
                .critical_reports()
                .map(|report| report.service_name.as_str())
                .collect();
            Ok(format!(
                "mock analysis of {} critical service(s): {}",
                names.len(),
                names.join(", ")
            ))
        })
    }
}

/// Assemble the advisory prompt for the cycle's critical services
pub fn build_prompt(context: &WorkflowContext) -> String {
    let mut prompt = String::from(
        "You are an experienced Linux systems administrator reviewing \
         monitoring alerts. For each failing service below, give a concise \
         probable diagnosis and the next command or check you would run. \
         Be specific and brief.\n\n",
    );

    for report in context.critical_reports() {
        prompt.push_str(&format!(
            "Service: {} - {} [{}]\n",
            report.service_name,
            status_description(report.status),
            report.transition.label()
        ));
        match &report.logs {
            Some(FetchOutcome::Lines(lines)) if !lines.is_empty() => {
                prompt.push_str("Recent logs:\n");
                for line in lines {
                    prompt.push_str(line);
                    prompt.push('\n');
                }
            }
            Some(FetchOutcome::Lines(_)) => {
                prompt.push_str("Log source was empty.\n");
            }
            Some(FetchOutcome::Unavailable { reason }) => {
                prompt.push_str(&format!("Logs unavailable: {reason}\n"));
            }
            None => {
                prompt.push_str("No log context was gathered.\n");
            }
        }
        prompt.push('\n');
    }

    prompt
}
