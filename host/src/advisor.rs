//! ==============================================================================
//! advisor.rs - storage advice from a generative model
//! ==============================================================================
//!
//! purpose:
//!     turns (grain, moisture%) into human-readable storage advice by calling
//!     an ollama-compatible `/api/generate` endpoint with a fixed system
//!     instruction, a templated prompt and a json schema for the answer.
//!
//! failure model:
//!     one attempt per measurement, no retries. transport errors, non-2xx
//!     answers and responses that do not match the advice schema all end in
//!     the same place: the fixed fallback advice plus a notice for the user.
//!     `get_advice` itself never fails.
//!
//! relationships:
//!     - uses: thresholds.rs (rules table in the prompt)
//!     - used by: acquisition/controller.rs (after each window), server.rs
//!
//! ==============================================================================

use crate::config::AdvisorConfig;
use crate::domain::{AdviceResult, GrainType, Notice};
use crate::thresholds::rules_table;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::time::Duration;

const SYSTEM_INSTRUCTION: &str = "You are a helpful assistant that always responds with valid, flat JSON objects. \
Do not include any explanation or schema wrappers. \
Always include all three fields: \"status\", \"title\", and \"suggestion\".";

#[derive(Debug, thiserror::Error)]
pub enum AdvisorError {
    #[error("advisor request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("advisor answered with status {0}")]
    Status(reqwest::StatusCode),
    #[error("advisor response did not match the advice schema: {0}")]
    Schema(#[from] serde_json::Error),
}

/// anything that can produce advice for a measurement
pub trait Advisor: Send + Sync + 'static {
    fn advise(
        &self,
        grain: GrainType,
        moisture_percent: f64,
    ) -> impl Future<Output = Result<AdviceResult, AdvisorError>> + Send;
}

/// advice plus the notice to raise when it had to be substituted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdviceOutcome {
    pub advice: AdviceResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<Notice>,
}

pub fn advisor_error_notice() -> Notice {
    Notice {
        title: "AI Advisor Error".to_string(),
        description: "There was an issue connecting to the harvest advisor service.".to_string(),
    }
}

/// one attempt; failures degrade to the fallback advice
pub async fn get_advice<A: Advisor>(
    advisor: &A,
    grain: GrainType,
    moisture_percent: f64,
) -> AdviceOutcome {
    match advisor.advise(grain, moisture_percent).await {
        Ok(advice) => {
            tracing::info!(
                "[ADVISOR] {} @ {:.1}% -> {}",
                grain,
                moisture_percent,
                advice.status.as_str()
            );
            AdviceOutcome { advice, notice: None }
        }
        Err(e) => {
            tracing::warn!("[ADVISOR] ⚠ {} - using fallback advice", e);
            AdviceOutcome {
                advice: AdviceResult::fallback(),
                notice: Some(advisor_error_notice()),
            }
        }
    }
}

pub fn build_prompt(grain: GrainType, moisture_percent: f64) -> String {
    format!(
        r#"You are an expert agronomist. Provide advice based on grain moisture.

DATA:
- Grain Type: {grain}
- Moisture Content: {moisture_percent}%

RULES:
{rules}

EXAMPLE RESPONSE:
{{
  "status": "good",
  "title": "Ready for Storage",
  "suggestion": "The moisture level is perfect. You should proceed with storage immediately to ensure best quality."
}}

RESPONSE INSTRUCTIONS:
1. Return ONLY the JSON object.
2. You MUST include the "suggestion" field with at least 2 sentences of advice regarding storage.
3. Do not include any other text."#,
        rules = rules_table(),
    )
}

/// json schema handed to the model as the `format` constraint
pub fn advice_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "status": {
                "type": "string",
                "enum": ["good", "caution", "bad"],
                "description": "\"good\" for ideal conditions, \"caution\" for acceptable but not ideal, \"bad\" for poor conditions."
            },
            "title": {
                "type": "string",
                "description": "A short, catchy title for the advice."
            },
            "suggestion": {
                "type": "string",
                "description": "A detailed, actionable suggestion explaining the reasoning."
            }
        },
        "required": ["status", "title", "suggestion"],
        "additionalProperties": false
    })
}

// ==============================================================================
// ollama
// ==============================================================================

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: String,
    format: serde_json::Value,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f64,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

pub struct OllamaAdvisor {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f64,
}

impl OllamaAdvisor {
    pub fn new(config: &AdvisorConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("failed to build advisor http client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/generate", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

impl Advisor for OllamaAdvisor {
    async fn advise(
        &self,
        grain: GrainType,
        moisture_percent: f64,
    ) -> Result<AdviceResult, AdvisorError> {
        let request = GenerateRequest {
            model: &self.model,
            system: SYSTEM_INSTRUCTION,
            prompt: build_prompt(grain, moisture_percent),
            format: advice_schema(),
            stream: false,
            options: GenerateOptions { temperature: self.temperature },
        };

        let response = self.client.post(&self.endpoint).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(AdvisorError::Status(response.status()));
        }

        let body: GenerateResponse = response.json().await?;
        Ok(serde_json::from_str::<AdviceResult>(body.response.trim())?)
    }
}
