//! Language-model collaborator abstraction.
//!
//! The continuity checker delegates semantic conflict analysis to an
//! [`Analyst`]. The analyst is a stateless request/response collaborator:
//! it receives a prompt containing the new passage plus retrieved context
//! and must answer with the strict JSON structure the checker parses.
//! Whether it actually does is the checker's problem — this module only
//! moves text.
//!
//! One production implementation is provided, [`AnthropicAnalyst`], using
//! the Anthropic messages API over reqwest with the same retry/backoff
//! discipline as the remote store.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

use crate::config::AnalystConfig;
use crate::models::RelatedSection;

/// Stateless analysis collaborator.
#[async_trait]
pub trait Analyst: Send + Sync {
    /// Returns the model identifier, for report diagnostics.
    fn model_name(&self) -> &str;

    /// Send one analysis request and return the raw response text.
    async fn analyze(&self, system: &str, prompt: &str) -> Result<String>;
}

/// Create the configured analyst, or `None` when no collaborator is
/// available (provider disabled, or its API key absent from the
/// environment). Callers treat `None` as the "no collaborator configured"
/// precondition; only unknown provider names are hard errors.
pub fn create_analyst(config: &AnalystConfig) -> Result<Option<Box<dyn Analyst>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "anthropic" => match std::env::var(&config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => {
                Ok(Some(Box::new(AnthropicAnalyst::new(config, key)?)))
            }
            _ => Ok(None),
        },
        other => bail!("Unknown analyst provider: {}", other),
    }
}

// ============ Anthropic analyst ============

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicAnalyst {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    max_tokens: u32,
    max_retries: u32,
}

impl AnthropicAnalyst {
    pub fn new(config: &AnalystConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| ANTHROPIC_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: config.model.clone(),
            api_key,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Analyst for AnthropicAnalyst {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn analyze(&self, system: &str, prompt: &str) -> Result<String> {
        let url = format!("{}/v1/messages", self.endpoint);
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": system,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let payload: serde_json::Value = response.json().await?;
                        return extract_text(&payload);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "Analyst API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Analyst API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Analyst request failed after retries")))
    }
}

fn extract_text(payload: &serde_json::Value) -> Result<String> {
    payload
        .get("content")
        .and_then(|c| c.as_array())
        .and_then(|blocks| blocks.iter().find(|b| b.get("type").and_then(|t| t.as_str()) == Some("text")))
        .and_then(|b| b.get("text"))
        .and_then(|t| t.as_str())
        .map(|t| t.to_string())
        .ok_or_else(|| anyhow::anyhow!("Analyst response missing text content"))
}

// ============ Prompt construction ============

/// System prompt pinning the response contract.
pub const SYSTEM_PROMPT: &str = r#"You are reviewing a new passage from a long-form manuscript against previously written material from the same author.
Identify contradictions, terminology drift, and internal inconsistencies between the new passage and the established material.

You MUST respond with ONLY valid JSON in this exact structure:
{
    "overall_score": 0-100,
    "issues": [
        {
            "type": "contradiction" | "terminology_shift" | "inconsistency",
            "severity": "high" | "medium" | "low",
            "new_claim": "what the new passage asserts",
            "existing_claim": "the conflicting claim in established material",
            "source_file": "file the existing claim comes from",
            "recommendation": "how to resolve the conflict"
        }
    ],
    "terminology_analysis": {
        "new_terms": ["key terms introduced by the new passage"],
        "potential_shifts": [
            {
                "term": "the term",
                "established_usage": "how earlier material uses it",
                "new_usage": "how the new passage uses it"
            }
        ]
    },
    "summary": "one or two sentences on overall consistency"
}

An empty issues array means the passage is fully consistent. Do not wrap the JSON in markdown formatting."#;

/// Build the user prompt: the new passage plus the selected context
/// sections, most similar first.
pub fn build_analysis_prompt(new_text: &str, context: &[RelatedSection]) -> String {
    let mut prompt = String::new();

    prompt.push_str("NEW PASSAGE:\n");
    prompt.push_str(new_text);
    prompt.push_str("\n\nESTABLISHED MATERIAL (most similar first):\n");

    for (i, section) in context.iter().enumerate() {
        prompt.push_str(&format!(
            "\n[{}] from {} (paragraph {}, similarity {:.2}):\n{}\n",
            i + 1,
            section.source_file,
            section.paragraph_index,
            section.similarity,
            section.text
        ));
    }

    prompt.push_str(
        "\nCompare the new passage against the established material and respond with JSON only.",
    );
    prompt
}
