//! LLM routing between a fast and a strong model.
//!
//! Each task type maps to a complexity tier: simple and moderate tasks
//! go to the fast model, complex tasks to the strong one. Callers may
//! force a tier instead of automatic routing. On a call failure the
//! router retries once against the other tier before propagating a
//! [`PipelineError::GenerationFailure`] — the pipeline's only automatic
//! retry.
//!
//! JSON-mode requests append an explicit "respond with valid JSON only"
//! instruction; [`parse_json_response`] strips code-fence artifacts and
//! returns a typed [`PipelineError::SchemaViolation`] instead of using
//! errors for ordinary branching.

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::PipelineError;

/// Model tier selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Fast,
    Strong,
    /// Route automatically from the task type.
    Auto,
}

/// Task complexity, derived from the task type label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskComplexity {
    Simple,
    Moderate,
    Complex,
}

/// Map a task type label to its complexity tier. Unknown tasks are
/// treated as complex.
pub fn task_complexity(task_type: &str) -> TaskComplexity {
    match task_type {
        "classification" | "keyword_extraction" | "language_detection" | "simple_qa" => {
            TaskComplexity::Simple
        }
        "categorization" | "entity_extraction" | "template_filling" => TaskComplexity::Moderate,
        "summary_extraction"
        | "checklist_generation"
        | "offer_analysis"
        | "compliance_check"
        | "clarification_drafting"
        | "document_understanding" => TaskComplexity::Complex,
        _ => TaskComplexity::Complex,
    }
}

/// A single generation backend (one concrete model).
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn model_name(&self) -> &str;

    /// Generate a completion for the prompt. `json_mode` requests a
    /// JSON-only response.
    async fn generate(&self, prompt: &str, json_mode: bool) -> Result<String>;
}

// ============ Gemini REST client ============

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

/// Client for the Google Generative Language `generateContent` API.
pub struct GeminiClient {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
    temperature: f32,
    max_output_tokens: u32,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig, model: &str) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;

        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()?,
            url: config.url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.url, self.model)
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, json_mode: bool) -> Result<String> {
        let prompt = if json_mode {
            format!("{}\n\nRespond with valid JSON only.", prompt)
        } else {
            prompt.to_string()
        };

        let request = GenerateRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("{} generation failed ({}): {}", self.model, status, body);
        }

        let parsed: GenerateResponse = response.json().await?;
        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| anyhow::anyhow!("No text in {} response", self.model))
    }
}

// ============ Router ============

/// Routes generation requests to the fast or strong model by task
/// type, with a single cross-tier fallback on failure.
pub struct LlmRouter {
    fast: Box<dyn LlmClient>,
    strong: Box<dyn LlmClient>,
}

impl LlmRouter {
    pub fn new(fast: Box<dyn LlmClient>, strong: Box<dyn LlmClient>) -> Self {
        Self { fast, strong }
    }

    /// Build both tiers from configuration.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Ok(Self::new(
            Box::new(GeminiClient::new(config, &config.fast_model)?),
            Box::new(GeminiClient::new(config, &config.strong_model)?),
        ))
    }

    fn route(&self, task_type: &str, tier: ModelTier) -> (&dyn LlmClient, &dyn LlmClient) {
        let use_strong = match tier {
            ModelTier::Fast => false,
            ModelTier::Strong => true,
            ModelTier::Auto => task_complexity(task_type) == TaskComplexity::Complex,
        };
        if use_strong {
            (self.strong.as_ref(), self.fast.as_ref())
        } else {
            (self.fast.as_ref(), self.strong.as_ref())
        }
    }

    /// Generate text for the task, retrying once on the other tier.
    pub async fn generate(
        &self,
        prompt: &str,
        task_type: &str,
        tier: ModelTier,
        json_mode: bool,
    ) -> Result<String, PipelineError> {
        let (primary, fallback) = self.route(task_type, tier);

        match primary.generate(prompt, json_mode).await {
            Ok(text) => Ok(text),
            Err(primary_err) => {
                tracing::warn!(
                    model = primary.model_name(),
                    error = %primary_err,
                    "generation failed, retrying on other tier"
                );
                fallback.generate(prompt, json_mode).await.map_err(|e| {
                    PipelineError::GenerationFailure(format!(
                        "{}: {}; fallback {}: {}",
                        primary.model_name(),
                        primary_err,
                        fallback.model_name(),
                        e
                    ))
                })
            }
        }
    }

    /// Generate and parse a JSON-shaped response.
    pub async fn generate_json(
        &self,
        prompt: &str,
        task_type: &str,
        tier: ModelTier,
    ) -> Result<serde_json::Value, PipelineError> {
        let response = self.generate(prompt, task_type, tier, true).await?;
        parse_json_response(&response)
    }
}

/// Strip code-fence artifacts and parse the response as JSON. An
/// unparseable response is a [`PipelineError::SchemaViolation`].
pub fn parse_json_response(response: &str) -> Result<serde_json::Value, PipelineError> {
    let mut text = response.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        text = stripped;
    } else if let Some(stripped) = text.strip_prefix("```") {
        text = stripped;
    }
    if let Some(stripped) = text.strip_suffix("```") {
        text = stripped;
    }

    serde_json::from_str(text.trim())
        .map_err(|e| PipelineError::SchemaViolation(format!("invalid JSON: {}", e)))
}


#[cfg(test)]
mod tests {
    use super::test_support::ScriptedClient;
    use super::*;

    #[test]
    fn task_tiers_map_as_expected() {
        assert_eq!(task_complexity("classification"), TaskComplexity::Simple);
        assert_eq!(task_complexity("entity_extraction"), TaskComplexity::Moderate);
        assert_eq!(task_complexity("summary_extraction"), TaskComplexity::Complex);
        assert_eq!(task_complexity("something_new"), TaskComplexity::Complex);
    }

    #[tokio::test]
    async fn simple_tasks_use_fast_model() {
        let fast = ScriptedClient::new("fast", vec![Ok("fast answer".into())]);
        let strong = ScriptedClient::new("strong", vec![Ok("strong answer".into())]);
        let router = LlmRouter::new(Box::new(fast), Box::new(strong));

        let answer = router
            .generate("classify this", "classification", ModelTier::Auto, false)
            .await
            .unwrap();
        assert_eq!(answer, "fast answer");
    }

    #[tokio::test]
    async fn complex_tasks_use_strong_model() {
        let fast = ScriptedClient::new("fast", vec![Ok("fast answer".into())]);
        let strong = ScriptedClient::new("strong", vec![Ok("strong answer".into())]);
        let router = LlmRouter::new(Box::new(fast), Box::new(strong));

        let answer = router
            .generate("summarize", "summary_extraction", ModelTier::Auto, false)
            .await
            .unwrap();
        assert_eq!(answer, "strong answer");
    }

    #[tokio::test]
    async fn failure_falls_back_to_other_tier_once() {
        let fast = ScriptedClient::new("fast", vec![Err("rate limited".into())]);
        let strong = ScriptedClient::new("strong", vec![Ok("recovered".into())]);
        let router = LlmRouter::new(Box::new(fast), Box::new(strong));

        let answer = router
            .generate("classify", "classification", ModelTier::Auto, false)
            .await
            .unwrap();
        assert_eq!(answer, "recovered");
    }

    #[tokio::test]
    async fn both_tiers_failing_is_generation_failure() {
        let fast = ScriptedClient::new("fast", vec![Err("down".into())]);
        let strong = ScriptedClient::new("strong", vec![Err("also down".into())]);
        let router = LlmRouter::new(Box::new(fast), Box::new(strong));

        let err = router
            .generate("classify", "classification", ModelTier::Auto, false)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::GenerationFailure(_)));
    }

    #[tokio::test]
    async fn forced_tier_overrides_routing() {
        let fast = ScriptedClient::new("fast", vec![Ok("fast answer".into())]);
        let strong = ScriptedClient::new("strong", vec![Ok("strong answer".into())]);
        let router = LlmRouter::new(Box::new(fast), Box::new(strong));

        let answer = router
            .generate("summarize", "summary_extraction", ModelTier::Fast, false)
            .await
            .unwrap();
        assert_eq!(answer, "fast answer");
    }

    #[test]
    fn json_parsing_strips_code_fences() {
        let fenced = "```json\n{\"category\": \"itt\"}\n```";
        let value = parse_json_response(fenced).unwrap();
        assert_eq!(value["category"], serde_json::json!("itt"));

        let bare_fence = "```\n[1, 2]\n```";
        assert_eq!(parse_json_response(bare_fence).unwrap(), serde_json::json!([1, 2]));

        let plain = "{\"ok\": true}";
        assert_eq!(parse_json_response(plain).unwrap()["ok"], serde_json::json!(true));
    }

    #[test]
    fn non_json_is_schema_violation() {
        let err = parse_json_response("I could not find any dates.").unwrap_err();
        assert!(matches!(err, PipelineError::SchemaViolation(_)));
    }
}
