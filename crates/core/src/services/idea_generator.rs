//! Idea generation through an OpenAI-compatible chat completions API.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use upcycle_common::{AppError, AppResult, config::GenerationConfig};

static JSON_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json)?\s*\n([\s\S]*?)\n\s*```").expect("valid fence regex"));

static JSON_ARRAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[\s\S]*\]").expect("valid array regex"));

const SYSTEM_PROMPT: &str = "You are an expert in sustainable manufacturing and circular economy. \
Always respond with valid JSON only. When asked to avoid certain ideas, you MUST generate \
completely different concepts.";

/// Waste attributes handed to the generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WasteInput {
    pub material: String,
    pub quantity: String,
    pub properties: Vec<String>,
    pub industry: String,
}

/// A previously generated idea the generator must not repeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedIdea {
    pub name: String,
    pub description: String,
}

/// One idea candidate as returned by the generator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedIdea {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub target_market: String,
    /// Detailed prompt for generative image providers.
    #[serde(default)]
    pub visual_description: Option<String>,
    /// Comma-separated keywords for stock photo search.
    #[serde(default)]
    pub image_keywords: Option<String>,
    #[serde(default)]
    pub research_questions: Vec<String>,
    #[serde(default)]
    pub success_factors: Vec<String>,
}

/// External idea generator.
#[async_trait]
pub trait IdeaGenerator: Send + Sync {
    /// Generate idea candidates for the input, avoiding the excluded ideas.
    async fn generate(
        &self,
        input: &WasteInput,
        exclusions: &[ExcludedIdea],
    ) -> AppResult<Vec<GeneratedIdea>>;
}

/// Drop ideas whose name contains, or is contained in, an excluded name
/// (case-insensitive).
#[must_use]
pub fn filter_excluded(
    ideas: Vec<GeneratedIdea>,
    exclusions: &[ExcludedIdea],
) -> Vec<GeneratedIdea> {
    if exclusions.is_empty() {
        return ideas;
    }

    let excluded: Vec<String> = exclusions
        .iter()
        .map(|e| e.name.trim().to_lowercase())
        .filter(|n| !n.is_empty())
        .collect();

    ideas
        .into_iter()
        .filter(|idea| {
            let name = idea.name.trim().to_lowercase();
            let similar = excluded
                .iter()
                .any(|e| name.contains(e.as_str()) || e.contains(name.as_str()));
            if similar {
                debug!(name = %idea.name, "Dropping idea similar to an earlier one");
            }
            !similar
        })
        .collect()
}

/// Pull the JSON idea array out of a model response.
///
/// Accepts a fenced code block, a bare array embedded in prose, or a response
/// that is only JSON.
pub fn parse_ideas(content: &str) -> AppResult<Vec<GeneratedIdea>> {
    let json = JSON_FENCE_RE
        .captures(content)
        .and_then(|c| c.get(1))
        .or_else(|| JSON_ARRAY_RE.find(content))
        .map_or(content, |m| m.as_str());

    serde_json::from_str(json.trim()).map_err(|e| {
        warn!(error = %e, "Idea generator returned unparseable content");
        AppError::ExternalService(format!("Failed to parse idea generator response: {e}"))
    })
}

/// Build the user prompt for one generation request.
#[must_use]
pub fn build_prompt(input: &WasteInput, exclusions: &[ExcludedIdea], idea_count: usize) -> String {
    let mut prompt = format!(
        "Given the following industrial waste:\n\
         - Material: {}\n\
         - Quantity: {}\n\
         - Properties: {}\n\
         - Industry: {}\n",
        input.material,
        input.quantity,
        input.properties.join(", "),
        input.industry,
    );

    if !exclusions.is_empty() {
        let names: Vec<String> = exclusions.iter().map(|e| format!("\"{}\"", e.name)).collect();
        prompt.push_str(&format!(
            "\nIMPORTANT: You have previously generated these ideas: {}.\n\
             DO NOT repeat these ideas or very similar concepts. Generate completely NEW and \
             DIFFERENT product ideas.\n",
            names.join(", ")
        ));
    }

    prompt.push_str(&format!(
        "\nGenerate exactly {idea_count} innovative, high-value upcycled product ideas. \
         Respond with a JSON array where each element has: \
         \"name\" (short, marketable, unique), \
         \"description\" (2-3 sentences), \
         \"targetMarket\", \
         \"visualDescription\" (detailed appearance, materials, colors, setting, lighting and \
         camera angle for image generation), \
         \"imageKeywords\" (2-3 comma-separated keywords), \
         \"researchQuestions\" (3-4 business validation questions) and \
         \"successFactors\" (2-3 critical factors)."
    ));

    prompt
}

/// Generator backed by an OpenAI-compatible chat completions endpoint (Groq by default).
#[derive(Clone)]
pub struct ChatCompletionsGenerator {
    config: GenerationConfig,
    http_client: reqwest::Client,
}

impl ChatCompletionsGenerator {
    /// Create a new generator.
    pub fn new(config: GenerationConfig) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            http_client,
        })
    }
}

#[async_trait]
impl IdeaGenerator for ChatCompletionsGenerator {
    async fn generate(
        &self,
        input: &WasteInput,
        exclusions: &[ExcludedIdea],
    ) -> AppResult<Vec<GeneratedIdea>> {
        let api_key = self.config.api_key.as_ref().ok_or_else(|| {
            AppError::ExternalService("Idea generator API key not configured".to_string())
        })?;

        let temperature = if exclusions.is_empty() {
            self.config.temperature
        } else {
            self.config.reanalysis_temperature
        };

        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": build_prompt(input, exclusions, self.config.idea_count)}
            ],
            "temperature": temperature,
            "max_tokens": self.config.max_tokens,
        });

        let response = self
            .http_client
            .post(&self.config.api_url)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Idea generator request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(format!(
                "Idea generator API error: {status} - {body}"
            )));
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<ChatChoice>,
        }

        #[derive(Deserialize)]
        struct ChatChoice {
            message: ChatMessage,
        }

        #[derive(Deserialize)]
        struct ChatMessage {
            content: String,
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| {
            AppError::ExternalService(format!("Failed to parse idea generator response: {e}"))
        })?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::ExternalService("Idea generator returned no choices".to_string()))?
            .message
            .content;

        let ideas = parse_ideas(&content)?;
        debug!(count = ideas.len(), "Idea generator returned candidates");
        Ok(ideas)
    }
}
