//! Product image resolution through an ordered chain of providers.
//!
//! Providers are tried in priority order, each up to `max_retries` times. A
//! provider reporting that its model is still loading gets one extended wait
//! and an extra attempt. When every provider fails the chain falls back to a
//! placeholder derived from the idea name, so resolution never fails.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use upcycle_common::{AppError, AppResult, config::ImageConfig};

const HUGGINGFACE_API_BASE: &str = "https://api-inference.huggingface.co/models";
const UNSPLASH_RANDOM_URL: &str = "https://api.unsplash.com/photos/random";
const NEGATIVE_PROMPT: &str = "blurry, low quality, distorted, ugly, watermark, text, logo";

/// What an image is requested for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePrompt {
    pub name: String,
    pub description: String,
    pub visual_description: Option<String>,
    pub keywords: Option<String>,
}

impl ImagePrompt {
    /// Text for generative providers: the visual description when present.
    #[must_use]
    pub fn visual(&self) -> &str {
        self.visual_description
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(&self.description)
    }

    /// Query for stock photo search: the keywords when present.
    #[must_use]
    pub fn search_query(&self) -> String {
        self.keywords
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .map_or_else(|| self.name.to_lowercase(), ToString::to_string)
    }
}

/// A failed provider attempt.
#[derive(Debug, Error)]
pub enum ImageProviderError {
    /// The provider's model is warming up; a later attempt may succeed.
    #[error("model is loading")]
    ModelLoading,
    #[error("{0}")]
    Failed(String),
}

/// One image source.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Produce an image reference, or `None` if the provider had nothing.
    async fn generate(&self, prompt: &ImagePrompt) -> Result<Option<String>, ImageProviderError>;
}

/// Ordered provider chain with bounded retries and a placeholder fallback.
#[derive(Clone)]
pub struct ImageProviderChain {
    providers: Vec<Arc<dyn ImageProvider>>,
    max_retries: u32,
    retry_delay: Duration,
    model_loading_wait: Duration,
    inter_idea_delay: Duration,
    placeholder_base_url: String,
}

impl ImageProviderChain {
    /// Build the chain from configuration. A provider is included only when
    /// its credential or endpoint is configured.
    pub fn from_config(config: &ImageConfig) -> AppResult<Self> {
        let mut providers: Vec<Arc<dyn ImageProvider>> = Vec::new();

        if let Some(api_key) = &config.huggingface_api_key {
            providers.push(Arc::new(HuggingFaceProvider::new(
                api_key.clone(),
                config.huggingface_model.clone(),
            )?));
        } else {
            debug!("Hugging Face API key not configured, skipping provider");
        }

        if let Some(url) = &config.craiyon_url {
            providers.push(Arc::new(CraiyonProvider::new(url.clone())?));
        } else {
            debug!("Craiyon endpoint not configured, skipping provider");
        }

        if let Some(access_key) = &config.unsplash_access_key {
            providers.push(Arc::new(UnsplashProvider::new(access_key.clone())?));
        } else {
            debug!("Unsplash access key not configured, skipping provider");
        }

        info!(
            providers = ?providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            "Image provider chain configured"
        );

        Ok(Self::with_providers(providers, config))
    }

    /// Build a chain over explicit providers, taking retry and delay settings
    /// from configuration.
    #[must_use]
    pub fn with_providers(providers: Vec<Arc<dyn ImageProvider>>, config: &ImageConfig) -> Self {
        Self {
            providers,
            max_retries: config.max_retries.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            model_loading_wait: Duration::from_secs(config.model_loading_wait_secs),
            inter_idea_delay: Duration::from_millis(config.inter_idea_delay_ms),
            placeholder_base_url: config.placeholder_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Number of enabled providers.
    #[must_use]
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Deterministic placeholder for an idea name.
    #[must_use]
    pub fn placeholder(&self, name: &str) -> String {
        format!(
            "{}/{}/800/600",
            self.placeholder_base_url,
            urlencoding::encode(name)
        )
    }

    /// Resolve an image for one idea. Never fails.
    pub async fn resolve(&self, prompt: &ImagePrompt) -> String {
        for provider in &self.providers {
            if let Some(url) = self.try_provider(provider.as_ref(), prompt).await {
                info!(provider = provider.name(), idea = %prompt.name, "Image resolved");
                return url;
            }
        }

        info!(idea = %prompt.name, "All image providers failed, using placeholder");
        self.placeholder(&prompt.name)
    }

    /// Resolve images for several ideas in order, pausing between ideas.
    pub async fn resolve_all(&self, prompts: &[ImagePrompt]) -> Vec<String> {
        let mut urls = Vec::with_capacity(prompts.len());

        for (i, prompt) in prompts.iter().enumerate() {
            if i > 0 && !self.inter_idea_delay.is_zero() {
                tokio::time::sleep(self.inter_idea_delay).await;
            }
            urls.push(self.resolve(prompt).await);
        }

        urls
    }

    async fn try_provider(
        &self,
        provider: &dyn ImageProvider,
        prompt: &ImagePrompt,
    ) -> Option<String> {
        let mut attempts = 0;
        let mut waited_for_model = false;

        while attempts < self.max_retries {
            attempts += 1;

            match provider.generate(prompt).await {
                Ok(Some(url)) if !url.trim().is_empty() => return Some(url),
                Ok(_) => {
                    debug!(provider = provider.name(), attempt = attempts, "Provider returned no image");
                }
                Err(ImageProviderError::ModelLoading) if !waited_for_model => {
                    info!(
                        provider = provider.name(),
                        wait_secs = self.model_loading_wait.as_secs(),
                        "Model is loading, waiting before retrying"
                    );
                    waited_for_model = true;
                    // The extended wait buys one attempt on top of the budget
                    attempts -= 1;
                    tokio::time::sleep(self.model_loading_wait).await;
                    continue;
                }
                Err(e) => {
                    warn!(provider = provider.name(), attempt = attempts, error = %e, "Image provider failed");
                }
            }

            if attempts < self.max_retries && !self.retry_delay.is_zero() {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        None
    }
}

fn http_client(timeout: Duration) -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {e}")))
}

/// Hugging Face text-to-image inference. Returns the image inline as a data URL.
pub struct HuggingFaceProvider {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl HuggingFaceProvider {
    pub fn new(api_key: String, model: String) -> AppResult<Self> {
        Ok(Self {
            api_key,
            model,
            client: http_client(Duration::from_secs(90))?,
        })
    }
}

#[async_trait]
impl ImageProvider for HuggingFaceProvider {
    fn name(&self) -> &'static str {
        "huggingface"
    }

    async fn generate(&self, prompt: &ImagePrompt) -> Result<Option<String>, ImageProviderError> {
        let text = format!(
            "Professional product photography of {}. {}. Clean modern product shot, well-lit, \
             white background, photorealistic, eco-friendly product made from upcycled waste.",
            prompt.name,
            prompt.visual()
        );

        let response = self
            .client
            .post(format!("{HUGGINGFACE_API_BASE}/{}", self.model))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "inputs": text,
                "parameters": {
                    "negative_prompt": NEGATIVE_PROMPT,
                    "num_inference_steps": 30,
                    "guidance_scale": 7.5,
                }
            }))
            .send()
            .await
            .map_err(|e| ImageProviderError::Failed(format!("request failed: {e}")))?;

        if response.status() == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            return Err(ImageProviderError::ModelLoading);
        }
        if !response.status().is_success() {
            return Err(ImageProviderError::Failed(format!(
                "status {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ImageProviderError::Failed(format!("failed to read body: {e}")))?;

        if bytes.is_empty() {
            return Ok(None);
        }

        Ok(Some(format!("data:image/png;base64,{}", BASE64.encode(&bytes))))
    }
}

/// Craiyon generation. Keyless; enabled by configuring its endpoint.
pub struct CraiyonProvider {
    url: String,
    client: reqwest::Client,
}

impl CraiyonProvider {
    pub fn new(url: String) -> AppResult<Self> {
        Ok(Self {
            url,
            client: http_client(Duration::from_secs(120))?,
        })
    }
}

#[async_trait]
impl ImageProvider for CraiyonProvider {
    fn name(&self) -> &'static str {
        "craiyon"
    }

    async fn generate(&self, prompt: &ImagePrompt) -> Result<Option<String>, ImageProviderError> {
        #[derive(Deserialize)]
        struct CraiyonResponse {
            #[serde(default)]
            images: Vec<String>,
        }

        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({
                "prompt": format!(
                    "Professional product photo of {}, {}, clean background, high quality",
                    prompt.name,
                    prompt.visual()
                ),
                "model": "art",
                "negative_prompt": NEGATIVE_PROMPT,
            }))
            .send()
            .await
            .map_err(|e| ImageProviderError::Failed(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ImageProviderError::Failed(format!(
                "status {}",
                response.status()
            )));
        }

        let body: CraiyonResponse = response
            .json()
            .await
            .map_err(|e| ImageProviderError::Failed(format!("invalid response: {e}")))?;

        Ok(body
            .images
            .into_iter()
            .next()
            .map(|image| format!("data:image/png;base64,{image}")))
    }
}

/// Unsplash random photo search. Returns a stock photo rather than a generated image.
pub struct UnsplashProvider {
    access_key: String,
    client: reqwest::Client,
}

impl UnsplashProvider {
    pub fn new(access_key: String) -> AppResult<Self> {
        Ok(Self {
            access_key,
            client: http_client(Duration::from_secs(10))?,
        })
    }
}

#[async_trait]
impl ImageProvider for UnsplashProvider {
    fn name(&self) -> &'static str {
        "unsplash"
    }

    async fn generate(&self, prompt: &ImagePrompt) -> Result<Option<String>, ImageProviderError> {
        #[derive(Deserialize)]
        struct UnsplashPhoto {
            urls: Option<UnsplashUrls>,
        }

        #[derive(Deserialize)]
        struct UnsplashUrls {
            regular: String,
        }

        let query = prompt.search_query();
        let response = self
            .client
            .get(UNSPLASH_RANDOM_URL)
            .query(&[
                ("query", query.as_str()),
                ("orientation", "landscape"),
                ("client_id", self.access_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ImageProviderError::Failed(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ImageProviderError::Failed(format!(
                "status {}",
                response.status()
            )));
        }

        let photo: UnsplashPhoto = response
            .json()
            .await
            .map_err(|e| ImageProviderError::Failed(format!("invalid response: {e}")))?;

        Ok(photo.urls.map(|u| u.regular))
    }
}
