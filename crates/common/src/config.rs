//! Application configuration.

use serde::Deserialize;
use std::path::Path;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Idea generation service configuration.
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Image provider chain configuration.
    #[serde(default)]
    pub images: ImageConfig,
    /// Notification sink configuration.
    #[serde(default)]
    pub notifications: NotificationConfig,
    /// Background job configuration.
    #[serde(default)]
    pub jobs: JobsConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public URL of this instance.
    pub url: String,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// External idea generator configuration (OpenAI-compatible chat completions).
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    /// Chat completions endpoint.
    #[serde(default = "default_generation_url")]
    pub api_url: String,
    /// API key. Without it every generation fails as an external service error.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model name.
    #[serde(default = "default_generation_model")]
    pub model: String,
    /// Number of ideas requested per submission.
    #[serde(default = "default_idea_count")]
    pub idea_count: usize,
    /// Sampling temperature for first analyses.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Sampling temperature for re-analyses (with an exclusion list).
    #[serde(default = "default_reanalysis_temperature")]
    pub reanalysis_temperature: f32,
    /// Maximum completion tokens.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Request timeout in seconds.
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_url: default_generation_url(),
            api_key: None,
            model: default_generation_model(),
            idea_count: default_idea_count(),
            temperature: default_temperature(),
            reanalysis_temperature: default_reanalysis_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

/// Image provider chain configuration.
///
/// Each provider is enabled only when its credential (or endpoint) is present.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageConfig {
    /// Attempts per provider.
    #[serde(default = "default_image_retries")]
    pub max_retries: u32,
    /// Delay between attempts on the same provider, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Extended wait when a provider reports its model is still loading, in seconds.
    #[serde(default = "default_model_loading_wait")]
    pub model_loading_wait_secs: u64,
    /// Delay between resolving successive ideas, in milliseconds.
    #[serde(default = "default_inter_idea_delay_ms")]
    pub inter_idea_delay_ms: u64,
    /// Hugging Face inference API key.
    #[serde(default)]
    pub huggingface_api_key: Option<String>,
    /// Hugging Face text-to-image model.
    #[serde(default = "default_huggingface_model")]
    pub huggingface_model: String,
    /// Craiyon endpoint (keyless).
    #[serde(default)]
    pub craiyon_url: Option<String>,
    /// Unsplash access key for stock photo search.
    #[serde(default)]
    pub unsplash_access_key: Option<String>,
    /// Base URL for deterministic placeholder images.
    #[serde(default = "default_placeholder_base_url")]
    pub placeholder_base_url: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_retries: default_image_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            model_loading_wait_secs: default_model_loading_wait(),
            inter_idea_delay_ms: default_inter_idea_delay_ms(),
            huggingface_api_key: None,
            huggingface_model: default_huggingface_model(),
            craiyon_url: None,
            unsplash_access_key: None,
            placeholder_base_url: default_placeholder_base_url(),
        }
    }
}

/// Notification configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationConfig {
    /// Address receiving admin notifications (new submissions, report digests).
    #[serde(default)]
    pub admin_email: Option<String>,
    /// SMTP transport. Without it notifications are dropped.
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
}

/// SMTP transport configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    /// SMTP host.
    pub host: String,
    /// SMTP port.
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// Username.
    #[serde(default)]
    pub username: Option<String>,
    /// Password.
    #[serde(default)]
    pub password: Option<String>,
    /// Sender address.
    pub from_address: String,
}

/// Background job configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    /// Maximum concurrently running jobs.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Interval of the report digest in seconds (0 disables it).
    #[serde(default = "default_digest_interval")]
    pub report_digest_interval_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            report_digest_interval_secs: default_digest_interval(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_max_connections() -> u32 {
    20
}

const fn default_min_connections() -> u32 {
    2
}

fn default_generation_url() -> String {
    "https://api.groq.com/openai/v1/chat/completions".to_string()
}

fn default_generation_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}

const fn default_idea_count() -> usize {
    3
}

const fn default_temperature() -> f32 {
    0.7
}

const fn default_reanalysis_temperature() -> f32 {
    0.9
}

const fn default_max_tokens() -> u32 {
    2500
}

const fn default_generation_timeout() -> u64 {
    60
}

const fn default_image_retries() -> u32 {
    2
}

const fn default_retry_delay_ms() -> u64 {
    1000
}

const fn default_model_loading_wait() -> u64 {
    20
}

const fn default_inter_idea_delay_ms() -> u64 {
    3000
}

fn default_huggingface_model() -> String {
    "stabilityai/stable-diffusion-xl-base-1.0".to_string()
}

fn default_placeholder_base_url() -> String {
    "https://picsum.photos/seed".to_string()
}

const fn default_smtp_port() -> u16 {
    587
}

const fn default_max_workers() -> usize {
    4
}

const fn default_digest_interval() -> u64 {
    86_400
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `UPCYCLE_ENV`)
    /// 3. Environment variables with `UPCYCLE_` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("UPCYCLE_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("UPCYCLE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("UPCYCLE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_sections_default() {
        let config: Config = config::Config::builder()
            .set_override("server.url", "http://localhost:3000")
            .unwrap()
            .set_override("database.url", "postgres://localhost/upcycle")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.generation.idea_count, 3);
        assert_eq!(config.images.max_retries, 2);
        assert!(config.images.huggingface_api_key.is_none());
        assert!(config.notifications.smtp.is_none());
        assert_eq!(config.jobs.max_workers, 4);
    }
}
