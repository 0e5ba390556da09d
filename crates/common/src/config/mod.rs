//! Configuration management for Catalyst Explorer services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Field name of the aggregate embedding built from all proposal text fields
pub const COMBINED_FIELD: &str = "combined";

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Recommendation scoring configuration
    #[serde(default)]
    pub recommendation: RecommendationConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Maximum concurrent requests
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: ollama, openai, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key (required for openai)
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use; each provider has its own default
    pub model: Option<String>,

    /// Dimension reported by the mock provider
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,

    /// Records processed per page by the backfill worker
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

/// Tunables for preference-based proposal ranking
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecommendationConfig {
    /// Embedding field used for profiles and candidate search
    #[serde(default = "default_embedding_field")]
    pub embedding_field: String,

    /// Minimum cosine similarity for a candidate to be retrieved
    #[serde(default = "default_candidate_threshold")]
    pub candidate_threshold: f64,

    /// Avoidance similarity above which the penalty applies
    #[serde(default = "default_avoidance_threshold")]
    pub avoidance_threshold: f64,

    /// Multiplier applied to avoidance similarity when penalizing
    #[serde(default = "default_avoidance_penalty")]
    pub avoidance_penalty: f64,

    /// Liked count at which confidence saturates at 1.0
    #[serde(default = "default_confidence_saturation")]
    pub confidence_saturation: f64,

    /// Upper bound (exclusive) of the uniform score jitter
    #[serde(default = "default_jitter_max")]
    pub jitter_max: f64,

    /// Candidates fetched per requested recommendation
    #[serde(default = "default_overfetch_factor")]
    pub overfetch_factor: usize,

    /// Limit used when the caller gives none
    #[serde(default = "default_recommendation_limit")]
    pub default_limit: usize,

    /// Multiplier applied to AI scores when boosting ranking_total
    #[serde(default = "default_search_boost")]
    pub search_boost: f64,

    /// Extra recommendations requested beyond the search result count
    #[serde(default = "default_enhance_headroom")]
    pub enhance_headroom: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level / EnvFilter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Serve Prometheus metrics on /metrics
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_max_concurrent() -> usize { 100 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_embedding_provider() -> String { "ollama".to_string() }
fn default_embedding_dimension() -> usize { 768 }
fn default_embedding_timeout() -> u64 { 30 }
fn default_embedding_retries() -> u32 { 3 }
fn default_batch_size() -> usize { 50 }
fn default_embedding_field() -> String { COMBINED_FIELD.to_string() }
fn default_candidate_threshold() -> f64 { 0.5 }
fn default_avoidance_threshold() -> f64 { 0.6 }
fn default_avoidance_penalty() -> f64 { 0.5 }
fn default_confidence_saturation() -> f64 { 3.0 }
fn default_jitter_max() -> f64 { 0.1 }
fn default_overfetch_factor() -> usize { 2 }
fn default_recommendation_limit() -> usize { 20 }
fn default_search_boost() -> f64 { 100.0 }
fn default_enhance_headroom() -> usize { 20 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_enabled() -> bool { true }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            max_concurrent_requests: default_max_concurrent(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/catalyst_explorer".to_string(),
            read_url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: None,
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_embedding_retries(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            embedding_field: default_embedding_field(),
            candidate_threshold: default_candidate_threshold(),
            avoidance_threshold: default_avoidance_threshold(),
            avoidance_penalty: default_avoidance_penalty(),
            confidence_saturation: default_confidence_saturation(),
            jitter_max: default_jitter_max(),
            overfetch_factor: default_overfetch_factor(),
            default_limit: default_recommendation_limit(),
            search_boost: default_search_boost(),
            enhance_headroom: default_enhance_headroom(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", i64::from(default_port()))?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., APP__DATABASE__URL=postgres://...
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Per-request deadline applied by the HTTP layer
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs.max(1))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            embedding: EmbeddingConfig::default(),
            recommendation: RecommendationConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.embedding.provider, "ollama");
        assert_eq!(config.recommendation.embedding_field, COMBINED_FIELD);
    }

    #[test]
    fn test_recommendation_defaults() {
        let rec = RecommendationConfig::default();
        assert_eq!(rec.candidate_threshold, 0.5);
        assert_eq!(rec.avoidance_threshold, 0.6);
        assert_eq!(rec.avoidance_penalty, 0.5);
        assert_eq!(rec.confidence_saturation, 3.0);
        assert_eq!(rec.jitter_max, 0.1);
        assert_eq!(rec.overfetch_factor, 2);
    }

    #[test]
    fn test_partial_recommendation_section_fills_defaults() {
        let rec: RecommendationConfig =
            serde_json::from_str(r#"{"candidate_threshold": 0.4}"#).unwrap();
        assert_eq!(rec.candidate_threshold, 0.4);
        assert_eq!(rec.embedding_field, "combined");
        assert_eq!(rec.default_limit, 20);
    }

    #[test]
    fn test_request_timeout() {
        let mut config = AppConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));

        config.server.request_timeout_secs = 0;
        assert_eq!(config.request_timeout(), Duration::from_secs(1));
    }
}
