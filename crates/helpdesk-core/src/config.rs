//! Helpdesk configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{HelpdeskError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HelpdeskConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl HelpdeskConfig {
    /// Load config from `HELPDESK_CONFIG` or the default path (~/.helpdesk/config.toml).
    pub fn load() -> Result<Self> {
        let path = std::env::var("HELPDESK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_path());
        if path.exists() {
            Self::load_from(&path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| HelpdeskError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| HelpdeskError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the given path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| HelpdeskError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the router and chunker cannot work with.
    pub fn validate(&self) -> Result<()> {
        let k = &self.knowledge;
        if k.chunk_size == 0 {
            return Err(HelpdeskError::Config("knowledge.chunk_size must be > 0".into()));
        }
        if k.chunk_overlap >= k.chunk_size {
            return Err(HelpdeskError::Config(format!(
                "knowledge.chunk_overlap ({}) must be smaller than chunk_size ({})",
                k.chunk_overlap, k.chunk_size
            )));
        }
        if k.collection_name.trim().is_empty() {
            return Err(HelpdeskError::Config("knowledge.collection_name is empty".into()));
        }
        let r = &self.routing;
        for (name, value) in [
            ("handoff_threshold", r.handoff_threshold),
            ("topic_threshold", r.topic_threshold),
            ("default_confidence", r.default_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(HelpdeskError::Config(format!(
                    "routing.{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.embedding.dimension == 0 {
            return Err(HelpdeskError::Config("embedding.dimension must be > 0".into()));
        }
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the helpdesk home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".helpdesk")
    }
}

/// Generative language model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: String,
    /// Overrides the registry base URL when non-empty.
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub fallbacks: Vec<LlmFallback>,
}

fn default_llm_provider() -> String { "huggingface".into() }
fn default_llm_model() -> String { "meta-llama/Llama-3.3-70B-Instruct".into() }
fn default_max_tokens() -> u32 { 512 }
fn default_temperature() -> f32 { 0.7 }
fn default_top_p() -> f32 { 0.9 }
fn default_llm_timeout() -> u64 { 30 }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            api_key: String::new(),
            endpoint: String::new(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            timeout_secs: default_llm_timeout(),
            fallbacks: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmFallback {
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub endpoint: String,
}

/// Embedding model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// `hashing` for the local embedder, otherwise a provider registry name.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

fn default_embedding_provider() -> String { "hashing".into() }
fn default_embedding_model() -> String { "sentence-transformers/all-MiniLM-L6-v2".into() }
fn default_dimension() -> usize { 384 }
fn default_embedding_timeout() -> u64 { 15 }

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            api_key: String::new(),
            endpoint: String::new(),
            dimension: default_dimension(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

/// How retrieved chunks become prompt context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextMode {
    /// Only the highest-similarity chunk.
    Single,
    /// Distinct top-k chunks concatenated up to `context_budget_chars`.
    Aggregate,
}

/// Knowledge base (retrieval) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default = "default_persist_directory")]
    pub persist_directory: String,
    #[serde(default = "default_collection_name")]
    pub collection_name: String,
    #[serde(default)]
    pub corpus_path: Option<String>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_context_mode")]
    pub context_mode: ContextMode,
    #[serde(default = "default_context_budget")]
    pub context_budget_chars: usize,
}

fn default_persist_directory() -> String { "~/.helpdesk/index".into() }
fn default_collection_name() -> String { "project_faq".into() }
fn default_chunk_size() -> usize { 1000 }
fn default_chunk_overlap() -> usize { 200 }
fn default_top_k() -> usize { 5 }
fn default_context_mode() -> ContextMode { ContextMode::Single }
fn default_context_budget() -> usize { 3000 }

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            persist_directory: default_persist_directory(),
            collection_name: default_collection_name(),
            corpus_path: None,
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
            context_mode: default_context_mode(),
            context_budget_chars: default_context_budget(),
        }
    }
}

impl KnowledgeConfig {
    /// Index directory with `~` and environment variables expanded.
    pub fn persist_dir(&self) -> PathBuf {
        expand_path(&self.persist_directory)
    }

    pub fn corpus_file(&self) -> Option<PathBuf> {
        self.corpus_path.as_deref().map(expand_path)
    }
}

/// Expand `~` and `$VARS` in a configured path, keeping it verbatim on failure.
pub fn expand_path(p: &str) -> PathBuf {
    match shellexpand::full(p) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(p).as_ref()),
    }
}

/// Whether the coordinator honours the router decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Dispatch to the handler the router selected.
    Routed,
    /// Always answer through the general-knowledge handler.
    Forced,
}

/// Keyword routing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_dispatch")]
    pub dispatch: DispatchMode,
    #[serde(default = "default_handoff_threshold")]
    pub handoff_threshold: f64,
    #[serde(default = "default_topic_threshold")]
    pub topic_threshold: f64,
    #[serde(default = "default_confidence")]
    pub default_confidence: f64,
    #[serde(default = "default_handoff_weight")]
    pub handoff_weight: f64,
    #[serde(default = "default_topic_weight")]
    pub topic_weight: f64,
    #[serde(default = "default_punctuation_boost")]
    pub punctuation_boost: f64,
    #[serde(default = "default_frustration_markers")]
    pub frustration_markers: Vec<String>,
    #[serde(default = "default_handoff_keywords")]
    pub handoff_keywords: Vec<String>,
    #[serde(default = "default_topic_keywords")]
    pub topic_keywords: Vec<String>,
    /// Indicators the human-handoff handler uses for its own confidence.
    #[serde(default = "default_handoff_indicators")]
    pub handoff_indicators: Vec<String>,
    /// Keywords the journey handler uses for its own confidence.
    #[serde(default = "default_journey_indicators")]
    pub journey_indicators: Vec<String>,
    #[serde(default = "default_urgency_keywords")]
    pub urgency_keywords: Vec<String>,
    #[serde(default = "default_max_handler_visits")]
    pub max_handler_visits: u32,
}

fn default_dispatch() -> DispatchMode { DispatchMode::Routed }
fn default_handoff_threshold() -> f64 { 0.7 }
fn default_topic_threshold() -> f64 { 0.6 }
fn default_confidence() -> f64 { 0.8 }
fn default_handoff_weight() -> f64 { 0.3 }
fn default_topic_weight() -> f64 { 0.2 }
fn default_punctuation_boost() -> f64 { 0.2 }
fn default_max_handler_visits() -> u32 { 2 }

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_frustration_markers() -> Vec<String> {
    strings(&["???", "!!!"])
}

fn default_handoff_keywords() -> Vec<String> {
    strings(&[
        "falar com humano", "falar com", "atendente", "pessoa real", "não entendi",
        "problema urgente", "urgente", "reclamação", "cancelar", "reembolso",
        "suporte técnico", "bug", "erro grave",
    ])
}

fn default_topic_keywords() -> Vec<String> {
    strings(&[
        "journey", "stars", "legacy", "hotmart journey", "programa", "benefícios",
        "elegível", "elegibilidade", "tier", "nível", "status", "faturamento",
    ])
}

fn default_handoff_indicators() -> Vec<String> {
    strings(&[
        "falar com humano", "atendente", "pessoa real", "não consegui resolver",
        "problema complexo", "cancelar", "reembolso", "reclamação",
    ])
}

fn default_journey_indicators() -> Vec<String> {
    strings(&["journey", "stars", "legacy", "elegível", "benefícios", "tier"])
}

fn default_urgency_keywords() -> Vec<String> {
    strings(&[
        "urgente", "emergência", "bug crítico", "problema grave", "não funciona",
        "erro", "quebrado", "perdeu dinheiro",
    ])
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            dispatch: default_dispatch(),
            handoff_threshold: default_handoff_threshold(),
            topic_threshold: default_topic_threshold(),
            default_confidence: default_confidence(),
            handoff_weight: default_handoff_weight(),
            topic_weight: default_topic_weight(),
            punctuation_boost: default_punctuation_boost(),
            frustration_markers: default_frustration_markers(),
            handoff_keywords: default_handoff_keywords(),
            topic_keywords: default_topic_keywords(),
            handoff_indicators: default_handoff_indicators(),
            journey_indicators: default_journey_indicators(),
            urgency_keywords: default_urgency_keywords(),
            max_handler_visits: default_max_handler_visits(),
        }
    }
}

/// Per-session conversation history bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    #[serde(default = "default_idle_ttl")]
    pub idle_ttl_secs: u64,
}

fn default_max_turns() -> usize { 20 }
fn default_max_sessions() -> usize { 1000 }
fn default_idle_ttl() -> u64 { 3600 }

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            max_sessions: default_max_sessions(),
            idle_ttl_secs: default_idle_ttl(),
        }
    }
}

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
}

fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 8000 }
fn default_api_prefix() -> String { "/api/v1".into() }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_prefix: default_api_prefix(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

fn default_log_level() -> String { "info".into() }
fn default_log_format() -> LogFormat { LogFormat::Pretty }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HelpdeskConfig::default();
        assert_eq!(config.llm.provider, "huggingface");
        assert_eq!(config.llm.model, "meta-llama/Llama-3.3-70B-Instruct");
        assert_eq!(config.knowledge.collection_name, "project_faq");
        assert_eq!(config.knowledge.chunk_size, 1000);
        assert_eq!(config.knowledge.chunk_overlap, 200);
        assert_eq!(config.routing.dispatch, DispatchMode::Routed);
        assert!((config.routing.handoff_threshold - 0.7).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [llm]
            provider = "ollama"
            model = "llama3.2"
            temperature = 0.1

            [knowledge]
            context_mode = "aggregate"
            top_k = 3

            [routing]
            dispatch = "forced"
        "#;

        let config: HelpdeskConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.llm.model, "llama3.2");
        assert_eq!(config.knowledge.context_mode, ContextMode::Aggregate);
        assert_eq!(config.knowledge.top_k, 3);
        assert_eq!(config.routing.dispatch, DispatchMode::Forced);
        // untouched sections keep their defaults
        assert_eq!(config.gateway.port, 8000);
        assert_eq!(config.embedding.provider, "hashing");
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config: HelpdeskConfig = toml::from_str("").unwrap();
        assert_eq!(config.gateway.api_prefix, "/api/v1");
        assert_eq!(config.history.max_turns, 20);
        assert!(!config.routing.handoff_keywords.is_empty());
    }

    #[test]
    fn test_validate_rejects_overlap_not_below_size() {
        let mut config = HelpdeskConfig::default();
        config.knowledge.chunk_size = 100;
        config.knowledge.chunk_overlap = 100;
        assert!(matches!(config.validate(), Err(HelpdeskError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_threshold_out_of_range() {
        let mut config = HelpdeskConfig::default();
        config.routing.topic_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = std::env::temp_dir().join(format!("helpdesk-config-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.toml");
        let mut config = HelpdeskConfig::default();
        config.gateway.port = 9123;
        config.save_to(&path).unwrap();

        let loaded = HelpdeskConfig::load_from(&path).unwrap();
        assert_eq!(loaded.gateway.port, 9123);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_home_dir() {
        let home = HelpdeskConfig::home_dir();
        assert!(home.to_string_lossy().contains("helpdesk"));
    }

    #[test]
    fn test_persist_dir_expands_tilde() {
        let config = KnowledgeConfig::default();
        assert!(!config.persist_dir().to_string_lossy().starts_with('~'));
    }
}
