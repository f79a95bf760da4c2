//! Provider registry: maps provider names to endpoint configurations.
//!
//! Every supported backend speaks the OpenAI chat/embeddings wire format,
//! so a provider is fully described by its base URL, auth style and the
//! environment variables its key may live in.

/// How to attach auth credentials to requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// No authentication required (local servers).
    None,
}

/// Configuration for a single provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Provider identifier.
    pub name: &'static str,
    /// Base URL for the API.
    pub base_url: &'static str,
    /// Path for chat completions endpoint (appended to base_url).
    pub chat_path: &'static str,
    /// Path for the embeddings endpoint (appended to base_url).
    pub embeddings_path: &'static str,
    /// Path for listing models, used by local health checks.
    pub models_path: &'static str,
    /// Environment variable names to try for the API key (in order).
    pub env_keys: &'static [&'static str],
    /// How to send auth credentials.
    pub auth_style: AuthStyle,
    /// Environment variable to override the base URL (e.g., OLLAMA_HOST).
    pub base_url_env: Option<&'static str>,
    /// Model used when the config leaves `model` empty.
    pub default_model: &'static str,
}

impl ProviderConfig {
    /// Resolve the API key: explicit value > env vars > empty.
    pub fn resolve_api_key(&self, configured: &str) -> String {
        if !configured.is_empty() {
            return configured.to_string();
        }
        self.env_keys
            .iter()
            .find_map(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
            .unwrap_or_default()
    }

    /// Resolve the base URL: explicit endpoint > env override > registry default.
    pub fn resolve_base_url(&self, configured: &str) -> String {
        if !configured.is_empty() {
            return configured.trim_end_matches('/').to_string();
        }
        self.base_url_env
            .and_then(|env_key| {
                let val = std::env::var(env_key).ok()?;
                // OLLAMA_HOST / LLAMACPP_HOST usually omit the /v1 suffix
                if val.ends_with("/v1") {
                    Some(val)
                } else {
                    Some(format!("{}/v1", val.trim_end_matches('/')))
                }
            })
            .unwrap_or_else(|| self.base_url.to_string())
    }

    pub fn requires_auth(&self) -> bool {
        self.auth_style != AuthStyle::None
    }
}

// ─── Provider Definitions ────────────────────────────────────────────────────

static PROVIDERS: &[ProviderConfig] = &[
    ProviderConfig {
        name: "huggingface",
        base_url: "https://router.huggingface.co/v1",
        chat_path: "/chat/completions",
        embeddings_path: "/embeddings",
        models_path: "/models",
        env_keys: &["HF_TOKEN", "HUGGINGFACE_API_KEY", "HUGGINGFACEHUB_API_TOKEN"],
        auth_style: AuthStyle::Bearer,
        base_url_env: Some("HF_BASE_URL"),
        default_model: "meta-llama/Llama-3.3-70B-Instruct",
    },
    ProviderConfig {
        name: "openai",
        base_url: "https://api.openai.com/v1",
        chat_path: "/chat/completions",
        embeddings_path: "/embeddings",
        models_path: "/models",
        env_keys: &["OPENAI_API_KEY"],
        auth_style: AuthStyle::Bearer,
        base_url_env: None,
        default_model: "gpt-4o-mini",
    },
    ProviderConfig {
        name: "groq",
        base_url: "https://api.groq.com/openai/v1",
        chat_path: "/chat/completions",
        embeddings_path: "/embeddings",
        models_path: "/models",
        env_keys: &["GROQ_API_KEY"],
        auth_style: AuthStyle::Bearer,
        base_url_env: None,
        default_model: "llama-3.3-70b-versatile",
    },
    ProviderConfig {
        name: "openrouter",
        base_url: "https://openrouter.ai/api/v1",
        chat_path: "/chat/completions",
        embeddings_path: "/embeddings",
        models_path: "/models",
        env_keys: &["OPENROUTER_API_KEY"],
        auth_style: AuthStyle::Bearer,
        base_url_env: None,
        default_model: "meta-llama/llama-3.3-70b-instruct",
    },
    ProviderConfig {
        name: "ollama",
        base_url: "http://localhost:11434/v1",
        chat_path: "/chat/completions",
        embeddings_path: "/embeddings",
        models_path: "/models",
        env_keys: &[],
        auth_style: AuthStyle::None,
        base_url_env: Some("OLLAMA_HOST"),
        default_model: "llama3.2",
    },
    ProviderConfig {
        name: "llamacpp",
        base_url: "http://localhost:8080/v1",
        chat_path: "/chat/completions",
        embeddings_path: "/embeddings",
        models_path: "/models",
        env_keys: &[],
        auth_style: AuthStyle::None,
        base_url_env: Some("LLAMACPP_HOST"),
        default_model: "default",
    },
];

/// Look up a provider config by name.
pub fn get_provider_config(name: &str) -> Option<&'static ProviderConfig> {
    let lookup = match name {
        "hf" | "hugging_face" => "huggingface",
        "llama.cpp" => "llamacpp",
        other => other,
    };
    PROVIDERS.iter().find(|p| p.name == lookup)
}

/// List all known provider names.
pub fn all_provider_names() -> Vec<&'static str> {
    PROVIDERS.iter().map(|p| p.name).collect()
}
