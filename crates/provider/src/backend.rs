//! Hosted model backends reachable over the chat-completions API

use crate::ProviderError;

/// Model backends selectable by name in config
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelBackend {
    Groq,
    Anthropic,
    Ollama,
    OpenAi,
    OpenRouter,
}

impl ModelBackend {
    pub const ALL: [ModelBackend; 5] = [
        ModelBackend::Groq,
        ModelBackend::Anthropic,
        ModelBackend::Ollama,
        ModelBackend::OpenAi,
        ModelBackend::OpenRouter,
    ];

    /// Look a backend up by its config name (case-insensitive)
    pub fn from_name(name: &str) -> Result<Self, ProviderError> {
        let lower = name.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|b| b.name() == lower)
            .ok_or_else(|| ProviderError::UnknownBackend {
                name: name.to_string(),
                supported: Self::ALL
                    .iter()
                    .map(|b| b.name())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModelBackend::Groq => "groq",
            ModelBackend::Anthropic => "anthropic",
            ModelBackend::Ollama => "ollama",
            ModelBackend::OpenAi => "openai",
            ModelBackend::OpenRouter => "openrouter",
        }
    }

    pub fn default_api_base(&self) -> &'static str {
        match self {
            ModelBackend::Groq => "https://api.groq.com/openai/v1",
            ModelBackend::Anthropic => "https://api.anthropic.com/v1",
            ModelBackend::Ollama => "http://localhost:11434/v1",
            ModelBackend::OpenAi => "https://api.openai.com/v1",
            ModelBackend::OpenRouter => "https://openrouter.ai/api/v1",
        }
    }

    /// Environment variable consulted when config carries no key
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            ModelBackend::Groq => Some("GROQ_API_KEY"),
            ModelBackend::Anthropic => Some("ANTHROPIC_API_KEY"),
            ModelBackend::Ollama => None,
            ModelBackend::OpenAi => Some("OPENAI_API_KEY"),
            ModelBackend::OpenRouter => Some("OPENROUTER_API_KEY"),
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ModelBackend::Groq => "llama-3.1-8b-instant",
            ModelBackend::Anthropic => "claude-3-5-haiku-latest",
            ModelBackend::Ollama => "llama3.1",
            ModelBackend::OpenAi => "gpt-4o-mini",
            ModelBackend::OpenRouter => "anthropic/claude-sonnet-4",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        self.api_key_env().is_some()
    }

    /// Pick the key from config, else from the backend's environment variable
    pub fn resolve_api_key(&self, configured: Option<String>) -> Result<String, ProviderError> {
        if let Some(key) = configured.filter(|k| !k.is_empty()) {
            return Ok(key);
        }

        match self.api_key_env() {
            Some(var) => std::env::var(var)
                .ok()
                .filter(|k| !k.is_empty())
                .ok_or_else(|| ProviderError::NoApiKey(format!("{} (set {})", self.name(), var))),
            None => Ok(String::new()),
        }
    }
}

impl std::fmt::Display for ModelBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
