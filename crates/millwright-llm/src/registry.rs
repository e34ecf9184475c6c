//! Built-in provider registry — maps well-known OpenAI-compatible provider
//! IDs to their endpoints and default models, so config entries only need an
//! ID and an API key.

/// A well-known OpenAI-compatible LLM provider.
pub struct KnownProvider {
    /// Short identifier used in config and routing tables.
    pub id: &'static str,
    /// Human-readable display name.
    pub name: &'static str,
    /// Base URL without trailing slash.
    pub base_url: &'static str,
    /// Path appended to base_url for chat completions.
    pub chat_path: &'static str,
    /// Recommended model for this provider.
    pub default_model: &'static str,
    /// True when the default model accepts image input.
    pub vision: bool,
}

impl KnownProvider {
    /// Full chat completions endpoint URL.
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, self.chat_path)
    }
}

pub const KNOWN_PROVIDERS: &[KnownProvider] = &[
    KnownProvider {
        id: "groq",
        name: "Groq",
        base_url: "https://api.groq.com/openai",
        chat_path: "/v1/chat/completions",
        default_model: "llama-3.3-70b-versatile",
        vision: false,
    },
    KnownProvider {
        id: "deepseek",
        name: "DeepSeek",
        base_url: "https://api.deepseek.com",
        chat_path: "/v1/chat/completions",
        default_model: "deepseek-chat",
        vision: false,
    },
    KnownProvider {
        id: "openrouter",
        name: "OpenRouter",
        base_url: "https://openrouter.ai/api",
        chat_path: "/v1/chat/completions",
        default_model: "anthropic/claude-sonnet-4",
        vision: true,
    },
    KnownProvider {
        id: "nvidia",
        name: "NVIDIA NIM",
        base_url: "https://integrate.api.nvidia.com",
        chat_path: "/v1/chat/completions",
        default_model: "meta/llama-3.1-70b-instruct",
        vision: false,
    },
    KnownProvider {
        id: "gemini",
        name: "Google AI (Gemini)",
        base_url: "https://generativelanguage.googleapis.com/v1beta/openai",
        chat_path: "/chat/completions",
        default_model: "gemini-2.0-flash",
        vision: true,
    },
    KnownProvider {
        id: "perplexity",
        name: "Perplexity",
        base_url: "https://api.perplexity.ai",
        chat_path: "/chat/completions",
        default_model: "sonar-pro",
        vision: false,
    },
];

/// Look up a known provider by its ID.
pub fn lookup(id: &str) -> Option<&'static KnownProvider> {
    KNOWN_PROVIDERS.iter().find(|p| p.id == id)
}
