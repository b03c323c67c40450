use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Server Args ---
    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:3001")]
    pub server_addr: String,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,

    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    // --- Store Args ---
    /// Store backend for users, chat sessions and wellness logs (redis, memory)
    #[arg(long, env = "STORE_TYPE", default_value = "redis")]
    pub store_type: String,

    /// Store host endpoint (e.g., redis://127.0.0.1:6379)
    #[arg(long, env = "STORE_HOST", default_value = "redis://127.0.0.1:6379")]
    pub store_host: String,

    /// Prefix for every Redis key written by the service.
    #[arg(long, env = "STORE_PREFIX", default_value = "nerva:")]
    pub store_prefix: String,

    // --- Chat LLM Provider Args ---
    /// Type of LLM provider for chat completion (gemini, openai, ollama)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "gemini")]
    pub chat_llm_type: String,

    /// Base URL for the Chat LLM provider API (e.g., http://localhost:11434 for Ollama)
    #[arg(long, env = "CHAT_BASE_URL")] // No default, let adapters handle defaults if None
    pub chat_base_url: Option<String>,

    /// API Key for the Chat LLM provider
    #[arg(long, env = "CHAT_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Model name for chat completion (e.g., gemini-2.5-flash, gpt-4o, llama3)
    #[arg(long, env = "CHAT_MODEL")] // No default, rely on adapter defaults if None
    pub chat_model: Option<String>,

    #[arg(long, env = "LLM_TEMPERATURE", default_value = "0.7")]
    pub llm_temperature: f32,

    #[arg(long, env = "LLM_TOP_P", default_value = "0.9")]
    pub llm_top_p: f32,

    #[arg(long, env = "LLM_TOP_K", default_value = "40")]
    pub llm_top_k: u32,

    #[arg(long, env = "LLM_MAX_OUTPUT_TOKENS", default_value = "1024")]
    pub llm_max_output_tokens: u32,

    /// Per-attempt generation timeout in seconds.
    #[arg(long, env = "LLM_TIMEOUT_SECS", default_value = "30")]
    pub llm_timeout_secs: u64,

    /// Generation attempts before the fallback reply is used (minimum 1).
    #[arg(long, env = "LLM_MAX_ATTEMPTS", default_value = "2")]
    pub llm_max_attempts: u32,

    // --- Pipeline Args ---
    /// Optional JSON file overriding the built-in system prompt and fallback replies.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    /// User messages longer than this many characters are truncated.
    #[arg(long, env = "MAX_MESSAGE_CHARS", default_value = "5000")]
    pub max_message_chars: usize,

    /// Number of prior turns included in the generation prompt.
    #[arg(long, env = "HISTORY_WINDOW", default_value = "10")]
    pub history_window: usize,

    /// Risk level at which crisis resources are mentioned.
    #[arg(long, env = "RESOURCE_RISK_THRESHOLD", default_value = "6")]
    pub resource_risk_threshold: u8,

    /// Risk level at which the crisis intervention technique is selected.
    #[arg(long, env = "CRISIS_RISK_THRESHOLD", default_value = "8")]
    pub crisis_risk_threshold: u8,

    // --- Auth Args ---
    /// Secret used to sign login tokens.
    #[arg(long, env = "JWT_SECRET", default_value = "your-secret-key")]
    pub jwt_secret: String,

    #[arg(long, env = "TOKEN_TTL_HOURS", default_value = "24")]
    pub token_ttl_hours: u64,

    #[arg(long, env = "BCRYPT_COST", default_value = "12")]
    pub bcrypt_cost: u32,

    // --- Rate Limit Args ---
    /// Requests per 15 minutes on /auth routes.
    #[arg(long, env = "AUTH_RATE_LIMIT", default_value = "20")]
    pub auth_rate_limit: u32,

    /// Requests per minute on /chat routes.
    #[arg(long, env = "CHAT_RATE_LIMIT", default_value = "60")]
    pub chat_rate_limit: u32,

    /// Requests per minute on every other route.
    #[arg(long, env = "GENERAL_RATE_LIMIT", default_value = "100")]
    pub general_rate_limit: u32,

    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}

impl Args {
    /// Defaults with in-memory stores, for tests and local runs.
    pub fn in_memory() -> Self {
        let mut args = Args::parse_from(["nerva-companion"]);
        args.store_type = "memory".to_string();
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let args = Args::parse_from([
            "nerva-companion",
            "--store-type",
            "memory",
            "--history-window",
            "4",
            "--chat-llm-type",
            "ollama",
        ]);
        assert_eq!(args.store_type, "memory");
        assert_eq!(args.history_window, 4);
        assert_eq!(args.chat_llm_type, "ollama");
        assert_eq!(args.crisis_risk_threshold, 8);
    }
}
