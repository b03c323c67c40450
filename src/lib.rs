pub mod accounts;
pub mod agent;
pub mod cli;
pub mod config;
pub mod error;
pub mod history;
pub mod llm;
pub mod models;
pub mod server;
pub mod therapy;
pub mod wellness;

use accounts::{ create_user_store, token::TokenKeys, AccountService };
use agent::TherapyAgent;
use cli::Args;
use config::prompt::{ self, PromptConfig };
use history::initialize_conversation_store;
use llm::chat::ChatClient;
use log::{ info, warn };
use server::{ AppState, Server };
use server::rate_limit::RateLimits;
use std::error::Error;
use std::sync::Arc;
use wellness::{ create_wellness_store, WellnessService };

const DEFAULT_JWT_SECRET: &str = "your-secret-key";

fn log_configuration(args: &Args) {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("Store Type: {}", args.store_type);
    info!("Store Host: {}", args.store_host);
    info!("Store Prefix: {}", args.store_prefix);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Chat Model: {}", args.chat_model.as_deref().unwrap_or("adapter default"));
    info!(
        "Generation: temperature={}, top_p={}, top_k={}, max_output_tokens={}",
        args.llm_temperature,
        args.llm_top_p,
        args.llm_top_k,
        args.llm_max_output_tokens
    );
    info!("Generation Timeout: {}s x {} attempts", args.llm_timeout_secs, args.llm_max_attempts);
    info!("Prompts Path: {}", args.prompts_path.as_deref().unwrap_or("built-in"));
    info!("Max Message Chars: {}", args.max_message_chars);
    info!("History Window: {}", args.history_window);
    info!(
        "Risk Thresholds: resources>={}, crisis>={}",
        args.resource_risk_threshold,
        args.crisis_risk_threshold
    );
    info!("Token TTL: {}h", args.token_ttl_hours);
    info!(
        "Rate Limits: auth={}/15min, chat={}/min, general={}/min",
        args.auth_rate_limit,
        args.chat_rate_limit,
        args.general_rate_limit
    );
    info!("-------------------------");
}

/// Builds every service behind the router around the given generation client.
pub fn build_app_state(
    args: &Args,
    chat_client: Arc<dyn ChatClient>,
    prompt_config: Arc<PromptConfig>
) -> Result<AppState, Box<dyn Error + Send + Sync>> {
    let conversation_store = initialize_conversation_store(args)?;
    let agent = TherapyAgent::new(conversation_store, chat_client, prompt_config, args);

    let accounts = AccountService::new(
        create_user_store(args)?,
        TokenKeys::from_secret(&args.jwt_secret),
        args.token_ttl_hours,
        args.bcrypt_cost
    );
    let wellness = WellnessService::new(create_wellness_store(args)?);

    Ok(AppState {
        agent: Arc::new(agent),
        accounts,
        wellness,
        limits: RateLimits::from_args(args),
    })
}

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    log_configuration(&args);
    if args.jwt_secret == DEFAULT_JWT_SECRET {
        warn!("JWT_SECRET is not set, tokens are signed with the built-in development secret");
    }

    let chat_client = TherapyAgent::initialize_llm_client(&args)?;
    let prompt_config = prompt::load_prompts(args.prompts_path.as_deref())?;
    let state = build_app_state(&args, chat_client, prompt_config)?;

    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, state, args);
    server.run().await?;

    Ok(())
}
