//! relay command implementations

use anyhow::{anyhow, Context, Result};
use std::path::Path;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use relay_agent::{AgentLoop, ToolCatalog};
use relay_config::{self, resolve_config_path, Config};
use relay_mcp::{CapabilityProviderSpec, CapabilityRegistry, SessionOptions, Supervisor};
use relay_provider::{ChatCompletionsProvider, ModelBackend, Provider};

/// Prompt used when `ask` is given none
pub const DEFAULT_PROMPT: &str = "Read and summarize the file ./README.md";

/// Load the config; an explicitly named file must exist
async fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let path = resolve_config_path(explicit);
    let config = match explicit {
        Some(_) => Config::load_required(&path).await,
        None => Config::load_from(&path).await,
    }
    .with_context(|| format!("failed to load config from {}", path.display()))?;

    debug!("config loaded from {}", path.display());
    Ok(config)
}

/// Log level from config, before logging is set up
pub async fn configured_log_level(explicit: Option<&Path>) -> String {
    match load_config(explicit).await {
        Ok(config) => config.logging.level,
        Err(_) => "warn".to_string(),
    }
}

fn build_provider(config: &Config) -> Result<ChatCompletionsProvider> {
    let backend = ModelBackend::from_name(&config.model.provider)?;
    let api_key = backend
        .resolve_api_key(config.model.api_key())
        .with_context(|| format!("no API key for model provider '{}'", backend))?;

    let provider = ChatCompletionsProvider::new(
        backend,
        api_key,
        config.model.api_base.clone(),
        Some(config.model.name.clone()),
    );
    info!("model: {} via {}", provider.default_model(), backend);
    Ok(provider)
}

fn enabled_specs(config: &Config) -> Vec<CapabilityProviderSpec> {
    CapabilityRegistry::from_config(config).select(&config.mcp_servers)
}

/// Token cancelled on Ctrl-C. Installed before any provider starts so an
/// interrupt always goes through teardown.
fn interrupt_token() -> (CancellationToken, JoinHandle<()>) {
    let cancel = CancellationToken::new();
    let listener = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, shutting down providers");
                cancel.cancel();
            }
        })
    };
    (cancel, listener)
}

/// Start the enabled providers. Cancelling drops the startup, which kills
/// whatever had already started.
async fn start_providers(config: &Config, cancel: &CancellationToken) -> Result<Supervisor> {
    let specs = enabled_specs(config);
    if specs.is_empty() {
        warn!("no capability providers enabled; the model will have no tools");
    }

    let data_dir = relay_config::data_dir();
    relay_config::ensure_dir(&data_dir)
        .await
        .with_context(|| format!("failed to create {}", data_dir.display()))?;

    let acquire = Supervisor::acquire(&specs, SessionOptions::from_limits(&config.limits));
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(anyhow!("interrupted while starting capability providers")),
        result = acquire => result.context("failed to start capability providers"),
    }
}

/// Answer one prompt
pub async fn ask_command(config_path: Option<&Path>, prompt: &str) -> Result<()> {
    let config = load_config(config_path).await?;
    let provider = build_provider(&config)?;
    let agent = AgentLoop::from_config(provider, &config);

    let (cancel, interrupt) = interrupt_token();
    let supervisor = match start_providers(&config, &cancel).await {
        Ok(supervisor) => supervisor,
        Err(e) => {
            interrupt.abort();
            return Err(e);
        }
    };

    let outcome = agent.serve(supervisor, prompt, cancel).await;
    interrupt.abort();

    let turn = outcome.context("turn failed")?;
    for warning in &turn.warnings {
        warn!("{}", warning);
    }
    debug!("answered after {} inference(s)", turn.inferences);

    println!("{}", turn.answer);
    Ok(())
}

/// List the tools of every enabled provider
pub async fn tools_command(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path).await?;
    let (cancel, interrupt) = interrupt_token();
    let supervisor = match start_providers(&config, &cancel).await {
        Ok(supervisor) => supervisor,
        Err(e) => {
            interrupt.abort();
            return Err(e);
        }
    };

    let listing = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(anyhow!("interrupted while listing tools")),
        catalog = ToolCatalog::from_supervisor(&supervisor) => catalog
            .map(|catalog| {
                catalog
                    .iter()
                    .map(|tool| {
                        (
                            tool.provider.clone(),
                            tool.name.clone(),
                            tool.schema.function.description.clone(),
                        )
                    })
                    .collect::<Vec<_>>()
            })
            .context("failed to build tool catalog"),
    };
    supervisor.release().await;
    interrupt.abort();

    let tools = listing?;
    if tools.is_empty() {
        println!("No tools available");
        return Ok(());
    }

    println!("Tools ({}):", tools.len());
    for (provider, name, description) in tools {
        let summary = description.lines().next().unwrap_or_default();
        println!("  {:<28} [{}] {}", name, provider, summary);
    }
    Ok(())
}

/// List known providers and whether each is enabled
pub async fn servers_command(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path).await?;
    let registry = CapabilityRegistry::from_config(&config);

    println!("Providers:");
    for spec in registry.specs() {
        let mark = if config.is_enabled(spec.name()) { "x" } else { " " };
        println!("  [{}] {:<14} {}", mark, spec.name(), spec.display_command());
    }

    for name in &config.mcp_servers {
        if registry.get(name).is_none() {
            println!("  [?] {:<14} (enabled but not defined)", name);
        }
    }
    Ok(())
}

/// Write a default config
pub async fn init_command(config_path: Option<&Path>) -> Result<()> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(relay_config::config_path);

    let existed = path.exists();
    relay_config::init(&path)
        .await
        .with_context(|| format!("failed to initialize config at {}", path.display()))?;

    if existed {
        println!("Config already exists at {}", path.display());
    } else {
        println!("Config written to {}", path.display());
        println!("Set model.apiKey there, or export the provider's API key variable.");
    }
    Ok(())
}
