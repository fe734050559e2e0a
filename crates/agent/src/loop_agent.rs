//! Dispatch loop - drives one prompt to a final answer

use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use relay_config::Config;
use relay_mcp::Supervisor;
use relay_provider::{ChatParams, Message, ModelReply, Provider, Tool, ToolCall, ToolChoice};

use crate::catalog::ToolCatalog;
use crate::context::Conversation;
use crate::normalize::ArgumentNormalizer;
use crate::{AgentError, Result};

/// Bounds on a single turn
#[derive(Debug, Clone)]
pub struct TurnLimits {
    /// Inferences allowed to request tools before the turn is abandoned
    pub max_iterations: u32,
    pub turn_timeout: Option<Duration>,
    pub model_timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for TurnLimits {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            turn_timeout: None,
            model_timeout: Duration::from_secs(120),
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

impl TurnLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_iterations: config.limits.max_iterations,
            turn_timeout: config.limits.turn_timeout(),
            model_timeout: config.limits.model_timeout(),
            max_tokens: config.model.max_tokens,
            temperature: config.model.temperature,
        }
    }
}

/// Outcome of a completed turn
#[derive(Debug, Clone)]
pub struct Turn {
    pub answer: String,
    /// Full conversation, system message first
    pub messages: Vec<Message>,
    /// Non-fatal problems, such as calls to tools nobody advertises
    pub warnings: Vec<String>,
    pub inferences: u32,
}

/// The agent loop: model handle, prompt and limits for prompt-to-answer turns
pub struct AgentLoop<P: Provider> {
    provider: P,
    model: String,
    system_prompt: String,
    normalizer: ArgumentNormalizer,
    limits: TurnLimits,
}

impl<P: Provider> AgentLoop<P> {
    /// Create a loop with default limits and the built-in normalizer
    pub fn new(provider: P, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            system_prompt: String::new(),
            normalizer: ArgumentNormalizer::with_builtin(),
            limits: TurnLimits::default(),
        }
    }

    /// Create a loop from the agent, model and limit settings
    pub fn from_config(provider: P, config: &Config) -> Self {
        Self::new(provider, config.model.name.clone())
            .with_system_prompt(config.agent.system_prompt.clone())
            .with_limits(TurnLimits::from_config(config))
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_normalizer(mut self, normalizer: ArgumentNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_limits(mut self, limits: TurnLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn limits(&self) -> &TurnLimits {
        &self.limits
    }

    /// Run a turn and return only the answer
    pub async fn run(&self, catalog: &ToolCatalog<'_>, prompt: &str) -> Result<String> {
        Ok(self.run_turn(catalog, prompt).await?.answer)
    }

    /// Run a turn against an already built catalog
    pub async fn run_turn(&self, catalog: &ToolCatalog<'_>, prompt: &str) -> Result<Turn> {
        match self.limits.turn_timeout {
            Some(after) => timeout(after, self.drive(catalog, prompt))
                .await
                .map_err(|_| AgentError::TurnTimeout { after })?,
            None => self.drive(catalog, prompt).await,
        }
    }

    /// Build the catalog from `supervisor`, run the turn, and release the
    /// supervisor whatever the outcome.
    pub async fn serve(
        &self,
        supervisor: Supervisor,
        prompt: &str,
        cancel: CancellationToken,
    ) -> Result<Turn> {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("turn cancelled");
                Err(AgentError::Cancelled)
            }
            result = self.serve_scoped(&supervisor, prompt) => result,
        };

        supervisor.release().await;
        outcome
    }

    async fn serve_scoped(&self, supervisor: &Supervisor, prompt: &str) -> Result<Turn> {
        let catalog = ToolCatalog::from_supervisor(supervisor).await?;
        self.run_turn(&catalog, prompt).await
    }

    async fn drive(&self, catalog: &ToolCatalog<'_>, prompt: &str) -> Result<Turn> {
        let mut conversation = Conversation::seed(&self.system_prompt, prompt);
        let tools = catalog.definitions();
        let mut warnings = Vec::new();
        let mut inferences = 0;

        loop {
            let reply = self.infer(&conversation, &tools).await?;
            inferences += 1;
            debug!("inference {}: final = {}", inferences, reply.is_final());
            conversation.push_reply(&reply);

            let calls = match reply {
                ModelReply::Final { content } => {
                    info!("turn complete after {} inference(s)", inferences);
                    return Ok(Turn {
                        answer: content,
                        messages: conversation.into_messages(),
                        warnings,
                        inferences,
                    });
                }
                ModelReply::ToolCalls { calls, .. } => calls,
            };

            if inferences >= self.limits.max_iterations {
                return Err(AgentError::TurnBudgetExceeded {
                    limit: self.limits.max_iterations,
                });
            }

            for call in &calls {
                let result = self.dispatch(catalog, call, &mut warnings).await;
                conversation.push_tool_result(&call.id, &call.name, &result);
            }
            debug_assert_eq!(conversation.pending_calls(), 0);
        }
    }

    async fn infer(&self, conversation: &Conversation, tools: &[Tool]) -> Result<ModelReply> {
        let params = ChatParams {
            model: self.model.clone(),
            messages: conversation.messages().to_vec(),
            tools: tools.to_vec(),
            max_tokens: self.limits.max_tokens,
            temperature: self.limits.temperature,
            tool_choice: ToolChoice::Auto,
        };

        let after = self.limits.model_timeout;
        let response = timeout(after, self.provider.chat(params))
            .await
            .map_err(|_| AgentError::ModelTimeout { after })??;

        Ok(response.into_reply())
    }

    /// Execute one call and render its tool-result text. Never fails the turn.
    async fn dispatch(
        &self,
        catalog: &ToolCatalog<'_>,
        call: &ToolCall,
        warnings: &mut Vec<String>,
    ) -> String {
        let Some(tool) = catalog.resolve(&call.name) else {
            let err = AgentError::ToolNotFound(call.name.clone());
            warn!("{}", err);
            warnings.push(err.to_string());
            return format!(
                "Tool '{}' is not available. Available tools: {}",
                call.name,
                catalog.names().join(", ")
            );
        };

        let arguments = match self.normalizer.normalize(&tool.name, call.arguments.clone()) {
            Ok(arguments) => arguments,
            Err(e) => {
                let err = AgentError::from(e);
                warn!("{}", err);
                return format!("Error: {}", err);
            }
        };

        debug!("calling {} on {}", tool.name, tool.provider);
        match tool.call(arguments).await {
            Ok(result) if result.is_error => format!("Error: {}", result.render()),
            Ok(result) => result.render(),
            Err(e) => {
                let err =
                    AgentError::ToolInvocation(format!("{} ({}): {}", tool.name, tool.provider, e));
                warn!("{}", err);
                format!("Error: {}", err)
            }
        }
    }
}
