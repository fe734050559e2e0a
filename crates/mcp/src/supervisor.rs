//! Session supervisor
//!
//! Owns every provider session as one scoped resource: either all of them come
//! up or none stay running, and teardown always runs in reverse start order.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::launch::CapabilityProviderSpec;
use crate::session::{SessionOptions, StdioSession};
use crate::{SupervisorError, ToolSession};

/// Turns a spec into a live, handshaken session
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        spec: &CapabilityProviderSpec,
    ) -> Result<Box<dyn ToolSession>, SupervisorError>;
}

/// Launches providers as child processes speaking stdio
#[derive(Debug, Clone, Default)]
pub struct StdioConnector {
    options: SessionOptions,
}

impl StdioConnector {
    pub fn new(options: SessionOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Connector for StdioConnector {
    async fn connect(
        &self,
        spec: &CapabilityProviderSpec,
    ) -> Result<Box<dyn ToolSession>, SupervisorError> {
        let mut session = StdioSession::launch(spec, self.options.clone())
            .await
            .map_err(|source| SupervisorError::Launch {
                name: spec.name().to_string(),
                source,
            })?;

        if let Err(source) = session.handshake().await {
            session.shutdown().await;
            return Err(SupervisorError::Handshake {
                name: spec.name().to_string(),
                source,
            });
        }

        Ok(Box::new(session))
    }
}

/// The set of live sessions for one turn
pub struct Supervisor {
    sessions: Vec<Box<dyn ToolSession>>,
}

impl Supervisor {
    /// Start every spec over stdio
    pub async fn acquire(
        specs: &[CapabilityProviderSpec],
        options: SessionOptions,
    ) -> Result<Self, SupervisorError> {
        Self::acquire_with(specs, &StdioConnector::new(options)).await
    }

    /// Start every spec in order; on the first failure, shut down what already
    /// started (newest first) and return that failure.
    pub async fn acquire_with(
        specs: &[CapabilityProviderSpec],
        connector: &dyn Connector,
    ) -> Result<Self, SupervisorError> {
        let mut sessions: Vec<Box<dyn ToolSession>> = Vec::with_capacity(specs.len());

        for spec in specs {
            match connector.connect(spec).await {
                Ok(session) => {
                    debug!("provider '{}' ready", spec.name());
                    sessions.push(session);
                }
                Err(e) => {
                    warn!(
                        "{}; rolling back {} started provider(s)",
                        e,
                        sessions.len()
                    );
                    shutdown_reversed(&mut sessions).await;
                    return Err(e);
                }
            }
        }

        info!("{} provider(s) running", sessions.len());
        Ok(Self { sessions })
    }

    /// Sessions in start order
    pub fn sessions(&self) -> impl Iterator<Item = (&str, &dyn ToolSession)> + '_ {
        self.sessions
            .iter()
            .map(|s| (s.provider(), s.as_ref() as &dyn ToolSession))
    }

    pub fn names(&self) -> Vec<&str> {
        self.sessions.iter().map(|s| s.provider()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Shut every session down, newest first
    pub async fn release(mut self) {
        debug!("releasing {} provider(s)", self.sessions.len());
        let mut sessions = std::mem::take(&mut self.sessions);
        shutdown_reversed(&mut sessions).await;
    }
}

async fn shutdown_reversed(sessions: &mut Vec<Box<dyn ToolSession>>) {
    while let Some(session) = sessions.pop() {
        debug!("shutting down '{}'", session.provider());
        session.shutdown().await;
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if !self.sessions.is_empty() {
            warn!(
                "supervisor dropped without release; killing {} provider(s)",
                self.sessions.len()
            );
        }
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("sessions", &self.names())
            .finish()
    }
}
