//! Stdio session to one capability provider

use async_trait::async_trait;
use serde_json::{json, Value};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use relay_config::LimitsConfig;

use crate::launch::{kill_process_group, CapabilityProviderSpec};
use crate::protocol::{
    self, CallToolResult, Implementation, Incoming, InitializeResult, Notification, RemoteTool,
    Request, ToolsListResult,
};
use crate::{McpError, Result, ToolSession};

/// Upper bound on `tools/list` pages, in case a provider keeps returning cursors
const MAX_TOOL_PAGES: usize = 64;

/// Timeouts and client identity for a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub launch_timeout: Duration,
    pub handshake_timeout: Duration,
    pub request_timeout: Duration,
    pub shutdown_grace: Duration,
    pub client_name: String,
    pub client_version: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_limits(&LimitsConfig::default())
    }
}

impl SessionOptions {
    pub fn from_limits(limits: &LimitsConfig) -> Self {
        Self {
            launch_timeout: limits.launch_timeout(),
            handshake_timeout: limits.handshake_timeout(),
            request_timeout: limits.tool_timeout(),
            shutdown_grace: limits.shutdown_grace(),
            client_name: "relay".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Request/response plumbing, guarded by the session mutex
struct Channel {
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    /// Set while a line is being written; still set if that write was cancelled
    partial_write: bool,
}

impl Channel {
    async fn send(&mut self, line: &str) -> Result<()> {
        if self.partial_write && self.stdin.take().is_some() {
            warn!("provider stdin holds an interrupted message, closing it");
        }

        let stdin = self.stdin.as_mut().ok_or(McpError::Closed)?;
        self.partial_write = true;
        stdin.write_all(line.as_bytes()).await.map_err(write_error)?;
        stdin.flush().await.map_err(write_error)?;
        self.partial_write = false;
        Ok(())
    }

    /// Read until the response for `id`, servicing everything else on the way
    async fn await_response(&mut self, id: u64, provider: &str) -> Result<Value> {
        loop {
            let line = match self.stdout.next_line().await? {
                Some(line) => line,
                None => return Err(McpError::Closed),
            };
            if line.trim().is_empty() {
                continue;
            }

            match protocol::decode(&line) {
                Ok(Incoming::Response {
                    id: Some(got),
                    outcome,
                }) if got == id => return outcome.map_err(McpError::from),
                Ok(Incoming::Malformed {
                    id: Some(got),
                    reason,
                }) if got == id => return Err(McpError::Protocol(reason)),
                Ok(Incoming::Response { id: got, .. })
                | Ok(Incoming::Malformed { id: got, .. }) => {
                    debug!("{}: discarding stale response {:?}", provider, got);
                }
                Ok(Incoming::Request { id: req_id, method, .. }) => {
                    debug!("{}: answering provider request '{}'", provider, method);
                    let reply = protocol::reply_to(&req_id, &method);
                    self.send(&protocol::encode(&reply)?).await?;
                }
                Ok(Incoming::Notification { method, .. }) => {
                    trace!("{}: notification '{}'", provider, method);
                }
                Err(e) => {
                    debug!("{}: ignoring non-protocol output ({}): {}", provider, e, line);
                }
            }
        }
    }
}

fn write_error(err: io::Error) -> McpError {
    if err.kind() == io::ErrorKind::BrokenPipe {
        McpError::Closed
    } else {
        McpError::Io(err)
    }
}

/// Live session over a child process's stdin/stdout
pub struct StdioSession {
    name: String,
    pid: Option<u32>,
    options: SessionOptions,
    channel: Mutex<Channel>,
    child: Mutex<Option<Child>>,
    server_info: Option<Implementation>,
    stderr_task: Option<JoinHandle<()>>,
}

impl StdioSession {
    /// Spawn the provider process. The session is not usable until [`handshake`](Self::handshake).
    pub async fn launch(spec: &CapabilityProviderSpec, options: SessionOptions) -> Result<Self> {
        debug!("launching provider {}", spec);

        let mut cmd = spec.command();
        let spawned = timeout(
            options.launch_timeout,
            tokio::task::spawn_blocking(move || cmd.spawn()),
        )
        .await;

        let mut child = match spawned {
            Ok(Ok(Ok(child))) => child,
            Ok(Ok(Err(source))) => {
                return Err(McpError::Spawn {
                    command: spec.display_command(),
                    source,
                })
            }
            Ok(Err(join)) => return Err(McpError::Io(io::Error::new(io::ErrorKind::Other, join))),
            Err(_) => {
                return Err(McpError::Timeout {
                    method: "launch".to_string(),
                    after: options.launch_timeout,
                })
            }
        };

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Protocol("child stdout was not piped".to_string()))?;

        let stderr_task = child.stderr.take().map(|stderr| {
            let name = spec.name().to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("{} stderr: {}", name, line);
                }
            })
        });

        let pid = child.id();
        debug!("provider '{}' started with pid {:?}", spec.name(), pid);

        Ok(Self {
            name: spec.name().to_string(),
            pid,
            options,
            channel: Mutex::new(Channel {
                stdin,
                stdout: BufReader::new(stdout).lines(),
                next_id: 0,
                partial_write: false,
            }),
            child: Mutex::new(Some(child)),
            server_info: None,
            stderr_task,
        })
    }

    /// `initialize` then `notifications/initialized`
    pub async fn handshake(&mut self) -> Result<()> {
        let params = protocol::initialize_params(&self.options.client_name, &self.options.client_version);
        let result = self
            .request("initialize", Some(params), self.options.handshake_timeout)
            .await?;
        let init: InitializeResult = serde_json::from_value(result)?;

        if init.protocol_version != protocol::PROTOCOL_VERSION {
            warn!(
                "{}: provider speaks protocol {}, offered {}",
                self.name,
                init.protocol_version,
                protocol::PROTOCOL_VERSION
            );
        }

        self.notify(
            "notifications/initialized",
            None,
            self.options.handshake_timeout,
        )
        .await?;

        match &init.server_info {
            Some(info) => info!("connected to {} ({} {})", self.name, info.name, info.version),
            None => info!("connected to {}", self.name),
        }
        self.server_info = init.server_info;
        Ok(())
    }

    async fn kill(&self, child: &mut Child) {
        if let Some(pid) = self.pid {
            kill_process_group(pid);
        }
        if let Err(e) = child.kill().await {
            warn!("{}: kill failed: {}", self.name, e);
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn server_info(&self) -> Option<&Implementation> {
        self.server_info.as_ref()
    }

    async fn request(&self, method: &str, params: Option<Value>, limit: Duration) -> Result<Value> {
        let exchange = async {
            let mut channel = self.channel.lock().await;
            channel.next_id += 1;
            let id = channel.next_id;

            trace!("{} -> {} (id {})", self.name, method, id);
            let line = protocol::encode(&Request::new(id, method, params))?;
            channel.send(&line).await?;
            channel.await_response(id, &self.name).await
        };

        match timeout(limit, exchange).await {
            Ok(result) => result,
            Err(_) => Err(McpError::Timeout {
                method: method.to_string(),
                after: limit,
            }),
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>, limit: Duration) -> Result<()> {
        let line = protocol::encode(&Notification::new(method, params))?;
        let delivery = async { self.channel.lock().await.send(&line).await };

        match timeout(limit, delivery).await {
            Ok(result) => result,
            Err(_) => Err(McpError::Timeout {
                method: method.to_string(),
                after: limit,
            }),
        }
    }
}

#[async_trait]
impl ToolSession for StdioSession {
    fn provider(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> Result<Vec<RemoteTool>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_TOOL_PAGES {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let result = self
                .request("tools/list", params, self.options.request_timeout)
                .await?;
            let page: ToolsListResult = serde_json::from_value(result)?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => {
                    debug!("{} advertises {} tools", self.name, tools.len());
                    return Ok(tools);
                }
            }
        }

        Err(McpError::Protocol(format!(
            "tools/list still paginating after {} pages",
            MAX_TOOL_PAGES
        )))
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        debug!("{}: calling {}", self.name, name);
        let result = self
            .request(
                "tools/call",
                Some(json!({ "name": name, "arguments": arguments })),
                self.options.request_timeout,
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn shutdown(&self) {
        let grace = self.options.shutdown_grace;

        match timeout(grace, self.channel.lock()).await {
            Ok(mut channel) => {
                channel.stdin.take();
            }
            Err(_) => warn!("{}: channel still busy at shutdown", self.name),
        }

        let mut guard = self.child.lock().await;
        if let Some(mut child) = guard.take() {
            match child.try_wait() {
                Ok(Some(status)) => debug!("{} had already exited ({})", self.name, status),
                Ok(None) => match timeout(grace, child.wait()).await {
                    Ok(Ok(status)) => debug!("{} exited ({})", self.name, status),
                    Ok(Err(e)) => {
                        warn!("{}: waiting for exit failed: {}", self.name, e);
                        self.kill(&mut child).await;
                    }
                    Err(_) => {
                        warn!("{} did not exit within {:?}, killing", self.name, grace);
                        self.kill(&mut child).await;
                    }
                },
                Err(e) => {
                    warn!("{}: cannot query exit status: {}", self.name, e);
                    self.kill(&mut child).await;
                }
            }

            // a launcher can exit and leave the real server running in its group
            if let Some(pid) = self.pid {
                kill_process_group(pid);
            }
        }

        if let Some(task) = &self.stderr_task {
            task.abort();
        }
    }
}

impl Drop for StdioSession {
    fn drop(&mut self) {
        if let Some(task) = &self.stderr_task {
            task.abort();
        }
        // dropped without shutdown, e.g. a cancelled startup
        if self.child.get_mut().is_some() {
            if let Some(pid) = self.pid {
                warn!("{} dropped while running, killing its process group", self.name);
                kill_process_group(pid);
            }
        }
    }
}

impl std::fmt::Debug for StdioSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioSession")
            .field("name", &self.name)
            .field("pid", &self.pid)
            .field("server_info", &self.server_info)
            .finish()
    }
}
