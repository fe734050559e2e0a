//! Launch descriptions for capability providers

use std::collections::BTreeMap;
use std::fmt;
use std::process::Stdio;
use tokio::process::Command;

/// Explicit environment for a provider process.
///
/// Providers never inherit the parent environment wholesale; only what is
/// listed here reaches the child.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverlay {
    vars: BTreeMap<String, String>,
}

impl EnvOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a literal variable
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Copy a variable from the current process, if it is set
    pub fn forward(mut self, key: &str) -> Self {
        if let Ok(value) = std::env::var(key) {
            self.vars.insert(key.to_string(), value);
        }
        self
    }

    pub fn forward_all<'a>(self, keys: impl IntoIterator<Item = &'a str>) -> Self {
        keys.into_iter().fold(self, |overlay, key| overlay.forward(key))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvOverlay {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// How to start one capability provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityProviderSpec {
    name: String,
    command: String,
    args: Vec<String>,
    env: EnvOverlay,
}

impl CapabilityProviderSpec {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: EnvOverlay::default(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, env: EnvOverlay) -> Self {
        self.env = env;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &str {
        &self.command
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn overlay(&self) -> &EnvOverlay {
        &self.env
    }

    /// Command line for logs and listings
    pub fn display_command(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Process builder with piped stdio and only the overlay environment.
    ///
    /// On unix the child leads its own process group, so whatever a launcher
    /// such as `npx` starts underneath it can be killed along with it.
    pub(crate) fn command(&self) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .env_clear()
            .envs(self.env.iter())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }
}

impl fmt::Display for CapabilityProviderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.display_command())
    }
}

/// SIGKILL every process left in the group led by `pid`
#[cfg(unix)]
pub(crate) fn kill_process_group(pid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;
    use tracing::{debug, warn};

    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) => debug!("killed process group {}", pid),
        Err(Errno::ESRCH) => {}
        Err(e) => warn!("killing process group {} failed: {}", pid, e),
    }
}

#[cfg(not(unix))]
pub(crate) fn kill_process_group(_pid: u32) {}
