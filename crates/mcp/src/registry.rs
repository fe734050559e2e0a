//! Capability registry
//!
//! Built-in and user-declared provider definitions, filtered by the enabled list.

use std::collections::HashSet;
use std::path::Path;

use relay_config::{Config, ServerDefinition};
use tracing::{info, warn};

use crate::launch::{CapabilityProviderSpec, EnvOverlay};

/// Parent variables forwarded to built-in providers so `npx` can resolve
const FORWARDED_VARS: &[&str] = &["PATH", "HOME", "USERPROFILE", "APPDATA", "TMPDIR"];

/// Named provider specs, in registration order
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    specs: Vec<CapabilityProviderSpec>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `filesystem` rooted at `workspace`, and `memory` backed by the data dir
    pub fn builtin(workspace: &Path) -> Self {
        let base = EnvOverlay::new().forward_all(FORWARDED_VARS.iter().copied());

        let filesystem = CapabilityProviderSpec::new("filesystem", "npx")
            .args(["-y", "@modelcontextprotocol/server-filesystem"])
            .arg(workspace.display().to_string())
            .env(base.clone());

        let memory_file = relay_config::data_dir().join("memory.json");
        let memory = CapabilityProviderSpec::new("memory", "npx")
            .args(["-y", "@modelcontextprotocol/server-memory"])
            .env(base.with("MEMORY_FILE_PATH", memory_file.display().to_string()));

        Self {
            specs: vec![filesystem, memory],
        }
    }

    /// Built-ins plus `customServers`; a custom entry replaces a built-in of the same name
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::builtin(&config.workspace_path());

        for server in &config.custom_servers {
            let spec = spec_from_definition(server);
            if let Some(slot) = registry.specs.iter_mut().find(|s| s.name() == server.name) {
                info!("custom server '{}' overrides the built-in", server.name);
                *slot = spec;
            } else {
                registry.specs.push(spec);
            }
        }

        registry
    }

    pub fn get(&self, name: &str) -> Option<&CapabilityProviderSpec> {
        self.specs.iter().find(|s| s.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.specs.iter().map(|s| s.name()).collect()
    }

    pub fn specs(&self) -> &[CapabilityProviderSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Specs for the enabled names, in the order given. Unknown names are skipped.
    pub fn select<S: AsRef<str>>(&self, enabled: &[S]) -> Vec<CapabilityProviderSpec> {
        let mut seen = HashSet::new();
        let mut selected = Vec::new();

        for name in enabled.iter().map(AsRef::as_ref) {
            if !seen.insert(name) {
                continue;
            }
            match self.get(name) {
                Some(spec) => selected.push(spec.clone()),
                None => warn!("unknown provider '{}' in enabled list, skipping", name),
            }
        }

        selected
    }
}

fn spec_from_definition(server: &ServerDefinition) -> CapabilityProviderSpec {
    // literal values win over forwarded ones
    let overlay = EnvOverlay::new().forward_all(server.inherit_env.iter().map(String::as_str));
    let overlay = server
        .env
        .iter()
        .fold(overlay, |overlay, (k, v)| overlay.with(k, v));

    CapabilityProviderSpec::new(&server.name, &server.command)
        .args(server.args.iter().cloned())
        .env(overlay)
}
