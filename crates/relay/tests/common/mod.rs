//! Common test utilities for relay integration tests
#![allow(dead_code)]

use assert_cmd::Command;
use std::path::PathBuf;
use tempfile::{tempdir, TempDir};

/// Isolated home and working directory for one invocation
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub work_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = tempdir()?;
        let work_dir = temp_dir.path().join("work");
        std::fs::create_dir_all(&work_dir)?;

        Ok(Self { temp_dir, work_dir })
    }

    /// Path of `./config.json` as the binary sees it
    pub fn local_config(&self) -> PathBuf {
        self.work_dir.join("config.json")
    }

    /// Path of `~/.relay/config.json` as the binary sees it
    pub fn home_config(&self) -> PathBuf {
        self.temp_dir.path().join(".relay").join("config.json")
    }

    /// Command with HOME and the working directory inside the sandbox
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_relay"));
        cmd.current_dir(&self.work_dir)
            .env("HOME", self.temp_dir.path())
            .env_remove("RUST_LOG")
            .env_remove("GROQ_API_KEY");
        cmd
    }

    /// Same sandbox as [`command`](Self::command), for runs that need a live child
    pub fn std_command(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new(env!("CARGO_BIN_EXE_relay"));
        cmd.current_dir(&self.work_dir)
            .env("HOME", self.temp_dir.path())
            .env_remove("RUST_LOG")
            .env_remove("GROQ_API_KEY");
        cmd
    }

    /// Write `./config.json`
    pub fn write_config(&self, json: &str) -> anyhow::Result<()> {
        std::fs::write(self.local_config(), json)?;
        Ok(())
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new().expect("Failed to create test environment")
    }
}
