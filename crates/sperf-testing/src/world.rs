//! TestBundle pattern for declarative integration test setup.
//!
//! Provides a fluent interface for:
//! - Laying out per-node artifact files in an isolated directory
//! - Running the analysis pipeline in-process
//! - Executing the `sperf` binary with an isolated environment

use anyhow::{Context, Result};
use assert_cmd::Command;
use predicates::Predicate;
use sperf_runtime::{Config, Pipeline, Report};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Declarative diagnostic bundle builder.
///
/// # Example
/// ```no_run
/// use sperf_testing::{fixtures, TestBundle};
///
/// let bundle = TestBundle::new()
///     .with_file("10.0.0.1", "logs/system.log", &fixtures::log_line(
///         "INFO", "main", fixtures::at(10, 0, 0), "CassandraDaemon", "started"));
///
/// let result = bundle.run(&["analyze", "--format", "json"]).unwrap();
/// assert!(result.success());
/// ```
pub struct TestBundle {
    temp_dir: TempDir,
    root: PathBuf,
    env_vars: HashMap<String, String>,
}

impl Default for TestBundle {
    fn default() -> Self {
        Self::new()
    }
}

impl TestBundle {
    /// Create an empty bundle root inside a fresh temporary directory.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().join("bundle");
        std::fs::create_dir_all(&root).expect("Failed to create bundle root");

        Self {
            temp_dir,
            root,
            env_vars: HashMap::new(),
        }
    }

    /// Bundle root, as passed to `sperf analyze`.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scratch directory next to the bundle (config files, outputs).
    pub fn scratch(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Create an empty node directory.
    pub fn with_node(self, node: &str) -> Self {
        std::fs::create_dir_all(self.root.join(node)).expect("Failed to create node dir");
        self
    }

    /// Write a file below `<root>/<node>/`.
    pub fn with_file(self, node: &str, relative_path: &str, content: &str) -> Self {
        self.with_bytes(node, relative_path, content.as_bytes())
    }

    /// Write raw bytes below `<root>/<node>/` (binary or non-UTF-8 content).
    pub fn with_bytes(self, node: &str, relative_path: &str, content: &[u8]) -> Self {
        let path = self.root.join(node).join(relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create artifact dir");
        }
        std::fs::write(&path, content).expect("Failed to write artifact");
        self
    }

    /// Write a config file in the scratch directory and return its path.
    pub fn write_config(&self, content: &str) -> Result<PathBuf> {
        let path = self.temp_dir.path().join("sperf.toml");
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Set an environment variable for CLI runs.
    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env_vars.insert(key.to_string(), value.to_string());
        self
    }

    /// Run the pipeline in-process.
    pub fn analyze(&self, config: Config) -> Result<Report> {
        Ok(Pipeline::new(config).run(&self.root)?)
    }

    /// Run the pipeline in-process with the given rule added after the catalog.
    pub fn analyze_with_rule(
        &self,
        config: Config,
        rule: Box<dyn sperf_runtime::Rule>,
    ) -> Result<Report> {
        Ok(Pipeline::new(config).with_rule(rule).run(&self.root)?)
    }

    /// Configure a command with this bundle's isolated environment.
    ///
    /// The config lookup is pinned inside the scratch directory so a user
    /// config never leaks into a test run.
    pub fn configure_command<'a>(&self, cmd: &'a mut Command) -> &'a mut Command {
        cmd.env(
            sperf_runtime::CONFIG_ENV,
            self.temp_dir.path().join("absent.toml"),
        );
        cmd.env_remove("RUST_LOG");
        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }
        cmd
    }

    /// Run `sperf <args...>`, inserting the bundle root after `analyze`.
    ///
    /// # Note
    /// This method uses `Command::cargo_bin()` which requires the binary to be
    /// built and the `CARGO_BIN_EXE_` environment variable to be set (which
    /// cargo test does automatically).
    #[allow(deprecated)]
    pub fn run(&self, args: &[&str]) -> Result<CliResult> {
        let mut cmd = Command::cargo_bin("sperf")
            .map_err(|e| anyhow::anyhow!("Failed to find sperf binary: {}", e))?;
        self.configure_command(&mut cmd);

        let mut args = args.iter();
        if let Some(first) = args.next() {
            cmd.arg(first);
            if *first == "analyze" {
                cmd.arg(&self.root);
            }
        }
        cmd.args(args);

        let output = cmd.output()?;
        Ok(CliResult {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Result of a CLI command execution.
#[derive(Debug)]
pub struct CliResult {
    pub status: std::process::ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CliResult {
    /// Check if the command succeeded.
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }

    /// Parse stdout as JSON.
    pub fn json(&self) -> Result<serde_json::Value> {
        serde_json::from_str(&self.stdout)
            .with_context(|| format!("stdout is not JSON:\n{}", self.stdout))
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    /// Check stdout against a predicate, failing with the full output.
    pub fn assert_stdout(&self, predicate: impl Predicate<str>) -> Result<()> {
        if !predicate.eval(&self.stdout) {
            anyhow::bail!("stdout did not match:\n{}", self.stdout);
        }
        Ok(())
    }

    /// Check stderr against a predicate, failing with the full output.
    pub fn assert_stderr(&self, predicate: impl Predicate<str>) -> Result<()> {
        if !predicate.eval(&self.stderr) {
            anyhow::bail!("stderr did not match:\n{}", self.stderr);
        }
        Ok(())
    }
}
