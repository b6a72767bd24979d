use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shield::{DEFAULT_FORBIDDEN_COMMANDS, DEFAULT_PROTECTED_PATHS, RiskRules};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct OrbitConfig {
    #[serde(default)]
    pub launcher: LauncherConfig,
    #[serde(default)]
    pub shield: ShieldConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

fn default_interpreter() -> String {
    "osascript".into()
}

fn default_interpreter_args() -> Vec<String> {
    vec!["-e".into()]
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

/// How scripts are run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LauncherConfig {
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    /// Arguments placed before the rendered script.
    #[serde(default = "default_interpreter_args")]
    pub interpreter_args: Vec<String>,
    /// Per-attempt timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub retry_on_failure: bool,
    /// Total attempts when `retry_on_failure` is set.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            interpreter_args: default_interpreter_args(),
            timeout: default_timeout(),
            retry_on_failure: false,
            max_retries: default_max_retries(),
        }
    }
}

impl LauncherConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

fn default_protected_paths() -> Vec<String> {
    DEFAULT_PROTECTED_PATHS.iter().map(|&s| s.to_owned()).collect()
}

fn default_forbidden_commands() -> Vec<String> {
    DEFAULT_FORBIDDEN_COMMANDS
        .iter()
        .map(|&s| s.to_owned())
        .collect()
}

fn default_path_arguments() -> Vec<String> {
    ["source", "destination", "directory"]
        .iter()
        .map(|&s| s.to_owned())
        .collect()
}

fn default_command_arguments() -> Vec<String> {
    vec!["command".into()]
}

/// Policy applied before any script runs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ShieldConfig {
    #[serde(default)]
    pub rules: RiskRules,
    #[serde(default = "default_protected_paths")]
    pub protected_paths: Vec<String>,
    #[serde(default = "default_forbidden_commands")]
    pub forbidden_commands: Vec<String>,
    /// Argument names checked against protected paths, in addition to `path`
    /// and names ending in `_path`.
    #[serde(default = "default_path_arguments")]
    pub path_arguments: Vec<String>,
    #[serde(default = "default_command_arguments")]
    pub command_arguments: Vec<String>,
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            rules: RiskRules::default(),
            protected_paths: default_protected_paths(),
            forbidden_commands: default_forbidden_commands(),
            path_arguments: default_path_arguments(),
            command_arguments: default_command_arguments(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CatalogConfig {
    /// Action catalog files loaded at startup.
    #[serde(default)]
    pub paths: Vec<PathBuf>,
}
