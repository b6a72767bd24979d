use std::path::PathBuf;

use anyhow::Context;
use dialoguer::{Confirm, Input};
use orbit_core::{OrbitConfig, RiskLevel, ShieldAction};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WizardState {
    pub(crate) interpreter: String,
    pub(crate) timeout: u64,
    pub(crate) retry_on_failure: bool,
    pub(crate) max_retries: u32,
    pub(crate) allow_moderate: bool,
    pub(crate) catalogs: Vec<PathBuf>,
}

impl Default for WizardState {
    fn default() -> Self {
        let defaults = OrbitConfig::default();
        Self {
            interpreter: defaults.launcher.interpreter,
            timeout: defaults.launcher.timeout,
            retry_on_failure: defaults.launcher.retry_on_failure,
            max_retries: defaults.launcher.max_retries,
            allow_moderate: false,
            catalogs: Vec::new(),
        }
    }
}

pub fn run(output: PathBuf, defaults: bool) -> anyhow::Result<()> {
    let mut state = WizardState::default();
    if !defaults {
        println!("orbit init - configuration wizard\n");
        step_launcher(&mut state)?;
        step_shield(&mut state)?;
        step_catalog(&mut state)?;
    }
    write_config(&state, output, defaults)
}

fn step_launcher(state: &mut WizardState) -> anyhow::Result<()> {
    state.interpreter = Input::new()
        .with_prompt("Script interpreter")
        .default(state.interpreter.clone())
        .interact_text()?;
    state.timeout = Input::new()
        .with_prompt("Timeout per run (seconds)")
        .default(state.timeout)
        .interact_text()?;
    state.retry_on_failure = Confirm::new()
        .with_prompt("Retry failed scripts?")
        .default(state.retry_on_failure)
        .interact()?;
    if state.retry_on_failure {
        state.max_retries = Input::new()
            .with_prompt("Total attempts")
            .default(state.max_retries)
            .interact_text()?;
    }
    Ok(())
}

fn step_shield(state: &mut WizardState) -> anyhow::Result<()> {
    state.allow_moderate = Confirm::new()
        .with_prompt("Run moderate-risk actions without asking?")
        .default(false)
        .interact()?;
    Ok(())
}

fn step_catalog(state: &mut WizardState) -> anyhow::Result<()> {
    let paths: String = Input::new()
        .with_prompt("Action catalog files (comma-separated, blank for none)")
        .allow_empty(true)
        .interact_text()?;
    state.catalogs = paths
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect();
    Ok(())
}

pub(crate) fn build_config(state: &WizardState) -> OrbitConfig {
    let mut config = OrbitConfig::default();
    config.launcher.interpreter.clone_from(&state.interpreter);
    config.launcher.timeout = state.timeout;
    config.launcher.retry_on_failure = state.retry_on_failure;
    config.launcher.max_retries = state.max_retries;
    if state.allow_moderate {
        config.shield.rules.set(RiskLevel::Moderate, ShieldAction::Allow);
    }
    config.catalog.paths.clone_from(&state.catalogs);
    config
}

fn write_config(state: &WizardState, path: PathBuf, force: bool) -> anyhow::Result<()> {
    let config = build_config(state);
    let toml_str = toml::to_string_pretty(&config).context("failed to serialize config")?;

    if path.exists() && !force {
        let overwrite = Confirm::new()
            .with_prompt(format!("{} already exists. Overwrite?", path.display()))
            .default(false)
            .interact()?;
        if !overwrite {
            println!("Aborted.");
            return Ok(());
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(&path, &toml_str)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Config written to {}", path.display());
    Ok(())
}
