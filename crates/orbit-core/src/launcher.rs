use std::time::Duration;

use serde_json::Value;

use crate::action::{ActionDescriptor, Arguments};
use crate::config::{LauncherConfig, OrbitConfig};
use crate::error::{ExecutionError, OrbitError, Result};
use crate::runner::{InterpreterRunner, ScriptOutput, ScriptRunner};
use crate::shield::{PolicyDecision, Shield, describe_args};
use crate::template;

/// Dispatches one invocation: validate, check policy, render, run, parse.
#[derive(Debug)]
pub struct Launcher<R = InterpreterRunner> {
    shield: Shield,
    runner: R,
    timeout: Duration,
    retry_on_failure: bool,
    max_retries: u32,
}

impl Launcher<InterpreterRunner> {
    #[must_use]
    pub fn from_config(config: &OrbitConfig) -> Self {
        Self::new(
            Shield::new(&config.shield),
            InterpreterRunner::from_config(&config.launcher),
            &config.launcher,
        )
    }
}

impl<R: ScriptRunner> Launcher<R> {
    #[must_use]
    pub fn new(shield: Shield, runner: R, config: &LauncherConfig) -> Self {
        Self {
            shield,
            runner,
            timeout: config.timeout(),
            retry_on_failure: config.retry_on_failure,
            max_retries: config.max_retries,
        }
    }

    #[must_use]
    pub fn shield(&self) -> &Shield {
        &self.shield
    }

    pub fn shield_mut(&mut self) -> &mut Shield {
        &mut self.shield
    }

    #[must_use]
    pub fn runner(&self) -> &R {
        &self.runner
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of runs made before an execution failure is surfaced.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        if self.retry_on_failure {
            self.max_retries.max(1)
        } else {
            1
        }
    }

    /// Validate `args` and render the script without checking policy or running it.
    ///
    /// # Errors
    ///
    /// Returns [`OrbitError::Validation`] or [`OrbitError::Template`].
    pub fn render(&self, action: &ActionDescriptor, args: &Arguments) -> Result<String> {
        validate(action, args)?;
        render_script(action, args)
    }

    /// Run `action` with `args`. With `bypass_policy` the shield is skipped.
    ///
    /// # Errors
    ///
    /// Returns the first stage failure. Only execution failures are retried,
    /// and only when retries are enabled.
    pub async fn launch(
        &self,
        action: &ActionDescriptor,
        args: &Arguments,
        bypass_policy: bool,
    ) -> Result<Value> {
        validate(action, args)?;

        if bypass_policy {
            tracing::warn!(action = %action.name, "shield bypassed");
        } else if let PolicyDecision::Deny(reason) = self.shield.evaluate(action, args) {
            return Err(OrbitError::Policy {
                action: action.name.clone(),
                args: args.clone(),
                reason,
            });
        }

        let script = render_script(action, args)?;
        tracing::debug!(action = %action.name, "rendered script ({} bytes)", script.len());
        tracing::info!(action = %action.name, args = %describe_args(args), "launching");

        let output = self.run_with_retry(action, args, &script).await?;
        tracing::info!(
            action = %action.name,
            elapsed_ms = u64::try_from(output.elapsed.as_millis()).unwrap_or(u64::MAX),
            "launch completed"
        );

        let stdout = output.stdout.trim();
        match &action.result_parser {
            Some(parser) => parser.parse(stdout).map_err(|source| OrbitError::Parse {
                action: action.name.clone(),
                args: args.clone(),
                source,
            }),
            None => Ok(Value::String(stdout.to_owned())),
        }
    }

    async fn run_with_retry(
        &self,
        action: &ActionDescriptor,
        args: &Arguments,
        script: &str,
    ) -> Result<ScriptOutput> {
        let attempts = self.attempts();
        let mut attempt = 1;
        loop {
            match self.runner.run(script, self.timeout).await {
                Ok(output) => return Ok(output),
                Err(source) if attempt >= attempts => {
                    tracing::warn!(action = %action.name, "execution failed after {attempt} attempt(s): {source}");
                    return Err(OrbitError::Execution {
                        action: action.name.clone(),
                        args: args.clone(),
                        attempts: attempt,
                        source,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        action = %action.name,
                        "execution failed, retrying ({attempt}/{attempts}): {e}"
                    );
                    attempt += 1;
                }
            }
        }
    }

    /// Synchronous form of [`Launcher::launch`].
    ///
    /// Drives the pipeline on a private current-thread runtime, so it must not
    /// be called from within an async runtime.
    ///
    /// # Errors
    ///
    /// Same as [`Launcher::launch`]; additionally an execution error if called
    /// from inside an async runtime or if the runtime cannot be started.
    pub fn launch_blocking(
        &self,
        action: &ActionDescriptor,
        args: &Arguments,
        bypass_policy: bool,
    ) -> Result<Value> {
        let runtime_error = |e| OrbitError::Execution {
            action: action.name.clone(),
            args: args.clone(),
            attempts: 0,
            source: ExecutionError::Runtime(e),
        };
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(runtime_error(std::io::Error::other(
                "blocking launch called from inside an async runtime; use `launch` instead",
            )));
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(runtime_error)?;
        runtime.block_on(self.launch(action, args, bypass_policy))
    }
}

fn validate(action: &ActionDescriptor, args: &Arguments) -> Result<()> {
    action
        .validate_arguments(args)
        .map_err(|source| OrbitError::Validation {
            action: action.name.clone(),
            args: args.clone(),
            source,
        })
}

fn render_script(action: &ActionDescriptor, args: &Arguments) -> Result<String> {
    let effective = action.effective_arguments(args);
    template::render(&action.script_template, &effective).map_err(|source| OrbitError::Template {
        action: action.name.clone(),
        args: args.clone(),
        source,
    })
}
