use std::sync::Arc;

use serde_json::Value;

use crate::action::{ActionDescriptor, Arguments, arguments_from_json};
use crate::config::OrbitConfig;
use crate::error::{OrbitError, Result, ValidationError};
use crate::launcher::Launcher;
use crate::registry::Registry;
use crate::runner::{InterpreterRunner, ScriptRunner};
use crate::shield::Shield;

/// Registry plus launcher behind a single entry point.
#[derive(Debug)]
pub struct MissionControl<R = InterpreterRunner> {
    registry: Registry,
    launcher: Launcher<R>,
}

impl MissionControl<InterpreterRunner> {
    #[must_use]
    pub fn from_config(config: &OrbitConfig) -> Self {
        Self::new(Launcher::from_config(config))
    }
}

impl<R: ScriptRunner> MissionControl<R> {
    #[must_use]
    pub fn new(launcher: Launcher<R>) -> Self {
        Self {
            registry: Registry::new(),
            launcher,
        }
    }

    /// # Errors
    ///
    /// See [`Registry::register`].
    pub fn register(&mut self, action: ActionDescriptor) -> Result<()> {
        self.registry.register(action)
    }

    /// # Errors
    ///
    /// See [`Registry::register_all`].
    pub fn register_all(&mut self, actions: impl IntoIterator<Item = ActionDescriptor>) -> Result<()> {
        self.registry.register_all(actions)
    }

    /// # Errors
    ///
    /// See [`Registry::unregister`].
    pub fn unregister(&mut self, name: &str) -> Result<Arc<ActionDescriptor>> {
        self.registry.unregister(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<ActionDescriptor>> {
        self.registry.get(name)
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[must_use]
    pub fn launcher(&self) -> &Launcher<R> {
        &self.launcher
    }

    #[must_use]
    pub fn shield(&self) -> &Shield {
        self.launcher.shield()
    }

    pub fn shield_mut(&mut self) -> &mut Shield {
        self.launcher.shield_mut()
    }

    fn lookup(&self, name: &str) -> Result<Arc<ActionDescriptor>> {
        self.registry
            .get(name)
            .ok_or_else(|| OrbitError::ActionNotFound {
                name: name.to_owned(),
            })
    }

    /// Look up `name` and launch it under the shield.
    ///
    /// # Errors
    ///
    /// Returns [`OrbitError::ActionNotFound`] or any launch failure.
    pub async fn invoke(&self, name: &str, args: &Arguments) -> Result<Value> {
        let action = self.lookup(name)?;
        self.launcher.launch(&action, args, false).await
    }

    /// Launch without policy evaluation. Validation still applies.
    ///
    /// # Errors
    ///
    /// Returns [`OrbitError::ActionNotFound`] or any non-policy launch failure.
    pub async fn invoke_bypassing_policy(&self, name: &str, args: &Arguments) -> Result<Value> {
        let action = self.lookup(name)?;
        self.launcher.launch(&action, args, true).await
    }

    /// Synchronous form of [`MissionControl::invoke`]; see [`Launcher::launch_blocking`].
    ///
    /// # Errors
    ///
    /// Same as [`MissionControl::invoke`].
    pub fn invoke_blocking(&self, name: &str, args: &Arguments, bypass_policy: bool) -> Result<Value> {
        let action = self.lookup(name)?;
        self.launcher.launch_blocking(&action, args, bypass_policy)
    }

    /// Run a function call as produced by an LLM. `arguments` may be a JSON
    /// object or a string containing one; null means no arguments.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the arguments are not a usable object,
    /// otherwise the same errors as [`MissionControl::invoke`].
    pub async fn execute_function_call(&self, name: &str, arguments: &Value) -> Result<Value> {
        let action = self.lookup(name)?;
        let args = decode_call_arguments(arguments).map_err(|message| OrbitError::Validation {
            action: name.to_owned(),
            args: Arguments::new(),
            source: ValidationError::MalformedArguments { message },
        })?;
        tracing::debug!(action = %name, "executing function call");
        self.launcher.launch(&action, &args, false).await
    }

    /// Function-calling schemas for every action, in registration order.
    #[must_use]
    pub fn export_functions(&self) -> Vec<Value> {
        self.registry
            .list_all()
            .iter()
            .map(|a| a.to_function_schema())
            .collect()
    }

    /// Summary documents for every action, in registration order.
    #[must_use]
    pub fn export_catalog(&self) -> Vec<Value> {
        self.registry
            .list_all()
            .iter()
            .map(|a| a.to_summary())
            .collect()
    }

    /// Pretty-printed JSON array of [`MissionControl::export_catalog`].
    #[must_use]
    pub fn export_catalog_json(&self) -> String {
        format!("{:#}", Value::Array(self.export_catalog()))
    }
}

fn decode_call_arguments(arguments: &Value) -> std::result::Result<Arguments, String> {
    match arguments {
        Value::Null => Ok(Arguments::new()),
        Value::String(s) if s.trim().is_empty() => Ok(Arguments::new()),
        Value::String(s) => {
            let parsed: Value = serde_json::from_str(s).map_err(|e| e.to_string())?;
            arguments_from_json(parsed)
        }
        other => arguments_from_json(other.clone()),
    }
}
