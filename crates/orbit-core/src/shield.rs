use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::action::{ActionDescriptor, ArgValue, Arguments, RiskLevel};
use crate::config::ShieldConfig;
use crate::error::DenyReason;
use crate::paths::{PathResolver, is_root};

pub(crate) const DEFAULT_PROTECTED_PATHS: &[&str] = &[
    "/System", "/Library", "/usr", "/bin", "/sbin", "/etc", "/var",
];

pub(crate) const DEFAULT_FORBIDDEN_COMMANDS: &[&str] = &[
    "rm -rf /",
    "dd if=/dev/zero",
    ":(){ :|:& };:",
    "mkfs",
    "chmod 000",
    "chown root",
];

/// Decision configured for a risk level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShieldAction {
    Allow,
    Deny,
    RequireConfirmation,
}

/// Total mapping from risk level to decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskRules {
    pub safe: ShieldAction,
    pub moderate: ShieldAction,
    pub dangerous: ShieldAction,
    pub critical: ShieldAction,
}

impl Default for RiskRules {
    fn default() -> Self {
        Self {
            safe: ShieldAction::Allow,
            moderate: ShieldAction::RequireConfirmation,
            dangerous: ShieldAction::RequireConfirmation,
            critical: ShieldAction::Deny,
        }
    }
}

impl RiskRules {
    #[must_use]
    pub fn action_for(&self, level: RiskLevel) -> ShieldAction {
        match level {
            RiskLevel::Safe => self.safe,
            RiskLevel::Moderate => self.moderate,
            RiskLevel::Dangerous => self.dangerous,
            RiskLevel::Critical => self.critical,
        }
    }

    pub fn set(&mut self, level: RiskLevel, action: ShieldAction) {
        match level {
            RiskLevel::Safe => self.safe = action,
            RiskLevel::Moderate => self.moderate = action,
            RiskLevel::Dangerous => self.dangerous = action,
            RiskLevel::Critical => self.critical = action,
        }
    }
}

/// Outcome of a policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Deny(DenyReason),
    RequireConfirmation,
}

impl PolicyDecision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Caller-supplied approval hook for actions that need confirmation.
pub type ConfirmFn = Arc<dyn Fn(&ActionDescriptor, &Arguments) -> bool + Send + Sync>;

/// Protected path could not be registered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("refusing to protect the filesystem root: every path would be denied")]
pub struct RootNotProtectable;

/// Risk-based policy evaluator. Path and command checks run before the rule
/// table and can only deny.
pub struct Shield {
    rules: RiskRules,
    protected_paths: Vec<PathBuf>,
    forbidden_commands: Vec<String>,
    path_arguments: Vec<String>,
    command_arguments: Vec<String>,
    resolver: PathResolver,
    confirm: Option<ConfirmFn>,
}

impl fmt::Debug for Shield {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shield")
            .field("rules", &self.rules)
            .field("protected_paths", &self.protected_paths)
            .field("forbidden_commands", &self.forbidden_commands)
            .field("path_arguments", &self.path_arguments)
            .field("command_arguments", &self.command_arguments)
            .field("confirm", &self.confirm.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for Shield {
    fn default() -> Self {
        Self::new(&ShieldConfig::default())
    }
}

impl Shield {
    #[must_use]
    pub fn new(config: &ShieldConfig) -> Self {
        Self::with_resolver(config, PathResolver::from_env())
    }

    /// Build with an explicit resolver (fixed home and working directory).
    #[must_use]
    pub fn with_resolver(config: &ShieldConfig, resolver: PathResolver) -> Self {
        let mut protected_paths = Vec::with_capacity(config.protected_paths.len());
        for raw in &config.protected_paths {
            let resolved = resolver.resolve(raw);
            if is_root(&resolved) {
                tracing::warn!("ignoring protected path {raw:?}: the root cannot be protected");
                continue;
            }
            if !protected_paths.contains(&resolved) {
                protected_paths.push(resolved);
            }
        }

        let mut forbidden_commands: Vec<String> = config
            .forbidden_commands
            .iter()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect();
        forbidden_commands.dedup();

        Self {
            rules: config.rules,
            protected_paths,
            forbidden_commands,
            path_arguments: config.path_arguments.clone(),
            command_arguments: config.command_arguments.clone(),
            resolver,
            confirm: None,
        }
    }

    #[must_use]
    pub fn with_confirmation<F>(mut self, confirm: F) -> Self
    where
        F: Fn(&ActionDescriptor, &Arguments) -> bool + Send + Sync + 'static,
    {
        self.confirm = Some(Arc::new(confirm));
        self
    }

    pub fn set_confirmation(&mut self, confirm: Option<ConfirmFn>) {
        self.confirm = confirm;
    }

    #[must_use]
    pub fn has_confirmation(&self) -> bool {
        self.confirm.is_some()
    }

    #[must_use]
    pub fn rules(&self) -> &RiskRules {
        &self.rules
    }

    pub fn set_rule(&mut self, level: RiskLevel, action: ShieldAction) {
        self.rules.set(level, action);
    }

    #[must_use]
    pub fn protected_paths(&self) -> &[PathBuf] {
        &self.protected_paths
    }

    #[must_use]
    pub fn forbidden_commands(&self) -> &[String] {
        &self.forbidden_commands
    }

    /// Evaluate path, command and risk rules without consulting the
    /// confirmation hook. May return [`PolicyDecision::RequireConfirmation`].
    #[must_use]
    pub fn decide(&self, action: &ActionDescriptor, args: &Arguments) -> PolicyDecision {
        if let Some(reason) = self.check_paths(args) {
            return PolicyDecision::Deny(reason);
        }
        if let Some(reason) = self.check_commands(args) {
            return PolicyDecision::Deny(reason);
        }
        match self.rules.action_for(action.risk_level) {
            ShieldAction::Allow => PolicyDecision::Allow,
            ShieldAction::Deny => PolicyDecision::Deny(DenyReason::RiskLevel {
                level: action.risk_level,
            }),
            ShieldAction::RequireConfirmation => PolicyDecision::RequireConfirmation,
        }
    }

    /// Full evaluation: confirmation requirements are settled through the
    /// hook, so the result is either `Allow` or `Deny`.
    #[must_use]
    pub fn evaluate(&self, action: &ActionDescriptor, args: &Arguments) -> PolicyDecision {
        let decision = match self.decide(action, args) {
            PolicyDecision::RequireConfirmation => match &self.confirm {
                Some(confirm) if confirm(action, args) => PolicyDecision::Allow,
                Some(_) => PolicyDecision::Deny(DenyReason::ConfirmationDeclined),
                None => PolicyDecision::Deny(DenyReason::NoConfirmationHandler {
                    level: action.risk_level,
                }),
            },
            other => other,
        };

        match &decision {
            PolicyDecision::Deny(reason) => {
                tracing::warn!(action = %action.name, "shield denied action: {reason}");
            }
            _ => tracing::debug!(action = %action.name, risk = %action.risk_level, "shield allowed action"),
        }
        decision
    }

    fn is_path_argument(&self, name: &str) -> bool {
        name == "path"
            || name.ends_with("_path")
            || self.path_arguments.iter().any(|a| a == name)
    }

    fn is_command_argument(&self, name: &str) -> bool {
        self.command_arguments.iter().any(|a| a == name)
    }

    fn check_paths(&self, args: &Arguments) -> Option<DenyReason> {
        for (name, value) in args {
            if !self.is_path_argument(name) {
                continue;
            }
            let Some(raw) = value.as_str() else {
                continue;
            };
            if let Some((path, prefix)) = self.find_protected(raw) {
                return Some(DenyReason::ProtectedPath {
                    argument: name.clone(),
                    path,
                    prefix: prefix.to_path_buf(),
                });
            }
        }
        None
    }

    fn find_protected(&self, raw: &str) -> Option<(PathBuf, &std::path::Path)> {
        let resolved = self.resolver.resolve(raw);
        self.protected_paths
            .iter()
            .find(|prefix| resolved.starts_with(prefix))
            .map(|prefix| (resolved.clone(), prefix.as_path()))
    }

    fn check_commands(&self, args: &Arguments) -> Option<DenyReason> {
        for (name, value) in args {
            if !self.is_command_argument(name) {
                continue;
            }
            let Some(command) = value.as_str() else {
                continue;
            };
            if let Some(pattern) = self.find_forbidden(command) {
                return Some(DenyReason::ForbiddenCommand {
                    argument: name.clone(),
                    pattern: pattern.to_owned(),
                });
            }
        }
        None
    }

    fn find_forbidden(&self, command: &str) -> Option<&str> {
        self.forbidden_commands
            .iter()
            .find(|pattern| command.contains(pattern.as_str()))
            .map(String::as_str)
    }

    /// True when `raw` resolves into a protected location.
    #[must_use]
    pub fn is_protected(&self, raw: &str) -> bool {
        self.find_protected(raw).is_some()
    }

    /// Protect another prefix. Resolved the same way as arguments.
    ///
    /// # Errors
    ///
    /// Returns [`RootNotProtectable`] if `raw` resolves to the filesystem root.
    pub fn add_protected_path(&mut self, raw: &str) -> Result<(), RootNotProtectable> {
        let resolved = self.resolver.resolve(raw);
        if is_root(&resolved) {
            return Err(RootNotProtectable);
        }
        if !self.protected_paths.contains(&resolved) {
            tracing::debug!(path = %resolved.display(), "protected path added");
            self.protected_paths.push(resolved);
        }
        Ok(())
    }

    /// Returns whether a matching prefix was removed.
    pub fn remove_protected_path(&mut self, raw: &str) -> bool {
        let resolved = self.resolver.resolve(raw);
        let before = self.protected_paths.len();
        self.protected_paths.retain(|p| p != &resolved);
        before != self.protected_paths.len()
    }

    pub fn add_forbidden_command(&mut self, pattern: &str) {
        if !pattern.is_empty() && !self.forbidden_commands.iter().any(|p| p == pattern) {
            self.forbidden_commands.push(pattern.to_owned());
        }
    }

    pub fn remove_forbidden_command(&mut self, pattern: &str) -> bool {
        let before = self.forbidden_commands.len();
        self.forbidden_commands.retain(|p| p != pattern);
        before != self.forbidden_commands.len()
    }
}

/// Argument snapshot helper used in log lines.
pub(crate) fn describe_args(args: &Arguments) -> String {
    args.iter()
        .map(|(k, v)| match v {
            ArgValue::String(s) => format!("{k}={s:?}"),
            other => format!("{k}={other}"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
