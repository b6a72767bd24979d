//! Catalog, policy and dispatch for scripted desktop actions.

pub mod action;
pub mod catalog;
pub mod config;
pub mod error;
pub mod launcher;
pub mod mission;
pub mod parser;
pub mod paths;
pub mod registry;
pub mod runner;
pub mod shield;
pub mod template;

pub use action::{
    ActionDescriptor, ActionExample, ArgValue, Arguments, ParamType, ParameterSpec, RiskLevel,
    arguments_from_json,
};
pub use catalog::{load_catalog, parse_catalog};
pub use config::{CatalogConfig, LauncherConfig, OrbitConfig, ShieldConfig};
pub use error::{
    DenyReason, ErrorKind, ExecutionError, OrbitError, ParseError, Result, TemplateError,
    ValidationError,
};
pub use launcher::Launcher;
pub use mission::MissionControl;
pub use parser::{ParserConfig, ResultParser};
pub use paths::PathResolver;
pub use registry::{CatalogStats, Registry};
pub use runner::{InterpreterRunner, ScriptOutput, ScriptRunner};
pub use shield::{ConfirmFn, PolicyDecision, RiskRules, Shield, ShieldAction};
pub use template::Template;
