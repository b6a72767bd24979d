mod init;

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use dialoguer::Confirm;
use orbit_core::{
    ActionDescriptor, ArgValue, Arguments, MissionControl, OrbitConfig, ParamType, RiskLevel,
    arguments_from_json, load_catalog,
};
use serde_json::Value;

#[derive(Debug, Parser)]
#[command(name = "orbit", version, about = "Run cataloged desktop actions under a risk policy")]
struct Cli {
    /// Config file (default: $ORBIT_CONFIG or ~/.config/orbit/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Extra action catalog files, loaded after those named in the config
    #[arg(long = "catalog", global = true)]
    catalogs: Vec<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List registered actions
    List {
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        risk: Option<RiskLevel>,
    },
    /// Search action names and descriptions
    Search { query: String },
    /// Show one action in full
    Info { name: String },
    /// Catalog counts by category and risk level
    Stats,
    /// Print the catalog as JSON
    Export {
        #[arg(value_enum)]
        format: ExportFormat,
    },
    /// Invoke an action
    Run {
        name: String,
        /// Arguments as key=value pairs
        params: Vec<String>,
        /// Arguments as a JSON object, merged under key=value pairs
        #[arg(long)]
        args: Option<String>,
        /// Skip the risk policy entirely
        #[arg(long)]
        bypass_policy: bool,
        /// Approve confirmation prompts without asking
        #[arg(long, short)]
        yes: bool,
        /// Print the rendered script instead of running it
        #[arg(long)]
        dry_run: bool,
    },
    /// Write a config file
    Init {
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Write defaults without prompting
        #[arg(long)]
        defaults: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExportFormat {
    /// OpenAI function-calling schemas
    Functions,
    /// Action summaries
    Catalog,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(OrbitConfig::default_path);

    if let Command::Init { output, defaults } = &cli.command {
        return init::run(output.clone().unwrap_or(config_path), *defaults);
    }

    let config = OrbitConfig::load(&config_path)?;
    let mut mission = MissionControl::from_config(&config);
    for path in config.catalog.paths.iter().chain(&cli.catalogs) {
        let actions = load_catalog(path)?;
        mission
            .register_all(actions)
            .with_context(|| format!("failed to register actions from {}", path.display()))?;
    }
    tracing::debug!(actions = mission.registry().len(), "catalog ready");

    match cli.command {
        Command::List { category, risk } => list(&mission, category.as_deref(), risk),
        Command::Search { query } => {
            print_actions(&mission.registry().search(&query));
        }
        Command::Info { name } => {
            let action = mission
                .get(&name)
                .with_context(|| format!("action '{name}' not found"))?;
            println!("{:#}", action.to_summary());
        }
        Command::Stats => {
            println!("{}", serde_json::to_string_pretty(&mission.registry().stats())?);
        }
        Command::Export { format } => match format {
            ExportFormat::Functions => {
                println!("{:#}", Value::Array(mission.export_functions()));
            }
            ExportFormat::Catalog => println!("{}", mission.export_catalog_json()),
        },
        Command::Run {
            name,
            params,
            args,
            bypass_policy,
            yes,
            dry_run,
        } => {
            let action = mission
                .get(&name)
                .with_context(|| format!("action '{name}' not found"))?;
            let arguments = build_arguments(&action, &params, args.as_deref())?;

            if dry_run {
                println!("{}", mission.launcher().render(&action, &arguments)?);
                return Ok(());
            }

            if yes {
                mission.shield_mut().set_confirmation(Some(std::sync::Arc::new(
                    |_: &ActionDescriptor, _: &Arguments| true,
                )));
            } else {
                mission
                    .shield_mut()
                    .set_confirmation(Some(std::sync::Arc::new(confirm_interactively)));
            }

            let result = if bypass_policy {
                mission.invoke_bypassing_policy(&name, &arguments).await?
            } else {
                mission.invoke(&name, &arguments).await?
            };
            print_value(&result);
        }
        Command::Init { .. } => {}
    }

    Ok(())
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

fn list(mission: &MissionControl, category: Option<&str>, risk: Option<RiskLevel>) {
    let registry = mission.registry();
    let mut actions = match category {
        Some(c) => registry.list_by_category(c),
        None => registry.list_all(),
    };
    if let Some(level) = risk {
        actions.retain(|a| a.risk_level == level);
    }
    print_actions(&actions);
}

fn print_actions(actions: &[std::sync::Arc<ActionDescriptor>]) {
    if actions.is_empty() {
        println!("(no actions)");
        return;
    }
    let width = actions.iter().map(|a| a.name.len()).max().unwrap_or(0);
    for a in actions {
        println!(
            "{:<width$}  {:<9}  {:<12}  {}",
            a.name,
            a.risk_level.as_str(),
            a.category,
            a.description
        );
    }
}

fn print_value(value: &Value) {
    match value {
        Value::String(s) => println!("{s}"),
        other => println!("{other:#}"),
    }
}

fn confirm_interactively(action: &ActionDescriptor, args: &Arguments) -> bool {
    let shown: Vec<String> = args.iter().map(|(k, v)| format!("{k}={v}")).collect();
    Confirm::new()
        .with_prompt(format!(
            "Run '{}' ({} risk) with [{}]?",
            action.name,
            action.risk_level,
            shown.join(", ")
        ))
        .default(false)
        .interact()
        .unwrap_or(false)
}

/// Combine `--args` JSON with `key=value` pairs; pairs win on conflict.
fn build_arguments(
    action: &ActionDescriptor,
    pairs: &[String],
    json: Option<&str>,
) -> anyhow::Result<Arguments> {
    let mut args = match json {
        Some(text) => {
            let value: Value = serde_json::from_str(text).context("--args is not valid JSON")?;
            arguments_from_json(value).map_err(|e| anyhow::anyhow!("--args: {e}"))?
        }
        None => Arguments::new(),
    };
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("expected key=value, got '{pair}'");
        };
        let declared = action.parameter(key).map(|p| p.param_type);
        args.insert(key.to_owned(), parse_value(raw, declared));
    }
    Ok(args)
}

/// Strings stay verbatim for string parameters; otherwise JSON is tried first.
fn parse_value(raw: &str, declared: Option<ParamType>) -> ArgValue {
    if declared == Some(ParamType::String) {
        return ArgValue::from(raw);
    }
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|v| ArgValue::try_from(v).ok())
        .unwrap_or_else(|| ArgValue::from(raw))
}
