use std::path::Path;

use anyhow::{Context, anyhow};
use serde::Deserialize;

use crate::action::{ActionDescriptor, ActionExample, ParameterSpec, RiskLevel};
use crate::parser::{ParserConfig, ResultParser};

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "action")]
    actions: Vec<ActionEntry>,
}

fn default_version() -> String {
    "1.0.0".into()
}

#[derive(Debug, Deserialize)]
struct ActionEntry {
    name: String,
    description: String,
    category: String,
    #[serde(alias = "risk")]
    risk_level: RiskLevel,
    #[serde(alias = "template")]
    script_template: String,
    #[serde(default, rename = "parameter")]
    parameters: Vec<ParameterSpec>,
    #[serde(default)]
    parser: Option<ParserConfig>,
    #[serde(default, rename = "example")]
    examples: Vec<ActionExample>,
    #[serde(default = "default_version")]
    version: String,
    #[serde(default)]
    author: String,
}

impl TryFrom<ActionEntry> for ActionDescriptor {
    type Error = String;

    fn try_from(entry: ActionEntry) -> Result<Self, Self::Error> {
        let result_parser = entry.parser.map(ResultParser::try_from).transpose()?;
        Ok(Self {
            name: entry.name,
            description: entry.description,
            category: entry.category,
            parameters: entry.parameters,
            risk_level: entry.risk_level,
            script_template: entry.script_template,
            result_parser,
            examples: entry.examples,
            version: entry.version,
            author: entry.author,
        })
    }
}

/// Parse a TOML catalog made of `[[action]]` tables.
///
/// # Errors
///
/// Returns an error if the TOML is invalid or an action's parser cannot be built.
pub fn parse_catalog(content: &str) -> anyhow::Result<Vec<ActionDescriptor>> {
    let file: CatalogFile = toml::from_str(content).context("failed to parse action catalog")?;
    file.actions
        .into_iter()
        .map(|entry| {
            let name = entry.name.clone();
            ActionDescriptor::try_from(entry)
                .map_err(|e| anyhow!("invalid parser for action '{name}': {e}"))
        })
        .collect()
}

/// Load a catalog file.
///
/// # Errors
///
/// Returns an error naming the file if it cannot be read or parsed.
pub fn load_catalog(path: &Path) -> anyhow::Result<Vec<ActionDescriptor>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let actions = parse_catalog(&content).with_context(|| format!("in {}", path.display()))?;
    tracing::debug!(path = %path.display(), count = actions.len(), "loaded action catalog");
    Ok(actions)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::action::{ArgValue, ParamType};

    const SAMPLE: &str = r#"
[[action]]
name = "file_list"
description = "List files in a folder"
category = "files"
risk_level = "safe"
script_template = 'tell app "Finder" to get name of every file of folder (POSIX file "{{ path }}")'
parser = { kind = "delimited", delimiter = ", " }

[[action.parameter]]
name = "path"
type = "string"
description = "Folder path"

[[action.example]]
input = { path = "~/Desktop" }
output = ["a.txt", "b.txt"]

[[action]]
name = "volume_set"
description = "Set output volume"
category = "audio"
risk = "moderate"
template = "set volume output volume {{ level }}"
author = "orbit"

[[action.parameter]]
name = "level"
type = "integer"
required = false
default = 50
"#;

    #[test]
    fn parses_actions_and_parameters() {
        let actions = parse_catalog(SAMPLE).unwrap();
        assert_eq!(actions.len(), 2);

        let list = &actions[0];
        assert_eq!(list.risk_level, RiskLevel::Safe);
        assert_eq!(list.parameters[0].param_type, ParamType::String);
        assert!(list.parameters[0].required);
        assert_eq!(list.version, "1.0.0");
        assert_eq!(
            list.result_parser.as_ref().unwrap().parse("a.txt, b.txt").unwrap(),
            json!(["a.txt", "b.txt"])
        );
        assert_eq!(list.examples[0].input, json!({"path": "~/Desktop"}));

        let volume = &actions[1];
        assert_eq!(volume.risk_level, RiskLevel::Moderate);
        assert_eq!(volume.author, "orbit");
        assert!(volume.result_parser.is_none());
        assert_eq!(volume.parameters[0].default, Some(ArgValue::Integer(50)));
    }

    #[test]
    fn file_entry_equals_hand_built_descriptor() {
        let toml = r#"
[[action]]
name = "notify"
description = "Show a notification"
category = "system"
risk_level = "safe"
script_template = 'display notification "{{ message|escape }}"'
parser = { kind = "boolean" }

[[action.parameter]]
name = "message"
type = "string"
description = "Text"
"#;
        let built = ActionDescriptor::new(
            "notify",
            "Show a notification",
            "system",
            RiskLevel::Safe,
            "display notification \"{{ message|escape }}\"",
        )
        .with_parameter(ParameterSpec::required("message", ParamType::String, "Text"))
        .with_parser(ResultParser::boolean());
        assert_eq!(parse_catalog(toml).unwrap(), vec![built]);
    }

    #[test]
    fn empty_file_has_no_actions() {
        assert!(parse_catalog("").unwrap().is_empty());
    }

    #[test]
    fn unknown_risk_level_rejected() {
        let toml = r#"
[[action]]
name = "x"
description = "x"
category = "x"
risk_level = "extreme"
script_template = "x"
"#;
        assert!(parse_catalog(toml).is_err());
    }

    #[test]
    fn invalid_regex_names_action() {
        let toml = r#"
[[action]]
name = "broken"
description = "x"
category = "x"
risk_level = "safe"
script_template = "x"
parser = { kind = "regex", pattern = "(" }
"#;
        let err = parse_catalog(toml).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("actions.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let actions = load_catalog(&path).unwrap();
        assert_eq!(actions.len(), 2);
    }

    #[test]
    fn load_missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let err = load_catalog(&path).unwrap_err();
        assert!(format!("{err:#}").contains("missing.toml"));
    }

    #[test]
    fn load_invalid_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[[action]\n").unwrap();
        let err = load_catalog(&path).unwrap_err();
        assert!(format!("{err:#}").contains("bad.toml"));
    }
}
