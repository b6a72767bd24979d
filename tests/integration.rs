#![cfg(unix)]

use std::path::PathBuf;
use std::time::{Duration, Instant};

use orbit_core::{
    ActionDescriptor, ArgValue, Arguments, DenyReason, ErrorKind, ExecutionError, InterpreterRunner,
    Launcher, LauncherConfig, MissionControl, OrbitError, ParamType, ParameterSpec, PathResolver,
    ResultParser, RiskLevel, Shield, ShieldConfig, parse_catalog,
};
use serde_json::json;

fn launcher_config() -> LauncherConfig {
    LauncherConfig {
        interpreter: "sh".into(),
        interpreter_args: vec!["-c".into()],
        ..LauncherConfig::default()
    }
}

fn shield() -> Shield {
    let resolver = PathResolver::new(Some(PathBuf::from("/Users/tester")), PathBuf::from("/tmp"));
    Shield::with_resolver(&ShieldConfig::default(), resolver)
}

fn mission_with(shield: Shield, config: &LauncherConfig) -> MissionControl {
    MissionControl::new(Launcher::new(
        shield,
        InterpreterRunner::from_config(config),
        config,
    ))
}

fn mission() -> MissionControl {
    mission_with(shield(), &launcher_config())
}

fn args(pairs: &[(&str, &str)]) -> Arguments {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), ArgValue::from(*v)))
        .collect()
}

fn echo_test() -> ActionDescriptor {
    ActionDescriptor::new(
        "echo_test",
        "Echo a message",
        "test",
        RiskLevel::Safe,
        "printf '%s\\n' \"{{ msg|escape }}\"",
    )
    .with_parameter(ParameterSpec::required("msg", ParamType::String, "Message"))
}

#[tokio::test]
async fn safe_action_runs_without_confirmation() {
    let mut mc = mission();
    mc.register(echo_test()).unwrap();

    let value = mc.invoke("echo_test", &args(&[("msg", "hello")])).await.unwrap();
    assert_eq!(value, json!("hello"));
}

#[tokio::test]
async fn critical_action_denied_by_default() {
    let mut mc = mission();
    mc.register(ActionDescriptor::new(
        "system_shutdown",
        "Shut down",
        "system",
        RiskLevel::Critical,
        "touch /tmp/orbit-should-never-exist",
    ))
    .unwrap();

    for a in [Arguments::new(), args(&[("force", "yes")])] {
        let err = mc.invoke("system_shutdown", &a).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Policy);
        assert_eq!(
            err.deny_reason(),
            Some(&DenyReason::RiskLevel {
                level: RiskLevel::Critical
            })
        );
    }
}

#[tokio::test]
async fn declined_confirmation_differs_from_missing_handler() {
    let moderate = || {
        ActionDescriptor::new(
            "notes_create",
            "Create a note",
            "notes",
            RiskLevel::Moderate,
            "echo created",
        )
    };

    let mut declining = mission_with(shield().with_confirmation(|_, _| false), &launcher_config());
    declining.register(moderate()).unwrap();
    let declined = declining
        .invoke("notes_create", &Arguments::new())
        .await
        .unwrap_err();

    let mut unconfigured = mission();
    unconfigured.register(moderate()).unwrap();
    let missing = unconfigured
        .invoke("notes_create", &Arguments::new())
        .await
        .unwrap_err();

    assert_eq!(declined.deny_reason(), Some(&DenyReason::ConfirmationDeclined));
    assert!(matches!(
        missing.deny_reason(),
        Some(DenyReason::NoConfirmationHandler {
            level: RiskLevel::Moderate
        })
    ));
    assert_ne!(declined.deny_reason(), missing.deny_reason());
}

#[tokio::test]
async fn protected_path_denied_for_safe_action() {
    let mut mc = mission();
    mc.register(
        ActionDescriptor::new(
            "file_info",
            "Describe a file",
            "files",
            RiskLevel::Safe,
            "ls -ld \"{{ path|escape }}\"",
        )
        .with_parameter(ParameterSpec::required("path", ParamType::String, "Path")),
    )
    .unwrap();

    let err = mc
        .invoke("file_info", &args(&[("path", "/System")]))
        .await
        .unwrap_err();
    assert!(matches!(
        err.deny_reason(),
        Some(DenyReason::ProtectedPath { .. })
    ));
}

#[tokio::test]
async fn approved_confirmation_runs_script() {
    let mut mc = mission_with(shield().with_confirmation(|_, _| true), &launcher_config());
    mc.register(ActionDescriptor::new(
        "notes_create",
        "Create a note",
        "notes",
        RiskLevel::Moderate,
        "echo created",
    ))
    .unwrap();
    assert_eq!(
        mc.invoke("notes_create", &Arguments::new()).await.unwrap(),
        json!("created")
    );
}

#[tokio::test]
async fn retries_bounded_and_error_propagates() {
    let dir = tempfile::tempdir().unwrap();
    let counter = dir.path().join("attempts");
    let config = LauncherConfig {
        retry_on_failure: true,
        max_retries: 3,
        ..launcher_config()
    };
    let mut mc = mission_with(shield(), &config);
    mc.register(ActionDescriptor::new(
        "flaky",
        "Always fails",
        "test",
        RiskLevel::Safe,
        &format!("echo x >> '{}'; echo 'boom' >&2; exit 4", counter.display()),
    ))
    .unwrap();

    let err = mc.invoke("flaky", &Arguments::new()).await.unwrap_err();
    let OrbitError::Execution {
        attempts, source, ..
    } = &err
    else {
        panic!("expected execution error, got {err:?}");
    };
    assert_eq!(*attempts, 3);
    assert_eq!(source.stderr(), Some("boom"));
    assert!(err.is_retryable());

    let runs = std::fs::read_to_string(&counter).unwrap();
    assert_eq!(runs.lines().count(), 3);
}

#[tokio::test]
async fn timeout_is_distinct_failure() {
    let config = LauncherConfig {
        timeout: 1,
        ..launcher_config()
    };
    let mut mc = mission_with(shield(), &config);
    mc.register(ActionDescriptor::new(
        "slow",
        "Sleeps",
        "test",
        RiskLevel::Safe,
        "sleep 10",
    ))
    .unwrap();

    let start = Instant::now();
    let err = mc.invoke("slow", &Arguments::new()).await.unwrap_err();
    assert!(matches!(
        err,
        OrbitError::Execution {
            source: ExecutionError::Timeout { .. },
            ..
        }
    ));
    assert!(start.elapsed() < Duration::from_secs(8));
}

#[tokio::test]
async fn duplicate_registration_keeps_original() {
    let mut mc = mission();
    mc.register(echo_test()).unwrap();
    let err = mc
        .register(ActionDescriptor::new(
            "echo_test",
            "Other",
            "other",
            RiskLevel::Critical,
            "x",
        ))
        .unwrap_err();
    assert!(matches!(err, OrbitError::DuplicateAction { .. }));
    assert_eq!(mc.get("echo_test").unwrap().risk_level, RiskLevel::Safe);
}

#[tokio::test]
async fn function_call_runs_with_json_parser() {
    let mut mc = mission();
    mc.register(
        ActionDescriptor::new(
            "volume_get",
            "Report volume",
            "audio",
            RiskLevel::Safe,
            "echo '{\"level\": {{ level }}, \"muted\": {{ muted|json }}}'",
        )
        .with_parameter(ParameterSpec::required("level", ParamType::Integer, "Level"))
        .with_parameter(ParameterSpec::optional(
            "muted",
            ParamType::Boolean,
            "Muted",
            Some(ArgValue::Boolean(false)),
        ))
        .with_parser(ResultParser::json()),
    )
    .unwrap();

    let value = mc
        .execute_function_call("volume_get", &json!("{\"level\": 35}"))
        .await
        .unwrap();
    assert_eq!(value, json!({"level": 35, "muted": false}));
}

#[tokio::test]
async fn parse_failure_carries_raw_output() {
    let mut mc = mission();
    mc.register(
        ActionDescriptor::new("bad_json", "Emits text", "test", RiskLevel::Safe, "echo 'a,b'")
            .with_parser(ResultParser::json()),
    )
    .unwrap();
    let err = mc.invoke("bad_json", &Arguments::new()).await.unwrap_err();
    let OrbitError::Parse { source, .. } = &err else {
        panic!("expected parse error, got {err:?}");
    };
    assert_eq!(source.raw, "a,b");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn catalog_file_actions_run_end_to_end() {
    let actions = parse_catalog(
        r#"
[[action]]
name = "list_items"
description = "List items"
category = "test"
risk_level = "safe"
script_template = "echo 'one|two|three'"
parser = { kind = "delimited" }

[[action]]
name = "is_on"
description = "Report a flag"
category = "test"
risk_level = "safe"
script_template = "echo {% if on %}yes{% else %}no{% endif %}"
parser = { kind = "boolean" }

[[action.parameter]]
name = "on"
type = "boolean"
"#,
    )
    .unwrap();

    let mut mc = mission();
    mc.register_all(actions).unwrap();

    assert_eq!(
        mc.invoke("list_items", &Arguments::new()).await.unwrap(),
        json!(["one", "two", "three"])
    );
    let mut on = Arguments::new();
    on.insert("on".into(), ArgValue::Boolean(false));
    assert_eq!(mc.invoke("is_on", &on).await.unwrap(), json!(false));
}

#[test]
fn blocking_invoke_outside_runtime() {
    let mut mc = mission();
    mc.register(echo_test()).unwrap();
    let value = mc
        .invoke_blocking("echo_test", &args(&[("msg", "sync")]), false)
        .unwrap();
    assert_eq!(value, json!("sync"));
}
