//! Integration tests for `modfactory parse`, `rules` and `version`.

use std::fs;
use std::process::Command;

fn cargo_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO"));
    cmd.args(["run", "-p", "modfactory-cli", "--bin", "modfactory", "--"]);
    cmd
}

fn stdout_json(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.output().expect("Failed to run command");
    assert!(output.status.success(), "command should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).expect("stdout should be valid JSON")
}

#[test]
fn test_version_output() {
    let output = cargo_bin().arg("version").output().expect("Failed to run version");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("modfactory "), "got: {stdout}");
}

#[test]
fn test_parse_json_splits_request() {
    let json = stdout_json(cargo_bin().args(["--json", "--cwd", "/app", "parse", "!!a-loader!b-loader?x=1!./c.js?q"]));

    assert_eq!(json["ok"], true);
    let parsed = &json["parsed"];
    assert_eq!(parsed["resource"], "./c.js?q");
    assert_eq!(parsed["suppressPre"], true);
    assert_eq!(parsed["suppressNormal"], true);
    assert_eq!(parsed["suppressPost"], true);
    assert!(parsed["matchResource"].is_null());

    let loaders = parsed["inlineLoaders"].as_array().unwrap();
    assert_eq!(loaders.len(), 2);
    assert_eq!(loaders[0]["identifier"], "a-loader");
    assert_eq!(loaders[1]["identifier"], "b-loader");
}

#[test]
fn test_parse_json_match_resource_joins_cwd() {
    let json = stdout_json(cargo_bin().args(["--json", "--cwd", "/app", "parse", "./x.js!=!./y.css"]));

    assert_eq!(json["parsed"]["matchResource"], "/app/x.js");
    assert_eq!(json["parsed"]["resource"], "./y.css");
    assert_eq!(json["parsed"]["suppressPost"], false);
}

#[test]
fn test_rules_json_lists_effects() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("modfactory.config.json"),
        r#"{
            "rules": [
                {"test": {"regex": "\\.css$"}, "use": "css-loader", "enforce": "post"},
                {"resourceQuery": {"regex": "raw"}, "type": "asset/source"}
            ]
        }"#,
    )
    .unwrap();

    let json = stdout_json(
        cargo_bin()
            .arg("--json")
            .arg("--cwd")
            .arg(dir.path())
            .args(["rules", "src/a.css?raw"]),
    );

    assert_eq!(json["ok"], true);
    assert!(json["resource"].as_str().unwrap().ends_with("/src/a.css"));

    let effects = json["effects"].as_array().unwrap();
    let uses: Vec<_> = effects.iter().filter(|e| e["kind"] == "use").collect();
    assert_eq!(uses.len(), 1);
    assert_eq!(uses[0]["value"]["identifier"], "css-loader");
    assert_eq!(uses[0]["enforce"], "post");

    // The user rule's type lands after the default javascript/auto one
    let types: Vec<_> = effects
        .iter()
        .filter(|e| e["kind"] == "setting" && e["key"] == "type")
        .map(|e| e["value"].as_str().unwrap())
        .collect();
    assert_eq!(types, ["javascript/auto", "asset/source"]);
}

#[test]
fn test_rules_json_query_flag() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("modfactory.config.json"),
        r#"{"defaultRules": false, "rules": [{"resourceQuery": {"regex": "^\\?inline$"}, "use": "raw-loader"}]}"#,
    )
    .unwrap();

    let json = stdout_json(
        cargo_bin()
            .arg("--json")
            .arg("--cwd")
            .arg(dir.path())
            .args(["rules", "a.txt?other", "--query", "inline"]),
    );

    assert_eq!(json["resourceQuery"], "?inline");
    let effects = json["effects"].as_array().unwrap();
    assert_eq!(effects.len(), 1);
    assert_eq!(effects[0]["value"]["identifier"], "raw-loader");
}
