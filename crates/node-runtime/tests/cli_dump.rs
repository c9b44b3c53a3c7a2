//! Config dump flags short-circuit start-up.

#![allow(clippy::unwrap_used)]

use clap::Parser;
use node_runtime::{Cli, Startup};
use os_config::EnvSource;
use std::collections::BTreeMap;

const CONFIG: &str = r#"
ethereum {
  rand_keys = ["default"]
}

transport {
  webapi {
    listen_addr = env("WEBAPI_ADDR", "127.0.0.1:0")
    ethereum_key = "default"
  }
}

ghost {
  interval = 30
  data_models = explode(",", env("MODELS", "BTC/USD"))
}
"#;

fn write_config(dir: &tempfile::TempDir, contents: &str) -> String {
    let path = dir.path().join("cfg.hcl");
    std::fs::write(&path, contents).unwrap();
    path.display().to_string()
}

fn env(vars: &[(&str, &str)]) -> EnvSource {
    EnvSource::isolated(
        vars.iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect::<BTreeMap<_, _>>(),
    )
}

#[test]
fn test_config_json_prints_decoded_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, CONFIG);
    let cli = Cli::parse_from(["ghost", "-c", path.as_str(), "--config.json"]);

    let Startup::Exit(dump) = cli.prepare(env(&[("MODELS", "BTC/USD,ETH/USD")])).unwrap() else {
        panic!("expected a dump");
    };
    assert_eq!(dump.lines().count(), 1);
    let json: serde_json::Value = serde_json::from_str(&dump).unwrap();
    assert_eq!(json["ghost"]["interval"], 30);
    assert_eq!(json["ghost"]["data_models"], serde_json::json!(["BTC/USD", "ETH/USD"]));
    assert_eq!(json["transport"]["webapi"]["listen_addr"], "127.0.0.1:0");
    assert!(json["morph"].is_null());
}

#[test]
fn test_config_env_lists_referenced_variables() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, CONFIG);
    let cli = Cli::parse_from(["ghost", "-c", path.as_str(), "--config.env"]);

    let Startup::Exit(dump) = cli.prepare(env(&[])).unwrap() else {
        panic!("expected a dump");
    };
    assert_eq!(dump, "MODELS\nWEBAPI_ADDR");
}

#[test]
fn test_later_files_override_earlier_ones() {
    let dir = tempfile::tempdir().unwrap();
    let base = write_config(&dir, CONFIG);
    let override_path = dir.path().join("override.hcl");
    std::fs::write(&override_path, "ghost {\n  interval = 5\n}\n").unwrap();
    let cli = Cli::parse_from([
        "ghost",
        "-c",
        base.as_str(),
        "-c",
        override_path.to_str().unwrap(),
    ]);

    let Startup::Run(outcome) = cli.prepare(env(&[])).unwrap() else {
        panic!("expected to run");
    };
    assert_eq!(outcome.config.ghost.interval, 5);
    assert_eq!(outcome.config.ghost.data_models, vec!["BTC/USD"]);
}

#[test]
fn test_invalid_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "ghost {\n  interval = \n");
    let cli = Cli::parse_from(["ghost", "-c", path.as_str(), "--config.json"]);
    assert!(cli.prepare(env(&[])).is_err());
}
