//! End-to-end variable resolution through the loader.

use os_config::{DiagnosticKind, EnvSource, LoadOutcome, Loader};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
struct Pair {
    a: u64,
    b: u64,
}

fn loader() -> Loader {
    Loader::new(EnvSource::isolated(BTreeMap::new()))
}

#[test]
fn test_var_blocks_reference_each_other() {
    let blob = br#"
        variables {
          var "a" { value = 1 }
          var "b" { value = var.a.value + 1 }
        }
        a = var.a.value
        b = var.b.value
    "#;
    let outcome: LoadOutcome<Pair> = loader().load_embeds(&[blob.as_slice()]).unwrap();
    assert_eq!(outcome.config, Pair { a: 1, b: 2 });
}

#[test]
fn test_variables_span_sources() {
    let first = b"variables {\n  base = 10\n}\n".as_slice();
    let second = b"variables {\n  next = var.base + 1\n}\na = var.base\nb = var.next\n".as_slice();
    let outcome: LoadOutcome<Pair> = loader().load_embeds(&[first, second]).unwrap();
    assert_eq!(outcome.config, Pair { a: 10, b: 11 });
}

#[test]
fn test_cycle_yields_single_diagnostic() {
    let blob = br#"
        variables {
          var "x" { value = var.y.value }
          var "y" { value = var.x.value }
        }
        a = 1
        b = 2
    "#;
    let err = loader()
        .load_embeds::<Pair>(&[blob.as_slice()])
        .unwrap_err();
    assert_eq!(err.len(), 1);
    assert_eq!(err.count(DiagnosticKind::CircularReference), 1);
}

#[test]
fn test_cycle_diagnostic_is_deterministic() {
    let blob = br#"
        variables {
          var "x" { value = var.y.value }
          var "y" { value = var.x.value }
        }
        a = 1
        b = 2
    "#;
    let first = loader()
        .load_embeds::<Pair>(&[blob.as_slice()])
        .unwrap_err()
        .to_string();
    for _ in 0..5 {
        let again = loader()
            .load_embeds::<Pair>(&[blob.as_slice()])
            .unwrap_err()
            .to_string();
        assert_eq!(first, again);
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Models {
    models: Vec<String>,
}

#[test]
fn test_env_refs_recorded_from_variables() {
    let blob = br#"
        variables {
          models = explode(",", env("MODELS", "BTC"))
        }
        models = var.models
    "#;
    let env = EnvSource::isolated(BTreeMap::from([(
        "MODELS".to_string(),
        "BTC,ETH".to_string(),
    )]));
    let outcome: LoadOutcome<Models> = Loader::new(env).load_embeds(&[blob.as_slice()]).unwrap();
    assert_eq!(outcome.config.models, vec!["BTC", "ETH"]);
    assert!(outcome.env_refs.contains("MODELS"));
}
