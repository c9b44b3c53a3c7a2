//! Reload cycles against a cache file on disk.

#![allow(clippy::unwrap_used)]

use os_morph::{Morph, MorphConfig, Reloadable};
use parking_lot::Mutex;
use serde::Deserialize;
use shared_types::{Service, ServiceError};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct Ghost {
    data_models: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Config {
    ghost: Ghost,
}

const BASE: &[u8] = br#"
ghost {
  data_models = explode(",", env("GHOST_MODELS", ""))
}
"#;

#[derive(Default)]
struct Models {
    latest: Mutex<Option<(Vec<String>, u64)>>,
}

impl Reloadable<Ghost> for Models {
    fn update_config(&self, config: Ghost, version: u64) -> Result<(), ServiceError> {
        *self.latest.lock() = Some((config.data_models, version));
        Ok(())
    }
}

fn morph(dir: &tempfile::TempDir, one_shot: bool) -> Morph<Config> {
    let cache_path = dir.path().join("morph.cache.hcl");
    std::fs::write(&cache_path, r#"env_vars = { "GHOST_MODELS" = "BTC,ETH" }"#).unwrap();
    let config = MorphConfig {
        cache_path: cache_path.display().to_string(),
        interval: 1,
        one_shot,
    };
    Morph::new(config, vec![BASE]).unwrap()
}

#[test]
fn test_reload_applies_cache_without_touching_process_env() {
    assert!(std::env::var("GHOST_MODELS").is_err());
    let dir = tempfile::tempdir().unwrap();
    let morph = morph(&dir, false);
    let models = Arc::new(Models::default());
    morph.register("ghost", models.clone(), |c: &Config| c.ghost.clone());

    assert_eq!(morph.force_update().unwrap(), 1);

    let (data_models, version) = models.latest.lock().clone().unwrap();
    assert_eq!(data_models, vec!["BTC".to_string(), "ETH".to_string()]);
    assert_eq!(version, 1);
    assert!(std::env::var("GHOST_MODELS").is_err());
}

#[tokio::test]
async fn test_one_shot_reloads_once_and_waits_for_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let morph = morph(&dir, true);
    let ctx = CancellationToken::new();
    morph.start(ctx.clone()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(morph.snapshot().unwrap().1, 1);

    ctx.cancel();
    morph.wait().await.unwrap();
}

#[tokio::test]
async fn test_periodic_reload_until_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let morph = morph(&dir, false);
    let ctx = CancellationToken::new();
    morph.start(ctx.clone()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(morph.snapshot().unwrap().1, 2);
    assert!(matches!(
        morph.start(ctx.clone()).await,
        Err(ServiceError::AlreadyStarted { .. })
    ));

    ctx.cancel();
    morph.wait().await.unwrap();
}
