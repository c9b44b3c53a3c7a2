//! # Morph Engine
//!
//! Periodic reconfiguration of running services.
//!
//! ## Reload cycle
//!
//! 1. Read the cache file into `env_vars`.
//! 2. Decode the embedded base configuration with those variables overlaid
//!    on the process environment. The process environment itself is never
//!    modified; the overlay only lives for the duration of the decode.
//! 3. On success bump the version, store the new snapshot and hand every
//!    registered service its subtree, in registration order.
//!
//! A failed read or decode aborts the cycle and keeps the previous snapshot.
//! A service rejecting its update is logged and does not stop the others.

use crate::config::{CacheFile, MorphConfig};
use crate::errors::MorphError;
use async_trait::async_trait;
use os_config::{EnvSource, Loader};
use os_supervisor::Ticker;
use os_telemetry::{log_error, log_event};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use shared_types::{Lifecycle, Service, ServiceError};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const SUBSYSTEM: &str = "morph";

/// A service that accepts configuration updates while running.
pub trait Reloadable<T>: Send + Sync {
    /// Apply `config`, the subtree of reload number `version`.
    fn update_config(&self, config: T, version: u64) -> Result<(), ServiceError>;
}

type Apply<C> = Box<dyn Fn(&C, u64) -> Result<(), ServiceError> + Send + Sync>;

struct Registration<C> {
    name: String,
    apply: Apply<C>,
}

struct Engine<C> {
    config: MorphConfig,
    blobs: Vec<&'static [u8]>,
    registrations: RwLock<Vec<Registration<C>>>,
    snapshot: RwLock<Option<(Arc<C>, u64)>>,
    cycle: Mutex<()>,
}

impl<C: DeserializeOwned> Engine<C> {
    fn read_cache(&self) -> Result<CacheFile, MorphError> {
        let path = &self.config.cache_path;
        Loader::new(EnvSource::os())
            .load_files::<CacheFile, _>(&[path])
            .map(|outcome| outcome.config)
            .map_err(|diagnostics| MorphError::Cache {
                path: path.clone(),
                diagnostics,
            })
    }

    fn force_update(&self) -> Result<u64, MorphError> {
        let _cycle = self.cycle.lock();

        let cache = self.read_cache().inspect_err(|err| {
            log_error!(SUBSYSTEM, err, "Failed to read morph cache", path = %self.config.cache_path);
        })?;
        let overridden = cache.env_vars.len();

        let loader = Loader::new(EnvSource::with_overlay(cache.env_vars));
        let outcome = loader.load_embeds::<C>(&self.blobs).map_err(|diagnostics| {
            for diagnostic in diagnostics.iter() {
                log_event!(warn, SUBSYSTEM, "Reload diagnostic", diagnostic = %diagnostic);
            }
            MorphError::Reload(diagnostics)
        })?;

        let config = Arc::new(outcome.config);
        let version = {
            let mut snapshot = self.snapshot.write();
            let version = snapshot.as_ref().map_or(0, |(_, v)| *v) + 1;
            *snapshot = Some((Arc::clone(&config), version));
            version
        };
        log_event!(
            info,
            SUBSYSTEM,
            "Configuration reloaded",
            version,
            overridden,
            env_refs = outcome.env_refs.len()
        );

        for registration in self.registrations.read().iter() {
            if let Err(err) = (registration.apply)(&config, version) {
                let err = MorphError::Handler {
                    service: registration.name.clone(),
                    reason: err.to_string(),
                };
                log_event!(warn, SUBSYSTEM, "Service update failed", error = %err, version);
            }
        }
        Ok(version)
    }
}

/// Reload engine for configs of type `C`.
pub struct Morph<C> {
    lifecycle: Arc<Lifecycle>,
    engine: Arc<Engine<C>>,
}

impl<C> Morph<C>
where
    C: DeserializeOwned + Send + Sync + 'static,
{
    /// `blobs` are the embedded base configuration sources, decoded in order.
    pub fn new(config: MorphConfig, blobs: Vec<&'static [u8]>) -> Result<Self, MorphError> {
        if config.interval == 0 {
            return Err(MorphError::Validation("interval must be positive".to_string()));
        }
        Ok(Self {
            lifecycle: Arc::new(Lifecycle::new(SUBSYSTEM)),
            engine: Arc::new(Engine {
                config,
                blobs,
                registrations: RwLock::new(Vec::new()),
                snapshot: RwLock::new(None),
                cycle: Mutex::new(()),
            }),
        })
    }

    /// Hand `service` the subtree chosen by `select` after every reload.
    pub fn register<T, S, F>(&self, name: impl Into<String>, service: Arc<S>, select: F)
    where
        S: Reloadable<T> + ?Sized + 'static,
        F: Fn(&C) -> T + Send + Sync + 'static,
    {
        self.engine.registrations.write().push(Registration {
            name: name.into(),
            apply: Box::new(move |config, version| service.update_config(select(config), version)),
        });
    }

    /// Run one reload cycle now. Returns the new version.
    pub fn force_update(&self) -> Result<u64, MorphError> {
        self.engine.force_update()
    }

    /// The latest successfully decoded config and its version.
    #[must_use]
    pub fn snapshot(&self) -> Option<(Arc<C>, u64)> {
        self.engine.snapshot.read().clone()
    }

    #[must_use]
    pub fn config(&self) -> &MorphConfig {
        &self.engine.config
    }
}

#[async_trait]
impl<C> Service for Morph<C>
where
    C: DeserializeOwned + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        self.lifecycle.name()
    }

    async fn start(&self, ctx: CancellationToken) -> Result<(), ServiceError> {
        self.lifecycle.begin()?;
        let ticker = Ticker::new(Duration::from_secs(self.engine.config.interval));
        ticker.start(ctx.clone());

        let engine = Arc::clone(&self.engine);
        let task = tokio::spawn(async move {
            while ticker.recv().await.is_some() {
                let cycle = Arc::clone(&engine);
                match tokio::task::spawn_blocking(move || cycle.force_update()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(err)) => log_error!(SUBSYSTEM, err, "Reload cycle failed"),
                    Err(err) => return Err(ServiceError::runtime(SUBSYSTEM, err)),
                }
                if engine.config.one_shot {
                    log_event!(debug, SUBSYSTEM, "One-shot reload done");
                    break;
                }
            }
            ctx.cancelled().await;
            Ok(())
        });
        self.lifecycle.finish_with(task);
        Ok(())
    }

    async fn wait(&self) -> Result<(), ServiceError> {
        self.lifecycle.wait().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Deserialize)]
    struct Config {
        name: String,
    }

    const BASE: &[u8] = br#"name = env("MORPH_UNIT_NAME", "base")"#;

    struct Recorder {
        seen: Mutex<Vec<(String, u64)>>,
        fail: bool,
    }

    impl Reloadable<String> for Recorder {
        fn update_config(&self, config: String, version: u64) -> Result<(), ServiceError> {
            self.seen.lock().push((config, version));
            if self.fail {
                return Err(ServiceError::validation("recorder", "refused"));
            }
            Ok(())
        }
    }

    fn recorder(fail: bool) -> Arc<Recorder> {
        Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            fail,
        })
    }

    fn cache_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn morph(cache: &tempfile::NamedTempFile) -> Morph<Config> {
        let config = MorphConfig {
            cache_path: cache.path().display().to_string(),
            interval: 60,
            one_shot: false,
        };
        Morph::new(config, vec![BASE]).unwrap()
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = MorphConfig {
            interval: 0,
            ..MorphConfig::default()
        };
        assert!(matches!(
            Morph::<Config>::new(config, vec![BASE]),
            Err(MorphError::Validation(_))
        ));
    }

    #[test]
    fn test_cache_overrides_reach_handlers() {
        let cache = cache_file(r#"env_vars = { MORPH_UNIT_NAME = "cached" }"#);
        let morph = morph(&cache);
        let seen = recorder(false);
        morph.register("recorder", seen.clone(), |c: &Config| c.name.clone());

        assert_eq!(morph.force_update().unwrap(), 1);
        assert_eq!(morph.force_update().unwrap(), 2);
        assert_eq!(
            *seen.seen.lock(),
            vec![("cached".to_string(), 1), ("cached".to_string(), 2)]
        );
        assert_eq!(morph.snapshot().unwrap().0.name, "cached");
    }

    #[test]
    fn test_failing_handler_does_not_stop_others() {
        let cache = cache_file("env_vars = {}");
        let morph = morph(&cache);
        let first = recorder(true);
        let second = recorder(false);
        morph.register("first", first.clone(), |c: &Config| c.name.clone());
        morph.register("second", second.clone(), |c: &Config| c.name.clone());

        assert_eq!(morph.force_update().unwrap(), 1);
        assert_eq!(first.seen.lock().len(), 1);
        assert_eq!(*second.seen.lock(), vec![("base".to_string(), 1)]);
    }

    #[test]
    fn test_unreadable_cache_keeps_snapshot() {
        let cache = cache_file("env_vars = {}");
        let morph = morph(&cache);
        morph.force_update().unwrap();

        std::fs::write(cache.path(), "env_vars = ").unwrap();
        assert!(matches!(morph.force_update(), Err(MorphError::Cache { .. })));
        assert_eq!(morph.snapshot().unwrap().1, 1);
    }

    #[test]
    fn test_decode_failure_keeps_snapshot() {
        let cache = cache_file("env_vars = {}");
        let config = MorphConfig {
            cache_path: cache.path().display().to_string(),
            ..MorphConfig::default()
        };
        let morph: Morph<Config> = Morph::new(config, vec![b"unexpected = 1".as_slice()]).unwrap();
        assert!(matches!(morph.force_update(), Err(MorphError::Reload(_))));
        assert!(morph.snapshot().is_none());
    }
}
