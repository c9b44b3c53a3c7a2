//! # Environment Scope
//!
//! Config expressions read environment variables through `env()` and
//! `env_list()`. Instead of consulting (or mutating) the process environment
//! directly, lookups go through an [`EnvSource`]: the OS environment,
//! optionally overlaid by an explicit map. The morph engine uses the overlay
//! to inject cached overrides without touching process state.
//!
//! HCL functions are plain function pointers, so the active source is
//! installed in a thread-local for the duration of one load by an
//! [`EvalScope`] guard. The scope also records every name looked up.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

/// Where environment lookups are answered from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSource {
    overlay: BTreeMap<String, String>,
    isolated: bool,
}

impl EnvSource {
    /// The process environment.
    #[must_use]
    pub fn os() -> Self {
        Self::default()
    }

    /// The process environment with `overlay` taking precedence.
    #[must_use]
    pub fn with_overlay(overlay: BTreeMap<String, String>) -> Self {
        Self {
            overlay,
            isolated: false,
        }
    }

    /// Only the given variables; the process environment is ignored.
    #[must_use]
    pub fn isolated(vars: BTreeMap<String, String>) -> Self {
        Self {
            overlay: vars,
            isolated: true,
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        if let Some(value) = self.overlay.get(name) {
            return Some(value.clone());
        }
        if self.isolated {
            return None;
        }
        std::env::var(name).ok()
    }

    #[must_use]
    pub fn overlay(&self) -> &BTreeMap<String, String> {
        &self.overlay
    }
}

struct ScopeState {
    source: EnvSource,
    referenced: BTreeSet<String>,
}

thread_local! {
    static ACTIVE: RefCell<Vec<ScopeState>> = const { RefCell::new(Vec::new()) };
}

/// Installs an [`EnvSource`] for the current thread until dropped.
///
/// Scopes nest; the innermost one answers lookups.
pub struct EvalScope {
    depth: usize,
}

impl EvalScope {
    #[must_use]
    pub fn enter(source: EnvSource) -> Self {
        let depth = ACTIVE.with(|active| {
            let mut active = active.borrow_mut();
            active.push(ScopeState {
                source,
                referenced: BTreeSet::new(),
            });
            active.len()
        });
        Self { depth }
    }

    /// Names looked up so far inside this scope.
    #[must_use]
    pub fn referenced(&self) -> BTreeSet<String> {
        ACTIVE.with(|active| {
            active
                .borrow()
                .get(self.depth - 1)
                .map(|s| s.referenced.clone())
                .unwrap_or_default()
        })
    }
}

impl Drop for EvalScope {
    fn drop(&mut self) {
        ACTIVE.with(|active| active.borrow_mut().truncate(self.depth - 1));
    }
}

/// Look up `name` in the innermost scope, recording the reference.
///
/// Without an active scope the process environment is used.
#[must_use]
pub fn lookup(name: &str) -> Option<String> {
    ACTIVE.with(|active| {
        let mut active = active.borrow_mut();
        match active.last_mut() {
            Some(scope) => {
                scope.referenced.insert(name.to_string());
                scope.source.get(name)
            }
            None => std::env::var(name).ok(),
        }
    })
}
