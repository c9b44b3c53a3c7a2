//! # Config Loader
//!
//! Turns one or more HCL sources into a typed config:
//!
//! 1. parse every source, collecting parse errors from all of them;
//! 2. move `variables` blocks aside and merge the remaining bodies;
//! 3. resolve variables and bind them as `var`;
//! 4. evaluate the merged body and decode it into `T`.
//!
//! Environment lookups made by `env()`/`env_list()` are answered by the
//! loader's [`EnvSource`] and recorded in [`LoadOutcome::env_refs`].

use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, SourceRange};
use crate::env::{EnvSource, EvalScope};
use crate::functions;
use crate::merge::merge_bodies;
use crate::variables::{resolve_variables, split_variables};
use hcl::eval::{Context, Evaluate};
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

/// One config document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub name: String,
    pub content: String,
}

impl Source {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Read a file from disk.
    pub fn file(path: impl AsRef<Path>) -> Result<Self, Diagnostic> {
        let path = path.as_ref();
        let name = path.display().to_string();
        std::fs::read_to_string(path)
            .map(|content| Self::new(name.clone(), content))
            .map_err(|err| {
                Diagnostic::error(
                    DiagnosticKind::Io,
                    "Failed to read configuration file",
                    err.to_string(),
                )
                .at(SourceRange::file(name))
            })
    }

    /// An embedded blob, named `embedded #index`.
    pub fn embedded(index: usize, bytes: &[u8]) -> Result<Self, Diagnostic> {
        let name = format!("embedded #{index}");
        std::str::from_utf8(bytes)
            .map(|content| Self::new(name.clone(), content))
            .map_err(|err| {
                Diagnostic::error(
                    DiagnosticKind::Io,
                    "Embedded configuration is not UTF-8",
                    err.to_string(),
                )
                .at(SourceRange::file(name))
            })
    }
}

/// A decoded config and the environment variables it looked up.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOutcome<T> {
    pub config: T,
    pub env_refs: BTreeSet<String>,
}

/// Loads typed configs from HCL sources.
#[derive(Debug, Clone, Default)]
pub struct Loader {
    env: EnvSource,
}

impl Loader {
    #[must_use]
    pub fn new(env: EnvSource) -> Self {
        Self { env }
    }

    #[must_use]
    pub fn env(&self) -> &EnvSource {
        &self.env
    }

    /// Load files in order; later files override earlier ones.
    pub fn load_files<T, P>(&self, paths: &[P]) -> Result<LoadOutcome<T>, Diagnostics>
    where
        T: DeserializeOwned,
        P: AsRef<Path>,
    {
        let mut diagnostics = Diagnostics::new();
        let mut sources = Vec::with_capacity(paths.len());
        for path in paths {
            match Source::file(path) {
                Ok(source) => sources.push(source),
                Err(diagnostic) => diagnostics.push(diagnostic),
            }
        }
        if !diagnostics.is_empty() {
            return Err(diagnostics);
        }
        self.load_sources(sources)
    }

    /// Load embedded blobs in order.
    pub fn load_embeds<T: DeserializeOwned>(
        &self,
        blobs: &[&[u8]],
    ) -> Result<LoadOutcome<T>, Diagnostics> {
        let mut diagnostics = Diagnostics::new();
        let mut sources = Vec::with_capacity(blobs.len());
        for (index, blob) in blobs.iter().enumerate() {
            match Source::embedded(index, blob) {
                Ok(source) => sources.push(source),
                Err(diagnostic) => diagnostics.push(diagnostic),
            }
        }
        if !diagnostics.is_empty() {
            return Err(diagnostics);
        }
        self.load_sources(sources)
    }

    pub fn load_sources<T: DeserializeOwned>(
        &self,
        sources: Vec<Source>,
    ) -> Result<LoadOutcome<T>, Diagnostics> {
        let mut diagnostics = Diagnostics::new();
        let mut bodies = Vec::with_capacity(sources.len());
        let mut variable_blocks = Vec::new();

        for source in &sources {
            match hcl::parse(&source.content) {
                Ok(body) => {
                    let (rest, blocks) = split_variables(body, &source.name);
                    bodies.push(rest);
                    variable_blocks.extend(blocks);
                }
                Err(err) => diagnostics.push(
                    Diagnostic::error(
                        DiagnosticKind::Parse,
                        "Invalid configuration syntax",
                        err.to_string(),
                    )
                    .at(SourceRange::file(source.name.clone())),
                ),
            }
        }
        if !diagnostics.is_empty() {
            return Err(diagnostics);
        }

        let body = merge_bodies(bodies);
        let subject = SourceRange::file(
            sources
                .iter()
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        );

        let scope = EvalScope::enter(self.env.clone());
        let mut ctx = Context::new();
        functions::declare_all(&mut ctx);
        resolve_variables(&variable_blocks, &mut ctx)?;

        let evaluated = body.evaluate(&ctx).map_err(|errors| {
            Diagnostic::error(
                DiagnosticKind::Evaluation,
                "Failed to evaluate configuration",
                errors.to_string(),
            )
            .at(subject.clone())
        })?;

        let config = hcl::from_body(evaluated).map_err(|err| {
            Diagnostic::error(
                DiagnosticKind::Decode,
                "Configuration does not match the expected schema",
                err.to_string(),
            )
            .at(subject.clone())
        })?;

        let env_refs = scope.referenced();
        drop(scope);
        debug!(
            sources = sources.len(),
            env_refs = env_refs.len(),
            "Configuration loaded"
        );
        Ok(LoadOutcome { config, env_refs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::BTreeMap;
    use std::io::Write;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(deny_unknown_fields)]
    struct Sample {
        name: String,
        #[serde(default)]
        tags: Vec<String>,
        inner: Option<Inner>,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(deny_unknown_fields)]
    struct Inner {
        port: u16,
    }

    fn loader(vars: &[(&str, &str)]) -> Loader {
        Loader::new(EnvSource::isolated(
            vars.iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect::<BTreeMap<_, _>>(),
        ))
    }

    #[test]
    fn test_load_embeds_with_variables_and_env() {
        let blob = br#"
            variables {
              prefix = upper(env("PREFIX", "node"))
            }
            name = "${var.prefix}-1"
            tags = env_list("TAGS")
            inner {
              port = 8080
            }
        "#;
        let outcome: LoadOutcome<Sample> = loader(&[("TAGS", "a\nb")])
            .load_embeds(&[blob.as_slice()])
            .unwrap();
        assert_eq!(outcome.config.name, "NODE-1");
        assert_eq!(outcome.config.tags, vec!["a", "b"]);
        assert_eq!(outcome.config.inner, Some(Inner { port: 8080 }));
        assert!(outcome.env_refs.contains("PREFIX"));
        assert!(outcome.env_refs.contains("TAGS"));
    }

    #[test]
    fn test_later_files_override() {
        let mut first = tempfile::NamedTempFile::new().unwrap();
        writeln!(first, "name = \"first\"\ninner {{\n  port = 1\n}}").unwrap();
        let mut second = tempfile::NamedTempFile::new().unwrap();
        writeln!(second, "inner {{\n  port = 2\n}}").unwrap();

        let outcome: LoadOutcome<Sample> = loader(&[])
            .load_files(&[first.path(), second.path()])
            .unwrap();
        assert_eq!(outcome.config.name, "first");
        assert_eq!(outcome.config.inner, Some(Inner { port: 2 }));
    }

    #[test]
    fn test_missing_files_are_all_reported() {
        let err = loader(&[])
            .load_files::<Sample, _>(&["/nonexistent/a.hcl", "/nonexistent/b.hcl"])
            .unwrap_err();
        assert_eq!(err.count(DiagnosticKind::Io), 2);
    }

    #[test]
    fn test_parse_errors_accumulate() {
        let err = loader(&[])
            .load_embeds::<Sample>(&[b"name = ".as_slice(), b"{{{".as_slice()])
            .unwrap_err();
        assert_eq!(err.count(DiagnosticKind::Parse), 2);
        let subjects: Vec<_> = err
            .iter()
            .filter_map(|d| d.subject.as_ref().map(|s| s.filename.clone()))
            .collect();
        assert_eq!(subjects, vec!["embedded #0", "embedded #1"]);
    }

    #[test]
    fn test_unknown_block_rejected() {
        let err = loader(&[])
            .load_embeds::<Sample>(&[b"name = \"x\"\nmystery {\n  a = 1\n}\n".as_slice()])
            .unwrap_err();
        assert_eq!(err.count(DiagnosticKind::Decode), 1);
    }

    #[test]
    fn test_circular_variables() {
        let err = loader(&[])
            .load_embeds::<Sample>(&[b"variables {\n  a = var.a\n}\nname = var.a\n".as_slice()])
            .unwrap_err();
        assert_eq!(err.len(), 1);
        assert_eq!(err.count(DiagnosticKind::CircularReference), 1);
    }

    #[test]
    fn test_evaluation_error() {
        let err = loader(&[])
            .load_embeds::<Sample>(&[b"name = var.nope\n".as_slice()])
            .unwrap_err();
        assert_eq!(err.count(DiagnosticKind::Evaluation), 1);
    }
}
