//! Config inspection flags.
//!
//! `--config.env` prints the environment variables a config references and
//! `--config.json` prints the decoded config. Either one replaces the normal
//! start-up.

use crate::loader::LoadOutcome;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DumpFlags {
    pub env: bool,
    pub json: bool,
}

impl DumpFlags {
    #[must_use]
    pub fn requested(&self) -> bool {
        self.env || self.json
    }

    /// Render the requested dump, or `None` when no flag is set.
    ///
    /// Env names come first, one per line and sorted, followed by the JSON
    /// document when both flags are given.
    pub fn render<T: Serialize>(
        &self,
        outcome: &LoadOutcome<T>,
    ) -> Result<Option<String>, serde_json::Error> {
        if !self.requested() {
            return Ok(None);
        }
        let mut sections = Vec::new();
        if self.env {
            sections.push(
                outcome
                    .env_refs
                    .iter()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join("\n"),
            );
        }
        if self.json {
            sections.push(serde_json::to_string(&outcome.config)?);
        }
        Ok(Some(sections.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[derive(Serialize)]
    struct Cfg {
        interval: u64,
    }

    fn outcome() -> LoadOutcome<Cfg> {
        LoadOutcome {
            config: Cfg { interval: 60 },
            env_refs: BTreeSet::from(["B".to_string(), "A".to_string()]),
        }
    }

    #[test]
    fn test_no_flags() {
        assert_eq!(DumpFlags::default().render(&outcome()).unwrap(), None);
    }

    #[test]
    fn test_env_dump_sorted() {
        let flags = DumpFlags {
            env: true,
            json: false,
        };
        assert_eq!(flags.render(&outcome()).unwrap().as_deref(), Some("A\nB"));
    }

    #[test]
    fn test_json_dump() {
        let flags = DumpFlags {
            env: false,
            json: true,
        };
        assert_eq!(
            flags.render(&outcome()).unwrap().as_deref(),
            Some(r#"{"interval":60}"#)
        );
    }
}
