//! Layered Git configuration access.
//!
//! The raw configuration reader is an external collaborator; this module
//! defines its contract plus two implementations: one backed by the `git`
//! binary for the production CLI, and an in-memory one for tests.

use std::path::PathBuf;
use std::process::Command;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

/// Read (and minimally write) access to layered Git configuration.
///
/// Lookups never fail: a missing entry is `None`, and the caller applies a
/// default. Enumeration visits entries in file-precedence then declaration
/// order; the callback returns `false` to stop early.
pub trait GitConfiguration: Send + Sync {
    /// Look up `[section] property`. The last definition wins.
    fn try_get(&self, section: &str, property: &str) -> Option<String>;

    /// Look up `[section "scope"] property`. The scope is case-sensitive;
    /// section and property are not.
    fn try_get_scoped(&self, section: &str, scope: &str, property: &str) -> Option<String>;

    /// Visit every `name=value` entry.
    fn enumerate(&self, visit: &mut dyn FnMut(&str, &str) -> bool);

    /// Write `name = value` into the global configuration level.
    fn set_global(&self, name: &str, value: &str) -> Result<()>;

    /// Remove all values of `name` from the global configuration level.
    fn unset_global(&self, name: &str) -> Result<()>;
}

/// Split a canonical configuration key into (section, subsection, property).
///
/// The section cannot contain a "." and the property never does, so the
/// first and last dots delimit the (possibly dotted) subsection.
fn split_key(key: &str) -> Option<(&str, Option<&str>, &str)> {
    let first = key.find('.')?;
    let last = key.rfind('.')?;
    let section = &key[..first];
    let property = &key[last + 1..];
    if property.is_empty() || section.is_empty() {
        return None;
    }
    let subsection = if first == last {
        None
    } else {
        Some(&key[first + 1..last])
    };
    Some((section, subsection, property))
}

fn matches_entry(
    key: &str,
    section: &str,
    scope: Option<&str>,
    property: &str,
) -> bool {
    let Some((entry_section, entry_sub, entry_property)) = split_key(key) else {
        return false;
    };
    entry_section.eq_ignore_ascii_case(section)
        && entry_property.eq_ignore_ascii_case(property)
        && entry_sub == scope
}

fn last_match(
    entries: &[(String, String)],
    section: &str,
    scope: Option<&str>,
    property: &str,
) -> Option<String> {
    entries
        .iter()
        .filter(|(key, _)| matches_entry(key, section, scope, property))
        .map(|(_, value)| value.clone())
        .next_back()
}

/// Configuration backed by the installed `git` binary.
///
/// A fresh snapshot is taken per lookup via `git config --list --null`;
/// settings resolution is synchronous and cheap by contract, and failures
/// (no git, no repository) resolve to "unset" rather than an error.
pub struct GitProcessConfiguration {
    repository_path: Option<PathBuf>,
}

impl GitProcessConfiguration {
    pub fn new(repository_path: Option<PathBuf>) -> Self {
        Self { repository_path }
    }

    fn command(&self) -> Command {
        let mut command = Command::new("git");
        if let Some(path) = &self.repository_path {
            command.arg("-C").arg(path);
        }
        command
    }

    fn snapshot(&self) -> Vec<(String, String)> {
        let output = match self.command().args(["config", "--list", "--null"]).output() {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                tracing::debug!(status = %output.status, "git config listing failed");
                return Vec::new();
            }
            Err(error) => {
                tracing::debug!(%error, "could not run git");
                return Vec::new();
            }
        };

        let raw = String::from_utf8_lossy(&output.stdout);
        raw.split('\0')
            .filter(|entry| !entry.is_empty())
            .map(|entry| match entry.split_once('\n') {
                Some((key, value)) => (key.to_string(), value.to_string()),
                None => (entry.to_string(), String::new()),
            })
            .collect()
    }
}

impl GitConfiguration for GitProcessConfiguration {
    fn try_get(&self, section: &str, property: &str) -> Option<String> {
        last_match(&self.snapshot(), section, None, property)
    }

    fn try_get_scoped(&self, section: &str, scope: &str, property: &str) -> Option<String> {
        last_match(&self.snapshot(), section, Some(scope), property)
    }

    fn enumerate(&self, visit: &mut dyn FnMut(&str, &str) -> bool) {
        for (key, value) in self.snapshot() {
            if !visit(&key, &value) {
                break;
            }
        }
    }

    fn set_global(&self, name: &str, value: &str) -> Result<()> {
        let status = self
            .command()
            .args(["config", "--global", name, value])
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::Git(format!("failed to set '{name}' ({status})")))
        }
    }

    fn unset_global(&self, name: &str) -> Result<()> {
        let status = self
            .command()
            .args(["config", "--global", "--unset-all", name])
            .status()?;
        // Exit code 5 means the entry did not exist, which is fine.
        match status.code() {
            Some(0 | 5) => Ok(()),
            _ => Err(Error::Git(format!("failed to unset '{name}' ({status})"))),
        }
    }
}

/// In-memory configuration for tests and embedding.
#[derive(Default, Clone)]
pub struct MemoryConfiguration {
    entries: Arc<Mutex<Vec<(String, String)>>>,
}

impl MemoryConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry using the canonical `section.scope.property` key form.
    pub fn add(&self, name: &str, value: &str) {
        self.entries
            .lock()
            .unwrap()
            .push((name.to_string(), value.to_string()));
    }

    fn entries(&self) -> Vec<(String, String)> {
        self.entries.lock().unwrap().clone()
    }
}

impl GitConfiguration for MemoryConfiguration {
    fn try_get(&self, section: &str, property: &str) -> Option<String> {
        last_match(&self.entries(), section, None, property)
    }

    fn try_get_scoped(&self, section: &str, scope: &str, property: &str) -> Option<String> {
        last_match(&self.entries(), section, Some(scope), property)
    }

    fn enumerate(&self, visit: &mut dyn FnMut(&str, &str) -> bool) {
        for (key, value) in self.entries() {
            if !visit(&key, &value) {
                break;
            }
        }
    }

    fn set_global(&self, name: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|(key, _)| key != name);
        entries.push((name.to_string(), value.to_string()));
        Ok(())
    }

    fn unset_global(&self, name: &str) -> Result<()> {
        self.entries.lock().unwrap().retain(|(key, _)| key != name);
        Ok(())
    }
}
