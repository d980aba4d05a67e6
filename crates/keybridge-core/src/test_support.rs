//! Test doubles shared by unit and integration tests.
//!
//! These are real implementations of the collaborator contracts that
//! record interactions instead of touching the environment, a terminal, or
//! a browser.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use url::Url;

use crate::auth::terminal::Terminal;
use crate::error::Result;
use crate::oauth::Browser;
use crate::settings::Environment;

/// A fixed environment variable map.
pub struct StaticEnvironment {
    variables: HashMap<String, String>,
}

impl StaticEnvironment {
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            variables: pairs
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        }
    }
}

impl Environment for StaticEnvironment {
    fn get(&self, name: &str) -> Option<String> {
        self.variables.get(name).cloned()
    }
}

/// A terminal with scripted prompt responses and a recorded transcript.
pub struct ScriptedTerminal {
    responses: Mutex<VecDeque<String>>,
    transcript: Mutex<Vec<String>>,
}

impl ScriptedTerminal {
    pub fn with_responses(responses: &[&str]) -> Self {
        Self {
            responses: Mutex::new(responses.iter().map(ToString::to_string).collect()),
            transcript: Mutex::new(Vec::new()),
        }
    }

    /// Everything written to the terminal so far.
    pub fn transcript(&self) -> Vec<String> {
        self.transcript.lock().unwrap().clone()
    }
}

impl Terminal for ScriptedTerminal {
    fn write_line(&self, message: &str) {
        self.transcript.lock().unwrap().push(message.to_string());
    }

    fn prompt(&self, label: &str) -> Result<String> {
        self.transcript
            .lock()
            .unwrap()
            .push(format!("prompt: {label}"));
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }

    fn prompt_secret(&self, label: &str) -> Result<String> {
        self.prompt(label)
    }
}

/// A browser that records the URLs it was asked to open.
#[derive(Default)]
pub struct RecordingBrowser {
    opened: Mutex<Vec<Url>>,
}

impl RecordingBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opened(&self) -> Vec<Url> {
        self.opened.lock().unwrap().clone()
    }
}

impl Browser for RecordingBrowser {
    fn open(&self, url: &Url) -> Result<()> {
        self.opened.lock().unwrap().push(url.clone());
        Ok(())
    }
}
