//! Terminal collaborator implementation for the CLI.
//!
//! All prompting goes to stderr so stdout stays reserved for the
//! credential-protocol output Git reads.

use std::io::{BufRead, Write};

use keybridge_core::auth::terminal::Terminal;
use keybridge_core::error::Result;

pub struct StdTerminal;

impl Terminal for StdTerminal {
    fn write_line(&self, message: &str) {
        eprintln!("{message}");
    }

    fn prompt(&self, label: &str) -> Result<String> {
        eprint!("{label}: ");
        std::io::stderr().flush()?;

        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn prompt_secret(&self, label: &str) -> Result<String> {
        Ok(rpassword::prompt_password(format!("{label}: "))?)
    }
}
