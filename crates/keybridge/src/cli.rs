use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "git-credential-keybridge",
    about = "A Git credential broker with OAuth2 support",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Return a stored or newly acquired credential for a remote.
    Get,
    /// Store a credential Git captured after a successful operation.
    Store,
    /// Erase any stored credential for a remote.
    Erase,
    /// Write the Git configuration the registered providers need.
    Configure,
    /// Remove configuration written by `configure`.
    Unconfigure,
}
