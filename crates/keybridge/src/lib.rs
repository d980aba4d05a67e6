// Terminal prompting in this crate writes to stderr by design.
#![allow(clippy::print_stderr)]

pub mod cli;
pub mod commands;
pub mod terminal;
