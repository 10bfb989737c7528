//! Tooling: the command-line front end and its text rendering.

pub mod cli;
pub mod format;

pub use cli::{load_config, Cli, CliContext, Commands};
