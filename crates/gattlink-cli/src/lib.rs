//! gattlink CLI library
//!
//! Argument parsing, layered configuration and the command handlers behind the
//! `gattlink` binary.

pub mod cli;
pub mod commands;
pub mod config;
pub mod demo;
pub mod error;

pub use cli::{Backend, Cli, Commands};
pub use commands::CommandDispatcher;
pub use config::{CliAppConfig, ConfigError};
pub use error::{CliError, Result};
