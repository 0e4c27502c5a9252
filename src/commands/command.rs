//! Command trait definition for CLI commands.
//!
//! Every `wikifan` subcommand implements [`Command`]; dispatch over the
//! subcommand enum is generated by `enum_dispatch`.

use anyhow::Result;
use enum_dispatch::enum_dispatch;

/// Trait implemented by all wikifan CLI commands.
///
/// `command_line` is the full invocation, logged at the start of a run.
#[enum_dispatch]
pub trait Command {
    #[allow(clippy::missing_errors_doc)]
    fn execute(&self, command_line: &str) -> Result<()>;
}
