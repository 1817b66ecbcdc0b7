//! Error display for the CLI.

use colored::Colorize;
use fleet_scheduler::error::ProviderError;

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    if let Some(provider_err) = err.downcast_ref::<ProviderError>() {
        match provider_err {
            ProviderError::Incomplete { .. } => {
                eprintln!(
                    "\n{}",
                    "Hint: Run `tick-replay gen --out DIR` to write a snapshot.".yellow()
                );
            }
            ProviderError::TornRead(_) => {
                eprintln!(
                    "\n{}",
                    "Hint: The snapshot files come from different generations; rewrite all three."
                        .yellow()
                );
            }
            _ => {}
        }
    }
}
